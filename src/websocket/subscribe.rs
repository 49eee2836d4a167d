//! Measurement Subscribe Handler
//!
//! Admits a connection into a kit's subscription group. Persons may
//! subscribe to kits they own and a kit may subscribe to itself.

use serde_json::{Map, Value};

use super::messages::{HandlerError, ServerMessage};
use super::session::Connection;
use crate::api::AppState;

/// Handle `{"kit": <kit_id>}`
pub async fn handle_subscribe(
    state: &AppState,
    connection: &Connection,
    content: &Map<String, Value>,
) -> Result<(), HandlerError> {
    let requested = content.get("kit").ok_or(HandlerError::KitNotGiven)?;
    let kit_id = requested
        .as_str()
        .ok_or(HandlerError::KitNotFoundOrForbidden)?;

    let kit = state.directory.resolve_kit(kit_id).await.map_err(|e| {
        tracing::debug!(kit = %kit_id, error = %e, "Kit lookup failed");
        HandlerError::KitNotFoundOrForbidden
    })?;

    let allowed = match connection.session.principal() {
        Some(principal) => state.directory.has_subscribe_permission(principal, &kit).await,
        None => false,
    };
    if !allowed {
        return Err(HandlerError::KitNotFoundOrForbidden);
    }

    let id = connection.session.id();
    state.registry.join(&kit.username, id).map_err(|e| {
        tracing::warn!(connection_id = %id, kit = %kit.username, error = %e, "Join failed");
        HandlerError::KitNotFoundOrForbidden
    })?;

    connection.reply(ServerMessage::subscribed(kit.username));
    Ok(())
}
