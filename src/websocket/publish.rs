//! Measurement Publish Handler
//!
//! Accepts measurements from kit-authenticated connections and fans them
//! out to the kit's subscription group.

use serde_json::{Map, Value};

use super::messages::{HandlerError, ServerMessage};
use super::session::Connection;
use crate::api::AppState;
use crate::measurement::ValidationError;

/// Handle `{"measurement": {...}}`
pub async fn handle_publish(
    state: &AppState,
    connection: &Connection,
    content: &Map<String, Value>,
) -> Result<(), HandlerError> {
    let kit = connection.session.kit().ok_or(HandlerError::NotAKit)?;

    let payload = content
        .get("measurement")
        .ok_or(HandlerError::InvalidMeasurement(ValidationError::MissingField(
            "measurement",
        )))?;
    let measurement = state
        .validator
        .validate_measurement(kit, payload)
        .await
        .map_err(HandlerError::InvalidMeasurement)?;

    // The publisher's acknowledgement does not wait on subscribers
    connection.reply(ServerMessage::published());

    let id = measurement.id;
    let delivered = state
        .registry
        .broadcast(kit, &ServerMessage::Measurement(measurement));
    tracing::debug!(kit = %kit, measurement_id = id, subscribers = delivered, "Published measurement");

    Ok(())
}
