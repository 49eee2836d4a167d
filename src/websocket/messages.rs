//! WebSocket Message Types
//!
//! Replies and broadcasts sent to clients, and the user-facing errors a
//! handler can reject a message with. Inbound messages are plain JSON
//! objects whose expected fields depend on the endpoint.

use serde::Serialize;
use thiserror::Error;

use crate::auth::KitId;
use crate::measurement::{ValidatedMeasurement, ValidationError};

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Subscription confirmed: `{"action": "subscribe", "kit": ...}`
    Subscribed { action: &'static str, kit: KitId },
    /// Publish acknowledged: `{"success": "published"}`
    Published { success: &'static str },
    /// A measurement broadcast to subscribers of its kit
    Measurement(ValidatedMeasurement),
    /// Error message: `{"error": ...}`
    Error { error: String },
}

impl ServerMessage {
    pub fn subscribed(kit: impl Into<KitId>) -> Self {
        ServerMessage::Subscribed {
            action: "subscribe",
            kit: kit.into(),
        }
    }

    pub fn published() -> Self {
        ServerMessage::Published {
            success: "published",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: message.into(),
        }
    }
}

/// Rejections reported back on the connection that sent the message.
///
/// The display text is exactly what the client receives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("Kit to subscribe to not given.")]
    KitNotGiven,

    /// Covers both unknown kits and kits the requester may not see
    #[error("Kit not found or you do not have access to it.")]
    KitNotFoundOrForbidden,

    #[error("You must be a kit to publish measurements.")]
    NotAKit,

    #[error("You must provide a valid measurement.")]
    InvalidMeasurement(#[source] ValidationError),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Binary messages not supported")]
    BinaryNotSupported,
}

impl From<HandlerError> for ServerMessage {
    fn from(err: HandlerError) -> Self {
        ServerMessage::error(err.to_string())
    }
}
