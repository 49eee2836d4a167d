//! Per-connection session state

use std::sync::OnceLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::messages::ServerMessage;
use super::registry::ConnectionId;
use crate::auth::{KitId, Principal};

/// Identity attached to a connection when it is established.
///
/// The kit identity can be written once and never changes afterwards.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    principal: Option<Principal>,
    kit: OnceLock<KitId>,
}

impl Session {
    pub fn new(id: ConnectionId, principal: Option<Principal>) -> Self {
        Self {
            id,
            principal,
            kit: OnceLock::new(),
        }
    }

    /// Open a session, attaching the kit identity if the principal is a kit
    pub fn open(id: ConnectionId, principal: Option<Principal>) -> Self {
        let session = Self::new(id, principal);
        if let Some(kit) = session.principal.as_ref().and_then(Principal::as_kit) {
            session.attach_kit(kit.to_string());
        }
        session
    }

    /// Set the kit identity. Returns false if one was already attached.
    pub fn attach_kit(&self, kit: KitId) -> bool {
        self.kit.set(kit).is_ok()
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn kit(&self) -> Option<&str> {
        self.kit.get().map(String::as_str)
    }
}

/// A live connection as seen by the message handlers
pub struct Connection {
    pub session: Session,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Connection {
    pub fn new(session: Session, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self { session, outbound }
    }

    /// Queue a reply for this connection without waiting.
    ///
    /// A reply that does not fit the outbound queue is dropped, so a client
    /// that stops reading cannot stall its own handler. Returns whether the
    /// reply was queued.
    pub fn reply(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.session.id, "Outbound queue full, dropping reply");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
