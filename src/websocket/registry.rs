//! Subscription Group Registry
//!
//! Tracks live connections and, per kit, the group of connections that
//! receive its measurements. Groups live in a sharded map so joins and
//! broadcasts for unrelated kits do not contend on a single lock.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::auth::KitId;
use crate::config::HubConfig;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = Uuid;

/// Errors returned by registry operations
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,
}

/// Why a broadcast could not be handed to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber queue is full")]
    QueueFull,

    #[error("subscriber has disconnected")]
    Disconnected,
}

impl<T> From<TrySendError<T>> for DeliveryError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        }
    }
}

/// A registered connection
struct ConnectionEntry {
    subscriber: Subscriber,
    /// Kits this connection joined. May still list a kit whose group
    /// evicted the connection after a failed delivery.
    kits: HashSet<KitId>,
}

/// A group member: its outbound queue and the signal fired when a
/// delivery to it fails
#[derive(Clone)]
struct Subscriber {
    sender: mpsc::Sender<ServerMessage>,
    evicted: Arc<Notify>,
}

/// Registry of connections and per-kit subscription groups
pub struct SubscriptionRegistry {
    /// Active connections: ConnectionId → ConnectionEntry
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// Subscription groups: KitId → members
    groups: DashMap<KitId, HashMap<ConnectionId, Subscriber>>,
    max_connections: usize,
}

impl SubscriptionRegistry {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            connections: DashMap::new(),
            groups: DashMap::new(),
            max_connections: config.max_connections,
        }
    }

    /// Register a new connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub fn register(
        &self,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        if self.connections.len() >= self.max_connections {
            return Err(HubError::TooManyConnections(self.max_connections));
        }

        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionEntry {
                subscriber: Subscriber {
                    sender,
                    evicted: Arc::new(Notify::new()),
                },
                kits: HashSet::new(),
            },
        );

        Ok(id)
    }

    /// Signal fired once a broadcast has dropped this connection.
    ///
    /// The owner of the connection is expected to close it. The signal
    /// keeps a permit, so waiting after the eviction still completes.
    pub fn eviction_signal(&self, id: ConnectionId) -> Option<Arc<Notify>> {
        self.connections
            .get(&id)
            .map(|entry| Arc::clone(&entry.subscriber.evicted))
    }

    /// Add a connection to a kit's group, creating the group if needed.
    ///
    /// Joining a group twice is a no-op; returns whether the connection
    /// was newly added.
    pub fn join(&self, kit: &str, id: ConnectionId) -> Result<bool, HubError> {
        let subscriber = {
            let mut entry = self
                .connections
                .get_mut(&id)
                .ok_or(HubError::ConnectionNotFound)?;
            entry.kits.insert(kit.to_string());
            entry.subscriber.clone()
        };

        let added = self
            .groups
            .entry(kit.to_string())
            .or_default()
            .insert(id, subscriber)
            .is_none();

        if added {
            tracing::debug!(connection_id = %id, kit = %kit, "Joined subscription group");
        }
        Ok(added)
    }

    /// Remove a connection from every group and forget it.
    ///
    /// Safe to call for connections that never joined anything or were
    /// already removed. Returns the number of groups left.
    pub fn leave_all(&self, id: ConnectionId) -> usize {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return 0;
        };

        let mut left = 0;
        for kit in &entry.kits {
            if let Some(mut group) = self.groups.get_mut(kit) {
                if group.remove(&id).is_some() {
                    left += 1;
                }
            }
            self.groups.remove_if(kit, |_, group| group.is_empty());
        }

        tracing::debug!(connection_id = %id, groups = left, "Left all subscription groups");
        left
    }

    /// Deliver a message to every member of a kit's group.
    ///
    /// Delivery never waits on a subscriber: members whose queue is full or
    /// closed are evicted from the group and their eviction signal fires.
    /// Returns the number of members the message was queued for.
    pub fn broadcast(&self, kit: &str, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        let mut evicted = 0;

        if let Some(mut group) = self.groups.get_mut(kit) {
            group.retain(|id, member| match member.sender.try_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    let error = DeliveryError::from(e);
                    tracing::warn!(
                        connection_id = %id,
                        kit = %kit,
                        error = %error,
                        "Dropping subscriber after failed delivery"
                    );
                    member.evicted.notify_one();
                    evicted += 1;
                    false
                }
            });
        }

        if evicted > 0 {
            self.groups.remove_if(kit, |_, group| group.is_empty());
        }

        tracing::trace!(kit = %kit, subscribers = delivered, "Broadcast measurement");
        delivered
    }

    /// Get the current connection count
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of non-empty groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Get the member count of a kit's group
    pub fn group_size(&self, kit: &str) -> usize {
        self.groups.get(kit).map(|g| g.len()).unwrap_or(0)
    }

    /// Check whether a connection is in a kit's group
    pub fn is_member(&self, kit: &str, id: ConnectionId) -> bool {
        self.groups
            .get(kit)
            .map(|g| g.contains_key(&id))
            .unwrap_or(false)
    }
}
