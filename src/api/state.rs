//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{JwtAuth, TokenVerifier};
use crate::config::{Config, HubConfig};
use crate::directory::{InMemoryDirectory, KitDirectory};
use crate::measurement::{MeasurementValidator, SensorCatalog};
use crate::websocket::SubscriptionRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Subscription groups and live connections
    pub registry: Arc<SubscriptionRegistry>,
    /// Resolves connection credentials
    pub verifier: Arc<dyn TokenVerifier>,
    /// Kit lookups and ownership checks
    pub directory: Arc<dyn KitDirectory>,
    /// Measurement validation
    pub validator: Arc<dyn MeasurementValidator>,
    /// Hub limits
    pub hub_config: HubConfig,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        directory: Arc<dyn KitDirectory>,
        validator: Arc<dyn MeasurementValidator>,
        hub_config: HubConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new(&hub_config)),
            verifier,
            directory,
            validator,
            hub_config,
            start_time: Instant::now(),
        }
    }

    /// Build state from configuration using the in-memory collaborators
    pub fn from_config(config: &Config) -> Self {
        let directory: Arc<dyn KitDirectory> =
            Arc::new(InMemoryDirectory::from_config(&config.directory));
        let verifier = Arc::new(JwtAuth::from_config(&config.auth, Arc::clone(&directory)));
        let validator = Arc::new(SensorCatalog::new(config.sensors.iter().cloned()));

        Self::new(verifier, directory, validator, config.hub.clone())
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether another connection can be accepted
    pub fn has_capacity(&self) -> bool {
        self.registry.connection_count() < self.hub_config.max_connections
    }
}
