//! # Kitstream
//!
//! Real-time measurement streaming for sensor kits. Kits publish
//! measurements over a WebSocket; the persons owning a kit subscribe to
//! it and receive each measurement as it arrives.
//!
//! ## Modules
//!
//! - [`auth`]: Principals and JWT bearer token verification
//! - [`directory`]: Kit lookups and ownership checks
//! - [`measurement`]: Measurement validation against known sensor types
//! - [`websocket`]: Subscription groups and the subscribe/publish endpoints
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod measurement;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{AuthError, JwtAuth, KitId, Principal, TokenVerifier};

pub use config::{
    AuthConfig, Config, ConfigError, ConfigReport, DirectoryConfig, HubConfig, LoggingConfig,
    ServerConfig,
};

pub use directory::{DirectoryError, InMemoryDirectory, Kit, KitDirectory};

pub use measurement::{
    MeasurementValidator, SensorCatalog, SensorType, ValidatedMeasurement, ValidationError,
};

pub use websocket::{
    Connection, ConnectionId, DeliveryError, HandlerError, HubError, ServerMessage, Session,
    SubscriptionRegistry,
};
