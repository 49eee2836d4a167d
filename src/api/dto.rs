//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "saturated"
    pub status: String,
    /// Open WebSocket connections
    pub connections: usize,
    /// Kits with at least one subscriber
    pub groups: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}
