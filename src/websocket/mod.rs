//! WebSocket Measurement Streaming
//!
//! Kits publish measurements over a WebSocket and the persons owning them
//! receive those measurements in real time.
//!
//! ## Architecture
//!
//! - **Authenticator**: Resolves the connection's principal from its token
//! - **Session**: Per-connection identity, with a write-once kit field
//! - **SubscriptionRegistry**: Per-kit subscription groups and fan-out.
//!   A subscriber that cannot keep up is dropped and its socket closed
//! - **Subscribe/Publish**: Message handlers for the two endpoints
//! - **Handler**: Handles WebSocket upgrade and the connection lifecycle
//!
//! ## Usage
//!
//! Credentials go in the `token` query parameter (or an `Authorization`
//! header). Owners subscribe on `/ws/measurements/subscribe`:
//!
//! ```text
//! > {"kit": "kit42"}
//! < {"action": "subscribe", "kit": "kit42"}
//! < {"id": 1, "sensor_type": 1, "date_time": "2024-03-01T12:00:00Z", "value": 21.5}
//! ```
//!
//! Kits publish on `/ws/measurements/publish`:
//!
//! ```text
//! > {"measurement": {"sensor_type": 1, "date_time": "2024-03-01T12:00:00Z", "value": 21.5}}
//! < {"success": "published"}
//! ```

mod authenticator;
mod handler;
mod messages;
mod publish;
mod registry;
mod session;
mod subscribe;

pub use authenticator::{authenticate, extract_credential, ConnectParams};
pub use handler::{handle_text, publish_handler, subscribe_handler, Endpoint};
pub use messages::{HandlerError, ServerMessage};
pub use publish::handle_publish;
pub use registry::{ConnectionId, DeliveryError, HubError, SubscriptionRegistry};
pub use session::{Connection, Session};
pub use subscribe::handle_subscribe;
