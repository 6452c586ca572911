//! # Proximity Gateway - WebSocket Front End
//!
//! A production-ready gateway exposing the proximity service over
//! WebSockets. The gateway contains **no proximity logic** of its own; it
//! only provides infrastructure:
//!
//! * **WebSocket connection management** - Handles client connections and
//!   message routing
//! * **Request dispatch** - JSON tagged-union requests routed onto the
//!   service facade
//! * **Watch event streaming** - Incremental join/move/leave updates pushed
//!   over the originating connection
//! * **Multi-threaded networking** - Scalable accept loops for
//!   high-connection-churn operation
//!
//! ## Message Flow
//!
//! 1. Client sends a JSON request with an `action` tag (`register`,
//!    `report_location`, `find_nearby`, `watch`, `unwatch`)
//! 2. The router dispatches onto [`proximity_core::ProximityService`]
//! 3. The direct response is written back on the same connection
//! 4. Watch events arrive asynchronously as `watch_event` messages until
//!    the watch is released or the connection closes
//!
//! ## Connection Lifecycle
//!
//! Watches are the only per-client server-side state. They are released on
//! explicit `unwatch`, when the watch's event receiver is dropped, and
//! unconditionally when the connection closes; a disconnected client leaks
//! nothing.
//!
//! ## Thread Safety
//!
//! Connection state lives behind `Arc<RwLock<HashMap>>`; the proximity
//! service shards its own locks internally. Accept loops, handler tasks and
//! the maintenance task coordinate shutdown through one broadcast channel.

// Re-export core types and functions for easy access
pub use config::ServerConfig;
pub use error::ServerError;
pub use server::ProximityServer;
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod server;
pub mod shutdown;
pub mod utils;

// Internal modules (not part of public API)
mod connection;
