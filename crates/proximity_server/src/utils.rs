//! Factory helpers for constructing the gateway.

use crate::config::ServerConfig;
use crate::server::ProximityServer;

/// Creates a gateway with default configuration.
///
/// Suitable for tests and local experiments; production deployments should
/// load configuration through [`crate::config::load_config`].
pub fn create_server() -> ProximityServer {
    ProximityServer::new(ServerConfig::default())
}

/// Creates a gateway with the given configuration.
pub fn create_server_with_config(config: ServerConfig) -> ProximityServer {
    ProximityServer::new(config)
}
