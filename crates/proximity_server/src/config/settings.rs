//! Configuration settings structures
//!
//! This module defines all the configuration structures used by the gateway,
//! including server settings and the proximity service tunables.

use proximity_core::ProximityConfig;
use serde::{Deserialize, Serialize};

/// Main configuration structure
///
/// This is the root configuration object that contains all server settings.
/// It can be serialized to/from TOML format for configuration files.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Server-specific settings
    pub server: ServerSettings,
    /// Proximity service tunables (TTLs, radii, limits, debounce)
    #[serde(default)]
    pub proximity: ProximityConfig,
}

/// Server configuration settings
///
/// Contains core gateway parameters like network address and connection
/// limits.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerSettings {
    /// Network address to bind the server to
    ///
    /// Format: "IP:PORT" (e.g., "127.0.0.1:8080" for localhost,
    /// "0.0.0.0:8080" for all interfaces)
    pub listen_addr: String,

    /// Maximum number of concurrent client connections
    ///
    /// This limit helps control server resource usage and maintains
    /// performance under load.
    pub max_connections: usize,

    /// Enable SO_REUSEPORT and one accept loop per CPU core
    ///
    /// Improves accept throughput under high connection churn; leave off
    /// for development.
    pub use_reuse_port: bool,
}

impl Default for Config {
    /// Create a default configuration suitable for development
    ///
    /// This provides sensible defaults that work out of the box
    /// for local development and testing.
    fn default() -> Self {
        Self {
            server: ServerSettings {
                listen_addr: "127.0.0.1:8080".to_string(),
                max_connections: 1000,
                use_reuse_port: false,
            },
            proximity: ProximityConfig::default(),
        }
    }
}
