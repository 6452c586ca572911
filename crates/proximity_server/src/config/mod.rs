//! Configuration module for the proximity gateway
//!
//! This module handles command-line arguments, configuration file parsing,
//! and provides default settings for the server.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, ServerSettings};

use anyhow::Result;
use proximity_core::ProximityConfig;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Resolved runtime configuration handed to the server.
///
/// Built from the TOML [`Config`] with CLI overrides applied; the raw
/// settings structs never leave the config module.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the gateway binds to
    pub bind_address: SocketAddr,
    /// Maximum concurrent client connections
    pub max_connections: usize,
    /// Enable SO_REUSEPORT multi-acceptor scaling
    pub use_reuse_port: bool,
    /// Proximity service tunables
    pub proximity: ProximityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("static default address"),
            max_connections: 1000,
            use_reuse_port: false,
            proximity: ProximityConfig::default(),
        }
    }
}

/// Load configuration from file or create default configuration
///
/// This function attempts to load configuration from the specified file.
/// If the file doesn't exist, it creates a default configuration file
/// and returns the default settings.
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(args: &Args) -> Result<Config> {
    if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        Ok(default_config)
    }
}

/// Apply CLI overrides on top of the file configuration.
pub fn resolve_server_config(config: &Config, args: &Args) -> Result<ServerConfig> {
    let bind_address = args
        .listen
        .as_deref()
        .unwrap_or(&config.server.listen_addr)
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse listen address: {}", e))?;

    Ok(ServerConfig {
        bind_address,
        max_connections: args.max_connections.unwrap_or(config.server.max_connections),
        use_reuse_port: config.server.use_reuse_port,
        proximity: config.proximity.clone(),
    })
}
