//! Proximity Gateway - Main Entry Point
//!
//! A real-time geospatial proximity gateway: clients report their position
//! over WebSockets and receive nearby-user queries and incremental watch
//! updates, with configurable TTLs and graceful shutdown handling.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing::{error, info};

use proximity_server::{
    config::{self, Args, ServerConfig},
    logging, shutdown, ProximityServer,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let startup_start = Instant::now();

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging system
    if let Err(e) = logging::setup_logging(&args) {
        error!("Failed to initialize logging: {}", e);
        return Err(anyhow::anyhow!("Failed to initialize logging: {}", e));
    }

    // Log startup information
    info!("Starting Proximity Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::load_config(&args)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    info!("Configuration loaded from: {}", args.config.display());

    // Apply CLI overrides
    let server_config = config::resolve_server_config(&config, &args)?;

    // Initialize the gateway
    let server = ProximityServer::new(server_config.clone());

    // Setup shutdown handler
    let shutdown_receiver = shutdown::setup_shutdown_handler().await;

    // Log final server configuration
    log_server_configuration(&server_config);

    info!("Startup complete in {:.2?}", startup_start.elapsed());

    // Run the server and wait for shutdown
    tokio::select! {
        result = server.start() => {
            match result {
                Ok(_) => info!("Server stopped normally"),
                Err(e) => {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
        }
        _ = shutdown_receiver => {
            let shutdown_start = Instant::now();
            info!("Shutdown signal received");
            if let Err(e) = server.shutdown().await {
                error!("Error during shutdown: {}", e);
            }
            info!("Server shutdown completed in {:.2?}", shutdown_start.elapsed());
        }
    }

    Ok(())
}

/// Log the final server configuration
fn log_server_configuration(config: &ServerConfig) {
    info!("Server configuration:");
    info!("  Listen address: {}", config.bind_address);
    info!("  Max connections: {}", config.max_connections);
    info!("  Reuse port: {}", config.use_reuse_port);
    info!("  Presence TTL: {}ms (grace {}ms)", config.proximity.ttl_ms, config.proximity.grace_ms);
    info!(
        "  Radius policy: default {}m, max {}m",
        config.proximity.default_radius_m, config.proximity.max_radius_m
    );
    info!(
        "  Watch debounce: {}ms, result limit: {} (max {})",
        config.proximity.watch_debounce_ms,
        config.proximity.default_limit,
        config.proximity.max_limit
    );
}
