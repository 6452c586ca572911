//! Core proximity server implementation.
//!
//! This module contains the main `ProximityServer` struct and its
//! implementation, providing the central orchestration of the gateway:
//! listener setup, accept loops, the shared proximity service and its
//! background maintenance, and graceful shutdown.

use crate::{
    config::ServerConfig, connection::ConnectionManager, error::ServerError,
    server::handlers::handle_connection,
};
use futures::stream::{FuturesUnordered, StreamExt as FuturesStreamExt};
use proximity_core::ProximityService;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly", target_os = "macos"))]
use std::os::fd::AsRawFd;

/// The core gateway structure.
///
/// `ProximityServer` owns the shared [`ProximityService`] and the network
/// front end: WebSocket accept loops, per-connection handler tasks, and the
/// shutdown channel tying everything together.
///
/// # Architecture
///
/// * **Proximity Service**: spatial index, presence registry, queries and
///   watches, plus the background maintenance task
/// * **Connection Management**: WebSocket connection lifecycle and user
///   binding
/// * **Multi-threaded Networking**: configurable accept loop scaling via
///   SO_REUSEPORT
pub struct ProximityServer {
    /// Server configuration settings
    config: ServerConfig,

    /// The shared proximity service
    service: Arc<ProximityService>,

    /// Manager for client connections
    connection_manager: Arc<ConnectionManager>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl ProximityServer {
    /// Creates a new gateway with the specified configuration.
    ///
    /// Initializes the proximity service stack and connection management.
    /// The server is ready to start after construction.
    pub fn new(config: ServerConfig) -> Self {
        let service = ProximityService::new(config.proximity.clone());
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            service,
            connection_manager,
            shutdown_sender,
        }
    }

    /// Starts the gateway and begins accepting connections.
    ///
    /// # Startup Sequence
    ///
    /// 1. Spawn the service maintenance task (expiry, watch recomputation,
    ///    reconciliation)
    /// 2. Create TCP listeners (potentially multiple with SO_REUSEPORT)
    /// 3. Run accept loops until a shutdown signal arrives
    /// 4. Stop maintenance and report final statistics
    ///
    /// # Multi-threading
    ///
    /// If `use_reuse_port` is enabled in configuration, the server creates
    /// one accept loop per CPU core for improved performance under high
    /// connection churn.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting proximity gateway on {}", self.config.bind_address);

        let maintenance = self
            .service
            .spawn_maintenance(self.shutdown_sender.subscribe());
        info!(
            "🕒 Maintenance task started (interval: {}ms)",
            self.service.config().maintenance_interval_ms
        );

        // Determine number of accept loops based on configuration
        let core_count = num_cpus::get();
        let num_acceptors = if self.config.use_reuse_port {
            core_count
        } else {
            1
        };
        info!(
            "🧠 Detected {} CPU cores, using {} acceptor(s)",
            core_count, num_acceptors
        );

        // Create TCP listeners
        let mut listeners = Vec::new();
        for i in 0..num_acceptors {
            let listener = self.create_listener()?;
            listeners.push(listener);
            info!("✅ Listener {} bound on {}", i, self.config.bind_address);
        }

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        // Create futures for all accept loops
        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let connection_manager = self.connection_manager.clone();
                let service = self.service.clone();
                let max_connections = self.config.max_connections;
                let shutdown_sender = self.shutdown_sender.clone();

                async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                if connection_manager.count().await >= max_connections {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    drop(stream);
                                    continue;
                                }

                                let connection_manager = connection_manager.clone();
                                let service = service.clone();
                                let shutdown = shutdown_sender.subscribe();

                                // Spawn individual connection handler
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(
                                        stream,
                                        addr,
                                        connection_manager,
                                        service,
                                        shutdown,
                                    )
                                    .await
                                    {
                                        error!("Connection error: {:?}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        // Run until shutdown
        tokio::select! {
            _ = accept_futures.next() => {} // Accept loop(s) run until error or shutdown
            _ = shutdown_receiver.recv() => {
                info!("Shutdown signal received");
            }
        }

        // Server shutdown cleanup
        info!("🧹 Performing server cleanup...");
        // Covers the accept-loop-error exit path, where no shutdown signal
        // was broadcast yet.
        let _ = self.shutdown_sender.send(());
        if timeout(Duration::from_secs(5), maintenance).await.is_err() {
            warn!("Maintenance task did not stop in time");
        }
        let stats = self.service.stats();
        info!(
            "📊 Final state: {} registry entries, {} indexed, {} watches",
            stats.registry_entries, stats.indexed_users, stats.active_watches
        );
        info!("✅ Server cleanup completed");

        info!("Server stopped");
        Ok(())
    }

    /// Initiates server shutdown.
    ///
    /// Signals all server components to begin graceful shutdown, including
    /// accept loops, connection handlers and the maintenance task.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Gets the shared proximity service.
    ///
    /// Provides access to the service facade for tests and embedders that
    /// drive the service without the network front end.
    pub fn get_service(&self) -> Arc<ProximityService> {
        self.service.clone()
    }

    /// Gets the connection manager.
    pub fn get_connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    /// Builds one listening socket, with SO_REUSEPORT applied when the
    /// multi-acceptor configuration asks for it.
    fn create_listener(&self) -> Result<TcpListener, ServerError> {
        let socket = Socket::new(
            Domain::for_address(self.config.bind_address),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        if self.config.use_reuse_port {
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly", target_os = "macos"))]
            {
                let sockfd = socket.as_raw_fd();
                let optval: libc::c_int = 1;
                let ret = unsafe {
                    libc::setsockopt(
                        sockfd,
                        libc::SOL_SOCKET,
                        libc::SO_REUSEPORT,
                        &optval as *const _ as *const libc::c_void,
                        std::mem::size_of_val(&optval) as libc::socklen_t,
                    )
                };
                if ret != 0 {
                    warn!("Failed to set SO_REUSEPORT: {}", std::io::Error::last_os_error());
                } else {
                    info!("SO_REUSEPORT enabled for load balancing across acceptor threads");
                }
            }
            #[cfg(target_os = "windows")]
            {
                warn!("SO_REUSEPORT is not supported on Windows. Using SO_REUSEADDR only.");
            }
            #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly", target_os = "macos", target_os = "windows")))]
            {
                warn!("SO_REUSEPORT support unknown for this platform");
            }
        }

        socket
            .bind(&self.config.bind_address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(65535)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true).ok();

        TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
    }
}
