//! Connection registry shared across accept loops.

use super::client::ClientConnection;
use super::ConnectionId;
use proximity_core::UserId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Thread-safe registry of active client connections.
///
/// Connection state lives behind an `Arc<RwLock<HashMap>>`; every accept
/// loop and connection handler shares one manager.
pub struct ConnectionManager {
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,
    next_id: AtomicUsize,
}

impl ConnectionManager {
    /// Creates an empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers a new connection and returns its ID.
    pub async fn add(&self, remote_addr: SocketAddr) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, ClientConnection::new(remote_addr));
        debug!(connection_id, %remote_addr, "connection registered");
        connection_id
    }

    /// Binds a user ID to a connection once known.
    pub async fn bind_user(&self, connection_id: ConnectionId, user_id: UserId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&connection_id) {
            Some(connection) => {
                connection.user_id = Some(user_id);
                true
            }
            None => false,
        }
    }

    /// The user bound to a connection, if any.
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).and_then(|c| c.user_id)
    }

    /// Removes a connection, returning its final state.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<ClientConnection> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&connection_id);
        if removed.is_some() {
            debug!(connection_id, "connection removed");
        }
        removed
    }

    /// Number of active connections.
    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
