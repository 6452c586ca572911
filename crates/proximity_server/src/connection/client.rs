//! Client connection representation and management.
//!
//! This module defines the structure and behavior of individual client
//! connections, tracking their state and metadata.

use proximity_core::UserId;
use std::net::SocketAddr;
use std::time::SystemTime;

/// Represents an individual client connection to the server.
///
/// This structure tracks the essential information about a connected client,
/// including the user ID bound after registration or first authenticated
/// request, the network address, and connection timing.
#[derive(Debug)]
pub struct ClientConnection {
    /// The user ID bound to this connection (None until the client
    /// registers or issues a request carrying one)
    pub user_id: Option<UserId>,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,
}

impl ClientConnection {
    /// Creates a new client connection with the specified remote address.
    ///
    /// The connection starts without a user ID bound and records the
    /// current time as the connection timestamp.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            user_id: None,
            remote_addr,
            connected_at: SystemTime::now(),
        }
    }
}
