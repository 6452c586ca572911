//! Message type definitions for client-server communication.
//!
//! This module defines the structure of messages exchanged between clients
//! and the server. The operation set is closed (register, report, query,
//! watch, unwatch), so requests and responses are tagged unions rather than
//! free-form envelopes.

use proximity_core::{GenderCategory, NearbyUser, RejectReason, UserId, WatchEventKind, WatchId};
use serde::{Deserialize, Serialize};

/// A message sent from a client to the server.
///
/// # Example
///
/// ```json
/// { "action": "report_location",
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "latitude": 52.52, "longitude": 13.405,
///   "timestamp_ms": 1723550000000 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Create a profile; the server answers with the generated user ID
    Register {
        display_name: String,
        age: u8,
        gender: GenderCategory,
    },
    /// Report the client's current position
    ReportLocation {
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        timestamp_ms: u64,
        #[serde(default)]
        accuracy_m: Option<f64>,
    },
    /// One-shot nearby query
    FindNearby {
        user_id: UserId,
        #[serde(default)]
        radius_m: Option<f64>,
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Register a standing watch over a region
    Watch {
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        radius_m: Option<f64>,
    },
    /// Release a previously created watch
    Unwatch { watch_id: WatchId },
}

/// One entry of a nearby-query response, flattened for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUserEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub age: u8,
    pub gender: GenderCategory,
    pub distance_m: f64,
}

impl From<NearbyUser> for NearbyUserEntry {
    fn from(user: NearbyUser) -> Self {
        Self {
            user_id: user.profile.user_id,
            display_name: user.profile.display_name,
            age: user.profile.age,
            gender: user.profile.gender,
            distance_m: user.distance_m,
        }
    }
}

/// Machine-readable error category mirrored from the core taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request payload
    BadRequest,
    /// Input failed validation
    Validation,
    /// Unknown user ID
    NotRegistered,
    /// Entity exists but has no queryable state
    NotFound,
    /// Server-side failure
    Internal,
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration succeeded
    Registered { user_id: UserId },
    /// Outcome of a location report; `accepted: false` carries the reason
    ReportAck {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<RejectReason>,
    },
    /// Nearby query result, nearest first
    Nearby { users: Vec<NearbyUserEntry> },
    /// Watch registered; events follow on the same connection
    WatchCreated { watch_id: WatchId },
    /// Watch released
    Unwatched { watch_id: WatchId, released: bool },
    /// Incremental watch update
    WatchEvent {
        watch_id: WatchId,
        event: WatchEventKind,
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance_m: Option<f64>,
    },
    /// Request failed
    Error { code: ErrorCode, message: String },
}
