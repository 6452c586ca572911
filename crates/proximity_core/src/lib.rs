//! # Proximity Core
//!
//! The core of a real-time geospatial proximity service: many clients report
//! their position continuously, and the service answers "who is near me"
//! with low latency while pushing incremental join/move/leave updates to
//! standing watches.
//!
//! ## Architecture Overview
//!
//! ```text
//! location reports ──> IngestionPipeline ──> PresenceRegistry ──┐
//!                        (validate,            (lifecycle,       │ mirrors
//!                         rate limit)           source of truth) │ coordinates
//!                                                                ▼
//!                                                             GeoGrid
//!                                                         (spatial index)
//!                                                                │
//!                        QueryEngine <───────────────────────────┘
//!                      (coarse+fine filter, join, order, cap)
//!                                │
//!                          WatchManager
//!                   (debounced diff -> joined/moved/left)
//! ```
//!
//! ## Core Components
//!
//! - [`spatial::GeoGrid`] - Concurrent geographic grid with radius queries
//! - [`presence::PresenceRegistry`] - Live users, profiles, TTL lifecycle
//! - [`ingest::IngestionPipeline`] - Validation and per-user rate limiting
//! - [`query::QueryEngine`] - Nearest-first nearby queries
//! - [`watch::WatchManager`] - Incremental region subscriptions
//! - [`service::ProximityService`] - Facade wiring it all together, plus the
//!   background maintenance task (expiry, recomputation, reconciliation)
//!
//! ## Concurrency Model
//!
//! The spatial index and presence registry are the only shared mutable
//! state. Both shard their locks (per cell, per entry), writes to a single
//! user are serialized through the registry's entry lock, and queries take
//! per-cell snapshots instead of a global lock. The maintenance sweep
//! processes bounded batches and yields between them so ingestion is never
//! starved.

pub mod config;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod presence;
pub mod query;
pub mod service;
pub mod spatial;
pub mod types;
pub mod utils;
pub mod watch;

// Re-export the types most callers need at the crate root.
pub use config::ProximityConfig;
pub use error::{ProximityError, RejectReason, ReportOutcome, Result};
pub use service::{ProximityService, ServiceStats};
pub use types::{
    GenderCategory, GeoPosition, NearbyUser, PresenceEntry, PresenceState, ProfileSnapshot,
    UserId, UserPosition, WatchId,
};
pub use utils::current_timestamp_ms;
pub use watch::{WatchEvent, WatchEventKind};
