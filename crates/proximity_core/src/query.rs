//! # Query Engine
//!
//! Answers "who is near me": coarse+fine filtering through the spatial
//! index, a join against the presence registry for profiles, deterministic
//! ordering, and result capping. Entries that expire between the index read
//! and the join are skipped, not errors: the index and registry are allowed
//! to disagree for the duration of one in-flight update.

use crate::config::ProximityConfig;
use crate::error::Result;
use crate::presence::PresenceRegistry;
use crate::spatial::GeoGrid;
use crate::types::{GeoPosition, NearbyUser, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Counters describing query activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Total queries served
    pub total_queries: u64,
    /// Candidates dropped because their registry entry was gone or inactive
    /// by the time of the join
    pub total_join_misses: u64,
}

/// Read path over the spatial index and presence registry.
pub struct QueryEngine {
    config: ProximityConfig,
    index: Arc<GeoGrid>,
    registry: Arc<PresenceRegistry>,
    queries: AtomicU64,
    join_misses: AtomicU64,
}

impl QueryEngine {
    /// Creates a query engine over the given index and registry.
    pub fn new(
        config: ProximityConfig,
        index: Arc<GeoGrid>,
        registry: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            config,
            index,
            registry,
            queries: AtomicU64::new(0),
            join_misses: AtomicU64::new(0),
        }
    }

    /// Nearby users for a registered requester.
    ///
    /// The requester's own position is resolved from the registry
    /// (`NotRegistered` / `NotFound` if they have none), the radius and
    /// limit are clamped to configured policy, and the requester is excluded
    /// from the results by identity.
    pub fn find_nearby(
        &self,
        requester: UserId,
        radius_m: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<NearbyUser>> {
        let center = self.registry.active_position(requester)?;
        let radius_m = self.config.effective_radius(radius_m);
        let limit = self.config.effective_limit(limit);
        Ok(self.find_nearby_at(&center, radius_m, limit, Some(requester)))
    }

    /// Nearby users around an arbitrary point, already clamped by the
    /// caller. Used directly by the watch layer, which owns its own radius
    /// policy.
    pub fn find_nearby_at(
        &self,
        center: &GeoPosition,
        radius_m: f64,
        limit: usize,
        exclude: Option<UserId>,
    ) -> Vec<NearbyUser> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let matches = self.index.query_radius(center, radius_m, exclude);
        let mut results = Vec::with_capacity(matches.len().min(limit));
        for m in matches {
            match self.registry.active_profile(m.user_id) {
                Some(profile) => results.push(NearbyUser {
                    profile,
                    distance_m: m.distance_m,
                }),
                None => {
                    // Expired between index read and join; treat as absent.
                    self.join_misses.fetch_add(1, Ordering::Relaxed);
                    trace!(user_id = %m.user_id, "skipping concurrently expired candidate");
                }
            }
        }

        // Nearest first; ties broken by user ID for determinism.
        results.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
        });
        results.truncate(limit);
        results
    }

    /// Indexed position of a user, if currently indexed. The watch layer
    /// uses this to distinguish a move from standing still.
    pub fn index_position(&self, user_id: UserId) -> Option<GeoPosition> {
        self.index.position_of(user_id)
    }

    /// Activity counters since startup.
    pub fn stats(&self) -> QueryStats {
        QueryStats {
            total_queries: self.queries.load(Ordering::Relaxed),
            total_join_misses: self.join_misses.load(Ordering::Relaxed),
        }
    }
}
