//! # Update Ingestion Pipeline
//!
//! Front door for location reports. Validates coordinate ranges, applies the
//! per-user minimum report interval, and only then hands the report to the
//! presence registry. Every rejection is a status the caller can see; a
//! dropped report is never silent.

use crate::config::ProximityConfig;
use crate::error::{ProximityError, RejectReason, ReportOutcome, Result};
use crate::presence::PresenceRegistry;
use crate::types::{GeoPosition, UserId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counters describing ingestion activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Reports accepted and applied
    pub total_accepted: u64,
    /// Reports rejected by the per-user rate limit
    pub total_rate_limited: u64,
    /// Reports rejected with invalid coordinates or accuracy
    pub total_invalid: u64,
}

/// Validating, rate-limiting front end over the presence registry.
pub struct IngestionPipeline {
    config: ProximityConfig,
    registry: Arc<PresenceRegistry>,
    /// Server-clock time of the last accepted report per user
    last_accepted_ms: DashMap<UserId, u64>,
    accepted: AtomicU64,
    rate_limited: AtomicU64,
    invalid: AtomicU64,
}

impl IngestionPipeline {
    /// Creates a pipeline delegating to the given registry.
    pub fn new(config: ProximityConfig, registry: Arc<PresenceRegistry>) -> Self {
        Self {
            config,
            registry,
            last_accepted_ms: DashMap::new(),
            accepted: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
        }
    }

    /// Submits one location report.
    ///
    /// Returns `Err` for malformed input or unknown users, and an
    /// `accepted: false` outcome for reports dropped by policy (stale
    /// timestamp, rate limit). At most one report per user is accepted per
    /// configured minimum interval, bounding write amplification.
    pub fn submit(
        &self,
        user_id: UserId,
        position: GeoPosition,
        timestamp_ms: u64,
        accuracy_m: Option<f64>,
        now_ms: u64,
    ) -> Result<ReportOutcome> {
        if !position.is_valid() {
            self.invalid.fetch_add(1, Ordering::Relaxed);
            return Err(ProximityError::Validation(format!(
                "coordinates out of range: ({}, {})",
                position.latitude, position.longitude
            )));
        }
        if let Some(accuracy) = accuracy_m {
            if !accuracy.is_finite() || accuracy < 0.0 {
                self.invalid.fetch_add(1, Ordering::Relaxed);
                return Err(ProximityError::Validation(format!(
                    "accuracy must be a non-negative number of meters, got {}",
                    accuracy
                )));
            }
        }

        if let Some(last) = self.last_accepted_ms.get(&user_id) {
            if now_ms.saturating_sub(*last) < self.config.min_report_interval_ms {
                drop(last);
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
                debug!(user_id = %user_id, "report rejected by rate limit");
                return Ok(ReportOutcome::rejected(RejectReason::RateLimited));
            }
        }

        let outcome =
            self.registry
                .report_location(user_id, position, timestamp_ms, accuracy_m, now_ms)?;
        if outcome.accepted {
            self.last_accepted_ms.insert(user_id, now_ms);
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Drops rate-limiter entries that have been idle long enough to be
    /// irrelevant. Called from the maintenance loop so the map does not
    /// outlive the users it tracked.
    pub fn prune(&self, now_ms: u64) {
        let idle_after = self.config.ttl_ms + self.config.grace_ms;
        self.last_accepted_ms
            .retain(|_, last| now_ms.saturating_sub(*last) <= idle_after);
    }

    /// Activity counters since startup.
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            total_accepted: self.accepted.load(Ordering::Relaxed),
            total_rate_limited: self.rate_limited.load(Ordering::Relaxed),
            total_invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::GeoGrid;
    use crate::types::GenderCategory;

    fn pipeline() -> (IngestionPipeline, Arc<PresenceRegistry>) {
        let config = ProximityConfig::default();
        let index = Arc::new(GeoGrid::new(config.cell_size_deg));
        let registry = Arc::new(PresenceRegistry::new(config.clone(), index));
        (
            IngestionPipeline::new(config, registry.clone()),
            registry,
        )
    }

    fn pos(lat: f64, lon: f64) -> GeoPosition {
        GeoPosition::new(lat, lon)
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let (pipeline, registry) = pipeline();
        let profile = registry
            .register("Alex", 25, GenderCategory::Male, 0)
            .unwrap();

        let err = pipeline
            .submit(profile.user_id, pos(91.0, 0.0), 1, None, 1_000)
            .unwrap_err();
        assert!(matches!(err, ProximityError::Validation(_)));
        assert_eq!(pipeline.stats().total_invalid, 1);
    }

    #[test]
    fn test_negative_accuracy_rejected() {
        let (pipeline, registry) = pipeline();
        let profile = registry
            .register("Alex", 25, GenderCategory::Male, 0)
            .unwrap();

        let err = pipeline
            .submit(profile.user_id, pos(10.0, 10.0), 1, Some(-3.0), 1_000)
            .unwrap_err();
        assert!(matches!(err, ProximityError::Validation(_)));
    }

    #[test]
    fn test_rate_limit_enforces_min_interval() {
        let (pipeline, registry) = pipeline();
        let interval = pipeline.config.min_report_interval_ms;
        let profile = registry
            .register("Jamie", 29, GenderCategory::Female, 0)
            .unwrap();

        let first = pipeline
            .submit(profile.user_id, pos(10.0, 10.0), 1, None, 1_000)
            .unwrap();
        assert!(first.accepted);

        let too_fast = pipeline
            .submit(profile.user_id, pos(10.1, 10.1), 2, None, 1_000 + interval - 1)
            .unwrap();
        assert!(!too_fast.accepted);
        assert_eq!(too_fast.reason, Some(RejectReason::RateLimited));
        // The rejected report must not have touched stored state.
        assert_eq!(
            registry.active_position(profile.user_id).unwrap(),
            pos(10.0, 10.0)
        );

        let after_interval = pipeline
            .submit(profile.user_id, pos(10.1, 10.1), 3, None, 1_000 + interval)
            .unwrap();
        assert!(after_interval.accepted);
    }

    #[test]
    fn test_stale_outcome_propagates_without_consuming_rate_budget() {
        let (pipeline, registry) = pipeline();
        let interval = pipeline.config.min_report_interval_ms;
        let profile = registry
            .register("Taylor", 23, GenderCategory::NonBinary, 0)
            .unwrap();

        pipeline
            .submit(profile.user_id, pos(10.0, 10.0), 100, None, 1_000)
            .unwrap();
        let stale = pipeline
            .submit(profile.user_id, pos(20.0, 20.0), 50, None, 1_000 + interval)
            .unwrap();
        assert!(!stale.accepted);
        assert_eq!(stale.reason, Some(RejectReason::Stale));

        // A fresh report right after the stale one is still accepted: the
        // stale drop did not refresh the rate limiter.
        let fresh = pipeline
            .submit(profile.user_id, pos(20.0, 20.0), 200, None, 1_000 + interval)
            .unwrap();
        assert!(fresh.accepted);
    }

    #[test]
    fn test_unknown_user_surfaces_not_registered() {
        let (pipeline, _) = pipeline();
        let err = pipeline
            .submit(UserId::new(), pos(0.0, 0.0), 1, None, 1_000)
            .unwrap_err();
        assert!(matches!(err, ProximityError::NotRegistered(_)));
    }

    #[test]
    fn test_prune_drops_idle_entries() {
        let (pipeline, registry) = pipeline();
        let profile = registry
            .register("Alex", 25, GenderCategory::Male, 0)
            .unwrap();
        pipeline
            .submit(profile.user_id, pos(1.0, 1.0), 1, None, 1_000)
            .unwrap();
        assert_eq!(pipeline.last_accepted_ms.len(), 1);

        let idle = pipeline.config.ttl_ms + pipeline.config.grace_ms;
        pipeline.prune(1_000 + idle + 1);
        assert_eq!(pipeline.last_accepted_ms.len(), 0);
    }
}
