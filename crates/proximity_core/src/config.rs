//! # Service Configuration
//!
//! Tunables for the proximity service. Radius and limit policy, presence
//! TTLs, rate limiting and watch debouncing are configuration, never
//! per-call parameters: callers may ask for less than the configured
//! maxima, never more.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime tunables for the proximity service.
///
/// Embedded in the server's TOML configuration under `[proximity]`; every
/// field has a default suitable for development.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Presence time-to-live in milliseconds. A user with no accepted
    /// report inside this window transitions to `Expired` and leaves the
    /// spatial index.
    pub ttl_ms: u64,

    /// Grace period in milliseconds. Expired entries are purged from the
    /// registry once `ttl_ms + grace_ms` has elapsed since the last report,
    /// bounding memory.
    pub grace_ms: u64,

    /// Radius applied when a query does not specify one, in meters.
    pub default_radius_m: f64,

    /// Upper bound for query and watch radii, in meters. Larger requests
    /// are clamped, not rejected.
    pub max_radius_m: f64,

    /// Minimum interval between accepted reports per user, in milliseconds.
    /// Faster reports are rejected with a rate-limited outcome.
    pub min_report_interval_ms: u64,

    /// Minimum interval between recomputations of a single watch, in
    /// milliseconds. Bounds diff churn under rapid small moves.
    pub watch_debounce_ms: u64,

    /// Result count applied when a query does not specify a limit.
    pub default_limit: usize,

    /// Upper bound for query result counts. Larger requests are clamped.
    pub max_limit: usize,

    /// Grid cell size in degrees. 0.05° is roughly 5.5 km along a meridian,
    /// which keeps a 5 km query inside a handful of cells.
    pub cell_size_deg: f64,

    /// Maximum number of concurrent watches per user.
    pub max_watches_per_user: usize,

    /// Interval of the background maintenance tick (expiry + watch
    /// recomputation), in milliseconds. TTL/2 by default.
    pub maintenance_interval_ms: u64,

    /// Run the index/registry reconciliation sweep every N maintenance
    /// ticks.
    pub reconcile_every_ticks: u32,

    /// Number of registry entries examined per expiry batch before the
    /// sweep yields to foreground work.
    pub expiry_batch_size: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            grace_ms: 30_000,
            default_radius_m: 1_000.0,
            max_radius_m: 5_000.0,
            min_report_interval_ms: 1_000,
            watch_debounce_ms: 2_000,
            default_limit: 50,
            max_limit: 200,
            cell_size_deg: 0.05,
            max_watches_per_user: 8,
            maintenance_interval_ms: 15_000,
            reconcile_every_ticks: 4,
            expiry_batch_size: 256,
        }
    }
}

impl ProximityConfig {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Maintenance tick interval as a [`Duration`].
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    /// Clamps an optional requested radius to policy.
    pub fn effective_radius(&self, requested: Option<f64>) -> f64 {
        requested
            .unwrap_or(self.default_radius_m)
            .clamp(0.0, self.max_radius_m)
    }

    /// Clamps an optional requested result limit to policy.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = ProximityConfig::default();
        assert_eq!(config.ttl_ms, 30_000);
        assert_eq!(config.grace_ms, 30_000);
        assert_eq!(config.max_radius_m, 5_000.0);
        assert_eq!(config.default_limit, 50);
        assert!(config.maintenance_interval_ms <= config.ttl_ms / 2);
    }

    #[test]
    fn test_radius_clamping() {
        let config = ProximityConfig::default();
        assert_eq!(config.effective_radius(None), 1_000.0);
        assert_eq!(config.effective_radius(Some(250.0)), 250.0);
        assert_eq!(config.effective_radius(Some(50_000.0)), 5_000.0);
        assert_eq!(config.effective_radius(Some(-5.0)), 0.0);
    }

    #[test]
    fn test_limit_clamping() {
        let config = ProximityConfig::default();
        assert_eq!(config.effective_limit(None), 50);
        assert_eq!(config.effective_limit(Some(10)), 10);
        assert_eq!(config.effective_limit(Some(10_000)), 200);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: ProximityConfig = toml::from_str("ttl_ms = 10000").unwrap();
        assert_eq!(parsed.ttl_ms, 10_000);
        assert_eq!(parsed.grace_ms, 30_000);
    }
}
