//! # Presence Registry
//!
//! The source of truth for who is live, where they last were, and what
//! profile to show for them. The spatial index only mirrors coordinates;
//! every mutation of a user's position goes through this registry, which
//! updates both structures while holding the user's entry lock so writes to
//! the same user never interleave.
//!
//! Lifecycle: `register` creates a `Pending` entry with no position. The
//! first accepted location report makes it `Active` and indexed. An entry
//! with no accepted report inside the TTL becomes `Expired` and leaves the
//! index immediately; once the grace period has also elapsed the entry is
//! purged entirely, bounding memory. Expiry runs in bounded batches so the
//! sweep never starves foreground ingestion.

use crate::config::ProximityConfig;
use crate::error::{ProximityError, RejectReason, ReportOutcome, Result};
use crate::spatial::GeoGrid;
use crate::types::{
    GenderCategory, GeoPosition, PresenceEntry, PresenceState, ProfileSnapshot, UserId,
    UserPosition, MAX_AGE, MIN_AGE,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one expiry batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirySummary {
    /// Entries transitioned `Active -> Expired` (and removed from the index)
    pub expired: usize,
    /// Entries purged from the registry after the grace period
    pub purged: usize,
    /// Candidates left unprocessed because the batch limit was reached;
    /// the caller should run another batch after yielding
    pub remaining: usize,
}

/// Counters describing registry activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceStats {
    /// Total successful registrations
    pub total_registrations: u64,
    /// Total accepted location reports
    pub total_reports_accepted: u64,
    /// Total reports rejected as stale
    pub total_reports_stale: u64,
    /// Total entries expired
    pub total_expirations: u64,
    /// Total entries purged
    pub total_purges: u64,
}

/// Registry of live users and their presence entries.
pub struct PresenceRegistry {
    config: ProximityConfig,
    entries: DashMap<UserId, PresenceEntry>,
    index: Arc<GeoGrid>,
    registrations: AtomicU64,
    reports_accepted: AtomicU64,
    reports_stale: AtomicU64,
    expirations: AtomicU64,
    purges: AtomicU64,
}

impl PresenceRegistry {
    /// Creates a registry wired to the given spatial index.
    pub fn new(config: ProximityConfig, index: Arc<GeoGrid>) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            index,
            registrations: AtomicU64::new(0),
            reports_accepted: AtomicU64::new(0),
            reports_stale: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        }
    }

    /// Registers a new user, returning the generated profile snapshot.
    ///
    /// The entry starts `Pending`, invisible to queries until the first
    /// accepted location report arrives. Fails with a validation error on an
    /// empty display name or an out-of-range age.
    pub fn register(
        &self,
        display_name: &str,
        age: u8,
        gender: GenderCategory,
        now_ms: u64,
    ) -> Result<ProfileSnapshot> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ProximityError::Validation(
                "display name must not be empty".to_string(),
            ));
        }
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(ProximityError::Validation(format!(
                "age must be between {} and {}, got {}",
                MIN_AGE, MAX_AGE, age
            )));
        }

        let profile = ProfileSnapshot {
            user_id: UserId::new(),
            display_name: display_name.to_string(),
            age,
            gender,
        };
        self.entries.insert(
            profile.user_id,
            PresenceEntry {
                profile: profile.clone(),
                position: None,
                last_seen_ms: now_ms,
                state: PresenceState::Pending,
            },
        );
        self.registrations.fetch_add(1, Ordering::Relaxed);
        debug!(user_id = %profile.user_id, "registered new user");
        Ok(profile)
    }

    /// Applies a location report for a registered user.
    ///
    /// Reports older than the entry's current report are dropped and
    /// surfaced as a stale outcome; they never change stored position.
    /// Accepted reports update the entry and the spatial index while the
    /// entry lock is held, so reports for the same user are serialized and
    /// readers never observe the registry and index disagreeing for longer
    /// than one in-flight update.
    pub fn report_location(
        &self,
        user_id: UserId,
        position: GeoPosition,
        timestamp_ms: u64,
        accuracy_m: Option<f64>,
        now_ms: u64,
    ) -> Result<ReportOutcome> {
        let mut entry = self
            .entries
            .get_mut(&user_id)
            .ok_or(ProximityError::NotRegistered(user_id))?;

        if let Some(current) = &entry.position {
            if timestamp_ms < current.timestamp_ms {
                self.reports_stale.fetch_add(1, Ordering::Relaxed);
                debug!(
                    user_id = %user_id,
                    report_ts = timestamp_ms,
                    current_ts = current.timestamp_ms,
                    "dropping out-of-order report"
                );
                return Ok(ReportOutcome::rejected(RejectReason::Stale));
            }
        }

        entry.position = Some(UserPosition {
            position,
            timestamp_ms,
            accuracy_m,
        });
        entry.last_seen_ms = now_ms;
        entry.state = PresenceState::Active;
        self.index.insert_or_update(user_id, position);
        self.reports_accepted.fetch_add(1, Ordering::Relaxed);
        Ok(ReportOutcome::accepted())
    }

    /// Runs one bounded expiry batch.
    ///
    /// Candidates are collected with per-shard read locks only, then at most
    /// `batch_limit` of them are processed under their individual entry
    /// locks; a nonzero `remaining` tells the caller to yield and call
    /// again. Entries are re-checked under the lock, so a report racing the
    /// sweep wins.
    pub fn expire_stale(&self, now_ms: u64, batch_limit: usize) -> ExpirySummary {
        let ttl = self.config.ttl_ms;
        let purge_after = self.config.ttl_ms + self.config.grace_ms;

        let mut to_expire = Vec::new();
        let mut to_purge = Vec::new();
        for entry in self.entries.iter() {
            let age = now_ms.saturating_sub(entry.last_seen_ms);
            match entry.state {
                PresenceState::Active if age > ttl => to_expire.push(*entry.key()),
                PresenceState::Expired | PresenceState::Pending if age > purge_after => {
                    to_purge.push(*entry.key())
                }
                _ => {}
            }
        }

        let candidates = to_expire.len() + to_purge.len();
        let mut summary = ExpirySummary::default();
        let mut budget = batch_limit;

        for user_id in to_expire {
            if budget == 0 {
                break;
            }
            budget -= 1;
            if self.expire_user(user_id, now_ms) {
                summary.expired += 1;
            }
        }
        for user_id in to_purge {
            if budget == 0 {
                break;
            }
            budget -= 1;
            if self.purge_user(user_id, now_ms) {
                summary.purged += 1;
            }
        }

        summary.remaining = candidates.saturating_sub(batch_limit.min(candidates));
        summary
    }

    /// The full presence entry for a user, or `NotRegistered`.
    pub fn get_snapshot(&self, user_id: UserId) -> Result<PresenceEntry> {
        self.entries
            .get(&user_id)
            .map(|entry| entry.clone())
            .ok_or(ProximityError::NotRegistered(user_id))
    }

    /// Profile for an active user, used by the query join. Entries that
    /// expired between the index read and this call return `None`; the
    /// caller skips them rather than erroring.
    pub fn active_profile(&self, user_id: UserId) -> Option<ProfileSnapshot> {
        self.entries
            .get(&user_id)
            .filter(|entry| entry.is_active())
            .map(|entry| entry.profile.clone())
    }

    /// Current position of an active user. `NotRegistered` for unknown IDs,
    /// `NotFound` for entries that have no queryable position.
    pub fn active_position(&self, user_id: UserId) -> Result<GeoPosition> {
        let entry = self
            .entries
            .get(&user_id)
            .ok_or(ProximityError::NotRegistered(user_id))?;
        match (&entry.position, entry.state) {
            (Some(position), PresenceState::Active) => Ok(position.position),
            _ => Err(ProximityError::NotFound(user_id)),
        }
    }

    /// Snapshot of every active user and their current position, for the
    /// reconciliation sweep.
    pub fn active_users(&self) -> Vec<(UserId, GeoPosition)> {
        self.entries
            .iter()
            .filter(|entry| entry.is_active())
            .filter_map(|entry| entry.position.map(|p| (*entry.key(), p.position)))
            .collect()
    }

    /// Whether the registry holds an `Active` entry for the user.
    pub fn is_active(&self, user_id: UserId) -> bool {
        self.entries
            .get(&user_id)
            .map(|entry| entry.is_active())
            .unwrap_or(false)
    }

    /// Drops a user from the registry and index entirely. Used for internal
    /// invariant recovery: the entry is rebuilt from the user's next valid
    /// report rather than left inconsistent.
    pub fn evict(&self, user_id: UserId) {
        self.entries.remove(&user_id);
        self.index.remove(user_id);
        warn!(user_id = %user_id, "evicted presence entry");
    }

    /// Number of registry entries (any state).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Activity counters since startup.
    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            total_registrations: self.registrations.load(Ordering::Relaxed),
            total_reports_accepted: self.reports_accepted.load(Ordering::Relaxed),
            total_reports_stale: self.reports_stale.load(Ordering::Relaxed),
            total_expirations: self.expirations.load(Ordering::Relaxed),
            total_purges: self.purges.load(Ordering::Relaxed),
        }
    }

    fn expire_user(&self, user_id: UserId, now_ms: u64) -> bool {
        let Some(mut entry) = self.entries.get_mut(&user_id) else {
            return false;
        };
        // Re-check under the entry lock; a fresh report may have won.
        let age = now_ms.saturating_sub(entry.last_seen_ms);
        if entry.state != PresenceState::Active || age <= self.config.ttl_ms {
            return false;
        }
        entry.state = PresenceState::Expired;
        self.index.remove(user_id);
        self.expirations.fetch_add(1, Ordering::Relaxed);
        debug!(user_id = %user_id, "presence expired");
        true
    }

    fn purge_user(&self, user_id: UserId, now_ms: u64) -> bool {
        let purge_after = self.config.ttl_ms + self.config.grace_ms;
        let removed = self
            .entries
            .remove_if(&user_id, |_, entry| {
                entry.state != PresenceState::Active
                    && now_ms.saturating_sub(entry.last_seen_ms) > purge_after
            })
            .is_some();
        if removed {
            // Expired entries are already out of the index; this is a no-op
            // unless an invariant was violated.
            self.index.remove(user_id);
            self.purges.fetch_add(1, Ordering::Relaxed);
            debug!(user_id = %user_id, "presence purged");
        }
        removed
    }
}
