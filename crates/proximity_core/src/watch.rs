//! # Watch Layer
//!
//! Standing interest in a region. Instead of re-polling `find_nearby`, a
//! client registers a watch (center + radius) and receives incremental
//! `joined` / `moved` / `left` events computed by diffing fresh query
//! results against the membership delivered last cycle.
//!
//! Recomputation is debounced per watch so rapid small moves do not thrash
//! subscribers. Watches are the only mutable per-client state the service
//! keeps: they are released explicitly, when the owner disconnects, or
//! lazily once the event receiver has been dropped.

use crate::config::ProximityConfig;
use crate::error::{ProximityError, Result};
use crate::query::QueryEngine;
use crate::types::{GeoPosition, UserId, WatchId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Kind of incremental watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    /// A user entered the watched region
    Joined,
    /// A user already in the region reported a new position
    Moved,
    /// A user left the region (or expired out of it)
    Left,
}

/// One incremental update delivered to a watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// The watch this event belongs to
    pub watch_id: WatchId,
    /// What happened
    pub kind: WatchEventKind,
    /// Who it happened to
    pub user_id: UserId,
    /// Distance from the watch center in meters; absent for `Left`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

/// Counters describing watch activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Watches created
    pub total_created: u64,
    /// Watches released (explicitly, by disconnect, or lazily)
    pub total_released: u64,
    /// Events delivered across all watches
    pub total_events: u64,
}

struct WatchState {
    owner: UserId,
    center: GeoPosition,
    radius_m: f64,
    /// Membership as delivered last cycle: user -> (position, distance)
    members: HashMap<UserId, (GeoPosition, f64)>,
    sender: mpsc::UnboundedSender<WatchEvent>,
    /// Server-clock time of the last recomputation; 0 = never
    last_recompute_ms: u64,
}

/// Registry of active watches and the diff engine feeding them.
pub struct WatchManager {
    config: ProximityConfig,
    query: Arc<QueryEngine>,
    watches: DashMap<WatchId, WatchState>,
    created: AtomicU64,
    released: AtomicU64,
    events: AtomicU64,
}

impl WatchManager {
    /// Creates a watch manager computing diffs through the given engine.
    pub fn new(config: ProximityConfig, query: Arc<QueryEngine>) -> Self {
        Self {
            config,
            query,
            watches: DashMap::new(),
            created: AtomicU64::new(0),
            released: AtomicU64::new(0),
            events: AtomicU64::new(0),
        }
    }

    /// Registers a watch over the region around `center`.
    ///
    /// Returns the watch ID (for explicit release) and the event receiver.
    /// The first recomputation cycle delivers a `joined` event for every
    /// user already inside the region. The per-user watch cap bounds the
    /// state a single client can pin server-side.
    pub fn create_watch(
        &self,
        owner: UserId,
        center: GeoPosition,
        radius_m: Option<f64>,
    ) -> Result<(WatchId, mpsc::UnboundedReceiver<WatchEvent>)> {
        if !center.is_valid() {
            return Err(ProximityError::Validation(format!(
                "watch center out of range: ({}, {})",
                center.latitude, center.longitude
            )));
        }
        let owned = self
            .watches
            .iter()
            .filter(|entry| entry.owner == owner)
            .count();
        if owned >= self.config.max_watches_per_user {
            return Err(ProximityError::Validation(format!(
                "watch limit reached ({} per user)",
                self.config.max_watches_per_user
            )));
        }

        let watch_id = WatchId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.watches.insert(
            watch_id,
            WatchState {
                owner,
                center,
                radius_m: self.config.effective_radius(radius_m),
                members: HashMap::new(),
                sender,
                last_recompute_ms: 0,
            },
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(watch_id = %watch_id, owner = %owner, "watch created");
        Ok((watch_id, receiver))
    }

    /// Releases a single watch. Idempotent; returns whether it existed.
    pub fn release_watch(&self, watch_id: WatchId) -> bool {
        let removed = self.watches.remove(&watch_id).is_some();
        if removed {
            self.released.fetch_add(1, Ordering::Relaxed);
            debug!(watch_id = %watch_id, "watch released");
        }
        removed
    }

    /// Releases every watch owned by a user, e.g. on disconnect. Returns
    /// the number released.
    pub fn release_owned_by(&self, owner: UserId) -> usize {
        let owned: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| *entry.key())
            .collect();
        let mut count = 0;
        for watch_id in owned {
            if self.release_watch(watch_id) {
                count += 1;
            }
        }
        count
    }

    /// Recomputes every watch whose debounce interval has elapsed and
    /// delivers the resulting events. Watches whose receiver has been
    /// dropped are retired here. Returns the number of events delivered.
    pub fn recompute_due(&self, now_ms: u64) -> usize {
        let due: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|entry| {
                entry.last_recompute_ms == 0
                    || now_ms.saturating_sub(entry.last_recompute_ms)
                        >= self.config.watch_debounce_ms
            })
            .map(|entry| *entry.key())
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for watch_id in due {
            let Some(mut watch) = self.watches.get_mut(&watch_id) else {
                continue;
            };
            if watch.sender.is_closed() {
                drop(watch);
                dead.push(watch_id);
                continue;
            }
            let events = self.diff_watch(watch_id, &mut watch, now_ms);
            for event in events {
                if watch.sender.send(event).is_err() {
                    dead.push(watch_id);
                    break;
                }
                delivered += 1;
            }
        }

        for watch_id in dead {
            if self.release_watch(watch_id) {
                debug!(watch_id = %watch_id, "watch retired: receiver dropped");
            }
        }
        self.events.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Number of active watches.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether any watches are active.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Activity counters since startup.
    pub fn stats(&self) -> WatchStats {
        WatchStats {
            total_created: self.created.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            total_events: self.events.load(Ordering::Relaxed),
        }
    }

    /// Runs one query for the watch region and turns the difference against
    /// the previously delivered membership into events. A user entering the
    /// region yields exactly one `joined`; only position changes inside the
    /// region yield `moved`.
    fn diff_watch(
        &self,
        watch_id: WatchId,
        watch: &mut WatchState,
        now_ms: u64,
    ) -> Vec<WatchEvent> {
        let fresh = self.query.find_nearby_at(
            &watch.center,
            watch.radius_m,
            self.config.max_limit,
            Some(watch.owner),
        );

        let mut events = Vec::new();
        let mut next: HashMap<UserId, (GeoPosition, f64)> = HashMap::with_capacity(fresh.len());
        for user in &fresh {
            let user_id = user.profile.user_id;
            let position = self
                .query
                .index_position(user_id)
                .unwrap_or(watch.center);
            match watch.members.get(&user_id) {
                None => events.push(WatchEvent {
                    watch_id,
                    kind: WatchEventKind::Joined,
                    user_id,
                    distance_m: Some(user.distance_m),
                }),
                Some((previous, _)) if *previous != position => events.push(WatchEvent {
                    watch_id,
                    kind: WatchEventKind::Moved,
                    user_id,
                    distance_m: Some(user.distance_m),
                }),
                Some(_) => {}
            }
            next.insert(user_id, (position, user.distance_m));
        }
        for user_id in watch.members.keys() {
            if !next.contains_key(user_id) {
                events.push(WatchEvent {
                    watch_id,
                    kind: WatchEventKind::Left,
                    user_id: *user_id,
                    distance_m: None,
                });
            }
        }

        watch.members = next;
        watch.last_recompute_ms = now_ms;
        events
    }
}
