//! # Service Facade
//!
//! `ProximityService` wires the spatial index, presence registry, ingestion
//! pipeline, query engine and watch manager together and owns the background
//! maintenance task. Callers (the gateway, tests) talk only to this facade;
//! no component reaches into another's internals.

use crate::config::ProximityConfig;
use crate::error::{ReportOutcome, Result};
use crate::ingest::{IngestStats, IngestionPipeline};
use crate::presence::{PresenceRegistry, PresenceStats};
use crate::query::{QueryEngine, QueryStats};
use crate::spatial::{GeoGrid, GridStats};
use crate::types::{
    GenderCategory, GeoPosition, NearbyUser, PresenceEntry, ProfileSnapshot, UserId, WatchId,
};
use crate::utils::current_timestamp_ms;
use crate::watch::{WatchEvent, WatchManager, WatchStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Aggregated view over all component counters.
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    /// Spatial index counters
    pub grid: GridStats,
    /// Presence registry counters
    pub presence: PresenceStats,
    /// Ingestion counters
    pub ingest: IngestStats,
    /// Query engine counters
    pub query: QueryStats,
    /// Watch layer counters
    pub watch: WatchStats,
    /// Users currently indexed
    pub indexed_users: usize,
    /// Registry entries in any state
    pub registry_entries: usize,
    /// Active watches
    pub active_watches: usize,
    /// Index/registry divergences repaired by reconciliation
    pub total_reconciled: u64,
}

/// The assembled proximity service.
pub struct ProximityService {
    config: ProximityConfig,
    index: Arc<GeoGrid>,
    registry: Arc<PresenceRegistry>,
    pipeline: Arc<IngestionPipeline>,
    query: Arc<QueryEngine>,
    watches: Arc<WatchManager>,
    reconciled: AtomicU64,
}

impl ProximityService {
    /// Builds the full component stack from configuration.
    pub fn new(config: ProximityConfig) -> Arc<Self> {
        let index = Arc::new(GeoGrid::new(config.cell_size_deg));
        let registry = Arc::new(PresenceRegistry::new(config.clone(), index.clone()));
        let pipeline = Arc::new(IngestionPipeline::new(config.clone(), registry.clone()));
        let query = Arc::new(QueryEngine::new(
            config.clone(),
            index.clone(),
            registry.clone(),
        ));
        let watches = Arc::new(WatchManager::new(config.clone(), query.clone()));
        Arc::new(Self {
            config,
            index,
            registry,
            pipeline,
            query,
            watches,
            reconciled: AtomicU64::new(0),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Registers a new user and returns the generated profile.
    pub fn register(
        &self,
        display_name: &str,
        age: u8,
        gender: GenderCategory,
    ) -> Result<ProfileSnapshot> {
        self.registry
            .register(display_name, age, gender, current_timestamp_ms())
    }

    /// Submits a location report through the ingestion pipeline.
    pub fn report_location(
        &self,
        user_id: UserId,
        position: GeoPosition,
        timestamp_ms: u64,
        accuracy_m: Option<f64>,
    ) -> Result<ReportOutcome> {
        self.pipeline.submit(
            user_id,
            position,
            timestamp_ms,
            accuracy_m,
            current_timestamp_ms(),
        )
    }

    /// Nearby users for a registered requester, nearest first.
    pub fn find_nearby(
        &self,
        requester: UserId,
        radius_m: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<NearbyUser>> {
        self.query.find_nearby(requester, radius_m, limit)
    }

    /// Full presence entry for a user.
    pub fn get_snapshot(&self, user_id: UserId) -> Result<PresenceEntry> {
        self.registry.get_snapshot(user_id)
    }

    /// Registers a watch region for a user.
    pub fn create_watch(
        &self,
        owner: UserId,
        center: GeoPosition,
        radius_m: Option<f64>,
    ) -> Result<(WatchId, mpsc::UnboundedReceiver<WatchEvent>)> {
        // Watching requires a live presence, same as querying.
        self.registry.active_position(owner)?;
        self.watches.create_watch(owner, center, radius_m)
    }

    /// Releases one watch. Idempotent.
    pub fn release_watch(&self, watch_id: WatchId) -> bool {
        self.watches.release_watch(watch_id)
    }

    /// Releases every watch owned by a user (client disconnect path).
    pub fn release_watches_for(&self, owner: UserId) -> usize {
        self.watches.release_owned_by(owner)
    }

    /// Aggregated component counters.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            grid: self.index.stats(),
            presence: self.registry.stats(),
            ingest: self.pipeline.stats(),
            query: self.query.stats(),
            watch: self.watches.stats(),
            indexed_users: self.index.len(),
            registry_entries: self.registry.len(),
            active_watches: self.watches.len(),
            total_reconciled: self.reconciled.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background maintenance task: presence expiry in bounded
    /// batches, watch recomputation, rate-limiter pruning and the periodic
    /// reconciliation sweep. The task stops when the shutdown channel fires.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(service.config.maintenance_interval());
            let mut tick: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tick += 1;
                        service.run_maintenance_tick(tick).await;
                    }
                    _ = shutdown.recv() => {
                        info!("maintenance task stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One maintenance cycle. Expiry yields between batches so a large
    /// backlog never starves foreground ingestion.
    async fn run_maintenance_tick(&self, tick: u64) {
        loop {
            let summary = self
                .registry
                .expire_stale(current_timestamp_ms(), self.config.expiry_batch_size);
            if summary.expired > 0 || summary.purged > 0 {
                debug!(
                    expired = summary.expired,
                    purged = summary.purged,
                    remaining = summary.remaining,
                    "expiry batch complete"
                );
            }
            if summary.remaining == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let delivered = self.watches.recompute_due(current_timestamp_ms());
        if delivered > 0 {
            debug!(events = delivered, "watch recomputation delivered events");
        }

        self.pipeline.prune(current_timestamp_ms());

        if self.config.reconcile_every_ticks > 0
            && tick % self.config.reconcile_every_ticks as u64 == 0
        {
            let repaired = self.reconcile();
            if repaired > 0 {
                warn!(repaired, "reconciliation repaired index/registry divergence");
            }
        }
    }

    /// Repairs divergence between the index and the registry in both
    /// directions: indexed users without an active entry are dropped,
    /// active entries missing from the index are re-inserted from their
    /// stored position. Returns the number of repairs.
    fn reconcile(&self) -> usize {
        let mut repaired = 0;
        for user_id in self.index.users() {
            if !self.registry.is_active(user_id) {
                self.index.remove(user_id);
                repaired += 1;
            }
        }
        for (user_id, position) in self.registry.active_users() {
            if self.index.position_of(user_id).is_none() {
                self.index.insert_or_update(user_id, position);
                repaired += 1;
            }
        }
        self.reconciled.fetch_add(repaired as u64, Ordering::Relaxed);
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::METERS_PER_DEGREE_LAT;
    use crate::utils::current_timestamp_ms;

    fn pos(lat: f64, lon: f64) -> GeoPosition {
        GeoPosition::new(lat, lon)
    }

    fn north_of(base: &GeoPosition, meters: f64) -> GeoPosition {
        pos(base.latitude + meters / METERS_PER_DEGREE_LAT, base.longitude)
    }

    fn spawn_user(service: &ProximityService, name: &str, at: GeoPosition) -> UserId {
        let profile = service.register(name, 30, GenderCategory::Unspecified).unwrap();
        let outcome = service
            .report_location(profile.user_id, at, current_timestamp_ms(), None)
            .unwrap();
        assert!(outcome.accepted);
        profile.user_id
    }

    #[test]
    fn test_register_report_query_round_trip() {
        let service = ProximityService::new(ProximityConfig::default());
        let origin = pos(52.52, 13.405);
        let other = spawn_user(&service, "Alex", origin);
        let requester = spawn_user(&service, "Jamie", north_of(&origin, 50.0));

        // 100 m radius sees the user 50 m away.
        let results = service.find_nearby(requester, Some(100.0), None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].profile.user_id, other);
        assert!(results[0].distance_m > 40.0 && results[0].distance_m < 60.0);

        // 10 m radius does not.
        let results = service.find_nearby(requester, Some(10.0), None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_three_user_scenario() {
        let service = ProximityService::new(ProximityConfig::default());
        let origin = pos(48.1, 11.5);
        let requester = spawn_user(&service, "requester", origin);
        let at_10 = spawn_user(&service, "close", north_of(&origin, 10.0));
        let at_500 = spawn_user(&service, "mid", north_of(&origin, 500.0));
        let _at_2000 = spawn_user(&service, "far", north_of(&origin, 2_000.0));

        let results = service.find_nearby(requester, Some(1_000.0), None).unwrap();
        let ids: Vec<UserId> = results.iter().map(|r| r.profile.user_id).collect();
        assert_eq!(ids, vec![at_10, at_500]);
    }

    #[test]
    fn test_expired_user_leaves_results_after_ttl() {
        let service = ProximityService::new(ProximityConfig::default());
        let origin = pos(48.1, 11.5);
        let requester = spawn_user(&service, "requester", origin);
        let ghost = spawn_user(&service, "ghost", north_of(&origin, 100.0));

        assert_eq!(
            service.find_nearby(requester, Some(1_000.0), None).unwrap().len(),
            1
        );

        // Force the ghost past its TTL, keep the requester fresh.
        let ttl = service.config.ttl_ms;
        let future = current_timestamp_ms() + ttl + 1;
        service
            .registry
            .report_location(requester, origin, future, None, future)
            .unwrap();
        service.registry.expire_stale(future, 1_000);

        let results = service.find_nearby(requester, Some(1_000.0), None).unwrap();
        assert!(results.is_empty());
        // Still in the registry during the grace period, just not queryable.
        assert!(service.get_snapshot(ghost).is_ok());
    }

    #[test]
    fn test_watch_requires_live_presence() {
        let service = ProximityService::new(ProximityConfig::default());
        let profile = service
            .register("pending", 30, GenderCategory::Unspecified)
            .unwrap();
        assert!(service
            .create_watch(profile.user_id, pos(0.0, 0.0), None)
            .is_err());
    }

    #[test]
    fn test_reconcile_repairs_both_directions() {
        let service = ProximityService::new(ProximityConfig::default());
        let origin = pos(48.1, 11.5);
        let user = spawn_user(&service, "user", origin);

        // Orphan index entry: registry no longer active.
        let orphan = UserId::new();
        service.index.insert_or_update(orphan, origin);
        // Missing index entry: active user dropped from the index.
        service.index.remove(user);

        let repaired = service.reconcile();
        assert_eq!(repaired, 2);
        assert_eq!(service.index.position_of(user), Some(origin));
        assert_eq!(service.index.position_of(orphan), None);
        assert_eq!(service.stats().total_reconciled, 2);
    }

    #[tokio::test]
    async fn test_maintenance_task_stops_on_shutdown() {
        let config = ProximityConfig {
            maintenance_interval_ms: 10,
            ..ProximityConfig::default()
        };
        let service = ProximityService::new(config);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = service.spawn_maintenance(shutdown_rx);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("maintenance task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watch_events_flow_through_maintenance() {
        let config = ProximityConfig {
            maintenance_interval_ms: 10,
            watch_debounce_ms: 0,
            ..ProximityConfig::default()
        };
        let service = ProximityService::new(config);
        let origin = pos(48.1, 11.5);
        let watcher = spawn_user(&service, "watcher", origin);
        let (_, mut rx) = service
            .create_watch(watcher, origin, Some(1_000.0))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = service.spawn_maintenance(shutdown_rx);

        let _visitor = spawn_user(&service, "visitor", north_of(&origin, 200.0));
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("no watch event before timeout")
            .expect("watch channel closed");
        assert_eq!(event.kind, crate::watch::WatchEventKind::Joined);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
