//! # Spatial Index
//!
//! A concurrent geographic grid mapping user IDs to coordinates and
//! supporting radius queries.
//!
//! Cells are keyed by [`CellKey`] and sharded through `DashMap`, so updates
//! contend only on the cells they touch and queries take per-cell read
//! locks, never a global lock across a scan. A back-map from user to cell
//! keeps updates O(1) amortized: a position report removes the user from its
//! prior cell only when the cell actually changed, then inserts into the new
//! one.
//!
//! The index stores coordinates for the fine distance filter but never owns
//! profile data; the presence registry remains the source of truth and the
//! two are kept in sync by the registry's operations plus the background
//! reconciliation sweep.

use crate::geo::{haversine_distance_m, CellKey, GridGeometry};
use crate::types::{GeoPosition, UserId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A candidate returned by a radius query, already distance-confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusMatch {
    /// The matched user
    pub user_id: UserId,
    /// The user's indexed position
    pub position: GeoPosition,
    /// Exact distance from the query center in meters
    pub distance_m: f64,
}

/// Counters describing index activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Total inserts of users not previously indexed
    pub total_insertions: u64,
    /// Total removals of indexed users
    pub total_removals: u64,
    /// Total position updates that crossed a cell boundary
    pub total_cell_moves: u64,
    /// Total radius queries served
    pub total_queries: u64,
}

/// Concurrent grid-based spatial index.
pub struct GeoGrid {
    geometry: GridGeometry,
    /// Cell contents: everyone whose current position falls in the cell
    cells: DashMap<CellKey, HashMap<UserId, GeoPosition>>,
    /// Back-map so updates and removals find the owning cell in O(1)
    user_cells: DashMap<UserId, CellKey>,
    insertions: AtomicU64,
    removals: AtomicU64,
    cell_moves: AtomicU64,
    queries: AtomicU64,
}

impl GeoGrid {
    /// Creates an empty index over a grid with the given cell size.
    pub fn new(cell_size_deg: f64) -> Self {
        Self {
            geometry: GridGeometry::new(cell_size_deg),
            cells: DashMap::new(),
            user_cells: DashMap::new(),
            insertions: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            cell_moves: AtomicU64::new(0),
            queries: AtomicU64::new(0),
        }
    }

    /// Inserts a user or moves them to the cell covering the new position.
    ///
    /// Lock order is always back-map first, then cells, and at most one cell
    /// guard is held at a time, so concurrent updates for different users
    /// cannot deadlock. A user appears in exactly one cell at any moment.
    pub fn insert_or_update(&self, user_id: UserId, position: GeoPosition) {
        let new_cell = self.geometry.cell_for(&position);

        let previous = {
            let mut entry = self.user_cells.entry(user_id).or_insert(new_cell);
            let previous = *entry.value();
            *entry.value_mut() = new_cell;
            previous
        };

        let is_new = !self.remove_from_cell_if(&previous, user_id, previous != new_cell);
        if is_new && previous == new_cell {
            self.insertions.fetch_add(1, Ordering::Relaxed);
        } else if previous != new_cell {
            self.cell_moves.fetch_add(1, Ordering::Relaxed);
        }

        self.cells
            .entry(new_cell)
            .or_default()
            .insert(user_id, position);
    }

    /// Removes a user from the index. Idempotent; returns whether the user
    /// was present.
    pub fn remove(&self, user_id: UserId) -> bool {
        let Some((_, cell)) = self.user_cells.remove(&user_id) else {
            return false;
        };
        self.remove_from_cell_if(&cell, user_id, true);
        self.removals.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Users within `radius_m` of `center`, fine-filtered by exact haversine
    /// distance. `exclude` is filtered by identity, not by position, so a
    /// second user at identical coordinates is still returned.
    pub fn query_radius(
        &self,
        center: &GeoPosition,
        radius_m: f64,
        exclude: Option<UserId>,
    ) -> Vec<RadiusMatch> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut matches = Vec::new();
        for key in self.geometry.covering_cells(center, radius_m) {
            let Some(cell) = self.cells.get(&key) else {
                continue;
            };
            for (&user_id, position) in cell.iter() {
                if Some(user_id) == exclude {
                    continue;
                }
                let distance_m = haversine_distance_m(center, position);
                if distance_m <= radius_m {
                    matches.push(RadiusMatch {
                        user_id,
                        position: *position,
                        distance_m,
                    });
                }
            }
        }
        matches
    }

    /// The indexed position of a user, if present.
    pub fn position_of(&self, user_id: UserId) -> Option<GeoPosition> {
        let cell = *self.user_cells.get(&user_id)?;
        self.cells.get(&cell)?.get(&user_id).copied()
    }

    /// Snapshot of every indexed user ID, for reconciliation sweeps.
    pub fn users(&self) -> Vec<UserId> {
        self.user_cells.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of indexed users.
    pub fn len(&self) -> usize {
        self.user_cells.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.user_cells.is_empty()
    }

    /// Activity counters since startup.
    pub fn stats(&self) -> GridStats {
        GridStats {
            total_insertions: self.insertions.load(Ordering::Relaxed),
            total_removals: self.removals.load(Ordering::Relaxed),
            total_cell_moves: self.cell_moves.load(Ordering::Relaxed),
            total_queries: self.queries.load(Ordering::Relaxed),
        }
    }

    /// Removes `user_id` from `cell` when `condition` holds, dropping the
    /// cell entry once empty. Returns whether the user was in the cell.
    fn remove_from_cell_if(&self, cell: &CellKey, user_id: UserId, condition: bool) -> bool {
        let mut was_present = false;
        if let Some(mut members) = self.cells.get_mut(cell) {
            was_present = members.contains_key(&user_id);
            if condition && was_present {
                members.remove(&user_id);
            }
        }
        // Guard dropped above; reap the cell separately to avoid holding
        // the shard lock across the removal.
        self.cells.remove_if(cell, |_, members| members.is_empty());
        was_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64) -> GeoPosition {
        GeoPosition::new(lat, lon)
    }

    #[test]
    fn test_insert_and_query() {
        let grid = GeoGrid::new(0.05);
        let near = UserId::new();
        let far = UserId::new();
        grid.insert_or_update(near, pos(52.5200, 13.4050));
        grid.insert_or_update(far, pos(52.6000, 13.4050)); // ~8.9 km north

        let matches = grid.query_radius(&pos(52.5200, 13.4051), 500.0, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_id, near);
        assert!(matches[0].distance_m < 100.0);
    }

    #[test]
    fn test_exclusion_is_by_identity_not_position() {
        let grid = GeoGrid::new(0.05);
        let requester = UserId::new();
        let twin = UserId::new();
        let shared = pos(40.0, -74.0);
        grid.insert_or_update(requester, shared);
        grid.insert_or_update(twin, shared);

        let matches = grid.query_radius(&shared, 0.0, Some(requester));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_id, twin);
        assert_eq!(matches[0].distance_m, 0.0);
    }

    #[test]
    fn test_update_moves_between_cells() {
        let grid = GeoGrid::new(0.05);
        let user = UserId::new();
        grid.insert_or_update(user, pos(10.0, 10.0));
        grid.insert_or_update(user, pos(20.0, 20.0));

        assert_eq!(grid.len(), 1);
        assert!(grid
            .query_radius(&pos(10.0, 10.0), 1_000.0, None)
            .is_empty());
        assert_eq!(grid.query_radius(&pos(20.0, 20.0), 1_000.0, None).len(), 1);
        assert_eq!(grid.stats().total_cell_moves, 1);
    }

    #[test]
    fn test_update_within_cell_keeps_single_entry() {
        let grid = GeoGrid::new(1.0);
        let user = UserId::new();
        grid.insert_or_update(user, pos(10.1, 10.1));
        grid.insert_or_update(user, pos(10.2, 10.2));

        let matches = grid.query_radius(&pos(10.2, 10.2), 100.0, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].position, pos(10.2, 10.2));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let grid = GeoGrid::new(0.05);
        let user = UserId::new();
        grid.insert_or_update(user, pos(0.0, 0.0));

        assert!(grid.remove(user));
        assert!(!grid.remove(user));
        assert!(grid.is_empty());
        assert!(grid.query_radius(&pos(0.0, 0.0), 1_000.0, None).is_empty());
    }

    #[test]
    fn test_query_across_seam() {
        let grid = GeoGrid::new(0.05);
        let west_side = UserId::new();
        grid.insert_or_update(west_side, pos(0.0, -179.995));

        let matches = grid.query_radius(&pos(0.0, 179.995), 2_000.0, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_id, west_side);
    }

    #[test]
    fn test_no_false_positives() {
        let grid = GeoGrid::new(0.05);
        // Scatter users on a coarse lattice around the center.
        let center = pos(48.0, 11.0);
        for i in 0..10 {
            for j in 0..10 {
                let p = pos(47.95 + 0.01 * i as f64, 10.95 + 0.01 * j as f64);
                grid.insert_or_update(UserId::new(), p);
            }
        }
        let radius = 3_000.0;
        for m in grid.query_radius(&center, radius, None) {
            assert!(haversine_distance_m(&center, &m.position) <= radius);
        }
    }

    #[test]
    fn test_no_false_negatives() {
        let grid = GeoGrid::new(0.05);
        let center = pos(48.0, 11.0);
        let radius = 3_000.0;
        let mut expected = 0;
        for i in 0..10 {
            for j in 0..10 {
                let p = pos(47.95 + 0.01 * i as f64, 10.95 + 0.01 * j as f64);
                if haversine_distance_m(&center, &p) <= radius {
                    expected += 1;
                }
                grid.insert_or_update(UserId::new(), p);
            }
        }
        assert!(expected > 0, "test lattice should intersect the circle");
        assert_eq!(grid.query_radius(&center, radius, None).len(), expected);
    }

    #[test]
    fn test_position_of_reflects_latest_update() {
        let grid = GeoGrid::new(0.05);
        let user = UserId::new();
        assert_eq!(grid.position_of(user), None);
        grid.insert_or_update(user, pos(1.0, 2.0));
        grid.insert_or_update(user, pos(3.0, 4.0));
        assert_eq!(grid.position_of(user), Some(pos(3.0, 4.0)));
    }

    #[test]
    fn test_stats_tracking() {
        let grid = GeoGrid::new(0.05);
        let user = UserId::new();
        grid.insert_or_update(user, pos(5.0, 5.0));
        grid.query_radius(&pos(5.0, 5.0), 100.0, None);
        grid.remove(user);

        let stats = grid.stats();
        assert_eq!(stats.total_insertions, 1);
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.total_removals, 1);
    }
}
