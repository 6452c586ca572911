//! # Geographic Math and Grid Geometry
//!
//! Distance computation and the cell geometry backing the spatial index.
//!
//! The index is a fixed-degree geographic grid: every position maps to one
//! [`CellKey`] (a latitude band and a longitude band). Longitude bands wrap
//! modulo the ring size, so the ±180° seam is an ordinary cell boundary and
//! queries crossing it lose no candidates. Latitude bands clamp at the poles,
//! and the coarse filter widens to the full longitude ring where a radius
//! circle would wrap around a pole.
//!
//! The coarse/fine split follows the usual discipline: band ranges only ever
//! over-approximate the query circle (no false negatives), and every candidate
//! is confirmed with an exact haversine check (no false positives).

use crate::types::GeoPosition;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (WGS-84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude, constant to first order.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Below this cosine of latitude the longitude span of a query circle is
/// treated as the full ring; avoids division blow-up at the poles.
const MIN_COS_LAT: f64 = 1e-6;

/// Great-circle distance between two positions in meters (haversine).
pub fn haversine_distance_m(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Key of a single grid cell: a latitude band and a wrapping longitude band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    /// Latitude band index, `0..lat_bands`, clamped at the poles
    pub lat_band: i32,
    /// Longitude band index, `0..lon_bands`, wrapping at the ±180° seam
    pub lon_band: i32,
}

/// Geometry of the fixed-degree grid: cell size and band counts.
///
/// Shared by the spatial index and the coarse filter so both always agree on
/// which cell a coordinate falls into.
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry {
    cell_size_deg: f64,
    lat_bands: i32,
    lon_bands: i32,
}

impl GridGeometry {
    /// Creates a grid with the given cell size in degrees.
    ///
    /// The size is clamped to a sane range; degenerate values would either
    /// collapse the grid into one cell or explode the band count.
    pub fn new(cell_size_deg: f64) -> Self {
        let cell_size_deg = cell_size_deg.clamp(0.001, 45.0);
        Self {
            cell_size_deg,
            lat_bands: (180.0 / cell_size_deg).ceil() as i32,
            lon_bands: (360.0 / cell_size_deg).ceil() as i32,
        }
    }

    /// Cell size in degrees.
    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    /// Number of longitude bands in the ring.
    pub fn lon_bands(&self) -> i32 {
        self.lon_bands
    }

    /// The cell covering the given position.
    pub fn cell_for(&self, position: &GeoPosition) -> CellKey {
        CellKey {
            lat_band: self.lat_band(position.latitude),
            lon_band: self.lon_band(position.longitude),
        }
    }

    fn lat_band(&self, latitude: f64) -> i32 {
        let band = ((latitude + 90.0) / self.cell_size_deg).floor() as i32;
        band.clamp(0, self.lat_bands - 1)
    }

    fn lon_band(&self, longitude: f64) -> i32 {
        let band = ((longitude + 180.0) / self.cell_size_deg).floor() as i32;
        band.rem_euclid(self.lon_bands)
    }

    /// All cells whose bounding region can intersect the circle of
    /// `radius_m` around `center`: the coarse filter.
    ///
    /// The result over-approximates: every cell containing a point within
    /// the radius is included, near the seam by wrapping the longitude band
    /// range and near the poles by widening to the full ring. Candidates
    /// must still pass the exact distance check.
    pub fn covering_cells(&self, center: &GeoPosition, radius_m: f64) -> Vec<CellKey> {
        let radius_m = radius_m.max(0.0);
        let dlat_deg = radius_m / METERS_PER_DEGREE_LAT;
        let lat_min = (center.latitude - dlat_deg).max(-90.0);
        let lat_max = (center.latitude + dlat_deg).min(90.0);
        let band_min = self.lat_band(lat_min);
        let band_max = self.lat_band(lat_max);

        // Longitude degrees shrink with cos(lat); size the span by the
        // narrowest parallel the circle touches so no band is missed.
        let widest_lat = lat_min.abs().max(lat_max.abs());
        let cos_lat = widest_lat.to_radians().cos();

        let lon_span = if cos_lat < MIN_COS_LAT {
            None // circle wraps a pole: take the whole ring
        } else {
            let dlon_deg = radius_m / (METERS_PER_DEGREE_LAT * cos_lat);
            if dlon_deg * 2.0 >= 360.0 {
                None
            } else {
                let low = ((center.longitude - dlon_deg + 180.0) / self.cell_size_deg).floor() as i64;
                let high = ((center.longitude + dlon_deg + 180.0) / self.cell_size_deg).floor() as i64;
                if high - low + 1 >= self.lon_bands as i64 {
                    None
                } else {
                    Some((low, high))
                }
            }
        };

        let mut cells = Vec::new();
        for lat_band in band_min..=band_max {
            match lon_span {
                Some((low, high)) => {
                    for raw in low..=high {
                        cells.push(CellKey {
                            lat_band,
                            lon_band: (raw.rem_euclid(self.lon_bands as i64)) as i32,
                        });
                    }
                }
                None => {
                    for lon_band in 0..self.lon_bands {
                        cells.push(CellKey { lat_band, lon_band });
                    }
                }
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64) -> GeoPosition {
        GeoPosition::new(lat, lon)
    }

    #[test]
    fn test_haversine_known_distance() {
        // Berlin Alexanderplatz -> Berlin Hauptbahnhof, roughly 4.5 km.
        let a = pos(52.5219, 13.4132);
        let b = pos(52.5250, 13.3694);
        let d = haversine_distance_m(&a, &b);
        assert!(d > 2_500.0 && d < 3_500.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero_for_identical_points() {
        let a = pos(10.0, 20.0);
        assert_eq!(haversine_distance_m(&a, &a), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = pos(-33.86, 151.21);
        let b = pos(51.51, -0.13);
        let ab = haversine_distance_m(&a, &b);
        let ba = haversine_distance_m(&b, &a);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_cell_assignment_is_stable() {
        let grid = GridGeometry::new(0.05);
        let p = pos(48.8566, 2.3522);
        assert_eq!(grid.cell_for(&p), grid.cell_for(&p));
    }

    #[test]
    fn test_seam_longitudes_map_into_ring() {
        let grid = GridGeometry::new(0.05);
        let east = grid.cell_for(&pos(0.0, 179.99));
        let west = grid.cell_for(&pos(0.0, -179.99));
        assert!(east.lon_band < grid.lon_bands());
        assert!(west.lon_band < grid.lon_bands());
        // 180 exactly wraps onto band 0 rather than a phantom extra band.
        let edge = grid.cell_for(&pos(0.0, 180.0));
        assert_eq!(edge.lon_band, 0);
    }

    #[test]
    fn test_covering_cells_include_nearby_point_across_seam() {
        let grid = GridGeometry::new(0.05);
        let center = pos(0.0, 179.995);
        let neighbor = pos(0.0, -179.995);
        // ~1.1 km apart across the seam.
        assert!(haversine_distance_m(&center, &neighbor) < 2_000.0);
        let cells = grid.covering_cells(&center, 2_000.0);
        assert!(cells.contains(&grid.cell_for(&neighbor)));
    }

    #[test]
    fn test_covering_cells_near_pole_take_full_ring() {
        let grid = GridGeometry::new(1.0);
        let cells = grid.covering_cells(&pos(89.9, 0.0), 50_000.0);
        let top_band_cells = cells
            .iter()
            .filter(|c| c.lat_band == grid.lat_band(89.9))
            .count();
        assert_eq!(top_band_cells, grid.lon_bands() as usize);
    }

    #[test]
    fn test_covering_cells_contains_center_for_zero_radius() {
        let grid = GridGeometry::new(0.05);
        let center = pos(37.77, -122.42);
        let cells = grid.covering_cells(&center, 0.0);
        assert!(cells.contains(&grid.cell_for(&center)));
    }

    #[test]
    fn test_covering_cells_never_misses_in_radius_points() {
        let grid = GridGeometry::new(0.1);
        let center = pos(45.0, 7.0);
        let radius = 10_000.0;
        // Probe a ring of points right at the radius edge.
        for i in 0..36 {
            let angle = (i as f64) * 10.0_f64.to_radians();
            let dlat = (radius * angle.cos()) / METERS_PER_DEGREE_LAT;
            let dlon = (radius * angle.sin())
                / (METERS_PER_DEGREE_LAT * center.latitude.to_radians().cos());
            let probe = pos(center.latitude + dlat * 0.99, center.longitude + dlon * 0.99);
            if haversine_distance_m(&center, &probe) <= radius {
                let cells = grid.covering_cells(&center, radius);
                assert!(
                    cells.contains(&grid.cell_for(&probe)),
                    "probe at angle {} not covered",
                    i
                );
            }
        }
    }
}
