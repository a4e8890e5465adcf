// src/spatial_map.rs

use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use tracing::debug;

use crate::types::{BoundingBox, SCALE};

/// Coordinate-aligned accumulation of power and spectrum samples.
///
/// Owns the per-pixel power grid (dBm, NaN = unsampled) and the coarse
/// spectrum cache. Dimensions are fixed at construction from the first
/// captured frame and never change; `reset` clears contents, not shape.
pub struct SpatialMap {
    power: Array2<f64>,
    spectra: Array2<Option<Arc<Vec<Complex64>>>>,
    clear_spectrum_on_reset: bool,
}

impl SpatialMap {
    pub fn new(height: usize, width: usize, clear_spectrum_on_reset: bool) -> Self {
        let cache_rows = height.div_ceil(SCALE);
        let cache_cols = width.div_ceil(SCALE);
        Self {
            power: Array2::from_elem((height, width), f64::NAN),
            spectra: Array2::from_elem((cache_rows, cache_cols), None),
            clear_spectrum_on_reset,
        }
    }

    /// Overwrite the central half-width/half-height sub-rectangle of the
    /// bounding box with `dbm`. Last write wins, no averaging: the sensing
    /// region is smaller than the visual marker, and a later sweep over the
    /// same spot supersedes the earlier one.
    pub fn write_power(&mut self, bb: &BoundingBox, dbm: f64) {
        let (nrows, ncols) = self.power.dim();
        let r0 = clamp_index(bb.y + bb.h / 4.0, nrows);
        let r1 = clamp_index(bb.y + bb.h * 3.0 / 4.0, nrows);
        let c0 = clamp_index(bb.x + bb.w / 4.0, ncols);
        let c1 = clamp_index(bb.x + bb.w * 3.0 / 4.0, ncols);
        for r in r0..r1 {
            for c in c0..c1 {
                self.power[[r, c]] = dbm;
            }
        }
    }

    /// Store a raw sample burst at the cache cell covering `center`,
    /// replacing any previous burst for that cell. Centers outside the grid
    /// are dropped.
    pub fn write_spectrum(&mut self, center: (f64, f64), samples: Arc<Vec<Complex64>>) {
        let (cx, cy) = center;
        if cx < 0.0 || cy < 0.0 {
            return;
        }
        let row = cy as usize / SCALE;
        let col = cx as usize / SCALE;
        let (cache_rows, cache_cols) = self.cache_dims();
        if row >= cache_rows || col >= cache_cols {
            debug!("spectrum center ({cx:.0}, {cy:.0}) outside cache, dropped");
            return;
        }
        self.spectra[[row, col]] = Some(samples);
    }

    /// Read-only view of the power grid.
    pub fn power_map(&self) -> &Array2<f64> {
        &self.power
    }

    /// Explicit sampled/unsampled mask of the power grid.
    pub fn validity(&self) -> Array2<bool> {
        self.power.map(|v| !v.is_nan())
    }

    /// Stored burst for a cache cell, if any.
    pub fn spectrum(&self, row: usize, col: usize) -> Option<Arc<Vec<Complex64>>> {
        self.spectra.get((row, col)).and_then(|s| s.clone())
    }

    pub fn cache_dims(&self) -> (usize, usize) {
        self.spectra.dim()
    }

    /// Clear the power grid back to all-NaN. The spectrum cache survives a
    /// reset unless configured otherwise, so earlier inspector clicks keep
    /// working across a re-baseline.
    pub fn reset(&mut self) {
        self.power.fill(f64::NAN);
        if self.clear_spectrum_on_reset {
            self.spectra.fill(None);
        }
    }
}

fn clamp_index(v: f64, n: usize) -> usize {
    if v <= 0.0 {
        0
    } else {
        (v as usize).min(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst(seed: f64) -> Arc<Vec<Complex64>> {
        Arc::new(vec![Complex64::new(seed, -seed); 16])
    }

    #[test]
    fn test_write_power_touches_central_subrectangle_only() {
        let mut map = SpatialMap::new(100, 100, false);
        let bb = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        map.write_power(&bb, -50.0);

        for ((r, c), &v) in map.power_map().indexed_iter() {
            let inside = (15..25).contains(&r) && (15..25).contains(&c);
            if inside {
                assert_eq!(v, -50.0, "cell ({r},{c}) should be written");
            } else {
                assert!(v.is_nan(), "cell ({r},{c}) should be untouched");
            }
        }
    }

    #[test]
    fn test_overlapping_writes_last_wins() {
        let mut map = SpatialMap::new(100, 100, false);
        map.write_power(&BoundingBox::new(10.0, 10.0, 20.0, 20.0), -50.0);
        map.write_power(&BoundingBox::new(14.0, 14.0, 20.0, 20.0), -40.0);

        // Overlap of the two central sub-rectangles.
        assert_eq!(map.power_map()[[20, 20]], -40.0);
        // Only covered by the first write.
        assert_eq!(map.power_map()[[15, 15]], -50.0);
        // Only covered by the second.
        assert_eq!(map.power_map()[[28, 28]], -40.0);
    }

    #[test]
    fn test_write_power_clamps_to_grid() {
        let mut map = SpatialMap::new(50, 50, false);
        map.write_power(&BoundingBox::new(30.0, 30.0, 40.0, 40.0), -30.0);
        assert_eq!(map.power_map()[[49, 49]], -30.0);

        map.write_power(&BoundingBox::new(-10.0, -10.0, 40.0, 40.0), -20.0);
        assert_eq!(map.power_map()[[0, 0]], -20.0);
    }

    #[test]
    fn test_spectrum_coordinate_round_trip() {
        let mut map = SpatialMap::new(100, 100, false);
        let b = burst(1.0);
        // Written at pixel center (34, 27) -> cell (2, 3).
        map.write_spectrum((34.0, 27.0), b.clone());

        // Any click inside the same cache cell returns the same buffer.
        for (x, y) in [(30, 20), (34, 27), (39, 29)] {
            let (row, col) = (y / SCALE, x / SCALE);
            let got = map.spectrum(row, col).expect("cell should be populated");
            assert!(Arc::ptr_eq(&got, &b));
        }
        assert!(map.spectrum(0, 0).is_none());
    }

    #[test]
    fn test_write_spectrum_overwrites() {
        let mut map = SpatialMap::new(100, 100, false);
        let first = burst(1.0);
        let second = burst(2.0);
        map.write_spectrum((15.0, 15.0), first);
        map.write_spectrum((12.0, 18.0), second.clone());
        let got = map.spectrum(1, 1).unwrap();
        assert!(Arc::ptr_eq(&got, &second));
    }

    #[test]
    fn test_out_of_range_spectrum_dropped() {
        let mut map = SpatialMap::new(100, 100, false);
        map.write_spectrum((500.0, 500.0), burst(1.0));
        map.write_spectrum((-5.0, 20.0), burst(2.0));
        let (rows, cols) = map.cache_dims();
        for r in 0..rows {
            for c in 0..cols {
                assert!(map.spectrum(r, c).is_none());
            }
        }
    }

    #[test]
    fn test_reset_retains_spectra_by_default() {
        let mut map = SpatialMap::new(100, 100, false);
        map.write_power(&BoundingBox::new(10.0, 10.0, 20.0, 20.0), -45.0);
        map.write_spectrum((20.0, 20.0), burst(1.0));

        map.reset();
        assert!(map.power_map().iter().all(|v| v.is_nan()));
        assert!(map.spectrum(2, 2).is_some());
    }

    #[test]
    fn test_reset_clears_spectra_when_configured() {
        let mut map = SpatialMap::new(100, 100, true);
        map.write_spectrum((20.0, 20.0), burst(1.0));
        map.reset();
        assert!(map.spectrum(2, 2).is_none());
    }

    #[test]
    fn test_cache_dims_cover_whole_frame() {
        let map = SpatialMap::new(95, 123, false);
        assert_eq!(map.cache_dims(), (10, 13));
    }
}
