// src/inspector.rs

use tracing::{debug, info};

use crate::sampler::WelchPsd;
use crate::spatial_map::SpatialMap;
use crate::types::SCALE;

/// Segment length for the inspector's spectrum replay, finer than the live
/// power estimate since this is an offline look at a stored burst.
const REPLAY_SEGMENT: usize = 1024;

/// A rendered spectrum lookup: PSD of the stored burst for one cache cell,
/// with the frequency axis in MHz around the receiver's tuned frequency.
#[derive(Debug, Clone)]
pub struct SpectrumView {
    pub row: usize,
    pub col: usize,
    pub frequencies_mhz: Vec<f64>,
    pub psd_db: Vec<f64>,
}

/// On-click spectrum replay. Converts a display click into a cache cell and
/// turns the stored raw burst, if any, into a plottable PSD.
pub struct Inspector {
    welch: WelchPsd,
    center_freq_mhz: f64,
}

impl Inspector {
    pub fn new(sample_rate_mhz: f64, center_freq_mhz: f64) -> Self {
        Self {
            welch: WelchPsd::new(REPLAY_SEGMENT, sample_rate_mhz),
            center_freq_mhz,
        }
    }

    /// Click at display coordinates (x, y). Note the axis swap: x selects
    /// the cache column, y the row. Clicks on unsampled cells are a no-op.
    pub fn inspect(&self, map: &SpatialMap, x: i32, y: i32) -> Option<SpectrumView> {
        if x < 0 || y < 0 {
            return None;
        }
        let row = y as usize / SCALE;
        let col = x as usize / SCALE;
        let Some(samples) = map.spectrum(row, col) else {
            debug!("click at ({x}, {y}): cache cell ({row}, {col}) empty");
            return None;
        };
        info!("spectrum replay for cache cell ({row}, {col})");

        let psd = self.welch.estimate(&samples);
        let freqs = self.welch.frequencies();

        // fftshift so the axis runs low to high through the center frequency.
        let n = psd.len();
        let half = n / 2;
        let mut frequencies_mhz = Vec::with_capacity(n);
        let mut psd_db = Vec::with_capacity(n);
        for i in (half..n).chain(0..half) {
            frequencies_mhz.push(freqs[i] + self.center_freq_mhz);
            psd_db.push(10.0 * psd[i].max(1e-300).log10());
        }

        Some(SpectrumView {
            row,
            col,
            frequencies_mhz,
            psd_db,
        })
    }
}
