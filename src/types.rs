// src/types.rs

use std::sync::Arc;

use num_complex::Complex64;

/// Coarse-graining factor between pixel coordinates and spectrum-cache
/// coordinates. Cache cell (r, c) covers the pixel block
/// `[r*SCALE, (r+1)*SCALE) x [c*SCALE, (c+1)*SCALE)`.
pub const SCALE: usize = 10;

/// One captured RGB video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Interleaved RGB pixel data, row-major, 3 bytes per pixel.
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0u8; width * height * 3],
            width,
            height,
        }
    }

    /// Byte offset of the first channel of pixel (row, col).
    #[inline]
    pub fn pixel_index(&self, row: usize, col: usize) -> usize {
        (row * self.width + col) * 3
    }
}

/// Tracked probe rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Center of the box, (x, y) in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// One power measurement taken while tracking is armed.
#[derive(Debug, Clone)]
pub struct ProbeReading {
    /// Probe center in pixel coordinates, `None` when the tracker lost the
    /// marker this frame.
    pub position: Option<(f64, f64)>,
    pub power_dbm: f64,
    pub samples: Arc<Vec<Complex64>>,
}

/// Tracking lifecycle. `Armed` is the transient state between the user's
/// region selection and a successful tracker init; only an explicit reset
/// returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Armed,
    Tracking,
}

/// Runtime commands polled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `s` — prompt a region selection and start tracking.
    ArmTracking,
    /// `r` — clear the baseline frame and the power map.
    Reset,
    /// `q` — leave the loop and show the final map.
    Quit,
}
