// src/overlay.rs

use ndarray::Array2;

use crate::types::Frame;

/// Mid-value written into the red channel of scanned pixels.
const SCANNED_MARK: u8 = 127;

/// Cheap scanned-region indicator: every pixel whose power-map cell has data
/// gets its red channel replaced with a fixed mid-value. No blur involved;
/// this runs on the live frame every iteration.
pub fn paint_scanned_region(frame: &mut Frame, validity: &Array2<bool>) {
    let (nrows, ncols) = validity.dim();
    let rows = nrows.min(frame.height);
    let cols = ncols.min(frame.width);
    for r in 0..rows {
        for c in 0..cols {
            if validity[[r, c]] {
                let i = frame.pixel_index(r, c);
                frame.data[i] = SCANNED_MARK;
            }
        }
    }
}

/// OpenCV-style HOT colormap: black through red and yellow to white.
pub fn hot_color(v: u8) -> [u8; 3] {
    let t = v as f64 / 255.0;
    let r = (3.0 * t * 255.0).clamp(0.0, 255.0) as u8;
    let g = ((3.0 * t - 1.0) * 255.0).clamp(0.0, 255.0) as u8;
    let b = ((3.0 * t - 2.0) * 255.0).clamp(0.0, 255.0) as u8;
    [r, g, b]
}

/// False-color a blurred power grid into an RGB frame.
pub fn render_heat_map(blurred: &Array2<u8>) -> Frame {
    let (nrows, ncols) = blurred.dim();
    let mut frame = Frame::new(ncols, nrows);
    for ((r, c), &v) in blurred.indexed_iter() {
        let i = frame.pixel_index(r, c);
        frame.data[i..i + 3].copy_from_slice(&hot_color(v));
    }
    frame
}

/// Weighted blend of two equally sized frames, `alpha * base + beta * over`.
/// The preview uses the fixed 0.4/0.6 mix of baseline and heat map.
pub fn blend(base: &Frame, over: &Frame, alpha: f64, beta: f64) -> Frame {
    debug_assert_eq!((base.width, base.height), (over.width, over.height));
    let mut out = Frame::new(base.width, base.height);
    for ((o, &a), &b) in out
        .data
        .iter_mut()
        .zip(base.data.iter())
        .zip(over.data.iter())
    {
        *o = (alpha * a as f64 + beta * b as f64).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// The heat-map preview shown while scanning: baseline backdrop with the
/// blurred, false-colored power map on top.
pub fn render_preview(baseline: &Frame, blurred: &Array2<u8>) -> Frame {
    let heat = render_heat_map(blurred);
    blend(baseline, &heat, 0.4, 0.6)
}

/// Caption for the final static image.
pub fn summary_caption(min_dbm: f64, max_dbm: f64) -> String {
    format!("EMI map (min. {min_dbm:.2} dBm, max. {max_dbm:.2} dBm)")
}
