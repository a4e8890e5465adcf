// src/blur.rs

use ndarray::Array2;

/// NaN-aware Gaussian smoothing of a sparse scalar grid, rescaled to an
/// 8-bit heat-map-ready range.
///
/// The grid is split into a value plane V (NaN replaced by 0) and a validity
/// plane W (1 where sampled, 0 elsewhere). Both are blurred with the same
/// kernel and the ratio VV/WW renormalizes each cell by the local sample
/// density, so sparse data is not pulled toward zero. The ratio is then
/// linearly rescaled to [0, 255] using the min/max of the whole ratio array
/// and originally-unsampled cells are forced back to 0.
///
/// The min/max is deliberately taken over the full array, including cells
/// that will be forced to zero afterwards. That biases the output range when
/// data is sparse; downstream rendering depends on this behavior, keep it.
///
/// A grid with no valid cells, or one whose ratio has no spread, comes out
/// all-zero. Division by zero is suppressed into NaN, never raised.
pub fn blur_nan(grid: &Array2<f64>, sigma: f64) -> Array2<u8> {
    let mut values = Array2::<f64>::zeros(grid.raw_dim());
    let mut weights = Array2::<f64>::zeros(grid.raw_dim());
    for ((v, w), &g) in values.iter_mut().zip(weights.iter_mut()).zip(grid.iter()) {
        if g.is_nan() {
            *v = 0.0;
            *w = 0.0;
        } else {
            *v = g;
            *w = 1.0;
        }
    }

    let blurred_values = gaussian_filter(&values, sigma);
    let blurred_weights = gaussian_filter(&weights, sigma);

    let mut ratio = blurred_values;
    for (r, w) in ratio.iter_mut().zip(blurred_weights.iter()) {
        // 0/0 yields NaN, x/0 yields inf; both are suppressed below.
        *r /= w;
    }

    let lo = nan_min(&ratio);
    let hi = nan_max(&ratio);
    let span = hi - lo;

    let mut out = Array2::<u8>::zeros(grid.raw_dim());
    for ((o, &r), &g) in out.iter_mut().zip(ratio.iter()).zip(grid.iter()) {
        if g.is_nan() {
            continue;
        }
        let scaled = (r - lo) * 255.0 / span;
        if scaled.is_finite() {
            *o = scaled.clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Separable Gaussian convolution with reflecting boundaries, kernel radius
/// `trunc(4*sigma + 0.5)`.
pub fn gaussian_filter(grid: &Array2<f64>, sigma: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(sigma);
    let rows = convolve_rows(grid, &kernel);
    convolve_cols(&rows, &kernel)
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in 0..=2 * radius {
        let d = i as f64 - radius as f64;
        kernel.push((-d * d / (2.0 * sigma * sigma)).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Mirror an out-of-range index back into [0, n), duplicating the edge
/// sample: -1 -> 0, -2 -> 1, n -> n-1.
fn reflect(mut i: isize, n: isize) -> usize {
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}

fn convolve_rows(grid: &Array2<f64>, kernel: &[f64]) -> Array2<f64> {
    let (nrows, ncols) = grid.dim();
    let radius = kernel.len() / 2;
    let mut out = Array2::<f64>::zeros(grid.raw_dim());
    for r in 0..nrows {
        for c in 0..ncols {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let src = reflect(c as isize + k as isize - radius as isize, ncols as isize);
                acc += kv * grid[[r, src]];
            }
            out[[r, c]] = acc;
        }
    }
    out
}

fn convolve_cols(grid: &Array2<f64>, kernel: &[f64]) -> Array2<f64> {
    let (nrows, ncols) = grid.dim();
    let radius = kernel.len() / 2;
    let mut out = Array2::<f64>::zeros(grid.raw_dim());
    for r in 0..nrows {
        for c in 0..ncols {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let src = reflect(r as isize + k as isize - radius as isize, nrows as isize);
                acc += kv * grid[[src, c]];
            }
            out[[r, c]] = acc;
        }
    }
    out
}

fn nan_min(grid: &Array2<f64>) -> f64 {
    grid.iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::INFINITY, f64::min)
}

fn nan_max(grid: &Array2<f64>) -> f64 {
    grid.iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = gaussian_kernel(3.0);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(kernel.len(), 2 * 12 + 1);
    }

    #[test]
    fn test_nan_free_grid_spans_full_range() {
        let mut grid = Array2::<f64>::zeros((40, 40));
        for ((r, c), v) in grid.indexed_iter_mut() {
            *v = (r * 40 + c) as f64;
        }
        let out = blur_nan(&grid, 2.0);
        let min = *out.iter().min().unwrap();
        let max = *out.iter().max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_all_nan_grid_is_all_zero() {
        let grid = Array2::<f64>::from_elem((20, 20), f64::NAN);
        let out = blur_nan(&grid, 7.0);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_zero_variance_grid_is_all_zero() {
        let grid = Array2::<f64>::from_elem((20, 20), -45.0);
        let out = blur_nan(&grid, 7.0);
        // (x - min) * 255 / 0 is suppressed, not raised.
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_unsampled_cells_forced_to_zero() {
        let mut grid = Array2::<f64>::from_elem((30, 30), f64::NAN);
        for r in 10..20 {
            for c in 10..20 {
                grid[[r, c]] = if r < 15 { -50.0 } else { -40.0 };
            }
        }
        let out = blur_nan(&grid, 3.0);
        assert_eq!(out[[0, 0]], 0);
        assert_eq!(out[[29, 29]], 0);
        // Sampled region keeps signal.
        assert!(out[[17, 15]] > 0);
    }

    #[test]
    fn test_density_renormalization_preserves_level() {
        // A single sampled cell should blur back to roughly its own level,
        // not be dragged toward zero by the empty neighborhood.
        let mut grid = Array2::<f64>::from_elem((21, 21), f64::NAN);
        grid[[10, 10]] = -40.0;
        let values_only = {
            let mut v = Array2::<f64>::zeros((21, 21));
            v[[10, 10]] = -40.0;
            gaussian_filter(&v, 3.0)
        };
        // Without renormalization the center would be far below the input.
        assert!(values_only[[10, 10]].abs() < 5.0);

        let out = blur_nan(&grid, 3.0);
        // Every unsampled cell is forced back to zero; the single sampled
        // cell lands wherever the near-flat ratio rescales it.
        for ((r, c), &v) in out.indexed_iter() {
            if (r, c) != (10, 10) {
                assert_eq!(v, 0);
            }
        }
    }

    #[test]
    fn test_reflect_boundary() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(2, 5), 2);
    }
}
