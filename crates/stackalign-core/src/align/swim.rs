use ndarray::{Array2, Zip};
use num_traits::Float;

use crate::compute::fft::{fft2d_forward, ifft2d_real, Spectrum};
use crate::consts::{EPSILON, PEAK_CENTROID_RADIUS, WHITENING_GUARD};
use crate::error::{AlignError, Result};

/// Outcome of registering one window pair.
///
/// `dx > 0` means common features in the moving window lie to the right of
/// the same features in the stationary window; `dy > 0` means below.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SwimResult {
    pub dx: f64,
    pub dy: f64,
    /// Peak width estimates (square root of the second moments).
    pub width_x: f64,
    pub width_y: f64,
    /// (peak - mean) / std-dev of the correlation surface.
    pub snr: f64,
}

/// Register two equal-size spectra with a whitened cross-power correlation.
pub fn swim(stationary: &Spectrum, moving: &Spectrum, whitening: f64) -> Result<SwimResult> {
    let surface = whitened_correlation(stationary, moving, whitening)?;
    let (h, w) = surface.dim();
    if h == 0 || w == 0 {
        return Err(AlignError::InvalidWindow("empty correlation window".into()));
    }

    let (peak_row, peak_col, peak_val) = find_peak(&surface);
    let px = fold(peak_col, w);
    let py = fold(peak_row, h);

    let neighbourhood = extract_folded(&surface, peak_row, peak_col, PEAK_CENTROID_RADIUS);
    let cm = center_of_mass(&neighbourhood);

    let (mean, std) = mean_std(surface.iter().copied());
    let snr = if std > EPSILON {
        (peak_val - mean) / std
    } else {
        0.0
    };

    Ok(SwimResult {
        dx: -(px + cm.x),
        dy: -(py + cm.y),
        width_x: cm.x2.max(0.0).sqrt(),
        width_y: cm.y2.max(0.0).sqrt(),
        snr,
    })
}

/// Convenience wrapper taking raw windows instead of spectra.
pub fn swim_windows(
    stationary: &Array2<f32>,
    moving: &Array2<f32>,
    whitening: f64,
) -> Result<SwimResult> {
    let (sh, sw) = stationary.dim();
    let (mh, mw) = moving.dim();
    if sh != mh || sw != mw {
        return Err(AlignError::WindowSizeMismatch(sw, sh, mw, mh));
    }
    swim(&fft2d_forward(stationary), &fft2d_forward(moving), whitening)
}

/// Correlation surface of `P = Fs * conj(Fm)` scaled by `(|P|^2 + guard)^(w/2)`.
pub fn whitened_correlation(
    stationary: &Spectrum,
    moving: &Spectrum,
    whitening: f64,
) -> Result<Array2<f64>> {
    let (sh, sw) = stationary.dim();
    let (mh, mw) = moving.dim();
    if sh != mh || sw != mw {
        return Err(AlignError::WindowSizeMismatch(sw, sh, mw, mh));
    }

    let exponent = whitening / 2.0;
    let cross = Zip::from(stationary)
        .and(moving)
        .map_collect(|s, m| {
            let p = s * m.conj();
            let power = p.norm_sqr() + WHITENING_GUARD;
            p * power.powf(exponent)
        });

    Ok(ifft2d_real(&cross))
}

/// First maximum in row-major order: `(row, col, value)`.
fn find_peak(surface: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in surface.indexed_iter() {
        if v > best.2 {
            best = (row, col, v);
        }
    }
    best
}

/// Fold an index into `[-n/2, n/2)` to undo FFT wraparound.
fn fold(index: usize, n: usize) -> f64 {
    if index >= n.div_ceil(2) {
        index as f64 - n as f64
    } else {
        index as f64
    }
}

/// `(2r+1)^2` neighbourhood around a point, treating the surface as a torus.
fn extract_folded(surface: &Array2<f64>, row: usize, col: usize, radius: usize) -> Array2<f64> {
    let (h, w) = surface.dim();
    let n = 2 * radius + 1;
    Array2::from_shape_fn((n, n), |(r, c)| {
        let rr = (row + h * n + r - radius) % h;
        let cc = (col + w * n + c - radius) % w;
        surface[[rr, cc]]
    })
}

struct CenterOfMass {
    x: f64,
    y: f64,
    x2: f64,
    y2: f64,
}

/// Intensity-weighted centroid and second moments, with the window centre
/// at (0, 0).
fn center_of_mass(window: &Array2<f64>) -> CenterOfMass {
    let (h, w) = window.dim();
    let cy = ((h - 1) / 2) as f64;
    let cx = ((w - 1) / 2) as f64;

    let (mut sw, mut sx, mut sy, mut sxx, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((r, c), &v) in window.indexed_iter() {
        let x = c as f64 - cx;
        let y = r as f64 - cy;
        sw += v;
        sx += v * x;
        sy += v * y;
        sxx += v * x * x;
        syy += v * y * y;
    }

    if sw.abs() < EPSILON {
        return CenterOfMass {
            x: 0.0,
            y: 0.0,
            x2: 0.0,
            y2: 0.0,
        };
    }
    CenterOfMass {
        x: sx / sw,
        y: sy / sw,
        x2: sxx / sw,
        y2: syy / sw,
    }
}

/// Population mean and standard deviation.
pub fn mean_std<T: Float>(values: impl Iterator<Item = T>) -> (T, T) {
    let mut n = T::zero();
    let mut sum = T::zero();
    let mut sum_sq = T::zero();
    for v in values {
        n = n + T::one();
        sum = sum + v;
        sum_sq = sum_sq + v * v;
    }
    if n == T::zero() {
        return (T::zero(), T::zero());
    }
    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(T::zero());
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_even_and_odd() {
        assert_eq!(fold(3, 8), 3.0);
        assert_eq!(fold(4, 8), -4.0);
        assert_eq!(fold(7, 8), -1.0);
        assert_eq!(fold(2, 5), 2.0);
        assert_eq!(fold(3, 5), -2.0);
    }

    #[test]
    fn test_center_of_mass_symmetric_is_zero() {
        let mut w = Array2::<f64>::zeros((11, 11));
        w[[5, 5]] = 4.0;
        w[[5, 4]] = 1.0;
        w[[5, 6]] = 1.0;
        let cm = center_of_mass(&w);
        assert!(cm.x.abs() < 1e-12);
        assert!(cm.y.abs() < 1e-12);
        assert!((cm.x2 - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_std() {
        let (m, s) = mean_std([1.0f64, 3.0].into_iter());
        assert!((m - 2.0).abs() < 1e-12);
        assert!((s - 1.0).abs() < 1e-12);
    }
}
