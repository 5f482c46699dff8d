use ndarray::Array2;
use rayon::prelude::*;

use crate::affine::{AffineMatrix, Point};
use crate::compute::{RegistrationBackend, Spectrum};
use crate::error::{AlignError, Result};
use crate::frame::ImageSize;
use crate::interp::{bilinear_sample, bilinear_sample_clamped};

/// Per-window results of one multi-window SWIM pass.
#[derive(Clone, Debug, Default)]
pub struct MultiSwim {
    /// Shift to add to each moving point, in moving-image coordinates.
    pub shifts: Vec<Point>,
    /// Peak widths (x, y) per window.
    pub widths: Vec<Point>,
    pub snr: Vec<f64>,
}

/// Fade the outer quarter on each side of the window to its mean with a
/// raised-cosine profile.
pub fn apodize(window: &Array2<f32>) -> Array2<f32> {
    let (h, w) = window.dim();
    let gray = window.mean().unwrap_or(0.0);
    let wy = apodization_profile(h);
    let wx = apodization_profile(w);
    Array2::from_shape_fn((h, w), |(r, c)| {
        let a = wy[r] * wx[c];
        a * window[[r, c]] + (1.0 - a) * gray
    })
}

fn apodization_profile(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = if n > 1 {
                -1.0 + 2.0 * i as f64 / (n - 1) as f64
            } else {
                0.0
            };
            if t.abs() > 0.5 {
                (0.5 - 0.5 * (std::f64::consts::TAU * t).cos()) as f32
            } else {
                1.0
            }
        })
        .collect()
}

/// Axis-aligned window centred on `center` (sub-pixel, edges replicated).
pub fn extract_straight_window(img: &Array2<f32>, center: Point, size: ImageSize) -> Array2<f32> {
    let x0 = center.x - size.width as f64 / 2.0;
    let y0 = center.y - size.height as f64 / 2.0;
    Array2::from_shape_fn((size.height, size.width), |(r, c)| {
        bilinear_sample_clamped(img, y0 + r as f64, x0 + c as f64)
    })
}

/// Window centred on `center` sampled through the linear part of `afm`,
/// so that the window centre maps to `center` itself. Zero outside.
pub fn extract_transformed_window(
    img: &Array2<f32>,
    center: Point,
    afm: &AffineMatrix,
    size: ImageSize,
) -> Array2<f32> {
    let half = Point::new(size.width as f64 / 2.0, size.height as f64 / 2.0);
    Array2::from_shape_fn((size.height, size.width), |(r, c)| {
        let q = center + afm.apply_linear(Point::new(c as f64, r as f64) - half);
        bilinear_sample(img, q.y, q.x, 0.0)
    })
}

fn check_window(size: ImageSize) -> Result<()> {
    if size.width < 2 || size.height < 2 {
        return Err(AlignError::InvalidWindow(format!(
            "window {}x{} is too small",
            size.width, size.height
        )));
    }
    Ok(())
}

/// Apodized, Fourier-transformed stationary windows at each centre.
pub fn stationary_patches(
    backend: &dyn RegistrationBackend,
    img: &Array2<f32>,
    centers: &[Point],
    size: ImageSize,
) -> Result<Vec<Spectrum>> {
    check_window(size)?;
    Ok(centers
        .par_iter()
        .map(|&p| backend.spectrum(&apodize(&extract_straight_window(img, p, size))))
        .collect())
}

/// Apodized, Fourier-transformed moving windows centred on `centers`
/// (already in moving-image coordinates), sampled through the linear part
/// of `afm`. Both windows carry the same taper, so a window pair that
/// already matches correlates to an even surface with its centroid at zero.
pub fn moving_patches(
    backend: &dyn RegistrationBackend,
    img: &Array2<f32>,
    centers: &[Point],
    afm: &AffineMatrix,
    size: ImageSize,
) -> Result<Vec<Spectrum>> {
    check_window(size)?;
    Ok(centers
        .par_iter()
        .map(|&p| backend.spectrum(&apodize(&extract_transformed_window(img, p, afm, size))))
        .collect())
}

/// Run SWIM on each window pair and map the window-space shifts back into
/// moving-image space through the linear part of `afm`.
pub fn multi_swim(
    backend: &dyn RegistrationBackend,
    stationary: &[Spectrum],
    moving: &[Spectrum],
    whitening: f64,
    afm: &AffineMatrix,
) -> Result<MultiSwim> {
    if stationary.len() != moving.len() {
        return Err(AlignError::MatchPointMismatch {
            stationary: stationary.len(),
            moving: moving.len(),
        });
    }

    let results: Vec<_> = stationary
        .par_iter()
        .zip(moving.par_iter())
        .map(|(s, m)| backend.swim(s, m, whitening))
        .collect::<Result<_>>()?;

    let mut out = MultiSwim::default();
    for r in results {
        out.shifts.push(afm.apply_linear(Point::new(r.dx, r.dy)));
        out.widths.push(Point::new(r.width_x, r.width_y));
        out.snr.push(r.snr);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apodization_profile_edges() {
        let p = apodization_profile(9);
        assert!(p[0].abs() < 1e-6);
        assert!(p[8].abs() < 1e-6);
        assert_eq!(p[4], 1.0);
    }

    #[test]
    fn test_straight_window_integer_centre() {
        let img = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f32);
        let win = extract_straight_window(&img, Point::new(4.0, 4.0), ImageSize::new(4, 4));
        assert_eq!(win[[0, 0]], img[[2, 2]]);
        assert_eq!(win[[3, 3]], img[[5, 5]]);
    }
}
