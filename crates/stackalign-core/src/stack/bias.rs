use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::affine::{compose, AffineMatrix};
use crate::consts::EPSILON;
use crate::error::{AlignError, Result};

/// Rotation, scale, skew and translation read off a cumulative affine.
///
/// Rotation comes from the first column, then scale_y and skew_x are solved
/// with that rotation held fixed. Not a QR or SVD factorisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposition {
    pub rot: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub skew_x: f64,
    pub x: f64,
    pub y: f64,
    pub det: f64,
}

/// Degenerate linear parts give finite components: a zero first column
/// has no rotation, and a zero `scale_y` has no skew.
pub fn decompose(m: &AffineMatrix) -> Decomposition {
    let [[c00, c01, c02], [c10, c11, c12]] = m.rows();
    let rot = finite_or_zero((c10 / c00).atan());
    let (sin, cos) = rot.sin_cos();
    let scale_x = (c00 * c00 + c10 * c10).sqrt();
    let scale_y = c11 * cos - c01 * sin;
    let skew_x = if scale_y.abs() < f64::EPSILON {
        0.0
    } else {
        finite_or_zero((c01 * cos + c11 * sin) / scale_y)
    };
    Decomposition {
        rot,
        scale_x,
        scale_y,
        skew_x,
        x: c02,
        y: c12,
        det: c00 * c11 - c01 * c10,
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// `translate * rotate * scale * skew`, applied right to left.
pub fn correction_matrix(
    skew_x: f64,
    scale_x: f64,
    scale_y: f64,
    rot: f64,
    x: f64,
    y: f64,
) -> AffineMatrix {
    let m = compose(&AffineMatrix::scaling(scale_x, scale_y), &AffineMatrix::skew_x(skew_x));
    let m = compose(&AffineMatrix::rotation(rot), &m);
    compose(&AffineMatrix::translation(x, y), &m)
}

/// Least-squares polynomial fit of `ys` against `xs`. Coefficients are
/// returned lowest order first. Columns of the Vandermonde matrix are
/// normalised before the solve to keep higher orders conditioned.
pub fn polyfit(xs: &[f64], ys: &[f64], order: usize) -> Result<Vec<f64>> {
    let n = xs.len();
    if n == 0 || n != ys.len() {
        return Err(AlignError::EmptyStack);
    }
    let cols = order + 1;
    let mut a = DMatrix::from_fn(n, cols, |r, c| xs[r].powi(c as i32));
    let scale: Vec<f64> = (0..cols)
        .map(|c| {
            let norm = a.column(c).norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect();
    for (c, s) in scale.iter().enumerate() {
        a.column_mut(c).unscale_mut(*s);
    }

    let b = DVector::from_column_slice(ys);
    let coeffs = a
        .svd(true, true)
        .solve(&b, EPSILON)
        .map_err(|e| AlignError::Config(format!("polynomial fit failed: {e}")))?;
    Ok(coeffs.iter().zip(&scale).map(|(c, s)| c / s).collect())
}

/// Horner evaluation of lowest-order-first coefficients.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Coefficients of the first derivative.
pub fn derivative(coeffs: &[f64]) -> Vec<f64> {
    coeffs
        .iter()
        .enumerate()
        .skip(1)
        .map(|(k, c)| c * k as f64)
        .collect()
}

/// Polynomial trend of each decomposition component versus layer index.
#[derive(Clone, Debug, PartialEq)]
pub struct BiasFuncs {
    pub skew_x: Vec<f64>,
    pub scale_x: Vec<f64>,
    pub scale_y: Vec<f64>,
    pub rot: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl BiasFuncs {
    /// Fit every component of `cafms` (one per layer, in order).
    /// The order is clamped to `cafms.len() - 1`.
    pub fn fit(cafms: &[AffineMatrix], poly_order: usize) -> Result<Self> {
        if cafms.is_empty() {
            return Err(AlignError::EmptyStack);
        }
        let order = poly_order.min(cafms.len() - 1);
        let xs: Vec<f64> = (0..cafms.len()).map(|i| i as f64).collect();
        let parts: Vec<Decomposition> = cafms.iter().map(decompose).collect();
        let fit = |f: fn(&Decomposition) -> f64| -> Result<Vec<f64>> {
            let ys: Vec<f64> = parts.iter().map(f).collect();
            polyfit(&xs, &ys, order)
        };

        let funcs = Self {
            skew_x: fit(|d| d.skew_x)?,
            scale_x: fit(|d| d.scale_x)?,
            scale_y: fit(|d| d.scale_y)?,
            rot: fit(|d| d.rot)?,
            x: fit(|d| d.x)?,
            y: fit(|d| d.y)?,
        };
        debug!(order, ?funcs, "Fitted bias functions");
        Ok(funcs)
    }

    /// Add the non-constant terms of a fresh fit over `cafms`, keeping the
    /// constant terms of the first fit.
    pub fn refit(&mut self, cafms: &[AffineMatrix]) -> Result<()> {
        let order = self.x.len().saturating_sub(1);
        let next = Self::fit(cafms, order)?;
        for (acc, new) in [
            (&mut self.skew_x, &next.skew_x),
            (&mut self.scale_x, &next.scale_x),
            (&mut self.scale_y, &next.scale_y),
            (&mut self.rot, &next.rot),
            (&mut self.x, &next.x),
            (&mut self.y, &next.y),
        ] {
            for (a, n) in acc.iter_mut().zip(new).skip(1) {
                *a += n;
            }
        }
        Ok(())
    }

    /// Per-layer correction: the inverse of the trend's slope at `index`.
    pub fn bias_mat(&self, index: usize) -> AffineMatrix {
        let x = index as f64;
        let slope = |p: &[f64]| polyval(&derivative(p), x);
        correction_matrix(
            -slope(&self.skew_x),
            1.0 - slope(&self.scale_x),
            1.0 - slope(&self.scale_y),
            -slope(&self.rot),
            -slope(&self.x),
            -slope(&self.y),
        )
    }

    /// Starting cumulative affine that cancels the trend's constant terms.
    pub fn init_cafm(&self) -> AffineMatrix {
        let c = |p: &[f64]| p.first().copied().unwrap_or(0.0);
        let inv_scale = |p: &[f64]| {
            let s = c(p);
            if s.abs() > EPSILON {
                1.0 / s
            } else {
                1.0
            }
        };
        correction_matrix(
            -c(&self.skew_x),
            inv_scale(&self.scale_x),
            inv_scale(&self.scale_y),
            -c(&self.rot),
            -c(&self.x),
            -c(&self.y),
        )
    }
}
