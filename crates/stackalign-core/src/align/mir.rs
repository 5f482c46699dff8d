use nalgebra::{DMatrix, Matrix3, Matrix3x2};
use tracing::debug;

use crate::affine::{AffineMatrix, Point};
use crate::consts::{DEGENERATE_DETERMINANT, EPSILON};
use crate::error::{AlignError, Result};

/// Paired coordinates between a stationary and a moving image, indexed 1:1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSet {
    stationary: Vec<Point>,
    moving: Vec<Point>,
}

impl PointSet {
    pub fn new(stationary: Vec<Point>, moving: Vec<Point>) -> Result<Self> {
        if stationary.len() != moving.len() {
            return Err(AlignError::MatchPointMismatch {
                stationary: stationary.len(),
                moving: moving.len(),
            });
        }
        Ok(Self { stationary, moving })
    }

    pub fn len(&self) -> usize {
        self.stationary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stationary.is_empty()
    }

    pub fn stationary(&self) -> &[Point] {
        &self.stationary
    }

    pub fn moving(&self) -> &[Point] {
        &self.moving
    }

    fn remove(&mut self, index: usize) {
        self.stationary.remove(index);
        self.moving.remove(index);
    }
}

/// Result of a multi-point affine fit mapping stationary to moving points.
#[derive(Clone, Debug, PartialEq)]
pub struct MirFit {
    pub afm: AffineMatrix,
    /// Root-mean-square residual in pixels (0 for exact fits).
    pub rms: f64,
    /// Number of point pairs the fit was computed from.
    pub retained: usize,
    /// Squared residual per retained point (empty for exact fits).
    pub residuals: Vec<f64>,
}

/// Fit the affine mapping `points.stationary()` onto `points.moving()`.
///
/// One pair gives a translation. Two pairs get a third synthetic pair by
/// rotating the second point 90 degrees about the first in both sets, which
/// yields a similarity transform. Three pairs are solved exactly; more are
/// solved by least squares.
pub fn mir_affine(points: &PointSet) -> Result<MirFit> {
    let pa = points.stationary();
    let pb = points.moving();

    match pa.len() {
        0 => Ok(exact_fit(AffineMatrix::IDENTITY, 0)),
        1 => {
            let t = pb[0] - pa[0];
            Ok(exact_fit(AffineMatrix::translation(t.x, t.y), 1))
        }
        2 => {
            let sa = [pa[0], pa[1], synthetic_point(pa[0], pa[1])];
            let sb = [pb[0], pb[1], synthetic_point(pb[0], pb[1])];
            Ok(exact_fit(solve_three(&sa, &sb)?, 2))
        }
        3 => Ok(exact_fit(solve_three(&[pa[0], pa[1], pa[2]], &[pb[0], pb[1], pb[2]])?, 3)),
        _ => least_squares(pa, pb),
    }
}

/// Fit repeatedly, dropping the worst pair while the RMS exceeds
/// `rms_threshold` and more than `min_points` pairs remain.
///
/// Stopping at the point floor is not an error: the returned RMS may still
/// exceed the threshold.
pub fn mir_iterate(points: &PointSet, rms_threshold: f64, min_points: usize) -> Result<MirFit> {
    let mut working = points.clone();
    loop {
        let fit = mir_affine(&working)?;
        if fit.rms > rms_threshold && working.len() > min_points {
            let worst = worst_index(&fit.residuals);
            debug!(
                dropped = worst,
                rms = fit.rms,
                remaining = working.len() - 1,
                "Dropping worst match"
            );
            working.remove(worst);
        } else {
            return Ok(fit);
        }
    }
}

fn exact_fit(afm: AffineMatrix, retained: usize) -> MirFit {
    MirFit {
        afm,
        rms: 0.0,
        retained,
        residuals: Vec::new(),
    }
}

fn synthetic_point(p0: Point, p1: Point) -> Point {
    Point::new(p0.x - (p0.y - p1.y), p0.y + (p0.x - p1.x))
}

fn solve_three(pa: &[Point; 3], pb: &[Point; 3]) -> Result<AffineMatrix> {
    let a = Matrix3::new(
        pa[0].x, pa[0].y, 1.0, //
        pa[1].x, pa[1].y, 1.0, //
        pa[2].x, pa[2].y, 1.0,
    );
    let b = Matrix3x2::new(
        pb[0].x, pb[0].y, //
        pb[1].x, pb[1].y, //
        pb[2].x, pb[2].y,
    );
    let det = a.determinant();
    if det.abs() < DEGENERATE_DETERMINANT {
        return Err(AlignError::DegenerateTransform { determinant: det });
    }
    let inv = a
        .try_inverse()
        .ok_or(AlignError::DegenerateTransform { determinant: det })?;
    let x = inv * b;
    Ok(AffineMatrix::new(
        x[(0, 0)],
        x[(1, 0)],
        x[(2, 0)],
        x[(0, 1)],
        x[(1, 1)],
        x[(2, 1)],
    ))
}

fn least_squares(pa: &[Point], pb: &[Point]) -> Result<MirFit> {
    let n = pa.len();
    let a = DMatrix::from_fn(n, 3, |r, c| match c {
        0 => pa[r].x,
        1 => pa[r].y,
        _ => 1.0,
    });
    let b = DMatrix::from_fn(n, 2, |r, c| if c == 0 { pb[r].x } else { pb[r].y });

    let x = a
        .svd(true, true)
        .solve(&b, EPSILON)
        .map_err(|_| AlignError::DegenerateTransform { determinant: 0.0 })?;

    let afm = AffineMatrix::new(
        x[(0, 0)],
        x[(1, 0)],
        x[(2, 0)],
        x[(0, 1)],
        x[(1, 1)],
        x[(2, 1)],
    );
    if !afm.is_finite() {
        return Err(AlignError::DegenerateTransform {
            determinant: afm.determinant(),
        });
    }

    let residuals: Vec<f64> = pa
        .iter()
        .zip(pb)
        .map(|(&p, &q)| (crate::affine::apply(&afm, p) - q).norm_sqr())
        .collect();
    let rms = (residuals.iter().sum::<f64>() / n as f64).sqrt();

    Ok(MirFit {
        afm,
        rms,
        retained: n,
        residuals,
    })
}

/// Index of the first maximal residual.
fn worst_index(residuals: &[f64]) -> usize {
    let mut worst = 0;
    for (i, &r) in residuals.iter().enumerate() {
        if r > residuals[worst] {
            worst = i;
        }
    }
    worst
}
