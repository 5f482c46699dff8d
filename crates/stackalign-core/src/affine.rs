use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::consts::DEGENERATE_DETERMINANT;
use crate::error::{AlignError, Result};
use crate::frame::{ImageSize, Rect};

/// A 2D point in pixel coordinates. Serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm_sqr(self) -> f64 {
        self.x * self.x + self.y * self.y
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// 2x3 affine transform `[[a, b, tx], [c, d, ty]]`.
///
/// Maps stationary (reference) coordinates to moving (base) coordinates:
/// `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`. Serialized as the nested
/// row array; non-finite entries are rejected on load.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 2]", into = "[[f64; 3]; 2]")]
pub struct AffineMatrix {
    rows: [[f64; 3]; 2],
}

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub const fn new(a: f64, b: f64, tx: f64, c: f64, d: f64, ty: f64) -> Self {
        Self {
            rows: [[a, b, tx], [c, d, ty]],
        }
    }

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    /// Counter-clockwise rotation (in image coordinates) about the origin.
    pub fn rotation(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self::new(c, -s, 0.0, s, c, 0.0)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn skew_x(k: f64) -> Self {
        Self::new(1.0, k, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn rows(&self) -> [[f64; 3]; 2] {
        self.rows
    }

    /// Entry at `(row, col)`; row in 0..2, col in 0..3.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().flatten().all(|v| v.is_finite())
    }

    pub fn determinant(&self) -> f64 {
        self.rows[0][0] * self.rows[1][1] - self.rows[0][1] * self.rows[1][0]
    }

    pub fn translation_part(&self) -> Point {
        Point::new(self.rows[0][2], self.rows[1][2])
    }

    /// Apply only the 2x2 linear part (for displacement vectors).
    pub fn apply_linear(&self, v: Point) -> Point {
        let [[a, b, _], [c, d, _]] = self.rows;
        Point::new(a * v.x + b * v.y, c * v.x + d * v.y)
    }

    /// Same linear part, translation replaced.
    pub fn with_translation(&self, t: Point) -> Self {
        let [[a, b, _], [c, d, _]] = self.rows;
        Self::new(a, b, t.x, c, d, t.y)
    }

    /// Linear part unchanged, translation multiplied by `factor`.
    /// Used to carry an affine from a coarser resolution level.
    pub fn scale_translation(&self, factor: f64) -> Self {
        self.with_translation(self.translation_part() * factor)
    }

    pub fn approx_eq(&self, other: &AffineMatrix, tol: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<[[f64; 3]; 2]> for AffineMatrix {
    type Error = String;

    fn try_from(rows: [[f64; 3]; 2]) -> std::result::Result<Self, Self::Error> {
        let m = AffineMatrix { rows };
        if m.is_finite() {
            Ok(m)
        } else {
            Err(format!("affine matrix has non-finite entries: {:?}", rows))
        }
    }
}

impl From<AffineMatrix> for [[f64; 3]; 2] {
    fn from(m: AffineMatrix) -> Self {
        m.rows
    }
}

impl fmt::Display for AffineMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [[a, b, tx], [c, d, ty]] = self.rows;
        write!(
            f,
            "[[{:.6}, {:.6}, {:.4}], [{:.6}, {:.6}, {:.4}]]",
            a, b, tx, c, d, ty
        )
    }
}

/// Transform that applies `b` first, then `a` (homogeneous product `a * b`).
pub fn compose(a: &AffineMatrix, b: &AffineMatrix) -> AffineMatrix {
    let [[a00, a01, a02], [a10, a11, a12]] = a.rows;
    let [[b00, b01, b02], [b10, b11, b12]] = b.rows;
    AffineMatrix::new(
        a00 * b00 + a01 * b10,
        a00 * b01 + a01 * b11,
        a00 * b02 + a01 * b12 + a02,
        a10 * b00 + a11 * b10,
        a10 * b01 + a11 * b11,
        a10 * b02 + a11 * b12 + a12,
    )
}

/// Homogeneous inverse. Fails on a (near) singular linear part.
pub fn invert(m: &AffineMatrix) -> Result<AffineMatrix> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < DEGENERATE_DETERMINANT {
        return Err(AlignError::DegenerateTransform { determinant: det });
    }
    let [[a, b, tx], [c, d, ty]] = m.rows;
    let ia = d / det;
    let ib = -b / det;
    let ic = -c / det;
    let id = a / det;
    Ok(AffineMatrix::new(
        ia,
        ib,
        -(ia * tx + ib * ty),
        ic,
        id,
        -(ic * tx + id * ty),
    ))
}

pub fn apply(m: &AffineMatrix, p: Point) -> Point {
    m.apply_linear(p) + m.translation_part()
}

pub fn apply_points(m: &AffineMatrix, points: &[Point]) -> Vec<Point> {
    points.iter().map(|&p| apply(m, p)).collect()
}

/// Map the four corners of a `size` rectangle through `invert(m)` and return
/// the enclosing integer rectangle (floor of min, ceil of max).
pub fn bounding_rect_under_inverse(m: &AffineMatrix, size: ImageSize) -> Result<Rect> {
    let inv = invert(m)?;
    let (w, h) = (size.width as f64, size.height as f64);
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(0.0, h),
        Point::new(w, h),
    ];

    let mut min = Point::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for c in corners {
        let p = apply(&inv, c);
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }

    let x0 = min.x.floor() as i64;
    let y0 = min.y.floor() as i64;
    let x1 = max.x.ceil() as i64;
    let y1 = max.y.ceil() as i64;
    Ok(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_rejects_non_finite() {
        let parsed: std::result::Result<AffineMatrix, _> =
            serde_json::from_str("[[1.0, 0.0, 0.0], [0.0, 1.0, 1e999]]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_point_serializes_as_pair() {
        let json = serde_json::to_string(&Point::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
    }
}
