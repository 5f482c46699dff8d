use crate::align::mir::{mir_iterate, MirFit, PointSet};
use crate::align::swim::{swim, SwimResult};
use crate::error::Result;

use super::{RegistrationBackend, Spectrum};

/// Embedded backend: rustfft correlation and nalgebra least squares,
/// parallelized with Rayon for large windows.
pub struct CpuBackend;

impl RegistrationBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn swim(&self, stationary: &Spectrum, moving: &Spectrum, whitening: f64) -> Result<SwimResult> {
        swim(stationary, moving, whitening)
    }

    fn fit(&self, points: &PointSet, rms_threshold: f64, min_points: usize) -> Result<MirFit> {
        mir_iterate(points, rms_threshold, min_points)
    }
}
