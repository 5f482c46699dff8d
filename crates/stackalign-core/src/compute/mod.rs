pub mod cpu;
pub mod fft;

use std::sync::Arc;

use ndarray::Array2;

use crate::align::mir::{MirFit, PointSet};
use crate::align::swim::SwimResult;
use crate::error::Result;

pub use cpu::CpuBackend;
pub use fft::Spectrum;

/// The two numeric primitives every recipe is built from: window
/// registration and multi-point affine fitting.
///
/// The embedded [`CpuBackend`] is the only implementation shipped here; an
/// implementation wrapping external correlation/fit programs plugs in at
/// this seam without touching recipes or the orchestrator.
pub trait RegistrationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fourier transform of a window. Callers cache this for stationary
    /// windows reused across iterations.
    fn spectrum(&self, window: &Array2<f32>) -> Spectrum {
        fft::fft2d_forward(window)
    }

    /// Sub-pixel shift of the moving window relative to the stationary one.
    fn swim(&self, stationary: &Spectrum, moving: &Spectrum, whitening: f64) -> Result<SwimResult>;

    /// Affine fit with iterative worst-point rejection.
    fn fit(&self, points: &PointSet, rms_threshold: f64, min_points: usize) -> Result<MirFit>;
}

/// Create the default registration backend.
pub fn create_backend() -> Arc<dyn RegistrationBackend> {
    Arc::new(CpuBackend)
}
