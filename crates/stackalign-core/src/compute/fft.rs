use std::sync::Arc;

use ndarray::{aview1, Array2, ArrayViewMut1, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Complex 2D spectrum of a correlation window.
pub type Spectrum = Array2<Complex<f64>>;

/// 2D forward FFT: row-wise, then column-wise. Large windows process their
/// lanes in parallel.
pub fn fft2d_forward(data: &Array2<f32>) -> Spectrum {
    let mut work = data.mapv(|v| Complex::new(v as f64, 0.0));
    transform(&mut work, FftDirection::Forward);
    work
}

/// 2D inverse FFT, returning the real part normalized by `1/(h*w)`.
pub fn ifft2d_real(spectrum: &Spectrum) -> Array2<f64> {
    let mut work = spectrum.clone();
    transform(&mut work, FftDirection::Inverse);
    let scale = 1.0 / work.len().max(1) as f64;
    work.mapv(|c| c.re * scale)
}

fn transform(work: &mut Spectrum, direction: FftDirection) {
    let (h, w) = work.dim();
    if h == 0 || w == 0 {
        return;
    }
    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft(w, direction);
    let col_fft = planner.plan_fft(h, direction);
    let parallel = h * w >= PARALLEL_PIXEL_THRESHOLD;

    // Axis(0) iterates rows, Axis(1) iterates columns.
    process_lanes(work, Axis(0), &row_fft, parallel);
    process_lanes(work, Axis(1), &col_fft, parallel);
}

fn process_lanes(work: &mut Spectrum, axis: Axis, fft: &Arc<dyn Fft<f64>>, parallel: bool) {
    let run = |mut lane: ArrayViewMut1<Complex<f64>>| {
        let mut buf = lane.to_vec();
        fft.process(&mut buf);
        lane.assign(&aview1(&buf));
    };
    if parallel {
        work.axis_iter_mut(axis).into_par_iter().for_each(run);
    } else {
        work.axis_iter_mut(axis).for_each(run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_inverse_recovers_input() {
        let data = Array2::from_shape_fn((6, 10), |(r, c)| (r * 10 + c) as f32 / 60.0);
        let back = ifft2d_real(&fft2d_forward(&data));
        for ((r, c), v) in back.indexed_iter() {
            assert!((*v - data[[r, c]] as f64).abs() < 1e-9);
        }
    }
}
