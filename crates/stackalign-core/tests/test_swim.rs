mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use stackalign_core::align::window::apodize;
use stackalign_core::align::{swim_windows, SwimResult};
use stackalign_core::consts::DEFAULT_WHITENING;
use stackalign_core::error::AlignError;

use common::{crop, texture};

fn shifted_pair(dx: usize, dy: usize) -> (Array2<f32>, Array2<f32>) {
    let big = texture(96, 96, 7);
    let stationary = crop(&big, 16, 16, 64, 64);
    // Moving content lies (dx, dy) right of and below the stationary content.
    let moving = crop(&big, 16 - dy, 16 - dx, 64, 64);
    (apodize(&stationary.data), apodize(&moving.data))
}

fn run(dx: usize, dy: usize, whitening: f64) -> SwimResult {
    let (s, m) = shifted_pair(dx, dy);
    swim_windows(&s, &m, whitening).unwrap()
}

#[test]
fn test_identical_windows_zero_shift() {
    let r = run(0, 0, DEFAULT_WHITENING);
    assert_abs_diff_eq!(r.dx, 0.0, epsilon = 0.1);
    assert_abs_diff_eq!(r.dy, 0.0, epsilon = 0.1);
}

#[test]
fn test_shift_sign_convention() {
    let r = run(5, 3, DEFAULT_WHITENING);
    assert_abs_diff_eq!(r.dx, 5.0, epsilon = 0.35);
    assert_abs_diff_eq!(r.dy, 3.0, epsilon = 0.35);
}

#[test]
fn test_plain_correlation_recovers_shift() {
    let r = run(4, 0, 0.0);
    assert_abs_diff_eq!(r.dx, 4.0, epsilon = 0.5);
    assert_abs_diff_eq!(r.dy, 0.0, epsilon = 0.5);
}

#[test]
fn test_textured_match_has_high_snr() {
    let matched = run(2, 2, DEFAULT_WHITENING);
    let unrelated = swim_windows(
        &apodize(&crop(&texture(64, 64, 1), 0, 0, 64, 64).data),
        &apodize(&crop(&texture(64, 64, 99), 0, 0, 64, 64).data),
        DEFAULT_WHITENING,
    )
    .unwrap();
    assert!(matched.snr > 10.0, "snr {}", matched.snr);
    assert!(matched.snr > 2.0 * unrelated.snr);
}

#[test]
fn test_flat_windows_report_zero_snr() {
    let flat = Array2::from_elem((32, 32), 0.5f32);
    let r = swim_windows(&flat, &flat, DEFAULT_WHITENING).unwrap();
    assert!(r.snr.is_finite());
    assert!(r.dx.is_finite() && r.dy.is_finite());
}

#[test]
fn test_size_mismatch_rejected() {
    let a = Array2::<f32>::zeros((32, 32));
    let b = Array2::<f32>::zeros((32, 16));
    assert!(matches!(
        swim_windows(&a, &b, DEFAULT_WHITENING),
        Err(AlignError::WindowSizeMismatch(..))
    ));
}
