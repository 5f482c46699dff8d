use std::fs;

use approx::assert_abs_diff_eq;

use stackalign_core::affine::{compose, invert, AffineMatrix};
use stackalign_core::error::AlignError;
use stackalign_core::frame::{ImageSize, Rect};
use stackalign_core::project::{Layer, Stack};
use stackalign_core::stack::bias::polyfit;
use stackalign_core::stack::{bounding_rect, decompose, save_bias_analysis, set_stack_cafm};

/// Linked stack whose layer `i` carries `pairwise[i]`; layer 0 is identity.
fn stack_with(pairwise: &[AffineMatrix]) -> Stack {
    let mut stack = Stack::default();
    for (i, afm) in pairwise.iter().enumerate() {
        let mut layer = Layer::new(format!("section_{i:02}.tif"));
        layer.results_mut().affine_matrix = Some(*afm);
        stack.alignment_stack.push(layer);
    }
    stack.link_references();
    stack
}

fn cumulative(stack: &Stack) -> Vec<AffineMatrix> {
    stack
        .alignment_stack
        .iter()
        .map(|l| l.results().cumulative_afm.unwrap())
        .collect()
}

fn rotation_slope(stack: &Stack) -> f64 {
    let xs: Vec<f64> = (0..stack.len()).map(|i| i as f64).collect();
    let rot: Vec<f64> = cumulative(stack).iter().map(|c| decompose(c).rot).collect();
    polyfit(&xs, &rot, 1).unwrap()[1]
}

fn drifting_stack(layers: usize, step: f64) -> Stack {
    let mut pairwise = vec![AffineMatrix::IDENTITY];
    pairwise.extend(std::iter::repeat(AffineMatrix::rotation(step)).take(layers - 1));
    stack_with(&pairwise)
}

#[test]
fn test_chain_composes_in_order() {
    let a1 = AffineMatrix::new(1.0, 0.02, 3.0, -0.01, 1.0, -2.0);
    let a2 = AffineMatrix::new(0.99, 0.0, -1.5, 0.0, 1.01, 4.0);
    let mut stack = stack_with(&[AffineMatrix::IDENTITY, a1, a2]);

    let report = set_stack_cafm(&mut stack, false).unwrap();
    assert!(report.substituted.is_empty());
    assert!(report.bias_funcs.is_none());

    let c = cumulative(&stack);
    assert_eq!(c[0], AffineMatrix::IDENTITY);
    assert!(c[1].approx_eq(&a1, 1e-12));
    assert!(c[2].approx_eq(&compose(&a2, &a1), 1e-12));
}

#[test]
fn test_skipped_layer_composes_as_identity() {
    let a1 = AffineMatrix::translation(2.0, 0.0);
    let a3 = AffineMatrix::translation(0.0, 5.0);
    let mut stack = stack_with(&[
        AffineMatrix::IDENTITY,
        a1,
        AffineMatrix::translation(100.0, 100.0),
        a3,
    ]);
    stack.alignment_stack[2].skip = true;

    let report = set_stack_cafm(&mut stack, false).unwrap();
    assert_eq!(report.substituted, vec![2]);

    let c = cumulative(&stack);
    assert!(c[2].approx_eq(&a1, 1e-12));
    assert!(c[3].approx_eq(&compose(&a3, &a1), 1e-12));
}

#[test]
fn test_unaligned_layer_is_substituted() {
    let mut stack = stack_with(&[AffineMatrix::IDENTITY, AffineMatrix::IDENTITY]);
    stack.alignment_stack[1].results_mut().affine_matrix = None;
    let report = set_stack_cafm(&mut stack, false).unwrap();
    assert_eq!(report.substituted, vec![1]);
    assert_eq!(cumulative(&stack)[1], AffineMatrix::IDENTITY);
}

#[test]
fn test_rotation_drift_without_nulling() {
    let mut stack = drifting_stack(10, 0.01);
    set_stack_cafm(&mut stack, false).unwrap();
    assert_abs_diff_eq!(rotation_slope(&stack), 0.01, epsilon = 1e-9);
}

#[test]
fn test_rotation_drift_is_nulled() {
    let mut stack = drifting_stack(10, 0.01);
    let report = set_stack_cafm(&mut stack, true).unwrap();
    assert!(report.bias_funcs.is_some());
    assert!(rotation_slope(&stack).abs() < 1e-6);
}

#[test]
fn test_translation_drift_is_nulled() {
    let mut pairwise = vec![AffineMatrix::IDENTITY];
    pairwise.extend(std::iter::repeat(AffineMatrix::translation(1.5, -0.5)).take(7));
    let mut stack = stack_with(&pairwise);
    set_stack_cafm(&mut stack, true).unwrap();

    let c = cumulative(&stack);
    let first = c[0].translation_part();
    for cafm in &c[1..] {
        let t = cafm.translation_part();
        assert_abs_diff_eq!(t.x, first.x, epsilon = 1e-6);
        assert_abs_diff_eq!(t.y, first.y, epsilon = 1e-6);
    }
}

#[test]
fn test_short_stack_clamps_order() {
    let mut stack = stack_with(&[AffineMatrix::IDENTITY, AffineMatrix::translation(1.0, 0.0)]);
    stack.poly_order = 4;
    let report = set_stack_cafm(&mut stack, true).unwrap();
    let funcs = report.bias_funcs.unwrap();
    assert_eq!(funcs.x.len(), 2);
}

#[test]
fn test_composition_is_idempotent() {
    let mut pairwise = vec![AffineMatrix::IDENTITY];
    for i in 1..6 {
        pairwise.push(AffineMatrix::new(
            1.0 + 0.001 * i as f64,
            0.002,
            i as f64,
            -0.001,
            1.0,
            -0.5 * i as f64,
        ));
    }
    let mut stack = stack_with(&pairwise);

    set_stack_cafm(&mut stack, true).unwrap();
    let first = cumulative(&stack);
    set_stack_cafm(&mut stack, true).unwrap();
    assert_eq!(cumulative(&stack), first);
}

#[test]
fn test_empty_stack_is_a_no_op() {
    let mut stack = Stack::default();
    let report = set_stack_cafm(&mut stack, true).unwrap();
    assert!(report.substituted.is_empty());
}

#[test]
fn test_bounding_rect_identity_stack() {
    let mut stack = stack_with(&[AffineMatrix::IDENTITY; 3]);
    set_stack_cafm(&mut stack, false).unwrap();
    let rect = bounding_rect(&stack, ImageSize::new(100, 80)).unwrap();
    assert_eq!(rect, Rect::new(0, 0, 100, 80));
}

#[test]
fn test_bounding_rect_pads_symmetrically() {
    let mut stack = stack_with(&[AffineMatrix::IDENTITY, AffineMatrix::translation(5.0, -3.0)]);
    set_stack_cafm(&mut stack, false).unwrap();
    let rect = bounding_rect(&stack, ImageSize::new(100, 80)).unwrap();
    assert_eq!(rect, Rect::new(-5, -5, 110, 90));
}

#[test]
fn test_bounding_rect_empty_stack_fails() {
    assert!(matches!(
        bounding_rect(&Stack::default(), ImageSize::new(10, 10)),
        Err(AlignError::EmptyStack)
    ));
}

#[test]
fn test_bias_analysis_series() {
    let dir = tempfile::tempdir().unwrap();
    let mut stack = drifting_stack(4, 0.02);
    set_stack_cafm(&mut stack, false).unwrap();
    save_bias_analysis(&stack, dir.path(), None).unwrap();

    for name in [
        "snr_1.dat",
        "bias_x_1.dat",
        "bias_rot_1.dat",
        "bias_det_1.dat",
        "afm_1.dat",
        "c_afm_1.dat",
    ] {
        let text = fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(text.lines().count(), 4, "{name}");
    }
    let rot = fs::read_to_string(dir.path().join("bias_rot_1.dat")).unwrap();
    let last: f64 = rot
        .lines()
        .last()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert_abs_diff_eq!(last, 0.06, epsilon = 1e-12);
    assert!(!dir.path().join("bounding_rect.dat").exists());
}

#[test]
fn test_singular_pairwise_becomes_skipped_identity() {
    let a1 = AffineMatrix::translation(2.0, 0.0);
    let a3 = AffineMatrix::translation(0.0, 5.0);
    let mut stack = stack_with(&[
        AffineMatrix::IDENTITY,
        a1,
        AffineMatrix::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0),
        a3,
    ]);
    stack.alignment_stack[2].results_mut().snr = vec![30.0];

    let report = set_stack_cafm(&mut stack, false).unwrap();
    assert_eq!(report.degenerate, vec![2]);
    assert_eq!(report.substituted, vec![2]);

    let layer = &stack.alignment_stack[2];
    assert!(layer.skip);
    assert_eq!(layer.results().affine_matrix, Some(AffineMatrix::IDENTITY));
    assert_eq!(layer.mean_snr(), None);

    let c = cumulative(&stack);
    assert!(c[2].approx_eq(&a1, 1e-12));
    assert!(c[3].approx_eq(&compose(&a3, &a1), 1e-12));
    assert!(bounding_rect(&stack, ImageSize::new(64, 64)).is_ok());
}

#[test]
fn test_singular_cumulative_is_recomposed() {
    let shrink = AffineMatrix::scaling(1e-4, 1e-4);
    let mut stack = stack_with(&[
        AffineMatrix::IDENTITY,
        shrink,
        shrink,
        AffineMatrix::translation(1.0, 0.0),
    ]);

    let report = set_stack_cafm(&mut stack, false).unwrap();
    assert_eq!(report.degenerate, vec![2]);
    assert!(stack.alignment_stack[2].skip);

    let c = cumulative(&stack);
    assert!(c[2].approx_eq(&shrink, 1e-12));
    for m in &c {
        assert!(invert(m).is_ok(), "{m}");
    }
}

#[test]
fn test_bias_nulling_around_singular_layer_stays_finite() {
    let mut pairwise = vec![AffineMatrix::IDENTITY];
    pairwise.extend(std::iter::repeat(AffineMatrix::rotation(0.01)).take(5));
    pairwise[3] = AffineMatrix::new(1.0, 2.0, 0.0, 0.5, 1.0, 0.0);
    let mut stack = stack_with(&pairwise);

    let report = set_stack_cafm(&mut stack, true).unwrap();
    assert_eq!(report.degenerate, vec![3]);
    for m in cumulative(&stack) {
        assert!(invert(&m).is_ok(), "{m}");
        let d = decompose(&m);
        for v in [d.rot, d.scale_x, d.scale_y, d.skew_x, d.x, d.y, d.det] {
            assert!(v.is_finite());
        }
    }
}
