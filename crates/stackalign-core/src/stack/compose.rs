use tracing::{info, warn};

use crate::affine::{invert, AffineMatrix};
use crate::consts::BIAS_NULLING_PASSES;
use crate::error::{AlignError, Result};
use crate::process::set_cafm;
use crate::project::{Layer, Stack};

use super::bias::BiasFuncs;

/// Outcome of one composition run.
#[derive(Clone, Debug, Default)]
pub struct ComposeReport {
    /// Layers whose pairwise affine was replaced by identity (skipped,
    /// never aligned or degenerate).
    pub substituted: Vec<usize>,
    /// Layers marked skip because their pairwise or cumulative affine
    /// could not be inverted.
    pub degenerate: Vec<usize>,
    /// Cumulative affine the chain started from.
    pub init_cafm: AffineMatrix,
    /// Final trend fit when bias nulling ran.
    pub bias_funcs: Option<BiasFuncs>,
}

fn cumulative_affines(stack: &Stack) -> Vec<AffineMatrix> {
    stack
        .alignment_stack
        .iter()
        .map(|l| l.results().cumulative_afm.unwrap_or(AffineMatrix::IDENTITY))
        .collect()
}

/// Compose every layer's pairwise affine into its cumulative affine,
/// strictly in layer order.
///
/// With `null_biases`, the plain chain is fitted with a polynomial trend per
/// component, and the chain is rebuilt from the trend's initial affine with
/// a per-layer correction. The trend is refitted between the two passes.
/// Identical inputs always give identical results.
///
/// A layer whose pairwise or cumulative affine is not invertible is marked
/// skip with an identity pairwise affine, and the chain is recomposed.
pub fn set_stack_cafm(stack: &mut Stack, null_biases: bool) -> Result<ComposeReport> {
    let mut report = ComposeReport::default();
    if stack.is_empty() {
        return Ok(report);
    }

    report.degenerate = reject_degenerate(stack, |layer| layer.pairwise_affine());

    for (i, layer) in stack.alignment_stack.iter().enumerate() {
        if layer.pairwise_affine().is_none() {
            if layer.ref_path().is_some() {
                warn!(
                    layer = i,
                    base = %layer.base_path().display(),
                    skip = layer.skip,
                    "No pairwise affine, composing with identity"
                );
            }
            report.substituted.push(i);
        }
    }

    let mut null_biases = null_biases;
    for _ in 0..=stack.len() {
        compose_chain(stack, null_biases, &mut report)?;

        let bad = reject_degenerate(stack, |layer| layer.results().cumulative_afm);
        if bad.is_empty() {
            report.degenerate.sort_unstable();
            report.substituted.sort_unstable();
            report.substituted.dedup();
            info!(
                layers = stack.len(),
                null_biases,
                substituted = report.substituted.len(),
                degenerate = report.degenerate.len(),
                "Composed cumulative affines"
            );
            return Ok(report);
        }
        if null_biases && bad.iter().all(|i| report.degenerate.contains(i)) {
            warn!(layers = ?bad, "Bias correction is degenerate, composing without it");
            null_biases = false;
            report.bias_funcs = None;
            report.init_cafm = AffineMatrix::IDENTITY;
        }
        for i in bad {
            if !report.degenerate.contains(&i) {
                report.degenerate.push(i);
                report.substituted.push(i);
            }
        }
    }
    Err(AlignError::DegenerateTransform { determinant: 0.0 })
}

/// One composition: the plain chain, then the bias passes when asked.
fn compose_chain(
    stack: &mut Stack,
    null_biases: bool,
    report: &mut ComposeReport,
) -> Result<()> {
    let mut c_afm = AffineMatrix::IDENTITY;
    for layer in stack.alignment_stack.iter_mut() {
        c_afm = set_cafm(layer, &c_afm, None);
    }

    if null_biases {
        let mut funcs = BiasFuncs::fit(&cumulative_affines(stack), stack.poly_order)?;
        let init = funcs.init_cafm();
        for pass in 0..BIAS_NULLING_PASSES {
            let mut c_afm = init;
            for (i, layer) in stack.alignment_stack.iter_mut().enumerate() {
                let bias = funcs.bias_mat(i);
                c_afm = set_cafm(layer, &c_afm, Some(&bias));
            }
            if pass + 1 < BIAS_NULLING_PASSES {
                funcs.refit(&cumulative_affines(stack))?;
            }
        }
        report.init_cafm = init;
        report.bias_funcs = Some(funcs);
    }
    Ok(())
}

/// Mark every layer whose selected affine cannot be inverted as a skipped
/// identity layer. Returns the indices marked.
fn reject_degenerate(
    stack: &mut Stack,
    afm: impl Fn(&Layer) -> Option<AffineMatrix>,
) -> Vec<usize> {
    let mut rejected = Vec::new();
    for (i, layer) in stack.alignment_stack.iter_mut().enumerate() {
        let Some(m) = afm(&*layer) else {
            continue;
        };
        if let Err(e) = invert(&m) {
            warn!(
                layer = i,
                base = %layer.base_path().display(),
                afm = %m,
                error = %e,
                "Degenerate transform, marking skip"
            );
            layer.skip = true;
            layer.set_identity();
            rejected.push(i);
        }
    }
    rejected
}
