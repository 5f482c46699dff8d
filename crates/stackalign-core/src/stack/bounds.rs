use tracing::debug;

use crate::affine::{bounding_rect_under_inverse, AffineMatrix};
use crate::error::{AlignError, Result};
use crate::frame::{ImageSize, Rect};
use crate::project::Stack;

/// Shared output canvas for the whole stack.
///
/// Each layer's `size` rectangle is mapped through its inverse cumulative
/// affine; the largest overshoot past any edge becomes a symmetric pad.
/// A stack of identities gives `(0, 0, W, H)`.
pub fn bounding_rect(stack: &Stack, size: ImageSize) -> Result<Rect> {
    if stack.is_empty() {
        return Err(AlignError::EmptyStack);
    }
    let (w, h) = (size.width as i64, size.height as i64);

    let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
    let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
    for layer in &stack.alignment_stack {
        let cafm = layer
            .results()
            .cumulative_afm
            .unwrap_or(AffineMatrix::IDENTITY);
        let r = bounding_rect_under_inverse(&cafm, size)?;
        min_x = min_x.min(r.x);
        min_y = min_y.min(r.y);
        max_x = max_x.max(r.x + r.width);
        max_y = max_y.max(r.y + r.height);
    }

    let border = [-min_x, -min_y, max_x - w, max_y - h, 0]
        .into_iter()
        .max()
        .unwrap_or(0);
    let rect = Rect::new(-border, -border, w + 2 * border, h + 2 * border);
    debug!(?rect, border, "Stack bounding rectangle");
    Ok(rect)
}
