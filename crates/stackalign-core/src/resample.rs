use std::path::{Path, PathBuf};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::affine::{apply, AffineMatrix, Point};
use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{AlignError, Result};
use crate::frame::{Frame, Rect};
use crate::interp::bilinear_sample;
use crate::io::image_io::{load_image, save_image};
use crate::pipeline::config::BorderMode;

/// Resample `src` through `afm` onto the output canvas `rect`.
///
/// `afm` maps output (reference) coordinates to source coordinates. The
/// affine is shifted so the rectangle's origin lands at output pixel (0, 0),
/// then every output pixel is inverse-mapped and bilinearly sampled.
/// Without a rectangle the canvas is the source's own extent.
pub fn affine_image(
    src: &Frame,
    afm: &AffineMatrix,
    rect: Option<Rect>,
    border: BorderMode,
) -> Result<Frame> {
    let rect = rect.unwrap_or_else(|| Rect::new(0, 0, src.width() as i64, src.height() as i64));
    if rect.width <= 0 || rect.height <= 0 {
        return Err(AlignError::InvalidDimensions {
            width: rect.width.max(0) as u32,
            height: rect.height.max(0) as u32,
        });
    }

    let origin = Point::new(rect.x as f64, rect.y as f64);
    let offset = apply(afm, origin) - apply(afm, Point::new(0.0, 0.0));
    let shifted = afm.with_translation(afm.translation_part() + offset);

    let fill = match border {
        BorderMode::Mean => src.mean(),
        BorderMode::Zero => 0.0,
    };

    let (h, w) = (rect.height as usize, rect.width as usize);
    let sample_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let p = apply(&shifted, Point::new(col as f64, row as f64));
                bilinear_sample(&src.data, p.y, p.x, fill)
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(sample_row).collect()
    } else {
        (0..h).map(sample_row).collect()
    };

    let data = Array2::from_shape_vec((h, w), rows.into_iter().flatten().collect()).map_err(
        |_| AlignError::InvalidDimensions {
            width: w as u32,
            height: h as u32,
        },
    )?;
    Ok(Frame::new(data, src.original_bit_depth))
}

/// One layer's resampling unit: read the base image, warp it onto the
/// shared canvas, write it to `output`.
#[derive(Clone, Debug)]
pub struct ResampleJob {
    pub index: usize,
    pub source: PathBuf,
    pub output: PathBuf,
    pub afm: AffineMatrix,
    pub rect: Option<Rect>,
    pub border: BorderMode,
}

impl ResampleJob {
    pub fn run(&self) -> Result<PathBuf> {
        let src = load_image(&self.source)?;
        let aligned = affine_image(&src, &self.afm, self.rect, self.border)?;
        if let Some(dir) = self.output.parent() {
            std::fs::create_dir_all(dir)?;
        }
        save_image(&aligned, &self.output)?;
        debug!(
            layer = self.index,
            output = %self.output.display(),
            "Wrote aligned image"
        );
        Ok(self.output.clone())
    }
}

/// `<dir>/<base file name>`.
pub fn aligned_path(dir: &Path, source: &Path) -> Result<PathBuf> {
    source
        .file_name()
        .map(|name| dir.join(name))
        .ok_or_else(|| AlignError::ImageNotFound(source.to_path_buf()))
}
