#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::{s, Array2};
use stackalign_core::frame::Frame;
use stackalign_core::io::image_io::save_tiff;
use stackalign_core::project::Project;

/// Deterministic blurred-noise texture in [0, 1].
pub fn texture(height: usize, width: usize, seed: u64) -> Array2<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let noise = Array2::from_shape_fn((height, width), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as f32) / (u32::MAX >> 1) as f32
    });

    // 3x3 box blur, edges replicated.
    Array2::from_shape_fn((height, width), |(r, c)| {
        let mut sum = 0.0;
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                let rr = (r as i64 + dr).clamp(0, height as i64 - 1) as usize;
                let cc = (c as i64 + dc).clamp(0, width as i64 - 1) as usize;
                sum += noise[[rr, cc]];
            }
        }
        (sum / 9.0).clamp(0.0, 1.0)
    })
}

/// `height x width` crop of `big` with its top-left corner at `(row, col)`.
pub fn crop(big: &Array2<f32>, row: usize, col: usize, height: usize, width: usize) -> Frame {
    Frame::new(
        big.slice(s![row..row + height, col..col + width]).to_owned(),
        16,
    )
}

/// `count` frames where the content of frame k sits `k * (dx, dy)` pixels
/// right and down of frame 0.
pub fn translated_frames(count: usize, size: usize, dx: usize, dy: usize) -> Vec<Frame> {
    let margin = 8;
    let big = texture(
        size + count * dy + 2 * margin,
        size + count * dx + 2 * margin,
        42,
    );
    let (row0, col0) = (margin + count * dy, margin + count * dx);
    (0..count)
        .map(|k| crop(&big, row0 - k * dy, col0 - k * dx, size, size))
        .collect()
}

/// Write frames as `section_<k>.tif` under `dir`.
pub fn write_frames(dir: &Path, frames: &[Frame]) -> Vec<PathBuf> {
    frames
        .iter()
        .enumerate()
        .map(|(k, frame)| {
            let path = dir.join(format!("section_{k:02}.tif"));
            save_tiff(frame, &path).expect("write test image");
            path
        })
        .collect()
}

/// Single-level project over a translated stack written into `dir`.
pub fn translated_project(
    dir: &Path,
    count: usize,
    size: usize,
    dx: usize,
    dy: usize,
) -> Project {
    translated_levels(dir, count, size, dx, dy, &[1])
}

/// Translated stack imported at every level in `levels`.
pub fn translated_levels(
    dir: &Path,
    count: usize,
    size: usize,
    dx: usize,
    dy: usize,
    levels: &[u32],
) -> Project {
    let images = write_frames(dir, &translated_frames(count, size, dx, dy));
    Project::import(&images, &dir.join("out"), levels).expect("import test images")
}
