use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{AlignError, Result};
use crate::frame::{Frame, ImageSize};

/// Save a frame as 16-bit grayscale TIFF.
pub fn save_tiff(frame: &Frame, path: &Path) -> Result<()> {
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    let pixels: Vec<u16> = frame
        .data
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect();

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, pixels)
        .ok_or(AlignError::InvalidDimensions {
            width: w,
            height: h,
        })?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a frame as 8-bit grayscale PNG.
pub fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    let mut img = GrayImage::new(frame.width() as u32, frame.height() as u32);
    for ((row, col), v) in frame.data.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save frame, choosing format from file extension (TIFF by default).
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(frame, path),
        _ => save_tiff(frame, path),
    }
}

/// Load a grayscale image file into a Frame.
pub fn load_image(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(AlignError::ImageNotFound(path.to_path_buf()));
    }
    let img = image::open(path)?;
    let bit_depth = if img.color().bytes_per_pixel() / img.color().channel_count() > 1 {
        16
    } else {
        8
    };
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    });

    Ok(Frame::new(data, bit_depth))
}

/// Image dimensions read from the header only.
pub fn image_size(path: &Path) -> Result<ImageSize> {
    if !path.exists() {
        return Err(AlignError::ImageNotFound(path.to_path_buf()));
    }
    let (w, h) = image::image_dimensions(path)?;
    Ok(ImageSize::new(w as usize, h as usize))
}

/// Block-average downscale by an integer factor. Trailing rows/columns
/// that do not fill a whole block are dropped.
pub fn downscale(frame: &Frame, factor: usize) -> Frame {
    if factor <= 1 {
        return frame.clone();
    }
    let h = (frame.height() / factor).max(1);
    let w = (frame.width() / factor).max(1);
    let data = Array2::from_shape_fn((h, w), |(row, col)| {
        let r0 = row * factor;
        let c0 = col * factor;
        let r1 = (r0 + factor).min(frame.height());
        let c1 = (c0 + factor).min(frame.width());
        let block = frame.data.slice(ndarray::s![r0..r1, c0..c1]);
        block.mean().unwrap_or(0.0)
    });
    Frame::new(data, frame.original_bit_depth)
}
