//! Image decoding and canonical-width normalization.
//!
//! Pixel-distance parameters (band width, minimum peak distance) only mean
//! the same thing across inputs once every image has the same width.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::ImageError;

/// Resampling policy used for every resize.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Decode an image file.
///
/// Fails with [`ImageError::InvalidImage`] when the file cannot be opened or
/// decoded, or decodes to a zero-area image.
pub fn decode_image(path: &Path) -> Result<DynamicImage, ImageError> {
    let img = image::ImageReader::open(path)
        .map_err(|e| ImageError::InvalidImage {
            reason: format!("{}: {}", path.display(), e),
        })?
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidImage {
            reason: format!("{}: {}", path.display(), e),
        })?
        .decode()
        .map_err(|e| ImageError::InvalidImage {
            reason: format!("{}: {}", path.display(), e),
        })?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImageError::InvalidImage {
            reason: format!("{}: zero-area image ({}x{})", path.display(), w, h),
        });
    }
    Ok(img)
}

/// Height that preserves the aspect ratio at `target_width`. Never zero.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scale = target_width as f64 / width as f64;
    ((height as f64 * scale).round() as u32).max(1)
}

/// Resize `img` to `target_width` columns, preserving the aspect ratio.
///
/// An image that already has the target width is returned unchanged.
pub fn normalize_width(img: &DynamicImage, target_width: u32) -> Result<DynamicImage, ImageError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImageError::InvalidImage {
            reason: format!("zero-area image ({}x{})", w, h),
        });
    }
    if target_width == 0 {
        return Err(ImageError::InvalidImage {
            reason: "target width is zero".into(),
        });
    }
    if w == target_width {
        return Ok(img.clone());
    }

    let target_height = scaled_height(w, h, target_width);
    tracing::debug!(
        from_w = w,
        from_h = h,
        to_w = target_width,
        to_h = target_height,
        "normalizing image width"
    );
    Ok(img.resize_exact(target_width, target_height, RESIZE_FILTER))
}
