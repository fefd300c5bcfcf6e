//! Region-of-interest bounds and cropping.

use image::{DynamicImage, GenericImageView};

use crate::error::ImageError;

/// Axis-aligned rectangle `[x0, x1) x [y0, y1)` in image pixels.
///
/// Coordinates are signed so that operator-supplied bounds partially or
/// entirely outside the image can be represented before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Roi {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl Roi {
    /// Construct from corner coordinates.
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Construct from top-left corner plus size, the form returned by
    /// interactive rectangle selection.
    pub fn from_xywh(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    /// Whole-image region.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i64, height as i64)
    }

    pub fn width(&self) -> i64 {
        self.x1.saturating_sub(self.x0).max(0)
    }

    pub fn height(&self) -> i64 {
        self.y1.saturating_sub(self.y0).max(0)
    }

    /// Clamp to `[0, width) x [0, height)`.
    ///
    /// Fails with [`ImageError::EmptyRegion`] when nothing is left.
    pub fn clamp(&self, width: u32, height: u32) -> Result<ClampedRoi, ImageError> {
        let (w, h) = (width as i64, height as i64);
        let x0 = self.x0.clamp(0, w);
        let x1 = self.x1.clamp(0, w);
        let y0 = self.y0.clamp(0, h);
        let y1 = self.y1.clamp(0, h);
        if x1 <= x0 || y1 <= y0 {
            return Err(ImageError::EmptyRegion {
                requested: [self.x0, self.y0, self.x1, self.y1],
                image_size: [width, height],
            });
        }
        Ok(ClampedRoi {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// A non-empty region known to lie inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClampedRoi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop `img` to `roi` after clamping it to the image extents.
///
/// Returns the color crop (kept for annotation) together with the bounds
/// actually used.
pub fn select_region(img: &DynamicImage, roi: &Roi) -> Result<(DynamicImage, ClampedRoi), ImageError> {
    let (w, h) = img.dimensions();
    let clamped = roi.clamp(w, h)?;
    let cropped = img.crop_imm(clamped.x, clamped.y, clamped.width, clamped.height);
    tracing::debug!(
        x = clamped.x,
        y = clamped.y,
        w = clamped.width,
        h = clamped.height,
        "region selected"
    );
    Ok((cropped, clamped))
}
