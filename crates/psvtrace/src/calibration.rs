//! Pixel -> physical unit calibration from scale markers.
//!
//! Each axis is a linear map `value = offset + pixel * scale` defined by two
//! reference points. Marker pixels are given in the normalized full-image
//! frame: columns for the time axis, rows for the velocity axis (row 0 at
//! the top, so a velocity scale usually has a negative slope).

use crate::error::{Axis, ImageError};
use crate::region::ClampedRoi;

/// One scale marker: a pixel position and the physical value printed there.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RefPoint {
    pub pixel: f64,
    pub value: f64,
}

impl RefPoint {
    pub fn new(pixel: f64, value: f64) -> Self {
        Self { pixel, value }
    }
}

/// Linear pixel -> value map for one axis.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AxisCalibration {
    /// Value at pixel 0.
    pub offset: f64,
    /// Value per pixel.
    pub scale: f64,
}

impl AxisCalibration {
    /// Resolve the line through two reference points.
    ///
    /// Fails with [`ImageError::DegenerateCalibration`] when both points share
    /// a pixel position (or either is non-finite).
    pub fn from_points(a: RefPoint, b: RefPoint, axis: Axis) -> Result<Self, ImageError> {
        let dp = b.pixel - a.pixel;
        if dp == 0.0 || !dp.is_finite() || !a.value.is_finite() || !b.value.is_finite() {
            return Err(ImageError::DegenerateCalibration {
                axis,
                pixel: a.pixel,
            });
        }
        let scale = (b.value - a.value) / dp;
        Ok(Self {
            offset: a.value - a.pixel * scale,
            scale,
        })
    }

    /// Velocity axis from the values at the bottom and top edge of a region
    /// `height` rows tall whose top edge is at row `top`.
    pub fn from_extent(
        bottom_value: f64,
        top_value: f64,
        top: f64,
        height: f64,
    ) -> Result<Self, ImageError> {
        Self::from_points(
            RefPoint::new(top + height, bottom_value),
            RefPoint::new(top, top_value),
            Axis::Velocity,
        )
    }

    /// Identity map: one unit per pixel.
    pub fn identity() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }

    pub fn apply(&self, pixel: f64) -> f64 {
        self.offset + pixel * self.scale
    }
}

/// How the vertical (velocity) scale is given for an image.
///
/// In JSON either a two-element marker array or `{"bottom": .., "top": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum VelocityScale {
    /// Two row markers in normalized full-image pixels.
    Markers([RefPoint; 2]),
    /// Values at the bottom and top edge of the analyzed region. Resolved
    /// against the region after clamping to the image.
    RegionExtent { bottom: f64, top: f64 },
}

impl From<[RefPoint; 2]> for VelocityScale {
    fn from(markers: [RefPoint; 2]) -> Self {
        Self::Markers(markers)
    }
}

impl VelocityScale {
    /// Resolve the velocity axis for the region actually analyzed.
    pub fn resolve(&self, roi: &ClampedRoi) -> Result<AxisCalibration, ImageError> {
        match *self {
            Self::Markers([a, b]) => AxisCalibration::from_points(a, b, Axis::Velocity),
            Self::RegionExtent { bottom, top } => {
                AxisCalibration::from_extent(bottom, top, roi.y as f64, roi.height as f64)
            }
        }
    }
}

/// The scale markers supplied for an image.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationMarkers {
    /// Column markers on the horizontal (time) scale.
    pub time: [RefPoint; 2],
    /// Vertical (velocity) scale.
    pub velocity: VelocityScale,
}

/// Resolved time and velocity maps.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScaleCalibration {
    pub time: AxisCalibration,
    pub velocity: AxisCalibration,
}

impl ScaleCalibration {
    /// Resolve both axes for the clamped region `roi`; the velocity axis is
    /// checked first.
    pub fn resolve(markers: &CalibrationMarkers, roi: &ClampedRoi) -> Result<Self, ImageError> {
        let velocity = markers.velocity.resolve(roi)?;
        let [t0, t1] = markers.time;
        let time = AxisCalibration::from_points(t0, t1, Axis::Time)?;
        Ok(Self { time, velocity })
    }

    /// Map a region-local peak to `(time, velocity)`.
    ///
    /// `height` is the envelope value (rows above the region bottom); it is
    /// converted back to a full-image row before the velocity map is applied.
    pub fn measure(&self, roi: &ClampedRoi, column: usize, height: f64) -> (f64, f64) {
        let image_col = roi.x as f64 + column as f64;
        let image_row = roi.y as f64 + (roi.height as f64 - height);
        (self.time.apply(image_col), self.velocity.apply(image_row))
    }
}
