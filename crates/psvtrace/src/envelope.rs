//! Envelope extraction: cropped grayscale trace -> one value per column.
//!
//! Orientation: row 0 is the top of the region and velocity increases
//! upward. For every column the outer boundary of the spectral trace is
//! located as the topmost pixel brighter than the threshold, then refined to
//! the brightness-weighted centroid of the above-threshold pixels in a band
//! of `band_width` rows centred on that boundary. Peak detection consumes
//! the boundary as a height above the region's bottom edge
//! ([`EnvelopeSignal::heights`]).
//!
//! Columns without any above-threshold pixel repeat the previous column's
//! row; leading empty columns have no row at all.

use image::GrayImage;

use crate::config::EnvelopeConfig;

/// Per-column trace boundary of one region.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvelopeSignal {
    /// Boundary row per column (sub-pixel), `None` before the first
    /// observed column.
    rows: Vec<Option<f64>>,
    /// Whether the column itself contained above-threshold pixels.
    observed: Vec<bool>,
    /// Height of the region the rows refer to.
    region_height: u32,
}

impl EnvelopeSignal {
    /// Number of columns; equals the region width.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn region_height(&self) -> u32 {
        self.region_height
    }

    /// Boundary rows, one per column.
    pub fn rows(&self) -> &[Option<f64>] {
        &self.rows
    }

    /// Boundary row of column `col`, if one is known.
    pub fn row(&self, col: usize) -> Option<f64> {
        self.rows.get(col).copied().flatten()
    }

    /// Whether column `col` had its own above-threshold pixels (as opposed
    /// to a carried value).
    pub fn is_observed(&self, col: usize) -> bool {
        self.observed.get(col).copied().unwrap_or(false)
    }

    /// Fraction of columns with their own above-threshold pixels.
    pub fn coverage(&self) -> f64 {
        if self.observed.is_empty() {
            return 0.0;
        }
        self.observed.iter().filter(|&&o| o).count() as f64 / self.observed.len() as f64
    }

    /// Convert a boundary row into a height above the region bottom.
    pub fn row_to_height(&self, row: f64) -> f64 {
        self.region_height as f64 - row
    }

    /// Convert a height above the region bottom back into a row.
    pub fn height_to_row(&self, height: f64) -> f64 {
        self.region_height as f64 - height
    }

    /// Heights above the region bottom, the signal fed to peak detection.
    ///
    /// Leading columns without a row take the first known height, so they
    /// form a flat edge plateau that can never become a peak. A signal with
    /// no known row at all is returned as zeros.
    pub fn heights(&self) -> Vec<f64> {
        let first = self
            .rows
            .iter()
            .flatten()
            .next()
            .map(|&r| self.row_to_height(r));
        let Some(first) = first else {
            return vec![0.0; self.rows.len()];
        };
        self.rows
            .iter()
            .map(|r| r.map_or(first, |r| self.row_to_height(r)))
            .collect()
    }
}

/// Extract the trace envelope from a cropped grayscale region.
///
/// Deterministic; output length equals `gray.width()`.
pub fn extract_envelope(gray: &GrayImage, config: &EnvelopeConfig) -> EnvelopeSignal {
    let (w, h) = gray.dimensions();
    let half = config.band_width.max(1) / 2;
    let threshold = config.brightness_threshold;

    let mut rows = Vec::with_capacity(w as usize);
    let mut observed = Vec::with_capacity(w as usize);
    let mut last: Option<f64> = None;

    for x in 0..w {
        match column_boundary(gray, x, half, threshold) {
            Some(row) => {
                last = Some(row);
                observed.push(true);
            }
            None => observed.push(false),
        }
        rows.push(last);
    }

    let signal = EnvelopeSignal {
        rows,
        observed,
        region_height: h,
    };
    tracing::debug!(
        columns = signal.len(),
        coverage = signal.coverage(),
        "envelope extracted"
    );
    signal
}

/// Weighted boundary row of one column, or `None` if the column is
/// entirely at or below the threshold.
fn column_boundary(gray: &GrayImage, x: u32, half: u32, threshold: u8) -> Option<f64> {
    let h = gray.height();
    let top = (0..h).find(|&y| gray.get_pixel(x, y)[0] > threshold)?;

    let y_lo = top.saturating_sub(half);
    let y_hi = (top + half).min(h - 1);
    let mut sum_w = 0.0f64;
    let mut sum_wy = 0.0f64;
    for y in y_lo..=y_hi {
        let v = gray.get_pixel(x, y)[0];
        if v <= threshold {
            continue;
        }
        let weight = (v - threshold) as f64;
        sum_w += weight;
        sum_wy += weight * y as f64;
    }
    // `top` itself is above threshold, so the sum is never empty.
    Some(sum_wy / sum_w)
}
