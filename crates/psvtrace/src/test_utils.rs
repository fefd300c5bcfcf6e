//! Shared synthetic-image builders for unit tests.

use image::{GrayImage, Luma};

/// Half-width (columns) of one synthetic systolic bump.
pub(crate) const BUMP_HALF_WIDTH: f32 = 12.0;

/// Trace height (rows above the bottom edge) at column `x`.
///
/// A baseline of `base_height` rows with a triangular bump of total height
/// `peak_height` centred on each entry of `peak_cols`.
pub(crate) fn trace_height(x: u32, peak_cols: &[u32], peak_height: u32, base_height: u32) -> u32 {
    let amp = peak_height.saturating_sub(base_height) as f32;
    let bump = peak_cols
        .iter()
        .map(|&p| {
            let d = (x as f32 - p as f32).abs() / BUMP_HALF_WIDTH;
            (1.0 - d).max(0.0)
        })
        .fold(0.0f32, f32::max);
    base_height + (amp * bump).round() as u32
}

/// Render a synthetic spectral Doppler trace.
///
/// Each column is filled with `intensity` from the bottom edge up to
/// [`trace_height`]; everything above is black.
pub(crate) fn draw_doppler_trace(
    w: u32,
    h: u32,
    peak_cols: &[u32],
    peak_height: u32,
    base_height: u32,
    intensity: u8,
) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for x in 0..w {
        let top = h.saturating_sub(trace_height(x, peak_cols, peak_height, base_height).min(h));
        for y in top..h {
            img.put_pixel(x, y, Luma([intensity]));
        }
    }
    img
}
