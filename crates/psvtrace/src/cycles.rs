//! Cardiac-cycle windows around detected peaks.
//!
//! The envelope locates one peak per cycle; the reported PSV is the
//! topmost trace pixel anywhere inside that cycle's window.

use image::GrayImage;

/// Column span `[start, end)` attributed to one cardiac cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CycleWindow {
    pub start: usize,
    pub end: usize,
}

impl CycleWindow {
    pub fn contains(&self, col: usize) -> bool {
        col >= self.start && col < self.end
    }
}

/// Split `[0, width)` into one window per peak.
///
/// Interior boundaries sit at the midpoint between consecutive peaks. The
/// outer windows extend by half of the neighbouring inter-peak gap, clamped
/// to the signal. A single peak owns the whole signal. `peak_columns` must
/// be ascending.
pub fn cycle_windows(peak_columns: &[usize], width: usize) -> Vec<CycleWindow> {
    match peak_columns {
        [] => Vec::new(),
        [_] => vec![CycleWindow {
            start: 0,
            end: width,
        }],
        _ => {
            let n = peak_columns.len();
            let first_gap = peak_columns[1] - peak_columns[0];
            let last_gap = peak_columns[n - 1] - peak_columns[n - 2];

            let mut bounds = Vec::with_capacity(n + 1);
            bounds.push(peak_columns[0].saturating_sub(first_gap / 2));
            bounds.extend(peak_columns.windows(2).map(|p| (p[0] + p[1]) / 2));
            bounds.push((peak_columns[n - 1] + last_gap / 2).min(width));

            bounds
                .windows(2)
                .map(|b| CycleWindow {
                    start: b[0],
                    end: b[1],
                })
                .collect()
        }
    }
}

/// Topmost above-threshold pixel of one cycle window, in region pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CycleApex {
    pub column: usize,
    pub row: u32,
}

/// Find the topmost pixel brighter than `threshold` within `window`.
///
/// Equal rows resolve to the leftmost column. `None` when no column of the
/// window has an above-threshold pixel.
pub fn window_apex(gray: &GrayImage, window: &CycleWindow, threshold: u8) -> Option<CycleApex> {
    let (w, h) = gray.dimensions();
    let end = window.end.min(w as usize);
    let mut best: Option<CycleApex> = None;
    for col in window.start..end {
        let limit = best.map_or(h, |b| b.row);
        let x = col as u32;
        if let Some(row) = (0..limit).find(|&y| gray.get_pixel(x, y)[0] > threshold) {
            best = Some(CycleApex { column: col, row });
        }
    }
    best
}
