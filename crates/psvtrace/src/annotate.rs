//! Peak and cycle overlay on the analyzed region.
//!
//! Every measured PSV gets a filled marker and its 1-based cycle number;
//! every cycle window gets boundary lines and its number along the top
//! edge. Numbers are drawn from a built-in 3x5 digit bitmap so no font
//! file is needed.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::report::ImageReport;

const PEAK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const CYCLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PEAK_LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const CYCLE_LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const PEAK_RADIUS: i32 = 5;
/// Screen pixels per glyph cell.
const GLYPH_SCALE: u32 = 2;

/// Rows of each digit, three bits per row, most significant bit left.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Draw `n` in decimal with its top-left corner at `(x, y)`. Cells outside
/// the canvas are clipped.
fn draw_number(canvas: &mut RgbImage, n: usize, x: i32, y: i32, color: Rgb<u8>) {
    let s = GLYPH_SCALE as i32;
    let advance = 4 * s;
    for (i, ch) in n.to_string().bytes().enumerate() {
        let glyph = DIGITS[(ch - b'0') as usize];
        let gx = x + i as i32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    let cell = Rect::at(gx + col * s, y + row as i32 * s).of_size(GLYPH_SCALE, GLYPH_SCALE);
                    draw_filled_rect_mut(canvas, cell, color);
                }
            }
        }
    }
}

/// Render the cropped region with a numbered marker on every measured PSV
/// and numbered cycle windows.
pub fn draw_annotations(cropped: &DynamicImage, report: &ImageReport) -> RgbImage {
    let mut canvas = cropped.to_rgb8();
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return canvas;
    }

    let mut boundaries: Vec<usize> = report.cycles.iter().map(|c| c.start).collect();
    if let Some(last) = report.cycles.last() {
        boundaries.push(last.end);
    }
    let x_max = (w - 1) as f32;
    for b in boundaries {
        let x = (b as f32).min(x_max);
        draw_line_segment_mut(&mut canvas, (x, 0.0), (x, (h - 1) as f32), CYCLE_COLOR);
    }
    for (i, c) in report.cycles.iter().enumerate() {
        let mid = ((c.start + c.end) / 2) as i32;
        draw_number(&mut canvas, i + 1, mid - 2, 4, CYCLE_LABEL_COLOR);
    }

    for m in &report.measurements {
        let center = (m.column as i32, m.row.round() as i32);
        draw_filled_circle_mut(&mut canvas, center, PEAK_RADIUS, PEAK_COLOR);
        draw_number(&mut canvas, m.cycle, center.0 - 14, center.1 - 16, PEAK_LABEL_COLOR);
    }
    canvas
}
