/// Detection visualizer: draws every cached record onto the frame it came
/// from and writes timestamped PNGs.
///
/// Records are in screen coordinates, so boxes are shifted back by the
/// frame origin before drawing. Each element name gets a stable colour.
use std::path::{Path, PathBuf};

use crate::errors::PilotResult;
use crate::perception::types::{DetectionRecord, Frame};

const PALETTE: [[u8; 3]; 10] = [
    [255, 68, 68],
    [68, 220, 68],
    [68, 120, 255],
    [255, 170, 0],
    [255, 68, 255],
    [0, 220, 255],
    [170, 170, 68],
    [255, 200, 100],
    [140, 90, 255],
    [255, 255, 255],
];

fn colour_for(name: &str) -> [u8; 4] {
    // FNV-1a; stable across runs, unlike std's RandomState
    let hash = name
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    let [r, g, b] = PALETTE[hash as usize % PALETTE.len()];
    [r, g, b, 230]
}

/// `NAME 0.87`
pub fn label_text(record: &DetectionRecord) -> String {
    format!("{} {:.2}", record.element_name, record.confidence)
}

/// Copy of the frame with every record outlined and labelled.
pub fn annotate<'a>(
    frame: &Frame,
    records: impl IntoIterator<Item = &'a DetectionRecord>,
) -> image::RgbaImage {
    let mut canvas = frame.image.clone();
    let scale: u32 = if canvas.width() > 1600 { 2 } else { 1 };
    let thickness: i32 = if canvas.width() > 1600 { 3 } else { 2 };

    for record in records {
        let (x1, y1, x2, y2) = record.bounding_box.corners();
        let (ox, oy) = (frame.origin.x, frame.origin.y);
        let (x1, y1, x2, y2) = (x1 - ox, y1 - oy, x2 - ox, y2 - oy);
        let colour = colour_for(&record.element_name);

        draw_rect(&mut canvas, (x1, y1, x2, y2), colour, thickness);
        let label_h = (5 * scale + 4 * scale) as i32;
        draw_label(
            &mut canvas,
            x1.max(0),
            (y1 - label_h).max(0),
            &label_text(record),
            colour,
            scale,
        );
    }
    canvas
}

/// Save an annotated frame as `detections_<timestamp>.png` under `dir`.
pub fn save_annotated<'a>(
    dir: &Path,
    frame: &Frame,
    records: impl IntoIterator<Item = &'a DetectionRecord>,
) -> PilotResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("detections_{stamp}.png"));
    annotate(frame, records).save_with_format(&path, image::ImageFormat::Png)?;
    tracing::info!(path = %path.display(), "annotated frame saved");
    Ok(path)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(canvas: &mut image::RgbaImage, (x1, y1, x2, y2): (i32, i32, i32, i32), col: [u8; 4], thickness: i32) {
    for t in 0..thickness {
        for x in x1..=x2 {
            blend(canvas, x, y1 + t, col);
            blend(canvas, x, y2 - t, col);
        }
        for y in y1..=y2 {
            blend(canvas, x1 + t, y, col);
            blend(canvas, x2 - t, y, col);
        }
    }
}

fn draw_label(canvas: &mut image::RgbaImage, x: i32, y: i32, text: &str, col: [u8; 4], scale: u32) {
    let step = (5 * scale + scale) as i32;
    let pad = (2 * scale) as i32;
    let width = text.chars().count() as i32 * step + pad * 2;
    let height = (5 * scale) as i32 + pad * 2;

    for dy in 0..height {
        for dx in 0..width {
            darken(canvas, x + dx, y + dy);
        }
    }
    for (i, c) in text.to_ascii_uppercase().chars().enumerate() {
        draw_glyph(canvas, c, x + pad + i as i32 * step, y + pad, col, scale);
    }
}

fn draw_glyph(canvas: &mut image::RgbaImage, c: char, px: i32, py: i32, col: [u8; 4], scale: u32) {
    let Some(glyph) = glyph_for(c) else {
        return;
    };
    let scale = scale as i32;
    for (row, bits) in glyph.iter().enumerate() {
        for bit in 0..5 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    blend(canvas, px + bit * scale + sx, py + row as i32 * scale + sy, col);
                }
            }
        }
    }
}

fn glyph_for(c: char) -> Option<[u8; 5]> {
    match c {
        '0'..='9' => Some(FONT[(c as u8 - b'0') as usize]),
        'A'..='Z' => Some(FONT[10 + (c as u8 - b'A') as usize]),
        '.' => Some([0b00000, 0b00000, 0b00000, 0b00000, 0b00100]),
        '_' => Some([0b00000, 0b00000, 0b00000, 0b00000, 0b11111]),
        '-' => Some([0b00000, 0b00000, 0b01110, 0b00000, 0b00000]),
        _ => None,
    }
}

fn pixel_mut(canvas: &mut image::RgbaImage, x: i32, y: i32) -> Option<&mut image::Rgba<u8>> {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return None;
    }
    Some(canvas.get_pixel_mut(x as u32, y as u32))
}

fn blend(canvas: &mut image::RgbaImage, x: i32, y: i32, col: [u8; 4]) {
    if let Some(p) = pixel_mut(canvas, x, y) {
        let a = col[3] as f32 / 255.0;
        for i in 0..3 {
            p[i] = (p[i] as f32 * (1.0 - a) + col[i] as f32 * a).round() as u8;
        }
        p[3] = 255;
    }
}

fn darken(canvas: &mut image::RgbaImage, x: i32, y: i32) {
    if let Some(p) = pixel_mut(canvas, x, y) {
        for i in 0..3 {
            p[i] = (p[i] as f32 * 0.2) as u8;
        }
        p[3] = 255;
    }
}

/// 5×5 bitmap glyphs: digits 0-9 then letters A-Z.
const FONT: [[u8; 5]; 36] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001],
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110],
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110],
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100],
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111],
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000],
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110],
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001],
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100],
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001],
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001],
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001],
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000],
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101],
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001],
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110],
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100],
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001],
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001],
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111],
];
