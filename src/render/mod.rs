//! Annotated output image: person boxes plus a one-line status label.

mod font;

use std::io::Cursor;

use image::{ImageError, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

use crate::detect::BoundingBox;
use font::{GLYPH_WIDTH, glyph};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const SHADOW_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const TEXT_ORIGIN: (u32, u32) = (20, 20);
const MAX_TEXT_SCALE: u32 = 3;
const JPEG_QUALITY: u8 = 90;

pub fn overlay_label(detected: usize, occupancy: i64, capacity: i64) -> String {
    format!(
        "detected: {} | occupancy: {}/{}",
        detected, occupancy, capacity
    )
}

/// Draws a rectangle around every box and the label in the top-left corner.
pub fn annotate(image: &mut RgbImage, boxes: &[BoundingBox], label: &str) {
    for bbox in boxes {
        draw_rect(image, bbox, BOX_COLOR, BOX_THICKNESS);
    }
    draw_label(image, label);
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf.into_inner())
}

fn draw_rect(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);
    let (x1, y1) = (clamp_x(bbox.x1), clamp_y(bbox.y1));
    let (x2, y2) = (clamp_x(bbox.x2), clamp_y(bbox.y2));
    if x2 < x1 || y2 < y1 {
        return;
    }

    for t in 0..thickness {
        for x in x1..=x2 {
            put(image, x, y1 + t, color);
            put(image, x, y2.saturating_sub(t), color);
        }
        for y in y1..=y2 {
            put(image, x1 + t, y, color);
            put(image, x2.saturating_sub(t), y, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, label: &str) {
    let chars = label.chars().count() as u32;
    if chars == 0 {
        return;
    }
    let advance = GLYPH_WIDTH + 1;
    let available = image.width().saturating_sub(TEXT_ORIGIN.0 * 2);
    let scale = (available / (chars * advance)).clamp(1, MAX_TEXT_SCALE);

    let (ox, oy) = TEXT_ORIGIN;
    draw_text(image, label, ox + scale, oy + scale, scale, SHADOW_COLOR);
    draw_text(image, label, ox, oy, scale, TEXT_COLOR);
}

fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = gx + col * scale;
                let py = y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        put(image, px + dx, py + dy, color);
                    }
                }
            }
        }
    }
}

fn put(image: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, color);
    }
}
