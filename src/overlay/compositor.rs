//! Detection box compositing
//!
//! Draws detector output onto frames. Compositing is a pure function of the
//! frame and the box list, so stills and streamed frames look identical.

use super::font;
use crate::capture::traits::RawFrame;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Outline thickness in pixels
pub const LINE_WIDTH: u32 = 2;

/// Gap between the label baseline and the top edge of the box
pub const LABEL_OFFSET: i64 = 5;

/// Color used when a box color cannot be parsed
pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// A detection supplied by an external detector
///
/// Coordinates are normalized to the frame size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub label: String,
    pub color: String,
}

impl DetectionBox {
    /// Text drawn above the box, e.g. `person (95%)`
    pub fn label_text(&self) -> String {
        let percent = (self.confidence * 100.0).round() as i64;
        format!("{} ({}%)", self.label, percent)
    }
}

/// Pixel rectangle of a box after scaling and clamping (inclusive bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

fn scale(value: f32, extent: u32) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value as f64 * extent as f64).round() as i64
}

fn clamp_axis(value: i64, extent: u32) -> u32 {
    value.clamp(0, extent.saturating_sub(1) as i64) as u32
}

/// Scale a normalized box to pixel bounds, clamped to the frame
pub fn pixel_rect(detection: &DetectionBox, frame_width: u32, frame_height: u32) -> PixelRect {
    let left = scale(detection.x, frame_width);
    let top = scale(detection.y, frame_height);
    let width = scale(detection.width, frame_width).max(1);
    let height = scale(detection.height, frame_height).max(1);

    PixelRect {
        left: clamp_axis(left, frame_width),
        top: clamp_axis(top, frame_height),
        right: clamp_axis(left + width - 1, frame_width),
        bottom: clamp_axis(top + height - 1, frame_height),
    }
}

/// Parse `#RRGGBB`, `#RGB` or a basic color name
pub fn parse_color(text: &str) -> Option<Rgba<u8>> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            6 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Some(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
            }
            _ => None,
        };
    }

    let rgb = match text.to_ascii_lowercase().as_str() {
        "red" => [255, 0, 0],
        "green" | "lime" => [0, 255, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        "orange" => [255, 165, 0],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        _ => return None,
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

fn draw_outline(image: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    for t in 0..LINE_WIDTH {
        let (x0, y0) = (rect.left + t, rect.top + t);
        let (x1, y1) = (rect.right.saturating_sub(t), rect.bottom.saturating_sub(t));
        if x0 > x1 || y0 > y1 {
            break;
        }
        for x in x0..=x1 {
            image.put_pixel(x, y0, color);
            image.put_pixel(x, y1, color);
        }
        for y in y0..=y1 {
            image.put_pixel(x0, y, color);
            image.put_pixel(x1, y, color);
        }
    }
}

fn draw_text(image: &mut RgbaImage, text: &str, left: i64, top: i64, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    for (index, c) in text.chars().enumerate() {
        let origin_x = left + index as i64 * font::ADVANCE as i64;
        if origin_x >= width as i64 {
            break;
        }
        for row in 0..font::GLYPH_HEIGHT {
            for col in 0..font::GLYPH_WIDTH {
                if !font::is_set(c, col, row) {
                    continue;
                }
                let x = origin_x + col as i64;
                let y = top + row as i64;
                if x >= 0 && y >= 0 && x < width as i64 && y < height as i64 {
                    image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

/// Where the label of a box starts, kept inside the frame vertically
pub fn label_origin(rect: PixelRect, frame_height: u32) -> (i64, i64) {
    let top = rect.top as i64 - LABEL_OFFSET - (font::GLYPH_HEIGHT as i64 - 1);
    let max_top = frame_height as i64 - font::GLYPH_HEIGHT as i64;
    (rect.left as i64, top.min(max_top).max(0))
}

/// Draw `boxes` onto a copy of `frame`, in input order
pub fn composite(frame: &RawFrame, boxes: &[DetectionBox]) -> RawFrame {
    let mut output = frame.clone();
    if boxes.is_empty() || output.width() == 0 || output.height() == 0 {
        return output;
    }

    let (width, height) = output.image.dimensions();
    for detection in boxes {
        let color = parse_color(&detection.color).unwrap_or(DEFAULT_COLOR);
        let rect = pixel_rect(detection, width, height);
        draw_outline(&mut output.image, rect, color);

        let (label_x, label_y) = label_origin(rect, height);
        draw_text(&mut output.image, &detection.label_text(), label_x, label_y, color);
    }
    output
}
