//! Overlay compositing
//!
//! Detection boxes and their labels drawn onto raw frames.

pub mod compositor;
pub mod font;

pub use compositor::{composite, parse_color, pixel_rect, DetectionBox, PixelRect};
