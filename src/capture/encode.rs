//! Still image encoding
//!
//! JPEG goes through the `image` crate, PNG through `png`.

use super::traits::RawFrame;
use crate::utils::error::{CameraError, CameraResult};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use serde::{Deserialize, Serialize};

/// Still image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    #[default]
    Jpeg,
    Png,
}

impl StillFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            StillFormat::Jpeg => "jpg",
            StillFormat::Png => "png",
        }
    }

    /// MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            StillFormat::Jpeg => "image/jpeg",
            StillFormat::Png => "image/png",
        }
    }
}

/// An encoded still image
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: StillFormat,
    pub width: u32,
    pub height: u32,
}

/// Map a 0.0..=1.0 quality to the encoder's 1..=100 scale
fn jpeg_quality(quality: f32) -> u8 {
    let quality = if quality.is_finite() { quality } else { 0.9 };
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

/// Encode a frame in the requested format
///
/// `quality` only applies to JPEG.
pub fn encode_frame(
    frame: &RawFrame,
    format: StillFormat,
    quality: f32,
) -> CameraResult<EncodedImage> {
    let (width, height) = (frame.width(), frame.height());
    let bytes = match format {
        StillFormat::Jpeg => encode_jpeg(frame, quality)?,
        StillFormat::Png => encode_png(frame)?,
    };

    Ok(EncodedImage {
        bytes,
        format,
        width,
        height,
    })
}

fn encode_jpeg(frame: &RawFrame, quality: f32) -> CameraResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgba8(frame.image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality));
        encoder
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(format!("JPEG encoding failed: {}", e)))?;
    }
    Ok(bytes)
}

fn encode_png(frame: &RawFrame) -> CameraResult<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, frame.width(), frame.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| CameraError::Encode(format!("PNG header failed: {}", e)))?;
        writer
            .write_image_data(frame.image.as_raw())
            .map_err(|e| CameraError::Encode(format!("PNG encoding failed: {}", e)))?;
        writer
            .finish()
            .map_err(|e| CameraError::Encode(format!("PNG finish failed: {}", e)))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_pattern::pattern_frame;
    use std::time::Duration;

    fn frame() -> RawFrame {
        RawFrame::new(pattern_frame(24, 12, 0), Duration::ZERO, 0)
    }

    #[test]
    fn test_jpeg_quality_scale() {
        assert_eq!(jpeg_quality(0.9), 90);
        assert_eq!(jpeg_quality(2.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(f32::NAN), 90);
    }

    #[test]
    fn test_encode_jpeg_has_soi_marker() {
        let encoded = encode_frame(&frame(), StillFormat::Jpeg, 0.9).unwrap();
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.width, encoded.height), (24, 12));
    }

    #[test]
    fn test_encode_png_signature() {
        let encoded = encode_frame(&frame(), StillFormat::Png, 1.0).unwrap();
        assert_eq!(&encoded.bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        assert_eq!(encoded.format.extension(), "png");
    }
}
