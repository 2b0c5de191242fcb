//! Still capture
//!
//! Pulls one frame from a source, composites the detection overlay and
//! encodes the result.

use super::encode::{encode_frame, EncodedImage, StillFormat};
use super::traits::{FrameSource, RawFrame};
use crate::overlay::{composite, DetectionBox};
use crate::utils::error::{CameraError, CameraResult};

/// Default JPEG quality for stills
pub const DEFAULT_STILL_QUALITY: f32 = 0.9;

/// Composite `boxes` onto `frame` and encode it
pub fn render_frame(
    frame: &RawFrame,
    boxes: &[DetectionBox],
    format: StillFormat,
    quality: f32,
) -> CameraResult<EncodedImage> {
    let composited = composite(frame, boxes);
    encode_frame(&composited, format, quality)
}

/// Same as [`render_frame`], on the blocking thread pool
pub async fn render_frame_blocking(
    frame: RawFrame,
    boxes: Vec<DetectionBox>,
    format: StillFormat,
    quality: f32,
) -> CameraResult<EncodedImage> {
    tokio::task::spawn_blocking(move || render_frame(&frame, &boxes, format, quality))
        .await
        .map_err(|e| CameraError::Encode(format!("Render task failed: {}", e)))?
}

/// Produces single still images on demand
#[derive(Debug, Clone, Copy)]
pub struct CaptureEngine {
    format: StillFormat,
    quality: f32,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new(StillFormat::Jpeg, DEFAULT_STILL_QUALITY)
    }
}

impl CaptureEngine {
    pub fn new(format: StillFormat, quality: f32) -> Self {
        Self { format, quality }
    }

    pub fn format(&self) -> StillFormat {
        self.format
    }

    /// Capture exactly one frame from `source`
    ///
    /// Fails with `NoFrameAvailable` if the source is already at end of stream.
    pub async fn capture(
        &self,
        source: &dyn FrameSource,
        boxes: &[DetectionBox],
    ) -> CameraResult<EncodedImage> {
        let frame = source
            .next_frame()
            .await?
            .ok_or_else(|| CameraError::NoFrameAvailable(source.device().to_string()))?;

        tracing::debug!(
            "Captured frame {} from {} ({}x{}, {} boxes)",
            frame.sequence,
            source.device(),
            frame.width(),
            frame.height(),
            boxes.len()
        );

        render_frame_blocking(frame, boxes.to_vec(), self.format, self.quality).await
    }
}
