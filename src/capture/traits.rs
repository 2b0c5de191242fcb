//! Capture trait definitions
//!
//! Platform-agnostic traits for frame sources and the cameras they wrap.

use crate::utils::error::SourceError;
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Whether a camera is currently usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Active,
    Inactive,
}

/// Information about a camera known to the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Logical camera id used in requests (e.g. "camera1")
    pub id: String,

    /// Display name
    pub name: String,

    /// Whether the camera is active
    pub status: CameraState,

    /// Nominal resolution, formatted as `WIDTHxHEIGHT`
    pub resolution: String,

    /// Device selector handed to the source provider (defaults to `id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl CameraInfo {
    /// Device selector for this camera
    pub fn device_selector(&self) -> &str {
        self.device.as_deref().unwrap_or(&self.id)
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Largest resolution a source is ever opened with (8K UHD)
    pub const MAX: Resolution = Resolution::new(7680, 4320);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `WIDTHxHEIGHT` string
    ///
    /// Zero sizes and sizes beyond [`Resolution::MAX`] are rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let (width, height) = text.trim().split_once(['x', 'X'])?;
        let width = width.trim().parse().ok()?;
        let height = height.trim().parse().ok()?;
        if width == 0 || height == 0 || width > Self::MAX.width || height > Self::MAX.height {
            return None;
        }
        Some(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters for opening a frame source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    /// Device selector (index or name)
    pub device: String,

    /// Requested width in pixels
    pub width: u32,

    /// Requested height in pixels
    pub height: u32,

    /// Requested frames per second
    pub frame_rate: u32,

    /// Whether audio should be captured alongside video
    pub audio: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: 30,
            audio: true,
        }
    }
}

impl SourceConfig {
    /// Config for a known camera at its nominal resolution
    pub fn for_camera(camera: &CameraInfo) -> Self {
        let resolution =
            Resolution::parse(&camera.resolution).unwrap_or(Resolution::new(1920, 1080));
        Self {
            device: camera.device_selector().to_string(),
            width: resolution.width,
            height: resolution.height,
            ..Self::default()
        }
    }
}

/// A single decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// RGBA pixels
    pub image: RgbaImage,

    /// Time since the source was opened
    pub timestamp: Duration,

    /// Index of this frame within its source (0, 1, 2, ...)
    pub sequence: u64,
}

impl RawFrame {
    pub fn new(image: RgbaImage, timestamp: Duration, sequence: u64) -> Self {
        Self {
            image,
            timestamp,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A live media source producing frames
///
/// `next_frame` returns `Ok(None)` at end of stream. `close` is idempotent
/// and may be called concurrently with `next_frame`.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Device selector this source was opened with
    fn device(&self) -> &str;

    /// Pull the next frame
    async fn next_frame(&self) -> Result<Option<RawFrame>, SourceError>;

    /// Release the underlying device
    async fn close(&self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

/// Opens frame sources by device selector
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Acquire the device described by `config`
    ///
    /// Fails with `SourceError::Unavailable` when the device cannot be
    /// acquired at all.
    async fn open(&self, config: &SourceConfig) -> Result<Arc<dyn FrameSource>, SourceError>;
}
