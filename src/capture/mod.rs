//! Frame sources and still capture
//!
//! This module provides the frame source abstraction, a synthetic source,
//! the native webcam source (feature `native-camera`) and the still
//! capture engine.

pub mod encode;
pub mod still;
pub mod test_pattern;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod webcam;

// Re-export traits
pub use traits::{
    CameraInfo, CameraState, FrameSource, RawFrame, Resolution, SourceConfig, SourceProvider,
};

pub use encode::{EncodedImage, StillFormat};
pub use still::CaptureEngine;
pub use test_pattern::{TestPatternProvider, TestPatternSource};
