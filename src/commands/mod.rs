//! Command handlers
//!
//! This module contains the boundary operations that the route layer
//! calls into.

pub mod camera;

pub use camera::{
    CameraService, CaptureRequest, SavedCapture, StartRecordingRequest, StartStreamingRequest,
};
