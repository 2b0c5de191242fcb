//! Shared utilities

pub mod error;
pub mod time;

pub use error::{CameraError, CameraResponse, CameraResult, SourceError, SourceUnavailableReason};
