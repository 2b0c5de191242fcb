//! Error types and handling
//!
//! Common error types used across the capture, recording and streaming engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a frame source could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceUnavailableReason {
    /// The operating system refused access to the device
    PermissionDenied,
    /// The device exists but another process holds it
    Busy,
    /// No device matches the selector
    Absent,
}

impl std::fmt::Display for SourceUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SourceUnavailableReason::PermissionDenied => "permission denied",
            SourceUnavailableReason::Busy => "device busy",
            SourceUnavailableReason::Absent => "device absent",
        };
        f.write_str(text)
    }
}

/// Errors raised by frame sources
///
/// `Unavailable` is permanent for the call that produced it, `Transient`
/// may succeed on retry.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Camera {device} unavailable: {reason}")]
    Unavailable {
        device: String,
        reason: SourceUnavailableReason,
    },

    #[error("Transient source failure: {0}")]
    Transient(String),
}

impl SourceError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera {camera_id} unavailable: {reason}")]
    SourceUnavailable {
        camera_id: String,
        reason: SourceUnavailableReason,
    },

    #[error("Source failure: {0}")]
    Source(String),

    #[error("No frame available from camera {0}")]
    NoFrameAvailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: String, reason: String },

    #[error("Storage write failed for {path}: {reason}")]
    StorageWriteFailed { path: String, reason: String },

    #[error("Transport failed: {0}")]
    TransportFailed(String),

    #[error("Encoding error: {0}")]
    Encode(String),
}

impl CameraError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            CameraError::Source(_) => "SOURCE_ERROR",
            CameraError::NoFrameAvailable(_) => "NO_FRAME_AVAILABLE",
            CameraError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            CameraError::DuplicateSession(_) => "DUPLICATE_SESSION",
            CameraError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            CameraError::StorageWriteFailed { .. } => "STORAGE_WRITE_FAILED",
            CameraError::TransportFailed(_) => "TRANSPORT_FAILED",
            CameraError::Encode(_) => "ENCODE_ERROR",
        }
    }
}

impl From<SourceError> for CameraError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Unavailable { device, reason } => CameraError::SourceUnavailable {
                camera_id: device,
                reason,
            },
            SourceError::Transient(message) => CameraError::Source(message),
        }
    }
}

/// Response envelope returned to the control surface
///
/// Every boundary operation reports a success flag and a human-readable
/// message, plus either a payload or an error code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> CameraResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
        }
    }

    /// Build a response from an operation result
    pub fn from_result(result: CameraResult<T>, success_message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(success_message, data),
            Err(error) => error.into(),
        }
    }
}

impl<T> From<CameraError> for CameraResponse<T> {
    fn from(error: CameraError) -> Self {
        CameraResponse {
            success: false,
            message: error.to_string(),
            code: Some(error.code().to_string()),
            data: None,
        }
    }
}

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_maps_to_unavailable() {
        let error: CameraError = SourceError::Unavailable {
            device: "camera2".to_string(),
            reason: SourceUnavailableReason::Busy,
        }
        .into();

        assert_eq!(error.code(), "SOURCE_UNAVAILABLE");
        assert_eq!(error.to_string(), "Camera camera2 unavailable: device busy");
    }

    #[test]
    fn test_transient_is_distinguishable() {
        let transient = SourceError::Transient("timeout".to_string());
        let permanent = SourceError::Unavailable {
            device: "0".to_string(),
            reason: SourceUnavailableReason::PermissionDenied,
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_response_from_error() {
        let response: CameraResponse<()> =
            CameraError::SessionNotFound("rec_999_x".to_string()).into();

        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("SESSION_NOT_FOUND"));
        assert!(response.message.contains("rec_999_x"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_response_from_ok_result() {
        let response = CameraResponse::from_result(Ok(7u64), "Chunk uploaded successfully");
        assert!(response.success);
        assert_eq!(response.data, Some(7));
        assert!(response.code.is_none());
    }
}
