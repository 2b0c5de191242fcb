//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::capture::encode::StillFormat;
use crate::capture::traits::{CameraInfo, CameraState};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CamstudioConfig {
    /// Cameras known to the registry
    pub cameras: Vec<CameraInfo>,

    /// Camera used when a request does not name one
    pub default_camera: String,

    pub recording: RecordingConfig,
    pub streaming: StreamingConfig,
    pub capture: CaptureConfig,
    pub defaults: MediaDefaults,
}

impl Default for CamstudioConfig {
    fn default() -> Self {
        Self {
            cameras: default_cameras(),
            default_camera: "camera1".to_string(),
            recording: RecordingConfig::default(),
            streaming: StreamingConfig::default(),
            capture: CaptureConfig::default(),
            defaults: MediaDefaults::default(),
        }
    }
}

fn default_cameras() -> Vec<CameraInfo> {
    let camera = |id: &str, name: &str, status, resolution: &str| CameraInfo {
        id: id.to_string(),
        name: name.to_string(),
        status,
        resolution: resolution.to_string(),
        device: None,
    };
    vec![
        camera("camera1", "Camera 1 (Main Entrance)", CameraState::Active, "1920x1080"),
        camera("camera2", "Camera 2 (Side View)", CameraState::Active, "1280x720"),
        camera("camera3", "Camera 3 (Rear View)", CameraState::Inactive, "1920x1080"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Storage path used when a start request has none
    pub default_path: PathBuf,

    /// How long a completed recording stays in the registry
    pub grace_period_ms: u64,

    /// Extension of chunk files and the final artifact
    pub chunk_extension: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            default_path: PathBuf::from("./uploads/recordings/"),
            grace_period_ms: 5000,
            chunk_extension: "webm".to_string(),
        }
    }
}

impl RecordingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Which push transport streams use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushTransportKind {
    /// In-process viewers
    #[default]
    Local,
    /// A WebSocket connection to `public_base_url`
    WebSocket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// How long a stopped stream stays in the registry
    pub grace_period_ms: u64,

    /// Cadence of the primary relay loop
    pub refresh_rate_hz: u32,

    /// Segment cadence of the fallback transport
    pub fallback_interval_ms: u64,

    /// JPEG quality of relayed frames
    pub frame_quality: f32,

    /// Base of the push channel url handed back to clients
    pub public_base_url: String,

    /// Endpoint accepting fallback chunk uploads
    pub http_endpoint: String,

    /// Server that `http_endpoint` is resolved against
    pub upload_base_url: String,

    pub push_transport: PushTransportKind,

    /// How long opening a push channel may take
    pub connect_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            refresh_rate_hz: 60,
            fallback_interval_ms: 100,
            frame_quality: 0.8,
            public_base_url: "ws://localhost:8080/api/camera/stream".to_string(),
            http_endpoint: "/api/camera/stream-chunk".to_string(),
            upload_base_url: "http://localhost:8080".to_string(),
            push_transport: PushTransportKind::Local,
            connect_timeout_ms: 5000,
        }
    }
}

impl StreamingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Interval between primary relay ticks
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.refresh_rate_hz.max(1) as u64)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub format: StillFormat,
    pub quality: f32,
    pub default_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: StillFormat::Jpeg,
            quality: 0.9,
            default_path: PathBuf::from("./uploads/screenshots/"),
        }
    }
}

/// Defaults echoed back for settings a request leaves out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaDefaults {
    pub resolution: String,
    pub bitrate: u64,
}

impl Default for MediaDefaults {
    fn default() -> Self {
        Self {
            resolution: "1920x1080".to_string(),
            bitrate: 2_500_000,
        }
    }
}

/// Optional media settings supplied with a start request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSettings {
    pub resolution: Option<String>,
    pub bitrate: Option<u64>,
}

/// Media settings with defaults filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    pub resolution: String,
    pub bitrate: u64,
}

impl MediaDefaults {
    /// Fill in whatever `settings` leaves out
    pub fn resolve(&self, settings: &MediaSettings) -> ResolvedSettings {
        ResolvedSettings {
            resolution: settings
                .resolution
                .clone()
                .unwrap_or_else(|| self.resolution.clone()),
            bitrate: settings.bitrate.unwrap_or(self.bitrate),
        }
    }
}

impl CamstudioConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cameras.is_empty() {
            anyhow::bail!("At least one camera must be configured");
        }
        if self.camera(&self.default_camera).is_none() {
            anyhow::bail!("Default camera {} is not configured", self.default_camera);
        }
        Ok(())
    }

    /// Look up a camera by id
    pub fn camera(&self, id: &str) -> Option<&CameraInfo> {
        self.cameras.iter().find(|camera| camera.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CamstudioConfig::from_toml_str("").unwrap();
        assert_eq!(config, CamstudioConfig::default());
        assert_eq!(config.cameras.len(), 3);
        assert_eq!(config.recording.grace_period(), Duration::from_secs(5));
        assert_eq!(config.streaming.grace_period(), Duration::from_secs(1));
        assert_eq!(config.streaming.fallback_interval(), Duration::from_millis(100));
        assert_eq!(config.streaming.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_override() {
        let config = CamstudioConfig::from_toml_str(
            r#"
            default_camera = "lobby"

            [[cameras]]
            id = "lobby"
            name = "Lobby"
            status = "active"
            resolution = "640x480"
            device = "0"

            [recording]
            grace_period_ms = 250

            [streaming]
            push_transport = "websocket"

            [capture]
            format = "png"
            "#,
        )
        .unwrap();

        assert_eq!(config.cameras.len(), 1);
        assert_eq!(config.camera("lobby").unwrap().device_selector(), "0");
        assert_eq!(config.recording.grace_period_ms, 250);
        assert_eq!(config.recording.chunk_extension, "webm");
        assert_eq!(config.capture.format, StillFormat::Png);
        assert_eq!(config.streaming.refresh_rate_hz, 60);
        assert_eq!(config.streaming.push_transport, PushTransportKind::WebSocket);
    }

    #[test]
    fn test_unknown_default_camera_rejected() {
        let result = CamstudioConfig::from_toml_str("default_camera = \"nowhere\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_resolution() {
        let defaults = MediaDefaults::default();
        let resolved = defaults.resolve(&MediaSettings {
            resolution: Some("1280x720".to_string()),
            bitrate: None,
        });
        assert_eq!(resolved.resolution, "1280x720");
        assert_eq!(resolved.bitrate, 2_500_000);
    }

    #[test]
    fn test_refresh_interval() {
        let config = StreamingConfig {
            refresh_rate_hz: 50,
            ..StreamingConfig::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_millis(20));
    }
}
