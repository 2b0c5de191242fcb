//! Camera control commands
//!
//! Boundary operations consumed by the route layer. Every operation
//! answers with a [`CameraResponse`] carrying a success flag and a
//! human-readable message.

use crate::capture::encode::EncodedImage;
use crate::capture::traits::{SourceConfig, SourceProvider};
use crate::capture::{CaptureEngine, TestPatternProvider};
use crate::config::{CamstudioConfig, MediaSettings};
use crate::overlay::DetectionBox;
use crate::config::PushTransportKind;
use crate::recorder::{
    ChunkReceipt, FsStorage, MediaStorage, RecordingManager, RecordingStarted, RecordingSummary,
};
use crate::session::{CameraStatus, DurationInfo, SessionRegistry};
use crate::streaming::{
    FallbackTransport, HttpFallbackTransport, LocalPushTransport, PushTransport,
    StreamChunkReceipt, StreamStarted, StreamingManager, WebSocketPushTransport,
};
use crate::utils::error::{CameraError, CameraResponse, CameraResult, SourceUnavailableReason};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRecordingRequest {
    pub camera_id: Option<String>,
    pub path: Option<PathBuf>,
    pub settings: MediaSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartStreamingRequest {
    pub camera_id: Option<String>,
    pub settings: MediaSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureRequest {
    pub camera_id: Option<String>,
    pub boxes: Vec<DetectionBox>,
    /// Directory for `save_still`
    pub path: Option<PathBuf>,
}

/// A still written to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCapture {
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
    pub timestamp: DateTime<Utc>,
}

/// Application state for camera control
pub struct CameraService {
    config: CamstudioConfig,
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn SourceProvider>,
    storage: Arc<dyn MediaStorage>,
    capture: CaptureEngine,
    recordings: RecordingManager,
    streams: StreamingManager,
}

impl CameraService {
    pub fn new(
        config: CamstudioConfig,
        provider: Arc<dyn SourceProvider>,
        storage: Arc<dyn MediaStorage>,
        push: Arc<dyn PushTransport>,
        fallback: Arc<dyn FallbackTransport>,
    ) -> Self {
        let registry = SessionRegistry::new_shared(config.cameras.clone());
        let recordings =
            RecordingManager::new(Arc::clone(&registry), Arc::clone(&storage), &config);
        let streams = StreamingManager::new(
            Arc::clone(&registry),
            Arc::clone(&provider),
            push,
            fallback,
            &config,
        );
        Self {
            capture: CaptureEngine::new(config.capture.format, config.capture.quality),
            config,
            registry,
            provider,
            storage,
            recordings,
            streams,
        }
    }

    /// Service over synthetic sources and local storage
    ///
    /// Transports follow `config.streaming`.
    pub fn with_test_pattern(config: CamstudioConfig) -> CameraResult<Self> {
        let (push, fallback) = transports_for(&config)?;
        Ok(Self::new(
            config,
            Arc::new(TestPatternProvider::new()),
            Arc::new(FsStorage),
            push,
            fallback,
        ))
    }

    /// Service over the native cameras
    #[cfg(feature = "native-camera")]
    pub fn with_native_cameras(config: CamstudioConfig) -> CameraResult<Self> {
        let (push, fallback) = transports_for(&config)?;
        Ok(Self::new(
            config,
            Arc::new(crate::capture::webcam::NativeCameraProvider),
            Arc::new(FsStorage),
            push,
            fallback,
        ))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn streams(&self) -> &StreamingManager {
        &self.streams
    }

    fn camera_or_default<'a>(&'a self, camera_id: &'a Option<String>) -> &'a str {
        camera_id.as_deref().unwrap_or(&self.config.default_camera)
    }

    /// Start a recording
    pub async fn start_recording(
        &self,
        request: StartRecordingRequest,
    ) -> CameraResponse<RecordingStarted> {
        let camera_id = self.camera_or_default(&request.camera_id);
        let result = self
            .recordings
            .start(camera_id, request.path.clone(), &request.settings)
            .await;
        respond("start_recording", result, "Recording started")
    }

    /// Accept one recording chunk
    pub async fn accept_recording_chunk(
        &self,
        session_id: &str,
        bytes: &[u8],
        is_final: bool,
    ) -> CameraResponse<ChunkReceipt> {
        let result = self.recordings.accept_chunk(session_id, bytes, is_final).await;
        let message = if is_final { "Recording completed" } else { "Chunk received" };
        respond("accept_recording_chunk", result, message)
    }

    /// Stop a recording
    pub async fn stop_recording(&self, session_id: &str) -> CameraResponse<RecordingSummary> {
        let result = self.recordings.stop(session_id).await;
        respond("stop_recording", result, "Recording stopped")
    }

    /// Start a stream
    pub async fn start_streaming(
        &self,
        request: StartStreamingRequest,
    ) -> CameraResponse<StreamStarted> {
        let camera_id = self.camera_or_default(&request.camera_id);
        let result = self.streams.start(camera_id, &request.settings).await;
        respond("start_streaming", result, "Streaming started")
    }

    /// Accept a chunk uploaded over the fallback path
    pub fn accept_stream_chunk(
        &self,
        stream_id: &str,
        bytes: Bytes,
        timestamp: i64,
    ) -> CameraResponse<StreamChunkReceipt> {
        let result = self.streams.accept_chunk(stream_id, bytes, timestamp);
        respond("accept_stream_chunk", result, "Chunk processed")
    }

    /// Replace the overlay of a stream
    pub fn update_detection_boxes(
        &self,
        stream_id: &str,
        boxes: Vec<DetectionBox>,
    ) -> CameraResponse<()> {
        let result = self.streams.update_detection_boxes(stream_id, boxes);
        respond("update_detection_boxes", result, "Detection boxes updated")
    }

    /// Stop a stream
    pub async fn stop_streaming(&self, stream_id: &str) -> CameraResponse<DurationInfo> {
        let result = self.streams.stop(stream_id).await;
        respond("stop_streaming", result, "Streaming stopped")
    }

    /// Capture one still with the overlay applied
    pub async fn capture_still(&self, request: &CaptureRequest) -> CameraResponse<EncodedImage> {
        let result = self.grab(request).await;
        respond("capture_still", result, "Screenshot captured")
    }

    /// Capture one still and write it to storage
    pub async fn save_still(&self, request: &CaptureRequest) -> CameraResponse<SavedCapture> {
        let result = self.grab_and_store(request).await;
        respond("save_still", result, "Screenshot saved")
    }

    /// Aggregate status of active sessions
    pub fn get_status(&self) -> CameraResponse<CameraStatus> {
        CameraResponse::ok("Status retrieved", self.registry.status())
    }

    async fn grab(&self, request: &CaptureRequest) -> CameraResult<EncodedImage> {
        let camera_id = self.camera_or_default(&request.camera_id);
        let camera = self
            .registry
            .camera(camera_id)
            .ok_or_else(|| CameraError::SourceUnavailable {
                camera_id: camera_id.to_string(),
                reason: SourceUnavailableReason::Absent,
            })?;

        let source = self.provider.open(&SourceConfig::for_camera(camera)).await?;
        let result = self.capture.capture(source.as_ref(), &request.boxes).await;
        source.close().await;
        result
    }

    async fn grab_and_store(&self, request: &CaptureRequest) -> CameraResult<SavedCapture> {
        let image = self.grab(request).await?;
        let camera_id = self.camera_or_default(&request.camera_id);
        let dir = request
            .path
            .clone()
            .unwrap_or_else(|| self.config.capture.default_path.clone());

        self.storage
            .ensure_directory(&dir)
            .await
            .map_err(|e| CameraError::StorageUnavailable {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let timestamp = Utc::now();
        let filename = format!(
            "screenshot_{}_{}.{}",
            camera_id,
            timestamp.timestamp_millis(),
            image.format.extension()
        );
        let path = dir.join(&filename);
        self.storage
            .write_file(&path, &image.bytes)
            .await
            .map_err(|e| CameraError::StorageWriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let size = image.bytes.len();
        tracing::info!("Saved screenshot {} ({} bytes)", path.display(), size);
        Ok(SavedCapture {
            filename,
            path,
            size,
            timestamp,
        })
    }
}

type Transports = (Arc<dyn PushTransport>, Arc<dyn FallbackTransport>);

fn transports_for(config: &CamstudioConfig) -> CameraResult<Transports> {
    let streaming = &config.streaming;
    let push: Arc<dyn PushTransport> = match streaming.push_transport {
        PushTransportKind::Local => Arc::new(LocalPushTransport::new()),
        PushTransportKind::WebSocket => {
            Arc::new(WebSocketPushTransport::new(streaming.connect_timeout()))
        }
    };
    let fallback = HttpFallbackTransport::new(streaming.upload_base_url.clone())?;
    Ok((push, Arc::new(fallback)))
}

/// Wrap a result, logging failures
fn respond<T>(
    operation: &str,
    result: CameraResult<T>,
    success_message: &str,
) -> CameraResponse<T> {
    if let Err(e) = &result {
        tracing::warn!("{} failed: {}", operation, e);
    }
    CameraResponse::from_result(result, success_message)
}
