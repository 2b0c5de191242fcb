//! Native webcam capture using nokhwa
//!
//! The camera lives on a dedicated capture thread. Decoded frames are handed
//! to the async side through a one-slot channel; when the consumer is slow
//! the newest frame is dropped instead of queued.

use super::traits::{FrameSource, RawFrame, SourceConfig, SourceProvider};
use crate::utils::error::{SourceError, SourceUnavailableReason};
use async_trait::async_trait;
use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as NokhwaResolution,
};
use nokhwa::Camera;
use parking_lot::Mutex as ParkingMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Classify a device open failure from its message
fn classify_open_error(device: &str, message: &str) -> SourceError {
    let lower = message.to_ascii_lowercase();
    let denied = ["permission", "denied", "authoriz"];
    let reason = if denied.iter().any(|word| lower.contains(word)) {
        SourceUnavailableReason::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        SourceUnavailableReason::Busy
    } else {
        SourceUnavailableReason::Absent
    };
    tracing::warn!("Failed to open camera {}: {}", device, message);
    SourceError::Unavailable {
        device: device.to_string(),
        reason,
    }
}

/// Get camera index from a device selector
fn camera_index(device: &str) -> CameraIndex {
    match device.parse::<u32>() {
        Ok(idx) => CameraIndex::Index(idx),
        Err(_) => CameraIndex::String(device.to_string()),
    }
}

/// Frame source backed by a physical camera
pub struct WebcamSource {
    device: String,
    frames: Mutex<mpsc::Receiver<RawFrame>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    capture_thread: ParkingMutex<Option<std::thread::JoinHandle<()>>>,
}

impl WebcamSource {
    /// Open the camera and start the capture thread
    pub async fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let device = config.device.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SourceError>>();
        let (frame_tx, frame_rx) = mpsc::channel::<RawFrame>(1);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_device = device.clone();
        let thread_running = running.clone();
        let thread_dropped = dropped.clone();
        let (width, height, fps) = (config.width, config.height, config.frame_rate);

        let handle = std::thread::spawn(move || {
            let requested = CameraFormat::new(
                NokhwaResolution::new(width, height),
                FrameFormat::MJPEG,
                fps,
            );
            let format =
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(requested));

            let mut camera = match Camera::new(camera_index(&thread_device), format) {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = ready_tx.send(Err(classify_open_error(&thread_device, &e.to_string())));
                    return;
                }
            };

            if let Err(e) = camera.open_stream() {
                let _ = ready_tx.send(Err(classify_open_error(&thread_device, &e.to_string())));
                return;
            }

            let camera_format = camera.camera_format();
            tracing::info!(
                "Webcam {} opened: {}x{} @ {}fps (requested {}x{} @ {}fps)",
                thread_device,
                camera_format.resolution().width(),
                camera_format.resolution().height(),
                camera_format.frame_rate(),
                width,
                height,
                fps
            );
            let _ = ready_tx.send(Ok(()));

            let opened_at = Instant::now();
            let mut sequence: u64 = 0;
            while thread_running.load(Ordering::SeqCst) {
                // Blocks until the camera delivers the next frame
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        tracing::debug!("Failed to capture frame: {}", e);
                        continue;
                    }
                };
                let decoded = match buffer.decode_image::<RgbAFormat>() {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::debug!("Failed to decode frame: {}", e);
                        continue;
                    }
                };
                let (frame_width, frame_height) = (decoded.width(), decoded.height());
                let pixels = decoded.into_raw();
                let Some(image) = RgbaImage::from_raw(frame_width, frame_height, pixels) else {
                    continue;
                };

                let frame = RawFrame::new(image, opened_at.elapsed(), sequence);
                sequence += 1;
                match frame_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        thread_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {}", e);
            }
            tracing::info!(
                "Webcam {} capture thread stopped after {} frames",
                thread_device,
                sequence
            );
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                device,
                frames: Mutex::new(frame_rx),
                running,
                dropped,
                capture_thread: ParkingMutex::new(Some(handle)),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SourceError::Transient(format!(
                    "Capture thread for {} exited during open",
                    device
                )))
            }
        }
    }

    /// Frames dropped because the consumer was busy
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSource for WebcamSource {
    fn device(&self) -> &str {
        &self.device
    }

    async fn next_frame(&self) -> Result<Option<RawFrame>, SourceError> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut frames = self.frames.lock().await;
        Ok(frames.recv().await)
    }

    async fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.capture_thread.lock().take();
        if let Some(handle) = handle {
            // Joining blocks until the camera returns its current frame
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
            tracing::info!("Webcam {} closed", self.device);
        }
    }

    fn is_closed(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// Provider opening physical cameras
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCameraProvider;

#[async_trait]
impl SourceProvider for NativeCameraProvider {
    async fn open(&self, config: &SourceConfig) -> Result<Arc<dyn FrameSource>, SourceError> {
        let source = WebcamSource::open(config).await?;
        Ok(Arc::new(source))
    }
}
