//! Synthetic frame source
//!
//! Produces deterministic gradient frames without any hardware. Used for
//! headless operation and throughout the test suite.

use super::traits::{FrameSource, RawFrame, Resolution, SourceConfig, SourceProvider};
use crate::utils::error::{SourceError, SourceUnavailableReason};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Render the test pattern for frame `sequence`
pub fn pattern_frame(width: u32, height: u32, sequence: u64) -> RgbaImage {
    let blue = ((sequence * 16) % 256) as u8;
    RgbaImage::from_fn(width, height, |x, y| {
        let red = (x * 255 / width.max(1)) as u8;
        let green = (y * 255 / height.max(1)) as u8;
        Rgba([red, green, blue, 255])
    })
}

/// Frame source generating gradient frames
pub struct TestPatternSource {
    device: String,
    width: u32,
    height: u32,
    frame_limit: Option<u64>,
    frame_interval: Option<Duration>,
    produced: AtomicU64,
    closed: AtomicBool,
    opened_at: Instant,
}

impl TestPatternSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            device: config.device.clone(),
            width: config.width.clamp(1, Resolution::MAX.width),
            height: config.height.clamp(1, Resolution::MAX.height),
            frame_limit: None,
            frame_interval: None,
            produced: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            opened_at: Instant::now(),
        }
    }

    /// End the stream after `limit` frames
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Wait `interval` before delivering each frame
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Frame width and height
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of frames handed out so far
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    fn device(&self) -> &str {
        &self.device
    }

    async fn next_frame(&self) -> Result<Option<RawFrame>, SourceError> {
        if self.is_closed() {
            return Ok(None);
        }

        if let Some(interval) = self.frame_interval {
            tokio::time::sleep(interval).await;
        }

        let sequence = self.produced.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.frame_limit {
            if sequence >= limit {
                return Ok(None);
            }
        }

        let (width, height) = (self.width, self.height);
        let image = tokio::task::spawn_blocking(move || pattern_frame(width, height, sequence))
            .await
            .map_err(|e| SourceError::Transient(format!("Pattern generation failed: {}", e)))?;
        Ok(Some(RawFrame::new(image, self.opened_at.elapsed(), sequence)))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Test pattern source {} closed", self.device);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provider opening `TestPatternSource`s for any device
///
/// Individual devices can be marked unavailable to exercise failure paths.
#[derive(Default)]
pub struct TestPatternProvider {
    frame_limit: Option<u64>,
    frame_interval: Option<Duration>,
    unavailable: Mutex<HashMap<String, SourceUnavailableReason>>,
    opened: Mutex<Vec<Arc<TestPatternSource>>>,
}

impl TestPatternProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every opened source ends after `limit` frames
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Every opened source paces frames at `interval`
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Make `open` fail for `device`
    pub fn mark_unavailable(&self, device: &str, reason: SourceUnavailableReason) {
        self.unavailable.lock().insert(device.to_string(), reason);
    }

    /// Sources opened so far, in order
    pub fn opened(&self) -> Vec<Arc<TestPatternSource>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SourceProvider for TestPatternProvider {
    async fn open(&self, config: &SourceConfig) -> Result<Arc<dyn FrameSource>, SourceError> {
        if let Some(reason) = self.unavailable.lock().get(&config.device).copied() {
            return Err(SourceError::Unavailable {
                device: config.device.clone(),
                reason,
            });
        }

        let mut source = TestPatternSource::new(config);
        if let Some(limit) = self.frame_limit {
            source = source.with_frame_limit(limit);
        }
        if let Some(interval) = self.frame_interval {
            source = source.with_frame_interval(interval);
        }

        let source = Arc::new(source);
        self.opened.lock().push(source.clone());
        tracing::debug!(
            "Opened test pattern source {} ({}x{})",
            config.device,
            config.width,
            config.height
        );
        Ok(source)
    }
}
