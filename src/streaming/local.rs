//! In-process push transport
//!
//! Frames are published on a broadcast channel per stream. Viewers that
//! fall behind skip to the newest frames instead of queueing.

use super::transport::{PushChannel, PushTransport};
use crate::utils::error::{CameraError, CameraResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Frames buffered per viewer before older ones are skipped
const VIEWER_BUFFER: usize = 2;

type ChannelMap = Mutex<HashMap<String, Arc<LocalChannel>>>;

struct LocalChannel {
    stream_id: String,
    frames: broadcast::Sender<Bytes>,
    open: AtomicBool,
    /// Map this channel is published in
    channels: Weak<ChannelMap>,
}

#[async_trait]
impl PushChannel for LocalChannel {
    async fn send(&self, frame: Bytes) -> CameraResult<()> {
        if !self.is_open() {
            return Err(CameraError::TransportFailed(format!(
                "Push channel for {} is closed",
                self.stream_id
            )));
        }
        // No viewer attached yet is not a failure
        let _ = self.frames.send(frame);
        Ok(())
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::debug!("Push channel for {} closed", self.stream_id);
        }
        if let Some(channels) = self.channels.upgrade() {
            let mut channels = channels.lock();
            // A later open may have replaced this channel
            let current = channels
                .get(&self.stream_id)
                .is_some_and(|channel| std::ptr::eq(Arc::as_ptr(channel), self));
            if current {
                channels.remove(&self.stream_id);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Push transport delivering frames to in-process viewers
#[derive(Default)]
pub struct LocalPushTransport {
    channels: Arc<ChannelMap>,
}

impl LocalPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive frames of `stream_id`, if a channel is open for it
    pub fn subscribe(&self, stream_id: &str) -> Option<broadcast::Receiver<Bytes>> {
        self.channels
            .lock()
            .get(stream_id)
            .filter(|channel| channel.is_open())
            .map(|channel| channel.frames.subscribe())
    }

    /// Number of channels currently published
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Drop the channel of `stream_id` as a disconnecting viewer would
    pub fn disconnect(&self, stream_id: &str) -> bool {
        match self.channels.lock().remove(stream_id) {
            Some(channel) => {
                channel.open.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PushTransport for LocalPushTransport {
    async fn open(&self, stream_id: &str, target: &str) -> CameraResult<Arc<dyn PushChannel>> {
        let (frames, _) = broadcast::channel(VIEWER_BUFFER);
        let channel = Arc::new(LocalChannel {
            stream_id: stream_id.to_string(),
            frames,
            open: AtomicBool::new(true),
            channels: Arc::downgrade(&self.channels),
        });
        self.channels
            .lock()
            .insert(stream_id.to_string(), Arc::clone(&channel));
        tracing::debug!("Opened push channel for {} at {}", stream_id, target);
        Ok(channel)
    }
}
