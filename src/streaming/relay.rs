//! Frame relay
//!
//! Background task bound to one stream. Pulls frames from the source,
//! composites the current detection boxes, encodes them and pushes them
//! over the primary channel at display refresh cadence. When the primary
//! channel fails the relay switches to the fallback channel once.
//!
//! Every exit path closes the channel in use. The open channel is also
//! parked in a slot shared with the stream handle, which closes it on stop
//! if the relay did not. The cancellation token is checked before each
//! iteration and raced against every await.

use super::transport::{
    FallbackChannel, FallbackTransport, PushChannel, PushTransport, TransportSelector,
};
use crate::capture::encode::StillFormat;
use crate::capture::still::render_frame_blocking;
use crate::capture::traits::FrameSource;
use crate::config::StreamingConfig;
use crate::overlay::DetectionBox;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Why a transport loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    /// The source has no more frames
    Ended,
    /// The channel could not be opened, closed or failed to send
    Lost,
}

enum Produced {
    Frame(Bytes),
    Skip,
    Ended,
}

/// Channel currently held by a relay
pub(crate) enum ActiveChannel {
    Push(Arc<dyn PushChannel>),
    Fallback(Arc<dyn FallbackChannel>),
}

impl ActiveChannel {
    pub async fn close(&self) {
        match self {
            ActiveChannel::Push(channel) => channel.close().await,
            ActiveChannel::Fallback(channel) => channel.close().await,
        }
    }
}

pub(crate) type ChannelSlot = Arc<Mutex<Option<ActiveChannel>>>;

/// Close whatever channel `slot` still holds
pub(crate) async fn close_slot(slot: &ChannelSlot) -> bool {
    let held = slot.lock().take();
    match held {
        Some(channel) => {
            channel.close().await;
            true
        }
        None => false,
    }
}

pub(crate) struct Relay {
    pub stream_id: String,
    pub source: Arc<dyn FrameSource>,
    pub push: Arc<dyn PushTransport>,
    pub fallback: Arc<dyn FallbackTransport>,
    pub push_target: String,
    pub fallback_endpoint: String,
    pub boxes: Arc<RwLock<Vec<DetectionBox>>>,
    pub channel: ChannelSlot,
    pub selector: Arc<TransportSelector>,
    pub config: StreamingConfig,
}

impl Relay {
    pub async fn run(self, cancel: CancellationToken) {
        let mut exit = self.run_primary(&cancel).await;
        if exit == Exit::Lost && self.selector.primary_lost() {
            exit = self.run_fallback(&cancel).await;
        }

        match exit {
            Exit::Cancelled => self.selector.closed(),
            Exit::Ended | Exit::Lost => self.selector.exhausted(),
        }
        tracing::debug!("Relay for stream {} finished: {:?}", self.stream_id, exit);
    }

    async fn run_primary(&self, cancel: &CancellationToken) -> Exit {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Exit::Cancelled,
            opened = self.push.open(&self.stream_id, &self.push_target) => opened,
        };
        let channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Primary transport for {} unavailable: {}", self.stream_id, e);
                return Exit::Lost;
            }
        };

        self.selector.primary_established();
        *self.channel.lock() = Some(ActiveChannel::Push(Arc::clone(&channel)));
        let exit = self.pump_primary(channel.as_ref(), cancel).await;
        close_slot(&self.channel).await;
        exit
    }

    async fn pump_primary(&self, channel: &dyn PushChannel, cancel: &CancellationToken) -> Exit {
        let mut ticker = tokio::time::interval(self.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Exit::Cancelled,
                _ = ticker.tick() => {}
            }
            if !channel.is_open() {
                tracing::warn!("Primary channel for {} closed", self.stream_id);
                return Exit::Lost;
            }

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Exit::Cancelled,
                step = self.push_once(channel) => step,
            };
            if let Some(exit) = step {
                return exit;
            }
        }
    }

    async fn push_once(&self, channel: &dyn PushChannel) -> Option<Exit> {
        let frame = match self.produce().await {
            Produced::Frame(frame) => frame,
            Produced::Skip => return None,
            Produced::Ended => return Some(Exit::Ended),
        };

        // The consumer may have gone away while the frame was encoded
        if !channel.is_open() {
            return Some(Exit::Lost);
        }
        match channel.send(frame).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Push to {} failed: {}", self.stream_id, e);
                Some(Exit::Lost)
            }
        }
    }

    async fn run_fallback(&self, cancel: &CancellationToken) -> Exit {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Exit::Cancelled,
            opened = self.fallback.open(&self.stream_id, &self.fallback_endpoint) => opened,
        };
        let channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("Fallback transport for {} unavailable: {}", self.stream_id, e);
                return Exit::Lost;
            }
        };

        self.selector.fallback_established();
        *self.channel.lock() = Some(ActiveChannel::Fallback(Arc::clone(&channel)));
        let exit = self.pump_fallback(channel.as_ref(), cancel).await;
        close_slot(&self.channel).await;
        exit
    }

    async fn pump_fallback(
        &self,
        channel: &dyn FallbackChannel,
        cancel: &CancellationToken,
    ) -> Exit {
        let mut ticker = tokio::time::interval(self.config.fallback_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Exit::Cancelled,
                _ = ticker.tick() => {}
            }

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Exit::Cancelled,
                step = self.upload_once(channel) => step,
            };
            if let Some(exit) = step {
                return exit;
            }
        }
    }

    async fn upload_once(&self, channel: &dyn FallbackChannel) -> Option<Exit> {
        let segment = match self.produce().await {
            Produced::Frame(segment) => segment,
            Produced::Skip => return None,
            Produced::Ended => return Some(Exit::Ended),
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        match channel.send(segment, timestamp).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!("Fallback upload for {} failed: {}", self.stream_id, e);
                Some(Exit::Lost)
            }
        }
    }

    /// Pull, composite and encode the next frame
    async fn produce(&self) -> Produced {
        let frame = match self.source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Source of stream {} ended", self.stream_id);
                return Produced::Ended;
            }
            Err(e) if e.is_transient() => {
                tracing::debug!("Skipping frame for {}: {}", self.stream_id, e);
                return Produced::Skip;
            }
            Err(e) => {
                tracing::error!("Source of stream {} failed: {}", self.stream_id, e);
                return Produced::Ended;
            }
        };

        let boxes = self.boxes.read().clone();
        let quality = self.config.frame_quality;
        match render_frame_blocking(frame, boxes, StillFormat::Jpeg, quality).await {
            Ok(image) => Produced::Frame(Bytes::from(image.bytes)),
            Err(e) => {
                tracing::warn!("Failed to encode frame for {}: {}", self.stream_id, e);
                Produced::Skip
            }
        }
    }
}
