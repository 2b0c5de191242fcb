//! Stream transports
//!
//! A stream pushes frames over a primary channel and drops to a periodic
//! upload channel when the primary one cannot be used. The selector tracks
//! which of the two is in use.

use crate::session::{SessionEvent, SessionRegistry};
use crate::utils::error::CameraResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// An open push channel to a viewer
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Push one encoded frame
    async fn send(&self, frame: Bytes) -> CameraResult<()>;

    /// Close the channel; safe to call more than once
    async fn close(&self);

    /// Whether frames can still be pushed
    fn is_open(&self) -> bool;
}

/// Opens primary push channels
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(&self, stream_id: &str, target: &str) -> CameraResult<Arc<dyn PushChannel>>;
}

/// An open fallback upload channel
#[async_trait]
pub trait FallbackChannel: Send + Sync {
    /// Upload one encoded segment captured at `timestamp` (unix millis)
    async fn send(&self, segment: Bytes, timestamp: i64) -> CameraResult<()>;

    async fn close(&self);
}

/// Opens fallback upload channels
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    async fn open(
        &self,
        stream_id: &str,
        endpoint: &str,
    ) -> CameraResult<Arc<dyn FallbackChannel>>;
}

/// Which transport a stream is using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Primary channel handshake in progress
    Connecting,
    /// Frames go over the primary channel
    Primary,
    /// Frames go over the fallback channel
    Fallback,
    /// Both transports failed, or the source ended; nothing more is sent
    Exhausted,
    /// Closed by a stop
    Closed,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Connecting => "connecting",
            TransportState::Primary => "primary",
            TransportState::Fallback => "fallback",
            TransportState::Exhausted => "exhausted",
            TransportState::Closed => "closed",
        }
    }
}

/// Two-state transport selector of one stream
///
/// Fallback is granted at most once per stream.
pub struct TransportSelector {
    stream_id: String,
    state: watch::Sender<TransportState>,
    registry: Arc<SessionRegistry>,
    fallback_attempted: AtomicBool,
}

impl TransportSelector {
    pub fn new(stream_id: &str, registry: Arc<SessionRegistry>) -> Self {
        let (state, _) = watch::channel(TransportState::Connecting);
        Self {
            stream_id: stream_id.to_string(),
            state,
            registry,
            fallback_attempted: AtomicBool::new(false),
        }
    }

    /// Observe state changes
    pub fn watch(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    fn set(&self, next: TransportState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }
        tracing::info!(
            "Stream {} transport {} -> {}",
            self.stream_id,
            previous.as_str(),
            next.as_str()
        );
        self.registry.emit(SessionEvent::TransportChanged {
            id: self.stream_id.clone(),
            transport: next.as_str().to_string(),
        });
    }

    pub fn primary_established(&self) {
        self.set(TransportState::Primary);
    }

    /// Record that the primary channel failed or dropped
    ///
    /// Returns whether a fallback attempt may be made.
    pub fn primary_lost(&self) -> bool {
        !self.fallback_attempted.swap(true, Ordering::SeqCst)
    }

    pub fn fallback_established(&self) {
        self.set(TransportState::Fallback);
    }

    pub fn exhausted(&self) {
        self.set(TransportState::Exhausted);
    }

    pub fn closed(&self) {
        self.set(TransportState::Closed);
    }
}
