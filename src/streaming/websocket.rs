//! WebSocket push transport
//!
//! Connects to the stream url handed out by `start` and pushes every frame
//! as one binary message. A close frame, a read error or a failed send
//! marks the channel closed, which makes the relay fall back.

use super::transport::{PushChannel, PushTransport};
use crate::utils::error::{CameraError, CameraResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a closing handshake may take
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct WebSocketChannel {
    stream_id: String,
    sink: tokio::sync::Mutex<SplitSink<Socket, Message>>,
    open: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Watch the read half until the peer goes away
async fn watch_peer(stream_id: String, mut incoming: SplitStream<Socket>, open: Arc<AtomicBool>) {
    while let Some(message) = incoming.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                tracing::info!("Viewer endpoint of {} closed: {:?}", stream_id, frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("WebSocket of {} failed: {}", stream_id, e);
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn send(&self, frame: Bytes) -> CameraResult<()> {
        if !self.is_open() {
            return Err(CameraError::TransportFailed(format!(
                "WebSocket of {} is closed",
                self.stream_id
            )));
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Binary(frame.to_vec())).await {
            self.open.store(false, Ordering::SeqCst);
            return Err(CameraError::TransportFailed(format!(
                "WebSocket send for {} failed: {}",
                self.stream_id, e
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        if was_open {
            let closing = async {
                let mut sink = self.sink.lock().await;
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            };
            if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
                tracing::warn!("Closing handshake of {} timed out", self.stream_id);
            }
            tracing::debug!("WebSocket of {} closed", self.stream_id);
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Push transport over a client WebSocket per stream
#[derive(Debug, Clone)]
pub struct WebSocketPushTransport {
    connect_timeout: Duration,
}

impl WebSocketPushTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl PushTransport for WebSocketPushTransport {
    async fn open(&self, stream_id: &str, target: &str) -> CameraResult<Arc<dyn PushChannel>> {
        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(target))
            .await
            .map_err(|_| {
                CameraError::TransportFailed(format!("Connecting to {} timed out", target))
            })?
            .map_err(|e| {
                CameraError::TransportFailed(format!("Connecting to {} failed: {}", target, e))
            })?;

        let (sink, incoming) = socket.split();
        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(watch_peer(stream_id.to_string(), incoming, Arc::clone(&open)));

        tracing::info!("WebSocket for {} connected to {}", stream_id, target);
        Ok(Arc::new(WebSocketChannel {
            stream_id: stream_id.to_string(),
            sink: tokio::sync::Mutex::new(sink),
            open,
            reader: Mutex::new(Some(reader)),
        }))
    }
}
