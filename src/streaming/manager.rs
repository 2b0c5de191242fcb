//! Streaming session manager
//!
//! Owns the lifecycle of live streams. Each stream holds an open frame
//! source and a relay task; stopping cancels the relay, waits for it to
//! release its channel and closes the source.

use super::relay::{close_slot, ChannelSlot, Relay};
use super::state::{stream_url, StreamChunk, StreamChunkReceipt, StreamStarted};
use super::transport::{FallbackTransport, PushTransport, TransportSelector, TransportState};
use crate::capture::traits::{FrameSource, Resolution, SourceConfig, SourceProvider};
use crate::config::{CamstudioConfig, MediaDefaults, MediaSettings, StreamingConfig};
use crate::overlay::DetectionBox;
use crate::session::{DurationInfo, SessionKind, SessionRegistry, StopClaim};
use crate::utils::error::{CameraError, CameraResult, SourceUnavailableReason};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Resources held by one stream
struct StreamHandle {
    source: Arc<dyn FrameSource>,
    boxes: Arc<RwLock<Vec<DetectionBox>>>,
    selector: Arc<TransportSelector>,
    channel: ChannelSlot,
    cancel: CancellationToken,
    relay: Mutex<Option<JoinHandle<()>>>,
}

type StreamMap = Arc<Mutex<HashMap<String, Arc<StreamHandle>>>>;

/// Manages streaming sessions
pub struct StreamingManager {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn SourceProvider>,
    push: Arc<dyn PushTransport>,
    fallback: Arc<dyn FallbackTransport>,
    config: StreamingConfig,
    defaults: MediaDefaults,
    streams: StreamMap,
    chunk_tx: broadcast::Sender<StreamChunk>,
}

impl StreamingManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn SourceProvider>,
        push: Arc<dyn PushTransport>,
        fallback: Arc<dyn FallbackTransport>,
        config: &CamstudioConfig,
    ) -> Self {
        let (chunk_tx, _) = broadcast::channel(64);
        Self {
            registry,
            provider,
            push,
            fallback,
            config: config.streaming.clone(),
            defaults: config.defaults.clone(),
            streams: Arc::new(Mutex::new(HashMap::new())),
            chunk_tx,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a stream
    ///
    /// Returns once the source is open; the primary channel is established
    /// in the background.
    pub async fn start(
        &self,
        camera_id: &str,
        settings: &MediaSettings,
    ) -> CameraResult<StreamStarted> {
        let camera = self
            .registry
            .camera(camera_id)
            .cloned()
            .ok_or_else(|| CameraError::SourceUnavailable {
                camera_id: camera_id.to_string(),
                reason: SourceUnavailableReason::Absent,
            })?;

        let mut source_config = SourceConfig::for_camera(&camera);
        if let Some(resolution) = settings.resolution.as_deref().and_then(Resolution::parse) {
            source_config.width = resolution.width;
            source_config.height = resolution.height;
        }
        let source = self.provider.open(&source_config).await?;

        let record = match self.registry.create(SessionKind::Streaming, camera_id, None) {
            Ok(record) => record,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let target = stream_url(&self.config.public_base_url, &record.id);
        let selector = Arc::new(TransportSelector::new(&record.id, Arc::clone(&self.registry)));
        let boxes = Arc::new(RwLock::new(Vec::new()));
        let channel = ChannelSlot::default();
        let handle = Arc::new(StreamHandle {
            source: Arc::clone(&source),
            boxes: Arc::clone(&boxes),
            selector: Arc::clone(&selector),
            channel: Arc::clone(&channel),
            cancel: CancellationToken::new(),
            relay: Mutex::new(None),
        });
        self.streams.lock().insert(record.id.clone(), Arc::clone(&handle));

        let relay = Relay {
            stream_id: record.id.clone(),
            source,
            push: Arc::clone(&self.push),
            fallback: Arc::clone(&self.fallback),
            push_target: target.clone(),
            fallback_endpoint: self.config.http_endpoint.clone(),
            boxes,
            channel,
            selector,
            config: self.config.clone(),
        };
        *handle.relay.lock() = Some(tokio::spawn(relay.run(handle.cancel.clone())));

        tracing::info!("Stream {} started for camera {}", record.id, camera_id);

        Ok(StreamStarted {
            stream_id: record.id,
            stream_url: target,
            http_endpoint: self.config.http_endpoint.clone(),
            start_time: record.start_time,
            settings: self.defaults.resolve(settings),
        })
    }

    /// Stop a stream
    ///
    /// Idempotent: concurrent and repeated calls all return the duration
    /// computed by the first one.
    pub async fn stop(&self, stream_id: &str) -> CameraResult<DurationInfo> {
        match self.registry.claim_stop(stream_id, SessionKind::Streaming)? {
            StopClaim::Won(_) => {
                // Finished on its own task so the stream completes even when
                // the caller stops waiting
                let finishing = tokio::spawn(finish(
                    Arc::clone(&self.registry),
                    Arc::clone(&self.streams),
                    stream_id.to_string(),
                    self.config.grace_period(),
                ));
                finishing.await.map_err(|e| {
                    CameraError::TransportFailed(format!("Stopping {} failed: {}", stream_id, e))
                })?
            }
            StopClaim::Pending(completion) => {
                self.registry.wait_completed(stream_id, completion).await
            }
            StopClaim::Done(duration) => Ok(duration),
        }
    }

    /// Accept a chunk uploaded over the fallback path
    ///
    /// Accepted for as long as the stream is registered, grace period
    /// included. Status is left untouched.
    pub fn accept_chunk(
        &self,
        stream_id: &str,
        bytes: Bytes,
        timestamp: i64,
    ) -> CameraResult<StreamChunkReceipt> {
        self.registry.require(stream_id, SessionKind::Streaming)?;

        tracing::debug!(
            "Stream {} chunk at {} ({} bytes)",
            stream_id,
            timestamp,
            bytes.len()
        );
        let _ = self.chunk_tx.send(StreamChunk {
            stream_id: stream_id.to_string(),
            timestamp,
            bytes,
        });

        Ok(StreamChunkReceipt {
            stream_id: stream_id.to_string(),
            timestamp,
            processed: true,
        })
    }

    /// Receive chunks accepted by [`Self::accept_chunk`]
    pub fn subscribe_chunks(&self) -> broadcast::Receiver<StreamChunk> {
        self.chunk_tx.subscribe()
    }

    /// Replace the overlay drawn on the frames of an active stream
    pub fn update_detection_boxes(
        &self,
        stream_id: &str,
        boxes: Vec<DetectionBox>,
    ) -> CameraResult<()> {
        self.registry.require_active(stream_id, SessionKind::Streaming)?;
        let handle = self
            .streams
            .lock()
            .get(stream_id)
            .cloned()
            .ok_or_else(|| CameraError::SessionNotFound(stream_id.to_string()))?;

        tracing::debug!("Stream {} now draws {} boxes", stream_id, boxes.len());
        *handle.boxes.write() = boxes;
        Ok(())
    }

    /// Current transport of a registered stream
    pub fn transport_state(&self, stream_id: &str) -> Option<TransportState> {
        self.streams
            .lock()
            .get(stream_id)
            .map(|handle| handle.selector.state())
    }
}

/// Release a claimed stream, complete it and schedule its purge
async fn finish(
    registry: Arc<SessionRegistry>,
    streams: StreamMap,
    stream_id: String,
    grace: Duration,
) -> CameraResult<DurationInfo> {
    let handle = streams.lock().get(&stream_id).cloned();
    if let Some(handle) = handle {
        release(&stream_id, &handle).await;
    }
    let duration = registry.complete(&stream_id)?;

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        registry.purge(&stream_id);
        streams.lock().remove(&stream_id);
    });
    Ok(duration)
}

/// Cancel the relay and wait for it, then close the channel and the source
///
/// The channel is closed here when the relay failed before closing it.
async fn release(stream_id: &str, handle: &StreamHandle) {
    handle.cancel.cancel();
    let relay = handle.relay.lock().take();
    if let Some(relay) = relay {
        if let Err(e) = relay.await {
            tracing::error!("Relay for stream {} failed: {}", stream_id, e);
        }
    }
    if close_slot(&handle.channel).await {
        tracing::warn!("Closed the channel abandoned by the relay of {}", stream_id);
    }
    handle.selector.closed();
    handle.source.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::{CameraInfo, CameraState};
    use crate::capture::TestPatternProvider;
    use crate::streaming::local::LocalPushTransport;
    use crate::streaming::transport::{FallbackChannel, PushChannel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct RefusingPush;

    #[async_trait]
    impl PushTransport for RefusingPush {
        async fn open(&self, _stream_id: &str, target: &str) -> CameraResult<Arc<dyn PushChannel>> {
            Err(CameraError::TransportFailed(format!("refused {}", target)))
        }
    }

    /// Channel that closes itself after a number of frames
    struct ShortLivedChannel {
        remaining: AtomicUsize,
        open: AtomicBool,
    }

    #[async_trait]
    impl PushChannel for ShortLivedChannel {
        async fn send(&self, _frame: Bytes) -> CameraResult<()> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) <= 1 {
                self.open.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct ShortLivedPush(usize);

    #[async_trait]
    impl PushTransport for ShortLivedPush {
        async fn open(
            &self,
            _stream_id: &str,
            _target: &str,
        ) -> CameraResult<Arc<dyn PushChannel>> {
            Ok(Arc::new(ShortLivedChannel {
                remaining: AtomicUsize::new(self.0),
                open: AtomicBool::new(true),
            }))
        }
    }

    #[derive(Clone, Copy)]
    enum SendBehavior {
        Accept,
        Hang,
        Panic,
    }

    /// Push transport whose channels report when they get closed
    struct ScriptedPush {
        behavior: SendBehavior,
        close_delay: Duration,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedPush {
        fn new(behavior: SendBehavior) -> Self {
            Self {
                behavior,
                close_delay: Duration::ZERO,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    struct ScriptedChannel {
        behavior: SendBehavior,
        close_delay: Duration,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PushChannel for ScriptedChannel {
        async fn send(&self, _frame: Bytes) -> CameraResult<()> {
            match self.behavior {
                SendBehavior::Accept => Ok(()),
                SendBehavior::Hang => std::future::pending().await,
                SendBehavior::Panic => panic!("push channel failed mid-send"),
            }
        }

        async fn close(&self) {
            tokio::time::sleep(self.close_delay).await;
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedPush {
        async fn open(
            &self,
            _stream_id: &str,
            _target: &str,
        ) -> CameraResult<Arc<dyn PushChannel>> {
            Ok(Arc::new(ScriptedChannel {
                behavior: self.behavior,
                close_delay: self.close_delay,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[derive(Default)]
    struct CollectingFallback {
        opens: AtomicUsize,
        segments: Arc<Mutex<Vec<(Bytes, i64)>>>,
        refuse: bool,
    }

    struct CollectingChannel(Arc<Mutex<Vec<(Bytes, i64)>>>);

    #[async_trait]
    impl FallbackChannel for CollectingChannel {
        async fn send(&self, segment: Bytes, timestamp: i64) -> CameraResult<()> {
            self.0.lock().push((segment, timestamp));
            Ok(())
        }

        async fn close(&self) {}
    }

    #[async_trait]
    impl FallbackTransport for CollectingFallback {
        async fn open(
            &self,
            _stream_id: &str,
            endpoint: &str,
        ) -> CameraResult<Arc<dyn FallbackChannel>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(CameraError::TransportFailed(format!("refused {}", endpoint)));
            }
            Ok(Arc::new(CollectingChannel(Arc::clone(&self.segments))))
        }
    }

    fn test_config() -> CamstudioConfig {
        let mut config = CamstudioConfig::default();
        config.cameras = vec![
            CameraInfo {
                id: "camera1".to_string(),
                name: "Camera 1".to_string(),
                status: CameraState::Active,
                resolution: "32x24".to_string(),
                device: None,
            },
            CameraInfo {
                id: "camera2".to_string(),
                name: "Camera 2".to_string(),
                status: CameraState::Active,
                resolution: "32x24".to_string(),
                device: None,
            },
        ];
        config.streaming.grace_period_ms = 50;
        config.streaming.fallback_interval_ms = 10;
        config
    }

    fn manager(
        provider: Arc<TestPatternProvider>,
        push: Arc<dyn PushTransport>,
        fallback: Arc<dyn FallbackTransport>,
    ) -> StreamingManager {
        let config = test_config();
        let registry = SessionRegistry::new_shared(config.cameras.clone());
        StreamingManager::new(registry, provider, push, fallback, &config)
    }

    async fn wait_for_state(manager: &StreamingManager, id: &str, state: TransportState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.transport_state(id) != Some(state) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_frames_reach_primary_viewer() {
        let provider = Arc::new(TestPatternProvider::new());
        let push = Arc::new(LocalPushTransport::new());
        let fallback = Arc::new(CollectingFallback::default());
        let manager = manager(provider.clone(), push.clone(), fallback);

        let started = manager.start("camera1", &MediaSettings::default()).await.unwrap();
        assert!(started.stream_url.ends_with(&started.stream_id));
        assert_eq!(started.http_endpoint, "/api/camera/stream-chunk");
        wait_for_state(&manager, &started.stream_id, TransportState::Primary).await;

        let mut viewer = push.subscribe(&started.stream_id).unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(5), viewer.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);

        manager.stop(&started.stream_id).await.unwrap();
        assert_eq!(manager.transport_state(&started.stream_id), Some(TransportState::Closed));
        assert!(provider.opened()[0].is_closed());
        assert!(push.subscribe(&started.stream_id).is_none());
    }

    #[tokio::test]
    async fn test_refused_primary_falls_back() {
        let fallback = Arc::new(CollectingFallback::default());
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            Arc::new(RefusingPush),
            fallback.clone(),
        );

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Fallback).await;

        let status = manager.registry().status();
        assert_eq!(status.streaming_count, 1);
        assert_eq!(status.streaming_ids, vec![id.clone()]);

        let receipt = manager.accept_chunk(&id, Bytes::from_static(b"segment"), 42).unwrap();
        assert!(receipt.processed);

        tokio::time::timeout(Duration::from_secs(5), async {
            while fallback.segments.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        manager.stop(&id).await.unwrap();
        assert_eq!(fallback.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_primary_falls_back() {
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            Arc::new(ShortLivedPush(2)),
            Arc::new(CollectingFallback::default()),
        );

        let id = manager.start("camera2", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Fallback).await;
        assert!(manager.registry().get(&id).unwrap().is_active());
        manager.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_fallback_keeps_session_active() {
        let fallback = Arc::new(CollectingFallback {
            refuse: true,
            ..CollectingFallback::default()
        });
        let provider = Arc::new(TestPatternProvider::new());
        let manager = manager(provider, Arc::new(RefusingPush), fallback.clone());

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Exhausted).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fallback.opens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registry().status().streaming_count, 1);

        let duration = manager.stop(&id).await.unwrap();
        assert_eq!(duration.session_id, id);
    }

    #[tokio::test]
    async fn test_concurrent_stops_share_end_time() {
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            Arc::new(LocalPushTransport::new()),
            Arc::new(CollectingFallback::default()),
        );
        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;

        let mut events = manager.registry().subscribe();
        let (a, b) = tokio::join!(manager.stop(&id), manager.stop(&id));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.end_time, b.end_time);
        assert_eq!(a.duration_seconds, b.duration_seconds);

        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, crate::session::SessionEvent::Completed { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_start() {
        let provider = Arc::new(TestPatternProvider::new());
        provider.mark_unavailable("camera1", SourceUnavailableReason::Busy);
        let manager = manager(
            provider,
            Arc::new(LocalPushTransport::new()),
            Arc::new(CollectingFallback::default()),
        );

        let result = manager.start("camera1", &MediaSettings::default()).await;
        assert!(matches!(
            result,
            Err(CameraError::SourceUnavailable { reason: SourceUnavailableReason::Busy, .. })
        ));
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_accepted_until_purge() {
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            Arc::new(LocalPushTransport::new()),
            Arc::new(CollectingFallback::default()),
        );
        assert!(matches!(
            manager.accept_chunk("stream_999_x", Bytes::new(), 0),
            Err(CameraError::SessionNotFound(_))
        ));

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        let mut chunks = manager.subscribe_chunks();
        manager.stop(&id).await.unwrap();

        manager.accept_chunk(&id, Bytes::from_static(b"tail"), 7).unwrap();
        let chunk = chunks.recv().await.unwrap();
        assert_eq!(chunk.stream_id, id);
        assert_eq!(chunk.timestamp, 7);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.registry().get(&id).is_none());
        assert!(manager.transport_state(&id).is_none());
        assert!(manager.accept_chunk(&id, Bytes::new(), 8).is_err());
    }

    #[tokio::test]
    async fn test_detection_boxes_only_for_active_streams() {
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            Arc::new(LocalPushTransport::new()),
            Arc::new(CollectingFallback::default()),
        );
        let boxes = vec![DetectionBox {
            id: None,
            x: 0.1,
            y: 0.1,
            width: 0.5,
            height: 0.5,
            confidence: 0.9,
            label: "person".to_string(),
            color: "#FF0000".to_string(),
        }];

        assert!(manager.update_detection_boxes("stream_1_x", boxes.clone()).is_err());

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        manager.update_detection_boxes(&id, boxes.clone()).unwrap();
        manager.stop(&id).await.unwrap();
        assert!(manager.update_detection_boxes(&id, boxes).is_err());
    }

    #[tokio::test]
    async fn test_panicking_relay_channel_closed_on_stop() {
        let push = Arc::new(ScriptedPush::new(SendBehavior::Panic));
        let closed = Arc::clone(&push.closed);
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            push,
            Arc::new(CollectingFallback::default()),
        );

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Primary).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!closed.load(Ordering::SeqCst));

        manager.stop(&id).await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(manager.transport_state(&id), Some(TransportState::Closed));
    }

    #[tokio::test]
    async fn test_stop_returns_while_push_hangs() {
        let push = Arc::new(ScriptedPush::new(SendBehavior::Hang));
        let closed = Arc::clone(&push.closed);
        let provider = Arc::new(TestPatternProvider::new());
        let manager = manager(provider.clone(), push, Arc::new(CollectingFallback::default()));

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Primary).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), manager.stop(&id))
            .await
            .unwrap()
            .unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(provider.opened()[0].is_closed());
    }

    #[tokio::test]
    async fn test_abandoned_stop_still_completes() {
        let push = Arc::new(ScriptedPush {
            close_delay: Duration::from_millis(300),
            ..ScriptedPush::new(SendBehavior::Accept)
        });
        let closed = Arc::clone(&push.closed);
        let provider = Arc::new(TestPatternProvider::new());
        let manager = manager(provider.clone(), push, Arc::new(CollectingFallback::default()));

        let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
        wait_for_state(&manager, &id, TransportState::Primary).await;

        let abandoned = tokio::time::timeout(Duration::from_millis(50), manager.stop(&id)).await;
        assert!(abandoned.is_err());

        let duration = tokio::time::timeout(Duration::from_secs(3), manager.stop(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(duration.session_id, id);
        assert!(closed.load(Ordering::SeqCst));
        assert!(provider.opened()[0].is_closed());
        assert_eq!(
            manager.registry().get(&id).map(|record| record.status),
            Some(crate::session::SessionStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_stopped_streams_release_local_channels() {
        let push = Arc::new(LocalPushTransport::new());
        let manager = manager(
            Arc::new(TestPatternProvider::new()),
            push.clone(),
            Arc::new(CollectingFallback::default()),
        );

        for _ in 0..5 {
            let id = manager.start("camera1", &MediaSettings::default()).await.unwrap().stream_id;
            wait_for_state(&manager, &id, TransportState::Primary).await;
            assert_eq!(push.channel_count(), 1);
            manager.stop(&id).await.unwrap();
        }
        assert_eq!(push.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_resolution_uses_camera_default() {
        let provider = Arc::new(TestPatternProvider::new());
        let manager = manager(
            provider.clone(),
            Arc::new(LocalPushTransport::new()),
            Arc::new(CollectingFallback::default()),
        );
        let settings = MediaSettings {
            resolution: Some("100000x100000".to_string()),
            ..MediaSettings::default()
        };

        let id = manager.start("camera1", &settings).await.unwrap().stream_id;
        assert_eq!(provider.opened()[0].size(), (32, 24));
        manager.stop(&id).await.unwrap();
    }
}
