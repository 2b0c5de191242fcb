//! Session registry
//!
//! Process-wide map from session id to session record, shared by the
//! recording and streaming managers.
//!
//! The lock only ever guards in-memory mutation; no I/O happens while it is
//! held. Status changes go through compare-and-set style checks so that
//! exactly one caller moves a session from Active to Stopping.

use super::state::{DurationInfo, SessionEvent, SessionKind, SessionRecord, SessionStatus};
use crate::capture::traits::CameraInfo;
use crate::utils::error::{CameraError, CameraResult, SourceUnavailableReason};
use crate::utils::time::{round_seconds, MonotonicMillis};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Entry {
    record: SessionRecord,
    /// Holds the duration once the session has completed
    completion: watch::Sender<Option<DurationInfo>>,
}

/// Outcome of claiming a stop
pub enum StopClaim {
    /// This caller moved the session to Stopping and must finish it
    Won(SessionRecord),
    /// Another caller is finishing the session
    Pending(watch::Receiver<Option<DurationInfo>>),
    /// The session already completed
    Done(DurationInfo),
}

/// Aggregated view over active sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub cameras: Vec<CameraInfo>,
    pub is_recording: bool,
    pub is_streaming: bool,
    pub recording_count: usize,
    pub streaming_count: usize,
    pub recording_ids: Vec<String>,
    pub streaming_ids: Vec<String>,
}

/// Guarded mapping of all live sessions
pub struct SessionRegistry {
    cameras: Vec<CameraInfo>,
    sessions: RwLock<HashMap<String, Entry>>,
    clock: MonotonicMillis,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    /// Create a registry for the given cameras
    pub fn new(cameras: Vec<CameraInfo>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            cameras,
            sessions: RwLock::new(HashMap::new()),
            clock: MonotonicMillis::new(),
            event_tx,
        }
    }

    /// Create a registry wrapped in Arc for sharing
    pub fn new_shared(cameras: Vec<CameraInfo>) -> Arc<Self> {
        Arc::new(Self::new(cameras))
    }

    pub fn cameras(&self) -> &[CameraInfo] {
        &self.cameras
    }

    pub fn camera(&self, id: &str) -> Option<&CameraInfo> {
        self.cameras.iter().find(|camera| camera.id == id)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event; no subscribers is fine
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Generate a fresh id such as `rec_1718000000000_camera1`
    pub fn generate_id(&self, kind: SessionKind, camera_id: &str) -> String {
        format!("{}_{}_{}", kind.id_prefix(), self.clock.next(), camera_id)
    }

    /// Create a new Active session with a freshly generated id
    pub fn create(
        &self,
        kind: SessionKind,
        camera_id: &str,
        storage_path: Option<PathBuf>,
    ) -> CameraResult<SessionRecord> {
        if self.camera(camera_id).is_none() {
            return Err(CameraError::SourceUnavailable {
                camera_id: camera_id.to_string(),
                reason: SourceUnavailableReason::Absent,
            });
        }
        let id = self.generate_id(kind, camera_id);
        self.insert(SessionRecord::new(id, kind, camera_id.to_string(), storage_path))
    }

    /// Insert a fully built record, rejecting id collisions
    pub(crate) fn insert(&self, record: SessionRecord) -> CameraResult<SessionRecord> {
        let (completion, _) = watch::channel(None);
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&record.id) {
                return Err(CameraError::DuplicateSession(record.id));
            }
            sessions.insert(
                record.id.clone(),
                Entry {
                    record: record.clone(),
                    completion,
                },
            );
        }

        tracing::info!(
            "Created {:?} session {} for camera {}",
            record.kind,
            record.id,
            record.camera_id
        );
        self.emit(SessionEvent::Started {
            id: record.id.clone(),
            kind: record.kind,
            camera_id: record.camera_id.clone(),
        });
        Ok(record)
    }

    /// Snapshot of a session, whatever its status
    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(id).map(|entry| entry.record.clone())
    }

    /// Snapshot of a session of `kind` that is still Active
    pub fn require_active(&self, id: &str, kind: SessionKind) -> CameraResult<SessionRecord> {
        match self.sessions.read().get(id) {
            Some(entry) if entry.record.kind == kind && entry.record.is_active() => {
                Ok(entry.record.clone())
            }
            _ => Err(CameraError::SessionNotFound(id.to_string())),
        }
    }

    /// Snapshot of a session of `kind`, whatever its status
    pub fn require(&self, id: &str, kind: SessionKind) -> CameraResult<SessionRecord> {
        match self.sessions.read().get(id) {
            Some(entry) if entry.record.kind == kind => Ok(entry.record.clone()),
            _ => Err(CameraError::SessionNotFound(id.to_string())),
        }
    }

    /// Mutate an Active session of `kind` under the lock
    pub fn with_active<R>(
        &self,
        id: &str,
        kind: SessionKind,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> CameraResult<R> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(id) {
            Some(entry) if entry.record.kind == kind && entry.record.is_active() => {
                Ok(f(&mut entry.record))
            }
            _ => Err(CameraError::SessionNotFound(id.to_string())),
        }
    }

    /// Mutate a session of `kind` under the lock, whatever its status
    pub fn with_record<R>(
        &self,
        id: &str,
        kind: SessionKind,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> CameraResult<R> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(id) {
            Some(entry) if entry.record.kind == kind => Ok(f(&mut entry.record)),
            _ => Err(CameraError::SessionNotFound(id.to_string())),
        }
    }

    /// Claim the Active to Stopping transition
    ///
    /// Only the caller that observes Active gets `StopClaim::Won`. The
    /// session's end time is taken here, not when it completes.
    pub fn claim_stop(&self, id: &str, kind: SessionKind) -> CameraResult<StopClaim> {
        let mut sessions = self.sessions.write();
        let entry = match sessions.get_mut(id) {
            Some(entry) if entry.record.kind == kind => entry,
            _ => return Err(CameraError::SessionNotFound(id.to_string())),
        };

        let claim = match entry.record.status {
            SessionStatus::Active => {
                entry.record.status = SessionStatus::Stopping;
                entry.record.stop_requested_at = Some(Instant::now());
                StopClaim::Won(entry.record.clone())
            }
            SessionStatus::Stopping => StopClaim::Pending(entry.completion.subscribe()),
            SessionStatus::Completed | SessionStatus::Expired => {
                match entry.record.duration.clone() {
                    Some(duration) => StopClaim::Done(duration),
                    None => StopClaim::Pending(entry.completion.subscribe()),
                }
            }
        };
        drop(sessions);

        if matches!(claim, StopClaim::Won(_)) {
            tracing::info!("Stopping session {}", id);
        }
        Ok(claim)
    }

    /// Finish a session that was claimed with `claim_stop`
    ///
    /// Stamps `end_time` from the claimed stop and computes the duration.
    /// Calling it on an already
    /// completed session returns the stored duration unchanged.
    pub fn complete(&self, id: &str) -> CameraResult<DurationInfo> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| CameraError::SessionNotFound(id.to_string()))?;

        if let Some(duration) = entry.record.duration.clone() {
            return Ok(duration);
        }
        if !entry.record.status.can_transition_to(SessionStatus::Completed) {
            return Err(CameraError::SessionNotFound(id.to_string()));
        }

        let stopped_at = entry.record.stop_requested_at.unwrap_or_else(Instant::now);
        let elapsed = stopped_at.saturating_duration_since(entry.record.started_at);
        let end_time = entry.record.start_time
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        let duration =
            DurationInfo::new(id, entry.record.start_time, end_time, round_seconds(elapsed));

        entry.record.status = SessionStatus::Completed;
        entry.record.end_time = Some(end_time);
        entry.record.duration = Some(duration.clone());
        entry.completion.send_replace(Some(duration.clone()));
        let kind = entry.record.kind;
        drop(sessions);

        tracing::info!("Session {} completed, duration: {}", id, duration.duration);
        self.emit(SessionEvent::Completed {
            id: id.to_string(),
            kind,
            duration_seconds: duration.duration_seconds,
        });
        Ok(duration)
    }

    /// Wait for another caller to finish the session
    pub async fn wait_completed(
        &self,
        id: &str,
        mut completion: watch::Receiver<Option<DurationInfo>>,
    ) -> CameraResult<DurationInfo> {
        let duration = completion
            .wait_for(|duration| duration.is_some())
            .await
            .map_err(|_| CameraError::SessionNotFound(id.to_string()))?
            .clone();
        duration.ok_or_else(|| CameraError::SessionNotFound(id.to_string()))
    }

    /// Remove a completed session
    ///
    /// Returns whether a record was removed. Missing or still-running
    /// sessions are left alone.
    pub fn purge(&self, id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(id).map(|entry| entry.record.status) {
                Some(status) if status.can_transition_to(SessionStatus::Expired) => {
                    sessions.remove(id).map(|mut entry| {
                        entry.record.status = SessionStatus::Expired;
                        entry.record.kind
                    })
                }
                Some(status) => {
                    tracing::debug!("Not purging session {} in status {:?}", id, status);
                    None
                }
                None => None,
            }
        };

        match removed {
            Some(kind) => {
                tracing::info!("Session {} expired", id);
                self.emit(SessionEvent::Expired {
                    id: id.to_string(),
                    kind,
                });
                true
            }
            None => false,
        }
    }

    /// Purge `id` after `grace`, in the background
    pub fn schedule_purge(self: &Arc<Self>, id: &str, grace: Duration) -> JoinHandle<bool> {
        let registry = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.purge(&id)
        })
    }

    /// Aggregate counts and ids of Active sessions
    pub fn status(&self) -> CameraStatus {
        let (mut recording_ids, mut streaming_ids) = (Vec::new(), Vec::new());
        {
            let sessions = self.sessions.read();
            for entry in sessions.values().filter(|entry| entry.record.is_active()) {
                match entry.record.kind {
                    SessionKind::Recording => recording_ids.push(entry.record.id.clone()),
                    SessionKind::Streaming => streaming_ids.push(entry.record.id.clone()),
                }
            }
        }
        recording_ids.sort();
        streaming_ids.sort();

        CameraStatus {
            cameras: self.cameras.clone(),
            is_recording: !recording_ids.is_empty(),
            is_streaming: !streaming_ids.is_empty(),
            recording_count: recording_ids.len(),
            streaming_count: streaming_ids.len(),
            recording_ids,
            streaming_ids,
        }
    }

    /// Number of records, whatever their status
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CamstudioConfig;
    use std::collections::HashSet;

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new_shared(CamstudioConfig::default().cameras)
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry = registry();
        let ids: HashSet<String> = (0..500)
            .map(|_| {
                registry
                    .create(SessionKind::Recording, "camera1", None)
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with("rec_") && id.ends_with("_camera1")));
    }

    #[test]
    fn test_unknown_camera_rejected() {
        let result = registry().create(SessionKind::Streaming, "camera9", None);
        assert!(matches!(
            result,
            Err(CameraError::SourceUnavailable { reason: SourceUnavailableReason::Absent, .. })
        ));
    }

    #[test]
    fn test_collision_rejected() {
        let registry = registry();
        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        let duplicate = SessionRecord::new(
            record.id.clone(),
            SessionKind::Recording,
            "camera1".to_string(),
            None,
        );
        assert!(matches!(registry.insert(duplicate), Err(CameraError::DuplicateSession(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_only_one_stop_claim_wins() {
        let registry = registry();
        let record = registry.create(SessionKind::Streaming, "camera1", None).unwrap();

        assert!(matches!(
            registry.claim_stop(&record.id, SessionKind::Streaming).unwrap(),
            StopClaim::Won(_)
        ));
        assert!(matches!(
            registry.claim_stop(&record.id, SessionKind::Streaming).unwrap(),
            StopClaim::Pending(_)
        ));

        let duration = registry.complete(&record.id).unwrap();
        match registry.claim_stop(&record.id, SessionKind::Streaming).unwrap() {
            StopClaim::Done(again) => assert_eq!(again, duration),
            _ => panic!("expected completed claim"),
        }
        assert_eq!(registry.get(&record.id).unwrap().end_time, Some(duration.end_time));
    }

    #[test]
    fn test_kind_mismatch_is_not_found() {
        let registry = registry();
        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        assert!(matches!(
            registry.claim_stop(&record.id, SessionKind::Streaming),
            Err(CameraError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_complete_requires_claim() {
        let registry = registry();
        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        assert!(registry.complete(&record.id).is_err());
        assert!(registry.get(&record.id).unwrap().is_active());
    }

    #[test]
    fn test_status_counts_only_active() {
        let registry = registry();
        let rec = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        let stream = registry.create(SessionKind::Streaming, "camera2", None).unwrap();
        let stopped = registry.create(SessionKind::Streaming, "camera1", None).unwrap();
        registry.claim_stop(&stopped.id, SessionKind::Streaming).unwrap();

        let status = registry.status();
        assert_eq!(status.recording_count, 1);
        assert_eq!(status.streaming_count, 1);
        assert_eq!(status.recording_ids, vec![rec.id]);
        assert_eq!(status.streaming_ids, vec![stream.id]);
        assert!(status.is_recording && status.is_streaming);
        assert_eq!(status.cameras.len(), 3);
    }

    #[test]
    fn test_purge_tolerates_missing_and_active() {
        let registry = registry();
        assert!(!registry.purge("rec_1_camera1"));

        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        assert!(!registry.purge(&record.id));

        registry.claim_stop(&record.id, SessionKind::Recording).unwrap();
        registry.complete(&record.id).unwrap();
        assert!(registry.purge(&record.id));
        assert!(!registry.purge(&record.id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_sees_winner_duration() {
        let registry = registry();
        let record = registry.create(SessionKind::Streaming, "camera1", None).unwrap();
        let first = registry.claim_stop(&record.id, SessionKind::Streaming);
        let Ok(StopClaim::Won(_)) = first else {
            panic!("first claim must win");
        };
        let second = registry.claim_stop(&record.id, SessionKind::Streaming);
        let Ok(StopClaim::Pending(rx)) = second else {
            panic!("second claim must wait");
        };

        let waiter = {
            let registry = registry.clone();
            let id = record.id.clone();
            tokio::spawn(async move { registry.wait_completed(&id, rx).await })
        };
        let duration = registry.complete(&record.id).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), duration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_time_taken_at_stop_claim() {
        let registry = registry();
        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        registry.claim_stop(&record.id, SessionKind::Recording).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let duration = registry.complete(&record.id).unwrap();
        assert_eq!(duration.duration_seconds, 2);
        assert_eq!(duration.duration, "00:00:02");
        assert_eq!(duration.end_time, record.start_time + chrono::Duration::seconds(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_purge_after_grace() {
        let registry = registry();
        let mut events = registry.subscribe();
        let record = registry.create(SessionKind::Recording, "camera1", None).unwrap();
        registry.claim_stop(&record.id, SessionKind::Recording).unwrap();
        registry.complete(&record.id).unwrap();

        let handle = registry.schedule_purge(&record.id, Duration::from_secs(5));
        tokio::time::advance(Duration::from_millis(4900)).await;
        assert!(registry.get(&record.id).is_some());

        assert!(handle.await.unwrap());
        assert!(registry.get(&record.id).is_none());

        let mut saw_expired = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Expired { id, .. } = event {
                assert_eq!(id, record.id);
                saw_expired = true;
            }
        }
        assert!(saw_expired);
    }
}
