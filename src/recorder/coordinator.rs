//! Recording session manager
//!
//! Owns the lifecycle of recordings: start, ordered chunk intake, stop and
//! assembly of the chunks into one artifact.
//!
//! Chunk writes for a session are serialised through a per-session gate.
//! The registry lock is never held across storage I/O.

use super::state::{
    artifact_filename, chunk_path, ChunkReceipt, RecordingStarted, RecordingSummary,
};
use super::storage::MediaStorage;
use crate::config::{CamstudioConfig, MediaDefaults, MediaSettings, RecordingConfig};
use crate::session::{DurationInfo, SessionKind, SessionRegistry, StopClaim};
use crate::utils::error::{CameraError, CameraResult, SourceUnavailableReason};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Chunks persisted so far for one recording
#[derive(Debug, Default)]
struct ChunkLog {
    chunks: Vec<PathBuf>,
    artifact: Option<PathBuf>,
}

type WriteGate = Arc<Mutex<ChunkLog>>;

/// Manages recording sessions
#[derive(Clone)]
pub struct RecordingManager {
    registry: Arc<SessionRegistry>,
    storage: Arc<dyn MediaStorage>,
    config: RecordingConfig,
    defaults: MediaDefaults,
    gates: Arc<parking_lot::Mutex<HashMap<String, WriteGate>>>,
}

impl RecordingManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        storage: Arc<dyn MediaStorage>,
        config: &CamstudioConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            config: config.recording.clone(),
            defaults: config.defaults.clone(),
            gates: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn gate(&self, id: &str) -> CameraResult<WriteGate> {
        self.gates
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CameraError::SessionNotFound(id.to_string()))
    }

    /// Start a new recording
    ///
    /// Every call yields a distinct session, even for a camera that is
    /// already recording. The storage directory is prepared before the
    /// session is registered.
    pub async fn start(
        &self,
        camera_id: &str,
        storage_path: Option<PathBuf>,
        settings: &MediaSettings,
    ) -> CameraResult<RecordingStarted> {
        if self.registry.camera(camera_id).is_none() {
            return Err(CameraError::SourceUnavailable {
                camera_id: camera_id.to_string(),
                reason: SourceUnavailableReason::Absent,
            });
        }

        let path = storage_path.unwrap_or_else(|| self.config.default_path.clone());
        self.storage
            .ensure_directory(&path)
            .await
            .map_err(|e| CameraError::StorageUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let record = self
            .registry
            .create(SessionKind::Recording, camera_id, Some(path.clone()))?;
        self.gates
            .lock()
            .insert(record.id.clone(), Arc::new(Mutex::new(ChunkLog::default())));

        tracing::info!("Recording {} started, writing to {}", record.id, path.display());

        Ok(RecordingStarted {
            filename: artifact_filename(&record.id, &self.config.chunk_extension),
            session_id: record.id,
            path,
            start_time: record.start_time,
            settings: self.defaults.resolve(settings),
        })
    }

    /// Persist the next chunk of a recording
    ///
    /// Fails with `SessionNotFound` once the session has left Active. A
    /// failed write leaves the session Active and does not consume a
    /// sequence number, so the same chunk can be retried.
    pub async fn accept_chunk(
        &self,
        session_id: &str,
        payload: &[u8],
        is_final: bool,
    ) -> CameraResult<ChunkReceipt> {
        let record = self.registry.require_active(session_id, SessionKind::Recording)?;
        let dir = record
            .storage_path
            .clone()
            .unwrap_or_else(|| self.config.default_path.clone());
        let gate = self.gate(session_id)?;

        let (sequence, claim) = {
            let mut log = gate.lock().await;

            // A stop may have won while this call waited on the gate
            let sequence = self
                .registry
                .with_active(session_id, SessionKind::Recording, |record| {
                    record.sequence_counter
                })?;

            let path = chunk_path(&dir, session_id, sequence, &self.config.chunk_extension);
            self.storage
                .write_file(&path, payload)
                .await
                .map_err(|e| write_failed(&path, e))?;

            self.registry.with_record(session_id, SessionKind::Recording, |record| {
                record.sequence_counter = sequence + 1;
            })?;
            log.chunks.push(path);

            // Claimed under the gate so nothing lands after the final chunk
            let claim = if is_final {
                Some(self.registry.claim_stop(session_id, SessionKind::Recording)?)
            } else {
                None
            };
            (sequence, claim)
        };

        tracing::debug!(
            "Recording {} chunk {} ({} bytes, final: {})",
            session_id,
            sequence,
            payload.len(),
            is_final
        );

        match claim {
            Some(StopClaim::Won(record)) => {
                let dir = record.storage_path.unwrap_or_else(|| dir.clone());
                self.spawn_finish(session_id, dir).await?;
            }
            Some(StopClaim::Pending(completion)) => {
                self.registry.wait_completed(session_id, completion).await?;
            }
            Some(StopClaim::Done(_)) | None => {}
        }

        Ok(ChunkReceipt {
            session_id: session_id.to_string(),
            sequence,
            chunk_path: chunk_path(&dir, session_id, sequence, &self.config.chunk_extension),
            is_completed: is_final,
        })
    }

    /// Stop a recording and assemble its artifact
    ///
    /// Idempotent: later calls return the summary of the first one.
    pub async fn stop(&self, session_id: &str) -> CameraResult<RecordingSummary> {
        let duration = match self.registry.claim_stop(session_id, SessionKind::Recording)? {
            StopClaim::Won(record) => {
                let dir = record
                    .storage_path
                    .unwrap_or_else(|| self.config.default_path.clone());
                return self.spawn_finish(session_id, dir).await;
            }
            StopClaim::Pending(completion) => {
                self.registry.wait_completed(session_id, completion).await?
            }
            StopClaim::Done(duration) => duration,
        };
        self.summary(session_id, duration).await
    }

    /// Finalize a claimed recording on its own task
    ///
    /// The session completes even when the caller stops waiting.
    async fn spawn_finish(&self, session_id: &str, dir: PathBuf) -> CameraResult<RecordingSummary> {
        let manager = self.clone();
        let id = session_id.to_string();
        let path = dir.display().to_string();
        tokio::spawn(async move { manager.finish(&id, dir).await })
            .await
            .map_err(|e| CameraError::StorageWriteFailed {
                path,
                reason: e.to_string(),
            })?
    }

    async fn finish(&self, session_id: &str, dir: PathBuf) -> CameraResult<RecordingSummary> {
        let (artifact, chunk_count) = match self.gate(session_id) {
            Ok(gate) => {
                let mut log = gate.lock().await;
                let target = dir.join(artifact_filename(session_id, &self.config.chunk_extension));
                log.artifact = match self.assemble(&log.chunks, &target).await {
                    Ok(()) => Some(target),
                    Err(e) => {
                        tracing::error!("Failed to assemble recording {}: {}", session_id, e);
                        None
                    }
                };
                (log.artifact.clone(), log.chunks.len())
            }
            Err(_) => (None, 0),
        };

        let duration = self.registry.complete(session_id)?;
        self.schedule_cleanup(session_id);

        tracing::info!("Recording {} finalized with {} chunks", session_id, chunk_count);
        Ok(RecordingSummary {
            duration,
            path: dir,
            artifact,
        })
    }

    async fn summary(
        &self,
        session_id: &str,
        duration: DurationInfo,
    ) -> CameraResult<RecordingSummary> {
        let path = self
            .registry
            .require(session_id, SessionKind::Recording)?
            .storage_path
            .unwrap_or_else(|| self.config.default_path.clone());
        let artifact = match self.gate(session_id) {
            Ok(gate) => gate.lock().await.artifact.clone(),
            Err(_) => None,
        };
        Ok(RecordingSummary {
            duration,
            path,
            artifact,
        })
    }

    /// Concatenate `chunks` in order into `target`, one chunk at a time
    async fn assemble(&self, chunks: &[PathBuf], target: &Path) -> CameraResult<()> {
        self.storage
            .write_file(target, &[])
            .await
            .map_err(|e| write_failed(target, e))?;
        for chunk in chunks {
            self.storage
                .append_file(target, chunk)
                .await
                .map_err(|e| write_failed(chunk, e))?;
        }
        Ok(())
    }

    /// Drop the session and its gate once the grace period is over
    fn schedule_cleanup(&self, session_id: &str) -> JoinHandle<bool> {
        let registry = Arc::clone(&self.registry);
        let gates = Arc::clone(&self.gates);
        let grace = self.config.grace_period();
        let id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let purged = registry.purge(&id);
            gates.lock().remove(&id);
            purged
        })
    }
}

fn write_failed(path: &Path, e: std::io::Error) -> CameraError {
    CameraError::StorageWriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
