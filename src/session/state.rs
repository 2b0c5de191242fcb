//! Session state management
//!
//! Defines the session state machine and the records tracked by the registry.

use crate::utils::time::format_hms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;

/// What a session is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Recording,
    Streaming,
}

impl SessionKind {
    /// Prefix used when generating ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SessionKind::Recording => "rec",
            SessionKind::Streaming => "stream",
        }
    }
}

/// Lifecycle status of a session
///
/// Sessions only ever move forward: Active, Stopping, Completed, Expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting work
    Active,
    /// A stop has been claimed and is being finalized
    Stopping,
    /// Finalized; kept around for the grace period
    Completed,
    /// Removed from the registry
    Expired,
}

impl SessionStatus {
    /// Whether `next` is the single valid successor of this status
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Active, SessionStatus::Stopping)
                | (SessionStatus::Stopping, SessionStatus::Completed)
                | (SessionStatus::Completed, SessionStatus::Expired)
        )
    }
}

/// Start, end and length of a finished session
///
/// `duration` is always derived from `duration_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationInfo {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `HH:MM:SS`
    pub duration: String,
    pub duration_seconds: u64,
}

impl DurationInfo {
    pub fn new(
        session_id: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            end_time,
            duration: format_hms(duration_seconds),
            duration_seconds,
        }
    }
}

/// A tracked recording or streaming session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Unique session identifier
    pub id: String,

    pub kind: SessionKind,

    /// Logical camera this session reads from
    pub camera_id: String,

    /// Wall-clock creation time
    pub start_time: DateTime<Utc>,

    /// Monotonic creation time, used for durations
    #[serde(skip)]
    pub started_at: Instant,

    /// Monotonic time at which the stop was claimed
    #[serde(skip)]
    pub stop_requested_at: Option<Instant>,

    /// Set exactly once, when the session completes
    pub end_time: Option<DateTime<Utc>>,

    pub status: SessionStatus,

    /// Where chunks and the final artifact go (recordings only)
    pub storage_path: Option<PathBuf>,

    /// Next chunk sequence number to hand out (recordings only)
    pub sequence_counter: u64,

    /// Computed at completion and returned by every later stop
    pub duration: Option<DurationInfo>,
}

impl SessionRecord {
    pub fn new(
        id: String,
        kind: SessionKind,
        camera_id: String,
        storage_path: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            kind,
            camera_id,
            start_time: Utc::now(),
            started_at: Instant::now(),
            stop_requested_at: None,
            end_time: None,
            status: SessionStatus::Active,
            storage_path,
            sequence_counter: 0,
            duration: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Lifecycle notifications broadcast by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started {
        id: String,
        kind: SessionKind,
        camera_id: String,
    },
    Completed {
        id: String,
        kind: SessionKind,
        duration_seconds: u64,
    },
    Expired {
        id: String,
        kind: SessionKind,
    },
    /// A stream switched transports
    TransportChanged {
        id: String,
        transport: String,
    },
}
