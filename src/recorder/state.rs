//! Recording results
//!
//! Values handed back by the recording manager.

use crate::config::ResolvedSettings;
use crate::session::DurationInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of starting a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStarted {
    pub session_id: String,

    /// Name of the artifact assembled at completion
    pub filename: String,

    /// Directory receiving chunks and the artifact
    pub path: PathBuf,

    pub start_time: DateTime<Utc>,

    pub settings: ResolvedSettings,
}

/// Result of accepting one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub session_id: String,

    /// Position of the chunk, starting at 0
    pub sequence: u64,

    pub chunk_path: PathBuf,

    /// Whether this chunk finished the recording
    pub is_completed: bool,
}

/// Result of stopping a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    #[serde(flatten)]
    pub duration: DurationInfo,

    pub path: PathBuf,

    /// Assembled artifact, absent if assembly failed
    pub artifact: Option<PathBuf>,
}

/// Filename of the artifact for `session_id`
pub fn artifact_filename(session_id: &str, extension: &str) -> String {
    format!("recording_{}.{}", session_id, extension)
}

/// Path of chunk `sequence` for `session_id` inside `dir`
pub fn chunk_path(dir: &Path, session_id: &str, sequence: u64, extension: &str) -> PathBuf {
    dir.join(format!("{}_chunk_{:06}.{}", session_id, sequence, extension))
}
