//! Streaming results

use crate::config::ResolvedSettings;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of starting a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStarted {
    pub stream_id: String,

    /// Where viewers attach to the primary channel
    pub stream_url: String,

    /// Where fallback segments are uploaded
    pub http_endpoint: String,

    pub start_time: DateTime<Utc>,

    pub settings: ResolvedSettings,
}

/// A chunk uploaded over the fallback path
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub stream_id: String,
    pub timestamp: i64,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunkReceipt {
    pub stream_id: String,
    pub timestamp: i64,
    pub processed: bool,
}

/// Viewer url of `stream_id` below `base_url`
pub fn stream_url(base_url: &str, stream_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), urlencoding::encode(stream_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_is_encoded() {
        assert_eq!(
            stream_url("ws://localhost:8080/api/camera/stream/", "stream_1_camera 1"),
            "ws://localhost:8080/api/camera/stream/stream_1_camera%201"
        );
    }
}
