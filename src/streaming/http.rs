//! HTTP fallback transport
//!
//! Uploads every segment as a multipart POST with the fields `streamId`,
//! `timestamp` and `chunk`.

use super::transport::{FallbackChannel, FallbackTransport};
use crate::utils::error::{CameraError, CameraResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve `endpoint` against `base_url` unless it is already absolute
fn resolve_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

struct HttpChannel {
    client: reqwest::Client,
    url: String,
    stream_id: String,
    open: AtomicBool,
}

#[async_trait]
impl FallbackChannel for HttpChannel {
    async fn send(&self, segment: Bytes, timestamp: i64) -> CameraResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(CameraError::TransportFailed(format!(
                "Fallback channel for {} is closed",
                self.stream_id
            )));
        }

        let chunk = Part::bytes(segment.to_vec())
            .file_name("chunk.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| CameraError::TransportFailed(e.to_string()))?;
        let form = Form::new()
            .text("streamId", self.stream_id.clone())
            .text("timestamp", timestamp.to_string())
            .part("chunk", chunk);

        self.client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                CameraError::TransportFailed(format!("Upload to {} failed: {}", self.url, e))
            })?;
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Fallback transport posting segments to an HTTP endpoint
pub struct HttpFallbackTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFallbackTransport {
    pub fn new(base_url: impl Into<String>) -> CameraResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| CameraError::TransportFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl FallbackTransport for HttpFallbackTransport {
    async fn open(
        &self,
        stream_id: &str,
        endpoint: &str,
    ) -> CameraResult<Arc<dyn FallbackChannel>> {
        let url = resolve_url(&self.base_url, endpoint);
        tracing::info!("Stream {} falling back to uploads at {}", stream_id, url);
        Ok(Arc::new(HttpChannel {
            client: self.client.clone(),
            url,
            stream_id: stream_id.to_string(),
            open: AtomicBool::new(true),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://localhost:8080/", "/api/camera/stream-chunk"),
            "http://localhost:8080/api/camera/stream-chunk"
        );
        assert_eq!(resolve_url("http://a", "http://b/upload"), "http://b/upload");
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_fields() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.ends_with(b"--\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        let transport = HttpFallbackTransport::new(format!("http://{}", addr)).unwrap();
        let channel = transport.open("stream_1_camera1", "/api/camera/stream-chunk").await.unwrap();
        channel.send(Bytes::from_static(b"segment"), 1234).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/camera/stream-chunk"));
        assert!(request.contains("name=\"streamId\""));
        assert!(request.contains("stream_1_camera1"));
        assert!(request.contains("name=\"timestamp\""));
        assert!(request.contains("1234"));
        assert!(request.contains("name=\"chunk\""));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpFallbackTransport::new(format!("http://{}", addr)).unwrap();
        let channel = transport.open("stream_1_camera1", "/upload").await.unwrap();
        let result = channel.send(Bytes::from_static(b"segment"), 0).await;
        assert!(matches!(result, Err(CameraError::TransportFailed(_))));
    }

    #[tokio::test]
    async fn test_closed_channel_rejects() {
        let transport = HttpFallbackTransport::new("http://127.0.0.1:1").unwrap();
        let channel = transport.open("stream_1_camera1", "/upload").await.unwrap();
        channel.close().await;
        assert!(channel.send(Bytes::new(), 0).await.is_err());
    }
}
