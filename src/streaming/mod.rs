//! Live streaming
//!
//! This module implements live streams:
//! - Transport traits for the primary push channel and the fallback upload channel
//! - WebSocket and in-process push transports, and an HTTP upload fallback
//! - A relay task per stream feeding frames to the active transport
//! - StreamingManager to own the stream lifecycle

pub mod http;
pub mod local;
pub mod manager;
mod relay;
pub mod state;
pub mod transport;
pub mod websocket;

pub use http::HttpFallbackTransport;
pub use local::LocalPushTransport;
pub use manager::StreamingManager;
pub use state::{StreamChunk, StreamChunkReceipt, StreamStarted};
pub use transport::{
    FallbackChannel, FallbackTransport, PushChannel, PushTransport, TransportState,
};
pub use websocket::WebSocketPushTransport;
