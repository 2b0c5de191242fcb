//! Recording module
//!
//! This module implements chunked recordings:
//! - MediaStorage trait for opaque byte persistence
//! - RecordingManager to own the recording lifecycle
//! - Result types returned to the control surface

pub mod coordinator;
pub mod state;
pub mod storage;

pub use coordinator::RecordingManager;
pub use state::{ChunkReceipt, RecordingStarted, RecordingSummary};
pub use storage::{FsStorage, MediaStorage, MemoryStorage};
