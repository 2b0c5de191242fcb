//! Session tracking
//!
//! Session records, their state machine and the shared registry.

pub mod registry;
pub mod state;

pub use registry::{CameraStatus, SessionRegistry, StopClaim};
pub use state::{DurationInfo, SessionEvent, SessionKind, SessionRecord, SessionStatus};
