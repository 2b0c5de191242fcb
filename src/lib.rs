//! Open CamStudio - Camera capture, recording and live streaming.
//!
//! This is the main library crate for the Open CamStudio engine.
//! It provides session management for recordings and live streams, still
//! capture with detection overlays, and the boundary operations exposed to
//! the route layer.

pub mod capture;
pub mod commands;
pub mod config;
pub mod overlay;
pub mod recorder;
pub mod session;
pub mod streaming;
pub mod utils;

pub use commands::CameraService;
pub use config::CamstudioConfig;
pub use utils::error::{CameraError, CameraResponse, CameraResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter. Calling it again once a
/// subscriber is installed does nothing.
pub fn init_tracing() {
    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_camstudio=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("Starting Open CamStudio v{}", env!("CARGO_PKG_VERSION"));
    }
}
