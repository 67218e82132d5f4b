//! # Photo Cluster
//!
//! Finds near-duplicate photos and groups them into reviewable clusters.
//!
//! ## Core Philosophy
//! - **Never touch the media** - the engine only reads content and writes reports
//! - **Keep going** - a bad item is recorded as a failure, never a crash
//! - **Deterministic** - the same inputs always give the same clusters
//!
//! ## Architecture
//! - `core` - Fingerprinting, comparison, clustering and reporting
//! - `events` - Event-driven progress reporting
//! - `error` - Error types and per-item failure reasons

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{ClusterEngineError, FailureReason, ProcessingFailure, Result};

/// Initialize tracing for the library
///
/// Should be called once by the application entry point. Honors
/// `RUST_LOG`; defaults to `warn`. Logs go to stderr.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
