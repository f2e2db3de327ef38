//! # Location Capture
//!
//! Turns provider fixes into queued samples and nudges the sync engine.
//!
//! Capture never waits on delivery: a persisted sample only signals the
//! [`SyncScheduler`](core_sync::SyncScheduler).

pub mod coordinator;
pub mod error;

pub use coordinator::{CaptureConfig, CaptureCoordinator, CaptureHandle, CaptureStats};
pub use error::{CaptureError, Result};
