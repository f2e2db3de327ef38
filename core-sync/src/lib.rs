//! # Sync Module
//!
//! Delivers queued location samples to the collector.
//!
//! ## Overview
//!
//! - Drains the whole unsynced backlog in one ordered batch per pass
//! - Marks samples synced only after the collector acknowledged them
//! - Backs off exponentially on failure, up to a ceiling
//! - Pauses while offline and drains as soon as connectivity returns
//!
//! ## Components
//!
//! - **Attempt model** (`attempt`): triggers, outcomes and the engine state machine
//! - **Backoff** (`backoff`): retry delay policy and the armed retry timer
//! - **Upload** (`upload`): collector wire format over the host HTTP client
//! - **Engine** (`engine`): single-flight drain worker and the `SyncScheduler` seam
//! - **Connectivity** (`connectivity`): feeds network monitor changes into the engine

pub mod attempt;
pub mod backoff;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod upload;

pub use attempt::{AttemptOutcome, SyncAttempt, SyncAttemptId, SyncState, SyncTrigger};
pub use backoff::{BackoffPolicy, RetrySchedule};
pub use connectivity::ConnectivityWatcher;
pub use engine::{SyncEngine, SyncEngineConfig, SyncScheduler};
pub use error::{Result, SyncError};
pub use upload::{CollectorUploadClient, UploadClient, UploadOutcome, UploadRecord};
