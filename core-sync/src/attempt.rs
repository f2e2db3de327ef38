//! # Sync Attempt Model
//!
//! One drain of the queue and what came of it, plus the engine state machine
//! an attempt moves through.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Draining → Uploading → Succeeded → Idle
//!           │           │
//!           │           └──────→ Failed → Idle
//!           ├─ store error ───→ Failed
//!           └─ empty queue ───→ Idle
//! ```
//!
//! `Succeeded` and `Failed` are transient: the engine reports them, then
//! returns to `Idle` once the outcome is recorded.

use crate::{Result, SyncError};
use core_store::SampleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncAttemptId(Uuid);

impl SyncAttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncAttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Triggers
// ============================================================================

/// Why a drain was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    SampleAppended,
    ConnectivityRestored,
    Periodic,
    RetryTimer,
    Startup,
    Manual,
}

impl SyncTrigger {
    /// Triggers that cancel a pending retry instead of waiting for it
    pub fn supersedes_backoff(&self) -> bool {
        matches!(
            self,
            SyncTrigger::ConnectivityRestored | SyncTrigger::Manual | SyncTrigger::RetryTimer
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::SampleAppended => "sample_appended",
            SyncTrigger::ConnectivityRestored => "connectivity_restored",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::RetryTimer => "retry_timer",
            SyncTrigger::Startup => "startup",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Engine State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    /// Reading the unsynced backlog
    Draining,
    /// A batch is in flight
    Uploading,
    Succeeded,
    Failed,
}

impl SyncState {
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (Idle, Draining)
                | (Draining, Idle)
                | (Draining, Uploading)
                | (Draining, Failed)
                | (Uploading, Succeeded)
                | (Uploading, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }

    /// Validate a transition
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] for a move the state
    /// machine does not allow.
    pub fn transition_to(self, next: SyncState) -> Result<SyncState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// An attempt is between `Draining` and its recorded outcome
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Draining => "draining",
            SyncState::Uploading => "uploading",
            SyncState::Succeeded => "succeeded",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attempt
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Batch acknowledged and marked, or nothing to send
    Success,
    /// The collector or the network refused the batch
    TransientFailure { reason: String },
    /// The local store failed; also retried with backoff
    FatalFailure { reason: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AttemptOutcome::Success => None,
            AttemptOutcome::TransientFailure { reason } | AttemptOutcome::FatalFailure { reason } => {
                Some(reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAttempt {
    pub id: SyncAttemptId,
    pub trigger: SyncTrigger,
    /// Unix epoch milliseconds
    pub started_at: i64,
    /// Samples in the batch, in upload order
    pub sample_ids: Vec<SampleId>,
    pub outcome: AttemptOutcome,
    /// Backoff armed by this attempt, if it failed
    pub next_retry_delay: Option<Duration>,
    /// Unix epoch milliseconds, zero until the attempt finished
    pub finished_at: i64,
    pub duration: Duration,
}

impl SyncAttempt {
    pub(crate) fn begin(trigger: SyncTrigger) -> Self {
        Self {
            id: SyncAttemptId::new(),
            trigger,
            started_at: chrono::Utc::now().timestamp_millis(),
            sample_ids: Vec::new(),
            outcome: AttemptOutcome::Success,
            next_retry_delay: None,
            finished_at: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.sample_ids.len()
    }
}
