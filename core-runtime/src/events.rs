//! # Event Bus System
//!
//! Typed events broadcast between the agent's components and to the host UI,
//! built on `tokio::sync::broadcast`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐
//! │ CaptureCoordinator├───────>│           │  subscribe  ┌────────────┐
//! └──────────────────┘         │ EventBus  ├────────────>│ Host UI    │
//! ┌──────────────────┐  emit   │ (broadcast│             └────────────┘
//! │ SyncEngine       ├────────>│  channel) │  subscribe  ┌────────────┐
//! └──────────────────┘         │           ├────────────>│ Tests      │
//! ┌──────────────────┐  emit   │           │             └────────────┘
//! │ ConnectivityWatch├────────>│           │
//! └──────────────────┘         └───────────┘
//! ```
//!
//! Emitting never blocks and never fails the emitter: with no subscribers the
//! event is simply dropped (`emit(..).ok()` at call sites). Slow subscribers get
//! `RecvError::Lagged` and can keep reading.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::PendingCountChanged { pending: 4 })).ok();
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Sync(_))));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Capture(CaptureEvent),
    Sync(SyncEvent),
    Connectivity(ConnectivityEvent),
    Tracking(TrackingEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Capture(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Connectivity(e) => e.description(),
            CoreEvent::Tracking(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Capture(CaptureEvent::SampleDropped { .. }) => EventSeverity::Error,
            CoreEvent::Capture(CaptureEvent::Stopped { reason: Some(_) }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Connectivity(_)
            | CoreEvent::Tracking(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Capture Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CaptureEvent {
    /// Location updates were requested from the provider.
    Started { subject_id: String },
    /// A fix was persisted as a sample.
    SampleRecorded {
        sample_id: i64,
        captured_at_millis: i64,
    },
    /// A fix could not be persisted and was discarded.
    SampleDropped { message: String },
    /// Capture ended. `reason` is set when it ended because of an error
    /// (e.g. location permission missing).
    Stopped { reason: Option<String> },
}

impl CaptureEvent {
    fn description(&self) -> &str {
        match self {
            CaptureEvent::Started { .. } => "Location capture started",
            CaptureEvent::SampleRecorded { .. } => "Sample recorded",
            CaptureEvent::SampleDropped { .. } => "Sample dropped",
            CaptureEvent::Stopped { .. } => "Location capture stopped",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// An upload of `batch_size` samples began.
    Started {
        attempt_id: String,
        trigger: String,
        batch_size: u64,
    },
    /// The collector acknowledged the batch and it was marked synced.
    Completed {
        attempt_id: String,
        synced: u64,
        duration_ms: u64,
    },
    /// The attempt failed; nothing was marked.
    Failed {
        attempt_id: String,
        message: String,
        consecutive_failures: u32,
    },
    /// The next attempt is armed after `delay_ms`.
    RetryScheduled { delay_ms: u64 },
    /// Number of unsynced samples after a pass or append.
    PendingCountChanged { pending: u64 },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Upload started",
            SyncEvent::Completed { .. } => "Upload completed",
            SyncEvent::Failed { .. } => "Upload failed",
            SyncEvent::RetryScheduled { .. } => "Retry scheduled",
            SyncEvent::PendingCountChanged { .. } => "Pending sample count changed",
        }
    }
}

// ============================================================================
// Connectivity Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    StatusChanged { online: bool },
}

impl ConnectivityEvent {
    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::StatusChanged { online: true } => "Network available",
            ConnectivityEvent::StatusChanged { online: false } => "Network lost",
        }
    }
}

// ============================================================================
// Tracking Events
// ============================================================================

/// Changes of the persisted tracking switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TrackingEvent {
    Enabled,
    Disabled,
    /// Tracking was switched on before the last shutdown and capture resumed.
    Resumed,
}

impl TrackingEvent {
    fn description(&self) -> &str {
        match self {
            TrackingEvent::Enabled => "Tracking enabled",
            TrackingEvent::Disabled => "Tracking disabled",
            TrackingEvent::Resumed => "Tracking resumed after restart",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus; clone it to get another producer handle.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New independent receiver; past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<CoreEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }
}
