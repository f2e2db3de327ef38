//! # Sync Engine
//!
//! Drains the sample queue to the collector.
//!
//! ## Overview
//!
//! Every pass reads the whole unsynced backlog, uploads it as one batch and
//! marks it synced only after the collector acknowledged it. A failed pass
//! arms an exponential retry timer; nothing is ever marked on failure, so
//! delivery is at-least-once.
//!
//! ## Scheduling
//!
//! - Passes are single-flight. Requests that arrive while a pass runs collapse
//!   into at most one follow-up pass.
//! - While a retry is pending, `SampleAppended`, `Periodic` and `Startup`
//!   requests are absorbed; the retry will carry those samples.
//! - `ConnectivityRestored` and `Manual` cancel the pending retry and drain now.
//! - Offline, nothing is attempted. A retry timer that expires offline is
//!   consumed without an attempt and the next online transition drains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(store, uploader, event_bus, SyncEngineConfig::default());
//! let worker = engine.spawn(shutdown.child_token());
//!
//! engine.request_sync(SyncTrigger::SampleAppended);
//! ```

use crate::attempt::{AttemptOutcome, SyncAttempt, SyncState, SyncTrigger};
use crate::backoff::{BackoffPolicy, RetrySchedule};
use crate::upload::{UploadClient, UploadOutcome};
use crate::Result;
use core_runtime::config::{SyncSettings, DEFAULT_PERIODIC_INTERVAL, DEFAULT_UPLOAD_TIMEOUT};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::SampleStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Scheduler Seam
// ============================================================================

/// Fire-and-forget request for a drain
///
/// Implemented by [`SyncEngine`]; capture depends on this trait only.
pub trait SyncScheduler: Send + Sync {
    fn request_sync(&self, trigger: SyncTrigger);
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub backoff: BackoffPolicy,
    /// Safety-net trigger; `None` disables it
    pub periodic_interval: Option<Duration>,
    /// Upper bound on one upload call
    pub upload_timeout: Duration,
}

impl SyncEngineConfig {
    /// # Errors
    ///
    /// Returns error if the backoff settings are inconsistent.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        Ok(Self {
            backoff: BackoffPolicy::new(settings.backoff_base, settings.backoff_ceiling)?,
            periodic_interval: settings.periodic_interval,
            upload_timeout: settings.upload_timeout,
        })
    }
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            periodic_interval: Some(DEFAULT_PERIODIC_INTERVAL),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

// ============================================================================
// Scheduling State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Queued,
    /// Folded into the pending retry
    Absorbed,
    Offline,
}

#[derive(Debug)]
struct Control {
    online: bool,
    consecutive_failures: u32,
    retry: RetrySchedule,
    /// Strongest trigger requested since the last pass started
    queued: Option<SyncTrigger>,
    passes: u64,
}

impl Control {
    fn new() -> Self {
        Self {
            online: true,
            consecutive_failures: 0,
            retry: RetrySchedule::NoPendingRetry,
            queued: None,
            passes: 0,
        }
    }

    fn admit(&mut self, trigger: SyncTrigger) -> Admission {
        if !self.online {
            return Admission::Offline;
        }
        if self.retry.is_pending() {
            if !trigger.supersedes_backoff() {
                return Admission::Absorbed;
            }
            self.retry = RetrySchedule::NoPendingRetry;
        }

        self.queued = match self.queued {
            Some(previous) if previous.supersedes_backoff() && !trigger.supersedes_backoff() => {
                Some(previous)
            }
            _ => Some(trigger),
        };
        Admission::Queued
    }

    /// Queued trigger that may still run given connectivity and backoff
    fn take_queued(&mut self) -> Option<SyncTrigger> {
        let trigger = self.queued.take()?;
        if !self.online {
            return None;
        }
        if self.retry.is_pending() && !trigger.supersedes_backoff() {
            return None;
        }
        Some(trigger)
    }

    fn fire_retry(&mut self, deadline: Instant) -> Option<SyncTrigger> {
        if self.retry.deadline() != Some(deadline) {
            // Cancelled or re-armed since the worker started waiting
            return None;
        }
        self.retry = RetrySchedule::NoPendingRetry;
        if !self.online {
            debug!("Retry timer expired while offline");
            return None;
        }
        self.queued = None;
        Some(SyncTrigger::RetryTimer)
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    store: Arc<dyn SampleStore>,
    uploader: Arc<dyn UploadClient>,
    event_bus: EventBus,
    config: SyncEngineConfig,
    control: Mutex<Control>,
    wake: Notify,
    pass_lock: AsyncMutex<()>,
    state: watch::Sender<SyncState>,
}

/// Cheap-to-clone handle to the sync engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// The engine starts online with an empty schedule; call
    /// [`spawn`](Self::spawn) to start the worker.
    pub fn new(
        store: Arc<dyn SampleStore>,
        uploader: Arc<dyn UploadClient>,
        event_bus: EventBus,
        config: SyncEngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(EngineInner {
                store,
                uploader,
                event_bus,
                config,
                control: Mutex::new(Control::new()),
                wake: Notify::new(),
                pass_lock: AsyncMutex::new(()),
                state,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the worker for a drain
    ///
    /// Never blocks and never runs a pass on the caller's task.
    pub fn request_sync(&self, trigger: SyncTrigger) {
        let admission = self.control().admit(trigger);
        match admission {
            Admission::Queued => self.inner.wake.notify_one(),
            Admission::Absorbed => debug!(%trigger, "Sync request absorbed by pending retry"),
            Admission::Offline => debug!(%trigger, "Sync request deferred while offline"),
        }
    }

    /// Record a connectivity change; going online drains immediately
    pub fn set_online(&self, online: bool) {
        let restored = {
            let mut control = self.control();
            if control.online == online {
                return;
            }
            control.online = online;
            online && control.admit(SyncTrigger::ConnectivityRestored) == Admission::Queued
        };

        info!(online, "Sync engine connectivity changed");
        if restored {
            self.inner.wake.notify_one();
        }
    }

    pub fn is_online(&self) -> bool {
        self.control().online
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn retry_schedule(&self) -> RetrySchedule {
        self.control().retry
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.control().consecutive_failures
    }

    /// Passes that ran to an outcome since the engine was created
    pub fn pass_count(&self) -> u64 {
        self.control().passes
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.inner.store.count_unsynced().await?)
    }

    /// Run a manual pass on the caller's task and wait for its outcome
    ///
    /// Cancels a pending retry. Returns `None` while offline.
    pub async fn sync_now(&self) -> Option<SyncAttempt> {
        {
            let mut control = self.control();
            if !control.online {
                debug!("Manual sync skipped while offline");
                return None;
            }
            control.retry = RetrySchedule::NoPendingRetry;
        }
        Some(self.run_pass(SyncTrigger::Manual).await)
    }

    /// Start the worker loop on the current runtime
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(shutdown))
    }

    /// Worker loop; returns when `shutdown` is cancelled
    ///
    /// A pass in flight when shutdown fires runs to its outcome.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            backoff_base_ms = self.inner.config.backoff.base().as_millis() as u64,
            periodic = ?self.inner.config.periodic_interval,
            "Sync engine worker started"
        );

        let mut periodic = self.inner.config.periodic_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let retry_deadline = self.control().retry.deadline();

            let trigger = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.inner.wake.notified() => self.control().take_queued(),
                deadline = wait_until(retry_deadline) => self.control().fire_retry(deadline),
                _ = next_tick(&mut periodic) => {
                    let mut control = self.control();
                    match control.admit(SyncTrigger::Periodic) {
                        Admission::Queued => control.take_queued(),
                        _ => None,
                    }
                }
            };

            if let Some(trigger) = trigger {
                self.run_pass(trigger).await;
            }
        }

        info!("Sync engine worker stopped");
    }

    #[instrument(skip(self), fields(trigger = %trigger))]
    async fn run_pass(&self, trigger: SyncTrigger) -> SyncAttempt {
        let _pass = self.inner.pass_lock.lock().await;
        let started = Instant::now();
        let mut attempt = SyncAttempt::begin(trigger);
        self.transition(SyncState::Draining);

        let batch = match self.inner.store.list_unsynced().await {
            Ok(batch) => batch,
            Err(e) => {
                attempt.outcome = AttemptOutcome::FatalFailure {
                    reason: format!("Failed to read unsynced samples: {}", e),
                };
                return self.finish(attempt, started).await;
            }
        };

        if batch.is_empty() {
            debug!("Queue is empty, nothing to upload");
            return self.finish(attempt, started).await;
        }

        attempt.sample_ids = batch.iter().map(|sample| sample.id).collect();
        self.transition(SyncState::Uploading);
        self.inner
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                attempt_id: attempt.id.as_str(),
                trigger: trigger.to_string(),
                batch_size: attempt.batch_size() as u64,
            }))
            .ok();

        let timeout = self.inner.config.upload_timeout;
        let upload = tokio::time::timeout(timeout, self.inner.uploader.upload(&batch))
            .await
            .unwrap_or_else(|_| UploadOutcome::failure(format!("Upload timed out after {:?}", timeout)));

        attempt.outcome = match upload {
            UploadOutcome::Success => match self.inner.store.mark_synced(&attempt.sample_ids).await {
                Ok(changed) => {
                    debug!(changed, "Batch marked synced");
                    AttemptOutcome::Success
                }
                Err(e) => AttemptOutcome::FatalFailure {
                    reason: format!("Collector acknowledged batch but marking failed: {}", e),
                },
            },
            UploadOutcome::Failure { reason } => AttemptOutcome::TransientFailure { reason },
        };

        self.finish(attempt, started).await
    }

    async fn finish(&self, mut attempt: SyncAttempt, started: Instant) -> SyncAttempt {
        attempt.duration = started.elapsed();
        attempt.finished_at = chrono::Utc::now().timestamp_millis();
        let attempt_id = attempt.id.as_str();

        match attempt.outcome.reason() {
            None => {
                {
                    let mut control = self.control();
                    control.consecutive_failures = 0;
                    control.retry = RetrySchedule::NoPendingRetry;
                }
                if self.state() == SyncState::Uploading {
                    self.transition(SyncState::Succeeded);
                    info!(
                        attempt_id = %attempt_id,
                        synced = attempt.batch_size(),
                        duration_ms = attempt.duration.as_millis() as u64,
                        "Sync attempt succeeded"
                    );
                    self.inner
                        .event_bus
                        .emit(CoreEvent::Sync(SyncEvent::Completed {
                            attempt_id,
                            synced: attempt.batch_size() as u64,
                            duration_ms: attempt.duration.as_millis() as u64,
                        }))
                        .ok();
                }
            }
            Some(reason) => {
                let reason = reason.to_string();
                let (failures, delay) = {
                    let mut control = self.control();
                    control.consecutive_failures = control.consecutive_failures.saturating_add(1);
                    let delay = self.inner.config.backoff.delay_for(control.consecutive_failures);
                    control.retry = RetrySchedule::pending(delay);
                    (control.consecutive_failures, delay)
                };
                attempt.next_retry_delay = Some(delay);
                self.transition(SyncState::Failed);

                warn!(
                    attempt_id = %attempt_id,
                    reason = %reason,
                    consecutive_failures = failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Sync attempt failed"
                );
                self.inner
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        attempt_id,
                        message: reason,
                        consecutive_failures: failures,
                    }))
                    .ok();
                self.inner
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::RetryScheduled {
                        delay_ms: delay.as_millis() as u64,
                    }))
                    .ok();

                // Worker re-reads the retry deadline
                self.inner.wake.notify_one();
            }
        }

        self.transition(SyncState::Idle);
        self.control().passes += 1;

        match self.inner.store.count_unsynced().await {
            Ok(pending) => {
                self.inner
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::PendingCountChanged { pending }))
                    .ok();
            }
            Err(e) => debug!(error = %e, "Failed to count pending samples"),
        }

        attempt
    }

    fn transition(&self, next: SyncState) {
        self.inner.state.send_if_modified(|state| match state.transition_to(next) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(e) => {
                error!(error = %e, "Rejected sync state transition");
                false
            }
        });
    }
}

impl SyncScheduler for SyncEngine {
    fn request_sync(&self, trigger: SyncTrigger) {
        SyncEngine::request_sync(self, trigger);
    }
}

async fn wait_until(deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline).await;
            deadline
        }
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_store::{NewSample, Sample, SampleId, StoreError};
    use mockall::mock;
    use std::collections::VecDeque;

    mock! {
        Store {}

        #[async_trait]
        impl SampleStore for Store {
            async fn append(&self, sample: &NewSample) -> core_store::Result<SampleId>;
            async fn list_unsynced(&self) -> core_store::Result<Vec<Sample>>;
            async fn mark_synced(&self, ids: &[SampleId]) -> core_store::Result<u64>;
            async fn count_unsynced(&self) -> core_store::Result<u64>;
            async fn find_by_id(&self, id: SampleId) -> core_store::Result<Option<Sample>>;
        }
    }

    #[derive(Default)]
    struct ScriptedUploader {
        outcomes: Mutex<VecDeque<UploadOutcome>>,
        calls: Mutex<usize>,
    }

    impl ScriptedUploader {
        fn with(outcomes: Vec<UploadOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl UploadClient for ScriptedUploader {
        async fn upload(&self, _batch: &[Sample]) -> UploadOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(UploadOutcome::Success)
        }
    }

    fn sample(id: i64) -> Sample {
        Sample {
            id: SampleId(id),
            subject_id: "EMP001".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            accuracy: 3.0,
            captured_at_millis: id,
            speed: None,
            synced: false,
        }
    }

    fn config(base: Duration) -> SyncEngineConfig {
        SyncEngineConfig {
            backoff: BackoffPolicy::new(base, Duration::from_secs(5 * 60 * 60)).unwrap(),
            periodic_interval: None,
            upload_timeout: Duration::from_secs(5),
        }
    }

    // ------------------------------------------------------------------
    // Scheduling rules
    // ------------------------------------------------------------------

    #[test]
    fn test_pending_retry_absorbs_weak_triggers() {
        let mut control = Control::new();
        control.retry = RetrySchedule::pending(Duration::from_secs(10));

        assert_eq!(control.admit(SyncTrigger::SampleAppended), Admission::Absorbed);
        assert_eq!(control.admit(SyncTrigger::Periodic), Admission::Absorbed);
        assert_eq!(control.admit(SyncTrigger::Startup), Admission::Absorbed);
        assert!(control.retry.is_pending());
        assert_eq!(control.take_queued(), None);
    }

    #[test]
    fn test_strong_triggers_cancel_pending_retry() {
        for trigger in [SyncTrigger::ConnectivityRestored, SyncTrigger::Manual] {
            let mut control = Control::new();
            control.retry = RetrySchedule::pending(Duration::from_secs(10));

            assert_eq!(control.admit(trigger), Admission::Queued);
            assert_eq!(control.retry, RetrySchedule::NoPendingRetry);
            assert_eq!(control.take_queued(), Some(trigger));
        }
    }

    #[test]
    fn test_offline_defers_everything() {
        let mut control = Control::new();
        control.online = false;
        assert_eq!(control.admit(SyncTrigger::Manual), Admission::Offline);
        assert_eq!(control.take_queued(), None);
    }

    #[test]
    fn test_queued_trigger_keeps_strongest() {
        let mut control = Control::new();
        control.admit(SyncTrigger::ConnectivityRestored);
        control.admit(SyncTrigger::SampleAppended);
        assert_eq!(control.take_queued(), Some(SyncTrigger::ConnectivityRestored));

        control.admit(SyncTrigger::SampleAppended);
        control.admit(SyncTrigger::Periodic);
        assert_eq!(control.take_queued(), Some(SyncTrigger::Periodic));
    }

    #[test]
    fn test_trigger_queued_before_failure_waits_for_retry() {
        let mut control = Control::new();
        assert_eq!(control.admit(SyncTrigger::SampleAppended), Admission::Queued);
        // The pass that was running fails and arms a retry
        control.retry = RetrySchedule::pending(Duration::from_secs(10));
        assert_eq!(control.take_queued(), None);
    }

    #[tokio::test]
    async fn test_stale_retry_deadline_does_not_fire() {
        let mut control = Control::new();
        control.retry = RetrySchedule::pending(Duration::from_secs(10));
        let stale = Instant::now();
        assert_eq!(control.fire_retry(stale), None);
        assert!(control.retry.is_pending());

        let deadline = control.retry.deadline().unwrap();
        assert_eq!(control.fire_retry(deadline), Some(SyncTrigger::RetryTimer));
        assert_eq!(control.retry, RetrySchedule::NoPendingRetry);
    }

    #[tokio::test]
    async fn test_retry_expiring_offline_is_consumed() {
        let mut control = Control::new();
        control.retry = RetrySchedule::pending(Duration::from_secs(10));
        control.online = false;

        let deadline = control.retry.deadline().unwrap();
        assert_eq!(control.fire_retry(deadline), None);
        assert_eq!(control.retry, RetrySchedule::NoPendingRetry);
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_store_read_failure_is_fatal_and_backs_off() {
        let mut store = MockStore::new();
        store
            .expect_list_unsynced()
            .times(1)
            .returning(|| Err(StoreError::Migration("disk I/O error".to_string())));
        store.expect_count_unsynced().returning(|| Ok(0));
        store.expect_mark_synced().never();

        let uploader = Arc::new(ScriptedUploader::default());
        let engine = SyncEngine::new(
            Arc::new(store),
            uploader.clone(),
            EventBus::new(16),
            config(Duration::from_secs(10)),
        );

        let attempt = engine.sync_now().await.unwrap();
        assert!(matches!(attempt.outcome, AttemptOutcome::FatalFailure { .. }));
        assert_eq!(attempt.next_retry_delay, Some(Duration::from_secs(10)));
        assert_eq!(engine.consecutive_failures(), 1);
        assert!(engine.retry_schedule().is_pending());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(uploader.calls(), 0);
    }

    #[tokio::test]
    async fn test_mark_failure_after_ack_keeps_samples_unsynced() {
        let mut store = MockStore::new();
        store
            .expect_list_unsynced()
            .times(1)
            .returning(|| Ok(vec![sample(1), sample(2)]));
        store
            .expect_mark_synced()
            .times(1)
            .returning(|_| Err(StoreError::Migration("database is locked".to_string())));
        store.expect_count_unsynced().returning(|| Ok(2));

        let engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(ScriptedUploader::default()),
            EventBus::new(16),
            config(Duration::from_secs(10)),
        );

        let attempt = engine.sync_now().await.unwrap();
        assert!(matches!(attempt.outcome, AttemptOutcome::FatalFailure { .. }));
        assert_eq!(attempt.sample_ids, vec![SampleId(1), SampleId(2)]);
        assert_eq!(engine.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_never_marks() {
        let mut store = MockStore::new();
        store
            .expect_list_unsynced()
            .returning(|| Ok(vec![sample(1)]));
        store.expect_mark_synced().never();
        store.expect_count_unsynced().returning(|| Ok(1));

        let uploader = Arc::new(ScriptedUploader::with(vec![
            UploadOutcome::failure("HTTP 500"),
            UploadOutcome::failure("HTTP 500"),
        ]));
        let engine = SyncEngine::new(
            Arc::new(store),
            uploader.clone(),
            EventBus::new(16),
            config(Duration::from_secs(10)),
        );

        engine.sync_now().await.unwrap();
        let attempt = engine.sync_now().await.unwrap();
        assert_eq!(
            attempt.outcome,
            AttemptOutcome::TransientFailure {
                reason: "HTTP 500".to_string()
            }
        );
        assert_eq!(attempt.next_retry_delay, Some(Duration::from_secs(20)));
        assert_eq!(uploader.calls(), 2);
    }

    #[tokio::test]
    async fn test_upload_timeout_is_transient_failure() {
        struct StalledUploader;

        #[async_trait]
        impl UploadClient for StalledUploader {
            async fn upload(&self, _batch: &[Sample]) -> UploadOutcome {
                std::future::pending().await
            }
        }

        let mut store = MockStore::new();
        store.expect_list_unsynced().returning(|| Ok(vec![sample(1)]));
        store.expect_mark_synced().never();
        store.expect_count_unsynced().returning(|| Ok(1));

        let mut config = config(Duration::from_secs(10));
        config.upload_timeout = Duration::from_millis(50);
        let engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(StalledUploader),
            EventBus::new(16),
            config,
        );

        let attempt = engine.sync_now().await.unwrap();
        assert!(matches!(
            attempt.outcome,
            AttemptOutcome::TransientFailure { reason } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_empty_queue_is_success_and_resets_backoff() {
        let mut store = MockStore::new();
        store.expect_list_unsynced().returning(|| Ok(Vec::new()));
        store.expect_count_unsynced().returning(|| Ok(0));

        let engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(ScriptedUploader::default()),
            EventBus::new(16),
            config(Duration::from_secs(10)),
        );
        engine.control().consecutive_failures = 3;

        let mut states = engine.subscribe_state();
        let attempt = engine.sync_now().await.unwrap();

        assert!(attempt.outcome.is_success());
        assert_eq!(attempt.batch_size(), 0);
        assert_eq!(engine.consecutive_failures(), 0);
        assert_eq!(engine.retry_schedule(), RetrySchedule::NoPendingRetry);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_skipped() {
        let mut store = MockStore::new();
        store.expect_list_unsynced().never();

        let engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(ScriptedUploader::default()),
            EventBus::new(16),
            config(Duration::from_secs(10)),
        );
        engine.set_online(false);

        assert!(engine.sync_now().await.is_none());
        assert!(!engine.is_online());
        assert_eq!(engine.pass_count(), 0);
    }

    #[tokio::test]
    async fn test_pass_emits_sync_events() {
        let mut store = MockStore::new();
        store
            .expect_list_unsynced()
            .returning(|| Ok(vec![sample(1), sample(2)]));
        store.expect_mark_synced().returning(|ids| Ok(ids.len() as u64));
        store.expect_count_unsynced().returning(|| Ok(0));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(ScriptedUploader::default()),
            bus,
            config(Duration::from_secs(10)),
        );

        let attempt = engine.sync_now().await.unwrap();

        match events.recv().await.unwrap() {
            CoreEvent::Sync(SyncEvent::Started {
                attempt_id,
                trigger,
                batch_size,
            }) => {
                assert_eq!(attempt_id, attempt.id.as_str());
                assert_eq!(trigger, "manual");
                assert_eq!(batch_size, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Completed { synced: 2, .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::PendingCountChanged { pending: 0 })
        ));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SyncSettings::default();
        let config = SyncEngineConfig::from_settings(&settings).unwrap();
        assert_eq!(config.backoff.base(), settings.backoff_base);
        assert_eq!(config.periodic_interval, settings.periodic_interval);

        let invalid = SyncSettings {
            backoff_base: Duration::from_secs(60),
            backoff_ceiling: Duration::from_secs(1),
            ..SyncSettings::default()
        };
        assert!(SyncEngineConfig::from_settings(&invalid).is_err());
    }
}
