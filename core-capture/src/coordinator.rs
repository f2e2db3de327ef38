//! # Capture Coordinator
//!
//! Owns the capture loop: provider fix → sample → queue → sync request.
//!
//! ## Lifecycle
//!
//! - [`CaptureCoordinator::start`] asks the provider for updates. A refusal is
//!   reported once and not retried.
//! - Each fix is stamped with the device clock and appended to the queue. A
//!   failed append drops that fix and the loop carries on.
//! - The loop ends when the provider's stream ends or the handle is stopped;
//!   updates are then stopped on the provider.

use crate::error::{CaptureError, Result};
use bridge_traits::location::{
    LocationFix, LocationProvider, LocationRequest, LocationUpdateStream,
};
use bridge_traits::time::Clock;
use core_runtime::events::{CaptureEvent, CoreEvent, EventBus, SyncEvent};
use core_store::{NewSample, SampleId, SampleStore};
use core_sync::{SyncScheduler, SyncTrigger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Stamped on every sample
    pub subject_id: String,
    /// Handed to the provider unchanged
    pub request: LocationRequest,
}

impl CaptureConfig {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            request: LocationRequest::default(),
        }
    }

    pub fn with_request(mut self, request: LocationRequest) -> Self {
        self.request = request;
        self
    }
}

/// Counters for one capture run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub recorded: u64,
    pub dropped: u64,
}

// ============================================================================
// Handle
// ============================================================================

/// Running capture loop
pub struct CaptureHandle {
    cancel: CancellationToken,
    task: JoinHandle<CaptureStats>,
}

impl CaptureHandle {
    /// Signal the loop to stop without waiting
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the loop and wait until the provider has been stopped
    pub async fn stop_and_wait(self) -> CaptureStats {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the loop to end on its own
    pub async fn wait(self) -> CaptureStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Capture task failed");
                CaptureStats::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

struct CaptureInner {
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn SampleStore>,
    scheduler: Arc<dyn SyncScheduler>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    config: CaptureConfig,
    running: AtomicBool,
}

#[derive(Clone)]
pub struct CaptureCoordinator {
    inner: Arc<CaptureInner>,
}

impl CaptureCoordinator {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn SampleStore>,
        scheduler: Arc<dyn SyncScheduler>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: CaptureConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                provider,
                store,
                scheduler,
                clock,
                event_bus,
                config,
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Start location updates and spawn the capture loop
    ///
    /// The loop stops when `shutdown` is cancelled, when the returned handle is
    /// stopped, or when the provider ends the stream.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AlreadyRunning`] if a loop is active
    /// - [`CaptureError::ProviderUnavailable`] if the provider refused to start
    #[instrument(skip(self, shutdown), fields(subject_id = %self.inner.config.subject_id))]
    pub async fn start(&self, shutdown: CancellationToken) -> Result<CaptureHandle> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let stream = match self
            .inner
            .provider
            .start_updates(self.inner.config.request.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                warn!(error = %e, "Location provider refused to start");
                self.emit(CaptureEvent::Stopped {
                    reason: Some(e.to_string()),
                });
                return Err(CaptureError::ProviderUnavailable(e));
            }
        };

        info!(
            interval_ms = self.inner.config.request.interval.as_millis() as u64,
            priority = ?self.inner.config.request.priority,
            "Location capture started"
        );
        self.emit(CaptureEvent::Started {
            subject_id: self.inner.config.subject_id.clone(),
        });
        self.inner.scheduler.request_sync(SyncTrigger::Startup);

        let cancel = shutdown.child_token();
        let task = tokio::spawn(self.clone().run(stream, cancel.clone()));
        Ok(CaptureHandle { cancel, task })
    }

    /// Persist one fix and request a sync
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Store`] if the sample was rejected or could not
    /// be written; the fix is lost.
    pub async fn record(&self, fix: &LocationFix) -> Result<SampleId> {
        let captured_at_millis = self.inner.clock.unix_timestamp_millis();
        let sample = NewSample::new(
            self.inner.config.subject_id.clone(),
            fix.latitude,
            fix.longitude,
            fix.accuracy,
            captured_at_millis,
        )
        .with_speed(fix.speed);

        let sample_id = self.inner.store.append(&sample).await?;
        debug!(
            sample_id = %sample_id,
            latitude = fix.latitude,
            longitude = fix.longitude,
            accuracy = fix.accuracy,
            "Location sample recorded"
        );

        self.inner.scheduler.request_sync(SyncTrigger::SampleAppended);
        self.emit(CaptureEvent::SampleRecorded {
            sample_id: sample_id.as_i64(),
            captured_at_millis,
        });
        if let Ok(pending) = self.inner.store.count_unsynced().await {
            self.inner
                .event_bus
                .emit(CoreEvent::Sync(SyncEvent::PendingCountChanged { pending }))
                .ok();
        }

        Ok(sample_id)
    }

    async fn run(
        self,
        mut stream: Box<dyn LocationUpdateStream>,
        cancel: CancellationToken,
    ) -> CaptureStats {
        let mut stats = CaptureStats::default();

        let reason = loop {
            let fix = tokio::select! {
                _ = cancel.cancelled() => break None,
                fix = stream.next() => fix,
            };

            let Some(fix) = fix else {
                info!("Location updates ended by provider");
                break Some("location updates ended by provider".to_string());
            };

            match self.record(&fix).await {
                Ok(_) => stats.recorded += 1,
                Err(e) => {
                    stats.dropped += 1;
                    error!(error = %e, "Dropping location fix");
                    self.emit(CaptureEvent::SampleDropped {
                        message: e.to_string(),
                    });
                }
            }
        };

        drop(stream);
        if let Err(e) = self.inner.provider.stop_updates().await {
            warn!(error = %e, "Failed to stop location updates");
        }
        self.inner.running.store(false, Ordering::SeqCst);

        info!(
            recorded = stats.recorded,
            dropped = stats.dropped,
            "Location capture stopped"
        );
        self.emit(CaptureEvent::Stopped { reason });
        stats
    }

    fn emit(&self, event: CaptureEvent) {
        self.inner.event_bus.emit(CoreEvent::Capture(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use chrono::{DateTime, TimeZone, Utc};
    use core_store::{create_test_pool, Sample, SqliteSampleStore, StoreError};
    use mockall::mock;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct ChannelStream(mpsc::UnboundedReceiver<LocationFix>);

    #[async_trait]
    impl LocationUpdateStream for ChannelStream {
        async fn next(&mut self) -> Option<LocationFix> {
            self.0.recv().await
        }
    }

    /// Provider fed through a channel; refuses to start when `refusal` is set
    struct ChannelProvider {
        fixes: Mutex<Option<mpsc::UnboundedReceiver<LocationFix>>>,
        refusal: Option<String>,
        requests: Mutex<Vec<LocationRequest>>,
        stops: Mutex<usize>,
    }

    impl ChannelProvider {
        fn new() -> (Arc<Self>, mpsc::UnboundedSender<LocationFix>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let provider = Arc::new(Self {
                fixes: Mutex::new(Some(rx)),
                refusal: None,
                requests: Mutex::new(Vec::new()),
                stops: Mutex::new(0),
            });
            (provider, tx)
        }

        fn refusing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                fixes: Mutex::new(None),
                refusal: Some(message.to_string()),
                requests: Mutex::new(Vec::new()),
                stops: Mutex::new(0),
            })
        }

        fn stops(&self) -> usize {
            *self.stops.lock().unwrap()
        }
    }

    #[async_trait]
    impl LocationProvider for ChannelProvider {
        async fn start_updates(
            &self,
            request: LocationRequest,
        ) -> bridge_traits::error::Result<Box<dyn LocationUpdateStream>> {
            if let Some(message) = &self.refusal {
                return Err(BridgeError::PermissionDenied(message.clone()));
            }
            self.requests.lock().unwrap().push(request);
            let rx = self
                .fixes
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| BridgeError::NotAvailable("stream consumed".to_string()))?;
            Ok(Box::new(ChannelStream(rx)))
        }

        async fn stop_updates(&self) -> bridge_traits::error::Result<()> {
            *self.stops.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        triggers: Mutex<Vec<SyncTrigger>>,
    }

    impl RecordingScheduler {
        fn triggers(&self) -> Vec<SyncTrigger> {
            self.triggers.lock().unwrap().clone()
        }
    }

    impl SyncScheduler for RecordingScheduler {
        fn request_sync(&self, trigger: SyncTrigger) {
            self.triggers.lock().unwrap().push(trigger);
        }
    }

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.0).unwrap()
        }
    }

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

    fn fix(latitude: f64, speed: Option<f32>) -> LocationFix {
        LocationFix {
            latitude,
            longitude: 2.3522,
            accuracy: 8.0,
            speed,
            provider_time_millis: Some(1),
        }
    }

    fn coordinator(
        provider: Arc<ChannelProvider>,
        store: Arc<dyn SampleStore>,
        scheduler: Arc<RecordingScheduler>,
        bus: EventBus,
    ) -> CaptureCoordinator {
        CaptureCoordinator::new(
            provider,
            store,
            scheduler,
            Arc::new(FixedClock(1_700_000_000_123)),
            bus,
            CaptureConfig::new("EMP001"),
        )
    }

    async fn next_capture_event(
        events: &mut tokio::sync::broadcast::Receiver<CoreEvent>,
    ) -> CaptureEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("timed out waiting for event")
                .unwrap()
            {
                CoreEvent::Capture(event) => return event,
                _ => continue,
            }
        }
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_fixes_become_samples_stamped_with_device_clock() {
        let (provider, fixes) = ChannelProvider::new();
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let scheduler = Arc::new(RecordingScheduler::default());
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let capture = coordinator(provider.clone(), store.clone(), scheduler.clone(), bus);

        let handle = capture.start(CancellationToken::new()).await.unwrap();
        assert!(capture.is_running());
        assert_eq!(
            next_capture_event(&mut events).await,
            CaptureEvent::Started {
                subject_id: "EMP001".to_string()
            }
        );

        fixes.send(fix(48.8566, Some(1.5))).unwrap();
        fixes.send(fix(48.8570, None)).unwrap();

        let CaptureEvent::SampleRecorded {
            sample_id,
            captured_at_millis,
        } = next_capture_event(&mut events).await
        else {
            panic!("expected SampleRecorded");
        };
        assert_eq!(captured_at_millis, 1_700_000_000_123);
        assert!(matches!(
            next_capture_event(&mut events).await,
            CaptureEvent::SampleRecorded { .. }
        ));

        let sample = store.find_by_id(SampleId(sample_id)).await.unwrap().unwrap();
        assert_eq!(sample.subject_id, "EMP001");
        assert_eq!(sample.latitude, 48.8566);
        assert_eq!(sample.speed, Some(1.5));
        assert_eq!(sample.captured_at_millis, 1_700_000_000_123);
        assert!(!sample.synced);

        assert_eq!(
            scheduler.triggers(),
            vec![
                SyncTrigger::Startup,
                SyncTrigger::SampleAppended,
                SyncTrigger::SampleAppended
            ]
        );
        assert_eq!(provider.requests.lock().unwrap()[0], LocationRequest::default());

        let stats = handle.stop_and_wait().await;
        assert_eq!(stats, CaptureStats { recorded: 2, dropped: 0 });
        assert_eq!(store.count_unsynced().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_provider_refusal_reports_stopped_and_does_not_retry() {
        let provider = ChannelProvider::refusing("location permission not granted");
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let scheduler = Arc::new(RecordingScheduler::default());
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let capture = coordinator(provider, store, scheduler.clone(), bus);

        let result = capture.start(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(CaptureError::ProviderUnavailable(BridgeError::PermissionDenied(_)))
        ));
        assert!(!capture.is_running());
        assert!(scheduler.triggers().is_empty());
        match next_capture_event(&mut events).await {
            CaptureEvent::Stopped { reason: Some(reason) } => {
                assert!(reason.contains("location permission not granted"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_append_failure_drops_fix_and_continues() {
        let (provider, fixes) = ChannelProvider::new();
        let mut store = MockStore::new();
        let mut appends = 0;
        store.expect_append().times(2).returning(move |_| {
            appends += 1;
            if appends == 1 {
                Err(StoreError::Migration("disk full".to_string()))
            } else {
                Ok(SampleId(7))
            }
        });
        store.expect_count_unsynced().returning(|| Ok(1));

        let scheduler = Arc::new(RecordingScheduler::default());
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let capture = coordinator(provider, Arc::new(store), scheduler.clone(), bus);

        let handle = capture.start(CancellationToken::new()).await.unwrap();
        next_capture_event(&mut events).await;

        fixes.send(fix(10.0, None)).unwrap();
        fixes.send(fix(11.0, None)).unwrap();

        assert!(matches!(
            next_capture_event(&mut events).await,
            CaptureEvent::SampleDropped { message } if message.contains("disk full")
        ));
        assert!(matches!(
            next_capture_event(&mut events).await,
            CaptureEvent::SampleRecorded { sample_id: 7, .. }
        ));

        let stats = handle.stop_and_wait().await;
        assert_eq!(stats, CaptureStats { recorded: 1, dropped: 1 });
        // Only the persisted fix asked for a sync
        assert_eq!(
            scheduler.triggers(),
            vec![SyncTrigger::Startup, SyncTrigger::SampleAppended]
        );
    }

    #[tokio::test]
    async fn test_invalid_fix_is_dropped() {
        let (provider, fixes) = ChannelProvider::new();
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let capture = coordinator(
            provider,
            store.clone(),
            Arc::new(RecordingScheduler::default()),
            bus,
        );

        let handle = capture.start(CancellationToken::new()).await.unwrap();
        next_capture_event(&mut events).await;
        fixes.send(fix(120.0, None)).unwrap();

        assert!(matches!(
            next_capture_event(&mut events).await,
            CaptureEvent::SampleDropped { .. }
        ));
        handle.stop_and_wait().await;
        assert_eq!(store.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_provider() {
        let (provider, _fixes) = ChannelProvider::new();
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let capture = coordinator(
            provider.clone(),
            store,
            Arc::new(RecordingScheduler::default()),
            bus,
        );

        let shutdown = CancellationToken::new();
        let handle = capture.start(shutdown.clone()).await.unwrap();
        next_capture_event(&mut events).await;

        shutdown.cancel();
        handle.wait().await;

        assert_eq!(provider.stops(), 1);
        assert!(!capture.is_running());
        assert_eq!(
            next_capture_event(&mut events).await,
            CaptureEvent::Stopped { reason: None }
        );
    }

    #[tokio::test]
    async fn test_stream_end_stops_capture_with_reason() {
        let (provider, fixes) = ChannelProvider::new();
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let capture = coordinator(
            provider.clone(),
            store,
            Arc::new(RecordingScheduler::default()),
            bus,
        );

        let handle = capture.start(CancellationToken::new()).await.unwrap();
        next_capture_event(&mut events).await;
        drop(fixes);

        handle.wait().await;
        assert_eq!(provider.stops(), 1);
        assert!(matches!(
            next_capture_event(&mut events).await,
            CaptureEvent::Stopped { reason: Some(_) }
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (provider, _fixes) = ChannelProvider::new();
        let store = Arc::new(SqliteSampleStore::new(create_test_pool().await.unwrap()));
        let capture = coordinator(
            provider,
            store,
            Arc::new(RecordingScheduler::default()),
            EventBus::new(16),
        );

        let handle = capture.start(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            capture.start(CancellationToken::new()).await,
            Err(CaptureError::AlreadyRunning)
        ));
        handle.stop_and_wait().await;
        assert!(!capture.is_running());
    }
}
