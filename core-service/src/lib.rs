//! Tracking agent façade and bootstrap.
//!
//! This crate wires host-provided bridge implementations (location provider,
//! HTTP, settings, network monitor, clock) into the capture and sync cores.
//! Desktop hosts typically enable the `desktop-shims` feature, which fills in
//! `bridge-desktop` adapters for any HTTP client or settings store the
//! configuration leaves out.
//!
//! ```rust,ignore
//! let agent = TrackingAgent::bootstrap(config).await?;
//! agent.start().await?;
//! agent.start_tracking().await?;
//! // ...
//! agent.shutdown().await;
//! ```

pub mod error;
pub mod preferences;

pub use error::{CoreError, Result};
pub use preferences::{TrackingPreferences, TRACKING_ENABLED_KEY};

use bridge_traits::http::HttpClient;
use bridge_traits::network::NetworkMonitor;
use bridge_traits::storage::SettingsStore;
use core_capture::{CaptureConfig, CaptureCoordinator, CaptureHandle};
use core_runtime::config::AgentConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, TrackingEvent};
use core_store::{create_pool, DatabaseConfig, SampleStore, SqliteSampleStore};
use core_sync::{
    CollectorUploadClient, ConnectivityWatcher, SyncAttempt, SyncEngine, SyncEngineConfig,
    SyncState, SyncTrigger,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Snapshot for host UIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    pub tracking_enabled: bool,
    pub capture_running: bool,
    pub online: bool,
    pub pending_count: u64,
    pub sync_state: SyncState,
    pub consecutive_failures: u32,
}

#[derive(Default)]
struct AgentTasks {
    started: bool,
    engine: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    capture: Option<CaptureHandle>,
}

/// Primary façade exposed to host applications.
pub struct TrackingAgent {
    engine: SyncEngine,
    capture: CaptureCoordinator,
    preferences: TrackingPreferences,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    store: Arc<dyn SampleStore>,
    event_bus: EventBus,
    pool: SqlitePool,
    shutdown: CancellationToken,
    tasks: Mutex<AgentTasks>,
}

impl TrackingAgent {
    /// Validate `config`, open the sample queue and wire the engine and capture
    ///
    /// Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// - Invalid configuration
    /// - [`CoreError::CapabilityMissing`] when an HTTP client or settings store
    ///   is required but `desktop-shims` is disabled
    /// - The database cannot be opened or migrated
    #[instrument(skip(config), fields(subject_id = %config.subject_id))]
    pub async fn bootstrap(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let http_client = match config.http_client.clone() {
            Some(client) => client,
            None => default_http_client(&config)?,
        };
        let settings_store = match config.settings_store.clone() {
            Some(store) => store,
            None => default_settings_store(&config).await?,
        };

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let store: Arc<dyn SampleStore> = Arc::new(SqliteSampleStore::new(pool.clone()));
        let event_bus = EventBus::new(config.event_buffer_size);

        let uploader = CollectorUploadClient::new(http_client, config.collector_url.clone())
            .with_token(config.collector_token.clone())
            .with_timeout(config.sync.upload_timeout);
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(uploader),
            event_bus.clone(),
            SyncEngineConfig::from_settings(&config.sync)?,
        );

        let capture = CaptureCoordinator::new(
            config.location_provider.clone(),
            store.clone(),
            Arc::new(engine.clone()),
            config.clock.clone(),
            event_bus.clone(),
            CaptureConfig::new(config.subject_id.clone())
                .with_request(config.location_request.clone()),
        );

        info!(
            database = ?config.database_path,
            collector = %config.collector_url,
            "Tracking agent bootstrapped"
        );

        Ok(Self {
            engine,
            capture,
            preferences: TrackingPreferences::new(settings_store),
            network_monitor: config.network_monitor.clone(),
            store,
            event_bus,
            pool,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(AgentTasks::default()),
        })
    }

    /// Start the sync worker and connectivity watcher, request a startup drain,
    /// then resume capture if tracking was on before the last shutdown
    ///
    /// Calling it again is a no-op. A provider that refuses to resume is
    /// reported through events; the agent keeps running.
    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.started {
            debug!("Tracking agent already started");
            return Ok(());
        }

        tasks.engine = Some(self.engine.spawn(self.shutdown.child_token()));
        match &self.network_monitor {
            Some(monitor) => {
                let watcher = ConnectivityWatcher::new(
                    monitor.clone(),
                    self.engine.clone(),
                    self.event_bus.clone(),
                );
                tasks.watcher = Some(watcher.spawn(self.shutdown.child_token()));
            }
            None => debug!("No network monitor configured, assuming online"),
        }
        tasks.started = true;

        // Backlog left by the previous run drains whether or not capture resumes
        self.engine.request_sync(SyncTrigger::Startup);

        if self.preferences.is_tracking_enabled().await? {
            match self.capture.start(self.shutdown.child_token()).await {
                Ok(handle) => {
                    info!("Resumed tracking after restart");
                    tasks.capture = Some(handle);
                    self.emit(TrackingEvent::Resumed);
                }
                Err(e) => warn!(error = %e, "Failed to resume tracking"),
            }
        }

        Ok(())
    }

    /// Switch tracking on and persist the choice
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Capture`] when the provider is unavailable; the
    /// persisted preference is left unchanged.
    pub async fn start_tracking(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;

        if !self.capture.is_running() {
            tasks.capture = None;
            let handle = self.capture.start(self.shutdown.child_token()).await?;
            tasks.capture = Some(handle);
        }

        if let Err(e) = self.preferences.set_tracking_enabled(true).await {
            if let Some(handle) = tasks.capture.take() {
                handle.stop_and_wait().await;
            }
            return Err(e);
        }

        info!("Tracking enabled");
        self.emit(TrackingEvent::Enabled);
        Ok(())
    }

    /// Switch tracking off, persist the choice and wait for capture to stop
    pub async fn stop_tracking(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        self.preferences.set_tracking_enabled(false).await?;

        if let Some(handle) = tasks.capture.take() {
            let stats = handle.stop_and_wait().await;
            debug!(recorded = stats.recorded, dropped = stats.dropped, "Capture run ended");
        }

        info!("Tracking disabled");
        self.emit(TrackingEvent::Disabled);
        Ok(())
    }

    /// Drain now, ignoring any pending backoff; `None` while offline
    pub async fn sync_now(&self) -> Option<SyncAttempt> {
        self.engine.sync_now().await
    }

    pub async fn status(&self) -> Result<AgentStatus> {
        Ok(AgentStatus {
            tracking_enabled: self.preferences.is_tracking_enabled().await?,
            capture_running: self.capture.is_running(),
            online: self.engine.is_online(),
            pending_count: self.store.count_unsynced().await?,
            sync_state: self.engine.state(),
            consecutive_failures: self.engine.consecutive_failures(),
        })
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Stop capture and the workers and close the database
    ///
    /// The persisted tracking preference is kept, so the next process start
    /// resumes. The agent cannot be started again afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.capture.take() {
            handle.wait().await;
        }
        let workers = [("engine", tasks.engine.take()), ("watcher", tasks.watcher.take())];
        for (name, handle) in workers {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!(task = name, error = %e, "Worker ended abnormally");
                }
            }
        }

        self.pool.close().await;
        info!("Tracking agent shut down");
    }

    fn emit(&self, event: TrackingEvent) {
        self.event_bus.emit(CoreEvent::Tracking(event)).ok();
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client(config: &AgentConfig) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.sync.upload_timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client(_config: &AgentConfig) -> Result<Arc<dyn HttpClient>> {
    Err(CoreError::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "Provide an HttpClient in AgentConfig or enable the desktop-shims feature."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
async fn default_settings_store(config: &AgentConfig) -> Result<Arc<dyn SettingsStore>> {
    let path = config.database_path.with_file_name("settings.db");
    let store = bridge_desktop::SqliteSettingsStore::new(path).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
async fn default_settings_store(_config: &AgentConfig) -> Result<Arc<dyn SettingsStore>> {
    Err(CoreError::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "Provide a SettingsStore in AgentConfig or enable the desktop-shims feature."
            .to_string(),
    })
}
