//! # Agent Configuration
//!
//! Builder-validated configuration for the tracking agent.
//!
//! ## Overview
//!
//! `AgentConfig` carries the settings and host bridges the agent needs. The
//! builder fails fast: a missing required value or capability is reported when
//! `build()` is called, not when a background task first needs it.
//!
//! ## Required
//!
//! - `database_path` - SQLite file holding the sample queue
//! - `collector_url` - Endpoint receiving sample batches (`http`/`https`)
//! - `subject_id` - Identity stamped on every sample
//! - `LocationProvider` - Source of fixes
//!
//! ## Optional
//!
//! - `HttpClient`, `SettingsStore` - desktop defaults are provided at bootstrap when
//!   the `desktop-shims` feature of `core-service` is enabled
//! - `NetworkMonitor` - without one the agent assumes it is always online
//! - `Clock` - defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AgentConfig;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::builder()
//!     .database_path("/var/lib/geotrack/samples.db")
//!     .collector_url("https://collector.example.com/v1/samples")
//!     .subject_id("EMP001")
//!     .location_provider(Arc::new(MyGpsProvider::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, LocationProvider, LocationRequest, NetworkMonitor, SettingsStore,
    SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// First retry delay after a failed upload
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(10);
/// Upper bound for any retry delay
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(5 * 60 * 60);
pub const DEFAULT_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry and scheduling knobs of the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    /// Coarse safety-net trigger; `None` disables it
    pub periodic_interval: Option<Duration>,
    /// Per-request timeout of an upload
    pub upload_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            periodic_interval: Some(DEFAULT_PERIODIC_INTERVAL),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.backoff_base.is_zero() {
            return Err(Error::Config(
                "Backoff base delay must be greater than zero".to_string(),
            ));
        }
        if self.backoff_ceiling < self.backoff_base {
            return Err(Error::Config(format!(
                "Backoff ceiling ({:?}) must not be below the base delay ({:?})",
                self.backoff_ceiling, self.backoff_base
            )));
        }
        if matches!(self.periodic_interval, Some(interval) if interval.is_zero()) {
            return Err(Error::Config(
                "Periodic sync interval must be greater than zero; use None to disable it"
                    .to_string(),
            ));
        }
        if self.upload_timeout.is_zero() {
            return Err(Error::Config(
                "Upload timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the tracking agent.
///
/// Use [`AgentConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct AgentConfig {
    pub database_path: PathBuf,
    pub collector_url: String,
    /// Bearer token sent with every upload
    pub collector_token: Option<String>,
    pub subject_id: String,
    pub location_provider: Arc<dyn LocationProvider>,
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub settings_store: Option<Arc<dyn SettingsStore>>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub clock: Arc<dyn Clock>,
    /// Handed to the location provider unchanged
    pub location_request: LocationRequest,
    pub sync: SyncSettings,
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("database_path", &self.database_path)
            .field("collector_url", &self.collector_url)
            .field(
                "collector_token",
                &self.collector_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("subject_id", &self.subject_id)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "settings_store",
                &self.settings_store.as_ref().map(|_| "SettingsStore { ... }"),
            )
            .field(
                "network_monitor",
                &self.network_monitor.as_ref().map(|_| "NetworkMonitor { ... }"),
            )
            .field("location_request", &self.location_request)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path and subject id are not empty
    /// - Collector URL uses http or https and names a host
    /// - Capture intervals are positive and consistent
    /// - Sync settings are consistent
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.subject_id.trim().is_empty() {
            return Err(Error::Config("Subject id cannot be empty".to_string()));
        }

        validate_collector_url(&self.collector_url)?;

        if self.location_request.interval.is_zero() {
            return Err(Error::Config(
                "Location update interval must be greater than zero".to_string(),
            ));
        }
        if self.location_request.fastest_interval > self.location_request.interval {
            return Err(Error::Config(
                "Fastest location interval cannot exceed the update interval".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        self.sync.validate()
    }
}

fn validate_collector_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            Error::Config(format!(
                "Collector URL must start with http:// or https://, got {:?}",
                url
            ))
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(Error::Config(format!(
            "Collector URL has no host: {:?}",
            url
        )));
    }
    Ok(())
}

fn location_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "LocationProvider".to_string(),
        message: "A LocationProvider implementation is required to capture samples. \
                 Android: inject a FusedLocationProviderClient adapter. \
                 Desktop: use bridge_desktop::ReplayLocationProvider with a fix file."
            .to_string(),
    }
}

/// Builder for [`AgentConfig`].
#[derive(Default)]
pub struct AgentConfigBuilder {
    database_path: Option<PathBuf>,
    collector_url: Option<String>,
    collector_token: Option<String>,
    subject_id: Option<String>,
    location_provider: Option<Arc<dyn LocationProvider>>,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    location_request: Option<LocationRequest>,
    sync: Option<SyncSettings>,
    event_buffer_size: Option<usize>,
}

impl AgentConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = Some(url.into());
        self
    }

    pub fn collector_token(mut self, token: impl Into<String>) -> Self {
        self.collector_token = Some(token.into());
        self
    }

    pub fn subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn location_provider(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.location_provider = Some(provider);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn location_request(mut self, request: LocationRequest) -> Self {
        self.location_request = Some(request);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validate and assemble the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for missing or invalid settings,
    /// [`Error::CapabilityMissing`] when no location provider was injected.
    pub fn build(self) -> Result<AgentConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let collector_url = self.collector_url.ok_or_else(|| {
            Error::Config("Collector URL is required. Use .collector_url() to set it.".to_string())
        })?;

        let subject_id = self.subject_id.ok_or_else(|| {
            Error::Config("Subject id is required. Use .subject_id() to set it.".to_string())
        })?;

        let location_provider = self
            .location_provider
            .ok_or_else(location_provider_missing_error)?;

        let config = AgentConfig {
            database_path,
            collector_url,
            collector_token: self.collector_token.filter(|t| !t.is_empty()),
            subject_id,
            location_provider,
            http_client: self.http_client,
            settings_store: self.settings_store,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            location_request: self.location_request.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}
