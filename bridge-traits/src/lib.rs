//! # Host Bridge Traits
//!
//! Capabilities the tracking core needs from the host it runs on.
//!
//! ## Overview
//!
//! The core never talks to a GPS chip, a socket or the OS preference store directly.
//! Each of those is a trait defined here and implemented per host: `bridge-desktop`
//! ships adapters for desktop and server builds, mobile hosts inject their own.
//!
//! ## Traits
//!
//! ### Capture
//! - [`LocationProvider`](location::LocationProvider) - Periodic location fixes
//!
//! ### Delivery
//! - [`HttpClient`](http::HttpClient) - One-shot HTTP requests to the collector
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity status and transitions
//!
//! ### Persistence
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences (tracking switch)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! A required capability that the host did not provide is reported at bootstrap as
//! `CapabilityMissing`, never discovered later in a background task:
//!
//! ```ignore
//! let provider = config.location_provider
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "LocationProvider".to_string(),
//!         message: "Inject the platform location adapter.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across tasks
//! behind an `Arc`.

pub mod error;
pub mod http;
pub mod location;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use location::{
    LocationFix, LocationPriority, LocationProvider, LocationRequest, LocationUpdateStream,
};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::SettingsStore;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
