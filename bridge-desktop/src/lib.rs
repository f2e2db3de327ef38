//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, one attempt per request
//! - `NetworkMonitor` using a TCP reachability probe
//! - `SettingsStore` using an SQLite-backed key-value table
//! - `LocationProvider` replaying fixes from a newline-delimited JSON file
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = SqliteSettingsStore::new(default_data_dir().join("settings.db")).await?;
//!     let network = DesktopNetworkMonitor::new();
//!     // Hand them to AgentConfig::builder()
//!     Ok(())
//! }
//! ```

mod http;
mod location;
mod network;
mod settings;

pub use http::ReqwestHttpClient;
pub use location::ReplayLocationProvider;
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;

use std::path::PathBuf;

/// Per-user data directory for agent state, `./geotrack` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("geotrack"))
        .unwrap_or_else(|| PathBuf::from("geotrack"))
}
