//! Workspace umbrella crate.
//!
//! Re-exports the tracking agent so host applications can depend on
//! `geotrack-workspace` alone. The default `desktop-shims` feature pulls in the
//! desktop bridge adapters and the `geotrackd` daemon binary.

#[cfg(feature = "desktop-shims")]
pub use core_service::{AgentStatus, CoreError, TrackingAgent, TrackingPreferences};

pub use core_runtime::config::{AgentConfig, AgentConfigBuilder, SyncSettings};
pub use core_runtime::events::{CoreEvent, EventBus};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{
    default_data_dir, DesktopNetworkMonitor, ReplayLocationProvider, ReqwestHttpClient,
    SqliteSettingsStore,
};
