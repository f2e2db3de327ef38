//! Network Monitoring Abstraction
//!
//! Connectivity status and a stream of transitions, used to gate uploads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// A usable network is available
    Connected,
    /// No network is available
    Disconnected,
    /// Connectivity could not be determined (treated as offline)
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn connected(network_type: Option<NetworkType>) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type,
            is_metered: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == NetworkStatus::Connected
    }
}

/// Network monitor trait
///
/// Uploads run only while the monitor reports [`NetworkStatus::Connected`].
///
/// # Platform Support
///
/// - **Desktop**: reachability probe (`bridge-desktop`)
/// - **Android**: ConnectivityManager network callbacks
/// - **iOS**: NWPathMonitor
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(self.get_network_info().await, Ok(info) if info.is_online())
    }

    /// Subscribe to network status changes
    ///
    /// Implementations emit an item whenever the status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connected_is_online() {
        assert!(NetworkInfo::connected(Some(NetworkType::WiFi)).is_online());
        assert!(!NetworkInfo::disconnected().is_online());

        let unknown = NetworkInfo {
            status: NetworkStatus::Indeterminate,
            network_type: None,
            is_metered: false,
        };
        assert!(!unknown.is_online());
    }
}
