//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Desktop network monitor implementation
///
/// Connectivity is a TCP connect to a well-known address. Platform APIs
/// (netlink, SystemConfiguration, Network List Manager) would give push
/// notifications instead of polling but need extra dependencies.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Probe a different `host:port`, e.g. the collector itself
    pub fn with_probe(mut self, addr: impl Into<String>, timeout: Duration) -> Self {
        self.probe_addr = addr.into();
        self.probe_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, probe = %self.probe_addr, "Network probe finished");

        Ok(match status {
            // The probe cannot tell WiFi from Ethernet
            NetworkStatus::Connected => NetworkInfo::connected(Some(NetworkType::Other)),
            _ => NetworkInfo::disconnected(),
        })
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Polls the probe and yields only on status changes; the first poll always yields.
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if self.last_status.is_some() {
                tokio::time::sleep(self.monitor.poll_interval).await;
            }

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn probing(addr: std::net::SocketAddr) -> DesktopNetworkMonitor {
        DesktopNetworkMonitor::new()
            .with_probe(addr.to_string(), Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_reachable_probe_is_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let monitor = probing(listener.local_addr().unwrap());

        let info = monitor.get_network_info().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Connected);
        assert!(monitor.is_connected().await);
    }

    #[tokio::test]
    async fn test_refused_probe_is_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor = probing(addr);
        assert_eq!(
            monitor.get_network_info().await.unwrap().status,
            NetworkStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn test_change_stream_reports_transition() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let monitor = probing(listener.local_addr().unwrap());
        let mut changes = monitor.subscribe_changes().await.unwrap();

        let first = changes.next().await.unwrap();
        assert!(first.is_online());

        drop(listener);
        let second = tokio::time::timeout(Duration::from_secs(5), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.status, NetworkStatus::Disconnected);
    }
}
