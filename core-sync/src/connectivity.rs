//! Connectivity watcher
//!
//! Forwards [`NetworkMonitor`] changes into the engine. Anything other than
//! `Connected`, including `Indeterminate`, counts as offline.

use crate::engine::SyncEngine;
use bridge_traits::network::{NetworkInfo, NetworkMonitor};
use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ConnectivityWatcher {
    monitor: Arc<dyn NetworkMonitor>,
    engine: SyncEngine,
    event_bus: EventBus,
}

impl ConnectivityWatcher {
    pub fn new(monitor: Arc<dyn NetworkMonitor>, engine: SyncEngine, event_bus: EventBus) -> Self {
        Self {
            monitor,
            engine,
            event_bus,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Apply the current status, then follow changes until shutdown or the
    /// monitor's stream ends
    pub async fn run(self, shutdown: CancellationToken) {
        match self.monitor.get_network_info().await {
            Ok(info) => self.apply(&info),
            Err(e) => warn!(error = %e, "Failed to read initial network status"),
        }

        let mut changes = match self.monitor.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, "Network change notifications unavailable");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = changes.next() => match change {
                    Some(info) => self.apply(&info),
                    None => {
                        info!("Network change stream ended");
                        break;
                    }
                },
            }
        }
    }

    fn apply(&self, info: &NetworkInfo) {
        let online = info.is_online();
        if self.engine.is_online() == online {
            return;
        }

        info!(online, network_type = ?info.network_type, "Connectivity changed");
        self.engine.set_online(online);
        self.event_bus
            .emit(CoreEvent::Connectivity(ConnectivityEvent::StatusChanged {
                online,
            }))
            .ok();
    }
}
