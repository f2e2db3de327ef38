//! Location replay from a fix file
//!
//! Desktop hosts have no positioning hardware. `ReplayLocationProvider` reads a
//! newline-delimited JSON file of [`LocationFix`] records and delivers them at the
//! requested interval, which is enough to drive the agent end to end.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    location::{LocationFix, LocationProvider, LocationRequest, LocationUpdateStream},
};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ReplayLocationProvider {
    path: PathBuf,
    active: Mutex<Option<CancellationToken>>,
}

impl ReplayLocationProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<VecDeque<LocationFix>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BridgeError::NotAvailable(format!(
                    "Fix file {} does not exist",
                    self.path.display()
                )),
                ErrorKind::PermissionDenied => BridgeError::PermissionDenied(format!(
                    "Cannot read fix file {}",
                    self.path.display()
                )),
                _ => BridgeError::Io(e),
            })?;

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<LocationFix>(line).map_err(|e| {
                    BridgeError::OperationFailed(format!(
                        "Invalid fix on line {} of {}: {}",
                        index + 1,
                        self.path.display(),
                        e
                    ))
                })
            })
            .collect()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LocationProvider for ReplayLocationProvider {
    async fn start_updates(
        &self,
        request: LocationRequest,
    ) -> Result<Box<dyn LocationUpdateStream>> {
        let fixes = self.load().await?;
        let token = CancellationToken::new();

        if let Some(previous) = self.lock_active().replace(token.clone()) {
            previous.cancel();
        }

        info!(
            path = %self.path.display(),
            fixes = fixes.len(),
            interval_ms = request.interval.as_millis() as u64,
            "Replaying location fixes"
        );

        Ok(Box::new(ReplayStream {
            fixes,
            interval: request.interval,
            delivered: 0,
            token,
        }))
    }

    async fn stop_updates(&self) -> Result<()> {
        if let Some(token) = self.lock_active().take() {
            token.cancel();
            debug!(path = %self.path.display(), "Replay stopped");
        }
        Ok(())
    }
}

struct ReplayStream {
    fixes: VecDeque<LocationFix>,
    interval: Duration,
    delivered: u64,
    token: CancellationToken,
}

#[async_trait]
impl LocationUpdateStream for ReplayStream {
    async fn next(&mut self) -> Option<LocationFix> {
        if self.token.is_cancelled() {
            return None;
        }

        // First fix is immediate, later ones are paced
        if self.delivered > 0 {
            tokio::select! {
                _ = self.token.cancelled() => return None,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        let fix = self.fixes.pop_front()?;
        self.delivered += 1;
        Some(fix)
    }
}
