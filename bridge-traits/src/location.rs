//! Location Provider Abstraction
//!
//! Periodic location fixes delivered by the host positioning service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Default interval between fixes
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Default lower bound on the spacing of fixes
pub const DEFAULT_FASTEST_INTERVAL: Duration = Duration::from_secs(5);

/// Accuracy/power trade-off requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPriority {
    HighAccuracy,
    Balanced,
    LowPower,
}

/// Parameters handed to the provider when updates start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    /// Desired interval between fixes
    pub interval: Duration,
    /// Fixes arriving faster than this may be throttled by the provider
    pub fastest_interval: Duration,
    pub priority: LocationPriority,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval: DEFAULT_UPDATE_INTERVAL,
            fastest_interval: DEFAULT_FASTEST_INTERVAL,
            priority: LocationPriority::HighAccuracy,
        }
    }
}

/// A single position reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f32,
    /// Speed in m/s, when the provider knows it
    #[serde(default)]
    pub speed: Option<f32>,
    /// Provider-side fix time; informational only
    #[serde(default)]
    pub provider_time_millis: Option<i64>,
}

/// Location provider trait
///
/// # Platform Support
///
/// - **Android**: FusedLocationProviderClient
/// - **iOS**: CLLocationManager
/// - **Desktop**: file replay (`bridge-desktop`)
///
/// # Errors
///
/// `start_updates` returns [`BridgeError::PermissionDenied`](crate::BridgeError::PermissionDenied)
/// when the host has not granted location access, and
/// [`BridgeError::NotAvailable`](crate::BridgeError::NotAvailable) when no positioning
/// source exists.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Begin delivering fixes according to `request`
    async fn start_updates(&self, request: LocationRequest)
        -> Result<Box<dyn LocationUpdateStream>>;

    /// Stop delivering fixes; idempotent
    async fn stop_updates(&self) -> Result<()>;
}

/// Stream of location fixes
#[async_trait]
pub trait LocationUpdateStream: Send {
    /// Next fix, or `None` once the provider has stopped or access was revoked
    async fn next(&mut self) -> Option<LocationFix>;
}
