use bridge_traits::error::BridgeError;
use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The provider refused to start, e.g. location permission missing
    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(#[source] BridgeError),

    #[error("Capture is already running")]
    AlreadyRunning,

    #[error("Failed to persist sample: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
