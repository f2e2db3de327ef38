//! Persisted tracking switch
//!
//! Survives restarts so capture resumes at boot when it was on.

use crate::Result;
use bridge_traits::storage::SettingsStore;
use std::sync::Arc;

pub const TRACKING_ENABLED_KEY: &str = "tracking.enabled";

#[derive(Clone)]
pub struct TrackingPreferences {
    store: Arc<dyn SettingsStore>,
}

impl TrackingPreferences {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// `false` until tracking was switched on once
    pub async fn is_tracking_enabled(&self) -> Result<bool> {
        Ok(self
            .store
            .get_bool(TRACKING_ENABLED_KEY)
            .await?
            .unwrap_or(false))
    }

    pub async fn set_tracking_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set_bool(TRACKING_ENABLED_KEY, enabled).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
            self.set_string(key, &value.to_string()).await
        }

        async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
            match self.get_string(key).await? {
                Some(value) => value
                    .parse()
                    .map(Some)
                    .map_err(|_| BridgeError::Storage(format!("{} is not a bool", key))),
                None => Ok(None),
            }
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tracking_defaults_to_off() {
        let preferences = TrackingPreferences::new(Arc::new(MemorySettings::default()));
        assert!(!preferences.is_tracking_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_tracking_switch_is_persisted_under_key() {
        let settings = Arc::new(MemorySettings::default());
        let preferences = TrackingPreferences::new(settings.clone());

        preferences.set_tracking_enabled(true).await.unwrap();
        assert!(preferences.is_tracking_enabled().await.unwrap());
        assert_eq!(
            settings.get_bool(TRACKING_ENABLED_KEY).await.unwrap(),
            Some(true)
        );

        preferences.set_tracking_enabled(false).await.unwrap();
        assert!(!preferences.is_tracking_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let settings = Arc::new(MemorySettings::default());
        settings
            .set_string(TRACKING_ENABLED_KEY, "maybe")
            .await
            .unwrap();

        let preferences = TrackingPreferences::new(settings);
        assert!(preferences.is_tracking_enabled().await.is_err());
    }
}
