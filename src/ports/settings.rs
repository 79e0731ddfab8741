//! Runtime settings port.
//!
//! Environment-scoped settings modules may read and administrators may
//! change at runtime: the active theme, cache TTL overrides, and whatever a
//! module stores under its own keys. Distinct from the static deployment
//! configuration loaded at startup.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "ports::settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings backend unavailable: {message}")]
    Backend { message: String },
}

impl SettingsError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;
    /// Flush pending changes to the backing medium.
    async fn save(&self) -> Result<(), SettingsError>;
}

/// In-memory settings store seeded from the static configuration.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let values = rw_read(&self.values, SOURCE, "get");
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut values = rw_write(&self.values, SOURCE, "set");
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn save(&self) -> Result<(), SettingsError> {
        // Memory-backed: nothing to flush.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn get_set_round_trip() {
        let settings = MemorySettings::new();
        assert!(settings.get("theme").await.expect("get").is_none());

        settings
            .set("theme", json!("dark"))
            .await
            .expect("set");
        assert_eq!(
            settings.get("theme").await.expect("get"),
            Some(json!("dark"))
        );
        settings.save().await.expect("save");
    }

    #[tokio::test]
    async fn seeded_values_are_visible() {
        let mut seed = BTreeMap::new();
        seed.insert("site.title".to_string(), json!("Mosaico"));
        let settings = MemorySettings::seeded(seed);

        assert_eq!(
            settings.get("site.title").await.expect("get"),
            Some(json!("Mosaico"))
        );
    }
}
