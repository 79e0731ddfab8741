//! Cache tuning knobs.

use serde::Deserialize;
use time::Duration;

const DEFAULT_TTL_SECONDS: i64 = 300;
const DEFAULT_PREFIX: &str = "mosaico";

/// Cache behavior configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable block caching. When disabled the engine still constructs the
    /// store so callers keep a uniform surface, but modules skip it.
    pub enabled: bool,
    /// Default time-to-live applied when `set` is called without a TTL.
    pub default_ttl_seconds: i64,
    /// Namespace prefix baked into every cache key.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::seconds(self.default_ttl_seconds)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_seconds: settings.default_ttl_seconds,
            prefix: settings.prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl_seconds, 300);
        assert_eq!(config.prefix, "mosaico");
    }

    #[test]
    fn default_ttl_is_seconds() {
        let config = CacheConfig {
            default_ttl_seconds: 60,
            ..Default::default()
        };
        assert_eq!(config.default_ttl(), Duration::seconds(60));
    }
}
