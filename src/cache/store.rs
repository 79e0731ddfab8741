//! Cache storage backends.
//!
//! A single trait covers every backend so callers never depend on the
//! implementation: the in-memory default here, or a durable store swapped in
//! by the host. Entries expire lazily — the read that discovers a stale entry
//! removes it; there is no background sweeper.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::util::lock::{rw_read, rw_write};

use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {message}")]
    Backend { message: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Uniform expiring key/value contract shared by every backend.
///
/// `set` without a TTL falls back to the store-wide default and always
/// overwrites (last write wins). `clear` must be safe against concurrent
/// reads and writes; the in-memory store satisfies that by swapping the
/// backing map in one step rather than deleting incrementally.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, item: Value, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn destroy(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
    async fn count(&self) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    item: Value,
    expires_at: OffsetDateTime,
}

impl CacheEntry {
    fn expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// In-memory cache backend.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl: config.default_ttl(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = OffsetDateTime::now_utc();

        let expired = {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                None => {
                    counter!("mosaico_cache_miss_total").increment(1);
                    return Ok(None);
                }
                Some(entry) if entry.expired(now) => true,
                Some(entry) => {
                    counter!("mosaico_cache_hit_total").increment(1);
                    return Ok(Some(entry.item.clone()));
                }
            }
        };

        if expired {
            // Lazy eviction: drop the stale entry on the read that found it.
            // Re-check under the write lock in case a concurrent set renewed it.
            let mut entries = rw_write(&self.entries, SOURCE, "get.evict");
            if entries.get(key).is_some_and(|entry| entry.expired(now)) {
                entries.remove(key);
                debug!(cache_key = key, "Evicted expired cache entry");
                counter!("mosaico_cache_expired_total").increment(1);
            }
        }
        counter!("mosaico_cache_miss_total").increment(1);
        Ok(None)
    }

    async fn set(&self, key: &str, item: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            item,
            expires_at: OffsetDateTime::now_utc() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").insert(key.to_string(), entry);
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "destroy").remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let dropped = {
            let mut entries = rw_write(&self.entries, SOURCE, "clear");
            std::mem::take(&mut *entries)
        };
        debug!(entries = dropped.len(), "Cleared cache store");
        Ok(())
    }

    async fn count(&self) -> Result<usize, CacheError> {
        let now = OffsetDateTime::now_utc();
        let entries = rw_read(&self.entries, SOURCE, "count");
        Ok(entries.values().filter(|entry| !entry.expired(now)).count())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(&CacheConfig::default())
    }

    #[tokio::test]
    async fn round_trip_with_positive_ttl() {
        let store = store();
        store
            .set("k", json!({"body": "hello"}), Some(Duration::seconds(30)))
            .await
            .expect("set");

        let item = store.get("k").await.expect("get").expect("present");
        assert_eq!(item, json!({"body": "hello"}));
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn missing_key_reads_absent() {
        let store = store();
        assert!(store.get("nope").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn already_expired_entry_is_absent_and_uncounted() {
        let store = store();
        store
            .set("stale", json!("old"), Some(Duration::seconds(-1)))
            .await
            .expect("set");

        assert!(store.get("stale").await.expect("get").is_none());
        assert_eq!(store.count().await.expect("count"), 0);

        // The discovering read removed the entry outright.
        let entries = store.entries.read().expect("lock");
        assert!(!entries.contains_key("stale"));
    }

    #[tokio::test]
    async fn set_overwrites_unconditionally() {
        let store = store();
        store.set("k", json!(1), None).await.expect("set");
        store.set("k", json!(2), None).await.expect("set");

        let item = store.get("k").await.expect("get").expect("present");
        assert_eq!(item, json!(2));
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn destroy_and_clear() {
        let store = store();
        store.set("a", json!(1), None).await.expect("set");
        store.set("b", json!(2), None).await.expect("set");

        store.destroy("a").await.expect("destroy");
        assert!(store.get("a").await.expect("get").is_none());
        assert_eq!(store.count().await.expect("count"), 1);

        store.clear().await.expect("clear");
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn default_ttl_applies_when_omitted() {
        let config = CacheConfig {
            default_ttl_seconds: -1,
            ..Default::default()
        };
        let store = MemoryStore::new(&config);
        store.set("k", json!("x"), None).await.expect("set");
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let store = store();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock");
            panic!("poison entries lock");
        }));

        store.set("k", json!("v"), None).await.expect("set");
        assert!(store.get("k").await.expect("get").is_some());
    }
}
