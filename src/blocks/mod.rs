//! Per-request block accumulation.
//!
//! Module handlers write rendered fragments into named blocks; the dispatch
//! loop later composes the response from those regions. The accumulator is
//! scoped to one request and dropped with it — nothing here survives the
//! request unless a handler persists it through the cache store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheBackend;
use crate::domain::block::{BlockName, BlockPattern};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "blocks";

/// Structured descriptor recorded alongside a rendered fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPiece {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Default)]
struct BlockContent {
    fragments: Vec<String>,
    pieces: Vec<BlockPiece>,
}

/// Cached block payload: the joined content plus the layout hint the original
/// render was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBlock {
    pub content: String,
    pub layout: String,
}

#[derive(Debug, Error)]
pub enum BlockCacheError {
    /// Absent, expired, malformed, or the backend failed — all fail open to a
    /// live render.
    #[error("no cached payload for `{key}`")]
    Miss { key: String },
}

/// Ordered, named collections of rendered output for a single request.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    blocks: RwLock<BTreeMap<BlockName, BlockContent>>,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rendered fragment, creating the block on first use.
    pub fn append(&self, name: &BlockName, fragment: impl Into<String>) {
        let mut blocks = rw_write(&self.blocks, SOURCE, "append");
        blocks
            .entry(name.clone())
            .or_default()
            .fragments
            .push(fragment.into());
    }

    /// Record a structured content descriptor for the block.
    pub fn append_piece(&self, name: &BlockName, piece: BlockPiece) {
        let mut blocks = rw_write(&self.blocks, SOURCE, "append_piece");
        blocks.entry(name.clone()).or_default().pieces.push(piece);
    }

    /// Fragments for an exact name, in insertion order.
    ///
    /// A never-populated name reads as an empty sequence; callers never see a
    /// "created but empty" versus "never created" distinction.
    pub fn get(&self, name: &BlockName) -> Vec<String> {
        let blocks = rw_read(&self.blocks, SOURCE, "get");
        blocks
            .get(name)
            .map(|content| content.fragments.clone())
            .unwrap_or_default()
    }

    /// Structured descriptors for an exact name, in insertion order.
    pub fn pieces(&self, name: &BlockName) -> Vec<BlockPiece> {
        let blocks = rw_read(&self.blocks, SOURCE, "pieces");
        blocks
            .get(name)
            .map(|content| content.pieces.clone())
            .unwrap_or_default()
    }

    /// Every populated block matching the pattern, in block-name order.
    pub fn get_by_pattern(&self, pattern: &BlockPattern) -> Vec<(BlockName, Vec<String>)> {
        let blocks = rw_read(&self.blocks, SOURCE, "get_by_pattern");
        blocks
            .iter()
            .filter(|(name, _)| pattern.matches(name))
            .map(|(name, content)| (name.clone(), content.fragments.clone()))
            .collect()
    }

    /// Names of every populated block, in order.
    pub fn names(&self) -> Vec<BlockName> {
        let blocks = rw_read(&self.blocks, SOURCE, "names");
        blocks.keys().cloned().collect()
    }

    /// Read a previously cached payload for `key`, append its content to the
    /// block, and return the layout hint it was rendered under.
    ///
    /// A miss — including a backend failure — is reported as
    /// [`BlockCacheError::Miss`]; the caller falls back to rendering live.
    pub async fn get_cached(
        &self,
        store: &dyn CacheBackend,
        key: &str,
        name: &BlockName,
    ) -> Result<String, BlockCacheError> {
        let item = match store.get(key).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                counter!("mosaico_block_cache_miss_total").increment(1);
                return Err(BlockCacheError::Miss {
                    key: key.to_string(),
                });
            }
            Err(error) => {
                // Fail open: an unreachable backend reads as a miss.
                warn!(
                    cache_key = key,
                    error = %error,
                    "Cache backend error treated as miss"
                );
                counter!("mosaico_block_cache_miss_total").increment(1);
                return Err(BlockCacheError::Miss {
                    key: key.to_string(),
                });
            }
        };

        let cached: CachedBlock = match serde_json::from_value(item) {
            Ok(cached) => cached,
            Err(error) => {
                warn!(
                    cache_key = key,
                    error = %error,
                    "Malformed cached block payload treated as miss"
                );
                counter!("mosaico_block_cache_miss_total").increment(1);
                return Err(BlockCacheError::Miss {
                    key: key.to_string(),
                });
            }
        };

        debug!(cache_key = key, block = %name, "Block cache hit");
        counter!("mosaico_block_cache_hit_total").increment(1);
        self.append(name, cached.content);
        Ok(cached.layout)
    }

    /// Persist the block's current joined content for later [`Self::get_cached`].
    ///
    /// A write failure is logged and swallowed; caching is an optimization,
    /// never a correctness dependency.
    pub async fn cache_block(
        &self,
        store: &dyn CacheBackend,
        key: &str,
        name: &BlockName,
        layout: &str,
        ttl: Option<Duration>,
    ) {
        let content = self.get(name).join("\n");
        let payload = CachedBlock {
            content,
            layout: layout.to_string(),
        };
        let item = match serde_json::to_value(&payload) {
            Ok(item) => item,
            Err(error) => {
                warn!(cache_key = key, error = %error, "Failed to encode block payload");
                return;
            }
        };
        if let Err(error) = store.set(key, item, ttl).await {
            warn!(cache_key = key, error = %error, "Failed to cache block");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::cache::{CacheConfig, MemoryStore};

    use super::*;

    fn name(raw: &str) -> BlockName {
        BlockName::new(raw).expect("valid block name")
    }

    #[test]
    fn append_order_is_get_order() {
        let blocks = BlockAccumulator::new();
        let body = name("body");
        blocks.append(&body, "one");
        blocks.append(&body, "two");
        blocks.append(&body, "three");

        assert_eq!(blocks.get(&body), vec!["one", "two", "three"]);
    }

    #[test]
    fn never_populated_block_is_empty_not_absent() {
        let blocks = BlockAccumulator::new();
        assert!(blocks.get(&name("footer.dev.tools")).is_empty());
        assert!(blocks.pieces(&name("footer.dev.tools")).is_empty());
    }

    #[test]
    fn pieces_are_recorded_in_parallel() {
        let blocks = BlockAccumulator::new();
        let scripts = name("scripts.site");
        blocks.append(&scripts, "<script src=\"a.js\"></script>");
        blocks.append_piece(
            &scripts,
            BlockPiece {
                id: "a".to_string(),
                kind: "script".to_string(),
                metadata: json!({"defer": true}),
            },
        );

        let pieces = blocks.pieces(&scripts);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].id, "a");
        assert_eq!(blocks.get(&scripts).len(), 1);
    }

    #[test]
    fn pattern_query_returns_matching_blocks_in_name_order() {
        let blocks = BlockAccumulator::new();
        blocks.append(&name("scripts.site"), "site");
        blocks.append(&name("scripts.analytics"), "analytics");
        blocks.append(&name("styles.site"), "styles");

        let pattern = BlockPattern::new("scripts.*").expect("pattern");
        let matched = blocks.get_by_pattern(&pattern);

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].0.as_str(), "scripts.analytics");
        assert_eq!(matched[1].0.as_str(), "scripts.site");
    }

    #[tokio::test]
    async fn cache_round_trip_appends_and_returns_layout() {
        let store = MemoryStore::new(&CacheConfig::default());
        let source = BlockAccumulator::new();
        let body = name("body");
        source.append(&body, "<p>hello</p>");
        source
            .cache_block(&store, "k", &body, "article", Some(Duration::seconds(60)))
            .await;

        let fresh = BlockAccumulator::new();
        let layout = fresh
            .get_cached(&store, "k", &body)
            .await
            .expect("cache hit");

        assert_eq!(layout, "article");
        assert_eq!(fresh.get(&body), vec!["<p>hello</p>"]);
    }

    #[tokio::test]
    async fn cache_miss_is_an_error_and_appends_nothing() {
        let store = MemoryStore::new(&CacheConfig::default());
        let blocks = BlockAccumulator::new();
        let body = name("body");

        let result = blocks.get_cached(&store, "absent", &body).await;
        assert!(matches!(result, Err(BlockCacheError::Miss { .. })));
        assert!(blocks.get(&body).is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_miss() {
        let store = MemoryStore::new(&CacheConfig::default());
        store
            .set("bad", json!({"unexpected": true}), None)
            .await
            .expect("set");

        let blocks = BlockAccumulator::new();
        let result = blocks.get_cached(&store, "bad", &name("body")).await;
        assert!(matches!(result, Err(BlockCacheError::Miss { .. })));
    }
}
