//! Block cache system.
//!
//! Expensive block output is memoized behind a pluggable expiring key/value
//! store. Keys are deterministic composite strings built from the configured
//! namespace prefix, the active theme, semantic components (usually the block
//! name), and escaped request parameters.
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 300
//! prefix = "mosaico"
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKeyBuilder, cache_key};
pub use store::{CacheBackend, CacheError, MemoryStore};
