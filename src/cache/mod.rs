//! Cache Module
//!
//! Bounded LRU write-back caching with pluggable miss and eviction hooks.
//!
//! ## Responsibilities
//! - Serve repeated reads from memory
//! - Defer persistence of updates until eviction or explicit flush
//! - Keep memory bounded by entry count or accumulated value weight
//!
//! ## Hooks
//! ```text
//!   get(k) ──miss──► Loader::load(k) ──Some(v)──► cached (clean)
//!                                    └─None────► not cached
//!
//!   evict(k, v) ──dirty──► Remover::remove(k, v)   (exactly once)
//!               └─clean──► dropped
//! ```

mod write_back;

use crate::error::Result;

pub use write_back::{CacheStats, Capacity, WriteBackCache};

/// Fills the cache on a miss
pub trait Loader<K, V> {
    /// Load the value for `key`; `Ok(None)` when no such value exists
    fn load(&mut self, key: &K) -> Result<Option<V>>;
}

/// Persists a dirty value when it leaves the cache
pub trait Remover<K, V> {
    fn remove(&mut self, key: &K, value: &V) -> Result<()>;
}

impl<K, V, F> Loader<K, V> for F
where
    F: FnMut(&K) -> Result<Option<V>>,
{
    fn load(&mut self, key: &K) -> Result<Option<V>> {
        self(key)
    }
}

impl<K, V, F> Remover<K, V> for F
where
    F: FnMut(&K, &V) -> Result<()>,
{
    fn remove(&mut self, key: &K, value: &V) -> Result<()> {
        self(key, value)
    }
}
