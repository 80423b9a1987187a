//! Write-back LRU cache
//!
//! Recency is tracked by an unbounded `lru::LruCache`; capacity is enforced
//! here so that entry-count and weight limits share one eviction path.

use std::hash::Hash;

use lru::LruCache;

use crate::error::Result;

use super::{Loader, Remover};

/// Capacity limit of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many entries
    Entries(usize),
    /// At most this much accumulated value weight
    Weight(usize),
}

/// Counters describing cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (clean or dirty)
    pub evictions: u64,
    /// Remover invocations
    pub writebacks: u64,
}

struct Slot<V> {
    value: V,
    dirty: bool,
    weight: usize,
}

/// Bounded LRU cache with deferred persistence of dirty entries
///
/// ## Eviction
/// - Least recently used first; a fresh insert is the most recently used
/// - Clean entries are dropped (the Loader can rebuild them)
/// - Dirty entries go through the Remover exactly once, with the latest value
/// - The entry that triggered eviction is never evicted by it, so a single
///   entry heavier than the weight limit stays cached until displaced
///
/// Dropping a cache with dirty entries loses them: call
/// [`WriteBackCache::empty_cache`] or [`WriteBackCache::close`] first.
pub struct WriteBackCache<K, V, L, R> {
    entries: LruCache<K, Slot<V>>,
    loader: L,
    remover: R,
    capacity: Capacity,
    weigher: Option<Box<dyn Fn(&V) -> usize>>,
    total_weight: usize,
    dirty_count: usize,
    stats: CacheStats,
}

impl<K, V, L, R> WriteBackCache<K, V, L, R>
where
    K: Hash + Eq + Clone,
    L: Loader<K, V>,
    R: Remover<K, V>,
{
    /// Create a cache bounded by entry count
    pub fn new(remover: R, loader: L, capacity: usize) -> Self {
        Self::build(remover, loader, Capacity::Entries(capacity), None)
    }

    /// Create a cache bounded by the accumulated weight of its values
    pub fn with_weigher<W>(remover: R, loader: L, max_weight: usize, weigher: W) -> Self
    where
        W: Fn(&V) -> usize + 'static,
    {
        Self::build(
            remover,
            loader,
            Capacity::Weight(max_weight),
            Some(Box::new(weigher)),
        )
    }

    fn build(
        remover: R,
        loader: L,
        capacity: Capacity,
        weigher: Option<Box<dyn Fn(&V) -> usize>>,
    ) -> Self {
        Self {
            entries: LruCache::unbounded(),
            loader,
            remover,
            capacity,
            weigher,
            total_weight: 0,
            dirty_count: 0,
            stats: CacheStats::default(),
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Get a value, loading it on a miss.
    ///
    /// Returns `Ok(None)` when the Loader has no value; nothing is cached in
    /// that case.
    pub fn get(&mut self, key: &K) -> Result<Option<&V>> {
        if self.entries.contains(key) {
            self.stats.hits += 1;
            return Ok(self.entries.get(key).map(|slot| &slot.value));
        }

        self.stats.misses += 1;
        let value = match self.loader.load(key)? {
            Some(value) => value,
            None => return Ok(None),
        };
        self.admit(key.clone(), value, false)?;
        Ok(self.entries.peek(key).map(|slot| &slot.value))
    }

    /// Probe the cache without loading. A hit counts as a use.
    pub fn get_from_cache(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Probe without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key).map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Whether `key` is cached with unflushed changes
    pub fn is_dirty(&self, key: &K) -> bool {
        self.entries.peek(key).map(|slot| slot.dirty).unwrap_or(false)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Store a new value for `key` and defer persisting it
    pub fn dirty(&mut self, key: K, value: V) -> Result<()> {
        self.admit(key, value, true)
    }

    /// Drop an entry without flushing it, returning its value
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.pop(key)?;
        self.total_weight -= slot.weight;
        if slot.dirty {
            self.dirty_count -= 1;
        }
        Some(slot.value)
    }

    /// Persist every dirty entry (least recently used first) and keep it
    /// cached as clean
    pub fn flush(&mut self) -> Result<()> {
        let mut written = 0;
        for (key, slot) in self.entries.iter_mut().rev() {
            if slot.dirty {
                self.remover.remove(key, &slot.value)?;
                slot.dirty = false;
                self.dirty_count -= 1;
                written += 1;
            }
        }
        self.stats.writebacks += written;
        if written > 0 {
            tracing::trace!("Flushed {} dirty cache entries", written);
        }
        Ok(())
    }

    /// Evict every entry in LRU order, persisting the dirty ones
    pub fn empty_cache(&mut self) -> Result<()> {
        let count = self.entries.len();
        while self.evict_lru()? {}
        tracing::trace!("Emptied cache of {} entries", count);
        Ok(())
    }

    /// Empty the cache and release it
    pub fn close(mut self) -> Result<()> {
        self.empty_cache()
    }

    /// Drop every entry without persisting anything
    pub fn discard(&mut self) {
        self.entries.clear();
        self.total_weight = 0;
        self.dirty_count = 0;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cached entries waiting to be persisted
    pub fn dirty_len(&self) -> usize {
        self.dirty_count
    }

    /// Accumulated weight (entry count in `Entries` mode)
    pub fn weight(&self) -> usize {
        self.total_weight
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    pub fn remover_mut(&mut self) -> &mut R {
        &mut self.remover
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn weigh(&self, value: &V) -> usize {
        match &self.weigher {
            Some(weigher) => weigher(value),
            None => 1,
        }
    }

    fn over_capacity(&self) -> bool {
        match self.capacity {
            Capacity::Entries(max) => self.entries.len() > max,
            Capacity::Weight(max) => self.total_weight > max,
        }
    }

    /// Insert or replace an entry as most recently used, then evict
    fn admit(&mut self, key: K, value: V, dirty: bool) -> Result<()> {
        let weight = self.weigh(&value);
        let slot = Slot {
            value,
            dirty,
            weight,
        };

        if let Some((_, old)) = self.entries.push(key, slot) {
            self.total_weight -= old.weight;
            if old.dirty {
                self.dirty_count -= 1;
            }
        }
        self.total_weight += weight;
        if dirty {
            self.dirty_count += 1;
        }

        while self.over_capacity() && self.entries.len() > 1 {
            self.evict_lru()?;
        }
        Ok(())
    }

    /// Evict the least recently used entry. The entry stays cached if its
    /// Remover call fails.
    fn evict_lru(&mut self) -> Result<bool> {
        let dirty = match self.entries.peek_lru() {
            Some((key, slot)) => {
                if slot.dirty {
                    self.remover.remove(key, &slot.value)?;
                }
                slot.dirty
            }
            None => return Ok(false),
        };

        if let Some((_, slot)) = self.entries.pop_lru() {
            self.total_weight -= slot.weight;
            self.stats.evictions += 1;
            if dirty {
                self.dirty_count -= 1;
                self.stats.writebacks += 1;
            }
        }
        Ok(true)
    }
}

impl<K, V, L, R> Drop for WriteBackCache<K, V, L, R> {
    fn drop(&mut self) {
        if self.dirty_count > 0 {
            tracing::warn!(
                "Write-back cache dropped with {} unflushed dirty entries",
                self.dirty_count
            );
        }
    }
}
