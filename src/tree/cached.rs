//! Value cache in front of a tree index.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use crate::cache::{CacheStats, Loader, Remover, WriteBackCache};
use crate::error::{BlockKvError, Result};

use super::TreeIndex;

struct TreeLoader<T> {
    tree: Rc<RefCell<T>>,
}

impl<K, V, T: TreeIndex<K, V>> Loader<K, V> for TreeLoader<T> {
    fn load(&mut self, key: &K) -> Result<Option<V>> {
        self.tree.borrow_mut().get(key)
    }
}

struct TreeWriter<T> {
    tree: Rc<RefCell<T>>,
}

impl<K: Clone, V: Clone, T: TreeIndex<K, V>> Remover<K, V> for TreeWriter<T> {
    fn remove(&mut self, key: &K, value: &V) -> Result<()> {
        self.tree.borrow_mut().put(key.clone(), value.clone())?;
        Ok(())
    }
}

/// A tree index behind a write-back LRU cache of decoded values
///
/// Reads are served from the cache when possible; writes stay in the cache
/// until evicted, flushed or saved.
pub struct CachedTree<K, V, T> {
    tree: Rc<RefCell<T>>,
    cache: WriteBackCache<K, V, TreeLoader<T>, TreeWriter<T>>,
}

impl<K, V, T> CachedTree<K, V, T>
where
    K: Hash + Eq + Clone,
    V: Clone,
    T: TreeIndex<K, V>,
{
    /// Cache up to `capacity` values of `tree`
    pub fn new(tree: T, capacity: usize) -> Self {
        let tree = Rc::new(RefCell::new(tree));
        let cache = WriteBackCache::new(
            TreeWriter {
                tree: Rc::clone(&tree),
            },
            TreeLoader {
                tree: Rc::clone(&tree),
            },
            capacity,
        );
        Self { tree, cache }
    }

    /// Cache values of `tree` up to an accumulated weight
    pub fn with_weigher<W>(tree: T, max_weight: usize, weigher: W) -> Self
    where
        W: Fn(&V) -> usize + 'static,
    {
        let tree = Rc::new(RefCell::new(tree));
        let cache = WriteBackCache::with_weigher(
            TreeWriter {
                tree: Rc::clone(&tree),
            },
            TreeLoader {
                tree: Rc::clone(&tree),
            },
            max_weight,
            weigher,
        );
        Self { tree, cache }
    }

    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        Ok(self.cache.get(key)?.cloned())
    }

    /// Store a value in the cache; the tree sees it once it is written back
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        self.cache.dirty(key, value)
    }

    /// Remove a key from both the cache and the tree
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let cached = self.cache.invalidate(key);
        let stored = self.tree.borrow_mut().remove(key)?;
        Ok(cached.or(stored))
    }

    pub fn contains_key(&mut self, key: &K) -> Result<bool> {
        if self.cache.contains(key) {
            return Ok(true);
        }
        self.tree.borrow_mut().contains_key(key)
    }

    /// Write every dirty value to the tree, keeping them cached
    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush()
    }

    /// Run `f` against the tree after writing back dirty values
    pub fn with_tree<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.cache.flush()?;
        let mut tree = self.tree.borrow_mut();
        Ok(f(&mut tree))
    }

    /// Flush the cache and save the tree
    pub fn save(&mut self) -> Result<()> {
        self.cache.flush()?;
        self.tree.borrow_mut().save()
    }

    /// Empty the cache into the tree, then close the tree
    pub fn close(self) -> Result<()> {
        let CachedTree { tree, cache } = self;
        cache.close()?;
        unshare(tree)?.close()
    }

    /// Drop cached values and delete the tree with its storage
    pub fn delete(self) -> Result<()> {
        let CachedTree { tree, mut cache } = self;
        cache.discard();
        drop(cache);
        unshare(tree)?.delete()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Values held in memory
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn unshare<T>(tree: Rc<RefCell<T>>) -> Result<T> {
    Rc::try_unwrap(tree)
        .map(RefCell::into_inner)
        .map_err(|_| BlockKvError::Config("tree is still shared".to_string()))
}
