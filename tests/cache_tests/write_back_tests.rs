//! Tests for the write-back LRU cache
//!
//! These tests verify:
//! - Least recently used entries are evicted first, exactly once
//! - Clean evictions never reach the Remover
//! - Dirty evictions persist the latest value
//! - Weight-bounded capacity
//! - Loader misses are not cached

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use blockkv::cache::{Capacity, Loader, Remover, WriteBackCache};
use blockkv::Result;

// =============================================================================
// Helper Functions
// =============================================================================

/// Backing map shared between a test and its cache hooks
#[derive(Clone, Default)]
struct Backing {
    values: Rc<RefCell<HashMap<u32, String>>>,
    loads: Rc<RefCell<Vec<u32>>>,
    writes: Rc<RefCell<Vec<(u32, String)>>>,
}

impl Backing {
    fn with_range(count: u32) -> Self {
        let backing = Backing::default();
        for key in 0..count {
            backing
                .values
                .borrow_mut()
                .insert(key, format!("stored-{}", key));
        }
        backing
    }

    fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }
}

impl Loader<u32, String> for Backing {
    fn load(&mut self, key: &u32) -> Result<Option<String>> {
        self.loads.borrow_mut().push(*key);
        Ok(self.values.borrow().get(key).cloned())
    }
}

impl Remover<u32, String> for Backing {
    fn remove(&mut self, key: &u32, value: &String) -> Result<()> {
        self.writes.borrow_mut().push((*key, value.clone()));
        self.values.borrow_mut().insert(*key, value.clone());
        Ok(())
    }
}

type TestCache = WriteBackCache<u32, String, Backing, Backing>;

fn setup_cache(capacity: usize, stored: u32) -> (TestCache, Backing) {
    let backing = Backing::with_range(stored);
    let cache = WriteBackCache::new(backing.clone(), backing.clone(), capacity);
    (cache, backing)
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_under_capacity_evicts_nothing() {
    let (mut cache, _backing) = setup_cache(100, 200);
    for key in 0..50 {
        assert_eq!(cache.get(&key).unwrap(), Some(&format!("stored-{}", key)));
    }
    assert_eq!(cache.len(), 50);
    assert_eq!(cache.stats().evictions, 0);
    assert!((0..50).all(|key| cache.contains(&key)));
}

#[test]
fn test_over_capacity_evicts_least_recently_used() {
    let (mut cache, backing) = setup_cache(100, 200);
    for key in 0..150 {
        cache.get(&key).unwrap();
    }

    assert_eq!(cache.len(), 100);
    assert_eq!(cache.stats().evictions, 50);
    assert!((0..50).all(|key| !cache.contains(&key)));
    assert!((50..150).all(|key| cache.contains(&key)));

    // Clean entries never reach the remover
    assert_eq!(backing.write_count(), 0);
}

#[test]
fn test_recent_use_protects_entry() {
    let (mut cache, _backing) = setup_cache(3, 10);
    cache.get(&1).unwrap();
    cache.get(&2).unwrap();
    cache.get(&3).unwrap();

    // Touch 1 so 2 becomes the eviction candidate
    assert!(cache.get_from_cache(&1).is_some());
    cache.get(&4).unwrap();

    assert!(cache.contains(&1));
    assert!(!cache.contains(&2));
    assert!(cache.contains(&3));
    assert!(cache.contains(&4));
}

#[test]
fn test_peek_does_not_touch_recency() {
    let (mut cache, _backing) = setup_cache(2, 10);
    cache.get(&1).unwrap();
    cache.get(&2).unwrap();
    assert!(cache.peek(&1).is_some());
    cache.get(&3).unwrap();
    assert!(!cache.contains(&1));
}

#[test]
fn test_dirty_eviction_writes_latest_value_once() {
    let (mut cache, backing) = setup_cache(2, 0);
    cache.dirty(1, "first".to_string()).unwrap();
    cache.dirty(1, "second".to_string()).unwrap();
    cache.dirty(2, "two".to_string()).unwrap();
    assert_eq!(backing.write_count(), 0);

    cache.dirty(3, "three".to_string()).unwrap();
    assert_eq!(*backing.writes.borrow(), vec![(1, "second".to_string())]);
    assert!(!cache.contains(&1));

    // Reloading sees the written value and does not write again
    assert_eq!(cache.get(&1).unwrap(), Some(&"second".to_string()));
    assert_eq!(*backing.writes.borrow(), vec![
        (1, "second".to_string()),
        (2, "two".to_string()),
    ]);
    assert_eq!(cache.stats().writebacks, 2);
}

#[test]
fn test_dirty_value_visible_before_writeback() {
    let (mut cache, backing) = setup_cache(10, 5);
    cache.dirty(3, "changed".to_string()).unwrap();
    assert!(cache.is_dirty(&3));
    assert_eq!(cache.get(&3).unwrap(), Some(&"changed".to_string()));
    assert_eq!(backing.values.borrow().get(&3), Some(&"stored-3".to_string()));
    assert!(!backing.loads.borrow().contains(&3));
}

// =============================================================================
// Flush and Close Tests
// =============================================================================

#[test]
fn test_flush_keeps_entries_clean() {
    let (mut cache, backing) = setup_cache(10, 0);
    for key in 0..5 {
        cache.dirty(key, format!("new-{}", key)).unwrap();
    }
    assert_eq!(cache.dirty_len(), 5);

    cache.flush().unwrap();
    assert_eq!(cache.dirty_len(), 0);
    assert_eq!(cache.len(), 5);
    assert_eq!(backing.write_count(), 5);

    // Nothing left to write
    cache.flush().unwrap();
    cache.empty_cache().unwrap();
    assert_eq!(backing.write_count(), 5);
    assert!(cache.is_empty());
}

#[test]
fn test_empty_cache_counts_evictions() {
    let (mut cache, backing) = setup_cache(10, 5);
    for key in 0..5 {
        cache.get(&key).unwrap();
    }
    cache.dirty(7, "seven".to_string()).unwrap();
    assert_eq!(cache.stats().evictions, 0);

    cache.empty_cache().unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 6);
    assert_eq!(cache.stats().writebacks, 1);
    assert_eq!(backing.write_count(), 1);
}

#[test]
fn test_close_persists_dirty_entries() {
    let (mut cache, backing) = setup_cache(10, 3);
    cache.get(&0).unwrap();
    cache.dirty(1, "updated".to_string()).unwrap();
    cache.dirty(7, "added".to_string()).unwrap();
    cache.close().unwrap();

    let mut writes = backing.writes.borrow().clone();
    writes.sort();
    assert_eq!(writes, vec![(1, "updated".to_string()), (7, "added".to_string())]);
    assert_eq!(backing.values.borrow().get(&7), Some(&"added".to_string()));
}

#[test]
fn test_invalidate_drops_without_writing() {
    let (mut cache, backing) = setup_cache(10, 0);
    cache.dirty(1, "gone".to_string()).unwrap();
    assert_eq!(cache.invalidate(&1), Some("gone".to_string()));
    assert_eq!(cache.invalidate(&1), None);
    cache.close().unwrap();
    assert_eq!(backing.write_count(), 0);
}

#[test]
fn test_discard_forgets_dirty_entries() {
    let (mut cache, backing) = setup_cache(10, 0);
    cache.dirty(1, "lost".to_string()).unwrap();
    cache.discard();
    assert!(cache.is_empty());
    assert_eq!(cache.dirty_len(), 0);
    cache.close().unwrap();
    assert_eq!(backing.write_count(), 0);
}

// =============================================================================
// Loader Tests
// =============================================================================

#[test]
fn test_missing_value_is_not_cached() {
    let (mut cache, backing) = setup_cache(10, 2);
    assert_eq!(cache.get(&9).unwrap(), None);
    assert_eq!(cache.get(&9).unwrap(), None);
    assert!(!cache.contains(&9));
    assert_eq!(*backing.loads.borrow(), vec![9, 9]);
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_hits_skip_the_loader() {
    let (mut cache, backing) = setup_cache(10, 2);
    cache.get(&1).unwrap();
    cache.get(&1).unwrap();
    cache.get(&1).unwrap();
    assert_eq!(*backing.loads.borrow(), vec![1]);
    assert_eq!(cache.stats().hits, 2);
}

#[test]
fn test_closure_hooks() {
    let store: Rc<RefCell<HashMap<u32, u32>>> = Rc::default();
    let sink = Rc::clone(&store);
    let source = Rc::clone(&store);
    let mut cache = WriteBackCache::new(
        move |key: &u32, value: &u32| -> Result<()> {
            sink.borrow_mut().insert(*key, *value);
            Ok(())
        },
        move |key: &u32| -> Result<Option<u32>> { Ok(source.borrow().get(key).copied()) },
        1,
    );

    cache.dirty(1, 10).unwrap();
    cache.dirty(2, 20).unwrap();
    assert_eq!(store.borrow().get(&1), Some(&10));
    assert_eq!(cache.get(&1).unwrap(), Some(&10));
    cache.close().unwrap();
    assert_eq!(store.borrow().get(&2), Some(&20));
}

// =============================================================================
// Weight Tests
// =============================================================================

#[test]
fn test_weight_bounded_capacity() {
    let backing = Backing::default();
    let mut cache = WriteBackCache::with_weigher(
        backing.clone(),
        backing.clone(),
        20,
        |value: &String| value.len(),
    );
    assert_eq!(cache.capacity(), Capacity::Weight(20));

    cache.dirty(1, "aaaaaaaa".to_string()).unwrap();
    cache.dirty(2, "bbbbbbbb".to_string()).unwrap();
    assert_eq!(cache.weight(), 16);
    assert_eq!(backing.write_count(), 0);

    // 24 > 20: the oldest entry goes
    cache.dirty(3, "cccccccc".to_string()).unwrap();
    assert_eq!(cache.weight(), 16);
    assert!(!cache.contains(&1));
    assert_eq!(*backing.writes.borrow(), vec![(1, "aaaaaaaa".to_string())]);

    // Replacing an entry re-weighs it
    cache.dirty(3, "c".to_string()).unwrap();
    assert_eq!(cache.weight(), 9);
}

#[test]
fn test_single_heavy_entry_stays_cached() {
    let backing = Backing::default();
    let mut cache = WriteBackCache::with_weigher(
        backing.clone(),
        backing.clone(),
        10,
        |value: &String| value.len(),
    );
    cache.dirty(1, "small".to_string()).unwrap();
    cache.dirty(2, "x".repeat(50)).unwrap();

    assert!(cache.contains(&2));
    assert!(!cache.contains(&1));
    assert_eq!(cache.weight(), 50);
    assert_eq!(backing.write_count(), 1);
}
