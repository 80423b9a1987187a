//! Tests for B+Tree operations
//!
//! These tests verify:
//! - Point operations against a reference `BTreeMap`
//! - Ordered iteration in both directions, with and without bounds
//! - Height changes as the tree grows and shrinks
//! - Entries up to the payload of an empty node are stored, larger ones
//!   are rejected without touching the tree

use std::collections::BTreeMap;
use std::ops::Bound;

use blockkv::{BPlusTree, BlockKvError, MemoryBlockStore, Result, TreeConfig, TreeIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Helper Functions
// =============================================================================

fn memory_tree<K, V>(block_size: usize, cache_blocks: usize) -> BPlusTree<K, V, MemoryBlockStore>
where
    K: blockkv::Codec + Clone,
    V: blockkv::Codec,
{
    let config = TreeConfig::builder()
        .block_size(block_size)
        .cache_blocks(cache_blocks)
        .build();
    BPlusTree::with_store(MemoryBlockStore::new(block_size), config).unwrap()
}

fn collect<K, V>(iter: impl Iterator<Item = Result<(K, V)>>) -> Vec<(K, V)> {
    iter.collect::<Result<Vec<_>>>().unwrap()
}

fn keys_of<K: Clone, V>(entries: &[(K, V)]) -> Vec<K> {
    entries.iter().map(|(k, _)| k.clone()).collect()
}

fn random_value(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..30);
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect()
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_empty_tree() {
    let mut tree: BPlusTree<u32, String, _> = memory_tree(512, 8);
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.get(&1).unwrap(), None);
    assert!(!tree.contains_key(&1).unwrap());
    assert_eq!(tree.remove(&1).unwrap(), None);
    assert_eq!(tree.first_key().unwrap(), None);
    assert_eq!(tree.last_key().unwrap(), None);
    assert_eq!(tree.iter().unwrap().count(), 0);
    assert_eq!(tree.iter_rev().unwrap().count(), 0);
}

#[test]
fn test_single_entry() {
    let mut tree = memory_tree(512, 8);
    tree.put(7u32, "seven".to_string()).unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.height(), 1);
    assert_eq!(collect(tree.iter().unwrap()), vec![(7, "seven".to_string())]);
    assert_eq!(collect(tree.iter_rev().unwrap()), vec![(7, "seven".to_string())]);
    assert_eq!(tree.first_key().unwrap(), Some(7));
    assert_eq!(tree.last_key().unwrap(), Some(7));
}

#[test]
fn test_random_operations_match_reference() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut tree = memory_tree(256, 3);
    let mut reference: BTreeMap<u32, String> = BTreeMap::new();

    for round in 0..4000 {
        let key = rng.random_range(0..400u32);
        if rng.random_bool(0.6) {
            let value = random_value(&mut rng);
            let previous = tree.put(key, value.clone()).unwrap();
            assert_eq!(previous, reference.insert(key, value), "put {} in round {}", key, round);
        } else {
            assert_eq!(tree.remove(&key).unwrap(), reference.remove(&key), "remove {}", key);
        }
        assert_eq!(tree.len(), reference.len() as u64);

        if round % 500 == 499 {
            let expected: Vec<(u32, String)> =
                reference.iter().map(|(k, v)| (*k, v.clone())).collect();
            assert_eq!(collect(tree.iter().unwrap()), expected);
        }
    }

    for key in 0..400u32 {
        assert_eq!(tree.get(&key).unwrap(), reference.get(&key).cloned());
    }

    // Drain everything that is left
    let remaining: Vec<u32> = reference.keys().copied().collect();
    for key in remaining {
        assert!(tree.remove(&key).unwrap().is_some());
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.store_stats().live_blocks(), 0);
}

#[test]
fn test_string_keys_sort_lexicographically() {
    let mut tree = memory_tree(1024, 16);
    for i in 0..1000u32 {
        tree.put(i.to_string(), i).unwrap();
    }
    assert_eq!(tree.len(), 1000);

    for i in (0..1000u32).step_by(2) {
        assert_eq!(tree.remove(&i.to_string()).unwrap(), Some(i));
    }
    assert_eq!(tree.len(), 500);
    assert_eq!(tree.get(&"10".to_string()).unwrap(), None);
    assert_eq!(tree.get(&"11".to_string()).unwrap(), Some(11));

    let mut expected: Vec<String> = (0..1000u32).filter(|i| i % 2 == 1).map(|i| i.to_string()).collect();
    expected.sort();
    let entries = collect(tree.iter().unwrap());
    assert_eq!(keys_of(&entries), expected);
    assert!(entries.iter().all(|(k, v)| k == &v.to_string()));

    expected.reverse();
    assert_eq!(keys_of(&collect(tree.iter_rev().unwrap())), expected);
}

#[test]
fn test_replace_keeps_count() {
    let mut tree = memory_tree(256, 4);
    for i in 0..100u32 {
        tree.put(i, "short".to_string()).unwrap();
    }
    // Longer values force splits on replace
    for i in 0..100u32 {
        assert_eq!(
            tree.put(i, format!("a considerably longer value {}", i)).unwrap(),
            Some("short".to_string())
        );
    }
    assert_eq!(tree.len(), 100);
    assert_eq!(
        tree.get(&42).unwrap(),
        Some("a considerably longer value 42".to_string())
    );
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iteration_sizes_both_directions() {
    for size in [0u32, 1, 10, 1000] {
        let mut tree = memory_tree(256, 4);
        for i in 0..size {
            tree.put(i, i * 2).unwrap();
        }
        let forward: Vec<(u32, u32)> = (0..size).map(|i| (i, i * 2)).collect();
        let backward: Vec<(u32, u32)> = forward.iter().rev().copied().collect();

        assert_eq!(collect(tree.iter().unwrap()), forward, "size {}", size);
        assert_eq!(collect(tree.iter_rev().unwrap()), backward, "size {}", size);
    }
}

#[test]
fn test_range_bounds_match_reference() {
    let mut tree = memory_tree(256, 4);
    let mut reference = BTreeMap::new();
    for i in (0..600u32).step_by(3) {
        tree.put(i, i).unwrap();
        reference.insert(i, i);
    }

    let ranges: [(Bound<u32>, Bound<u32>); 7] = [
        (Bound::Included(30), Bound::Included(90)),
        (Bound::Excluded(30), Bound::Excluded(90)),
        (Bound::Included(31), Bound::Excluded(32)),
        (Bound::Unbounded, Bound::Excluded(100)),
        (Bound::Excluded(500), Bound::Unbounded),
        (Bound::Included(598), Bound::Unbounded),
        (Bound::Unbounded, Bound::Unbounded),
    ];
    for (lower, upper) in ranges {
        let expected: Vec<(u32, u32)> = reference.range((lower, upper)).map(|(k, v)| (*k, *v)).collect();
        assert_eq!(
            collect(tree.range((lower, upper), false).unwrap()),
            expected,
            "{:?}..{:?}",
            lower,
            upper
        );

        let reversed: Vec<(u32, u32)> = expected.into_iter().rev().collect();
        assert_eq!(
            collect(tree.range((lower, upper), true).unwrap()),
            reversed,
            "reverse {:?}..{:?}",
            lower,
            upper
        );
    }
}

#[test]
fn test_inverted_range_is_empty() {
    let mut tree = memory_tree(256, 4);
    for i in 0..300u32 {
        tree.put(i, i).unwrap();
    }
    assert_eq!(tree.range((Bound::Included(200), Bound::Included(10)), false).unwrap().count(), 0);
    assert_eq!(tree.range((Bound::Included(200), Bound::Included(10)), true).unwrap().count(), 0);
    assert_eq!(tree.range(1000.., false).unwrap().count(), 0);
}

#[test]
fn test_scan_through_trait() {
    fn count_between<T: TreeIndex<u64, u64>>(index: &mut T, lo: u64, hi: u64) -> usize {
        index
            .scan(Bound::Included(lo), Bound::Excluded(hi), false)
            .unwrap()
            .count()
    }

    let mut tree: BPlusTree<u64, u64, _> = memory_tree(512, 8);
    for i in 0..500u64 {
        TreeIndex::put(&mut tree, i, i).unwrap();
    }
    assert_eq!(count_between(&mut tree, 100, 200), 100);
    assert!(TreeIndex::contains_key(&mut tree, &499).unwrap());
}

// =============================================================================
// Shape Tests
// =============================================================================

#[test]
fn test_height_grows_and_shrinks() {
    let mut tree = memory_tree(256, 4);
    let mut heights = Vec::new();
    for i in 0..2000u64 {
        tree.put(i, i).unwrap();
        heights.push(tree.height());
    }
    assert!(heights.windows(2).all(|w| w[1] >= w[0]));
    assert!(tree.height() >= 3);
    assert_eq!(tree.first_key().unwrap(), Some(0));
    assert_eq!(tree.last_key().unwrap(), Some(1999));

    heights.clear();
    for i in (0..2000u64).rev() {
        assert_eq!(tree.remove(&i).unwrap(), Some(i));
        heights.push(tree.height());
    }
    assert!(heights.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(tree.height(), 0);
}

#[test]
fn test_oversized_entry_rejected_without_change() {
    let mut tree = memory_tree(1024, 8);
    tree.put("kept".to_string(), "value".to_string()).unwrap();
    let before = tree.store_stats();

    let long_key = "k".repeat(1000);
    assert!(matches!(
        tree.put(long_key.clone(), "v".to_string()),
        Err(BlockKvError::CapacityExceeded { .. })
    ));
    assert!(matches!(
        tree.put("small".to_string(), "v".repeat(1000)),
        Err(BlockKvError::CapacityExceeded { .. })
    ));

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.get(&long_key).unwrap(), None);
    assert_eq!(tree.get(&"small".to_string()).unwrap(), None);
    assert_eq!(tree.get(&"kept".to_string()).unwrap(), Some("value".to_string()));
    assert_eq!(tree.store_stats(), before);
}

#[test]
fn test_entry_filling_an_empty_node_is_accepted() {
    // 1024 byte blocks leave 998 bytes of node payload
    let mut tree = memory_tree(1024, 8);
    tree.put("k".to_string(), "v".repeat(600)).unwrap();
    tree.put("edge".to_string(), "e".repeat(983)).unwrap();
    assert!(matches!(
        tree.put("edge".to_string(), "e".repeat(984)),
        Err(BlockKvError::CapacityExceeded {
            needed: 999,
            available: 998
        })
    ));

    assert_eq!(tree.len(), 2);
    assert_eq!(tree.get(&"k".to_string()).unwrap(), Some("v".repeat(600)));
    assert_eq!(tree.get(&"edge".to_string()).unwrap(), Some("e".repeat(983)));
}

#[test]
fn test_large_entry_between_neighbours_gets_own_leaf() {
    let mut tree = memory_tree(1024, 8);
    tree.put("a".to_string(), "x".repeat(450)).unwrap();
    tree.put("c".to_string(), "x".repeat(450)).unwrap();
    assert_eq!(tree.height(), 1);

    // Fits neither neighbour, so the leaf splits three ways
    tree.put("b".to_string(), "y".repeat(900)).unwrap();
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.len(), 3);
    assert_eq!(
        keys_of(&collect(tree.iter().unwrap())),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert_eq!(
        keys_of(&collect(tree.iter_rev().unwrap())),
        vec!["c".to_string(), "b".to_string(), "a".to_string()]
    );
    assert_eq!(tree.get(&"b".to_string()).unwrap(), Some("y".repeat(900)));

    assert_eq!(tree.remove(&"b".to_string()).unwrap(), Some("y".repeat(900)));
    assert_eq!(tree.remove(&"a".to_string()).unwrap(), Some("x".repeat(450)));
    assert_eq!(tree.height(), 1);
    assert_eq!(collect(tree.iter().unwrap()), vec![("c".to_string(), "x".repeat(450))]);
}

#[test]
fn test_entries_larger_than_half_a_node() {
    let mut tree = memory_tree(1024, 8);
    for i in 0..30u32 {
        let key = (i * 7) % 30;
        tree.put(key, format!("{:0>700}", key)).unwrap();
    }
    assert_eq!(tree.len(), 30);
    let entries = collect(tree.iter().unwrap());
    assert_eq!(keys_of(&entries), (0..30u32).collect::<Vec<_>>());
    assert!(entries.iter().all(|(k, v)| v.len() == 700 && v.ends_with(&k.to_string())));

    for i in (0..30u32).step_by(2) {
        assert!(tree.remove(&i).unwrap().is_some());
    }
    let odd: Vec<u32> = (0..30u32).filter(|i| i % 2 == 1).collect();
    assert_eq!(keys_of(&collect(tree.iter_rev().unwrap())), odd.into_iter().rev().collect::<Vec<_>>());
}

#[test]
fn test_mixed_large_values_match_reference() {
    let mut rng = StdRng::seed_from_u64(0xB16);
    let mut tree = memory_tree(512, 4);
    let mut reference: BTreeMap<u32, String> = BTreeMap::new();

    for round in 0..1500 {
        let key = rng.random_range(0..200u32);
        if rng.random_bool(0.6) {
            // Up to the largest value a 512 byte node takes with a u32 key
            let len = if rng.random_bool(0.3) {
                rng.random_range(240..=475)
            } else {
                rng.random_range(0..40)
            };
            let value = "m".repeat(len);
            assert_eq!(tree.put(key, value.clone()).unwrap(), reference.insert(key, value), "round {}", round);
        } else {
            assert_eq!(tree.remove(&key).unwrap(), reference.remove(&key), "round {}", round);
        }

        if round % 250 == 249 {
            let expected: Vec<(u32, String)> =
                reference.iter().map(|(k, v)| (*k, v.clone())).collect();
            assert_eq!(collect(tree.iter().unwrap()), expected);
        }
    }

    let remaining: Vec<u32> = reference.keys().copied().collect();
    for key in remaining {
        assert_eq!(tree.remove(&key).unwrap(), reference.remove(&key));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.store_stats().live_blocks(), 0);
}

#[test]
fn test_large_entries_near_limit() {
    // Entries just under half a node still split two ways
    let mut tree = memory_tree(1024, 8);
    for i in 0..40u32 {
        tree.put(i, "x".repeat(450)).unwrap();
    }
    assert_eq!(tree.len(), 40);
    let entries = collect(tree.iter().unwrap());
    assert_eq!(keys_of(&entries), (0..40u32).collect::<Vec<_>>());
}
