//! Tests for the SortedBlock format
//!
//! These tests verify:
//! - Binary search over encoded entries
//! - Ordered insert, replace and compacting delete
//! - Bulk load through unsorted insert plus sort
//! - Split and merge preserve the entry set
//! - Capacity errors and range iteration in both directions

use std::ops::Bound;

use blockkv::{BlockKvError, PointerWidth, SortedBlock};

// =============================================================================
// Helper Functions
// =============================================================================

const WORDS: [&str; 10] = [
    "hotel", "delta", "alpha", "bravo", "india", "echo", "foxtrot", "juliet", "charlie", "golf",
];

fn word_block() -> SortedBlock<String> {
    let mut block = SortedBlock::new(1024, PointerWidth::Normal, 0).unwrap();
    for word in WORDS {
        block.insert(&word.to_string()).unwrap();
    }
    block
}

fn sorted_words() -> Vec<String> {
    let mut words: Vec<String> = WORDS.iter().map(|w| w.to_string()).collect();
    words.sort();
    words
}

fn numbers(block_size: usize, count: u32) -> SortedBlock<u32> {
    let mut block = SortedBlock::new(block_size, PointerWidth::Normal, 0).unwrap();
    for i in 0..count {
        block.insert(&(i * 10)).unwrap();
    }
    block
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_ten_words_search_and_delete() {
    let mut block = word_block();

    assert_eq!(block.len(), 10);
    assert_eq!(block.search(&"alpha".to_string()), Some(0));
    assert_eq!(block.delete_at(0).unwrap(), Some("alpha".to_string()));
    assert_eq!(block.len(), 9);
    assert_eq!(block.first().unwrap(), Some("bravo".to_string()));
}

#[test]
fn test_search_bc_reports_insertion_point() {
    let block = word_block();
    assert_eq!(block.search_bc(&"echo".to_string()), Ok(4));
    assert_eq!(block.search_bc(&"a".to_string()), Err(0));
    assert_eq!(block.search_bc(&"eel".to_string()), Err(5));
    assert_eq!(block.search_bc(&"zulu".to_string()), Err(10));
    assert!(!block.contains(&"kilo".to_string()));
}

#[test]
fn test_entries_come_back_sorted() {
    let block = word_block();
    assert_eq!(block.entries().unwrap(), sorted_words());
    assert_eq!(block.last().unwrap(), Some("juliet".to_string()));
}

// =============================================================================
// Mutation Tests
// =============================================================================

#[test]
fn test_delete_missing_key_returns_none() {
    let mut block = word_block();
    assert_eq!(block.delete(&"kilo".to_string()).unwrap(), None);
    assert_eq!(block.delete_at(42).unwrap(), None);
    assert_eq!(block.len(), 10);
}

#[test]
fn test_delete_frees_exact_space() {
    let mut block = word_block();
    let before = block.free_space();
    block.delete(&"foxtrot".to_string()).unwrap();
    // 4-byte prefix + 7 bytes + 2-byte pointer
    assert_eq!(block.free_space(), before + 13);
}

#[test]
fn test_unsorted_insert_then_sort() {
    let mut block: SortedBlock<String> = SortedBlock::new(1024, PointerWidth::Large, 0).unwrap();
    for word in WORDS {
        block.insert_unsorted(&word.to_string()).unwrap();
    }
    block.sort(false);
    assert_eq!(block.entries().unwrap(), sorted_words());

    block.sort(true);
    let mut descending = sorted_words();
    descending.reverse();
    assert_eq!(block.entries().unwrap(), descending);
}

#[test]
fn test_insert_into_full_block_is_capacity_exceeded() {
    // 256 - 9 byte header = 247 payload; each u32 costs 6
    let mut block = numbers(256, 41);
    assert_eq!(block.free_space(), 1);
    assert!(!block.fits_entry(&7));
    assert!(matches!(
        block.insert(&7),
        Err(BlockKvError::CapacityExceeded { needed: 6, available: 1 })
    ));
    assert_eq!(block.len(), 41);
}

#[test]
fn test_reload_from_bytes() {
    let block = word_block();
    let reloaded = SortedBlock::<String>::from_bytes(block.as_bytes().to_vec()).unwrap();
    assert_eq!(reloaded.entries().unwrap(), sorted_words());
    assert_eq!(reloaded.free_space(), block.free_space());
}

#[test]
fn test_truncated_block_is_corrupt() {
    let block = word_block();
    let bytes = block.as_bytes()[..3].to_vec();
    assert!(matches!(
        SortedBlock::<String>::from_bytes(bytes),
        Err(BlockKvError::CorruptBlock(_))
    ));
}

// =============================================================================
// Split / Merge Tests
// =============================================================================

#[test]
fn test_split_counts_differ_by_at_most_one() {
    for count in [2u32, 3, 10, 17] {
        let mut left = numbers(1024, count);
        let right = left.split().unwrap();
        assert!(left.len().abs_diff(right.len()) <= 1, "count {}", count);
        assert_eq!(left.len() + right.len(), count as usize);
        assert!(left.last().unwrap() < right.first().unwrap());
    }
}

#[test]
fn test_split_then_merge_reconstructs() {
    let mut left = word_block();
    let right = left.split().unwrap();
    assert!(left.fits(&right, None));

    left.merge(&right).unwrap();
    assert_eq!(left.entries().unwrap(), sorted_words());
    assert_eq!(left.used_bytes(), word_block().used_bytes());
}

#[test]
fn test_merge_restores_order_for_interleaved_blocks() {
    let mut evens: SortedBlock<u32> = SortedBlock::new(512, PointerWidth::Normal, 0).unwrap();
    let mut odds: SortedBlock<u32> = SortedBlock::new(512, PointerWidth::Normal, 0).unwrap();
    for i in 0..10u32 {
        if i % 2 == 0 {
            evens.insert(&i).unwrap();
        } else {
            odds.insert(&i).unwrap();
        }
    }
    evens.merge(&odds).unwrap();
    assert_eq!(evens.entries().unwrap(), (0..10).collect::<Vec<u32>>());
}

#[test]
fn test_merge_overflow_is_buffer_overflow() {
    let mut a = numbers(256, 30);
    let b = numbers(256, 30);
    assert!(!a.fits(&b, None));
    assert!(matches!(
        a.merge(&b),
        Err(BlockKvError::BufferOverflow { .. })
    ));
    assert_eq!(a.len(), 30);
}

#[test]
fn test_fits_accounts_for_extra_entry() {
    // Two blocks of 20 entries fill 240 of 247 payload bytes together
    let mut a = numbers(256, 20);
    let b = numbers(256, 20);
    assert!(a.fits(&b, Some(&1)));
    a.insert(&1).unwrap();
    assert!(!a.fits(&b, Some(&2)));
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_range_bounds_both_directions() {
    let block = numbers(512, 10); // 0, 10, ..., 90

    let forward: Vec<u32> = block
        .range(Bound::Included(&20), Bound::Excluded(&60), false)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(forward, vec![20, 30, 40, 50]);

    let backward: Vec<u32> = block
        .range(Bound::Excluded(&20), Bound::Included(&60), true)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(backward, vec![60, 50, 40, 30]);
}

#[test]
fn test_range_between_keys_and_empty_ranges() {
    let block = numbers(512, 10);

    let between: Vec<u32> = block
        .range(Bound::Included(&15), Bound::Included(&35), false)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(between, vec![20, 30]);

    assert_eq!(block.range(Bound::Included(&70), Bound::Excluded(&20), false).count(), 0);
    assert_eq!(block.range(Bound::Excluded(&90), Bound::Unbounded, false).count(), 0);
}

#[test]
fn test_iterators_are_restartable() {
    let block = word_block();
    let first: Vec<String> = block.iter().map(|e| e.unwrap()).collect();
    let second: Vec<String> = block.iter().map(|e| e.unwrap()).collect();
    assert_eq!(first, second);
    assert_eq!(block.iter().size_hint(), (10, Some(10)));
}
