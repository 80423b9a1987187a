//! Tree Module
//!
//! Ordered key/value indexes stored in blocks.
//!
//! ## Responsibilities
//! - Route point lookups, inserts and removals through multi-level descent
//! - Keep every node within one block by splitting and merging
//! - Iterate in key order, in either direction, between arbitrary bounds
//! - Persist the tree header and dirty nodes on `save()`
//!
//! ## B+Tree Layout
//! ```text
//!                    ┌──────────────────────┐
//!   height 2         │ Branch  [k1 | k2]    │   leftmost ─┐
//!                    └──┬──────────┬────────┘             │
//!            ┌──────────┘          └─────┐                │
//!            ▼                           ▼                ▼
//!   ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//!   │ Leaf  < k1     │◄►│ Leaf [k1, k2)  │◄►│ Leaf >= k2     │  height 1
//!   └────────────────┘  └────────────────┘  └────────────────┘
//! ```
//! Separators equal to a key route right. Leaves are doubly linked for
//! range scans. Height 0 is the empty tree with no root block.

mod btree;
mod cached;
mod iterator;
mod meta;
mod node;
mod overflow;
mod rebalance;
mod shadow;

use std::ops::Bound;

use crate::error::Result;

pub use btree::BPlusTree;
pub use cached::CachedTree;
pub use iterator::TreeIter;
pub use node::{BranchEntry, LeafEntry, StoredValue};

/// An ordered, persistent key/value index
pub trait TreeIndex<K, V> {
    /// Iterator returned by [`TreeIndex::scan`]
    type Iter<'a>: Iterator<Item = Result<(K, V)>>
    where
        Self: 'a;

    /// Insert or replace, returning the previous value
    fn put(&mut self, key: K, value: V) -> Result<Option<V>>;

    fn get(&mut self, key: &K) -> Result<Option<V>>;

    /// Remove a key, returning its value
    fn remove(&mut self, key: &K) -> Result<Option<V>>;

    fn contains_key(&mut self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of keys
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries between two bounds, ascending or descending
    fn scan(&mut self, lower: Bound<K>, upper: Bound<K>, reverse: bool) -> Result<Self::Iter<'_>>;

    /// Persist every change made so far
    fn save(&mut self) -> Result<()>;

    /// Save and release the index
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Release the index and remove its storage
    fn delete(self) -> Result<()>
    where
        Self: Sized;
}
