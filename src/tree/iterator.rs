//! Ordered iteration over a B+Tree
//!
//! The iterator descends once to the leaf holding the starting bound, then
//! follows sibling links. Within a leaf it delegates to the block iterator.

use std::ops::Bound;

use crate::block::{BlockIter, SortedBlock};
use crate::codec::Codec;
use crate::error::{BlockKvError, Result};
use crate::storage::{BlockId, BlockStore};

use super::btree::BPlusTree;
use super::node::LeafEntry;

type LeafIter<K> = BlockIter<SortedBlock<LeafEntry<K>>, LeafEntry<K>>;

/// Iterator over `(key, value)` pairs of a [`BPlusTree`]
///
/// Borrows the tree mutably: leaves are fetched through the node cache.
pub struct TreeIter<'a, K, V, S> {
    tree: &'a mut BPlusTree<K, V, S>,
    leaf: Option<LeafIter<K>>,
    /// Next leaf in walk direction
    following: BlockId,
    /// The current leaf was cut short by a bound, so no later leaf matches
    at_bound: bool,
    lower: Bound<LeafEntry<K>>,
    upper: Bound<LeafEntry<K>>,
    reverse: bool,
}

impl<'a, K, V, S> TreeIter<'a, K, V, S>
where
    K: Codec + Clone,
    V: Codec,
    S: BlockStore,
{
    pub(super) fn new(
        tree: &'a mut BPlusTree<K, V, S>,
        lower: Bound<K>,
        upper: Bound<K>,
        reverse: bool,
    ) -> Result<Self> {
        let mut iter = Self {
            tree,
            leaf: None,
            following: BlockId::NONE,
            at_bound: false,
            lower: probe_bound(lower),
            upper: probe_bound(upper),
            reverse,
        };
        if iter.tree.meta.root.is_none() {
            return Ok(iter);
        }

        let start_bound = if reverse { &iter.upper } else { &iter.lower };
        let start = match start_bound {
            Bound::Included(probe) | Bound::Excluded(probe) => {
                let key = probe.key.to_bytes();
                iter.tree.descend(&key)?.0
            }
            Bound::Unbounded => iter.tree.edge_leaf(reverse)?,
        };
        iter.enter(start)?;
        Ok(iter)
    }

    fn enter(&mut self, id: BlockId) -> Result<()> {
        let leaf = self.tree.load_leaf(id)?;
        self.following = if self.reverse { leaf.prev() } else { leaf.next() };

        let len = leaf.block.len();
        let (start, end) = leaf
            .block
            .position_range(self.lower.as_ref(), self.upper.as_ref());
        self.at_bound = if self.reverse { start > 0 } else { end < len };
        self.leaf = Some(
            leaf.block
                .into_range(self.lower.as_ref(), self.upper.as_ref(), self.reverse),
        );
        Ok(())
    }

    fn finish(&mut self) {
        self.leaf = None;
        self.following = BlockId::NONE;
    }

    fn resolve(&mut self, entry: LeafEntry<K>) -> Result<(K, V)> {
        match entry.value {
            Some(stored) => Ok((entry.key, self.tree.read_value(&stored)?)),
            None => Err(BlockKvError::CorruptBlock(
                "leaf entry without value".to_string(),
            )),
        }
    }
}

fn probe_bound<K>(bound: Bound<K>) -> Bound<LeafEntry<K>> {
    match bound {
        Bound::Included(key) => Bound::Included(LeafEntry::probe(key)),
        Bound::Excluded(key) => Bound::Excluded(LeafEntry::probe(key)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl<'a, K, V, S> Iterator for TreeIter<'a, K, V, S>
where
    K: Codec + Clone,
    V: Codec,
    S: BlockStore,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(leaf) = self.leaf.as_mut() {
                match leaf.next() {
                    Some(Ok(entry)) => {
                        let item = self.resolve(entry);
                        if item.is_err() {
                            self.finish();
                        }
                        return Some(item);
                    }
                    Some(Err(err)) => {
                        self.finish();
                        return Some(Err(err));
                    }
                    None => {}
                }
            }

            if self.at_bound {
                self.finish();
                return None;
            }
            let id = match self.following.into_option() {
                Some(id) => id,
                None => {
                    self.leaf = None;
                    return None;
                }
            };
            if let Err(err) = self.enter(id) {
                self.finish();
                return Some(Err(err));
            }
        }
    }
}
