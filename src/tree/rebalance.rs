//! Removal and underflow handling
//!
//! A node whose utilization drops below [`MIN_FILL_FACTOR`] is merged with an
//! adjacent sibling (the left one when it exists) if both fit one block.
//! Otherwise one entry moves over from that sibling and the separator in the
//! parent is updated. Merges remove a separator from the parent, which may
//! underflow in turn.

use crate::codec::Codec;
use crate::error::{BlockKvError, Result};
use crate::storage::{BlockId, BlockStore};

use super::btree::{Ancestors, BPlusTree};
use super::node::{BranchEntry, BranchNode, LeafNode, Node};

/// Nodes below this fraction of their payload are rebalanced
pub(crate) const MIN_FILL_FACTOR: f64 = 0.5;

impl<K, V, S> BPlusTree<K, V, S>
where
    K: Codec + Clone,
    V: Codec,
    S: BlockStore,
{
    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        if self.meta.root.is_none() {
            return Ok(None);
        }
        let probe = key.to_bytes();
        let (leaf_id, path) = self.descend(&probe)?;
        let mut leaf = self.load_leaf(leaf_id)?;
        let pos = match leaf.block.search_raw(&probe) {
            Ok(pos) => pos,
            Err(_) => return Ok(None),
        };

        let removed = leaf
            .block
            .delete_at(pos)?
            .and_then(|entry| entry.value)
            .ok_or_else(|| {
                BlockKvError::CorruptBlock(format!("leaf {} holds an entry without value", leaf_id))
            })?;
        self.meta.count = self.meta.count.saturating_sub(1);
        self.rebalance_leaf(leaf_id, leaf, path)?;
        self.take_value(&removed).map(Some)
    }

    fn rebalance_leaf(&mut self, id: BlockId, leaf: LeafNode<K>, mut path: Ancestors) -> Result<()> {
        let (parent_id, slot) = match path.pop() {
            Some(step) => step,
            None => {
                if leaf.block.is_empty() {
                    self.free_node(id)?;
                    self.meta.root = BlockId::NONE;
                    self.meta.height = 0;
                    tracing::trace!("Tree emptied, freed root leaf {}", id);
                    return Ok(());
                }
                return self.nodes.dirty(id, Node::Leaf(leaf));
            }
        };
        if leaf.block.utilization() >= MIN_FILL_FACTOR {
            return self.nodes.dirty(id, Node::Leaf(leaf));
        }

        let mut parent = self.load_branch(parent_id)?;
        if parent.child_count() < 2 {
            return self.nodes.dirty(id, Node::Leaf(leaf));
        }

        // Work on the (left, right) pair around separator `sep`.
        let underfull_is_left = slot == 0;
        let sep = if underfull_is_left { 0 } else { slot - 1 };
        let (left_id, right_id) = (parent.child_at(sep), parent.child_at(sep + 1));
        let (mut left, mut right) = if underfull_is_left {
            (leaf, self.load_leaf(right_id)?)
        } else {
            (self.load_leaf(left_id)?, leaf)
        };

        if left.block.fits(&right.block, None) {
            left.block.merge(&right.block)?;
            let next = right.next();
            left.set_next(next);
            if let Some(next_id) = next.into_option() {
                let mut after = self.load_leaf(next_id)?;
                after.set_prev(left_id);
                self.nodes.dirty(next_id, Node::Leaf(after))?;
            }
            self.nodes.dirty(left_id, Node::Leaf(left))?;
            self.free_node(right_id)?;
            parent.block.delete_at(sep)?;
            tracing::trace!("Merged leaf {} into {}", right_id, left_id);
            return self.rebalance_branch(parent_id, parent, path);
        }

        // Borrow one entry from the sibling
        let (donor, receiver) = if underfull_is_left {
            (&right, &left)
        } else {
            (&left, &right)
        };
        if donor.block.len() > 1 {
            let (moved_pos, first_after) = if underfull_is_left {
                (0, 1)
            } else {
                (donor.block.len() - 1, donor.block.len() - 1)
            };
            let moved = donor.block.get(moved_pos)?.ok_or_else(|| missing(id))?;
            let separator_key = if underfull_is_left {
                donor.block.get(first_after)?.ok_or_else(|| missing(id))?.key
            } else {
                moved.key.clone()
            };
            let separator = BranchEntry {
                key: separator_key,
                child: right_id,
            };

            if receiver.block.fits_entry(&moved) && absorbs(&parent, sep, &separator) {
                if underfull_is_left {
                    right.block.delete_at(moved_pos)?;
                    left.block.insert(&moved)?;
                } else {
                    left.block.delete_at(moved_pos)?;
                    right.block.insert(&moved)?;
                }
                parent.block.delete_at(sep)?;
                parent.block.insert(&separator)?;
                self.nodes.dirty(left_id, Node::Leaf(left))?;
                self.nodes.dirty(right_id, Node::Leaf(right))?;
                self.nodes.dirty(parent_id, Node::Branch(parent))?;
                tracing::trace!("Moved one entry between leaves {} and {}", left_id, right_id);
                return Ok(());
            }
        }

        // Underfull but valid
        if underfull_is_left {
            self.nodes.dirty(left_id, Node::Leaf(left))
        } else {
            self.nodes.dirty(right_id, Node::Leaf(right))
        }
    }

    fn rebalance_branch(&mut self, id: BlockId, node: BranchNode<K>, mut path: Ancestors) -> Result<()> {
        let (parent_id, slot) = match path.pop() {
            Some(step) => step,
            None => {
                if node.block.is_empty() {
                    let child = node.leftmost();
                    self.free_node(id)?;
                    self.meta.root = child;
                    self.meta.height -= 1;
                    tracing::trace!(
                        "Collapsed root {} into {} (height {})",
                        id,
                        child,
                        self.meta.height
                    );
                    return Ok(());
                }
                return self.nodes.dirty(id, Node::Branch(node));
            }
        };
        if node.block.utilization() >= MIN_FILL_FACTOR {
            return self.nodes.dirty(id, Node::Branch(node));
        }

        let mut parent = self.load_branch(parent_id)?;
        if parent.child_count() < 2 {
            return self.nodes.dirty(id, Node::Branch(node));
        }

        let underfull_is_left = slot == 0;
        let sep = if underfull_is_left { 0 } else { slot - 1 };
        let (left_id, right_id) = (parent.child_at(sep), parent.child_at(sep + 1));
        let (mut left, mut right) = if underfull_is_left {
            (node, self.load_branch(right_id)?)
        } else {
            (self.load_branch(left_id)?, node)
        };

        // The parent separator comes down over the right node's leftmost child
        let separator = parent.block.get(sep)?.ok_or_else(|| missing(parent_id))?;
        let pulled_down = BranchEntry {
            key: separator.key,
            child: right.leftmost(),
        };

        if left.block.fits(&right.block, Some(&pulled_down)) {
            left.block.insert(&pulled_down)?;
            left.block.merge(&right.block)?;
            self.nodes.dirty(left_id, Node::Branch(left))?;
            self.free_node(right_id)?;
            parent.block.delete_at(sep)?;
            tracing::trace!("Merged branch {} into {}", right_id, left_id);
            return self.rebalance_branch(parent_id, parent, path);
        }

        // Rotate one separator through the parent
        if underfull_is_left && right.block.len() > 1 {
            let first = right.block.first()?.ok_or_else(|| missing(right_id))?;
            let raised = BranchEntry {
                key: first.key,
                child: right_id,
            };
            if left.block.fits_entry(&pulled_down) && absorbs(&parent, sep, &raised) {
                left.block.insert(&pulled_down)?;
                right.block.delete_at(0)?;
                right.set_leftmost(first.child);
                parent.block.delete_at(sep)?;
                parent.block.insert(&raised)?;
                self.nodes.dirty(left_id, Node::Branch(left))?;
                self.nodes.dirty(right_id, Node::Branch(right))?;
                tracing::trace!("Rotated separator from branch {} to {}", right_id, left_id);
                return self.nodes.dirty(parent_id, Node::Branch(parent));
            }
        } else if !underfull_is_left && left.block.len() > 1 {
            let last = left.block.last()?.ok_or_else(|| missing(left_id))?;
            let raised = BranchEntry {
                key: last.key,
                child: right_id,
            };
            if right.block.fits_entry(&pulled_down) && absorbs(&parent, sep, &raised) {
                right.block.insert(&pulled_down)?;
                right.set_leftmost(last.child);
                left.block.delete_at(left.block.len() - 1)?;
                parent.block.delete_at(sep)?;
                parent.block.insert(&raised)?;
                self.nodes.dirty(left_id, Node::Branch(left))?;
                self.nodes.dirty(right_id, Node::Branch(right))?;
                tracing::trace!("Rotated separator from branch {} to {}", left_id, right_id);
                return self.nodes.dirty(parent_id, Node::Branch(parent));
            }
        }

        if underfull_is_left {
            self.nodes.dirty(left_id, Node::Branch(left))
        } else {
            self.nodes.dirty(right_id, Node::Branch(right))
        }
    }
}

/// Whether `parent` has room to swap separator `sep` for `replacement`
fn absorbs<K: Codec>(parent: &BranchNode<K>, sep: usize, replacement: &BranchEntry<K>) -> bool {
    parent.block.free_space() + parent.block.raw_entry(sep).len() >= replacement.byte_size()
}

fn missing(id: BlockId) -> BlockKvError {
    BlockKvError::CorruptBlock(format!("node {} is missing an expected entry", id))
}
