//! B+Tree over a block store
//!
//! Nodes are decoded once and kept in a write-back node cache. Evicted dirty
//! nodes go to the block store through a [`ShadowStore`], so the blocks of
//! the last saved tree stay intact until `save()` writes the rest of the
//! dirty nodes and commits the new tree header.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::path::Path;
use std::rc::Rc;

use crate::block::{SortedBlock, BLOCK_HEADER_FIXED_SIZE};
use crate::cache::{Loader, Remover, WriteBackCache};
use crate::codec::Codec;
use crate::config::{TreeConfig, ValueStorage};
use crate::error::{BlockKvError, Result};
use crate::storage::{BlockId, BlockStore, FileBlockStore, StoreStats};

use super::iterator::TreeIter;
use super::meta::TreeMeta;
use super::node::{BranchEntry, BranchNode, LeafEntry, LeafNode, Node, StoredValue, NODE_RESERVED};
use super::overflow;
use super::shadow::ShadowStore;
use super::TreeIndex;

/// Path from the root to a leaf: each branch visited and the child slot taken
pub(super) type Ancestors = Vec<(BlockId, usize)>;

// =============================================================================
// Node Cache Hooks
// =============================================================================

/// Decodes nodes from the store on a cache miss
pub(crate) struct NodeLoader<S> {
    store: Rc<RefCell<S>>,
}

impl<K: Codec, S: BlockStore> Loader<BlockId, Node<K>> for NodeLoader<S> {
    fn load(&mut self, id: &BlockId) -> Result<Option<Node<K>>> {
        let bytes = self.store.borrow_mut().read(*id)?;
        Node::from_bytes(bytes).map(Some)
    }
}

/// Writes dirty nodes back in place
pub(crate) struct NodeWriter<S> {
    store: Rc<RefCell<S>>,
}

impl<K: Codec, S: BlockStore> Remover<BlockId, Node<K>> for NodeWriter<S> {
    fn remove(&mut self, id: &BlockId, node: &Node<K>) -> Result<()> {
        self.store.borrow_mut().write(*id, node.as_bytes())
    }
}

type NodeCache<K, S> =
    WriteBackCache<BlockId, Node<K>, NodeLoader<ShadowStore<S>>, NodeWriter<ShadowStore<S>>>;

// =============================================================================
// BPlusTree
// =============================================================================

/// Disk-backed B+Tree mapping `K` to `V`
///
/// ## Example
/// ```no_run
/// use std::path::Path;
/// use blockkv::{BPlusTree, TreeConfig};
///
/// let mut tree: BPlusTree<String, u64> =
///     BPlusTree::create(Path::new("words.bkv"), TreeConfig::default())?;
/// tree.put("apple".to_string(), 3)?;
/// assert_eq!(tree.get(&"apple".to_string())?, Some(3));
/// tree.close()?;
/// # Ok::<(), blockkv::BlockKvError>(())
/// ```
pub struct BPlusTree<K, V, S = FileBlockStore> {
    pub(super) store: Rc<RefCell<ShadowStore<S>>>,
    pub(super) nodes: NodeCache<K, S>,
    pub(super) meta: TreeMeta,
    pub(super) block_size: usize,
    sync_on_save: bool,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> BPlusTree<K, V, FileBlockStore>
where
    K: Codec + Clone,
    V: Codec,
{
    /// Create a new tree file at `path`, replacing any existing file
    pub fn create(path: &Path, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let store = FileBlockStore::create(path, config.block_size)?;
        let tree = Self::with_store(store, config)?;
        tracing::debug!("Created B+Tree at {:?}", path);
        Ok(tree)
    }

    /// Open an existing tree file. Layout parameters come from the file;
    /// only the runtime settings of `config` apply.
    pub fn open(path: &Path, config: TreeConfig) -> Result<Self> {
        let store = FileBlockStore::open(path)?;
        if store.metadata().is_empty() {
            return Err(BlockKvError::CorruptBlock(format!(
                "{:?} holds no tree header",
                path
            )));
        }
        let tree = Self::with_store(store, config)?;
        tracing::debug!(
            "Opened B+Tree at {:?}: {} keys, height {}",
            path,
            tree.meta.count,
            tree.meta.height
        );
        Ok(tree)
    }
}

impl<K, V, S> BPlusTree<K, V, S>
where
    K: Codec + Clone,
    V: Codec,
    S: BlockStore,
{
    /// Build a tree over `store`, resuming the tree recorded in its metadata
    /// or starting an empty one
    pub fn with_store(store: S, config: TreeConfig) -> Result<Self> {
        let block_size = store.block_size();
        let meta = if store.metadata().is_empty() {
            let config = TreeConfig { block_size, ..config.clone() };
            config.validate()?;
            TreeMeta::empty(config.pointer_width, config.value_storage)
        } else {
            let meta = TreeMeta::decode(store.metadata())?;
            if meta.pointer_width != config.pointer_width
                || meta.value_storage != config.value_storage
            {
                tracing::debug!(
                    "Using stored layout {:?}/{:?} over configured {:?}/{:?}",
                    meta.pointer_width,
                    meta.value_storage,
                    config.pointer_width,
                    config.value_storage
                );
            }
            if block_size > meta.pointer_width.max_block_size() {
                return Err(BlockKvError::CorruptBlock(format!(
                    "block size {} not addressable with {:?} pointers",
                    block_size, meta.pointer_width
                )));
            }
            meta
        };

        if config.cache_blocks == 0 {
            return Err(BlockKvError::Config(
                "node cache must hold at least one block".to_string(),
            ));
        }

        let store = Rc::new(RefCell::new(ShadowStore::new(store)));
        let nodes = WriteBackCache::new(
            NodeWriter {
                store: Rc::clone(&store),
            },
            NodeLoader {
                store: Rc::clone(&store),
            },
            config.cache_blocks,
        );

        let mut tree = Self {
            store,
            nodes,
            meta,
            block_size,
            sync_on_save: config.sync_on_save,
            _value: PhantomData,
        };
        tree.write_meta()?;
        Ok(tree)
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Insert or replace a value, returning the previous one
    ///
    /// Fails with `CapacityExceeded`, leaving the tree untouched, if the
    /// entry does not fit an empty node.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let bytes = value.to_bytes();
        let spill = matches!(
            self.meta.value_storage,
            ValueStorage::Overflow { threshold } if bytes.len() > threshold
        );
        let value_size = if spill { 12 } else { 4 + bytes.len() };
        self.check_entry_size(&key, value_size)?;

        let stored = if spill {
            let len = u32::try_from(bytes.len()).map_err(|_| BlockKvError::CapacityExceeded {
                needed: bytes.len(),
                available: u32::MAX as usize,
            })?;
            let head = overflow::write_chain(&mut *self.store.borrow_mut(), &bytes)?;
            StoredValue::Overflow { head, len }
        } else {
            StoredValue::Inline(bytes)
        };
        let entry = LeafEntry {
            key,
            value: Some(stored),
        };

        if self.meta.root.is_none() {
            let id = self.allocate()?;
            let mut leaf = LeafNode::new(self.block_size, self.meta.pointer_width)?;
            leaf.block.insert(&entry)?;
            self.nodes.dirty(id, Node::Leaf(leaf))?;
            self.meta.root = id;
            self.meta.height = 1;
            self.meta.count = 1;
            tracing::trace!("Started tree at leaf {}", id);
            return Ok(None);
        }

        let probe = entry.key.to_bytes();
        let (leaf_id, path) = self.descend(&probe)?;
        let mut leaf = self.load_leaf(leaf_id)?;

        let previous = match leaf.block.search_raw(&probe) {
            Ok(pos) => leaf.block.delete_at(pos)?.and_then(|old| old.value),
            Err(_) => None,
        };

        if leaf.block.fits_entry(&entry) {
            leaf.block.insert(&entry)?;
            self.nodes.dirty(leaf_id, Node::Leaf(leaf))?;
        } else {
            self.split_leaf(leaf_id, leaf, &entry, path)?;
        }

        match previous {
            Some(stored) => self.take_value(&stored).map(Some),
            None => {
                self.meta.count += 1;
                Ok(None)
            }
        }
    }

    /// Look up a value
    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        match self.find(key)? {
            Some(stored) => self.read_value(&stored).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains_key(&mut self, key: &K) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Number of keys
    pub fn len(&self) -> u64 {
        self.meta.count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.count == 0
    }

    /// Levels from root to leaves; 0 for an empty tree
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// Smallest key, if any
    pub fn first_key(&mut self) -> Result<Option<K>> {
        self.edge_key(false)
    }

    /// Largest key, if any
    pub fn last_key(&mut self) -> Result<Option<K>> {
        self.edge_key(true)
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterate over every entry in ascending key order
    pub fn iter(&mut self) -> Result<TreeIter<'_, K, V, S>> {
        TreeIter::new(self, Bound::Unbounded, Bound::Unbounded, false)
    }

    /// Iterate over every entry in descending key order
    pub fn iter_rev(&mut self) -> Result<TreeIter<'_, K, V, S>> {
        TreeIter::new(self, Bound::Unbounded, Bound::Unbounded, true)
    }

    /// Iterate over the entries whose keys fall in `range`
    ///
    /// ```no_run
    /// # use std::path::Path;
    /// # use blockkv::{BPlusTree, TreeConfig};
    /// # let mut tree: BPlusTree<u64, u64> =
    /// #     BPlusTree::create(Path::new("ids.bkv"), TreeConfig::default())?;
    /// for entry in tree.range(10..=20, true)? {
    ///     let (key, value) = entry?;
    ///     println!("{} => {}", key, value);
    /// }
    /// # Ok::<(), blockkv::BlockKvError>(())
    /// ```
    pub fn range<R: RangeBounds<K>>(
        &mut self,
        range: R,
        reverse: bool,
    ) -> Result<TreeIter<'_, K, V, S>> {
        let lower = range.start_bound().cloned();
        let upper = range.end_bound().cloned();
        TreeIter::new(self, lower, upper, reverse)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write dirty nodes and the tree header, then flush the store
    ///
    /// Safe to call repeatedly. A tree reopened from the file sees exactly
    /// the state of the last completed save, whatever happened to the tree
    /// after it.
    pub fn save(&mut self) -> Result<()> {
        self.nodes.flush()?;
        let mut store = self.store.borrow_mut();
        let pending = store.pending();
        store.commit(&self.meta.encode(), self.sync_on_save)?;
        tracing::debug!(
            "Saved B+Tree: {} keys, height {}, {} saved blocks replaced",
            self.meta.count,
            self.meta.height,
            pending
        );
        Ok(())
    }

    /// Save and release the backing store
    pub fn close(mut self) -> Result<()> {
        self.save()?;
        self.nodes.discard();
        tracing::debug!("Closed B+Tree");
        Ok(())
    }

    /// Release the tree and remove its backing storage, discarding unsaved
    /// changes
    pub fn delete(self) -> Result<()> {
        let BPlusTree {
            store, mut nodes, ..
        } = self;
        nodes.discard();
        drop(nodes);

        let store = Rc::try_unwrap(store)
            .map_err(|_| BlockKvError::Config("block store is still shared".to_string()))?
            .into_inner();
        store.destroy()?;
        tracing::debug!("Deleted B+Tree");
        Ok(())
    }

    /// Allocation state of the backing store
    pub fn store_stats(&self) -> StoreStats {
        self.store.borrow().stats()
    }

    // =========================================================================
    // Descent
    // =========================================================================

    /// Walk from the root to the leaf covering an encoded key
    pub(super) fn descend(&mut self, probe: &[u8]) -> Result<(BlockId, Ancestors)> {
        let mut path = Vec::with_capacity(self.meta.height as usize);
        let mut id = self.meta.root;
        loop {
            if path.len() >= self.meta.height as usize {
                return Err(BlockKvError::CorruptBlock(format!(
                    "descent passed the recorded height {}",
                    self.meta.height
                )));
            }
            match self.nodes.get(&id)? {
                Some(Node::Branch(branch)) => {
                    let slot = branch.route(probe);
                    let child = branch.child_at(slot);
                    path.push((id, slot));
                    id = child;
                }
                Some(Node::Leaf(_)) => return Ok((id, path)),
                None => return Err(BlockKvError::InvalidBlock(id)),
            }
        }
    }

    /// Leftmost (or rightmost) leaf of the tree
    pub(super) fn edge_leaf(&mut self, last: bool) -> Result<BlockId> {
        let mut id = self.meta.root;
        for _ in 0..self.meta.height {
            match self.nodes.get(&id)? {
                Some(Node::Branch(branch)) => {
                    let slot = if last { branch.child_count() - 1 } else { 0 };
                    id = branch.child_at(slot);
                }
                Some(Node::Leaf(_)) => return Ok(id),
                None => return Err(BlockKvError::InvalidBlock(id)),
            }
        }
        Err(BlockKvError::CorruptBlock(format!(
            "no leaf within the recorded height {}",
            self.meta.height
        )))
    }

    fn edge_key(&mut self, last: bool) -> Result<Option<K>> {
        if self.meta.root.is_none() {
            return Ok(None);
        }
        let mut id = self.edge_leaf(last)?;
        loop {
            let leaf = self.load_leaf(id)?;
            let entry = if last {
                leaf.block.last()?
            } else {
                leaf.block.first()?
            };
            if let Some(entry) = entry {
                return Ok(Some(entry.key));
            }
            // An underfull leaf that could not be merged may be empty
            let sibling = if last { leaf.prev() } else { leaf.next() };
            match sibling.into_option() {
                Some(sibling) => id = sibling,
                None => return Ok(None),
            }
        }
    }

    fn find(&mut self, key: &K) -> Result<Option<StoredValue>> {
        if self.meta.root.is_none() {
            return Ok(None);
        }
        let probe = key.to_bytes();
        let (leaf_id, _) = self.descend(&probe)?;
        match self.nodes.get(&leaf_id)? {
            Some(Node::Leaf(leaf)) => match leaf.block.search_raw(&probe) {
                Ok(pos) => Ok(leaf.block.get(pos)?.and_then(|entry| entry.value)),
                Err(_) => Ok(None),
            },
            _ => Err(not_a(leaf_id, "leaf")),
        }
    }

    // =========================================================================
    // Splits
    // =========================================================================

    fn split_leaf(
        &mut self,
        leaf_id: BlockId,
        mut leaf: LeafNode<K>,
        entry: &LeafEntry<K>,
        path: Ancestors,
    ) -> Result<()> {
        let parts = split_block(&mut leaf.block, std::slice::from_ref(entry))?;
        let old_next = leaf.next();

        // The original leaf followed by its new right siblings, in key order
        let mut chain = vec![(leaf_id, leaf)];
        let mut separators = Vec::with_capacity(parts.len());
        for block in parts {
            let id = self.allocate()?;
            let mut node = LeafNode::from_split(block);
            let separator = node
                .block
                .first()?
                .ok_or_else(|| BlockKvError::CorruptBlock("split produced an empty leaf".to_string()))?
                .key;

            let prev = chain.len() - 1;
            chain[prev].1.set_next(id);
            node.set_prev(chain[prev].0);
            chain.push((id, node));
            separators.push(BranchEntry { key: separator, child: id });
        }

        let last = chain.len() - 1;
        let last_id = chain[last].0;
        chain[last].1.set_next(old_next);
        if let Some(next_id) = old_next.into_option() {
            if last_id != leaf_id {
                let mut next = self.load_leaf(next_id)?;
                next.set_prev(last_id);
                self.nodes.dirty(next_id, Node::Leaf(next))?;
            }
        }

        tracing::trace!("Split leaf {} into {} leaves", leaf_id, chain.len());
        for (id, node) in chain {
            self.nodes.dirty(id, Node::Leaf(node))?;
        }
        self.insert_separators(path, separators)
    }

    /// Add separators (in key order) for new right siblings, splitting
    /// ancestors and growing the root as needed
    fn insert_separators(&mut self, mut path: Ancestors, mut entries: Vec<BranchEntry<K>>) -> Result<()> {
        while !entries.is_empty() {
            let (parent_id, mut parent) = match path.pop() {
                Some((parent_id, _)) => (parent_id, self.load_branch(parent_id)?),
                None => self.grow_root()?,
            };

            let needed: usize = entries.iter().map(|entry| parent.block.entry_size(entry)).sum();
            if needed <= parent.block.free_space() {
                for entry in &entries {
                    parent.block.insert(entry)?;
                }
                return self.nodes.dirty(parent_id, Node::Branch(parent));
            }

            let parts = split_block(&mut parent.block, &entries)?;
            let mut promoted = Vec::with_capacity(parts.len());
            for block in parts {
                let mut right = BranchNode::from_split(block);
                let first = right.block.delete_at(0)?.ok_or_else(|| {
                    BlockKvError::CorruptBlock("split produced an empty branch".to_string())
                })?;
                right.set_leftmost(first.child);

                let right_id = self.allocate()?;
                tracing::trace!("Split branch {} -> {}", parent_id, right_id);
                self.nodes.dirty(right_id, Node::Branch(right))?;
                promoted.push(BranchEntry {
                    key: first.key,
                    child: right_id,
                });
            }
            self.nodes.dirty(parent_id, Node::Branch(parent))?;
            entries = promoted;
        }
        Ok(())
    }

    /// Put an empty branch above the current root
    fn grow_root(&mut self) -> Result<(BlockId, BranchNode<K>)> {
        let old_root = self.meta.root;
        let root = BranchNode::new(self.block_size, self.meta.pointer_width, old_root)?;
        let root_id = self.allocate()?;
        self.meta.root = root_id;
        self.meta.height += 1;
        tracing::trace!("New root {} (height {})", root_id, self.meta.height);
        Ok((root_id, root))
    }

    // =========================================================================
    // Node and Value Access
    // =========================================================================

    pub(super) fn load_leaf(&mut self, id: BlockId) -> Result<LeafNode<K>> {
        match self.nodes.get(&id)? {
            Some(Node::Leaf(leaf)) => Ok(LeafNode {
                block: leaf.block.clone(),
            }),
            Some(Node::Branch(_)) => Err(not_a(id, "leaf")),
            None => Err(BlockKvError::InvalidBlock(id)),
        }
    }

    pub(super) fn load_branch(&mut self, id: BlockId) -> Result<BranchNode<K>> {
        match self.nodes.get(&id)? {
            Some(Node::Branch(branch)) => Ok(BranchNode {
                block: branch.block.clone(),
            }),
            Some(Node::Leaf(_)) => Err(not_a(id, "branch")),
            None => Err(BlockKvError::InvalidBlock(id)),
        }
    }

    pub(super) fn allocate(&mut self) -> Result<BlockId> {
        self.store.borrow_mut().allocate()
    }

    /// Drop a node from the cache and return its block to the store
    pub(super) fn free_node(&mut self, id: BlockId) -> Result<()> {
        self.nodes.invalidate(&id);
        self.store.borrow_mut().free(id)
    }

    pub(super) fn read_value(&mut self, stored: &StoredValue) -> Result<V> {
        match stored {
            StoredValue::Inline(bytes) => V::decode(bytes),
            StoredValue::Overflow { head, len } => {
                let bytes = overflow::read_chain(&mut *self.store.borrow_mut(), *head, *len as usize)?;
                V::decode(&bytes)
            }
        }
    }

    /// Decode a value that is leaving the tree and free its overflow chain
    pub(super) fn take_value(&mut self, stored: &StoredValue) -> Result<V> {
        let value = self.read_value(stored)?;
        if let StoredValue::Overflow { head, .. } = stored {
            overflow::free_chain(&mut *self.store.borrow_mut(), *head)?;
        }
        Ok(value)
    }

    /// Largest entry (encoding plus pointer) a node accepts: the whole
    /// payload of an empty node
    fn entry_limit(&self) -> usize {
        let header = BLOCK_HEADER_FIXED_SIZE + NODE_RESERVED + 2 * self.meta.pointer_width.bytes();
        self.block_size - header
    }

    fn check_entry_size(&self, key: &K, value_size: usize) -> Result<()> {
        let key_size = key.byte_size();
        let leaf_size = key_size + 1 + value_size;
        let branch_size = key_size + 8;
        let needed = leaf_size.max(branch_size) + self.meta.pointer_width.bytes();
        let available = self.entry_limit();
        if needed > available {
            return Err(BlockKvError::CapacityExceeded { needed, available });
        }
        Ok(())
    }

    /// Record the tree header with the store. It reaches the file on the
    /// next commit.
    fn write_meta(&mut self) -> Result<()> {
        self.store.borrow_mut().set_metadata(&self.meta.encode())
    }
}

impl<K, V, S> TreeIndex<K, V> for BPlusTree<K, V, S>
where
    K: Codec + Clone,
    V: Codec,
    S: BlockStore,
{
    type Iter<'a> = TreeIter<'a, K, V, S> where Self: 'a;

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        BPlusTree::put(self, key, value)
    }

    fn get(&mut self, key: &K) -> Result<Option<V>> {
        BPlusTree::get(self, key)
    }

    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        BPlusTree::remove(self, key)
    }

    fn contains_key(&mut self, key: &K) -> Result<bool> {
        BPlusTree::contains_key(self, key)
    }

    fn len(&self) -> u64 {
        BPlusTree::len(self)
    }

    fn scan(&mut self, lower: Bound<K>, upper: Bound<K>, reverse: bool) -> Result<Self::Iter<'_>> {
        TreeIter::new(self, lower, upper, reverse)
    }

    fn save(&mut self) -> Result<()> {
        BPlusTree::save(self)
    }

    fn close(self) -> Result<()> {
        BPlusTree::close(self)
    }

    fn delete(self) -> Result<()> {
        BPlusTree::delete(self)
    }
}

fn not_a(id: BlockId, kind: &str) -> BlockKvError {
    BlockKvError::CorruptBlock(format!("block {} is not a {}", id, kind))
}

// =============================================================================
// Split Helpers
// =============================================================================

/// Where an entry of a block being split comes from
#[derive(Clone, Copy)]
enum Source {
    /// Position in the original block
    Kept(usize),
    /// Index into the entries being added
    Added(usize),
}

/// Split a block that cannot take `added` (sorted by key) and place every
/// added entry, returning the new right siblings in key order
///
/// An even split by count is tried first, then the most byte-balanced split
/// into two. When no two-way split fits (large entries in the middle), the
/// entries are packed greedily into as many blocks as needed.
pub(super) fn split_block<E: Codec>(block: &mut SortedBlock<E>, added: &[E]) -> Result<Vec<SortedBlock<E>>> {
    let pw = block.pointer_width().bytes();
    let mut order = Vec::with_capacity(block.len() + added.len());
    let mut next_kept = 0;
    for (index, entry) in added.iter().enumerate() {
        let at = match block.search_raw(&entry.to_bytes()) {
            Ok(pos) | Err(pos) => pos,
        };
        while next_kept < at {
            order.push(Source::Kept(next_kept));
            next_kept += 1;
        }
        order.push(Source::Added(index));
    }
    order.extend((next_kept..block.len()).map(Source::Kept));

    let sizes: Vec<usize> = order
        .iter()
        .map(|source| match source {
            Source::Kept(pos) => block.raw_entry(*pos).len() + pw,
            Source::Added(index) => block.entry_size(&added[*index]),
        })
        .collect();
    let capacity = block.payload_capacity();
    let cuts = partition(&sizes, capacity).ok_or_else(|| BlockKvError::CapacityExceeded {
        needed: sizes.iter().copied().max().unwrap_or(0),
        available: capacity,
    })?;

    // Cut from the right so earlier positions stay valid
    let mut parts = Vec::with_capacity(cuts.len());
    for &cut in cuts.iter().rev() {
        let kept_before = order[..cut]
            .iter()
            .filter(|source| matches!(source, Source::Kept(_)))
            .count();
        parts.push(block.split_at(kept_before)?);
    }
    parts.reverse();

    for (at, source) in order.iter().enumerate() {
        if let Source::Added(index) = source {
            match cuts.partition_point(|&cut| cut <= at) {
                0 => block.insert(&added[*index])?,
                part => parts[part - 1].insert(&added[*index])?,
            }
        }
    }
    Ok(parts)
}

/// Start positions of every run after the first, such that each run of
/// `sizes` fits `capacity`; `None` if a single entry is larger than that
fn partition(sizes: &[usize], capacity: usize) -> Option<Vec<usize>> {
    let total: usize = sizes.iter().sum();

    let mid = sizes.len() / 2;
    let left: usize = sizes[..mid].iter().sum();
    if mid > 0 && left <= capacity && total - left <= capacity {
        return Some(vec![mid]);
    }

    let mut best: Option<(usize, usize)> = None;
    let mut left = 0;
    for cut in 1..sizes.len() {
        left += sizes[cut - 1];
        let right = total - left;
        if left <= capacity && right <= capacity {
            let skew = left.abs_diff(right);
            if best.map_or(true, |(_, best_skew)| skew < best_skew) {
                best = Some((cut, skew));
            }
        }
    }
    if let Some((cut, _)) = best {
        return Some(vec![cut]);
    }

    let mut cuts = Vec::new();
    let mut run = 0;
    for (pos, &size) in sizes.iter().enumerate() {
        if size > capacity {
            return None;
        }
        if run + size > capacity {
            cuts.push(pos);
            run = 0;
        }
        run += size;
    }
    Some(cuts)
}
