//! Tree node encoding
//!
//! A node is one `SortedBlock` whose reserved header bytes carry the node
//! kind and its links.
//!
//! ```text
//! Reserved area (17 bytes)
//! ┌──────────┬─────────────────────────┬─────────────────────────┐
//! │ Kind (1) │ Leaf: Prev (8)          │ Leaf: Next (8)          │
//! │          │ Branch: Leftmost (8)    │ Branch: unused (8)      │
//! └──────────┴─────────────────────────┴─────────────────────────┘
//!
//! LeafEntry:   Key | Tag: u8 | Inline: Len u32 BE + bytes
//!                            | Overflow: Head u64 BE + Len u32 BE
//! BranchEntry: Key | Child: u64 BE
//! ```
//!
//! Both entry types compare by key only, so an encoded key is a valid
//! search probe.

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::block::{PointerWidth, SortedBlock};
use crate::codec::{ensure_len, Codec};
use crate::error::{BlockKvError, Result};
use crate::storage::BlockId;

/// Bytes of node metadata kept in every block's reserved area
pub(crate) const NODE_RESERVED: usize = 17;

const KIND_LEAF: u8 = 1;
const KIND_BRANCH: u8 = 2;

const TAG_ABSENT: u8 = 0;
const TAG_INLINE: u8 = 1;
const TAG_OVERFLOW: u8 = 2;

// =============================================================================
// Entries
// =============================================================================

/// Where a leaf keeps the encoded bytes of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Inline(Vec<u8>),
    /// Chain of overflow blocks starting at `head`
    Overflow { head: BlockId, len: u32 },
}

/// Key/value entry of a leaf node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry<K> {
    pub key: K,
    /// `None` only for search probes
    pub value: Option<StoredValue>,
}

impl<K> LeafEntry<K> {
    pub fn probe(key: K) -> Self {
        Self { key, value: None }
    }
}

impl<K: Codec> Codec for LeafEntry<K> {
    fn encode<B: BufMut>(&self, out: &mut B) {
        self.key.encode(out);
        match &self.value {
            None => out.put_u8(TAG_ABSENT),
            Some(StoredValue::Inline(bytes)) => {
                out.put_u8(TAG_INLINE);
                out.put_u32(bytes.len() as u32);
                out.put_slice(bytes);
            }
            Some(StoredValue::Overflow { head, len }) => {
                out.put_u8(TAG_OVERFLOW);
                out.put_u64(head.0);
                out.put_u32(*len);
            }
        }
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let key_len = K::encoded_len(buf)?;
        let key = K::decode(buf)?;
        let mut rest = &buf[key_len..];
        ensure_len(rest, 1, "leaf value tag")?;
        let value = match rest.get_u8() {
            TAG_ABSENT => None,
            TAG_INLINE => {
                ensure_len(rest, 4, "inline value length")?;
                let len = rest.get_u32() as usize;
                ensure_len(rest, len, "inline value")?;
                Some(StoredValue::Inline(rest[..len].to_vec()))
            }
            TAG_OVERFLOW => {
                ensure_len(rest, 12, "overflow reference")?;
                let head = BlockId(rest.get_u64());
                let len = rest.get_u32();
                Some(StoredValue::Overflow { head, len })
            }
            tag => {
                return Err(BlockKvError::Codec(format!(
                    "unknown leaf value tag {}",
                    tag
                )))
            }
        };
        Ok(Self { key, value })
    }

    fn byte_size(&self) -> usize {
        let value = match &self.value {
            None => 0,
            Some(StoredValue::Inline(bytes)) => 4 + bytes.len(),
            Some(StoredValue::Overflow { .. }) => 12,
        };
        self.key.byte_size() + 1 + value
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        let key_len = K::encoded_len(buf)?;
        let rest = &buf[key_len..];
        ensure_len(rest, 1, "leaf value tag")?;
        let value_len = match rest[0] {
            TAG_ABSENT => 0,
            TAG_INLINE => {
                ensure_len(rest, 5, "inline value length")?;
                let len = (&rest[1..5]).get_u32() as usize;
                4 + len
            }
            TAG_OVERFLOW => 12,
            tag => {
                return Err(BlockKvError::Codec(format!(
                    "unknown leaf value tag {}",
                    tag
                )))
            }
        };
        ensure_len(rest, 1 + value_len, "leaf entry")?;
        Ok(key_len + 1 + value_len)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        K::compare_encoded(a, b)
    }
}

/// Separator entry of a branch node: keys `>= key` live under `child`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchEntry<K> {
    pub key: K,
    pub child: BlockId,
}

impl<K: Codec> Codec for BranchEntry<K> {
    fn encode<B: BufMut>(&self, out: &mut B) {
        self.key.encode(out);
        out.put_u64(self.child.0);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let key_len = K::encoded_len(buf)?;
        let key = K::decode(buf)?;
        let mut rest = &buf[key_len..];
        ensure_len(rest, 8, "branch child")?;
        Ok(Self {
            key,
            child: BlockId(rest.get_u64()),
        })
    }

    fn byte_size(&self) -> usize {
        self.key.byte_size() + 8
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        let key_len = K::encoded_len(buf)?;
        ensure_len(&buf[key_len..], 8, "branch child")?;
        Ok(key_len + 8)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        K::compare_encoded(a, b)
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// Decoded tree node
#[derive(Debug)]
pub(crate) enum Node<K> {
    Leaf(LeafNode<K>),
    Branch(BranchNode<K>),
}

impl<K> Clone for Node<K> {
    fn clone(&self) -> Self {
        match self {
            Node::Leaf(leaf) => Node::Leaf(LeafNode {
                block: leaf.block.clone(),
            }),
            Node::Branch(branch) => Node::Branch(BranchNode {
                block: branch.block.clone(),
            }),
        }
    }
}

impl<K: Codec> Node<K> {
    /// Decode a node block, dispatching on the kind byte
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 4 + NODE_RESERVED {
            return Err(BlockKvError::CorruptBlock(format!(
                "node block of {} bytes is too small",
                bytes.len()
            )));
        }
        let reserved_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if reserved_len != NODE_RESERVED {
            return Err(BlockKvError::CorruptBlock(format!(
                "node reserves {} header bytes, expected {}",
                reserved_len, NODE_RESERVED
            )));
        }
        match bytes[4] {
            KIND_LEAF => Ok(Node::Leaf(LeafNode {
                block: SortedBlock::from_bytes(bytes)?,
            })),
            KIND_BRANCH => Ok(Node::Branch(BranchNode {
                block: SortedBlock::from_bytes(bytes)?,
            })),
            kind => Err(BlockKvError::CorruptBlock(format!(
                "unknown node kind {}",
                kind
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => leaf.block.as_bytes(),
            Node::Branch(branch) => branch.block.as_bytes(),
        }
    }
}

fn read_link(reserved: &[u8], at: usize) -> BlockId {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&reserved[at..at + 8]);
    BlockId(u64::from_le_bytes(raw))
}

fn write_link(reserved: &mut [u8], at: usize, id: BlockId) {
    reserved[at..at + 8].copy_from_slice(&id.0.to_le_bytes());
}

/// Leaf node: sorted key/value entries plus sibling links
#[derive(Debug)]
pub(crate) struct LeafNode<K> {
    pub block: SortedBlock<LeafEntry<K>>,
}

impl<K: Codec> LeafNode<K> {
    pub fn new(block_size: usize, width: PointerWidth) -> Result<Self> {
        let mut block = SortedBlock::new(block_size, width, NODE_RESERVED)?;
        block.reserved_mut()[0] = KIND_LEAF;
        let mut leaf = Self { block };
        leaf.set_prev(BlockId::NONE);
        leaf.set_next(BlockId::NONE);
        Ok(leaf)
    }

    /// Wrap a block produced by splitting another leaf. Links are left
    /// for the caller to set.
    pub fn from_split(block: SortedBlock<LeafEntry<K>>) -> Self {
        let mut leaf = Self { block };
        leaf.block.reserved_mut()[0] = KIND_LEAF;
        leaf
    }

    pub fn prev(&self) -> BlockId {
        read_link(self.block.reserved(), 1)
    }

    pub fn next(&self) -> BlockId {
        read_link(self.block.reserved(), 9)
    }

    pub fn set_prev(&mut self, id: BlockId) {
        write_link(self.block.reserved_mut(), 1, id);
    }

    pub fn set_next(&mut self, id: BlockId) {
        write_link(self.block.reserved_mut(), 9, id);
    }
}

/// Branch node: separators plus a leftmost child
///
/// Child slot 0 is the leftmost child; slot `i > 0` is the child of
/// separator `i - 1`.
#[derive(Debug)]
pub(crate) struct BranchNode<K> {
    pub block: SortedBlock<BranchEntry<K>>,
}

impl<K: Codec> BranchNode<K> {
    pub fn new(block_size: usize, width: PointerWidth, leftmost: BlockId) -> Result<Self> {
        let mut block = SortedBlock::new(block_size, width, NODE_RESERVED)?;
        block.reserved_mut()[0] = KIND_BRANCH;
        let mut branch = Self { block };
        branch.set_leftmost(leftmost);
        Ok(branch)
    }

    pub fn from_split(block: SortedBlock<BranchEntry<K>>) -> Self {
        let mut branch = Self { block };
        branch.block.reserved_mut()[0] = KIND_BRANCH;
        branch
    }

    pub fn leftmost(&self) -> BlockId {
        read_link(self.block.reserved(), 1)
    }

    pub fn set_leftmost(&mut self, id: BlockId) {
        write_link(self.block.reserved_mut(), 1, id);
    }

    /// Number of children (separators + 1)
    pub fn child_count(&self) -> usize {
        self.block.len() + 1
    }

    /// Child at `slot`, read straight from the encoded separator
    pub fn child_at(&self, slot: usize) -> BlockId {
        if slot == 0 {
            return self.leftmost();
        }
        let raw = self.block.raw_entry(slot - 1);
        let mut child = [0u8; 8];
        child.copy_from_slice(&raw[raw.len() - 8..]);
        BlockId(u64::from_be_bytes(child))
    }

    /// Slot of the child covering an encoded key. Separators equal to the
    /// key route right.
    pub fn route(&self, probe: &[u8]) -> usize {
        match self.block.search_raw(probe) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        }
    }
}
