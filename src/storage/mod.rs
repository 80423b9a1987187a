//! Storage Module
//!
//! Fixed-size block storage underneath the tree.
//!
//! ## Responsibilities
//! - Allocate and free blocks, reusing freed ones first
//! - Read and write whole blocks by id
//! - Persist a small metadata region for the store's owner
//! - Flush/fsync and release the backing file
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Block 0: Superblock                                          │
//! │   Magic "BKVS" (4) | Version: u16 (2) | BlockSize: u32 (4)   │
//! │   BlockCount: u64 (8) | FreeHead: u64 (8) | FreeCount: u64 (8)│
//! │   MetaLen: u32 (4) | Meta (MetaLen) | CRC32 (4)              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Block 1..BlockCount                                          │
//! │   live block: owner bytes                                    │
//! │   free block: NextFree: u64 (8) | zeros                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod file;
mod memory;

use std::fmt;

use crate::error::Result;

pub use file::FileBlockStore;
pub use memory::MemoryBlockStore;

/// Opaque identifier of one block in a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Sentinel persisted where no block is referenced
    pub const NONE: BlockId = BlockId(u64::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// `None` for the sentinel, `Some(self)` otherwise
    pub fn into_option(self) -> Option<BlockId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Snapshot of a store's allocation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub block_size: usize,
    /// Blocks in the file, superblock included
    pub block_count: u64,
    /// Blocks on the free list
    pub free_blocks: u64,
}

impl StoreStats {
    /// Blocks currently handed out to the owner
    pub fn live_blocks(&self) -> u64 {
        self.block_count.saturating_sub(1 + self.free_blocks)
    }
}

/// Fixed-size block storage
///
/// Implementations own the persisted bytes; callers only ever see copies.
pub trait BlockStore {
    /// Size of every block in bytes
    fn block_size(&self) -> usize;

    /// Hand out a block, reusing freed blocks first. Contents are zeroed.
    fn allocate(&mut self) -> Result<BlockId>;

    /// Return a block to the free list
    fn free(&mut self, id: BlockId) -> Result<()>;

    /// Read a whole block
    fn read(&mut self, id: BlockId) -> Result<Vec<u8>>;

    /// Overwrite a whole block; `data` must be exactly one block long
    fn write(&mut self, id: BlockId, data: &[u8]) -> Result<()>;

    /// Owner metadata persisted with the store header
    fn metadata(&self) -> &[u8];

    /// Replace the owner metadata (persisted on the next flush)
    fn set_metadata(&mut self, meta: &[u8]) -> Result<()>;

    /// Write the store header and buffered data to the backing file
    fn flush(&mut self) -> Result<()>;

    /// `flush` followed by an fsync
    fn sync(&mut self) -> Result<()>;

    fn stats(&self) -> StoreStats;

    /// Release the store and permanently remove its backing file
    fn destroy(self) -> Result<()>
    where
        Self: Sized;
}
