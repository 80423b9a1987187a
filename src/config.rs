//! Configuration for BlockKV
//!
//! Centralized tree configuration with sensible defaults. The layout fields
//! (block size, pointer width, value storage) are fixed when a tree file is
//! created and are checked against the file header on reopen.

use crate::block::{PointerWidth, BLOCK_HEADER_FIXED_SIZE};
use crate::error::{BlockKvError, Result};

/// Smallest block size a tree accepts
pub const MIN_BLOCK_SIZE: usize = 256;

/// Largest block size a tree accepts
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for a B+Tree instance
#[derive(Debug, Clone)]
pub struct TreeConfig {
    // -------------------------------------------------------------------------
    // Layout Configuration (immutable after creation)
    // -------------------------------------------------------------------------
    /// Size in bytes of every block in the backing file
    pub block_size: usize,

    /// Width of intra-block offsets
    pub pointer_width: PointerWidth,

    /// Where values larger than a threshold live
    pub value_storage: ValueStorage,

    // -------------------------------------------------------------------------
    // Runtime Configuration
    // -------------------------------------------------------------------------
    /// Number of decoded nodes kept in the node cache
    pub cache_blocks: usize,

    /// fsync the backing file on every `save()`
    pub sync_on_save: bool,
}

/// Storage policy for leaf values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStorage {
    /// Values are stored inside the leaf entry
    Inline,

    /// Encoded values longer than `threshold` bytes are written to a chain of
    /// overflow blocks and the leaf keeps a reference
    Overflow { threshold: usize },
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            pointer_width: PointerWidth::Normal,
            value_storage: ValueStorage::Inline,
            cache_blocks: 256,
            sync_on_save: true,
        }
    }
}

impl TreeConfig {
    /// Create a new config builder
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::default()
    }

    /// Check the combination of settings before a tree is created
    pub fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err(BlockKvError::Config(format!(
                "block size {} outside [{}, {}]",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }

        if self.block_size > self.pointer_width.max_block_size() {
            return Err(BlockKvError::Config(format!(
                "block size {} needs large pointers (max {} for {:?})",
                self.block_size,
                self.pointer_width.max_block_size(),
                self.pointer_width
            )));
        }

        if self.cache_blocks == 0 {
            return Err(BlockKvError::Config(
                "node cache must hold at least one block".to_string(),
            ));
        }

        if let ValueStorage::Overflow { threshold } = self.value_storage {
            if threshold == 0 || threshold + BLOCK_HEADER_FIXED_SIZE > self.block_size {
                return Err(BlockKvError::Config(format!(
                    "overflow threshold {} must be in (0, {})",
                    threshold,
                    self.block_size - BLOCK_HEADER_FIXED_SIZE
                )));
            }
        }

        Ok(())
    }
}

/// Builder for TreeConfig
#[derive(Default)]
pub struct TreeConfigBuilder {
    config: TreeConfig,
}

impl TreeConfigBuilder {
    /// Set the block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the pointer width used inside blocks
    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.config.pointer_width = width;
        self
    }

    /// Set the value storage policy
    pub fn value_storage(mut self, storage: ValueStorage) -> Self {
        self.config.value_storage = storage;
        self
    }

    /// Set the number of nodes held by the node cache
    pub fn cache_blocks(mut self, count: usize) -> Self {
        self.config.cache_blocks = count;
        self
    }

    /// Enable or disable fsync on save
    pub fn sync_on_save(mut self, sync: bool) -> Self {
        self.config.sync_on_save = sync;
        self
    }

    pub fn build(self) -> TreeConfig {
        self.config
    }
}
