//! In-memory block store for tests and scratch trees.

use crate::error::{BlockKvError, Result};

use super::{BlockId, BlockStore, StoreStats};

/// Block store keeping every block in a `Vec`
///
/// Block 0 is never handed out so ids match the file store's numbering.
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    block_size: usize,
    /// Index 0 is the unused superblock slot; `None` marks a freed block
    blocks: Vec<Option<Vec<u8>>>,
    free: Vec<BlockId>,
    meta: Vec<u8>,
    /// Completed `flush`/`sync` calls
    flushes: u64,
}

impl MemoryBlockStore {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: vec![None],
            free: Vec::new(),
            meta: Vec::new(),
            flushes: 0,
        }
    }

    /// Number of completed flushes (for tests)
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn slot(&mut self, id: BlockId) -> Result<&mut Vec<u8>> {
        if id.0 == 0 {
            return Err(BlockKvError::InvalidBlock(id));
        }
        self.blocks
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(BlockKvError::InvalidBlock(id))
    }
}

impl BlockStore for MemoryBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&mut self) -> Result<BlockId> {
        let zeroes = vec![0u8; self.block_size];
        if let Some(id) = self.free.pop() {
            self.blocks[id.0 as usize] = Some(zeroes);
            return Ok(id);
        }
        self.blocks.push(Some(zeroes));
        Ok(BlockId(self.blocks.len() as u64 - 1))
    }

    fn free(&mut self, id: BlockId) -> Result<()> {
        self.slot(id)?;
        self.blocks[id.0 as usize] = None;
        self.free.push(id);
        Ok(())
    }

    fn read(&mut self, id: BlockId) -> Result<Vec<u8>> {
        self.slot(id).map(|block| block.clone())
    }

    fn write(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        let block_size = self.block_size;
        if data.len() != block_size {
            return Err(BlockKvError::CorruptBlock(format!(
                "write of {} bytes to a {} byte block",
                data.len(),
                block_size
            )));
        }
        self.slot(id)?.copy_from_slice(data);
        Ok(())
    }

    fn metadata(&self) -> &[u8] {
        &self.meta
    }

    fn set_metadata(&mut self, meta: &[u8]) -> Result<()> {
        self.meta = meta.to_vec();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            block_size: self.block_size,
            block_count: self.blocks.len() as u64,
            free_blocks: self.free.len() as u64,
        }
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}
