//! Shadow writes between saves
//!
//! Blocks reachable from the last saved tree header are never overwritten or
//! freed before the next save. Rewriting such a block writes a shadow block
//! instead, and releasing one is queued. `commit` copies the shadows home,
//! records the new header, flushes, and only then frees what the saved tree
//! no longer references.
//!
//! Blocks allocated since the last commit are not part of the saved tree and
//! are written and freed in place.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::storage::{BlockId, BlockStore, StoreStats};

pub(crate) struct ShadowStore<S> {
    inner: S,
    /// Allocated since the last commit
    fresh: HashSet<BlockId>,
    /// Saved block -> block holding its newer contents
    shadows: HashMap<BlockId, BlockId>,
    /// Saved blocks to free once the next commit is durable
    released: Vec<BlockId>,
}

impl<S: BlockStore> ShadowStore<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            fresh: HashSet::new(),
            shadows: HashMap::new(),
            released: Vec::new(),
        }
    }

    /// Make the current blocks and `meta` the saved state
    pub(crate) fn commit(&mut self, meta: &[u8], sync: bool) -> Result<()> {
        let mut moved: Vec<(BlockId, BlockId)> =
            self.shadows.iter().map(|(home, shadow)| (*home, *shadow)).collect();
        moved.sort_unstable();
        for (home, shadow) in &moved {
            let bytes = self.inner.read(*shadow)?;
            self.inner.write(*home, &bytes)?;
        }

        self.inner.set_metadata(meta)?;
        if sync {
            self.inner.sync()?;
        } else {
            self.inner.flush()?;
        }
        self.shadows.clear();
        self.fresh.clear();

        let reclaimed: Vec<BlockId> = moved
            .into_iter()
            .map(|(_, shadow)| shadow)
            .chain(std::mem::take(&mut self.released))
            .collect();
        if reclaimed.is_empty() {
            return Ok(());
        }
        for id in &reclaimed {
            self.inner.free(*id)?;
        }
        self.inner.flush()?;
        tracing::trace!("Reclaimed {} blocks after save", reclaimed.len());
        Ok(())
    }

    /// Blocks written or released since the last commit
    pub(crate) fn pending(&self) -> usize {
        self.shadows.len() + self.released.len()
    }
}

impl<S: BlockStore> BlockStore for ShadowStore<S> {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn allocate(&mut self) -> Result<BlockId> {
        let id = self.inner.allocate()?;
        self.fresh.insert(id);
        Ok(id)
    }

    fn free(&mut self, id: BlockId) -> Result<()> {
        if self.fresh.remove(&id) {
            return self.inner.free(id);
        }
        if let Some(shadow) = self.shadows.remove(&id) {
            self.inner.free(shadow)?;
        }
        self.released.push(id);
        Ok(())
    }

    fn read(&mut self, id: BlockId) -> Result<Vec<u8>> {
        let at = self.shadows.get(&id).copied().unwrap_or(id);
        self.inner.read(at)
    }

    fn write(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        if self.fresh.contains(&id) {
            return self.inner.write(id, data);
        }
        let shadow = match self.shadows.get(&id) {
            Some(shadow) => *shadow,
            None => {
                let shadow = self.inner.allocate()?;
                self.shadows.insert(id, shadow);
                tracing::trace!("Shadowing saved block {} at {}", id, shadow);
                shadow
            }
        };
        self.inner.write(shadow, data)
    }

    fn metadata(&self) -> &[u8] {
        self.inner.metadata()
    }

    fn set_metadata(&mut self, meta: &[u8]) -> Result<()> {
        self.inner.set_metadata(meta)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }

    fn destroy(self) -> Result<()> {
        self.inner.destroy()
    }
}
