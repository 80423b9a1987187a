//! Overflow chains for values too large to keep in a leaf.
//!
//! ```text
//! ┌───────────────┬───────────────────────────────┐
//! │ Next: u64 LE  │ Payload (block_size - 8)      │  ──► next block ...
//! └───────────────┴───────────────────────────────┘
//! ```
//! The leaf records the head block and the total length, so the last block
//! needs no length of its own.

use crate::error::{BlockKvError, Result};
use crate::storage::{BlockId, BlockStore};

const LINK_SIZE: usize = 8;

fn payload_size(store: &impl BlockStore) -> usize {
    store.block_size() - LINK_SIZE
}

fn next_link(block: &[u8]) -> BlockId {
    let mut raw = [0u8; LINK_SIZE];
    raw.copy_from_slice(&block[..LINK_SIZE]);
    BlockId(u64::from_le_bytes(raw))
}

/// Write `bytes` to a fresh chain and return its head
pub(crate) fn write_chain<S: BlockStore>(store: &mut S, bytes: &[u8]) -> Result<BlockId> {
    let chunk = payload_size(store);
    let ids = (0..bytes.len().div_ceil(chunk).max(1))
        .map(|_| store.allocate())
        .collect::<Result<Vec<_>>>()?;

    for (i, id) in ids.iter().enumerate() {
        let next = ids.get(i + 1).copied().unwrap_or(BlockId::NONE);
        let start = (i * chunk).min(bytes.len());
        let end = (start + chunk).min(bytes.len());

        let mut block = vec![0u8; store.block_size()];
        block[..LINK_SIZE].copy_from_slice(&next.0.to_le_bytes());
        block[LINK_SIZE..LINK_SIZE + end - start].copy_from_slice(&bytes[start..end]);
        store.write(*id, &block)?;
    }
    tracing::trace!("Wrote {} byte value to {} overflow blocks", bytes.len(), ids.len());
    Ok(ids[0])
}

/// Read `len` bytes from the chain starting at `head`
pub(crate) fn read_chain<S: BlockStore>(store: &mut S, head: BlockId, len: usize) -> Result<Vec<u8>> {
    let chunk = payload_size(store);
    let mut out = Vec::with_capacity(len);
    let mut current = head;
    while out.len() < len {
        let id = current.into_option().ok_or_else(|| {
            BlockKvError::CorruptBlock(format!(
                "overflow chain at {} ends after {} of {} bytes",
                head,
                out.len(),
                len
            ))
        })?;
        let block = store.read(id)?;
        let take = chunk.min(len - out.len());
        out.extend_from_slice(&block[LINK_SIZE..LINK_SIZE + take]);
        current = next_link(&block);
    }
    Ok(out)
}

/// Return every block of the chain starting at `head` to the store
pub(crate) fn free_chain<S: BlockStore>(store: &mut S, head: BlockId) -> Result<()> {
    let mut current = head;
    let mut freed = 0;
    while let Some(id) = current.into_option() {
        let block = store.read(id)?;
        current = next_link(&block);
        store.free(id)?;
        freed += 1;
    }
    tracing::trace!("Freed overflow chain {} ({} blocks)", head, freed);
    Ok(())
}
