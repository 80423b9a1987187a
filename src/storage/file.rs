//! File-backed block store
//!
//! One file, block 0 holds the superblock, freed blocks form a linked list.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{BlockKvError, Result};

use super::{BlockId, BlockStore, StoreStats};

/// Magic bytes identifying a BlockKV store file
const MAGIC: &[u8; 4] = b"BKVS";

/// Current store format version
const VERSION: u16 = 1;

/// Superblock fields before the metadata:
/// Magic (4) + Version (2) + BlockSize (4) + BlockCount (8) + FreeHead (8)
/// + FreeCount (8) + MetaLen (4) = 38 bytes
const SUPERBLOCK_FIXED: usize = 38;

/// Trailing CRC32 of the superblock
const CRC_SIZE: usize = 4;

/// Smallest prefix needed to learn the block size of an existing file
const PROBE_SIZE: usize = 10;

/// Block store over a single file
pub struct FileBlockStore {
    path: PathBuf,
    file: File,
    block_size: usize,
    block_count: u64,
    free_head: BlockId,
    free_count: u64,
    meta: Vec<u8>,
    /// Metadata as of the last header write
    flushed_meta: Vec<u8>,
}

impl FileBlockStore {
    /// Create a new store file, truncating anything at `path`
    pub fn create(path: &Path, block_size: usize) -> Result<Self> {
        if block_size < SUPERBLOCK_FIXED + CRC_SIZE + 8 {
            return Err(BlockKvError::Config(format!(
                "block size {} too small for the store header",
                block_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut store = Self {
            path: path.to_path_buf(),
            file,
            block_size,
            block_count: 1,
            free_head: BlockId::NONE,
            free_count: 0,
            meta: Vec::new(),
            flushed_meta: Vec::new(),
        };
        store.write_superblock()?;
        tracing::debug!("Created block store {:?} (block size {})", path, block_size);
        Ok(store)
    }

    /// Open an existing store file
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut probe = [0u8; PROBE_SIZE];
        file.read_exact(&mut probe)?;
        if &probe[0..4] != MAGIC {
            return Err(BlockKvError::CorruptBlock(format!(
                "invalid store magic: expected BKVS, got {:?}",
                &probe[0..4]
            )));
        }
        let version = u16::from_le_bytes([probe[4], probe[5]]);
        if version != VERSION {
            return Err(BlockKvError::CorruptBlock(format!(
                "unsupported store version: {}",
                version
            )));
        }
        let block_size = u32::from_le_bytes([probe[6], probe[7], probe[8], probe[9]]) as usize;
        if block_size < SUPERBLOCK_FIXED + CRC_SIZE {
            return Err(BlockKvError::CorruptBlock(format!(
                "superblock declares block size {}",
                block_size
            )));
        }

        let mut header = vec![0u8; block_size];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        let meta_len = read_u32(&header, 34) as usize;
        let crc_at = SUPERBLOCK_FIXED + meta_len;
        if crc_at + CRC_SIZE > block_size {
            return Err(BlockKvError::CorruptBlock(format!(
                "superblock metadata length {} exceeds block size {}",
                meta_len, block_size
            )));
        }
        let stored_crc = read_u32(&header, crc_at);
        let actual_crc = crc32fast::hash(&header[..crc_at]);
        if stored_crc != actual_crc {
            return Err(BlockKvError::CorruptBlock(format!(
                "superblock checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let block_count = read_u64(&header, 10);
        let file_len = file.metadata()?.len();
        if file_len < block_count * block_size as u64 {
            return Err(BlockKvError::CorruptBlock(format!(
                "file holds {} bytes but header claims {} blocks",
                file_len, block_count
            )));
        }

        let meta = header[SUPERBLOCK_FIXED..crc_at].to_vec();
        let store = Self {
            path: path.to_path_buf(),
            file,
            block_size,
            block_count,
            free_head: BlockId(read_u64(&header, 18)),
            free_count: read_u64(&header, 26),
            flushed_meta: meta.clone(),
            meta,
        };
        tracing::debug!(
            "Opened block store {:?}: {} blocks, {} free",
            path,
            store.block_count,
            store.free_count
        );
        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Largest metadata region the superblock can hold
    pub fn max_metadata_len(&self) -> usize {
        self.block_size - SUPERBLOCK_FIXED - CRC_SIZE
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_id(&self, id: BlockId) -> Result<()> {
        if id.0 == 0 || id.0 >= self.block_count {
            return Err(BlockKvError::InvalidBlock(id));
        }
        Ok(())
    }

    fn offset(&self, id: BlockId) -> u64 {
        id.0 * self.block_size as u64
    }

    fn encode_superblock(&self, meta: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; self.block_size];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[6..10].copy_from_slice(&(self.block_size as u32).to_le_bytes());
        header[10..18].copy_from_slice(&self.block_count.to_le_bytes());
        header[18..26].copy_from_slice(&self.free_head.0.to_le_bytes());
        header[26..34].copy_from_slice(&self.free_count.to_le_bytes());
        header[34..38].copy_from_slice(&(meta.len() as u32).to_le_bytes());

        let crc_at = SUPERBLOCK_FIXED + meta.len();
        header[SUPERBLOCK_FIXED..crc_at].copy_from_slice(meta);
        let crc = crc32fast::hash(&header[..crc_at]);
        header[crc_at..crc_at + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        header
    }

    /// Persist the header with the current metadata
    fn write_superblock(&mut self) -> Result<()> {
        let header = self.encode_superblock(&self.meta);
        self.write_block(BlockId(0), &header)?;
        self.flushed_meta = self.meta.clone();
        Ok(())
    }

    /// Persist the allocation state alone, keeping the metadata of the last
    /// flush
    fn write_free_list(&mut self) -> Result<()> {
        let header = self.encode_superblock(&self.flushed_meta);
        self.write_block(BlockId(0), &header)
    }

    fn write_block(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        let offset = self.offset(id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&mut self) -> Result<BlockId> {
        let zeroes = vec![0u8; self.block_size];

        if let Some(id) = self.free_head.into_option() {
            self.check_id(id)?;
            let block = self.read(id)?;
            self.free_head = BlockId(read_u64(&block, 0));
            self.free_count = self.free_count.saturating_sub(1);
            // The header on disk must not name a block that is about to be
            // overwritten
            self.write_free_list()?;
            self.write_block(id, &zeroes)?;
            tracing::trace!("Reused free block {}", id);
            return Ok(id);
        }

        let id = BlockId(self.block_count);
        self.block_count += 1;
        self.write_block(id, &zeroes)?;
        tracing::trace!("Appended block {}", id);
        Ok(id)
    }

    fn free(&mut self, id: BlockId) -> Result<()> {
        self.check_id(id)?;
        let mut block = vec![0u8; self.block_size];
        block[0..8].copy_from_slice(&self.free_head.0.to_le_bytes());
        self.write_block(id, &block)?;
        self.free_head = id;
        self.free_count += 1;
        tracing::trace!("Freed block {}", id);
        Ok(())
    }

    fn read(&mut self, id: BlockId) -> Result<Vec<u8>> {
        self.check_id(id)?;
        let mut block = vec![0u8; self.block_size];
        let offset = self.offset(id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut block)?;
        Ok(block)
    }

    fn write(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        self.check_id(id)?;
        if data.len() != self.block_size {
            return Err(BlockKvError::CorruptBlock(format!(
                "write of {} bytes to a {} byte block",
                data.len(),
                self.block_size
            )));
        }
        self.write_block(id, data)
    }

    fn metadata(&self) -> &[u8] {
        &self.meta
    }

    fn set_metadata(&mut self, meta: &[u8]) -> Result<()> {
        if meta.len() > self.max_metadata_len() {
            return Err(BlockKvError::CapacityExceeded {
                needed: meta.len(),
                available: self.max_metadata_len(),
            });
        }
        self.meta = meta.to_vec();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_superblock()?;
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            block_size: self.block_size,
            block_count: self.block_count,
            free_blocks: self.free_count,
        }
    }

    fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.file);
        fs::remove_file(&path)?;
        tracing::debug!("Removed block store {:?}", path);
        Ok(())
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
