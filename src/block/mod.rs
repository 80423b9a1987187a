//! Block Module
//!
//! The sorted block format: one fixed-size byte block holding a
//! pointer-sorted run of encoded entries.
//!
//! ## Block Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header                                                       │
//! │   ReservedLen: u32 (4) | Reserved (R) | PtrTag: u8 (1)       │
//! │   Count: ptr (2|4)     | BytesWritten: ptr (2|4)             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Pointer Table (Count × ptr), sorted by entry key  ──────►    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Free space                                                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Region (BytesWritten)                         ◄──────   │
//! │   [entry][entry]...[entry]  packed against the block end     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Header integers are little-endian. The pointer table grows from the
//! header end, the data region grows down from the block end, and the data
//! region is kept contiguous on delete, so `BytesWritten` is always the sum
//! of the entry sizes.

mod iterator;
mod sorted;

pub use iterator::BlockIter;
pub use sorted::SortedBlock;

use crate::error::{BlockKvError, Result};

/// Header bytes present in every block regardless of its parameters:
/// ReservedLen (4) + PtrTag (1)
pub const BLOCK_HEADER_FIXED_SIZE: usize = 5;

/// Byte width of the offsets stored in a block's pointer table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 2-byte offsets, blocks up to 64 KiB
    Normal,
    /// 4-byte offsets
    Large,
}

impl PointerWidth {
    /// Size of one pointer in bytes
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Normal => 2,
            PointerWidth::Large => 4,
        }
    }

    /// Tag persisted in block and tree headers
    pub fn tag(self) -> u8 {
        match self {
            PointerWidth::Normal => 0,
            PointerWidth::Large => 1,
        }
    }

    /// Parse a persisted tag
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PointerWidth::Normal),
            1 => Ok(PointerWidth::Large),
            other => Err(BlockKvError::CorruptBlock(format!(
                "unknown pointer width tag {}",
                other
            ))),
        }
    }

    /// Largest block whose offsets are representable with this width
    pub fn max_block_size(self) -> usize {
        match self {
            PointerWidth::Normal => u16::MAX as usize + 1,
            PointerWidth::Large => u32::MAX as usize,
        }
    }

    pub(crate) fn read(self, buf: &[u8], at: usize) -> usize {
        match self {
            PointerWidth::Normal => u16::from_le_bytes([buf[at], buf[at + 1]]) as usize,
            PointerWidth::Large => {
                u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]) as usize
            }
        }
    }

    pub(crate) fn write(self, buf: &mut [u8], at: usize, value: usize) {
        match self {
            PointerWidth::Normal => {
                buf[at..at + 2].copy_from_slice(&(value as u16).to_le_bytes())
            }
            PointerWidth::Large => {
                buf[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes())
            }
        }
    }
}
