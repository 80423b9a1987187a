//! Tree header persisted in the block store's metadata region.
//!
//! ```text
//! Magic "BKVT" (4) | Version: u8 (1) | PtrTag: u8 (1)
//! Root: u64 (8) | Height: u32 (4) | Count: u64 (8)
//! ValueStorage: u8 (1) | Threshold: u32 (4)
//! ```
//! All integers big-endian.

use bytes::{Buf, BufMut};

use crate::block::PointerWidth;
use crate::config::ValueStorage;
use crate::error::{BlockKvError, Result};
use crate::storage::BlockId;

const MAGIC: &[u8; 4] = b"BKVT";
const VERSION: u8 = 1;

/// Encoded header size
pub(crate) const META_SIZE: usize = 4 + 1 + 1 + 8 + 4 + 8 + 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TreeMeta {
    pub pointer_width: PointerWidth,
    pub root: BlockId,
    pub height: u32,
    pub count: u64,
    pub value_storage: ValueStorage,
}

impl TreeMeta {
    pub fn empty(pointer_width: PointerWidth, value_storage: ValueStorage) -> Self {
        Self {
            pointer_width,
            root: BlockId::NONE,
            height: 0,
            count: 0,
            value_storage,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(META_SIZE);
        out.put_slice(MAGIC);
        out.put_u8(VERSION);
        out.put_u8(self.pointer_width.tag());
        out.put_u64(self.root.0);
        out.put_u32(self.height);
        out.put_u64(self.count);
        match self.value_storage {
            ValueStorage::Inline => {
                out.put_u8(0);
                out.put_u32(0);
            }
            ValueStorage::Overflow { threshold } => {
                out.put_u8(1);
                out.put_u32(threshold as u32);
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < META_SIZE {
            return Err(BlockKvError::CorruptBlock(format!(
                "tree header is {} bytes, expected {}",
                buf.len(),
                META_SIZE
            )));
        }
        if &buf[0..4] != MAGIC {
            return Err(BlockKvError::CorruptBlock(format!(
                "invalid tree magic: expected BKVT, got {:?}",
                &buf[0..4]
            )));
        }

        let mut buf = &buf[4..];
        let version = buf.get_u8();
        if version != VERSION {
            return Err(BlockKvError::CorruptBlock(format!(
                "unsupported tree version: {}",
                version
            )));
        }
        let pointer_width = PointerWidth::from_tag(buf.get_u8())?;
        let root = BlockId(buf.get_u64());
        let height = buf.get_u32();
        let count = buf.get_u64();
        let value_storage = match (buf.get_u8(), buf.get_u32()) {
            (0, _) => ValueStorage::Inline,
            (1, threshold) => ValueStorage::Overflow {
                threshold: threshold as usize,
            },
            (tag, _) => {
                return Err(BlockKvError::CorruptBlock(format!(
                    "unknown value storage tag {}",
                    tag
                )))
            }
        };

        if root.is_none() != (height == 0) {
            return Err(BlockKvError::CorruptBlock(format!(
                "tree root {} inconsistent with height {}",
                root, height
            )));
        }

        Ok(Self {
            pointer_width,
            root,
            height,
            count,
            value_storage,
        })
    }
}
