//! SortedBlock implementation
//!
//! A decoded view over one block. Entries are located through the pointer
//! table and compared in encoded form, so search never decodes an entry.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Bound;

use crate::codec::Codec;
use crate::error::{BlockKvError, Result};

use super::iterator::BlockIter;
use super::{PointerWidth, BLOCK_HEADER_FIXED_SIZE};

/// A fixed-size block holding entries of type `E` in ascending key order
pub struct SortedBlock<E> {
    /// Raw block bytes (always `block_size` long)
    data: Vec<u8>,
    /// Offset width for the pointer table
    width: PointerWidth,
    /// Bytes reserved in the header for the block's owner
    reserved_len: usize,
    /// Number of entries (== pointer table length)
    count: usize,
    /// Size of the data region
    bytes_written: usize,
    _entry: PhantomData<fn() -> E>,
}

impl<E: Codec> SortedBlock<E> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create an empty block
    pub fn new(block_size: usize, width: PointerWidth, reserved_len: usize) -> Result<Self> {
        if block_size > width.max_block_size() {
            return Err(BlockKvError::Config(format!(
                "block size {} too large for {:?} pointers",
                block_size, width
            )));
        }
        let header_len = BLOCK_HEADER_FIXED_SIZE + reserved_len + 2 * width.bytes();
        if header_len >= block_size {
            return Err(BlockKvError::Config(format!(
                "block size {} cannot hold a {} byte header",
                block_size, header_len
            )));
        }

        let mut block = Self {
            data: vec![0u8; block_size],
            width,
            reserved_len,
            count: 0,
            bytes_written: 0,
            _entry: PhantomData,
        };
        block.data[0..4].copy_from_slice(&(reserved_len as u32).to_le_bytes());
        block.data[4 + reserved_len] = width.tag();
        block.write_counters();
        Ok(block)
    }

    /// Create an empty block with the same size, width and reserved length
    pub fn empty_like(&self) -> Self {
        let mut block = Self {
            data: vec![0u8; self.data.len()],
            width: self.width,
            reserved_len: self.reserved_len,
            count: 0,
            bytes_written: 0,
            _entry: PhantomData,
        };
        block.data[0..4].copy_from_slice(&(self.reserved_len as u32).to_le_bytes());
        block.data[4 + self.reserved_len] = self.width.tag();
        block.write_counters();
        block
    }

    /// Decode a block from raw bytes, validating every layout invariant
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let block_size = data.len();
        if block_size < BLOCK_HEADER_FIXED_SIZE {
            return Err(corrupt(format!("block of {} bytes has no header", block_size)));
        }

        let reserved_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if BLOCK_HEADER_FIXED_SIZE + reserved_len > block_size {
            return Err(corrupt(format!(
                "reserved length {} exceeds block size {}",
                reserved_len, block_size
            )));
        }

        let width = PointerWidth::from_tag(data[4 + reserved_len])?;
        let header_len = BLOCK_HEADER_FIXED_SIZE + reserved_len + 2 * width.bytes();
        if header_len > block_size || block_size > width.max_block_size() {
            return Err(corrupt(format!(
                "header of {} bytes does not fit block size {}",
                header_len, block_size
            )));
        }

        let counters = BLOCK_HEADER_FIXED_SIZE + reserved_len;
        let count = width.read(&data, counters);
        let bytes_written = width.read(&data, counters + width.bytes());

        if header_len + count * width.bytes() + bytes_written > block_size {
            return Err(corrupt(format!(
                "{} pointers and {} data bytes overflow block size {}",
                count, bytes_written, block_size
            )));
        }

        let block = Self {
            data,
            width,
            reserved_len,
            count,
            bytes_written,
            _entry: PhantomData,
        };
        block.validate_entries()?;
        Ok(block)
    }

    /// Check that pointers land in the data region and entries neither
    /// overlap nor leave gaps
    fn validate_entries(&self) -> Result<()> {
        let low = self.data_start();
        let mut spans = Vec::with_capacity(self.count);
        for pos in 0..self.count {
            let offset = self.pointer(pos);
            if offset < low || offset >= self.data.len() {
                return Err(corrupt(format!(
                    "pointer {} -> {} outside data region [{}, {})",
                    pos,
                    offset,
                    low,
                    self.data.len()
                )));
            }
            let len = E::encoded_len(&self.data[offset..])
                .map_err(|e| corrupt(format!("entry {} undecodable: {}", pos, e)))?;
            spans.push((offset, len));
        }

        spans.sort_unstable();
        let mut expected = low;
        for (offset, len) in spans {
            if offset != expected {
                return Err(corrupt(format!(
                    "entry at {} overlaps or leaves a gap (expected {})",
                    offset, expected
                )));
            }
            expected = offset + len;
        }
        if expected != self.data.len() {
            return Err(corrupt(format!(
                "data region ends at {} instead of {}",
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Layout Accessors
    // =========================================================================

    /// Raw block bytes, ready to be written to a block store
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the block, returning its raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes reserved in the header for the block's owner
    pub fn reserved(&self) -> &[u8] {
        &self.data[4..4 + self.reserved_len]
    }

    pub fn reserved_mut(&mut self) -> &mut [u8] {
        &mut self.data[4..4 + self.reserved_len]
    }

    /// Size of the header including counters
    pub fn header_len(&self) -> usize {
        BLOCK_HEADER_FIXED_SIZE + self.reserved_len + 2 * self.width.bytes()
    }

    /// Bytes available for pointers and entries in an empty block
    pub fn payload_capacity(&self) -> usize {
        self.data.len() - self.header_len()
    }

    /// Bytes taken by pointers and entries
    pub fn used_bytes(&self) -> usize {
        self.count * self.width.bytes() + self.bytes_written
    }

    pub fn free_space(&self) -> usize {
        self.payload_capacity() - self.used_bytes()
    }

    /// Fraction of the payload in use, in `[0, 1]`
    pub fn utilization(&self) -> f64 {
        self.used_bytes() as f64 / self.payload_capacity() as f64
    }

    /// Bytes one entry costs in this block: its encoding plus one pointer
    pub fn entry_size(&self, entry: &E) -> usize {
        entry.byte_size() + self.width.bytes()
    }

    /// Whether `entry` can be inserted without exceeding capacity
    pub fn fits_entry(&self, entry: &E) -> bool {
        self.entry_size(entry) <= self.free_space()
    }

    /// Whether all of `other`'s entries, plus an optional extra one, can be
    /// merged into this block
    pub fn fits(&self, other: &SortedBlock<E>, extra: Option<&E>) -> bool {
        let extra = extra.map(|e| self.entry_size(e)).unwrap_or(0);
        self.used_bytes() + other.used_bytes() + extra <= self.payload_capacity()
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Binary search comparing encoded bytes.
    ///
    /// `Ok(pos)` if an entry with an equal key exists, `Err(pos)` with the
    /// insertion point otherwise.
    pub fn search_bc(&self, key: &E) -> std::result::Result<usize, usize> {
        let probe = key.to_bytes();
        self.search_raw(&probe)
    }

    /// Position of the entry with an equal key, if any
    pub fn search(&self, key: &E) -> Option<usize> {
        self.search_bc(key).ok()
    }

    pub fn contains(&self, key: &E) -> bool {
        self.search_bc(key).is_ok()
    }

    /// Binary search with an already-encoded probe.
    ///
    /// The probe only needs to carry the bytes the entry comparator reads,
    /// e.g. just the encoded key for key/value entries.
    pub fn search_raw(&self, probe: &[u8]) -> std::result::Result<usize, usize> {
        let mut low = 0;
        let mut high = self.count;
        while low < high {
            let mid = low + (high - low) / 2;
            match E::compare_encoded(self.entry_tail(mid), probe) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Decode the entry at `pos`
    pub fn get(&self, pos: usize) -> Result<Option<E>> {
        if pos >= self.count {
            return Ok(None);
        }
        E::decode(self.entry_tail(pos)).map(Some)
    }

    /// Decode the stored entry whose key equals `key`'s
    pub fn get_key(&self, key: &E) -> Result<Option<E>> {
        match self.search(key) {
            Some(pos) => self.get(pos),
            None => Ok(None),
        }
    }

    pub fn first(&self) -> Result<Option<E>> {
        self.get(0)
    }

    pub fn last(&self) -> Result<Option<E>> {
        match self.count {
            0 => Ok(None),
            n => self.get(n - 1),
        }
    }

    /// Decode every entry in order
    pub fn entries(&self) -> Result<Vec<E>> {
        self.iter().collect()
    }

    /// Encoded bytes of the entry at `pos`
    pub fn raw_entry(&self, pos: usize) -> &[u8] {
        let tail = self.entry_tail(pos);
        let len = E::encoded_len(tail).unwrap_or(tail.len());
        &tail[..len]
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert keeping ascending order. Equal keys are kept; the new entry
    /// goes after the existing ones.
    pub fn insert(&mut self, entry: &E) -> Result<()> {
        let bytes = entry.to_bytes();
        let mut pos = match self.search_raw(&bytes) {
            Ok(pos) => pos,
            Err(pos) => pos,
        };
        while pos < self.count
            && E::compare_encoded(self.entry_tail(pos), &bytes) != Ordering::Greater
        {
            pos += 1;
        }
        self.insert_raw(pos, &bytes)
    }

    /// Insert, or replace the entry with an equal key. Returns the replaced
    /// entry.
    pub fn put(&mut self, entry: &E) -> Result<Option<E>> {
        let bytes = entry.to_bytes();
        match self.search_raw(&bytes) {
            Ok(pos) => {
                let old_len = self.raw_entry(pos).len();
                let available = self.free_space() + old_len;
                if bytes.len() > available {
                    return Err(BlockKvError::CapacityExceeded {
                        needed: bytes.len(),
                        available,
                    });
                }
                let previous = self.delete_at(pos)?;
                self.insert_raw(pos, &bytes)?;
                Ok(previous)
            }
            Err(pos) => {
                self.insert_raw(pos, &bytes)?;
                Ok(None)
            }
        }
    }

    /// Append without keeping order. Call [`SortedBlock::sort`] once the bulk
    /// load is done.
    pub fn insert_unsorted(&mut self, entry: &E) -> Result<()> {
        let bytes = entry.to_bytes();
        self.insert_raw(self.count, &bytes)
    }

    /// Sort the pointer table in one pass
    pub fn sort(&mut self, descending: bool) {
        let mut pointers: Vec<usize> = (0..self.count).map(|pos| self.pointer(pos)).collect();
        pointers.sort_by(|&a, &b| {
            let order = E::compare_encoded(&self.data[a..], &self.data[b..]);
            if descending {
                order.reverse()
            } else {
                order
            }
        });
        for (pos, offset) in pointers.into_iter().enumerate() {
            self.set_pointer(pos, offset);
        }
    }

    /// Remove the entry at `pos`, compacting pointers and data
    pub fn delete_at(&mut self, pos: usize) -> Result<Option<E>> {
        if pos >= self.count {
            return Ok(None);
        }
        let entry = E::decode(self.entry_tail(pos))?;
        let offset = self.pointer(pos);
        let len = self.raw_entry(pos).len();
        let low = self.data_start();

        // Slide everything below the removed entry up by `len`.
        self.data.copy_within(low..offset, low + len);
        self.data[low..low + len].fill(0);
        for other in 0..self.count {
            let p = self.pointer(other);
            if p < offset {
                self.set_pointer(other, p + len);
            }
        }

        let pw = self.width.bytes();
        let table = self.header_len();
        let slot = table + pos * pw;
        let table_end = table + self.count * pw;
        self.data.copy_within(slot + pw..table_end, slot);
        self.data[table_end - pw..table_end].fill(0);

        self.count -= 1;
        self.bytes_written -= len;
        self.write_counters();
        Ok(Some(entry))
    }

    /// Remove the entry whose key equals `key`'s
    pub fn delete(&mut self, key: &E) -> Result<Option<E>> {
        match self.search(key) {
            Some(pos) => self.delete_at(pos),
            None => Ok(None),
        }
    }

    /// Remove every entry, keeping the reserved bytes
    pub fn clear(&mut self) {
        let header_len = self.header_len();
        self.data[header_len..].fill(0);
        self.count = 0;
        self.bytes_written = 0;
        self.write_counters();
    }

    /// Move the upper half of the entries into a new sibling block.
    ///
    /// The sibling shares this block's size, pointer width and reserved
    /// length; its reserved bytes start zeroed. Entry counts of the two
    /// halves differ by at most one.
    pub fn split(&mut self) -> Result<SortedBlock<E>> {
        self.split_at(self.count / 2)
    }

    /// Move entries `pos..` into a new sibling block
    pub fn split_at(&mut self, pos: usize) -> Result<SortedBlock<E>> {
        let pos = pos.min(self.count);
        let mut sibling = self.empty_like();
        for moved in pos..self.count {
            let bytes = self.raw_entry(moved).to_vec();
            sibling.insert_raw(sibling.count, &bytes)?;
        }

        let kept: Vec<Vec<u8>> = (0..pos).map(|p| self.raw_entry(p).to_vec()).collect();
        self.clear();
        for bytes in &kept {
            self.insert_raw(self.count, bytes)?;
        }
        Ok(sibling)
    }

    /// Append all of `other`'s entries.
    ///
    /// Fails with `BufferOverflow` if the result would exceed capacity; check
    /// [`SortedBlock::fits`] first. Order is restored if `other` does not
    /// sort entirely after this block.
    pub fn merge(&mut self, other: &SortedBlock<E>) -> Result<()> {
        let needed = self.used_bytes() + other.used_bytes();
        if needed > self.payload_capacity() {
            return Err(BlockKvError::BufferOverflow {
                needed,
                available: self.payload_capacity(),
            });
        }
        if other.is_empty() {
            return Ok(());
        }

        let in_order = self.count == 0
            || E::compare_encoded(self.entry_tail(self.count - 1), other.entry_tail(0))
                != Ordering::Greater;
        for pos in 0..other.count {
            self.insert_raw(self.count, other.raw_entry(pos))?;
        }
        if !in_order {
            self.sort(false);
        }
        Ok(())
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterate over every entry in ascending order
    pub fn iter(&self) -> BlockIter<&SortedBlock<E>, E> {
        BlockIter::new(self, 0, self.count, false)
    }

    /// Iterate over entries between two bounds.
    ///
    /// Bounds are given in ascending key order; `reverse` walks from the
    /// upper bound down.
    pub fn range(
        &self,
        lower: Bound<&E>,
        upper: Bound<&E>,
        reverse: bool,
    ) -> BlockIter<&SortedBlock<E>, E> {
        let (start, end) = self.position_range(lower, upper);
        BlockIter::new(self, start, end, reverse)
    }

    /// Owning variant of [`SortedBlock::range`]
    pub fn into_range(
        self,
        lower: Bound<&E>,
        upper: Bound<&E>,
        reverse: bool,
    ) -> BlockIter<SortedBlock<E>, E> {
        let (start, end) = self.position_range(lower, upper);
        BlockIter::new(self, start, end, reverse)
    }

    /// Translate key bounds into a half-open position range
    pub fn position_range(&self, lower: Bound<&E>, upper: Bound<&E>) -> (usize, usize) {
        let start = match lower {
            Bound::Unbounded => 0,
            Bound::Included(key) => match self.search_bc(key) {
                Ok(pos) | Err(pos) => pos,
            },
            Bound::Excluded(key) => match self.search_bc(key) {
                Ok(pos) => pos + 1,
                Err(pos) => pos,
            },
        };
        let end = match upper {
            Bound::Unbounded => self.count,
            Bound::Included(key) => match self.search_bc(key) {
                Ok(pos) => pos + 1,
                Err(pos) => pos,
            },
            Bound::Excluded(key) => match self.search_bc(key) {
                Ok(pos) | Err(pos) => pos,
            },
        };
        (start, end.max(start))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn data_start(&self) -> usize {
        self.data.len() - self.bytes_written
    }

    fn pointer(&self, pos: usize) -> usize {
        self.width
            .read(&self.data, self.header_len() + pos * self.width.bytes())
    }

    fn set_pointer(&mut self, pos: usize, offset: usize) {
        let at = self.header_len() + pos * self.width.bytes();
        self.width.write(&mut self.data, at, offset);
    }

    /// Bytes from the entry at `pos` to the end of the block
    fn entry_tail(&self, pos: usize) -> &[u8] {
        &self.data[self.pointer(pos)..]
    }

    fn write_counters(&mut self) {
        let at = BLOCK_HEADER_FIXED_SIZE + self.reserved_len;
        let (count, written) = (self.count, self.bytes_written);
        self.width.write(&mut self.data, at, count);
        self.width
            .write(&mut self.data, at + self.width.bytes(), written);
    }

    /// Place encoded entry bytes in the data region and a pointer at `pos`
    fn insert_raw(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let pw = self.width.bytes();
        let needed = bytes.len() + pw;
        if needed > self.free_space() {
            return Err(BlockKvError::CapacityExceeded {
                needed,
                available: self.free_space(),
            });
        }

        let offset = self.data_start() - bytes.len();
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);

        let table = self.header_len();
        let slot = table + pos * pw;
        let table_end = table + self.count * pw;
        self.data.copy_within(slot..table_end, slot + pw);
        self.width.write(&mut self.data, slot, offset);

        self.count += 1;
        self.bytes_written += bytes.len();
        self.write_counters();
        Ok(())
    }
}

fn corrupt(message: String) -> BlockKvError {
    BlockKvError::CorruptBlock(message)
}

impl<E> Clone for SortedBlock<E> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            width: self.width,
            reserved_len: self.reserved_len,
            count: self.count,
            bytes_written: self.bytes_written,
            _entry: PhantomData,
        }
    }
}

impl<E> fmt::Debug for SortedBlock<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedBlock")
            .field("block_size", &self.data.len())
            .field("width", &self.width)
            .field("reserved_len", &self.reserved_len)
            .field("count", &self.count)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}
