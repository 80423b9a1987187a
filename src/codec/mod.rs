//! Codec Module
//!
//! The byte-level serialization contract consumed by blocks and trees.
//!
//! ## Responsibilities
//! - Encode a value into a caller-provided buffer
//! - Decode a value from the front of a byte slice
//! - Report encoded sizes without encoding (`byte_size`) and from raw bytes
//!   (`encoded_len`), so blocks can find entry boundaries without decoding
//! - Compare two encoded values directly (`compare_encoded`)
//!
//! Key codecs must make `compare_encoded` agree with the logical order of the
//! type. Every codec here is self-delimiting: the slice handed to `decode`,
//! `encoded_len` and `compare_encoded` may extend past the encoded value.
//!
//! ## Provided Codecs
//! ```text
//! u16/u32/u64    big-endian                 (order-preserving)
//! i32/i64        big-endian, sign bit flip  (order-preserving)
//! String/Vec<u8> len: u32 BE | bytes        (compares contents)
//! (A, B), (A, B, C) concatenation           (field-by-field)
//! Bincoded<T>    len: u32 BE | bincode      (values only)
//! ```

mod bincoded;
mod composite;
mod primitive;

use std::cmp::Ordering;

use bytes::BufMut;

use crate::error::{BlockKvError, Result};

pub use bincoded::Bincoded;

/// Explicit byte codec for one record type
pub trait Codec: Sized {
    /// Append the encoding of `self` to `out`
    fn encode<B: BufMut>(&self, out: &mut B);

    /// Decode a value from the front of `buf`
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Number of bytes `encode` will write
    fn byte_size(&self) -> usize;

    /// Length of the encoded value at the front of `buf`
    fn encoded_len(buf: &[u8]) -> Result<usize>;

    /// Compare two encoded values without decoding them
    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering;

    /// Encode into a fresh vector
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_size());
        self.encode(&mut out);
        out
    }
}

/// Fail with a codec error unless `buf` holds at least `needed` bytes
pub(crate) fn ensure_len(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(BlockKvError::Codec(format!(
            "truncated {}: need {} bytes, got {}",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}
