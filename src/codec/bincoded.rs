//! Serde-backed value codec using bincode.
//!
//! Bincode output is not order-preserving, so `Bincoded` is meant for values,
//! not keys. Its comparison is a plain byte comparison of the encodings.

use std::cmp::Ordering;
use std::ops::Deref;

use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ensure_len, Codec};
use crate::error::Result;

/// A serde value together with its bincode encoding
///
/// Serialization happens once in [`Bincoded::new`], which keeps `encode`
/// and `byte_size` infallible.
#[derive(Debug, Clone, PartialEq)]
pub struct Bincoded<T> {
    value: T,
    bytes: Vec<u8>,
}

impl<T: Serialize + DeserializeOwned> Bincoded<T> {
    /// Serialize `value` with bincode
    pub fn new(value: T) -> Result<Self> {
        let bytes = bincode::serialize(&value)?;
        Ok(Self { value, bytes })
    }

    /// Borrow the wrapped value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Unwrap the value
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Bincoded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Serialize + DeserializeOwned> Codec for Bincoded<T> {
    fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u32(self.bytes.len() as u32);
        out.put_slice(&self.bytes);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let len = Self::encoded_len(buf)?;
        let bytes = buf[4..len].to_vec();
        let value = bincode::deserialize(&bytes)?;
        Ok(Self { value, bytes })
    }

    fn byte_size(&self) -> usize {
        4 + self.bytes.len()
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        ensure_len(buf, 4, "bincode length")?;
        let len = (&buf[..4]).get_u32() as usize;
        ensure_len(buf, 4 + len, "bincode payload")?;
        Ok(4 + len)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        let a = Self::encoded_len(a).map(|len| &a[..len]).unwrap_or(a);
        let b = Self::encoded_len(b).map(|len| &b[..len]).unwrap_or(b);
        a.cmp(b)
    }
}
