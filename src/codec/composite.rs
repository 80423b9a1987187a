//! Composite keys built from an ordered list of field codecs.
//!
//! A tuple encodes its fields back to back and compares field by field, so
//! `(tenant, id)` keys sort by tenant first without any runtime descriptor.

use std::cmp::Ordering;

use bytes::BufMut;

use super::Codec;
use crate::error::Result;

/// Slice off the field at the front of `buf`, or the whole slice if malformed
fn split_field<T: Codec>(buf: &[u8]) -> (&[u8], &[u8]) {
    let len = T::encoded_len(buf).unwrap_or(buf.len()).min(buf.len());
    buf.split_at(len)
}

impl<A: Codec, B: Codec> Codec for (A, B) {
    fn encode<O: BufMut>(&self, out: &mut O) {
        self.0.encode(out);
        self.1.encode(out);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let a_len = A::encoded_len(buf)?;
        let a = A::decode(buf)?;
        let b = B::decode(&buf[a_len..])?;
        Ok((a, b))
    }

    fn byte_size(&self) -> usize {
        self.0.byte_size() + self.1.byte_size()
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        let a_len = A::encoded_len(buf)?;
        Ok(a_len + B::encoded_len(&buf[a_len..])?)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        let (a0, a_rest) = split_field::<A>(a);
        let (b0, b_rest) = split_field::<A>(b);
        A::compare_encoded(a0, b0).then_with(|| B::compare_encoded(a_rest, b_rest))
    }
}

impl<A: Codec, B: Codec, C: Codec> Codec for (A, B, C) {
    fn encode<O: BufMut>(&self, out: &mut O) {
        self.0.encode(out);
        self.1.encode(out);
        self.2.encode(out);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let a_len = A::encoded_len(buf)?;
        let a = A::decode(buf)?;
        let rest = &buf[a_len..];
        let b_len = B::encoded_len(rest)?;
        let b = B::decode(rest)?;
        let c = C::decode(&rest[b_len..])?;
        Ok((a, b, c))
    }

    fn byte_size(&self) -> usize {
        self.0.byte_size() + self.1.byte_size() + self.2.byte_size()
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        let a_len = A::encoded_len(buf)?;
        let b_len = B::encoded_len(&buf[a_len..])?;
        Ok(a_len + b_len + C::encoded_len(&buf[a_len + b_len..])?)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        let (a0, a_rest) = split_field::<A>(a);
        let (b0, b_rest) = split_field::<A>(b);
        let (a1, a_rest) = split_field::<B>(a_rest);
        let (b1, b_rest) = split_field::<B>(b_rest);
        A::compare_encoded(a0, b0)
            .then_with(|| B::compare_encoded(a1, b1))
            .then_with(|| C::compare_encoded(a_rest, b_rest))
    }
}
