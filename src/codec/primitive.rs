//! Codecs for integers, strings and byte strings.

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use super::{ensure_len, Codec};
use crate::error::{BlockKvError, Result};

/// Length prefix used by variable-length codecs
const LEN_PREFIX: usize = 4;

/// Compare the first `width` bytes of two slices, tolerating short input
fn compare_fixed(a: &[u8], b: &[u8], width: usize) -> Ordering {
    let a = a.get(..width).unwrap_or(a);
    let b = b.get(..width).unwrap_or(b);
    a.cmp(b)
}

macro_rules! unsigned_codec {
    ($ty:ty, $width:expr, $put:ident, $get:ident) => {
        impl Codec for $ty {
            fn encode<B: BufMut>(&self, out: &mut B) {
                out.$put(*self);
            }

            fn decode(buf: &[u8]) -> Result<Self> {
                ensure_len(buf, $width, stringify!($ty))?;
                let mut buf = buf;
                Ok(buf.$get())
            }

            fn byte_size(&self) -> usize {
                $width
            }

            fn encoded_len(buf: &[u8]) -> Result<usize> {
                ensure_len(buf, $width, stringify!($ty))?;
                Ok($width)
            }

            fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
                compare_fixed(a, b, $width)
            }
        }
    };
}

unsigned_codec!(u16, 2, put_u16, get_u16);
unsigned_codec!(u32, 4, put_u32, get_u32);
unsigned_codec!(u64, 8, put_u64, get_u64);

// Signed integers flip the sign bit so negative values sort first bytewise.
macro_rules! signed_codec {
    ($ty:ty, $uty:ty, $width:expr, $put:ident, $get:ident) => {
        impl Codec for $ty {
            fn encode<B: BufMut>(&self, out: &mut B) {
                out.$put((*self as $uty) ^ (1 << ($width * 8 - 1)));
            }

            fn decode(buf: &[u8]) -> Result<Self> {
                ensure_len(buf, $width, stringify!($ty))?;
                let mut buf = buf;
                Ok((buf.$get() ^ (1 << ($width * 8 - 1))) as $ty)
            }

            fn byte_size(&self) -> usize {
                $width
            }

            fn encoded_len(buf: &[u8]) -> Result<usize> {
                ensure_len(buf, $width, stringify!($ty))?;
                Ok($width)
            }

            fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
                compare_fixed(a, b, $width)
            }
        }
    };
}

signed_codec!(i32, u32, 4, put_u32, get_u32);
signed_codec!(i64, u64, 8, put_u64, get_u64);

// =============================================================================
// Variable-length codecs
// =============================================================================

/// Split a length-prefixed value into its content bytes
fn prefixed_content(buf: &[u8]) -> Result<&[u8]> {
    ensure_len(buf, LEN_PREFIX, "length prefix")?;
    let len = (&buf[..LEN_PREFIX]).get_u32() as usize;
    ensure_len(buf, LEN_PREFIX + len, "length-prefixed value")?;
    Ok(&buf[LEN_PREFIX..LEN_PREFIX + len])
}

/// Content comparison of two length-prefixed values
///
/// Malformed input sorts as empty content so the comparison stays total.
fn compare_prefixed(a: &[u8], b: &[u8]) -> Ordering {
    let a = prefixed_content(a).unwrap_or(&[]);
    let b = prefixed_content(b).unwrap_or(&[]);
    a.cmp(b)
}

impl Codec for Vec<u8> {
    fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u32(self.len() as u32);
        out.put_slice(self);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(prefixed_content(buf)?.to_vec())
    }

    fn byte_size(&self) -> usize {
        LEN_PREFIX + self.len()
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        Ok(LEN_PREFIX + prefixed_content(buf)?.len())
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        compare_prefixed(a, b)
    }
}

impl Codec for String {
    fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u32(self.len() as u32);
        out.put_slice(self.as_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let content = prefixed_content(buf)?;
        String::from_utf8(content.to_vec())
            .map_err(|e| BlockKvError::Codec(format!("invalid UTF-8 string: {}", e)))
    }

    fn byte_size(&self) -> usize {
        LEN_PREFIX + self.len()
    }

    fn encoded_len(buf: &[u8]) -> Result<usize> {
        Ok(LEN_PREFIX + prefixed_content(buf)?.len())
    }

    // UTF-8 byte order equals code point order, which is `str` ordering.
    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        compare_prefixed(a, b)
    }
}
