//! Flat element codec for the raw-typed exchange variants.
//!
//! Elements are written back to back in host byte order with no prefix and no
//! padding between them, so a list of `n` elements is exactly
//! `n * T::WIDTH` bytes on the wire. The receiver derives the element count
//! from the byte length.
//!
//! # Example
//!
//! ```
//! use commwire::codec::{decode_elements, encode_elements};
//!
//! let bytes = encode_elements(&[(1u32, 2.5f64), (3, 4.5)]);
//! assert_eq!(bytes.len(), 2 * 12);
//!
//! let back: Vec<(u32, f64)> = decode_elements(&bytes).unwrap();
//! assert_eq!(back, vec![(1, 2.5), (3, 4.5)]);
//! ```

use bytes::{Bytes, BytesMut};

use crate::buffer::Scalar;
use crate::error::{CommError, Result};

/// A fixed-width value that can travel in a flat element list.
pub trait Element: Copy + Send + Sync + 'static {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Write exactly `WIDTH` bytes.
    fn encode(&self, dst: &mut [u8]);

    /// Read a value from exactly `WIDTH` bytes.
    fn decode(src: &[u8]) -> Result<Self>;
}

macro_rules! impl_element_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Element for $t {
                const WIDTH: usize = <$t as Scalar>::WIDTH;

                #[inline]
                fn encode(&self, dst: &mut [u8]) {
                    self.write_ne(dst);
                }

                #[inline]
                fn decode(src: &[u8]) -> Result<Self> {
                    <$t as Scalar>::read_ne(src)
                }
            }
        )*
    };
}

impl_element_scalar!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

impl<A: Element, B: Element> Element for (A, B) {
    const WIDTH: usize = A::WIDTH + B::WIDTH;

    #[inline]
    fn encode(&self, dst: &mut [u8]) {
        let (head, tail) = dst.split_at_mut(A::WIDTH);
        self.0.encode(head);
        self.1.encode(tail);
    }

    #[inline]
    fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != Self::WIDTH {
            return Err(CommError::InvalidData(format!(
                "expected {} bytes for pair, got {}",
                Self::WIDTH,
                src.len()
            )));
        }
        let (head, tail) = src.split_at(A::WIDTH);
        Ok((A::decode(head)?, B::decode(tail)?))
    }
}

/// Byte length of `count` elements.
#[inline]
pub fn byte_len<T: Element>(count: usize) -> Result<usize> {
    count
        .checked_mul(T::WIDTH)
        .ok_or_else(|| CommError::InvalidData(format!("{} elements overflow usize", count)))
}

/// Encode a slice of elements into one contiguous message.
pub fn encode_elements<T: Element>(items: &[T]) -> Bytes {
    let mut out = BytesMut::zeroed(items.len() * T::WIDTH);
    for (chunk, item) in out.chunks_exact_mut(T::WIDTH).zip(items) {
        item.encode(chunk);
    }
    out.freeze()
}

/// Decode a message into a new vector.
///
/// Fails if the byte length is not a whole number of elements.
pub fn decode_elements<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    check_whole::<T>(bytes.len())?;
    bytes.chunks_exact(T::WIDTH).map(T::decode).collect()
}

/// Decode a message into an existing slice of exactly matching length.
pub fn decode_into<T: Element>(bytes: &[u8], out: &mut [T]) -> Result<()> {
    let expected = byte_len::<T>(out.len())?;
    if bytes.len() != expected {
        return Err(CommError::InvalidData(format!(
            "expected {} bytes for {} elements, got {}",
            expected,
            out.len(),
            bytes.len()
        )));
    }
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::WIDTH)) {
        *slot = T::decode(chunk)?;
    }
    Ok(())
}

fn check_whole<T: Element>(len: usize) -> Result<()> {
    if T::WIDTH == 0 || len % T::WIDTH != 0 {
        return Err(CommError::InvalidData(format!(
            "{} bytes is not a whole number of {}-byte elements",
            len,
            T::WIDTH
        )));
    }
    Ok(())
}
