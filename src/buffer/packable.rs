//! Per-type pack/unpack descriptors.
//!
//! Every type that can travel through a [`CommBuffer`] implements
//! [`Packable`]. The same `pack_into` drives both the sizing pass and the
//! packing pass, so the byte count measured in the first pass is exactly the
//! byte count written in the second.
//!
//! Wire layout per kind:
//!
//! | Kind | Layout |
//! |------|--------|
//! | scalar of width N | zero padding to an N-aligned offset, N host-order bytes |
//! | `String` / `&str` | `usize` byte length, raw UTF-8 bytes, no trailing padding |
//! | `(A, B)` | A then B, each aligned on its own |
//! | `Vec<K>` / `&[K]` | `u32` count, elements back to back |
//! | `BTreeMap` / `HashMap` | `usize` count, key/value pairs in iteration order |

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use super::comm_buffer::CommBuffer;
use super::scalar::Scalar;
use crate::error::{CommError, Result};

/// Pack/unpack descriptor for one type.
pub trait Packable {
    /// Whether [`CommBuffer::peek`] may be used with this type.
    const PEEKABLE: bool = true;

    /// Append `self` to the buffer (or count its bytes while sizing).
    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()>;

    /// Read a value back in the same layout.
    fn unpack_from(buf: &mut CommBuffer) -> Result<Self>
    where
        Self: Sized;
}

/// Types whose packed width is static, so they can be skipped unread.
pub trait Skip {
    /// Advance past `count` values.
    fn skip_in(buf: &mut CommBuffer, count: usize) -> Result<()>;
}

macro_rules! impl_packable_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Packable for $t {
                #[inline]
                fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
                    buf.pack_scalar(*self)
                }

                #[inline]
                fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
                    buf.unpack_scalar()
                }
            }

            impl Skip for $t {
                #[inline]
                fn skip_in(buf: &mut CommBuffer, count: usize) -> Result<()> {
                    let width = <$t as Scalar>::WIDTH;
                    buf.advance(width, width.saturating_mul(count))
                }
            }
        )*
    };
}

impl_packable_scalar!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

fn pack_str(buf: &mut CommBuffer, value: &str) -> Result<()> {
    buf.pack_scalar(value.len())?;
    buf.pack_raw(value.as_bytes())
}

/// Borrowed strings pack like `String`; read them back as `String`.
impl Packable for &str {
    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_str(buf, self)
    }

    fn unpack_from(_buf: &mut CommBuffer) -> Result<Self> {
        Err(CommError::InvalidData(
            "cannot unpack into a borrowed str, use String".to_string(),
        ))
    }
}

impl Packable for String {
    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_str(buf, self)
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let len: usize = buf.unpack_scalar()?;
        let bytes = buf.unpack_raw(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CommError::InvalidData(format!("string is not UTF-8: {}", e)))
    }
}

impl<A: Packable, B: Packable> Packable for (A, B) {
    const PEEKABLE: bool = A::PEEKABLE && B::PEEKABLE;

    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        self.0.pack_into(buf)?;
        self.1.pack_into(buf)
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let first = A::unpack_from(buf)?;
        let second = B::unpack_from(buf)?;
        Ok((first, second))
    }
}

impl<A: Skip, B: Skip> Skip for (A, B) {
    fn skip_in(buf: &mut CommBuffer, count: usize) -> Result<()> {
        A::skip_in(buf, count)?;
        B::skip_in(buf, count)
    }
}

fn pack_seq<K: Packable>(buf: &mut CommBuffer, items: &[K]) -> Result<()> {
    let count = u32::try_from(items.len()).map_err(|_| CommError::CountOverflow(items.len()))?;
    buf.pack_scalar(count)?;
    for item in items {
        item.pack_into(buf)?;
    }
    Ok(())
}

/// Borrowed slices pack like `Vec`; read them back as `Vec`.
impl<K: Packable> Packable for &[K] {
    const PEEKABLE: bool = K::PEEKABLE;

    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_seq(buf, self)
    }

    fn unpack_from(_buf: &mut CommBuffer) -> Result<Self> {
        Err(CommError::InvalidData(
            "cannot unpack into a borrowed slice, use Vec".to_string(),
        ))
    }
}

impl<K: Packable> Packable for Vec<K> {
    const PEEKABLE: bool = K::PEEKABLE;

    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_seq(buf, self)
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let count: u32 = buf.unpack_scalar()?;
        let count = count as usize;
        // Cap the pre-allocation by what the buffer could possibly hold.
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(K::unpack_from(buf)?);
        }
        Ok(items)
    }
}

fn pack_entries<'a, K, V, I>(buf: &mut CommBuffer, len: usize, entries: I) -> Result<()>
where
    K: Packable + 'a,
    V: Packable + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    buf.pack_scalar(len)?;
    for (key, value) in entries {
        key.pack_into(buf)?;
        value.pack_into(buf)?;
    }
    Ok(())
}

/// Keys are packed in sorted order, so equal maps produce equal bytes.
impl<K: Packable + Ord, V: Packable> Packable for BTreeMap<K, V> {
    const PEEKABLE: bool = false;

    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_entries(buf, self.len(), self.iter())
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let count: usize = buf.unpack_scalar()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::unpack_from(buf)?;
            let value = V::unpack_from(buf)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Entries follow the hasher's iteration order: the byte layout of equal maps
/// may differ between runs, the unpacked map does not.
impl<K, V, S> Packable for HashMap<K, V, S>
where
    K: Packable + Eq + Hash,
    V: Packable,
    S: BuildHasher + Default,
{
    const PEEKABLE: bool = false;

    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        pack_entries(buf, self.len(), self.iter())
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let count: usize = buf.unpack_scalar()?;
        let mut map = HashMap::with_capacity_and_hasher(count.min(buf.remaining()), S::default());
        for _ in 0..count {
            let key = K::unpack_from(buf)?;
            let value = V::unpack_from(buf)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<T> Packable for *const T {
    fn pack_into(&self, _buf: &mut CommBuffer) -> Result<()> {
        Err(CommError::PointerPack)
    }

    fn unpack_from(_buf: &mut CommBuffer) -> Result<Self> {
        Err(CommError::PointerPack)
    }
}

impl<T> Packable for *mut T {
    fn pack_into(&self, _buf: &mut CommBuffer) -> Result<()> {
        Err(CommError::PointerPack)
    }

    fn unpack_from(_buf: &mut CommBuffer) -> Result<Self> {
        Err(CommError::PointerPack)
    }
}
