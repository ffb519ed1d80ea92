//! Alignment-aware byte buffer with sizing and allocated modes.
//!
//! A [`CommBuffer`] is used in two passes:
//!
//! 1. **Sizing**: no storage exists, every pack only advances the cursor so
//!    the buffer ends up knowing how many bytes the payload needs.
//! 2. **Allocated**: [`CommBuffer::allocate`] creates zeroed storage of exactly
//!    that size and the same pack sequence runs again for real.
//!
//! [`CommBuffer::packed_with`] drives both passes from one closure so the two
//! pack sequences cannot drift apart.
//!
//! # Example
//!
//! ```
//! use commwire::buffer::CommBuffer;
//!
//! let mut buf = CommBuffer::packed_with(|buf| {
//!     buf.pack(&7u32)?.pack(&3.14f64)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(buf.capacity(), 16);
//! buf.reset();
//! assert_eq!(buf.unpack::<u32>().unwrap(), 7);
//! assert_eq!(buf.unpack::<f64>().unwrap(), 3.14);
//! ```

use bytes::{Bytes, BytesMut};

use super::packable::{Packable, Skip};
use super::scalar::Scalar;
use crate::error::{CommError, Result};

/// Number of zero bytes needed to move `offset` onto a multiple of `width`.
#[inline]
pub fn align_padding(offset: usize, width: usize) -> usize {
    if width <= 1 {
        return 0;
    }
    match offset % width {
        0 => 0,
        rem => width - rem,
    }
}

/// Flat byte region with a monotonic cursor.
///
/// Offsets are always measured from the origin, so alignment does not depend
/// on where the allocator placed the storage.
#[derive(Debug, Clone, Default)]
pub struct CommBuffer {
    /// Backing bytes; `None` while sizing.
    storage: Option<BytesMut>,
    /// Current position relative to the origin.
    cursor: usize,
}

impl CommBuffer {
    /// Create a buffer in sizing mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocated, zero-filled buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Some(BytesMut::zeroed(capacity)),
            cursor: 0,
        }
    }

    /// Create an allocated buffer holding a copy of `data`, cursor at origin.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            storage: Some(BytesMut::from(data)),
            cursor: 0,
        }
    }

    /// Create an allocated buffer from received bytes, cursor at origin.
    ///
    /// Takes the storage over without copying when `data` is the only handle
    /// to its bytes; shared bytes are copied.
    pub fn from_bytes(data: Bytes) -> Self {
        let storage = data
            .try_into_mut()
            .unwrap_or_else(|shared| BytesMut::from(shared.as_ref()));
        Self {
            storage: Some(storage),
            cursor: 0,
        }
    }

    /// Allocate storage for exactly the bytes counted by the sizing pass.
    ///
    /// The cursor is reset to the origin so the packing pass can start.
    pub fn allocate(&mut self) -> Result<()> {
        if self.storage.is_some() {
            return Err(CommError::AlreadyAllocated);
        }
        self.storage = Some(BytesMut::zeroed(self.cursor));
        self.cursor = 0;
        Ok(())
    }

    /// Drop any storage and return to sizing mode with `size` bytes counted.
    pub fn set_size(&mut self, size: usize) {
        self.storage = None;
        self.cursor = size;
    }

    /// Whether real storage backs the buffer.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Move the cursor back to the origin.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Size of the allocated region in bytes (0 while sizing).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.len())
    }

    /// Bytes processed so far. While sizing, this is the byte count the
    /// pack sequence would need.
    #[inline]
    pub fn size(&self) -> usize {
        self.cursor
    }

    /// Bytes left between the cursor and the end of the allocated region.
    ///
    /// Never negative: running past the end is reported by the pack/unpack
    /// call that attempted it.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.cursor)
    }

    /// The whole allocated region (empty while sizing).
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.storage.as_deref().unwrap_or(&[])
    }

    /// Bytes between the origin and the cursor.
    #[inline]
    pub fn written(&self) -> &[u8] {
        let bytes = self.as_bytes();
        &bytes[..self.cursor.min(bytes.len())]
    }

    /// Consume the buffer, returning the allocated region.
    pub fn into_bytes(self) -> Bytes {
        self.storage.map(BytesMut::freeze).unwrap_or_default()
    }

    /// Replace the storage with `data` and rewind.
    pub(crate) fn replace_contents(&mut self, data: &[u8]) {
        self.storage = Some(BytesMut::from(data));
        self.cursor = 0;
    }

    /// Run `pack` once to size, allocate, then run it again to fill.
    ///
    /// The cursor is left at the end of the packed data, so `size()` equals
    /// `capacity()` on success. Call [`reset`](Self::reset) before reading back.
    pub fn packed_with<F>(mut pack: F) -> Result<Self>
    where
        F: FnMut(&mut CommBuffer) -> Result<()>,
    {
        let mut buf = CommBuffer::new();
        pack(&mut buf)?;
        let sized = buf.size();

        buf.allocate()?;
        pack(&mut buf)?;

        if buf.size() != sized {
            return Err(CommError::SizingMismatch {
                sized,
                packed: buf.size(),
            });
        }
        Ok(buf)
    }

    // ------------------------------------------------------------------
    // Typed API
    // ------------------------------------------------------------------

    /// Pack a value.
    pub fn pack<T: Packable + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        value.pack_into(self)?;
        Ok(self)
    }

    /// Unpack a value.
    pub fn unpack<T: Packable>(&mut self) -> Result<T> {
        T::unpack_from(self)
    }

    /// Unpack into an existing value.
    pub fn unpack_into<T: Packable>(&mut self, value: &mut T) -> Result<&mut Self> {
        *value = T::unpack_from(self)?;
        Ok(self)
    }

    /// Unpack a value without moving the cursor.
    ///
    /// Fails up front for types containing a mapping.
    pub fn peek<T: Packable>(&mut self) -> Result<T> {
        if !T::PEEKABLE {
            return Err(CommError::PeekUnsupported(std::any::type_name::<T>()));
        }
        let saved = self.cursor;
        let result = T::unpack_from(self);
        self.cursor = saved;
        result
    }

    /// Advance past `count` values of `T` without reading them.
    pub fn skip<T: Skip>(&mut self, count: usize) -> Result<&mut Self> {
        T::skip_in(self, count)?;
        Ok(self)
    }

    /// Pack a raw array of fixed-width values with no length prefix.
    ///
    /// Each element is laid out as [`pack`](Self::pack) would lay it out, so
    /// an array of pairs keeps the per-field alignment. The whole array is
    /// bounds-checked before the first byte is written.
    pub fn pack_slice<T: Packable + Skip>(&mut self, values: &[T]) -> Result<&mut Self> {
        if let Some(capacity) = self.storage.as_ref().map(|s| s.len()) {
            let mut sizing = CommBuffer {
                storage: None,
                cursor: self.cursor,
            };
            for value in values {
                value.pack_into(&mut sizing)?;
            }
            if sizing.cursor > capacity {
                return Err(CommError::PackOverflow {
                    offset: self.cursor,
                    needed: sizing.cursor - self.cursor,
                    capacity,
                });
            }
        }
        for value in values {
            value.pack_into(self)?;
        }
        Ok(self)
    }

    /// Fill `out` from a raw array with no length prefix.
    ///
    /// On failure the cursor is left where it was.
    pub fn unpack_slice<T: Packable + Skip>(&mut self, out: &mut [T]) -> Result<&mut Self> {
        let saved = self.cursor;
        for slot in out.iter_mut() {
            match T::unpack_from(self) {
                Ok(value) => *slot = value,
                Err(e) => {
                    self.cursor = saved;
                    return Err(e);
                }
            }
        }
        Ok(self)
    }

    /// Unpack `count` raw values into a new vector.
    pub fn unpack_vec<T: Packable + Skip>(&mut self, count: usize) -> Result<Vec<T>> {
        let saved = self.cursor;
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            match T::unpack_from(self) {
                Ok(value) => items.push(value),
                Err(e) => {
                    self.cursor = saved;
                    return Err(e);
                }
            }
        }
        Ok(items)
    }

    /// Like [`unpack_slice`](Self::unpack_slice) but leaves the cursor alone.
    pub fn peek_slice<T: Packable + Skip>(&mut self, out: &mut [T]) -> Result<&mut Self> {
        let saved = self.cursor;
        let result = self.unpack_slice(out).map(|_| ());
        self.cursor = saved;
        result?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Byte-level primitives used by the Packable impls
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn pack_scalar<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.put_with(T::WIDTH, T::WIDTH, |dst| value.write_ne(dst))
    }

    #[inline]
    pub(crate) fn unpack_scalar<T: Scalar>(&mut self) -> Result<T> {
        let bytes = self.take(T::WIDTH, T::WIDTH)?;
        T::read_ne(bytes)
    }

    /// Unaligned raw bytes (string bodies, opaque blobs).
    #[inline]
    pub(crate) fn pack_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_with(1, bytes.len(), |dst| dst.copy_from_slice(bytes))
    }

    #[inline]
    pub(crate) fn unpack_raw(&mut self, len: usize) -> Result<&[u8]> {
        self.take(1, len)
    }

    /// Pad to `align`, then hand `len` bytes to `fill`.
    ///
    /// While sizing only the cursor moves. Once allocated, the bounds check
    /// runs before any byte (padding included) is written.
    fn put_with<F>(&mut self, align: usize, len: usize, fill: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let start = self.cursor;
        let needed = align_padding(start, align).saturating_add(len);
        let end = start.checked_add(needed).ok_or(CommError::PackOverflow {
            offset: start,
            needed,
            capacity: self.capacity(),
        })?;

        let Some(storage) = self.storage.as_mut() else {
            self.cursor = end;
            return Ok(());
        };

        if end > storage.len() {
            return Err(CommError::PackOverflow {
                offset: start,
                needed,
                capacity: storage.len(),
            });
        }

        let body = end - len;
        storage[start..body].fill(0);
        fill(&mut storage[body..end]);
        self.cursor = end;
        Ok(())
    }

    /// Pad to `align`, then borrow the next `len` bytes.
    fn take(&mut self, align: usize, len: usize) -> Result<&[u8]> {
        let start = self.cursor;
        let capacity = self.capacity();
        let needed = align_padding(start, align).saturating_add(len);
        let end = match start.checked_add(needed) {
            Some(end) if end <= capacity => end,
            _ => {
                return Err(CommError::UnpackOverflow {
                    offset: start,
                    needed,
                    capacity,
                })
            }
        };

        self.cursor = end;
        Ok(&self.as_bytes()[end - len..end])
    }

    /// Pad to `align`, then move `len` bytes forward without reading.
    pub(crate) fn advance(&mut self, align: usize, len: usize) -> Result<()> {
        let start = self.cursor;
        let needed = align_padding(start, align).saturating_add(len);
        let end = start.checked_add(needed);
        match end {
            Some(end) if !self.is_allocated() || end <= self.capacity() => {
                self.cursor = end;
                Ok(())
            }
            _ => Err(CommError::UnpackOverflow {
                offset: start,
                needed,
                capacity: self.capacity(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_padding() {
        assert_eq!(align_padding(0, 8), 0);
        assert_eq!(align_padding(4, 8), 4);
        assert_eq!(align_padding(9, 4), 3);
        assert_eq!(align_padding(13, 1), 0);
        assert_eq!(align_padding(16, 16), 0);
    }

    #[test]
    fn test_int_then_double_layout() {
        let mut buf = CommBuffer::with_capacity(16);
        buf.pack(&7i32).unwrap();
        assert_eq!(buf.size(), 4);
        buf.pack(&3.14f64).unwrap();
        assert_eq!(buf.size(), 16);

        let bytes = buf.as_bytes();
        assert_eq!(&bytes[0..4], &7i32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &3.14f64.to_ne_bytes());
    }

    #[test]
    fn test_sizing_mode_counts_padding() {
        let mut buf = CommBuffer::new();
        buf.pack(&1u8).unwrap().pack(&2u32).unwrap().pack(&3u16).unwrap();
        // 1 + 3 pad + 4 + 2
        assert_eq!(buf.size(), 10);
        assert_eq!(buf.capacity(), 0);
        assert!(!buf.is_allocated());
    }

    #[test]
    fn test_allocate_after_sizing() {
        let mut buf = CommBuffer::new();
        buf.pack(&1u64).unwrap();
        buf.allocate().unwrap();

        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.size(), 0);
        assert!(matches!(buf.allocate(), Err(CommError::AlreadyAllocated)));
    }

    #[test]
    fn test_overflow_fails_before_write() {
        let mut buf = CommBuffer::from_slice(&[0xAA; 6]);
        buf.pack(&1u8).unwrap();

        // u64 needs 7 bytes of padding plus 8 bytes: far past 6.
        let err = buf.pack(&2u64).unwrap_err();
        assert!(matches!(
            err,
            CommError::PackOverflow {
                offset: 1,
                needed: 15,
                capacity: 6
            }
        ));

        // Cursor unchanged and no padding was written.
        assert_eq!(buf.size(), 1);
        assert_eq!(&buf.as_bytes()[1..], &[0xAA; 5]);
    }

    #[test]
    fn test_exact_fit_succeeds() {
        let mut buf = CommBuffer::with_capacity(8);
        buf.pack(&u64::MAX).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert!(buf.pack(&0u8).is_err());
    }

    #[test]
    fn test_unpack_overflow() {
        let mut buf = CommBuffer::from_slice(&[1, 2, 3]);
        let err = buf.unpack::<u32>().unwrap_err();
        assert!(matches!(err, CommError::UnpackOverflow { .. }));
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_unpack_from_sizing_buffer_fails() {
        let mut buf = CommBuffer::new();
        assert!(buf.unpack::<u8>().is_err());
    }

    #[test]
    fn test_peek_restores_cursor() {
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&42u32)?.pack(&"tail".to_string())?;
            Ok(())
        })
        .unwrap();
        buf.reset();

        let peeked: u32 = buf.peek().unwrap();
        assert_eq!(buf.size(), 0);
        let unpacked: u32 = buf.unpack().unwrap();
        assert_eq!(peeked, unpacked);

        let s: String = buf.peek().unwrap();
        assert_eq!(s, "tail");
        assert_eq!(buf.unpack::<String>().unwrap(), "tail");
    }

    #[test]
    fn test_peek_overflow_leaves_cursor() {
        let mut buf = CommBuffer::from_slice(&[0; 2]);
        assert!(buf.peek::<u64>().is_err());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_skip_equivalence() {
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&1u8)?.pack(&2.5f64)?.pack(&9u16)?;
            Ok(())
        })
        .unwrap();

        buf.reset();
        buf.unpack::<u8>().unwrap();
        let _: f64 = buf.unpack().unwrap();
        let via_unpack: u16 = buf.unpack().unwrap();

        buf.reset();
        buf.skip::<u8>(1).unwrap().skip::<f64>(1).unwrap();
        let via_skip: u16 = buf.unpack().unwrap();

        assert_eq!(via_unpack, via_skip);
    }

    #[test]
    fn test_skip_pair_components_independently() {
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&(1u8, 2u32))?.pack(&77u8)?;
            Ok(())
        })
        .unwrap();
        buf.reset();

        buf.skip::<(u8, u32)>(1).unwrap();
        assert_eq!(buf.size(), 8);
        assert_eq!(buf.unpack::<u8>().unwrap(), 77);
    }

    #[test]
    fn test_skip_past_end_fails() {
        let mut buf = CommBuffer::with_capacity(4);
        assert!(buf.skip::<u32>(2).is_err());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_slices_round_trip() {
        let data = [1.5f32, -2.0, 8.25];
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&1u8)?.pack_slice(&data)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(buf.size(), 4 + 12);

        buf.reset();
        buf.skip::<u8>(1).unwrap();
        let mut peeked = [0f32; 3];
        buf.peek_slice(&mut peeked).unwrap();
        assert_eq!(peeked, data);

        let mut out = [0f32; 3];
        buf.unpack_slice(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_unpack_vec() {
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack_slice(&[10u16, 20, 30])?;
            Ok(())
        })
        .unwrap();
        buf.reset();
        assert_eq!(buf.unpack_vec::<u16>(3).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_slice_of_pairs_keeps_field_alignment() {
        let data = [(1u8, 10u32), (2, 20)];
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack_slice(&data)?;
            Ok(())
        })
        .unwrap();
        // u8, 3 padding, u32, u8, 3 padding, u32
        assert_eq!(buf.size(), 16);
        assert_eq!(buf.as_bytes()[4..8], 10u32.to_ne_bytes());

        buf.reset();
        assert_eq!(buf.unpack_vec::<(u8, u32)>(2).unwrap(), data.to_vec());
    }

    #[test]
    fn test_pack_slice_overflow_writes_nothing() {
        let mut buf = CommBuffer::with_capacity(8);
        buf.pack(&7u8).unwrap();
        let err = buf.pack_slice(&[1u16, 2, 3, 4]).unwrap_err();
        assert!(matches!(
            err,
            CommError::PackOverflow {
                offset: 1,
                needed: 9,
                capacity: 8
            }
        ));
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.as_bytes(), &[7, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_unpack_slice_short_input_keeps_cursor() {
        let mut buf = CommBuffer::from_slice(&[0u8; 6]);
        let mut out = [0u32; 2];
        assert!(buf.unpack_slice(&mut out).is_err());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_from_bytes_takes_unique_storage() {
        let data = Bytes::from(vec![1u8, 2, 3, 4]);
        let ptr = data.as_ptr();
        let buf = CommBuffer::from_bytes(data);
        assert_eq!(buf.as_bytes().as_ptr(), ptr);

        let shared = Bytes::from(vec![5u8, 6]);
        let other = shared.clone();
        let buf = CommBuffer::from_bytes(shared);
        assert_eq!(buf.as_bytes(), other.as_ref());
        assert_ne!(buf.as_bytes().as_ptr(), other.as_ptr());
    }

    #[test]
    fn test_packed_with_detects_divergence() {
        let mut passes = 0;
        let result = CommBuffer::packed_with(|b| {
            passes += 1;
            b.pack(&1u32)?;
            if passes == 1 {
                b.pack(&2u32)?;
            }
            Ok(())
        });
        assert!(matches!(
            result,
            Err(CommError::SizingMismatch {
                sized: 8,
                packed: 4
            })
        ));
    }

    #[test]
    fn test_set_size_and_remaining() {
        let mut buf = CommBuffer::with_capacity(32);
        buf.pack(&1u64).unwrap();
        assert_eq!(buf.remaining(), 24);

        buf.set_size(12);
        assert!(!buf.is_allocated());
        assert_eq!(buf.size(), 12);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_written_and_into_bytes() {
        let mut buf = CommBuffer::with_capacity(8);
        buf.pack(&0x11u8).unwrap();
        assert_eq!(buf.written(), &[0x11]);
        assert_eq!(buf.into_bytes().len(), 8);
    }
}
