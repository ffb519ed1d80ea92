//! MsgPack codec using `rmp-serde`.
//!
//! Structs are encoded with `to_vec_named` (struct-as-map) so a payload stays
//! readable when the field order of the two sides drifts apart.
//!
//! [`MsgPack`] lets any serde type ride inside a [`CommBuffer`] next to the
//! natively packed values: the encoded blob is written with a `usize` length
//! prefix, exactly like a string.
//!
//! # Example
//!
//! ```
//! use commwire::buffer::CommBuffer;
//! use commwire::codec::MsgPack;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Cell {
//!     id: u64,
//!     owner: String,
//! }
//!
//! let cell = MsgPack(Cell { id: 42, owner: "rank-3".to_string() });
//! let mut buf = CommBuffer::packed_with(|buf| {
//!     buf.pack(&7u32)?.pack(&cell)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! buf.reset();
//! assert_eq!(buf.unpack::<u32>().unwrap(), 7);
//! let back: MsgPack<Cell> = buf.unpack().unwrap();
//! assert_eq!(back, cell);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::buffer::{CommBuffer, Packable};
use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Serde value packed as a length-prefixed MessagePack blob.
///
/// Packing encodes on every pass, so the sizing pass and the packing pass
/// see the same byte count as long as the value does not change in between.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MsgPack<T>(pub T);

impl<T> MsgPack<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Packable for MsgPack<T> {
    fn pack_into(&self, buf: &mut CommBuffer) -> Result<()> {
        let blob = MsgPackCodec::encode(&self.0)?;
        buf.pack_scalar(blob.len())?;
        buf.pack_raw(&blob)
    }

    fn unpack_from(buf: &mut CommBuffer) -> Result<Self> {
        let len: usize = buf.unpack_scalar()?;
        let blob = buf.unpack_raw(len)?;
        MsgPackCodec::decode(blob).map(MsgPack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommError;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    fn sample() -> TestStruct {
        TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = sample();
        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: TestStruct = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encode_decode_collections() {
        let mut map = HashMap::new();
        map.insert("key1".to_string(), 100);
        map.insert("key2".to_string(), 200);

        let encoded = MsgPackCodec::encode(&map).unwrap();
        let decoded: HashMap<String, i32> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_struct_encoded_as_map() {
        let encoded = MsgPackCodec::encode(&sample()).unwrap();
        // fixmap with 3 entries, not fixarray
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<TestStruct> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(CommError::MsgPackDecode(_))));
    }

    #[test]
    fn test_wrapper_in_buffer() {
        let value = MsgPack(sample());
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&1u8)?.pack(&value)?.pack(&2u64)?;
            Ok(())
        })
        .unwrap();
        buf.reset();

        assert_eq!(buf.unpack::<u8>().unwrap(), 1);
        let back: MsgPack<TestStruct> = buf.unpack().unwrap();
        assert_eq!(back.into_inner(), value.0);
        assert_eq!(buf.unpack::<u64>().unwrap(), 2);
    }

    #[test]
    fn test_wrapper_blob_is_length_prefixed() {
        let value = sample();
        let blob = MsgPackCodec::encode(&value).unwrap();

        let mut buf = CommBuffer::new();
        buf.pack(&MsgPack(value)).unwrap();
        assert_eq!(buf.size(), std::mem::size_of::<usize>() + blob.len());
    }

    #[test]
    fn test_wrapper_peek() {
        let mut buf = CommBuffer::packed_with(|b| {
            b.pack(&MsgPack(vec![1u32, 2, 3]))?;
            Ok(())
        })
        .unwrap();
        buf.reset();

        let peeked: MsgPack<Vec<u32>> = buf.peek().unwrap();
        assert_eq!(peeked.0, vec![1, 2, 3]);
        assert_eq!(buf.size(), 0);
    }
}
