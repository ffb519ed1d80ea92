//! Codec module - payload encodings that sit next to [`CommBuffer`](crate::buffer::CommBuffer).
//!
//! - [`Element`] - flat, unprefixed element lists for the raw-typed exchanges
//! - [`MsgPackCodec`] / [`MsgPack`] - MessagePack via `rmp-serde` for serde types
//!
//! # Design
//!
//! Codecs are marker structs and free functions rather than trait objects, so
//! the element type is fixed at compile time and no dispatch happens per value.

mod element;
mod msgpack;

pub use element::{byte_len, decode_elements, decode_into, encode_elements, Element};
pub use msgpack::{MsgPack, MsgPackCodec};
