//! Alignment-aware encoding buffer.
//!
//! - [`CommBuffer`]: flat byte region with a monotonic cursor, sizing and
//!   allocated modes
//! - [`Packable`]: per-type pack/unpack descriptor
//! - [`Scalar`]: fixed-width values stored as host-order bytes
//! - [`Skip`]: types that can be stepped over without decoding

mod comm_buffer;
mod packable;
mod scalar;

pub use comm_buffer::{align_padding, CommBuffer};
pub use packable::{Packable, Skip};
pub use scalar::Scalar;

use crate::error::Result;

/// Unpack one `T` from `buf`.
///
/// Handy when the target type is easier to name than to annotate:
/// `let n = unpack::<u32>(&mut buf)?;`
pub fn unpack<T: Packable>(buf: &mut CommBuffer) -> Result<T> {
    buf.unpack()
}
