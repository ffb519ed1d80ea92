//! Fixed-width scalar values.
//!
//! A scalar of width N is stored as N raw host-order bytes. The width doubles
//! as the alignment used by [`CommBuffer`](super::CommBuffer), so a `u32`
//! always starts at a multiple of 4 from the buffer origin and an `f64` at a
//! multiple of 8.

use crate::error::{CommError, Result};

/// A value with a static byte width and a host-order byte representation.
pub trait Scalar: Copy + Sized {
    /// Width in bytes. Also the alignment inside a buffer.
    const WIDTH: usize;

    /// Write exactly `WIDTH` bytes into `dst`.
    fn write_ne(self, dst: &mut [u8]);

    /// Read a value from exactly `WIDTH` bytes.
    fn read_ne(src: &[u8]) -> Result<Self>;
}

macro_rules! impl_scalar_numeric {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                #[inline]
                fn write_ne(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn read_ne(src: &[u8]) -> Result<Self> {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    if src.len() != raw.len() {
                        return Err(CommError::InvalidData(format!(
                            "expected {} bytes for {}, got {}",
                            raw.len(),
                            stringify!($t),
                            src.len()
                        )));
                    }
                    raw.copy_from_slice(src);
                    Ok(<$t>::from_ne_bytes(raw))
                }
            }
        )*
    };
}

impl_scalar_numeric!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

impl Scalar for bool {
    const WIDTH: usize = 1;

    #[inline]
    fn write_ne(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn read_ne(src: &[u8]) -> Result<Self> {
        match src {
            [0] => Ok(false),
            [1] => Ok(true),
            other => Err(CommError::InvalidData(format!(
                "invalid bool encoding {:?}",
                other
            ))),
        }
    }
}

impl Scalar for char {
    const WIDTH: usize = 4;

    #[inline]
    fn write_ne(self, dst: &mut [u8]) {
        (self as u32).write_ne(dst);
    }

    fn read_ne(src: &[u8]) -> Result<Self> {
        let code = u32::read_ne(src)?;
        char::from_u32(code)
            .ok_or_else(|| CommError::InvalidData(format!("invalid char code point {:#x}", code)))
    }
}
