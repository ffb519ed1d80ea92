//! # commwire
//!
//! Typed message buffers and irregular collective exchanges for groups of
//! cooperating ranks.
//!
//! ## Architecture
//!
//! - **Buffer** ([`buffer`]): alignment-aware packing of scalars, strings,
//!   pairs, sequences and maps into a flat byte region, sized in one pass and
//!   filled in a second
//! - **Codec** ([`codec`]): flat element lists and MessagePack payloads
//! - **Transport** ([`transport`]): non-blocking point-to-point messaging,
//!   with an in-process [`LocalGroup`](transport::LocalGroup)
//! - **Exchange** ([`exchange`]): all-to-all variants for known and unknown
//!   partners and sizes
//! - **Broadcast** ([`broadcast`]): root-to-all copy of one packed buffer
//!
//! ## Example
//!
//! ```
//! use commwire::exchange::Exchanger;
//! use commwire::transport::{LocalGroup, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> commwire::Result<()> {
//! let results = LocalGroup::run(4, |t| async move {
//!     // every rank sends its rank to both ring neighbours
//!     let me = t.rank();
//!     let mut send_lists = vec![Vec::new(); t.size()];
//!     send_lists[(me + 1) % 4].push(me as u64);
//!     send_lists[(me + 3) % 4].push(me as u64);
//!
//!     let recv_lists = Exchanger::new(&t).symmetric(&send_lists).await?;
//!     Ok(recv_lists.concat())
//! })
//! .await?;
//!
//! assert_eq!(results[0], vec![1, 3]);
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod exchange;
pub mod transport;

pub use broadcast::CommBroadcast;
pub use buffer::{CommBuffer, Packable};
pub use error::{CommError, Result};
pub use exchange::{Completion, ExchangeConfig, Exchanger};
