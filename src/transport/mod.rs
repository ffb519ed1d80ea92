//! Transport module - point-to-point messaging between the ranks of a group.
//!
//! The exchange protocols only need a handful of primitives:
//!
//! - non-blocking send and receive returning [`Request`] handles
//! - a group-wide barrier
//! - the group size and the caller's own rank
//!
//! [`Transport`] is the seam for those primitives. [`LocalGroup`] implements it
//! in process, one tokio task per rank, which is what the tests and demos run
//! on. Any message-passing runtime with tagged, non-overtaking point-to-point
//! messages can sit behind the same trait.

mod local;
mod request;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::{CommError, Result};

pub use local::{LocalGroup, LocalTransport};
pub use request::{RecvRequest, Request, RequestSet, Retired, SendRequest};

/// Message tag. Messages only match receives posted with the same tag.
pub type Tag = u32;

/// Boxed future returned by the object-safe transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Point-to-point messaging within a fixed group of ranks.
///
/// Messages between one (source, destination, tag) triple are delivered in
/// the order they were sent.
pub trait Transport: Send + Sync {
    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Rank of the caller, in `0..size()`.
    fn rank(&self) -> usize;

    /// Start sending `payload` to `dest`.
    fn isend(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<SendRequest>;

    /// Post a receive of at most `len` bytes from `source`.
    ///
    /// The request fails with [`CommError::Truncated`] if the matching
    /// message is longer than `len`.
    fn irecv(&self, source: usize, len: usize, tag: Tag) -> Result<RecvRequest>;

    /// Wait until every rank of the group has entered the barrier.
    fn barrier(&self) -> BoxFuture<'_, Result<()>>;

    /// Send and wait for completion.
    fn send(&self, dest: usize, tag: Tag, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        let request = self.isend(dest, tag, payload);
        Box::pin(async move { request?.await })
    }

    /// Copy `root`'s payload to every rank.
    ///
    /// On non-root ranks `payload` only provides the expected length; the
    /// returned bytes are the root's.
    fn broadcast(&self, root: usize, tag: Tag, payload: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            check_rank(root, self.size())?;
            if self.rank() != root {
                return self.irecv(root, payload.len(), tag)?.await;
            }

            let mut sends = RequestSet::with_capacity(self.size());
            for dest in (0..self.size()).filter(|&dest| dest != root) {
                sends.insert(self.isend(dest, tag, payload.clone())?);
            }
            sends.drain().await?;
            Ok(payload)
        })
    }
}

/// Check that `rank` addresses a member of a group of `size` ranks.
#[inline]
pub fn check_rank(rank: usize, size: usize) -> Result<()> {
    if rank < size {
        Ok(())
    } else {
        Err(CommError::InvalidRank { rank, size })
    }
}
