//! Receive-list resolution: turning "what I send to whom" into "what I
//! receive from whom".
//!
//! Resolution is a collective: every rank calls it with its per-destination
//! element counts and gets back its per-source element counts.

use bytes::Bytes;

use super::round::{decode_count, encode_count, exchange_bytes};
use super::tags;
use crate::error::{CommError, Result};
use crate::transport::{BoxFuture, Tag, Transport};

/// Collective mapping of send counts to receive counts.
pub trait ReceiveListResolver: Send + Sync {
    /// `send_counts[p]` is what this rank sends to `p`; the result's entry
    /// `p` is what `p` sends to this rank.
    fn resolve<'a>(
        &'a self,
        transport: &'a dyn Transport,
        send_counts: &'a [usize],
    ) -> BoxFuture<'a, Result<Vec<usize>>>;
}

/// Dense all-to-all of one count per rank pair.
///
/// Costs one 8-byte message per rank pair regardless of sparsity, which is
/// fine for small groups and the simplest thing that is always correct.
#[derive(Debug, Clone, Copy)]
pub struct DenseResolver {
    tag: Tag,
}

impl Default for DenseResolver {
    fn default() -> Self {
        Self::new(tags::RESOLVER)
    }
}

impl DenseResolver {
    /// Resolver communicating on `tag`.
    pub fn new(tag: Tag) -> Self {
        Self { tag }
    }

    /// Tag used for the count messages.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl ReceiveListResolver for DenseResolver {
    fn resolve<'a>(
        &'a self,
        transport: &'a dyn Transport,
        send_counts: &'a [usize],
    ) -> BoxFuture<'a, Result<Vec<usize>>> {
        Box::pin(async move {
            let size = transport.size();
            if send_counts.len() != size {
                return Err(CommError::InvalidPlan(format!(
                    "expected {} send counts, got {}",
                    size,
                    send_counts.len()
                )));
            }

            tracing::trace!("rank {} resolving receive counts", transport.rank());
            let sends = send_counts.iter().map(|&n| encode_count(n)).collect();
            let received = exchange_bytes(transport, self.tag, sends, &vec![8; size], true).await?;
            received
                .iter()
                .enumerate()
                .map(|(peer, bytes)| decode_count(peer, bytes))
                .collect()
        })
    }
}

/// Every rank contributes `payload`; every rank gets all contributions in
/// rank order. All payloads must have the same length.
pub(crate) async fn all_gather(
    transport: &dyn Transport,
    tag: Tag,
    payload: Bytes,
) -> Result<Vec<Bytes>> {
    let size = transport.size();
    let len = payload.len();
    exchange_bytes(transport, tag, vec![payload; size], &vec![len; size], true).await
}
