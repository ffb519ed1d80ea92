//! Exchange with unknown receive sizes.

use super::round::exchange_bytes;
use super::Exchanger;
use crate::codec::{byte_len, decode_elements, encode_elements, Element};
use crate::error::Result;

impl<'t> Exchanger<'t> {
    /// Send `send_lists[p]` to every rank `p` without knowing what arrives.
    ///
    /// The resolver first turns the send counts into receive counts, then a
    /// data round moves the elements. Returns one list per source rank.
    pub async fn negotiated<T: Element>(&self, send_lists: &[Vec<T>]) -> Result<Vec<Vec<T>>> {
        self.check_per_rank("send_lists", send_lists)?;
        let transport = self.transport;

        let send_counts: Vec<usize> = send_lists.iter().map(Vec::len).collect();
        let recv_counts = self.resolver.resolve(transport, &send_counts).await?;
        self.check_per_rank("resolved receive counts", &recv_counts)?;

        tracing::debug!(
            "rank {} negotiated exchange: {} destinations, {} sources",
            transport.rank(),
            send_counts.iter().filter(|&&n| n > 0).count(),
            recv_counts.iter().filter(|&&n| n > 0).count()
        );

        let recv_lens = recv_counts
            .iter()
            .map(|&n| byte_len::<T>(n))
            .collect::<Result<Vec<_>>>()?;

        let sends = send_lists.iter().map(|list| encode_elements(list)).collect();
        let received = exchange_bytes(
            transport,
            self.config.tags.negotiated,
            sends,
            &recv_lens,
            self.verify(),
        )
        .await?;

        received.iter().map(|bytes| decode_elements(bytes)).collect()
    }
}
