//! Exchanges where the partners or the receive sizes are known up front.

use std::collections::BTreeSet;

use bytes::Bytes;

use super::round::{decode_count, encode_count, exchange_bytes};
use super::{byte_lens, Exchanger};
use crate::codec::{byte_len, decode_elements, encode_elements, Element};
use crate::error::{CommError, Result};
use crate::transport::check_rank;

impl<'t> Exchanger<'t> {
    /// Send `send_lists[p]` to every rank `p`, expecting the same number of
    /// elements back from `p`.
    pub async fn symmetric<T: Element>(&self, send_lists: &[Vec<T>]) -> Result<Vec<Vec<T>>> {
        self.check_per_rank("send_lists", send_lists)?;
        let transport = self.transport;
        let lens = byte_lens(send_lists);

        tracing::debug!(
            "rank {} symmetric exchange with {} peers",
            transport.rank(),
            lens.iter().filter(|&&n| n > 0).count()
        );

        let sends = send_lists.iter().map(|list| encode_elements(list)).collect();
        let received = exchange_bytes(
            transport,
            self.config.tags.symmetric,
            sends,
            &lens,
            self.verify(),
        )
        .await?;

        received.iter().map(|bytes| decode_elements(bytes)).collect()
    }

    /// Exchange with a known, symmetric set of partners and unknown sizes.
    ///
    /// A count round tells every partner how many elements follow (zero
    /// included), then a data round moves them. `send_lists` entries of
    /// non-partners must be empty.
    pub async fn known_partners<T: Element>(
        &self,
        partners: &[usize],
        send_lists: &[Vec<T>],
    ) -> Result<Vec<Vec<T>>> {
        self.check_per_rank("send_lists", send_lists)?;
        let transport = self.transport;
        let size = transport.size();
        let partner_set = partner_set(partners, size)?;

        if let Some((dest, list)) = send_lists
            .iter()
            .enumerate()
            .find(|(dest, list)| !list.is_empty() && !partner_set.contains(dest))
        {
            return Err(CommError::InvalidPlan(format!(
                "{} elements addressed to rank {}, which is not a partner",
                list.len(),
                dest
            )));
        }

        tracing::debug!(
            "rank {} known-partner exchange with {} partners",
            transport.rank(),
            partner_set.len()
        );

        // count round
        let mut count_sends = vec![Bytes::new(); size];
        let mut count_lens = vec![0; size];
        for &p in &partner_set {
            count_sends[p] = encode_count(send_lists[p].len());
            count_lens[p] = 8;
        }
        let counts = exchange_bytes(
            transport,
            self.config.tags.size_round,
            count_sends,
            &count_lens,
            true,
        )
        .await?;

        let mut recv_lens = vec![0; size];
        for &p in &partner_set {
            recv_lens[p] = byte_len::<T>(decode_count(p, &counts[p])?)?;
        }

        // data round
        let sends = send_lists.iter().map(|list| encode_elements(list)).collect();
        let received = exchange_bytes(
            transport,
            self.config.tags.known_partners,
            sends,
            &recv_lens,
            self.verify(),
        )
        .await?;

        received.iter().map(|bytes| decode_elements(bytes)).collect()
    }
}

/// Validate and deduplicate a partner list.
pub(crate) fn partner_set(partners: &[usize], size: usize) -> Result<BTreeSet<usize>> {
    let mut set = BTreeSet::new();
    for &p in partners {
        check_rank(p, size)?;
        if !set.insert(p) {
            return Err(CommError::InvalidPlan(format!(
                "rank {} listed twice as partner",
                p
            )));
        }
    }
    Ok(set)
}
