//! Exchange over flat arrays described by offset tables.

use std::ops::Range;

use super::round::exchange_bytes;
use super::Exchanger;
use crate::codec::{byte_len, decode_into, encode_elements, Element};
use crate::error::{CommError, Result};

impl<'t> Exchanger<'t> {
    /// Exchange slices of flat arrays.
    ///
    /// `send_data[send_offsets[p]..send_offsets[p + 1]]` goes to rank `p` and
    /// `recv_data[recv_offsets[p]..recv_offsets[p + 1]]` is filled from rank
    /// `p`. Both offset tables have `size + 1` non-decreasing entries.
    pub async fn with_offsets<T: Element>(
        &self,
        send_offsets: &[usize],
        send_data: &[T],
        recv_offsets: &[usize],
        recv_data: &mut [T],
    ) -> Result<()> {
        let transport = self.transport;
        let size = transport.size();
        let send_ranges = ranges("send_offsets", send_offsets, size, send_data.len())?;
        let recv_ranges = ranges("recv_offsets", recv_offsets, size, recv_data.len())?;

        tracing::debug!(
            "rank {} offset exchange: {} elements out, {} elements in",
            transport.rank(),
            send_offsets[size] - send_offsets[0],
            recv_offsets[size] - recv_offsets[0]
        );

        let recv_lens = recv_ranges
            .iter()
            .map(|r| byte_len::<T>(r.len()))
            .collect::<Result<Vec<_>>>()?;
        let sends = send_ranges
            .iter()
            .map(|r| encode_elements(&send_data[r.clone()]))
            .collect();

        let received = exchange_bytes(
            transport,
            self.config.tags.offsets,
            sends,
            &recv_lens,
            self.verify(),
        )
        .await?;

        for (bytes, range) in received.iter().zip(recv_ranges) {
            if !range.is_empty() {
                decode_into(bytes, &mut recv_data[range])?;
            }
        }
        Ok(())
    }
}

/// Turn an offset table into one range per rank.
fn ranges(what: &str, offsets: &[usize], size: usize, data_len: usize) -> Result<Vec<Range<usize>>> {
    if offsets.len() != size + 1 {
        return Err(CommError::InvalidPlan(format!(
            "{} has {} entries, expected {}",
            what,
            offsets.len(),
            size + 1
        )));
    }
    if let Some(w) = offsets.windows(2).find(|w| w[0] > w[1]) {
        return Err(CommError::InvalidPlan(format!(
            "{} decreases from {} to {}",
            what, w[0], w[1]
        )));
    }
    if offsets[size] > data_len {
        return Err(CommError::InvalidPlan(format!(
            "{} ends at {} past data length {}",
            what, offsets[size], data_len
        )));
    }
    Ok(offsets.windows(2).map(|w| w[0]..w[1]).collect())
}
