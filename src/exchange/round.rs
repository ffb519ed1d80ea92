//! The post / barrier / send / wait skeleton shared by the exchange variants.

use bytes::Bytes;

use crate::error::{CommError, Result};
use crate::transport::{RequestSet, Tag, Transport};

/// One data round: `sends[p]` goes to rank `p`, `recv_lens[p]` bytes are
/// expected from rank `p`.
///
/// Empty payloads and zero lengths post nothing. The result holds one entry
/// per rank, empty where nothing was received.
///
/// Every posted request is retired before returning, also when posting,
/// the barrier or a send failed; the first failure is returned. A rank whose
/// step failed still sends to the remaining peers so that they are not left
/// waiting.
pub(crate) async fn exchange_bytes(
    transport: &dyn Transport,
    tag: Tag,
    sends: Vec<Bytes>,
    recv_lens: &[usize],
    verify: bool,
) -> Result<Vec<Bytes>> {
    let size = transport.size();
    if sends.len() != size || recv_lens.len() != size {
        return Err(CommError::InvalidPlan(format!(
            "round needs {} send and receive entries, got {} and {}",
            size,
            sends.len(),
            recv_lens.len()
        )));
    }

    let mut first_error = None;

    // 1. post receives
    let mut recvs = RequestSet::with_capacity(size);
    for (source, &len) in recv_lens.iter().enumerate() {
        if len == 0 {
            continue;
        }
        match transport.irecv(source, len, tag) {
            Ok(recv) => {
                recvs.insert(recv);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    // 2. everyone has posted
    if let Err(e) = transport.barrier().await {
        tracing::warn!("rank {} barrier failed: {}", transport.rank(), e);
        first_error.get_or_insert(e);
    }

    // 3. send
    let mut outgoing = RequestSet::with_capacity(size);
    for (dest, payload) in sends.into_iter().enumerate() {
        if payload.is_empty() {
            continue;
        }
        match transport.isend(dest, tag, payload) {
            Ok(send) => {
                outgoing.insert(send);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    // 4. retire
    let mut received = vec![Bytes::new(); size];
    while let Some(retired) = recvs.wait_any().await {
        match retired.outcome {
            Ok(bytes) => received[retired.peer] = bytes,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Err(e) = outgoing.drain().await {
        first_error.get_or_insert(e);
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    if verify {
        for (peer, (bytes, &expected)) in received.iter().zip(recv_lens).enumerate() {
            check_len(peer, expected, bytes.len())?;
        }
    }
    Ok(received)
}

/// Fail with [`CommError::PlanMismatch`] if `received` differs from `expected`.
pub(crate) fn check_len(peer: usize, expected: usize, received: usize) -> Result<()> {
    if expected != received {
        tracing::warn!(
            "size mismatch with rank {}: expected {} bytes, received {}",
            peer,
            expected,
            received
        );
        return Err(CommError::PlanMismatch {
            peer,
            expected,
            received,
        });
    }
    Ok(())
}

/// Encode one count as a native-order `u64` message.
pub(crate) fn encode_count(count: usize) -> Bytes {
    Bytes::copy_from_slice(&(count as u64).to_ne_bytes())
}

/// Decode a count message produced by [`encode_count`].
pub(crate) fn decode_count(peer: usize, bytes: &[u8]) -> Result<usize> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| CommError::PlanMismatch {
        peer,
        expected: 8,
        received: bytes.len(),
    })?;
    usize::try_from(u64::from_ne_bytes(raw))
        .map_err(|_| CommError::InvalidData(format!("count from rank {} exceeds usize", peer)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::transport::{BoxFuture, LocalGroup, RecvRequest, Request, SendRequest};

    #[tokio::test]
    async fn test_round_moves_payloads() {
        let out = LocalGroup::run(3, |t| async move {
            let me = t.rank();
            let sends = (0..3)
                .map(|p| Bytes::from(vec![me as u8; p + 1]))
                .collect();
            let recv_lens = vec![me + 1; 3];
            exchange_bytes(&t, 5, sends, &recv_lens, true).await
        })
        .await
        .unwrap();

        for (me, received) in out.iter().enumerate() {
            for (source, bytes) in received.iter().enumerate() {
                assert_eq!(bytes.as_ref(), vec![source as u8; me + 1].as_slice());
            }
        }
    }

    #[tokio::test]
    async fn test_zero_length_peers_skipped() {
        let out = LocalGroup::run(2, |t| async move {
            let me = t.rank();
            // rank 0 sends to 1 only; rank 1 sends nothing
            let sends = if me == 0 {
                vec![Bytes::new(), Bytes::from_static(b"x")]
            } else {
                vec![Bytes::new(), Bytes::new()]
            };
            let recv_lens = if me == 1 { vec![1, 0] } else { vec![0, 0] };
            exchange_bytes(&t, 5, sends, &recv_lens, true).await
        })
        .await
        .unwrap();

        assert!(out[0].iter().all(|b| b.is_empty()));
        assert_eq!(out[1][0], Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_verify_reports_short_message() {
        let result = LocalGroup::run(2, |t| async move {
            let sends = vec![Bytes::from_static(b"ab"); 2];
            exchange_bytes(&t, 5, sends, &[4, 4], true).await
        })
        .await;
        assert!(matches!(
            result,
            Err(CommError::PlanMismatch {
                expected: 4,
                received: 2,
                ..
            })
        ));
    }

    /// Transport whose requests count their own completion. Sends to
    /// `fail_dest` and, optionally, the barrier fail.
    struct FlakyTransport {
        size: usize,
        fail_dest: usize,
        fail_barrier: bool,
        retired: Arc<AtomicUsize>,
    }

    impl Transport for FlakyTransport {
        fn size(&self) -> usize {
            self.size
        }

        fn rank(&self) -> usize {
            0
        }

        fn isend(&self, dest: usize, _tag: Tag, _payload: Bytes) -> Result<SendRequest> {
            if dest == self.fail_dest {
                return Err(CommError::ConnectionClosed);
            }
            let retired = Arc::clone(&self.retired);
            Ok(Request::new(dest, async move {
                retired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }

        fn irecv(&self, source: usize, len: usize, _tag: Tag) -> Result<RecvRequest> {
            let retired = Arc::clone(&self.retired);
            Ok(Request::new(source, async move {
                retired.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from(vec![0u8; len]))
            }))
        }

        fn barrier(&self) -> BoxFuture<'_, Result<()>> {
            let fail = self.fail_barrier;
            Box::pin(async move {
                if fail {
                    Err(CommError::InvalidPlan("barrier".into()))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_failed_send_still_retires_everything() {
        let retired = Arc::new(AtomicUsize::new(0));
        let transport = FlakyTransport {
            size: 4,
            fail_dest: 1,
            fail_barrier: false,
            retired: Arc::clone(&retired),
        };
        let sends = vec![Bytes::from_static(b"abcd"); 4];
        let err = exchange_bytes(&transport, 5, sends, &[4; 4], false)
            .await
            .unwrap_err();

        assert!(matches!(err, CommError::ConnectionClosed));
        // 4 receives plus the 3 sends that could be issued
        assert_eq!(retired.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_failed_barrier_still_retires_everything() {
        let retired = Arc::new(AtomicUsize::new(0));
        let transport = FlakyTransport {
            size: 3,
            fail_dest: usize::MAX,
            fail_barrier: true,
            retired: Arc::clone(&retired),
        };
        let sends = vec![Bytes::from_static(b"ab"); 3];
        let err = exchange_bytes(&transport, 5, sends, &[2; 3], false)
            .await
            .unwrap_err();

        assert!(matches!(err, CommError::InvalidPlan(_)));
        assert_eq!(retired.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_wrong_entry_count_rejected() {
        let group = LocalGroup::new(2);
        let err = exchange_bytes(&group[0], 5, vec![Bytes::new()], &[0, 0], false)
            .await
            .unwrap_err();
        assert!(matches!(err, CommError::InvalidPlan(_)));
    }

    #[test]
    fn test_count_codec() {
        assert_eq!(decode_count(0, &encode_count(12345)).unwrap(), 12345);
        assert!(matches!(
            decode_count(3, &[0u8; 4]),
            Err(CommError::PlanMismatch { peer: 3, .. })
        ));
    }
}
