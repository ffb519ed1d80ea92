//! Callback-driven exchange with a known partner set.
//!
//! The caller never hands over whole send lists. A packer fills the outgoing
//! list for one partner right before it is sent, and an unpacker consumes
//! each incoming list as soon as the completion policy allows.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::round::check_len;
use super::symmetric::partner_set;
use super::Exchanger;
use crate::codec::{decode_elements, encode_elements, Element};
use crate::error::{CommError, Result};
use crate::transport::RequestSet;

/// Order in which received lists are handed to the unpacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Partner order as supplied. Reproducible from run to run.
    #[default]
    Deterministic,
    /// Whichever receive completes first.
    BestEffort,
}

impl<'t> Exchanger<'t> {
    /// Exchange with `partners` through callbacks.
    ///
    /// For each partner in order, `packer(p, &mut list)` fills the list sent
    /// to `p`; the list received from `p` is expected to have the same length.
    /// `unpacker(p, list)` then runs exactly once per partner, including
    /// partners with nothing to exchange, in the order `completion` selects.
    ///
    /// If the packer fails, receives already posted are cancelled, sends
    /// already issued are retired and the error is returned. Partners that
    /// did not fail still send their lists, which then sit unmatched on the
    /// callbacks tag; a later exchange on that tag would consume them as its
    /// own. Receive them (or move to another tag) before reusing it. If the
    /// unpacker fails, no further lists are unpacked but every request is
    /// still retired before the error is returned.
    pub async fn with_callbacks<T, P, U>(
        &self,
        partners: &[usize],
        mut packer: P,
        mut unpacker: U,
        completion: Completion,
    ) -> Result<()>
    where
        T: Element,
        P: FnMut(usize, &mut Vec<T>) -> Result<()> + Send,
        U: FnMut(usize, Vec<T>) -> Result<()> + Send,
    {
        let transport = self.transport;
        let tag = self.config.tags.callbacks;
        partner_set(partners, transport.size())?;

        tracing::debug!(
            "rank {} callback exchange with {} partners ({:?})",
            transport.rank(),
            partners.len(),
            completion
        );

        let mut recvs = RequestSet::with_capacity(partners.len());
        let mut sends = RequestSet::with_capacity(partners.len());
        // per partner: receive slot, None when nothing moves
        let mut slots: Vec<Option<usize>> = Vec::with_capacity(partners.len());
        // per receive slot: expected byte count
        let mut expected: Vec<usize> = Vec::with_capacity(partners.len());

        let mut outgoing = Vec::new();
        let mut post_error = None;
        for &p in partners {
            outgoing.clear();
            if let Err(e) = packer(p, &mut outgoing) {
                post_error = Some(e);
                break;
            }
            if outgoing.is_empty() {
                slots.push(None);
                continue;
            }

            let len = outgoing.len() * T::WIDTH;
            let posted = transport.irecv(p, len, tag).and_then(|recv| {
                let send = transport.isend(p, tag, encode_elements(&outgoing))?;
                Ok((recv, send))
            });
            match posted {
                Ok((recv, send)) => {
                    slots.push(Some(recvs.insert(recv)));
                    expected.push(len);
                    sends.insert(send);
                }
                Err(e) => {
                    post_error = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = post_error {
            drop(recvs);
            // sends complete on their own; errors there are secondary
            let _ = sends.drain().await;
            return Err(e);
        }

        let verify = self.verify();
        let mut first_error = None;
        match completion {
            Completion::Deterministic => {
                for (&p, slot) in partners.iter().zip(&slots) {
                    let (len, outcome) = match *slot {
                        Some(slot) => (expected[slot], recvs.wait(slot).await),
                        None => (0, Ok(Bytes::new())),
                    };
                    settle(&mut unpacker, &mut first_error, verify, p, len, outcome);
                }
            }
            Completion::BestEffort => {
                for (&p, _) in partners.iter().zip(&slots).filter(|(_, s)| s.is_none()) {
                    settle(&mut unpacker, &mut first_error, verify, p, 0, Ok(Bytes::new()));
                }
                while let Some(retired) = recvs.wait_any().await {
                    let len = expected[retired.slot];
                    settle(
                        &mut unpacker,
                        &mut first_error,
                        verify,
                        retired.peer,
                        len,
                        retired.outcome,
                    );
                }
            }
        }

        if let Err(e) = sends.drain().await {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Decode and unpack one received list unless an earlier step failed.
fn settle<T, U>(
    unpacker: &mut U,
    first_error: &mut Option<CommError>,
    verify: bool,
    peer: usize,
    expected: usize,
    outcome: Result<Bytes>,
) where
    T: Element,
    U: FnMut(usize, Vec<T>) -> Result<()>,
{
    if first_error.is_some() {
        return;
    }
    let result = outcome
        .and_then(|bytes| {
            if verify {
                check_len(peer, expected, bytes.len())?;
            }
            decode_elements::<T>(&bytes)
        })
        .and_then(|items| unpacker(peer, items));
    if let Err(e) = result {
        *first_error = Some(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tags;
    use crate::transport::{LocalGroup, Transport};

    /// Every rank exchanges with every other rank; rank pair (a, b) moves
    /// min(a, b) elements each way.
    async fn all_pairs(
        t: crate::transport::LocalTransport,
        completion: Completion,
    ) -> Result<Vec<(usize, Vec<u64>)>> {
        let me = t.rank();
        let partners: Vec<usize> = (0..t.size()).filter(|&p| p != me).collect();
        let mut seen = Vec::new();
        Exchanger::new(&t)
            .with_callbacks(
                &partners,
                |p, out: &mut Vec<u64>| {
                    out.extend((0..me.min(p)).map(|i| (me * 1000 + i) as u64));
                    Ok(())
                },
                |p, items| {
                    seen.push((p, items));
                    Ok(())
                },
                completion,
            )
            .await?;
        Ok(seen)
    }

    #[tokio::test]
    async fn test_deterministic_order_and_contents() {
        let out = LocalGroup::run(4, |t| all_pairs(t, Completion::Deterministic))
            .await
            .unwrap();

        for (me, seen) in out.iter().enumerate() {
            let order: Vec<usize> = seen.iter().map(|(p, _)| *p).collect();
            let expected: Vec<usize> = (0..4).filter(|&p| p != me).collect();
            assert_eq!(order, expected);

            for (p, items) in seen {
                let want: Vec<u64> = (0..me.min(*p)).map(|i| (p * 1000 + i) as u64).collect();
                assert_eq!(items, &want);
            }
        }
    }

    #[tokio::test]
    async fn test_best_effort_same_results() {
        let det = LocalGroup::run(4, |t| all_pairs(t, Completion::Deterministic))
            .await
            .unwrap();
        let best = LocalGroup::run(4, |t| all_pairs(t, Completion::BestEffort))
            .await
            .unwrap();

        for (mut d, mut b) in det.into_iter().zip(best) {
            d.sort();
            b.sort();
            assert_eq!(d, b);
        }
    }

    #[tokio::test]
    async fn test_zero_length_partner_still_unpacked() {
        // min(0, 1) = 0: nothing moves between ranks 0 and 1
        let out = LocalGroup::run(2, |t| all_pairs(t, Completion::BestEffort))
            .await
            .unwrap();
        assert_eq!(out[0], vec![(1, vec![])]);
        assert_eq!(out[1], vec![(0, vec![])]);
    }

    #[tokio::test]
    async fn test_unpacker_error_retires_everything() {
        let result = LocalGroup::run(3, |t| async move {
            let me = t.rank();
            let partners: Vec<usize> = (0..3).filter(|&p| p != me).collect();
            let mut calls = 0;
            let outcome = Exchanger::new(&t)
                .with_callbacks(
                    &partners,
                    |_, out: &mut Vec<u8>| {
                        out.push(me as u8);
                        Ok(())
                    },
                    |_, _| {
                        calls += 1;
                        Err(CommError::InvalidData("reject".into()))
                    },
                    Completion::Deterministic,
                )
                .await;
            Ok((calls, outcome.is_err()))
        })
        .await
        .unwrap();

        for (calls, failed) in result {
            assert_eq!(calls, 1);
            assert!(failed);
        }
    }

    #[tokio::test]
    async fn test_packer_error_returned() {
        let group = LocalGroup::new(2);
        let err = Exchanger::new(&group[0])
            .with_callbacks(
                &[1],
                |_, _: &mut Vec<u8>| Err(CommError::InvalidData("no".into())),
                |_, _| Ok(()),
                Completion::Deterministic,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_packer_error_leaves_partner_list_on_tag() {
        let out = LocalGroup::run(2, |t| async move {
            if t.rank() == 0 {
                let failed = Exchanger::new(&t)
                    .with_callbacks(
                        &[1],
                        |_, _: &mut Vec<u64>| Err(CommError::InvalidData("no".into())),
                        |_, _| Ok(()),
                        Completion::Deterministic,
                    )
                    .await;
                assert!(failed.is_err());

                // rank 1's list is still pending on the tag
                let stale = t.irecv(1, 8, tags::CALLBACKS)?.await?;
                t.send(1, tags::CALLBACKS, encode_elements(&[99u64])).await?;
                decode_elements::<u64>(&stale)
            } else {
                let mut got = Vec::new();
                Exchanger::new(&t)
                    .with_callbacks(
                        &[0],
                        |_, out: &mut Vec<u64>| {
                            out.push(7);
                            Ok(())
                        },
                        |_, items| {
                            got = items;
                            Ok(())
                        },
                        Completion::Deterministic,
                    )
                    .await?;
                Ok(got)
            }
        })
        .await
        .unwrap();

        assert_eq!(out[0], vec![7]);
        assert_eq!(out[1], vec![99]);
    }

    #[tokio::test]
    async fn test_duplicate_partner_rejected() {
        let group = LocalGroup::new(3);
        let err = Exchanger::new(&group[0])
            .with_callbacks(
                &[1, 1],
                |_, _: &mut Vec<u8>| Ok(()),
                |_, _| Ok(()),
                Completion::BestEffort,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommError::InvalidPlan(_)));
    }

    #[test]
    fn test_completion_serde_names() {
        let json = serde_json::to_string(&Completion::BestEffort).unwrap();
        assert_eq!(json, "\"best_effort\"");
        assert_eq!(Completion::default(), Completion::Deterministic);
    }
}
