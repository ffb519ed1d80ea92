//! In-flight request handles.
//!
//! A [`Request`] is the Rust face of a non-blocking send or receive: a future
//! that resolves once the operation completes. [`RequestSet`] holds a batch of
//! them and retires them one slot at a time, whichever finishes first, or all
//! at once.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;

use super::BoxFuture;
use crate::error::{CommError, Result};

/// Handle for one non-blocking operation with a peer.
pub struct Request<T> {
    peer: usize,
    inner: BoxFuture<'static, Result<T>>,
}

/// Completion of a send carries no data.
pub type SendRequest = Request<()>;

/// Completion of a receive carries the message bytes.
pub type RecvRequest = Request<Bytes>;

impl<T> Request<T> {
    /// Wrap a future completing the operation with `peer`.
    pub fn new<F>(peer: usize, fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            peer,
            inner: Box::pin(fut),
        }
    }

    /// A request that is already complete.
    pub fn ready(peer: usize, outcome: Result<T>) -> Self
    where
        T: Send + 'static,
    {
        Self::new(peer, std::future::ready(outcome))
    }

    /// Rank on the other side of the operation.
    #[inline]
    pub fn peer(&self) -> usize {
        self.peer
    }
}

impl<T> Future for Request<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("peer", &self.peer).finish()
    }
}

/// One retired request of a [`RequestSet`].
#[derive(Debug)]
pub struct Retired<T> {
    /// Slot the request was inserted at.
    pub slot: usize,
    /// Peer rank of the request.
    pub peer: usize,
    /// Outcome of the operation.
    pub outcome: Result<T>,
}

/// A batch of requests addressed by slot index.
pub struct RequestSet<T> {
    slots: Vec<Option<Request<T>>>,
    pending: usize,
}

impl<T> Default for RequestSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            pending: 0,
        }
    }

    /// Create an empty set with room for `capacity` requests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            pending: 0,
        }
    }

    /// Add a request, returning its slot.
    pub fn insert(&mut self, request: Request<T>) -> usize {
        self.slots.push(Some(request));
        self.pending += 1;
        self.slots.len() - 1
    }

    /// Number of requests not yet retired.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Whether every request has been retired.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Peer of the request at `slot`, if it is still pending.
    pub fn peer(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot)?.as_ref().map(Request::peer)
    }

    /// Wait for the request at `slot`.
    pub async fn wait(&mut self, slot: usize) -> Result<T> {
        let request = self
            .slots
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| CommError::InvalidPlan(format!("request slot {} is not pending", slot)))?;
        self.pending -= 1;
        request.await
    }

    /// Wait for whichever pending request completes first.
    ///
    /// Returns `None` once nothing is pending.
    pub async fn wait_any(&mut self) -> Option<Retired<T>> {
        if self.pending == 0 {
            return None;
        }

        let slots = &mut self.slots;
        let retired = poll_fn(|cx| {
            for (slot, entry) in slots.iter_mut().enumerate() {
                let Some(request) = entry.as_mut() else {
                    continue;
                };
                if let Poll::Ready(outcome) = Pin::new(&mut *request).poll(cx) {
                    let peer = request.peer();
                    *entry = None;
                    return Poll::Ready(Retired {
                        slot,
                        peer,
                        outcome,
                    });
                }
            }
            Poll::Pending
        })
        .await;

        self.pending -= 1;
        Some(retired)
    }

    /// Retire every pending request.
    ///
    /// All requests are awaited even after a failure; the first error seen is
    /// returned.
    pub async fn drain(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(retired) = self.wait_any().await {
            if let Err(e) = retired.outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
