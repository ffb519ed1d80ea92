//! In-process transport: every rank is a tokio task sharing one fabric.
//!
//! Matching follows the usual message-passing rules. Each destination keeps,
//! per `(source, tag)`, either a queue of posted receives or a queue of
//! unexpected messages, never both. A send first tries the oldest posted
//! receive and otherwise parks its bytes in the unexpected queue, so sends
//! complete immediately and FIFO order per `(source, tag)` holds.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use commwire::transport::{LocalGroup, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> commwire::Result<()> {
//! let lens = LocalGroup::run(3, |t| async move {
//!     let next = (t.rank() + 1) % t.size();
//!     let prev = (t.rank() + t.size() - 1) % t.size();
//!     let recv = t.irecv(prev, 8, 1)?;
//!     t.send(next, 1, Bytes::copy_from_slice(&(t.rank() as u64).to_ne_bytes())).await?;
//!     let bytes = recv.await?;
//!     Ok(bytes.len())
//! })
//! .await?;
//! assert_eq!(lens, vec![8, 8, 8]);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Barrier};

use super::{check_rank, BoxFuture, RecvRequest, Request, SendRequest, Tag, Transport};
use crate::error::{CommError, Result};

/// A receive waiting for its message.
struct PostedRecv {
    len: usize,
    tx: oneshot::Sender<Result<Bytes>>,
}

/// Matching state for one `(source, tag)` channel.
#[derive(Default)]
struct Channel {
    posted: VecDeque<PostedRecv>,
    unexpected: VecDeque<Bytes>,
}

/// Incoming side of one rank.
#[derive(Default)]
struct Mailbox {
    channels: HashMap<(usize, Tag), Channel>,
}

/// State shared by every rank of a group.
struct Fabric {
    mailboxes: Vec<Mutex<Mailbox>>,
    barrier: Barrier,
}

/// Factory for in-process groups.
pub struct LocalGroup;

impl LocalGroup {
    /// Create the endpoints of a group of `size` ranks, in rank order.
    pub fn new(size: usize) -> Vec<LocalTransport> {
        let fabric = Arc::new(Fabric {
            mailboxes: (0..size).map(|_| Mutex::new(Mailbox::default())).collect(),
            barrier: Barrier::new(size),
        });

        (0..size)
            .map(|rank| LocalTransport {
                rank,
                size,
                fabric: Arc::clone(&fabric),
            })
            .collect()
    }

    /// Run `f` once per rank on its own task and collect the results in rank
    /// order.
    ///
    /// The first rank error (in rank order) is returned after every task has
    /// finished. A panicking rank surfaces as [`CommError::Task`].
    pub async fn run<F, Fut, R>(size: usize, f: F) -> Result<Vec<R>>
    where
        F: Fn(LocalTransport) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let handles: Vec<_> = Self::new(size)
            .into_iter()
            .map(|transport| tokio::spawn(f(transport)))
            .collect();

        let mut results = Vec::with_capacity(size);
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(CommError::Task(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

/// One rank's endpoint of a [`LocalGroup`].
#[derive(Clone)]
pub struct LocalTransport {
    rank: usize,
    size: usize,
    fabric: Arc<Fabric>,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

fn deliver(rank: usize, posted_len: usize, payload: Bytes) -> Result<Bytes> {
    if payload.len() > posted_len {
        return Err(CommError::Truncated {
            rank,
            expected: posted_len,
            received: payload.len(),
        });
    }
    Ok(payload)
}

impl Transport for LocalTransport {
    fn size(&self) -> usize {
        self.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<SendRequest> {
        check_rank(dest, self.size)?;
        tracing::trace!(
            "rank {} isend to {} tag {} ({} bytes)",
            self.rank,
            dest,
            tag,
            payload.len()
        );

        let mut mailbox = self.fabric.mailboxes[dest].lock();
        let channel = mailbox.channels.entry((self.rank, tag)).or_default();

        while let Some(posted) = channel.posted.pop_front() {
            // Skip receives whose request was dropped.
            if posted.tx.is_closed() {
                continue;
            }
            let _ = posted.tx.send(deliver(self.rank, posted.len, payload));
            return Ok(Request::ready(dest, Ok(())));
        }

        channel.unexpected.push_back(payload);
        Ok(Request::ready(dest, Ok(())))
    }

    fn irecv(&self, source: usize, len: usize, tag: Tag) -> Result<RecvRequest> {
        check_rank(source, self.size)?;
        tracing::trace!(
            "rank {} irecv from {} tag {} ({} bytes)",
            self.rank,
            source,
            tag,
            len
        );

        let mut mailbox = self.fabric.mailboxes[self.rank].lock();
        let channel = mailbox.channels.entry((source, tag)).or_default();

        if let Some(payload) = channel.unexpected.pop_front() {
            return Ok(Request::ready(source, deliver(source, len, payload)));
        }

        let (tx, rx) = oneshot::channel();
        channel.posted.push_back(PostedRecv { len, tx });
        Ok(Request::new(source, async move {
            rx.await.map_err(|_| CommError::ConnectionClosed)?
        }))
    }

    fn barrier(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tracing::trace!("rank {} entering barrier", self.rank);
            self.fabric.barrier.wait().await;
            Ok(())
        })
    }
}
