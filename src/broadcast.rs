//! One-to-all broadcast of a packed buffer.
//!
//! The root packs into [`CommBroadcast::send_buffer`], every rank agrees on
//! the size with [`CommBroadcast::allocate_buffer`], the root packs again for
//! real and [`CommBroadcast::communicate`] copies the bytes everywhere. Every
//! rank then reads the result from the same buffer through
//! [`CommBroadcast::recv_buffer`].
//!
//! # Example
//!
//! ```
//! use commwire::broadcast::CommBroadcast;
//! use commwire::transport::{LocalGroup, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> commwire::Result<()> {
//! let names = LocalGroup::run(3, |t| async move {
//!     let mut bcast = CommBroadcast::new(&t, 0)?;
//!     bcast
//!         .pack_with(|buf| {
//!             buf.pack(&"mesh-7".to_string())?;
//!             Ok(())
//!         })
//!         .await?;
//!     let name: String = bcast.recv_buffer().unpack()?;
//!     Ok(name)
//! })
//! .await?;
//! assert!(names.iter().all(|n| n == "mesh-7"));
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;

use crate::buffer::CommBuffer;
use crate::error::{CommError, Result};
use crate::exchange::{all_gather, TagSet};
use crate::transport::{check_rank, Tag, Transport};

/// Broadcast from a fixed root through a single buffer.
pub struct CommBroadcast<'t> {
    transport: &'t dyn Transport,
    root: usize,
    buffer: CommBuffer,
    tag: Tag,
    setup_tag: Tag,
}

impl<'t> CommBroadcast<'t> {
    /// Broadcast from `root` using the default tags.
    pub fn new(transport: &'t dyn Transport, root: usize) -> Result<Self> {
        Self::with_tags(transport, root, &TagSet::default())
    }

    /// Broadcast from `root` using the broadcast tags of `tags`.
    pub fn with_tags(transport: &'t dyn Transport, root: usize, tags: &TagSet) -> Result<Self> {
        check_rank(root, transport.size())?;
        Ok(Self {
            transport,
            root,
            buffer: CommBuffer::new(),
            tag: tags.broadcast,
            setup_tag: tags.broadcast_setup,
        })
    }

    /// Root rank.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Whether the caller is the root.
    pub fn is_root(&self) -> bool {
        self.transport.rank() == self.root
    }

    /// Buffer the root packs into. Same object as [`recv_buffer`](Self::recv_buffer).
    pub fn send_buffer(&mut self) -> &mut CommBuffer {
        &mut self.buffer
    }

    /// Buffer every rank reads from after [`communicate`](Self::communicate).
    pub fn recv_buffer(&mut self) -> &mut CommBuffer {
        &mut self.buffer
    }

    /// Agree on the root's byte count and allocate it on every rank.
    ///
    /// Collective. Returns the logical OR of every rank's `local_flag`, which
    /// lets ranks vote on whether another round is needed.
    pub async fn allocate_buffer(&mut self, local_flag: bool) -> Result<bool> {
        if self.buffer.is_allocated() {
            return Err(CommError::AlreadyAllocated);
        }

        let mine = CommBuffer::packed_with(|b| {
            b.pack(&(self.root as u64))?
                .pack(&(self.buffer.size() as u64))?
                .pack(&local_flag)?;
            Ok(())
        })?;
        let gathered = all_gather(self.transport, self.setup_tag, mine.into_bytes()).await?;

        let mut min_root = usize::MAX;
        let mut max_root = 0;
        let mut root_size = 0;
        let mut any_flag = false;
        for (rank, bytes) in gathered.into_iter().enumerate() {
            let mut entry = CommBuffer::from_bytes(bytes);
            let root = entry.unpack::<u64>()? as usize;
            let size = entry.unpack::<u64>()? as usize;
            any_flag |= entry.unpack::<bool>()?;

            min_root = min_root.min(root);
            max_root = max_root.max(root);
            if rank == self.root {
                root_size = size;
            }
        }

        if min_root != max_root {
            tracing::warn!(
                "broadcast root disagrees across group: {} vs {}",
                min_root,
                max_root
            );
            return Err(CommError::InconsistentRoot {
                min: min_root,
                max: max_root,
            });
        }

        tracing::debug!(
            "rank {} allocating {} byte broadcast buffer from root {}",
            self.transport.rank(),
            root_size,
            self.root
        );
        self.buffer.set_size(root_size);
        self.buffer.allocate()?;
        Ok(any_flag)
    }

    /// Copy the root's buffer to every rank and rewind every buffer.
    pub async fn communicate(&mut self) -> Result<()> {
        if !self.buffer.is_allocated() {
            return Err(CommError::InvalidPlan(
                "broadcast buffer used before allocate_buffer".to_string(),
            ));
        }

        let payload = if self.is_root() {
            Bytes::copy_from_slice(self.buffer.as_bytes())
        } else {
            Bytes::from(vec![0u8; self.buffer.capacity()])
        };
        let received = self.transport.broadcast(self.root, self.tag, payload).await?;

        if !self.is_root() {
            self.buffer.replace_contents(&received);
        }
        self.buffer.reset();
        Ok(())
    }

    /// Size, allocate, pack and broadcast in one call.
    ///
    /// `pack` runs on the root only, once per pass. Collective: every rank
    /// must call it.
    pub async fn pack_with<F>(&mut self, mut pack: F) -> Result<()>
    where
        F: FnMut(&mut CommBuffer) -> Result<()>,
    {
        if self.is_root() {
            pack(&mut self.buffer)?;
        }
        let sized = self.buffer.size();
        self.allocate_buffer(false).await?;

        if self.is_root() {
            pack(&mut self.buffer)?;
            if self.buffer.size() != sized {
                return Err(CommError::SizingMismatch {
                    sized,
                    packed: self.buffer.size(),
                });
            }
        }
        self.communicate().await
    }

    /// Drop the buffer and start over in sizing mode.
    pub fn clear(&mut self) {
        self.buffer = CommBuffer::new();
    }
}
