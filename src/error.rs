//! Error types for commwire.

use thiserror::Error;

/// Main error type for all buffer, transport and exchange operations.
#[derive(Debug, Error)]
pub enum CommError {
    /// Packing would write past the end of an allocated buffer.
    #[error("Pack overflow: {needed} bytes at offset {offset} exceed capacity {capacity}")]
    PackOverflow {
        offset: usize,
        needed: usize,
        capacity: usize,
    },

    /// Unpacking, peeking or skipping would read past the end of a buffer.
    #[error("Unpack overflow: {needed} bytes at offset {offset} exceed capacity {capacity}")]
    UnpackOverflow {
        offset: usize,
        needed: usize,
        capacity: usize,
    },

    /// A raw pointer was handed to the buffer. Pointers are never packed.
    #[error("Packing a raw pointer for communication is not allowed")]
    PointerPack,

    /// Peek is not implemented for the requested type.
    #[error("Peek not supported for {0}")]
    PeekUnsupported(&'static str),

    /// Sequence length does not fit the 32-bit wire count.
    #[error("Sequence of {0} elements exceeds the 32-bit count field")]
    CountOverflow(usize),

    /// Bytes do not decode to a valid value of the requested type.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Sizing pass and packing pass of a two-pass build disagree.
    #[error("Sizing pass counted {sized} bytes but packing pass wrote {packed}")]
    SizingMismatch { sized: usize, packed: usize },

    /// Buffer already has storage.
    #[error("Buffer is already allocated")]
    AlreadyAllocated,

    /// Rank is outside the process group.
    #[error("Rank {rank} out of range for group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    /// Caller-supplied communication plan is malformed.
    #[error("Invalid communication plan: {0}")]
    InvalidPlan(String),

    /// Configuration is internally inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Received payload length differs from the length the plan declared.
    #[error("Plan mismatch with rank {peer}: expected {expected} bytes, received {received}")]
    PlanMismatch {
        peer: usize,
        expected: usize,
        received: usize,
    },

    /// Incoming message is longer than the posted receive.
    #[error("Message from rank {rank} truncated: posted {expected} bytes, got {received}")]
    Truncated {
        rank: usize,
        expected: usize,
        received: usize,
    },

    /// Ranks disagree on the broadcast root.
    #[error("Inconsistent broadcast root across group: min {min}, max {max}")]
    InconsistentRoot { min: usize, max: usize },

    /// Transport endpoint went away while a request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A rank task of a local group failed.
    #[error("Rank task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Result type alias using CommError.
pub type Result<T> = std::result::Result<T, CommError>;
