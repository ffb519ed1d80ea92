//! Default message tags, one per exchange call site.
//!
//! Distinct tags keep the messages of different exchange kinds from matching
//! each other's receives when rounds interleave.

use crate::transport::Tag;

/// Variant A data round.
pub const NEGOTIATED: Tag = 10242;
/// Variant C data round.
pub const OFFSETS: Tag = 10243;
/// Variant B data round.
pub const SYMMETRIC: Tag = 10244;
/// Variant D size round.
pub const SIZE_ROUND: Tag = 10245;
/// Variant D data round.
pub const KNOWN_PARTNERS: Tag = 10246;
/// Variant E.
pub const CALLBACKS: Tag = 10247;
/// Count all-to-all of [`DenseResolver`](super::DenseResolver).
pub const RESOLVER: Tag = 10248;
/// Root broadcast payload.
pub const BROADCAST: Tag = 10249;
/// Root broadcast size agreement.
pub const BROADCAST_SETUP: Tag = 10250;
