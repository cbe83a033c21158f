//! Construction-time error handling.
//!
//! Once a [`crate::BroadPhase`] has been built there are no recoverable
//! failure modes: the crate does no I/O, and a desynced internal invariant
//! (a stale cell backlink, an out-of-range bucket index) is a programming
//! error that should fail loudly rather than be reported here. `Result`
//! only shows up at the one boundary where caller-supplied parameters can
//! be nonsensical — building a structure.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BroadPhaseError {
    #[error("hash bucket count must be nonzero, got {0}")]
    ZeroBucketCount(usize),

    #[error("half-width must be positive, got {0}")]
    NonPositiveHalfWidth(f32),
}

pub type Result<T> = std::result::Result<T, BroadPhaseError>;
