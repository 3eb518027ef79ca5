//! Error taxonomy for the Interval Tree Clock algebra.
//!
//! One flat enum; every fallible operation in the crate reports one of
//! these. Structural corruption that the C-era formulation of ITC had to
//! check at runtime (null children, owned interior nodes) is
//! unrepresentable in the Rust tree types, so the corruption variants
//! here cover what remains: normalization violations and counters that do
//! not fit the configured width.

/// Errors reported by ID, Event, Stamp, and codec operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A caller-supplied constraint was violated at an API boundary.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// An ID tree violates its normalization invariants, or two IDs being
    /// summed claim the same interval.
    #[error("corrupt ID tree")]
    CorruptId,

    /// An event tree violates its structural invariants (e.g. an
    /// accumulated counter exceeds the configured counter width).
    #[error("corrupt event tree")]
    CorruptEvent,

    /// A serialized stamp is truncated, has inconsistent component
    /// lengths, or carries trailing bytes.
    #[error("corrupt stamp")]
    CorruptStamp,

    /// Counter arithmetic exceeded the configured counter width.
    #[error("event counter overflow")]
    CounterOverflow,

    /// Counter arithmetic went below zero.
    #[error("event counter underflow")]
    CounterUnderflow,

    /// A caller-provided output buffer is too small for the encoding.
    #[error("insufficient resources: need {needed} bytes, have {capacity}")]
    InsufficientResources {
        /// Bytes the encoding requires.
        needed: usize,
        /// Bytes the caller provided.
        capacity: usize,
    },

    /// A serialized event declares a counter wider than this build
    /// supports.
    #[error("unsupported event counter size: {0} bytes")]
    UnsupportedCounterSize(u8),

    /// The version tag of a serialized artifact does not match this
    /// library's major version.
    #[error("incompatible library version: expected {expected}, found {found}")]
    IncompatibleVersion {
        /// The version this build reads and writes.
        expected: u8,
        /// The version found on the wire.
        found: u8,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
