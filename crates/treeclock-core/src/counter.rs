//! Event counter width configuration.
//!
//! The counter width is fixed at compile time. The default is 32 bits;
//! the `counter-u64` feature widens it to 64. The wire format is
//! unaffected except for the maximum counter byte length a decoder will
//! accept.

use crate::error::{Error, Result};

/// The event counter type.
#[cfg(not(feature = "counter-u64"))]
pub type Counter = u32;

/// The event counter type.
#[cfg(feature = "counter-u64")]
pub type Counter = u64;

/// Bytes a counter occupies at full width; the upper bound a decoder
/// accepts for a serialized counter length.
pub const COUNTER_BYTES: usize = std::mem::size_of::<Counter>();

/// Accumulator wide enough that sums of counters along any realistic
/// root-to-leaf path cannot overflow. Comparisons and effective-height
/// computations happen in this type; results narrow back to [`Counter`]
/// only where a tree node is actually built.
pub(crate) type Wide = u128;

/// Narrow an accumulated height back to the counter width.
pub(crate) fn narrow(value: Wide) -> Result<Counter> {
    Counter::try_from(value).map_err(|_| Error::CounterOverflow)
}

/// Narrow for observability paths, clamping instead of failing.
pub(crate) fn saturate(value: Wide) -> Counter {
    Counter::try_from(value).unwrap_or(Counter::MAX)
}
