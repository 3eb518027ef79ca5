#![forbid(unsafe_code)]
//! Interval Tree Clocks (Almeida, Baquero & Fonte 2008).
//!
//! Causality tracking for systems where participants come and go:
//! unlike vector clocks, no global registry of identities is needed.
//! Each participant holds a [`Stamp`], a share of the identity interval
//! \[0, 1) paired with a causal history, and four operations build
//! every higher-level protocol:
//!
//! - [`Stamp::fork`] splits a stamp into two with disjoint identities,
//! - [`Stamp::event`] records a new event in the owned region,
//! - [`Stamp::join`] merges two stamps (identities and histories),
//! - [`Stamp::compare`] orders two histories causally.
//!
//! ```
//! use treeclock_core::{Stamp, StampOrder};
//!
//! let seed = Stamp::seed();
//! let (mut left, mut right) = seed.fork();
//! left.event()?;
//! right.event()?;
//! assert_eq!(left.compare(&right), StampOrder::Concurrent);
//!
//! let merged = left.join(&right)?;
//! assert!(left.leq(&merged) && right.leq(&merged));
//! assert_eq!(seed.compare(&merged), StampOrder::LessThan);
//! # Ok::<(), treeclock_core::Error>(())
//! ```
//!
//! Stamps serialize to a compact versioned binary format
//! ([`Stamp::to_bytes`] / [`Stamp::deserialize`]) and to a hex text
//! form ([`text`]). All operations are pure value manipulation: no
//! I/O, no clocks, no locking.

pub mod codec;
pub mod counter;
pub mod error;
pub mod ops;
pub mod text;
pub mod tree;

pub use codec::WIRE_VERSION;
pub use counter::{Counter, COUNTER_BYTES};
pub use error::{Error, Result};
pub use ops::StampOrder;
pub use tree::{Event, Id, Stamp};
