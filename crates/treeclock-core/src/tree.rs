//! Interval Tree Clock data structures.
//!
//! Implements the ID tree, Event tree, and Stamp types from:
//! Almeida, Baquero & Fonte (2008) "Interval Tree Clocks".
//!
//! - [`Id`] represents a partition of the interval \[0, 1) among agents.
//! - [`Event`] represents causal history as a binary tree of counters.
//! - [`Stamp`] combines an ID tree and Event tree into an ITC stamp.
//!
//! Trees are kept in their minimal (normalized) representation by every
//! operation. The operations themselves (fork, join, event, peek,
//! compare) live in a separate module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::counter::{narrow, saturate, Counter, Wide};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ID tree
// ---------------------------------------------------------------------------

/// An ITC identity tree, partitioning \[0, 1) among participants.
///
/// Leaves are either `0` (not owned) or `1` (owned). Interior nodes
/// split the interval into left and right halves; ownership lives only
/// on leaves. Normalization collapses degenerate branches:
/// `Branch(0, 0) → Zero`, `Branch(1, 1) → One`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Id {
    /// Leaf 0 — this portion of the interval is not owned.
    Zero,
    /// Leaf 1 — this portion of the interval is owned.
    One,
    /// Branch splitting the interval into left and right halves.
    Branch(Box<Self>, Box<Self>),
}

impl Id {
    /// Create an anonymous (unowned) identity: leaf 0.
    #[must_use]
    pub const fn zero() -> Self {
        Self::Zero
    }

    /// Create a seed (fully-owned) identity: leaf 1.
    #[must_use]
    pub const fn one() -> Self {
        Self::One
    }

    /// Create a branch, collapsing the degenerate cases.
    #[must_use]
    pub fn branch(left: Self, right: Self) -> Self {
        match (&left, &right) {
            (Self::Zero, Self::Zero) => Self::Zero,
            (Self::One, Self::One) => Self::One,
            _ => Self::Branch(Box::new(left), Box::new(right)),
        }
    }

    /// Returns `true` if this identity owns no interval.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::Zero
    }

    /// Returns `true` if this identity owns the entire interval.
    #[must_use]
    pub fn is_one(&self) -> bool {
        *self == Self::One
    }

    /// Returns `true` if this is a leaf node (0 or 1).
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Zero | Self::One)
    }

    /// Depth of the tree (0 for leaves).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Zero | Self::One => 0,
            Self::Branch(l, r) => 1 + l.depth().max(r.depth()),
        }
    }

    /// Number of nodes in the tree (leaves + branches).
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Zero | Self::One => 1,
            Self::Branch(l, r) => 1 + l.node_count() + r.node_count(),
        }
    }

    /// Returns `true` if no `(0, 0)` or `(1, 1)` subtree exists.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        match self {
            Self::Zero | Self::One => true,
            Self::Branch(l, r) => {
                !matches!(
                    (l.as_ref(), r.as_ref()),
                    (Self::Zero, Self::Zero) | (Self::One, Self::One)
                ) && l.is_normalized()
                    && r.is_normalized()
            }
        }
    }

    /// Verify the tree's invariants.
    ///
    /// Interior-node structure (both children present, ownership only on
    /// leaves) is guaranteed by the type; what remains to check is
    /// normal form, requested via `require_normalized`.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptId`] when `require_normalized` is set and a
    /// collapsible `(0, 0)` or `(1, 1)` subtree exists.
    pub fn validate(&self, require_normalized: bool) -> Result<()> {
        if require_normalized && !self.is_normalized() {
            return Err(Error::CorruptId);
        }
        Ok(())
    }

    /// Normalize the tree to its minimal representation.
    ///
    /// Collapses `Branch(0, 0) → 0` and `Branch(1, 1) → 1` bottom-up.
    /// Idempotent.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Zero | Self::One => self,
            Self::Branch(l, r) => Self::branch(l.normalize(), r.normalize()),
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "0"),
            Self::One => write!(f, "1"),
            Self::Branch(l, r) => write!(f, "({l:?}, {r:?})"),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Event tree
// ---------------------------------------------------------------------------

/// An ITC event tree, tracking causal history as a binary tree of
/// counters.
///
/// The effective count at any position is the sum of counters along the
/// root-to-leaf path; interior counters are a base shared by both
/// subtrees. Normalization lifts the common base of two children into
/// the parent and collapses branches whose children are equal leaves.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// Leaf with a counter value.
    Leaf(Counter),
    /// Branch with a base counter and left/right subtrees.
    Branch(Counter, Box<Self>, Box<Self>),
}

impl Event {
    /// Create a leaf node with the given counter value.
    #[must_use]
    pub const fn leaf(value: Counter) -> Self {
        Self::Leaf(value)
    }

    /// Create a zero leaf (no events recorded).
    #[must_use]
    pub const fn zero() -> Self {
        Self::Leaf(0)
    }

    /// Create a branch, re-establishing normal form at this node.
    ///
    /// The children are assumed to already be normalized. Applies, in
    /// order: the equal-leaf collapse `(n, m, m) → n + m`, then the
    /// common-base lift `(n, l, r) → (n + m, l - m, r - m)` with
    /// `m = min(value(l), value(r))`.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when the collapse or lift exceeds the
    /// counter width.
    pub fn branch(base: Counter, left: Self, right: Self) -> Result<Self> {
        if let (Self::Leaf(a), Self::Leaf(b)) = (&left, &right) {
            if a == b {
                return Ok(Self::Leaf(
                    base.checked_add(*a).ok_or(Error::CounterOverflow)?,
                ));
            }
        }
        let m = left.value().min(right.value());
        if m == 0 {
            return Ok(Self::Branch(base, Box::new(left), Box::new(right)));
        }
        Ok(Self::Branch(
            base.checked_add(m).ok_or(Error::CounterOverflow)?,
            Box::new(left.sink(m)?),
            Box::new(right.sink(m)?),
        ))
    }

    /// Returns `true` if this is a leaf node.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// The counter at this node: the leaf value, or a branch's base.
    #[must_use]
    pub const fn value(&self) -> Counter {
        match self {
            Self::Leaf(n) | Self::Branch(n, _, _) => *n,
        }
    }

    /// The minimum effective height in the subtree, clamped to the
    /// counter width. For a normalized tree this equals [`value`].
    ///
    /// [`value`]: Self::value
    #[must_use]
    pub fn min_value(&self) -> Counter {
        saturate(self.min_wide())
    }

    /// The maximum effective height in the subtree, clamped to the
    /// counter width.
    #[must_use]
    pub fn max_value(&self) -> Counter {
        saturate(self.max_wide())
    }

    pub(crate) fn min_wide(&self) -> Wide {
        match self {
            Self::Leaf(n) => Wide::from(*n),
            Self::Branch(n, l, r) => Wide::from(*n) + l.min_wide().min(r.min_wide()),
        }
    }

    pub(crate) fn max_wide(&self) -> Wide {
        match self {
            Self::Leaf(n) => Wide::from(*n),
            Self::Branch(n, l, r) => Wide::from(*n) + l.max_wide().max(r.max_wide()),
        }
    }

    /// Depth of the tree (0 for leaves).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Branch(_, l, r) => 1 + l.depth().max(r.depth()),
        }
    }

    /// Number of nodes in the tree (leaves + branches).
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Branch(_, l, r) => 1 + l.node_count() + r.node_count(),
        }
    }

    /// Returns `true` if the tree is in normal form: no branch has equal
    /// leaf children, and every branch has at least one child whose own
    /// counter is zero.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        match self {
            Self::Leaf(_) => true,
            Self::Branch(_, l, r) => {
                let collapsible = matches!(
                    (l.as_ref(), r.as_ref()),
                    (Self::Leaf(a), Self::Leaf(b)) if a == b
                );
                !collapsible
                    && l.value().min(r.value()) == 0
                    && l.is_normalized()
                    && r.is_normalized()
            }
        }
    }

    /// Verify the tree's invariants.
    ///
    /// Structure (both children present) is guaranteed by the type.
    /// What remains: every effective height must fit the configured
    /// counter width, so that later arithmetic on the tree is
    /// well-defined. Normal form is not required here; decoded wire
    /// events are accepted denormalized.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptEvent`] when an accumulated counter exceeds the
    /// counter width.
    pub fn validate(&self) -> Result<()> {
        if self.max_wide() > Wide::from(Counter::MAX) {
            return Err(Error::CorruptEvent);
        }
        Ok(())
    }

    /// Normalize the tree to its minimal representation.
    ///
    /// Post-order walk re-establishing normal form at every node.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when a lift exceeds the counter width.
    pub fn normalize(self) -> Result<Self> {
        match self {
            Self::Leaf(_) => Ok(self),
            Self::Branch(n, l, r) => Self::branch(n, l.normalize()?, r.normalize()?),
        }
    }

    /// Add `delta` to this node's counter.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when the counter would exceed its
    /// width.
    pub fn lift(self, delta: Counter) -> Result<Self> {
        Ok(match self {
            Self::Leaf(n) => Self::Leaf(n.checked_add(delta).ok_or(Error::CounterOverflow)?),
            Self::Branch(n, l, r) => {
                Self::Branch(n.checked_add(delta).ok_or(Error::CounterOverflow)?, l, r)
            }
        })
    }

    /// Subtract `delta` from this node's counter.
    ///
    /// # Errors
    ///
    /// [`Error::CounterUnderflow`] when the counter would go below zero.
    pub fn sink(self, delta: Counter) -> Result<Self> {
        Ok(match self {
            Self::Leaf(n) => Self::Leaf(n.checked_sub(delta).ok_or(Error::CounterUnderflow)?),
            Self::Branch(n, l, r) => {
                Self::Branch(n.checked_sub(delta).ok_or(Error::CounterUnderflow)?, l, r)
            }
        })
    }

    /// Reduce the tree to a single leaf carrying its maximum effective
    /// height.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when the maximum effective height does
    /// not fit the counter width (possible only for denormalized trees,
    /// e.g. hostile wire input).
    pub fn maximize(&self) -> Result<Self> {
        Ok(Self::Leaf(narrow(self.max_wide())?))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(n) => write!(f, "{n}"),
            Self::Branch(n, l, r) => write!(f, "({n}, {l:?}, {r:?})"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Stamp
// ---------------------------------------------------------------------------

/// An ITC stamp: a pair of (ID tree, Event tree).
///
/// The stamp is the unit of causality tracking. Each participant holds
/// one; fork, event, and join move it through its lifecycle while
/// keeping both trees normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// The identity partition owned by this stamp.
    pub id: Id,
    /// The causal history recorded by this stamp.
    pub event: Event,
}

impl Stamp {
    /// Pair an ID and an event tree into a stamp.
    ///
    /// The components are taken as-is; the stamp operations only ever
    /// produce normalized components, and callers assembling stamps by
    /// hand can go through [`Stamp::normalize`] (or the `extended-api`
    /// constructors, which canonicalize their inputs).
    #[must_use]
    pub const fn new(id: Id, event: Event) -> Self {
        Self { id, event }
    }

    /// The initial seed stamp: owns the full interval, zero events.
    #[must_use]
    pub const fn seed() -> Self {
        Self {
            id: Id::one(),
            event: Event::zero(),
        }
    }

    /// An anonymous stamp: owns nothing, zero events.
    ///
    /// Anonymous stamps cannot advance the causal history but can carry
    /// it, via join.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            id: Id::zero(),
            event: Event::zero(),
        }
    }

    /// Returns `true` if this stamp owns no interval.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.id.is_zero()
    }

    /// Normalize both components.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] from the event-tree lift.
    pub fn normalize(self) -> Result<Self> {
        Ok(Self {
            id: self.id.normalize(),
            event: self.event.normalize()?,
        })
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id, self.event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
