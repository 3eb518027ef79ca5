//! ITC operations: fork, join, event, peek, compare.
//!
//! Implements the core Interval Tree Clock operations from:
//! Almeida, Baquero & Fonte (2008) "Interval Tree Clocks".
//!
//! ID split/sum and the event-tree algebra (join, leq, fill, grow) are
//! recursive walks over the trees in `tree.rs`; the public [`Stamp`]
//! surface at the bottom of this module composes them.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::counter::narrow;
use crate::error::{Error, Result};
use crate::tree::{Event, Id, Stamp};

/// Extra cost charged when growing has to expand an event leaf into a
/// branch. Large relative to per-level descent cost so that growth that
/// reuses existing structure always wins.
const GROW_EXPAND_COST: u64 = 1_000;

// ===========================================================================
// Id operations (split / sum)
// ===========================================================================

/// Split an ID tree into two disjoint halves whose pointwise sum is the
/// input. Does not mutate the input.
pub(crate) fn split_id(id: &Id) -> (Id, Id) {
    match id {
        Id::Zero => (Id::zero(), Id::zero()),
        Id::One => (
            Id::branch(Id::one(), Id::zero()),
            Id::branch(Id::zero(), Id::one()),
        ),
        Id::Branch(l, r) if l.is_zero() => {
            // Only the right side owns anything — split it.
            let (r1, r2) = split_id(r);
            (Id::branch(Id::zero(), r1), Id::branch(Id::zero(), r2))
        }
        Id::Branch(l, r) if r.is_zero() => {
            let (l1, l2) = split_id(l);
            (Id::branch(l1, Id::zero()), Id::branch(l2, Id::zero()))
        }
        Id::Branch(l, r) => {
            // Both sides own something — hand one side to each half.
            (
                Id::branch((**l).clone(), Id::zero()),
                Id::branch(Id::zero(), (**r).clone()),
            )
        }
    }
}

/// Merge two disjoint ID trees into the union of their intervals.
///
/// Fails with [`Error::CorruptId`] when the operands overlap: both
/// claiming the same part of the interval means the IDs were not
/// produced by fork or have been corrupted.
pub(crate) fn sum_id(a: &Id, b: &Id) -> Result<Id> {
    match (a, b) {
        (Id::Zero, other) | (other, Id::Zero) => Ok(other.clone()),
        (Id::Branch(al, ar), Id::Branch(bl, br)) => {
            Ok(Id::branch(sum_id(al, bl)?, sum_id(ar, br)?))
        }
        // (1, non-zero) in either order: both operands claim the same
        // interval.
        _ => Err(Error::CorruptId),
    }
}

// ===========================================================================
// Event operations (join / leq / fill / grow)
// ===========================================================================

/// Join two event trees: the least upper bound of two causal histories.
pub(crate) fn join_event(a: &Event, b: &Event) -> Result<Event> {
    match (a, b) {
        (Event::Leaf(n1), Event::Leaf(n2)) => Ok(Event::leaf(*n1.max(n2))),
        // Promote the leaf to (n, 0, 0) and retry.
        (Event::Leaf(n), Event::Branch(..)) => {
            let promoted = Event::Branch(*n, Box::new(Event::zero()), Box::new(Event::zero()));
            join_event(&promoted, b)
        }
        (Event::Branch(..), Event::Leaf(n)) => {
            let promoted = Event::Branch(*n, Box::new(Event::zero()), Box::new(Event::zero()));
            join_event(a, &promoted)
        }
        (Event::Branch(n1, l1, r1), Event::Branch(n2, l2, r2)) => {
            if n1 > n2 {
                return join_event(b, a);
            }
            // n1 <= n2: lift b's children by the base difference so both
            // sides are expressed relative to n1.
            let delta = n2 - n1;
            let left = join_event(l1, &(**l2).clone().lift(delta)?)?;
            let right = join_event(r1, &(**r2).clone().lift(delta)?)?;
            Event::branch(*n1, left, right)
        }
    }
}

/// Causal ordering: `true` when every event recorded in `a` is also in
/// `b`. Accumulated bases are carried in a wide integer so comparison
/// never overflows, even on denormalized trees.
pub(crate) fn leq_event(a: &Event, b: &Event) -> bool {
    leq_at(a, 0, b, 0)
}

fn leq_at(a: &Event, base_a: u128, b: &Event, base_b: u128) -> bool {
    match (a, b) {
        (Event::Leaf(n1), _) => base_a + u128::from(*n1) <= base_b + u128::from(b.value()),
        (Event::Branch(n1, l1, r1), Event::Leaf(n2)) => {
            let lifted = base_a + u128::from(*n1);
            lifted <= base_b + u128::from(*n2)
                && leq_at(l1, lifted, b, base_b)
                && leq_at(r1, lifted, b, base_b)
        }
        (Event::Branch(n1, l1, r1), Event::Branch(n2, l2, r2)) => {
            let lifted_a = base_a + u128::from(*n1);
            let lifted_b = base_b + u128::from(*n2);
            lifted_a <= lifted_b
                && leq_at(l1, lifted_a, l2, lifted_b)
                && leq_at(r1, lifted_a, r2, lifted_b)
        }
    }
}

/// Inflate the event tree wherever the ID owns the interval, without
/// growing it. Returns the (normalized) result and whether any
/// inflation occurred.
pub(crate) fn fill(id: &Id, event: &Event) -> Result<(Event, bool)> {
    match (id, event) {
        (Id::Zero, _) => Ok((event.clone(), false)),
        (Id::One, Event::Leaf(_)) => Ok((event.clone(), false)),
        // Full ownership of this subtree: collapse it to its maximum.
        (Id::One, Event::Branch(..)) => Ok((event.maximize()?, true)),
        // The event has no structure here to simplify.
        (Id::Branch(..), Event::Leaf(_)) => Ok((event.clone(), false)),
        (Id::Branch(il, ir), Event::Branch(n, el, er)) => {
            if il.is_one() {
                // The left interval is fully owned: raise the left child
                // to at least the minimum of the (filled) right child, so
                // the owned region dominates everything it has seen.
                let (right, right_changed) = fill(ir, er)?;
                let target = el.max_wide().max(right.min_wide());
                let left = Event::Leaf(narrow(target)?);
                let changed = right_changed || left != **el;
                Ok((Event::branch(*n, left, right)?, changed))
            } else if ir.is_one() {
                let (left, left_changed) = fill(il, el)?;
                let target = er.max_wide().max(left.min_wide());
                let right = Event::Leaf(narrow(target)?);
                let changed = left_changed || right != **er;
                Ok((Event::branch(*n, left, right)?, changed))
            } else {
                let (left, left_changed) = fill(il, el)?;
                let (right, right_changed) = fill(ir, er)?;
                Ok((Event::branch(*n, left, right)?, left_changed || right_changed))
            }
        }
    }
}

/// Extend the event tree with one new event in a region the ID owns.
///
/// Returns `None` when the ID owns nothing (anonymous stamp). The cost
/// tracks how much structure had to be added; growth that expands a leaf
/// into a branch is charged [`GROW_EXPAND_COST`] so cheaper in-place
/// increments are preferred.
pub(crate) fn grow(id: &Id, event: &Event) -> Result<Option<(Event, u64)>> {
    match (id, event) {
        (Id::Zero, _) => Ok(None),
        (Id::One, Event::Leaf(n)) => {
            let bumped = n.checked_add(1).ok_or(Error::CounterOverflow)?;
            Ok(Some((Event::leaf(bumped), 0)))
        }
        // Unreachable through `Stamp::event` (fill always succeeds when
        // the whole subtree is owned), but kept total: grow the cheaper
        // side.
        (Id::One, Event::Branch(n, l, r)) => {
            let grown_l = grow(id, l)?;
            let grown_r = grow(id, r)?;
            Ok(pick_grown(*n, l, r, grown_l, grown_r))
        }
        (Id::Branch(..), Event::Leaf(n)) => {
            // Expand the leaf into (n, 0, 0) and recurse; the expansion
            // itself carries the large cost.
            let expanded = Event::Branch(*n, Box::new(Event::zero()), Box::new(Event::zero()));
            match grow(id, &expanded)? {
                Some((grown, cost)) => Ok(Some((grown, cost + GROW_EXPAND_COST))),
                None => Ok(None),
            }
        }
        (Id::Branch(il, ir), Event::Branch(n, l, r)) => {
            let grown_l = grow(il, l)?;
            let grown_r = grow(ir, r)?;
            Ok(pick_grown(*n, l, r, grown_l, grown_r))
        }
    }
}

/// Rebuild a branch around whichever grown child is cheaper.
fn pick_grown(
    base: crate::counter::Counter,
    l: &Event,
    r: &Event,
    grown_l: Option<(Event, u64)>,
    grown_r: Option<(Event, u64)>,
) -> Option<(Event, u64)> {
    let rebuild = |left: Event, right: Event, cost: u64| {
        (
            Event::Branch(base, Box::new(left), Box::new(right)),
            cost + 1,
        )
    };
    match (grown_l, grown_r) {
        (Some((nl, cl)), Some((_, cr))) if cl <= cr => Some(rebuild(nl, r.clone(), cl)),
        (_, Some((nr, cr))) => Some(rebuild(l.clone(), nr, cr)),
        (Some((nl, cl)), None) => Some(rebuild(nl, r.clone(), cl)),
        (None, None) => None,
    }
}

// ===========================================================================
// Public component surface
// ===========================================================================

impl Id {
    /// Partition this identity into two disjoint halves whose sum is
    /// `self`. The fork operation at the stamp level.
    #[must_use]
    pub fn split(&self) -> (Self, Self) {
        split_id(self)
    }

    /// Union of two disjoint identities.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptId`] when the operands overlap.
    pub fn sum(&self, other: &Self) -> Result<Self> {
        sum_id(self, other)
    }
}

impl Event {
    /// Least upper bound of two causal histories.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when a lifted counter exceeds the
    /// counter width.
    pub fn join(&self, other: &Self) -> Result<Self> {
        join_event(self, other)
    }

    /// Causal precedence: `true` when every event in `self` is also in
    /// `other`.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        leq_event(self, other)
    }

    /// Inflate this history where `id` owns the interval, without
    /// growing the tree. Returns the result and whether any inflation
    /// occurred; a building block of [`Stamp::event`].
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when an inflated counter exceeds the
    /// counter width.
    pub fn fill(&self, id: &Id) -> Result<(Self, bool)> {
        fill(id, self)
    }

    /// Extend this history with one new event in a region `id` owns.
    /// Returns `None` when `id` owns nothing; the cost orders candidate
    /// growth sites (callers must not rely on its exact scale).
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when the new event exceeds the counter
    /// width.
    pub fn grow(&self, id: &Id) -> Result<Option<(Self, u64)>> {
        grow(id, self)
    }
}

// ===========================================================================
// Public Stamp operations
// ===========================================================================

/// Outcome of comparing two stamps' causal histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StampOrder {
    /// Every event in the left stamp is in the right, but not vice versa.
    LessThan,
    /// Every event in the right stamp is in the left, but not vice versa.
    GreaterThan,
    /// The two histories are identical.
    Equal,
    /// Each history contains events the other has not observed.
    Concurrent,
}

impl Stamp {
    /// Fork this stamp into two with disjoint IDs and the same event
    /// history.
    ///
    /// The two halves partition this stamp's interval; summing their IDs
    /// recovers it. Forking an anonymous stamp yields two anonymous
    /// stamps (a split of leaf `0` is `(0, 0)`).
    #[must_use]
    pub fn fork(&self) -> (Self, Self) {
        let (left, right) = split_id(&self.id);
        (
            Self::new(left, self.event.clone()),
            Self::new(right, self.event.clone()),
        )
    }

    /// An anonymous read-only observer of this stamp's history.
    #[must_use]
    pub fn peek(&self) -> Self {
        Self::new(Id::zero(), self.event.clone())
    }

    /// Record a new event, inflating the event tree in a region this
    /// stamp's ID owns.
    ///
    /// Tries `fill` first (simplify without growing); only when fill
    /// makes no progress does the tree grow. On an anonymous stamp the
    /// history is left untouched: there is no owned region to inflate.
    ///
    /// # Errors
    ///
    /// [`Error::CounterOverflow`] when the new event does not fit the
    /// counter width. The stamp is unchanged on error.
    pub fn event(&mut self) -> Result<()> {
        let (filled, inflated) = fill(&self.id, &self.event)?;
        if inflated {
            self.event = filled;
            return Ok(());
        }

        trace!(id = %self.id, "fill made no progress, growing event tree");
        match grow(&self.id, &self.event)? {
            Some((grown, _cost)) => {
                self.event = grown.normalize()?;
                Ok(())
            }
            // Anonymous stamp: nothing owned, nothing to advance.
            None => Ok(()),
        }
    }

    /// Merge two stamps: sum their IDs and join their event histories.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptId`] when the two IDs overlap;
    /// [`Error::CounterOverflow`] from the event join.
    pub fn join(&self, other: &Self) -> Result<Self> {
        let id = sum_id(&self.id, &other.id)?;
        let event = join_event(&self.event, &other.event)?;
        Ok(Self::new(id, event))
    }

    /// Causal dominance: `true` when every event recorded by `self` is
    /// also recorded by `other`.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        leq_event(&self.event, &other.event)
    }

    /// `true` when neither stamp causally dominates the other.
    #[must_use]
    pub fn concurrent(&self, other: &Self) -> bool {
        !self.leq(other) && !other.leq(self)
    }

    /// Compare the causal histories of two stamps.
    #[must_use]
    pub fn compare(&self, other: &Self) -> StampOrder {
        match (self.leq(other), other.leq(self)) {
            (true, true) => StampOrder::Equal,
            (true, false) => StampOrder::LessThan,
            (false, true) => StampOrder::GreaterThan,
            (false, false) => StampOrder::Concurrent,
        }
    }
}

// ===========================================================================
// Extended construction / mutation API
// ===========================================================================

#[cfg(feature = "extended-api")]
impl Stamp {
    /// Build a stamp around a caller-supplied ID with a fresh history.
    ///
    /// The ID is canonicalized before use.
    #[must_use]
    pub fn from_id(id: Id) -> Self {
        Self::new(id.normalize(), Event::zero())
    }

    /// Build a stamp from caller-supplied components.
    ///
    /// Both components are validated and canonicalized.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptEvent`] or [`Error::CounterOverflow`] when the
    /// event tree is unusable at this counter width.
    pub fn from_parts(id: Id, event: Event) -> Result<Self> {
        event.validate()?;
        Ok(Self::new(id.normalize(), event.normalize()?))
    }

    /// Build an anonymous observer of a caller-supplied history.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptEvent`] or [`Error::CounterOverflow`] when the
    /// event tree is unusable at this counter width.
    pub fn peek_of(event: Event) -> Result<Self> {
        event.validate()?;
        Ok(Self::new(Id::zero(), event.normalize()?))
    }

    /// Replace this stamp's ID, canonicalizing the supplied tree.
    pub fn set_id(&mut self, id: Id) {
        self.id = id.normalize();
    }

    /// Replace this stamp's event history, validating and canonicalizing
    /// the supplied tree.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptEvent`] or [`Error::CounterOverflow`] when the
    /// event tree is unusable at this counter width. The stamp is
    /// unchanged on error.
    pub fn set_event(&mut self, event: Event) -> Result<()> {
        event.validate()?;
        self.event = event.normalize()?;
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Counter;
    use proptest::prelude::*;

    fn br(n: Counter, l: Event, r: Event) -> Event {
        Event::Branch(n, Box::new(l), Box::new(r))
    }

    // === split ==============================================================

    #[test]
    fn split_zero() {
        assert_eq!(split_id(&Id::zero()), (Id::zero(), Id::zero()));
    }

    #[test]
    fn split_seed() {
        assert_eq!(
            split_id(&Id::one()),
            (
                Id::branch(Id::one(), Id::zero()),
                Id::branch(Id::zero(), Id::one()),
            )
        );
    }

    #[test]
    fn split_left_half() {
        // split((1, 0)) = (((1, 0), 0), ((0, 1), 0))
        let id = Id::branch(Id::one(), Id::zero());
        let (a, b) = split_id(&id);
        assert_eq!(a, Id::branch(Id::branch(Id::one(), Id::zero()), Id::zero()));
        assert_eq!(b, Id::branch(Id::branch(Id::zero(), Id::one()), Id::zero()));
    }

    #[test]
    fn split_right_half() {
        let id = Id::branch(Id::zero(), Id::one());
        let (a, b) = split_id(&id);
        assert_eq!(a, Id::branch(Id::zero(), Id::branch(Id::one(), Id::zero())));
        assert_eq!(b, Id::branch(Id::zero(), Id::branch(Id::zero(), Id::one())));
    }

    #[test]
    fn split_both_sides_owned() {
        // split((l, r)) with both non-zero hands one side to each half
        let id = Id::branch(Id::branch(Id::one(), Id::zero()), Id::one());
        let (a, b) = split_id(&id);
        assert_eq!(
            a,
            Id::branch(Id::branch(Id::one(), Id::zero()), Id::zero())
        );
        assert_eq!(b, Id::branch(Id::zero(), Id::one()));
    }

    #[test]
    fn split_does_not_mutate_input() {
        let id = Id::branch(Id::one(), Id::zero());
        let copy = id.clone();
        let _ = split_id(&id);
        assert_eq!(id, copy);
    }

    // === sum ================================================================

    #[test]
    fn sum_complementary_halves_recovers_seed() {
        let a = Id::branch(Id::one(), Id::zero());
        let b = Id::branch(Id::zero(), Id::one());
        assert_eq!(sum_id(&a, &b), Ok(Id::one()));
    }

    #[test]
    fn sum_with_zero_is_identity() {
        let a = Id::branch(Id::one(), Id::zero());
        assert_eq!(sum_id(&a, &Id::zero()), Ok(a.clone()));
        assert_eq!(sum_id(&Id::zero(), &a), Ok(a));
    }

    #[test]
    fn sum_overlap_is_corrupt() {
        assert_eq!(sum_id(&Id::one(), &Id::one()), Err(Error::CorruptId));
        let half = Id::branch(Id::one(), Id::zero());
        assert_eq!(sum_id(&Id::one(), &half), Err(Error::CorruptId));
        assert_eq!(sum_id(&half, &half), Err(Error::CorruptId));
    }

    #[test]
    fn sum_of_split_restores_input() {
        let ids = [
            Id::one(),
            Id::branch(Id::one(), Id::zero()),
            Id::branch(Id::branch(Id::zero(), Id::one()), Id::one()),
        ];
        for id in ids {
            let (a, b) = split_id(&id);
            assert_eq!(sum_id(&a, &b), Ok(id.clone()), "split/sum of {id}");
        }
    }

    // === join ===============================================================

    #[test]
    fn join_leaves_takes_max() {
        assert_eq!(
            join_event(&Event::leaf(3), &Event::leaf(5)),
            Ok(Event::Leaf(5))
        );
    }

    #[test]
    fn join_concurrent_halves_collapses() {
        // (0, 1, 0) ⊔ (0, 0, 1) = 1
        let el = br(0, Event::leaf(1), Event::leaf(0));
        let er = br(0, Event::leaf(0), Event::leaf(1));
        assert_eq!(join_event(&el, &er), Ok(Event::Leaf(1)));
    }

    #[test]
    fn join_is_commutative() {
        let a = br(1, Event::leaf(0), br(2, Event::leaf(1), Event::leaf(0)));
        let b = br(0, Event::leaf(4), Event::leaf(2));
        assert_eq!(join_event(&a, &b), join_event(&b, &a));
    }

    #[test]
    fn join_is_idempotent() {
        let a = br(1, Event::leaf(0), br(2, Event::leaf(1), Event::leaf(0)));
        assert_eq!(join_event(&a, &a), Ok(a.clone().normalize().expect("norm")));
    }

    #[test]
    fn join_dominates_both_inputs() {
        let a = br(1, Event::leaf(0), Event::leaf(3));
        let b = br(2, Event::leaf(1), Event::leaf(0));
        let joined = join_event(&a, &b).expect("join");
        assert!(leq_event(&a, &joined));
        assert!(leq_event(&b, &joined));
    }

    #[test]
    fn join_leaf_with_branch() {
        let a = Event::leaf(4);
        let b = br(1, Event::leaf(0), Event::leaf(5));
        let joined = join_event(&a, &b).expect("join");
        assert!(leq_event(&a, &joined));
        assert!(leq_event(&b, &joined));
        // max(4, 1+5) on the right, max(4, 1+0) on the left
        assert_eq!(joined, br(4, Event::leaf(0), Event::leaf(2)));
    }

    #[test]
    fn join_overflow_reported() {
        // Effective height MAX + 1 only representable in a denormalized
        // tree; the join's lift detects it.
        let a = br(Counter::MAX, Event::leaf(0), Event::leaf(1));
        assert_eq!(join_event(&a, &Event::leaf(0)), Err(Error::CounterOverflow));
    }

    // === leq ================================================================

    #[test]
    fn leq_reflexive() {
        let e = br(1, Event::leaf(0), br(0, Event::leaf(2), Event::leaf(0)));
        assert!(leq_event(&e, &e));
    }

    #[test]
    fn leq_leaf_vs_branch_uses_base() {
        // 1 <= (1, 0, 2) since the base is 1
        assert!(leq_event(
            &Event::leaf(1),
            &br(1, Event::leaf(0), Event::leaf(2))
        ));
        // 2 is not <= (1, 0, 2): the left position has height 1
        assert!(!leq_event(
            &Event::leaf(2),
            &br(1, Event::leaf(0), Event::leaf(2))
        ));
    }

    #[test]
    fn leq_branch_vs_leaf_needs_max_below() {
        let e = br(1, Event::leaf(0), Event::leaf(2));
        assert!(leq_event(&e, &Event::leaf(3)));
        assert!(!leq_event(&e, &Event::leaf(2)));
    }

    #[test]
    fn leq_asymmetric_on_concurrent() {
        let a = br(0, Event::leaf(1), Event::leaf(0));
        let b = br(0, Event::leaf(0), Event::leaf(1));
        assert!(!leq_event(&a, &b));
        assert!(!leq_event(&b, &a));
    }

    // === fill ===============================================================

    #[test]
    fn fill_zero_id_is_noop() {
        let e = br(1, Event::leaf(0), Event::leaf(2));
        assert_eq!(fill(&Id::zero(), &e), Ok((e, false)));
    }

    #[test]
    fn fill_one_id_maximizes() {
        let e = br(1, Event::leaf(0), Event::leaf(2));
        assert_eq!(fill(&Id::one(), &e), Ok((Event::Leaf(3), true)));
    }

    #[test]
    fn fill_one_id_leaf_event_unchanged() {
        assert_eq!(fill(&Id::one(), &Event::leaf(7)), Ok((Event::Leaf(7), false)));
    }

    #[test]
    fn fill_branch_id_leaf_event_unchanged() {
        let id = Id::branch(Id::one(), Id::zero());
        assert_eq!(fill(&id, &Event::leaf(7)), Ok((Event::Leaf(7), false)));
    }

    #[test]
    fn fill_owned_left_absorbs_right_minimum() {
        // id (1, 0), event (0, 1, (2, 0, 1)): the owned left rises to
        // the right's minimum, 2, and the common base lifts.
        let id = Id::branch(Id::one(), Id::zero());
        let e = br(0, Event::leaf(1), br(2, Event::leaf(0), Event::leaf(1)));
        let (filled, changed) = fill(&id, &e).expect("fill");
        assert!(changed);
        assert_eq!(
            filled,
            br(2, Event::leaf(0), br(0, Event::leaf(0), Event::leaf(1)))
        );
        assert!(leq_event(&e, &filled));
    }

    #[test]
    fn fill_no_progress_reports_false() {
        // id (1, 0), event (0, 2, 0): left already dominates the right.
        let id = Id::branch(Id::one(), Id::zero());
        let e = br(0, Event::leaf(2), Event::leaf(0));
        assert_eq!(fill(&id, &e), Ok((e, false)));
    }

    #[test]
    fn fill_owned_right_rises_to_left_minimum() {
        // id (0, 1) over event (0, (1, 0, 1), 0): the owned right rises
        // to the unowned left's minimum, 1.
        let id = Id::branch(Id::zero(), Id::one());
        let e = br(0, br(1, Event::leaf(0), Event::leaf(1)), Event::leaf(0));
        let (filled, changed) = fill(&id, &e).expect("fill");
        assert!(changed);
        assert_eq!(
            filled,
            br(1, br(0, Event::leaf(0), Event::leaf(1)), Event::leaf(0))
        );
        assert!(leq_event(&e, &filled));
    }

    // === grow ===============================================================

    #[test]
    fn grow_seed_increments_leaf() {
        assert_eq!(
            grow(&Id::one(), &Event::leaf(4)),
            Ok(Some((Event::Leaf(5), 0)))
        );
    }

    #[test]
    fn grow_anonymous_cannot() {
        assert_eq!(grow(&Id::zero(), &Event::leaf(4)), Ok(None));
    }

    #[test]
    fn grow_expands_leaf_under_partial_id() {
        let id = Id::branch(Id::one(), Id::zero());
        let (grown, cost) = grow(&id, &Event::leaf(2))
            .expect("grow")
            .expect("growable");
        assert_eq!(grown, br(2, Event::leaf(1), Event::leaf(0)));
        assert!(cost >= GROW_EXPAND_COST);
    }

    #[test]
    fn grow_prefers_existing_structure() {
        // id ((1, 0), (0, 1)) over event (0, 0, (0, 1, 0)): growing the
        // left requires expansion; the right has structure to reuse.
        let id = Id::branch(
            Id::branch(Id::one(), Id::zero()),
            Id::branch(Id::zero(), Id::one()),
        );
        let e = br(0, Event::leaf(0), br(0, Event::leaf(1), Event::leaf(0)));
        let (grown, _cost) = grow(&id, &e).expect("grow").expect("growable");
        assert_eq!(
            grown,
            br(
                0,
                Event::leaf(0),
                br(0, Event::leaf(1), Event::leaf(1)),
            )
        );
    }

    #[test]
    fn grow_counter_overflow_reported() {
        assert_eq!(
            grow(&Id::one(), &Event::leaf(Counter::MAX)),
            Err(Error::CounterOverflow)
        );
    }

    // === fork ===============================================================

    #[test]
    fn fork_seed_produces_two_halves() {
        let seed = Stamp::seed();
        let (left, right) = seed.fork();
        assert_eq!(left.id, Id::branch(Id::one(), Id::zero()));
        assert_eq!(right.id, Id::branch(Id::zero(), Id::one()));
        assert_eq!(left.event, Event::zero());
        assert_eq!(right.event, Event::zero());
    }

    #[test]
    fn fork_preserves_interval_coverage() {
        let (left, right) = Stamp::seed().fork();
        assert_eq!(sum_id(&left.id, &right.id), Ok(Id::one()));
    }

    #[test]
    fn fork_preserves_event_history() {
        let mut s = Stamp::seed();
        s.event().expect("event");
        s.event().expect("event");
        let (left, right) = s.fork();
        assert_eq!(left.event, s.event);
        assert_eq!(right.event, s.event);
    }

    #[test]
    fn fork_anonymous_yields_anonymous_halves() {
        let anon = Stamp::anonymous();
        let (a, b) = anon.fork();
        assert!(a.is_anonymous());
        assert!(b.is_anonymous());
    }

    // === event ==============================================================

    #[test]
    fn event_monotonically_increases() {
        let mut s = Stamp::seed();
        let before = s.clone();
        s.event().expect("event");
        assert!(before.leq(&s));
        assert!(!s.leq(&before));
    }

    #[test]
    fn event_seed_counts_up() {
        let mut s = Stamp::seed();
        for i in 1..=10 {
            s.event().expect("event");
            assert_eq!(s.event, Event::Leaf(i));
        }
    }

    #[test]
    fn event_on_forked_stamp_grows() {
        let (mut a, _b) = Stamp::seed().fork();
        a.event().expect("event");
        assert_eq!(a.event, br(0, Event::leaf(1), Event::leaf(0)));
    }

    #[test]
    fn event_fill_after_join_collapses() {
        // Left records, joins right's peek, then fills up to a leaf.
        let (mut a, mut b) = Stamp::seed().fork();
        a.event().expect("event");
        b.event().expect("event");
        let merged = a.join(&b).expect("join");
        assert_eq!(merged.id, Id::one());
        let mut merged = merged;
        merged.event().expect("event");
        assert_eq!(merged.event, Event::Leaf(2));
    }

    #[test]
    fn event_on_anonymous_is_noop() {
        let mut peek = Stamp::seed().peek();
        let before = peek.clone();
        peek.event().expect("event");
        assert_eq!(peek, before);
    }

    #[test]
    fn event_overflow_leaves_stamp_unchanged() {
        let mut s = Stamp::new(Id::one(), Event::leaf(Counter::MAX));
        let before = s.clone();
        assert_eq!(s.event(), Err(Error::CounterOverflow));
        assert_eq!(s, before);
    }

    // === join (stamps) ======================================================

    #[test]
    fn join_recovers_seed_from_fork() {
        let (left, right) = Stamp::seed().fork();
        let joined = left.join(&right).expect("join");
        assert_eq!(joined.id, Id::one());
        assert_eq!(joined.event, Event::zero());
    }

    #[test]
    fn join_merges_divergent_histories() {
        let (mut a, mut b) = Stamp::seed().fork();
        a.event().expect("event");
        b.event().expect("event");
        b.event().expect("event");
        let joined = a.join(&b).expect("join");
        assert!(a.leq(&joined));
        assert!(b.leq(&joined));
    }

    #[test]
    fn join_overlapping_ids_rejected() {
        let s = Stamp::seed();
        assert_eq!(s.join(&s), Err(Error::CorruptId));
    }

    #[test]
    fn join_with_peek_keeps_id() {
        let (mut a, b) = Stamp::seed().fork();
        a.event().expect("event");
        let merged = b.join(&a.peek()).expect("join");
        assert_eq!(merged.id, b.id);
        assert!(a.leq(&merged));
    }

    // === peek ===============================================================

    #[test]
    fn peek_is_anonymous_with_same_history() {
        let mut s = Stamp::seed();
        s.event().expect("event");
        let p = s.peek();
        assert!(p.is_anonymous());
        assert_eq!(p.event, s.event);
        assert_eq!(p.compare(&s), StampOrder::Equal);
    }

    // === compare ============================================================

    #[test]
    fn compare_equal() {
        let s = Stamp::seed();
        assert_eq!(s.compare(&s), StampOrder::Equal);
    }

    #[test]
    fn compare_after_event_is_less_than() {
        let mut s = Stamp::seed();
        let before = s.clone();
        s.event().expect("event");
        assert_eq!(before.compare(&s), StampOrder::LessThan);
        assert_eq!(s.compare(&before), StampOrder::GreaterThan);
    }

    #[test]
    fn compare_concurrent_after_divergence() {
        let (mut a, mut b) = Stamp::seed().fork();
        a.event().expect("event");
        b.event().expect("event");
        assert_eq!(a.compare(&b), StampOrder::Concurrent);
        assert_eq!(b.compare(&a), StampOrder::Concurrent);
    }

    #[test]
    fn seed_fork_work_join_scenario() {
        // seed s0; fork; left events twice, right once; join.
        let s0 = Stamp::seed();
        let (mut sl, mut sr) = s0.fork();
        sl.event().expect("event");
        sl.event().expect("event");
        sr.event().expect("event");

        assert_eq!(sl.compare(&sr), StampOrder::Concurrent);

        let s1 = sl.join(&sr).expect("join");
        assert_eq!(s0.compare(&s1), StampOrder::LessThan);
        assert_eq!(s1.id, Id::one());
    }

    #[test]
    fn chain_forked_writers_stay_unordered() {
        // Fork a chain: each new member splits off the previous
        // remainder, leaving a skewed partition rather than a balanced
        // tree.
        let mut rest = Stamp::seed();
        let mut members = Vec::new();
        for _ in 0..4 {
            let (member, next) = rest.fork();
            members.push(member);
            rest = next;
        }
        members.push(rest);

        for (pos, member) in members.iter_mut().enumerate() {
            for _ in 0..(2 * pos + 1) {
                member.event().expect("event");
            }
        }

        for (i, x) in members.iter().enumerate() {
            for y in &members[i + 1..] {
                assert!(x.concurrent(y), "disjoint writers must stay unordered");
            }
        }

        let folded = members
            .iter()
            .skip(1)
            .try_fold(members[0].clone(), |acc, m| acc.join(m))
            .expect("fold");
        assert_eq!(folded.id, Id::one());
        for m in &members {
            assert!(m.leq(&folded), "fold must dominate every writer");
        }
    }

    #[test]
    fn ring_gossip_carries_every_write_around_one_lap() {
        // Six writers pass observations around a ring: each records an
        // event, then hands a peek to its successor, who joins it in.
        let mut rest = Stamp::seed();
        let mut ring = Vec::new();
        for _ in 0..5 {
            let (member, next) = rest.fork();
            ring.push(member);
            rest = next;
        }
        ring.push(rest);

        let mut observed = Vec::new();
        for i in 0..ring.len() {
            ring[i].event().expect("event");
            observed.push(ring[i].clone());
            let handoff = ring[i].peek();
            let next = (i + 1) % ring.len();
            ring[next] = ring[next].join(&handoff).expect("join");
        }

        // The lap ends back at the first member, which by now has heard
        // about every write.
        for snapshot in &observed {
            assert!(snapshot.leq(&ring[0]), "lap dropped a write");
        }
        // Mid-ring members only ever hear from their predecessors, so
        // the ordering along the ring is strict.
        assert_eq!(ring[2].compare(&ring[4]), StampOrder::LessThan);
        assert_eq!(ring[4].compare(&ring[2]), StampOrder::GreaterThan);
    }

    #[test]
    fn retiring_members_one_by_one_restores_the_seed_interval() {
        // Grow to a dozen members by always splitting whoever owns the
        // widest share, then retire them in reverse order.
        let mut members = vec![Stamp::seed()];
        while members.len() < 12 {
            let widest = members
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| m.id.depth())
                .map(|(i, _)| i)
                .expect("non-empty population");
            let (a, b) = members.swap_remove(widest).fork();
            members.push(a);
            members.push(b);
        }

        for (pos, member) in members.iter_mut().enumerate() {
            for _ in 0..(pos / 3 + 1) {
                member.event().expect("event");
            }
        }

        let mut survivor = members.remove(0);
        while let Some(leaving) = members.pop() {
            let next = survivor.join(&leaving).expect("join");
            assert!(survivor.leq(&next), "retirement lost the survivor's history");
            assert!(leaving.leq(&next), "retirement lost the leaver's history");
            survivor = next;
        }

        assert_eq!(survivor.id, Id::one());
        // With the whole interval back in one hand, the next event
        // flattens the history to a single counter.
        survivor.event().expect("event");
        assert!(survivor.event.is_leaf());
    }

    // === extended API =======================================================

    #[cfg(feature = "extended-api")]
    #[test]
    fn extended_constructors_canonicalize() {
        let raw_id = Id::Branch(Box::new(Id::One), Box::new(Id::One));
        let s = Stamp::from_id(raw_id);
        assert_eq!(s.id, Id::One);
        assert_eq!(s.event, Event::zero());

        let raw_event = br(0, Event::leaf(2), Event::leaf(2));
        let s = Stamp::from_parts(Id::one(), raw_event.clone()).expect("from_parts");
        assert_eq!(s.event, Event::Leaf(2));

        let p = Stamp::peek_of(raw_event).expect("peek_of");
        assert!(p.is_anonymous());
        assert_eq!(p.event, Event::Leaf(2));
    }

    #[cfg(feature = "extended-api")]
    #[test]
    fn extended_setters_validate() {
        let mut s = Stamp::seed();
        s.set_id(Id::Branch(Box::new(Id::Zero), Box::new(Id::Zero)));
        assert!(s.is_anonymous());

        let bad = br(Counter::MAX, Event::leaf(0), Event::leaf(1));
        assert_eq!(s.set_event(bad), Err(Error::CorruptEvent));
        assert_eq!(s.event, Event::zero());

        s.set_event(br(0, Event::leaf(1), Event::leaf(1)))
            .expect("set_event");
        assert_eq!(s.event, Event::Leaf(1));
    }

    // === Property tests =====================================================

    fn arb_id() -> impl Strategy<Value = Id> {
        let leaf = prop_oneof![Just(Id::zero()), Just(Id::one())];
        leaf.prop_recursive(4, 64, 2, |inner| {
            (inner.clone(), inner).prop_map(|(l, r)| Id::branch(l, r))
        })
    }

    fn arb_event() -> impl Strategy<Value = Event> {
        let leaf = (0 as Counter..=25).prop_map(Event::leaf);
        leaf.prop_recursive(4, 128, 2, |inner| {
            (0 as Counter..=10, inner.clone(), inner)
                .prop_map(|(n, l, r)| Event::branch(n, l, r).expect("in-range"))
        })
    }

    proptest! {
        #[test]
        fn prop_id_normalize_idempotent(id in arb_id()) {
            let once = id.clone().normalize();
            prop_assert_eq!(once.clone().normalize(), once);
        }

        #[test]
        fn prop_split_sum_roundtrip(id in arb_id()) {
            let (a, b) = split_id(&id);
            prop_assert_eq!(sum_id(&a, &b), Ok(id.normalize()));
        }

        #[test]
        fn prop_split_halves_disjoint(id in arb_id()) {
            // Disjointness means sum never reports overlap.
            let (a, b) = split_id(&id);
            prop_assert!(sum_id(&a, &b).is_ok());
        }

        #[test]
        fn prop_leq_reflexive(e in arb_event()) {
            prop_assert!(leq_event(&e, &e));
        }

        #[test]
        fn prop_leq_transitive(a in arb_event(), b in arb_event(), c in arb_event()) {
            let ab = join_event(&a, &b).expect("join");
            let abc = join_event(&ab, &c).expect("join");
            prop_assert!(leq_event(&a, &ab));
            prop_assert!(leq_event(&ab, &abc));
            prop_assert!(leq_event(&a, &abc));
        }

        #[test]
        fn prop_join_commutative(a in arb_event(), b in arb_event()) {
            prop_assert_eq!(join_event(&a, &b), join_event(&b, &a));
        }

        #[test]
        fn prop_join_associative(a in arb_event(), b in arb_event(), c in arb_event()) {
            let left = join_event(&join_event(&a, &b).expect("join"), &c);
            let right = join_event(&a, &join_event(&b, &c).expect("join"));
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_join_upper_bound(a in arb_event(), b in arb_event()) {
            let joined = join_event(&a, &b).expect("join");
            prop_assert!(leq_event(&a, &joined));
            prop_assert!(leq_event(&b, &joined));
        }

        #[test]
        fn prop_join_idempotent(e in arb_event()) {
            let joined = join_event(&e, &e).expect("join");
            prop_assert_eq!(joined, e.normalize().expect("normalize"));
        }

        #[test]
        fn prop_event_strictly_advances(n_forks in 0usize..4, n_events in 1usize..8) {
            let mut s = Stamp::seed();
            for _ in 0..n_forks {
                s = s.fork().0;
            }
            for _ in 0..n_events {
                let before = s.clone();
                s.event().expect("event");
                prop_assert_eq!(before.compare(&s), StampOrder::LessThan);
            }
        }

        #[test]
        fn prop_fork_join_identity(n_events in 0usize..8) {
            let mut s = Stamp::seed();
            for _ in 0..n_events {
                s.event().expect("event");
            }
            let (a, b) = s.fork();
            let joined = a.join(&b).expect("join");
            prop_assert_eq!(joined, s);
        }

        #[test]
        fn prop_fill_dominates_input(id in arb_id(), e in arb_event()) {
            let e = e.normalize().expect("normalize");
            let (filled, _changed) = fill(&id, &e).expect("fill");
            prop_assert!(leq_event(&e, &filled));
            prop_assert!(filled.is_normalized());
        }

        #[test]
        fn prop_grow_strictly_advances(e in arb_event()) {
            let e = e.normalize().expect("normalize");
            let grown = grow(&Id::one(), &e).expect("grow");
            if let Some((grown, _cost)) = grown {
                let grown = grown.normalize().expect("normalize");
                prop_assert!(leq_event(&e, &grown));
                prop_assert!(!leq_event(&grown, &e));
            }
        }
    }
}
