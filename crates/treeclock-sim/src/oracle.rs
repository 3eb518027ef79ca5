//! Algebraic oracles checked continuously during a simulation run.

use treeclock_core::{Stamp, StampOrder};

/// Outcome of the oracle checks over one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReport {
    /// Total individual checks evaluated.
    pub checks_run: u64,
    /// Human-readable descriptions of failed checks (capped).
    pub violations: Vec<String>,
}

impl OracleReport {
    /// `true` when no check failed.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Collects algebraic-law violations as the simulator drives the clock
/// API. A correct implementation produces an empty violation list for
/// every schedule.
#[derive(Debug, Default)]
pub struct Oracle {
    checks_run: u64,
    violations: Vec<String>,
}

/// Cap so a systemic failure does not balloon the report.
const MAX_VIOLATIONS: usize = 32;

impl Oracle {
    /// Fresh oracle with no recorded checks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&mut self, ok: bool, describe: impl FnOnce() -> String) {
        self.checks_run += 1;
        if !ok && self.violations.len() < MAX_VIOLATIONS {
            self.violations.push(describe());
        }
    }

    /// A recorded event must strictly advance an owning stamp's history
    /// and leave an anonymous stamp's history untouched.
    pub fn event_advances(&mut self, before: &Stamp, after: &Stamp) {
        if before.is_anonymous() {
            self.check(before == after, || {
                format!("event on anonymous stamp changed it: {before} -> {after}")
            });
        } else {
            self.check(before.compare(after) == StampOrder::LessThan, || {
                format!("event did not advance stamp: {before} -> {after}")
            });
        }
    }

    /// Join must be commutative and dominate both operands.
    pub fn join_laws(&mut self, a: &Stamp, b: &Stamp, joined: &Stamp) {
        self.check(a.leq(joined), || {
            format!("join does not dominate left operand: {a} vs {joined}")
        });
        self.check(b.leq(joined), || {
            format!("join does not dominate right operand: {b} vs {joined}")
        });
        match b.join(a) {
            Ok(swapped) => self.check(swapped == *joined, || {
                format!("join not commutative: {joined} vs {swapped}")
            }),
            Err(err) => self.check(false, || format!("join({b}, {a}) failed: {err}")),
        }
    }

    /// The two halves of a fork must carry the parent's history and
    /// partition its identity (their sum joins back without overlap).
    pub fn fork_laws(&mut self, parent: &Stamp, left: &Stamp, right: &Stamp) {
        self.check(
            left.event == parent.event && right.event == parent.event,
            || format!("fork altered history: {parent} -> {left} / {right}"),
        );
        match left.join(right) {
            Ok(rejoined) => self.check(rejoined == *parent, || {
                format!("fork/join does not restore parent: {parent} vs {rejoined}")
            }),
            Err(err) => self.check(false, || {
                format!("fork halves overlap: {left} / {right}: {err}")
            }),
        }
    }

    /// A stamp must survive the wire format unchanged.
    pub fn wire_roundtrip(&mut self, stamp: &Stamp) {
        let outcome = stamp
            .to_bytes()
            .and_then(|bytes| Stamp::deserialize(&bytes));
        self.check(outcome.as_ref() == Ok(stamp), || {
            format!("wire roundtrip altered stamp {stamp}: {outcome:?}")
        });
    }

    /// After the run, everything folds into a stamp that owns the whole
    /// interval and dominates every survivor.
    pub fn final_convergence(&mut self, survivors: &[Stamp]) {
        let Some((first, rest)) = survivors.split_first() else {
            return;
        };
        let merged = rest.iter().try_fold(first.clone(), |acc, s| acc.join(s));
        match merged {
            Ok(merged) => {
                self.check(merged.id == treeclock_core::Id::one(), || {
                    format!("survivors do not partition the interval: {merged}")
                });
                for s in survivors {
                    self.check(s.leq(&merged), || {
                        format!("survivor not dominated by merge: {s} vs {merged}")
                    });
                }
            }
            Err(err) => self.check(false, || format!("survivors failed to merge: {err}")),
        }
    }

    /// Finish the run and produce the report.
    #[must_use]
    pub fn into_report(self) -> OracleReport {
        OracleReport {
            checks_run: self.checks_run,
            violations: self.violations,
        }
    }
}
