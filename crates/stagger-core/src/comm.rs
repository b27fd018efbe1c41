//! Collective operations across ranks.
//!
//! The orchestration core never talks to a message-passing library
//! directly. It issues the handful of reductions it needs through the
//! [`Communicator`] trait and trusts the implementation's collective
//! semantics.
//!
//! # Lockstep contract
//!
//! Every method except [`rank`](Communicator::rank) and
//! [`size`](Communicator::size) is a collective: all ranks must call it,
//! in the same order, with no rank skipping a call on a local branch.
//! Callers therefore invoke reductions unconditionally and branch only
//! on the reduced value.

/// Reductions over all ranks of a domain decomposition.
pub trait Communicator: Send {
    /// Index of this rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks taking part in the computation.
    fn size(&self) -> usize;

    /// Global sum of a per-rank counter. Collective.
    fn sum(&self, local: u64) -> u64;

    /// Global maximum of a per-rank value. Collective.
    ///
    /// NaN inputs propagate: if any rank contributes NaN the result is NaN.
    fn max(&self, local: f64) -> f64;

    /// Global logical OR, implemented as a sum of 0/1 flags. Collective.
    fn any(&self, local: bool) -> bool {
        self.sum(u64::from(local)) > 0
    }

    /// Whether this rank reports run-level information.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Single-rank communicator: every reduction is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum(&self, local: u64) -> u64 {
        local
    }

    fn max(&self, local: f64) -> f64 {
        local
    }
}
