//! Test utilities and mock collaborators for Stagger development.
//!
//! Provides a [`StubComm`] that plays the other ranks of a distributed
//! run and logs every collective call, a [`ScriptedSolver`] whose
//! outcomes are scripted per update, and grid fixtures.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stagger_core::Communicator;

pub use fixtures::{
    line, new_log, unit_square, Call, EventClock, EventLog, Outcome, ScriptedSolver,
    SolverEvent, TempDir,
};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One collective call observed by a [`StubComm`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collective {
    Sum { local: u64, result: u64 },
    Max { local: f64, result: f64 },
}

/// Communicator standing in for `size` ranks seen from `rank`.
///
/// Peers contribute scripted values: each `sum` call pops the next peer
/// contribution (0 once the script is exhausted), each `max` call
/// compares against a fixed peer maximum. A sum override replaces the
/// reduced result outright, which lets tests simulate a collective that
/// disagrees with the local contribution. Clones share the script and
/// the call log.
#[derive(Clone, Debug)]
pub struct StubComm {
    rank: usize,
    size: usize,
    peer_sums: Arc<Mutex<VecDeque<u64>>>,
    sum_override: Option<u64>,
    peer_max: f64,
    calls: Arc<Mutex<Vec<Collective>>>,
}

impl StubComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            peer_sums: Arc::new(Mutex::new(VecDeque::new())),
            sum_override: None,
            peer_max: f64::NEG_INFINITY,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Single rank, identity reductions, with a call log.
    pub fn serial() -> Self {
        Self::new(0, 1)
    }

    /// Peer contributions for successive `sum` calls.
    pub fn with_peer_sums(self, sums: impl IntoIterator<Item = u64>) -> Self {
        lock(&self.peer_sums).extend(sums);
        self
    }

    /// Every `sum` returns `result` regardless of contributions.
    pub fn with_sum_override(mut self, result: u64) -> Self {
        self.sum_override = Some(result);
        self
    }

    /// Largest value any peer contributes to `max`.
    pub fn with_peer_max(mut self, peer_max: f64) -> Self {
        self.peer_max = peer_max;
        self
    }

    /// Collective calls so far, in order.
    pub fn calls(&self) -> Vec<Collective> {
        lock(&self.calls).clone()
    }

    /// Number of `sum` calls so far.
    pub fn n_sums(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, Collective::Sum { .. }))
            .count()
    }
}

impl Communicator for StubComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum(&self, local: u64) -> u64 {
        let peers = lock(&self.peer_sums).pop_front().unwrap_or(0);
        let result = self.sum_override.unwrap_or(local + peers);
        lock(&self.calls).push(Collective::Sum { local, result });
        result
    }

    fn max(&self, local: f64) -> f64 {
        let result = if local.is_nan() || local > self.peer_max {
            local
        } else {
            self.peer_max
        };
        lock(&self.calls).push(Collective::Max { local, result });
        result
    }
}
