//! Error types for field solves and state transfer.
//!
//! Mesh errors live in `stagger-mesh` and configuration errors in
//! `stagger-engine`; this module only carries the kinds every crate
//! needs to name.

use std::error::Error;
use std::fmt;

use crate::id::{CellId, FieldKind};

/// Errors from a field solver's setup or nonlinear solve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveError {
    /// The inner nonlinear (or linear) solve of a field did not converge.
    ///
    /// Recoverable: the attempt loop rolls the step back, shrinks it and
    /// retries. Raised only after every rank agreed that some rank diverged.
    NonConvergence {
        /// Field whose solve diverged.
        field: FieldKind,
        /// Human-readable description reported by the diverging rank(s).
        reason: String,
    },
    /// A field could not (re)build its degree-of-freedom layout.
    Setup {
        /// Field whose setup failed.
        field: FieldKind,
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl SolveError {
    /// Whether the attempt loop may recover from this error by shrinking the step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonConvergence { field, reason } => {
                write!(f, "{field} solve did not converge: {reason}")
            }
            Self::Setup { field, reason } => write!(f, "{field} setup failed: {reason}"),
        }
    }
}

impl Error for SolveError {}

/// Errors from moving solution or history data across a mesh change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferError {
    /// A field received a transfer handle it did not produce.
    PayloadMismatch {
        /// Field that rejected the handle.
        field: FieldKind,
    },
    /// A new cell has neither prepared data of its own nor a parent with data.
    MissingSource {
        /// The cell that could not be populated.
        cell: CellId,
    },
    /// Storage size after a transfer does not match the new mesh.
    CountMismatch {
        /// Size required by the new mesh.
        expected: usize,
        /// Size actually produced.
        actual: usize,
    },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadMismatch { field } => {
                write!(f, "transfer handle does not belong to the {field} field")
            }
            Self::MissingSource { cell } => {
                write!(f, "no prepared data for cell {cell} or its parent")
            }
            Self::CountMismatch { expected, actual } => {
                write!(f, "transferred {actual} entries, new mesh needs {expected}")
            }
        }
    }
}

impl Error for TransferError {}
