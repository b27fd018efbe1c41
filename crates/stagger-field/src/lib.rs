//! Field solver capability and per-field state for Stagger simulations.
//!
//! The [`FieldSolver`] trait is the contract every physics field fulfils
//! so the orchestration core can solve, roll back, output and migrate it
//! across mesh changes. [`FieldContext`] provides split-borrow access to
//! the mesh and the [`PointHistoryStore`] during a solve.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod history;
pub mod output;
pub mod solver;
pub mod state;
pub mod transfer;

pub use context::FieldContext;
pub use history::{HistoryTransfer, PointHistory, PointHistoryStore};
pub use output::FieldOutput;
pub use solver::{FieldSolver, SolveStatus};
pub use state::FieldState;
pub use transfer::{CellValues, FieldTransfer};
