//! Simulation engine orchestrating staggered multiphysics runs.
//!
//! Provides the [`SimulationController`] that drives the timestep loop,
//! coordinating the [`StaggeredSolver`], the step-size retry policy of
//! the [`TimestepAdapter`], adaptive refinement through the
//! [`MeshRefiner`], and state migration across mesh changes through the
//! [`RefinementTransaction`] typestate.
//!
//! Every cross-rank decision (divergence, residual reduction, refinement
//! vote) is taken from a collective reduction, so all ranks follow the
//! same control flow.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod clock;
pub mod config;
pub mod controller;
pub mod metrics;
pub mod output;
pub mod refiner;
pub mod staggered;
pub mod transaction;

pub use adapter::TimestepAdapter;
pub use clock::SimulationState;
pub use config::{ConfigError, Parameters, SimulationConfig};
pub use controller::{Phase, RunError, RunReport, SimulationController};
pub use metrics::{RunMetrics, StepRecord};
pub use output::{
    ColumnFormat, MemorySink, OutputError, OutputSink, RecordedStep, StatisticsFileSink,
    StatisticsTable, StepOutput, TableValue,
};
pub use refiner::{refine_threshold, MeshRefiner};
pub use staggered::StaggeredSolver;
pub use transaction::{RefinementTransaction, StateTransferManager};
