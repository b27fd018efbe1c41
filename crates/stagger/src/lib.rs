//! Stagger: orchestration core for staggered phase-field fracture simulations.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Stagger sub-crates. For most users, adding `stagger` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use stagger::prelude::*;
//!
//! // A mechanical field whose solution tracks the simulation time.
//! struct Clockwork {
//!     state: FieldState,
//! }
//!
//! impl FieldSolver for Clockwork {
//!     fn kind(&self) -> FieldKind { FieldKind::Mechanical }
//!     fn state(&self) -> &FieldState { &self.state }
//!     fn state_mut(&mut self) -> &mut FieldState { &mut self.state }
//!     fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError> {
//!         self.state.reinit(ctx.mesh().n_locally_owned_cells());
//!         Ok(())
//!     }
//!     fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus {
//!         let t = ctx.time();
//!         self.state.solution_mut().fill(t);
//!         SolveStatus::converged(1e-3)
//!     }
//!     fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer {
//!         let mut values = self.state.solution().iter().copied();
//!         let captured = CellValues::capture(mesh, |_| values.next().unwrap_or(0.0));
//!         FieldTransfer::new(self.kind(), captured)
//!     }
//!     fn post_refine(
//!         &mut self,
//!         transfer: FieldTransfer,
//!         ctx: &mut FieldContext<'_>,
//!     ) -> Result<(), TransferError> {
//!         let captured: CellValues<f64> = transfer.into_payload(self.kind())?;
//!         self.state.replace(captured.relocate(ctx.mesh())?);
//!         Ok(())
//!     }
//!     fn output_results(&self, out: &mut FieldOutput) {
//!         out.add_data_vector("u", self.state.solution().to_vec());
//!     }
//! }
//!
//! // Three steps on an 8×8 unit square, no phase field.
//! let params = Parameters {
//!     dim: 2,
//!     timestep: 0.1,
//!     max_no_timesteps: 3,
//!     enable_phase_field: false,
//!     ..Parameters::default()
//! };
//! let mechanical = Box::new(Clockwork { state: FieldState::default() });
//! let grid = CellGrid::hyper_rectangle(2, &[8, 8], &[1.0, 1.0]).unwrap();
//! let config = SimulationConfig::new(params, mechanical)
//!     .with_sink(Box::new(MemorySink::new()));
//! let report = SimulationController::with_mesh(config, Box::new(grid))
//!     .unwrap()
//!     .run()
//!     .unwrap();
//! assert_eq!(report.records.len(), 3);
//! assert!((report.final_state.time() - 0.3).abs() < 1e-12);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `stagger-core` | IDs, field kinds, solve/transfer errors, `Communicator` |
//! | [`mesh`] | `stagger-mesh` | `Mesh` trait, `CellGrid`, mesh input |
//! | [`field`] | `stagger-field` | `FieldSolver` trait, field state, point history, transfers |
//! | [`engine`] | `stagger-engine` | Controller, retry policy, refinement, output |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`stagger-core`).
///
/// Contains cell and field identifiers, the solve and transfer error
/// types, and the [`types::Communicator`] through which every cross-rank
/// decision is reduced.
pub use stagger_core as types;

/// Mesh contract and reference backend (`stagger-mesh`).
///
/// Provides the [`mesh::Mesh`] trait, the hierarchical [`mesh::CellGrid`]
/// and the [`mesh::GridFileReader`] for the keyword grid format.
pub use stagger_mesh as mesh;

/// Field solver capability (`stagger-field`).
///
/// The [`field::FieldSolver`] trait is the main extension point for
/// user-defined physics.
pub use stagger_field as field;

/// Simulation engine (`stagger-engine`).
///
/// [`engine::SimulationController`] drives the timestep loop;
/// [`engine::RefinementTransaction`] migrates state across mesh changes.
pub use stagger_engine as engine;

/// Common imports for typical Stagger usage.
///
/// ```rust
/// use stagger::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use stagger_core::{CellId, Communicator, FieldKind, Gradient, SerialComm};

    // Errors
    pub use stagger_core::{SolveError, TransferError};
    pub use stagger_engine::{ConfigError, RunError};
    pub use stagger_mesh::MeshError;

    // Mesh
    pub use stagger_mesh::{CellGrid, GridFileReader, Mesh, MeshReader};

    // Fields
    pub use stagger_field::{
        CellValues, FieldContext, FieldOutput, FieldSolver, FieldState, FieldTransfer,
        PointHistoryStore, SolveStatus,
    };

    // Engine
    pub use stagger_engine::{
        MemorySink, OutputSink, Parameters, RunReport, SimulationConfig, SimulationController,
        StatisticsFileSink, StepRecord,
    };
}
