//! State migration across a refinement, as a typestate.
//!
//! A refinement must run its stages in exactly this order:
//!
//! 1. prepare history and field transfers on the old mesh
//! 2. execute the refinement (collective)
//! 3. rebuild every field's degree-of-freedom layout
//! 4. re-allocate point history and interpolate the prepared history
//! 5. complete every field's prepared transfer
//!
//! Each stage consumes the previous [`RefinementTransaction`] and
//! returns the next, so stages cannot be skipped, reordered or repeated,
//! and the prepared handles cannot outlive the cycle.

use log::debug;
use stagger_core::SolveError;
use stagger_field::{FieldTransfer, HistoryTransfer, PointHistoryStore};
use stagger_mesh::{Mesh, RefinementSummary};

use crate::clock::SimulationState;
use crate::controller::RunError;
use crate::staggered::StaggeredSolver;

/// Handles prepared on the old mesh.
#[derive(Debug)]
pub struct Prepared {
    history: HistoryTransfer,
    fields: Vec<FieldTransfer>,
}

/// Mesh refined; handles still pending.
#[derive(Debug)]
pub struct Executed {
    history: HistoryTransfer,
    fields: Vec<FieldTransfer>,
    summary: RefinementSummary,
}

/// Field layouts rebuilt on the refined mesh.
#[derive(Debug)]
pub struct Rebuilt {
    history: HistoryTransfer,
    fields: Vec<FieldTransfer>,
    summary: RefinementSummary,
}

/// Point history restored; field transfers pending.
#[derive(Debug)]
pub struct HistoryRestored {
    fields: Vec<FieldTransfer>,
    summary: RefinementSummary,
}

/// One refinement cycle in stage `S`.
#[derive(Debug)]
pub struct RefinementTransaction<S> {
    stage: S,
}

impl RefinementTransaction<Prepared> {
    /// Capture committed point history and every field's transfer handle.
    pub fn prepare(
        mesh: &dyn Mesh,
        history: &PointHistoryStore,
        solver: &StaggeredSolver,
    ) -> Self {
        let stage = Prepared {
            history: history.prepare_transfer(),
            fields: solver.prepare_refine(mesh),
        };
        debug!(
            "refinement prepared: {} history cells, {} field handles",
            stage.history.n_cells(),
            stage.fields.len()
        );
        Self { stage }
    }

    /// Refine every flagged cell. Collective.
    pub fn execute(self, mesh: &mut dyn Mesh) -> RefinementTransaction<Executed> {
        let Prepared { history, fields } = self.stage;
        let summary = mesh.execute_coarsening_and_refinement();
        debug!(
            "refinement executed: {} cells refined, {} active",
            summary.refined, summary.active_cells
        );
        RefinementTransaction {
            stage: Executed {
                history,
                fields,
                summary,
            },
        }
    }
}

impl RefinementTransaction<Executed> {
    /// What the mesh change did.
    pub fn summary(&self) -> RefinementSummary {
        self.stage.summary
    }

    /// Rebuild every field's degree-of-freedom layout on the refined mesh.
    pub fn rebuild(
        self,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
        solver: &mut StaggeredSolver,
        state: &SimulationState,
    ) -> Result<RefinementTransaction<Rebuilt>, SolveError> {
        let Executed {
            history: prepared,
            fields,
            summary,
        } = self.stage;
        solver.setup_system(mesh, history, state)?;
        Ok(RefinementTransaction {
            stage: Rebuilt {
                history: prepared,
                fields,
                summary,
            },
        })
    }
}

impl RefinementTransaction<Rebuilt> {
    /// Re-allocate point history for the refined mesh and fill it from the
    /// prepared transfer.
    ///
    /// Fails with [`RunError::HistoryMismatch`] if the store does not end
    /// up with one entry per quadrature point of every owned cell.
    pub fn finalize_history(
        self,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
    ) -> Result<RefinementTransaction<HistoryRestored>, RunError> {
        let Rebuilt {
            history: prepared,
            fields,
            summary,
        } = self.stage;
        history.initialize(mesh);
        let written = prepared.interpolate(history, mesh)?;
        check_history_count(history.expected_len(mesh), history.len(), written)?;
        debug!("point history restored: {written} entries");
        Ok(RefinementTransaction {
            stage: HistoryRestored { fields, summary },
        })
    }
}

impl RefinementTransaction<HistoryRestored> {
    /// Complete every field's transfer and close the cycle.
    pub fn finalize_fields(
        self,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
        solver: &mut StaggeredSolver,
        state: &SimulationState,
    ) -> Result<RefinementSummary, RunError> {
        let HistoryRestored { fields, summary } = self.stage;
        solver.post_refine(fields, mesh, history, state)?;
        Ok(summary)
    }
}

/// Runs a complete [`RefinementTransaction`] for the flagged cells of a mesh.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateTransferManager;

impl StateTransferManager {
    /// Refine the flagged cells of `mesh` and migrate history and fields onto it.
    pub fn refine(
        &self,
        mesh: &mut dyn Mesh,
        history: &mut PointHistoryStore,
        solver: &mut StaggeredSolver,
        state: &SimulationState,
    ) -> Result<RefinementSummary, RunError> {
        let prepared = RefinementTransaction::prepare(&*mesh, history, solver);
        let executed = prepared.execute(mesh);
        let rebuilt = executed.rebuild(&*mesh, history, solver, state)?;
        let restored = rebuilt.finalize_history(&*mesh, history)?;
        restored.finalize_fields(&*mesh, history, solver, state)
    }
}

/// Both the store size and the relocated entry count must match `expected`;
/// the first one that does not is reported.
fn check_history_count(expected: usize, stored: usize, written: usize) -> Result<(), RunError> {
    let actual = if stored != expected { stored } else { written };
    if actual != expected {
        return Err(RunError::HistoryMismatch { expected, actual });
    }
    Ok(())
}
