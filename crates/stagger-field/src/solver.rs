//! The core `FieldSolver` trait.

use stagger_core::{CellId, FieldKind, Gradient, SolveError, TransferError};
use stagger_mesh::Mesh;

use crate::context::FieldContext;
use crate::output::FieldOutput;
use crate::state::FieldState;
use crate::transfer::FieldTransfer;

/// Result of one field update.
///
/// Divergence is a value, not a panic or an error return: the staggered
/// driver reduces it across ranks before anyone acts on it, so every
/// rank takes the same retry branch.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveStatus {
    /// The nonlinear solve converged.
    Converged {
        /// Ratio of final to initial residual norm; smaller is better.
        residual_reduction: f64,
    },
    /// The nonlinear solve failed on this rank.
    Diverged {
        /// Human-readable description for the log.
        reason: String,
    },
}

impl SolveStatus {
    /// Shorthand for [`SolveStatus::Converged`].
    pub fn converged(residual_reduction: f64) -> Self {
        Self::Converged { residual_reduction }
    }

    /// Shorthand for [`SolveStatus::Diverged`].
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Whether the solve failed.
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// The residual reduction of a converged solve.
    pub fn residual_reduction(&self) -> Option<f64> {
        match self {
            Self::Converged { residual_reduction } => Some(*residual_reduction),
            Self::Diverged { .. } => None,
        }
    }
}

/// A physics field the staggered scheme can solve, roll back and migrate.
///
/// Implementations own their discretisation and solution vectors; the
/// orchestration core only drives the lifecycle below.
///
/// # Lifecycle per accepted step
///
/// 1. [`record_old_solution`](FieldSolver::record_old_solution)
/// 2. one or more attempts of [`update`](FieldSolver::update), each
///    preceded by [`return_old_solution`](FieldSolver::return_old_solution)
///    on a retry
/// 3. [`output_results`](FieldSolver::output_results)
///
/// # Refinement
///
/// [`prepare_refine`](FieldSolver::prepare_refine) is called on the old
/// mesh, [`setup_system`](FieldSolver::setup_system) on the refined
/// mesh, then [`post_refine`](FieldSolver::post_refine) consumes the
/// handle. The handle is never used twice.
///
/// # Example
///
/// ```
/// use stagger_core::{FieldKind, SolveError, TransferError};
/// use stagger_field::{
///     CellValues, FieldContext, FieldOutput, FieldSolver, FieldState, FieldTransfer,
///     SolveStatus,
/// };
/// use stagger_mesh::Mesh;
///
/// struct Cellwise {
///     state: FieldState,
/// }
///
/// impl FieldSolver for Cellwise {
///     fn kind(&self) -> FieldKind {
///         FieldKind::Mechanical
///     }
///     fn state(&self) -> &FieldState {
///         &self.state
///     }
///     fn state_mut(&mut self) -> &mut FieldState {
///         &mut self.state
///     }
///     fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError> {
///         self.state.reinit(ctx.mesh().n_locally_owned_cells());
///         Ok(())
///     }
///     fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus {
///         let t = ctx.time();
///         self.state.solution_mut().iter_mut().for_each(|u| *u = t);
///         SolveStatus::converged(1e-12)
///     }
///     fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer {
///         let solution = self.state.solution();
///         let mut index = 0;
///         let values = CellValues::capture(mesh, |_| {
///             index += 1;
///             solution[index - 1]
///         });
///         FieldTransfer::new(self.kind(), values)
///     }
///     fn post_refine(
///         &mut self,
///         transfer: FieldTransfer,
///         ctx: &mut FieldContext<'_>,
///     ) -> Result<(), TransferError> {
///         let values: CellValues<f64> = transfer.into_payload(self.kind())?;
///         self.state.replace(values.relocate(ctx.mesh())?);
///         Ok(())
///     }
///     fn output_results(&self, out: &mut FieldOutput) {
///         out.add_data_vector("u", self.state.solution().to_vec());
///     }
/// }
/// ```
pub trait FieldSolver: Send {
    /// Which field this solver provides.
    fn kind(&self) -> FieldKind;

    /// Name used in logs.
    fn name(&self) -> &str {
        self.kind().label()
    }

    /// Current and snapshot solution.
    fn state(&self) -> &FieldState;

    /// Mutable access to the solution state.
    fn state_mut(&mut self) -> &mut FieldState;

    /// (Re)build the degree-of-freedom layout for the current mesh.
    ///
    /// Called once at startup and once after every refinement.
    fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError>;

    /// Snapshot the current solution as the step's starting point.
    fn record_old_solution(&mut self) {
        self.state_mut().record();
    }

    /// Restore the snapshot taken by [`record_old_solution`](FieldSolver::record_old_solution).
    fn return_old_solution(&mut self) {
        self.state_mut().restore();
    }

    /// Run the nonlinear solve for the attempt described by `ctx`.
    fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus;

    /// Project the solution back onto its admissible set after an update.
    ///
    /// The phase field uses this for irreversibility; most fields keep the default.
    fn enforce_limitation(&mut self, _ctx: &mut FieldContext<'_>) {}

    /// Capture whatever the field needs to rebuild its solution after refinement.
    fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer;

    /// Consume a handle from [`prepare_refine`](FieldSolver::prepare_refine)
    /// on the refined mesh. The degree-of-freedom layout is already rebuilt.
    fn post_refine(
        &mut self,
        transfer: FieldTransfer,
        ctx: &mut FieldContext<'_>,
    ) -> Result<(), TransferError>;

    /// Contribute named data vectors for the current accepted step.
    fn output_results(&self, out: &mut FieldOutput);

    /// Solution gradients at the quadrature points of `cell`.
    ///
    /// Only the phase field needs this, for the refinement indicator.
    /// The default pushes nothing.
    fn quadrature_gradients(&self, _mesh: &dyn Mesh, _cell: CellId, _out: &mut Vec<Gradient>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accessors() {
        let ok = SolveStatus::converged(0.25);
        assert!(!ok.is_diverged());
        assert_eq!(ok.residual_reduction(), Some(0.25));

        let bad = SolveStatus::diverged("line search failed");
        assert!(bad.is_diverged());
        assert_eq!(bad.residual_reduction(), None);
    }
}
