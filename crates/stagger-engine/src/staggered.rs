//! Single-pass staggered sweep over the coupled fields.

use log::debug;
use smallvec::SmallVec;
use stagger_core::{Communicator, FieldKind, SolveError, TransferError};
use stagger_field::{
    FieldContext, FieldOutput, FieldSolver, FieldTransfer, PointHistoryStore, SolveStatus,
};
use stagger_mesh::Mesh;

use crate::clock::SimulationState;

type FieldRefs<'a> = SmallVec<[&'a mut (dyn FieldSolver + 'static); 2]>;

/// Runs one update of each field per attempt, phase field first.
///
/// The sweep is single-pass: fields are not iterated to mutual
/// agreement. Coupling quality is judged only through the combined
/// residual reduction returned by [`attempt`](StaggeredSolver::attempt).
pub struct StaggeredSolver {
    phase_field: Option<Box<dyn FieldSolver>>,
    mechanical: Box<dyn FieldSolver>,
}

impl StaggeredSolver {
    /// Couple `mechanical` with an optional phase field.
    pub fn new(
        mechanical: Box<dyn FieldSolver>,
        phase_field: Option<Box<dyn FieldSolver>>,
    ) -> Self {
        Self {
            phase_field,
            mechanical,
        }
    }

    /// The mechanical field.
    pub fn mechanical(&self) -> &dyn FieldSolver {
        self.mechanical.as_ref()
    }

    /// The phase field, if coupled.
    pub fn phase_field(&self) -> Option<&dyn FieldSolver> {
        self.phase_field.as_deref()
    }

    /// Fields in solve order.
    pub fn fields(&self) -> impl Iterator<Item = &dyn FieldSolver> {
        self.phase_field
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.mechanical.as_ref()))
    }

    /// Kinds of the coupled fields in solve order.
    pub fn kinds(&self) -> SmallVec<[FieldKind; 2]> {
        self.fields().map(|f| f.kind()).collect()
    }

    fn fields_mut(&mut self) -> FieldRefs<'_> {
        let mut fields = FieldRefs::new();
        if let Some(phase_field) = self.phase_field.as_deref_mut() {
            fields.push(phase_field);
        }
        fields.push(self.mechanical.as_mut());
        fields
    }

    /// (Re)build every field's degree-of-freedom layout on `mesh`.
    pub fn setup_system(
        &mut self,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
        state: &SimulationState,
    ) -> Result<(), SolveError> {
        for field in self.fields_mut() {
            let mut ctx = context(mesh, history, state);
            field.setup_system(&mut ctx)?;
        }
        Ok(())
    }

    /// Snapshot every field's solution.
    pub fn record_old_solution(&mut self) {
        for field in self.fields_mut() {
            field.record_old_solution();
        }
    }

    /// Restore every field's snapshot.
    pub fn return_old_solution(&mut self) {
        for field in self.fields_mut() {
            field.return_old_solution();
        }
    }

    /// Run one staggered attempt for the step described by `state`.
    ///
    /// After each field update all ranks agree on divergence; if any rank
    /// diverged, every rank returns [`SolveError::NonConvergence`] for the
    /// same field. Otherwise staged point history is committed and the
    /// field's limitation hook runs. Returns the largest residual
    /// reduction over fields and ranks.
    pub fn attempt(
        &mut self,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
        state: &SimulationState,
        comm: &dyn Communicator,
    ) -> Result<f64, SolveError> {
        let mut combined = 0.0;
        for field in self.fields_mut() {
            let kind = field.kind();
            let mut ctx = context(mesh, history, state);
            let status = field.update(&mut ctx);
            if comm.any(status.is_diverged()) {
                ctx.history_mut().discard_staged();
                let reason = match status {
                    SolveStatus::Diverged { reason } => reason,
                    SolveStatus::Converged { .. } => "diverged on another rank".to_string(),
                };
                return Err(SolveError::NonConvergence {
                    field: kind,
                    reason,
                });
            }
            let reduction = status.residual_reduction().unwrap_or(0.0);
            let committed = ctx.history_mut().finalize();
            field.enforce_limitation(&mut ctx);
            debug!(
                "{kind} update: residual reduction {reduction:e}, {committed} history entries committed"
            );
            combined = worst(combined, reduction);
        }
        Ok(comm.max(combined))
    }

    /// Gather every field's output vectors.
    pub fn output_results(&self, out: &mut FieldOutput) {
        for field in self.fields() {
            field.output_results(out);
        }
    }

    /// Prepare a transfer handle per field, in solve order.
    pub fn prepare_refine(&self, mesh: &dyn Mesh) -> Vec<FieldTransfer> {
        self.fields().map(|f| f.prepare_refine(mesh)).collect()
    }

    /// Complete the handles from [`prepare_refine`](StaggeredSolver::prepare_refine)
    /// on the refined mesh.
    pub fn post_refine(
        &mut self,
        transfers: Vec<FieldTransfer>,
        mesh: &dyn Mesh,
        history: &mut PointHistoryStore,
        state: &SimulationState,
    ) -> Result<(), TransferError> {
        let mut fields = self.fields_mut();
        if transfers.len() != fields.len() {
            return Err(TransferError::CountMismatch {
                expected: fields.len(),
                actual: transfers.len(),
            });
        }
        for (field, transfer) in fields.iter_mut().zip(transfers) {
            let mut ctx = context(mesh, history, state);
            field.post_refine(transfer, &mut ctx)?;
        }
        Ok(())
    }
}

fn context<'a>(
    mesh: &'a dyn Mesh,
    history: &'a mut PointHistoryStore,
    state: &SimulationState,
) -> FieldContext<'a> {
    FieldContext::new(
        mesh,
        history,
        state.time(),
        state.current_timestep(),
        state.timestep_number(),
    )
}

// NaN poisons the combined value instead of being skipped by `f64::max`.
fn worst(acc: f64, reduction: f64) -> f64 {
    if reduction.is_nan() || reduction > acc {
        reduction
    } else {
        acc
    }
}
