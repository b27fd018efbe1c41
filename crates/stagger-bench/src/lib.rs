//! Benchmark profiles and reference fields for the Stagger simulation framework.
//!
//! Provides pre-built run setups for benchmarking:
//!
//! - [`reference_profile`]: 32x32 unit square with a sweeping crack front
//! - [`stress_profile`]: 96x96 unit square with the same fields
//!
//! The fields are closed-form stand-ins for real assembly and Newton
//! solves: [`FrontField`] is an exponential damage profile around a
//! front moving along `x`, [`RelaxationField`] relaxes towards one. They
//! exercise the orchestration (retries, refinement, state migration) at
//! realistic cell counts without a linear-algebra backend.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use stagger_core::{CellId, FieldKind, Gradient, SolveError, TransferError};
use stagger_engine::{OutputError, OutputSink, Parameters, SimulationConfig, StepOutput};
use stagger_field::{
    CellValues, FieldContext, FieldOutput, FieldSolver, FieldState, FieldTransfer, SolveStatus,
};
use stagger_mesh::{CellGrid, Mesh};

/// Residual reduction reported by the reference fields.
pub const REFERENCE_REDUCTION: f64 = 0.1;

/// Phase field `d = exp(-|x - x_f| / l)` around a front at `x_f = x_0 + v t`.
#[derive(Debug)]
pub struct FrontField {
    state: FieldState,
    length_scale: f64,
    start: f64,
    speed: f64,
    front: f64,
}

impl FrontField {
    /// Front of width `length_scale` starting at `start`, moving at `speed`.
    pub fn new(length_scale: f64, start: f64, speed: f64) -> Self {
        Self {
            state: FieldState::default(),
            length_scale,
            start,
            speed,
            front: start,
        }
    }

    fn damage(&self, x: f64) -> f64 {
        (-(x - self.front).abs() / self.length_scale).exp()
    }
}

impl FieldSolver for FrontField {
    fn kind(&self) -> FieldKind {
        FieldKind::PhaseField
    }

    fn state(&self) -> &FieldState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FieldState {
        &mut self.state
    }

    fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError> {
        self.state.reinit(ctx.mesh().n_locally_owned_cells());
        Ok(())
    }

    fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus {
        self.front = self.start + self.speed * ctx.time();
        let cells = ctx.mesh().locally_owned_cells();
        let mut damage = Vec::with_capacity(cells.len());
        for &cell in &cells {
            let x = ctx.mesh().center(cell).map_or(f64::NAN, |c| c[0]);
            damage.push(self.damage(x));
        }
        let history = ctx.history_mut();
        for (&cell, &d) in cells.iter().zip(&damage) {
            if let Some(points) = history.cell_mut(cell) {
                for point in points {
                    point.stage(&[d]);
                }
            }
        }
        self.state.replace(damage);
        SolveStatus::converged(REFERENCE_REDUCTION)
    }

    fn enforce_limitation(&mut self, _ctx: &mut FieldContext<'_>) {
        for d in self.state.solution_mut() {
            *d = d.clamp(0.0, 1.0);
        }
    }

    fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer {
        let mut values = self.state.solution().iter().copied();
        let captured = CellValues::capture(mesh, |_| values.next().unwrap_or(0.0));
        FieldTransfer::new(FieldKind::PhaseField, captured)
    }

    fn post_refine(
        &mut self,
        transfer: FieldTransfer,
        ctx: &mut FieldContext<'_>,
    ) -> Result<(), TransferError> {
        let captured: CellValues<f64> = transfer.into_payload(FieldKind::PhaseField)?;
        self.state.replace(captured.relocate(ctx.mesh())?);
        Ok(())
    }

    fn output_results(&self, out: &mut FieldOutput) {
        out.add_data_vector(FieldKind::PhaseField.label(), self.state.solution().to_vec());
    }

    fn quadrature_gradients(&self, mesh: &dyn Mesh, cell: CellId, out: &mut Vec<Gradient>) {
        if let Some(center) = mesh.center(cell) {
            let offset = center[0] - self.front;
            let slope = -offset.signum() * self.damage(center[0]) / self.length_scale;
            out.push([slope, 0.0, 0.0]);
        }
    }
}

/// Mechanical stand-in: every degree of freedom relaxes as `u += dt (1 - u)`.
#[derive(Debug, Default)]
pub struct RelaxationField {
    state: FieldState,
}

impl FieldSolver for RelaxationField {
    fn kind(&self) -> FieldKind {
        FieldKind::Mechanical
    }

    fn state(&self) -> &FieldState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FieldState {
        &mut self.state
    }

    fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError> {
        self.state.reinit(ctx.mesh().n_locally_owned_cells());
        Ok(())
    }

    fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus {
        let dt = ctx.timestep();
        for u in self.state.solution_mut() {
            *u += dt * (1.0 - *u);
        }
        SolveStatus::converged(REFERENCE_REDUCTION)
    }

    fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer {
        let mut values = self.state.solution().iter().copied();
        let captured = CellValues::capture(mesh, |_| values.next().unwrap_or(0.0));
        FieldTransfer::new(FieldKind::Mechanical, captured)
    }

    fn post_refine(
        &mut self,
        transfer: FieldTransfer,
        ctx: &mut FieldContext<'_>,
    ) -> Result<(), TransferError> {
        let captured: CellValues<f64> = transfer.into_payload(FieldKind::Mechanical)?;
        self.state.replace(captured.relocate(ctx.mesh())?);
        Ok(())
    }

    fn output_results(&self, out: &mut FieldOutput) {
        out.add_data_vector(FieldKind::Mechanical.label(), self.state.solution().to_vec());
    }
}

/// Sink that drops every step, so long benchmark runs do not accumulate output.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl OutputSink for DiscardSink {
    fn write_step(&mut self, _output: &StepOutput<'_>) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Build the reference benchmark profile: 32x32 unit square (1K coarse cells).
///
/// Front width 0.05 starting at `x = 0.2` and moving at unit speed;
/// dt = 0.01. Cells within roughly two widths of the front are refined
/// down to a diameter of 0.025.
pub fn reference_profile(max_no_timesteps: u64) -> (SimulationConfig, CellGrid) {
    profile(32, max_no_timesteps)
}

/// Build a stress profile: 96x96 unit square (~9K coarse cells).
///
/// Same fields as [`reference_profile`] at nine times the cell count.
pub fn stress_profile(max_no_timesteps: u64) -> (SimulationConfig, CellGrid) {
    profile(96, max_no_timesteps)
}

fn profile(n: usize, max_no_timesteps: u64) -> (SimulationConfig, CellGrid) {
    let params = Parameters {
        project_name: format!("front-{n}x{n}"),
        dim: 2,
        timestep: 1e-2,
        max_no_timesteps,
        length_scale: 0.05,
        refine_influence_initial: 1.0,
        refine_influence_final: 2.0,
        refine_minimum_size_ratio: 0.5,
        ..Parameters::default()
    };
    let phase = FrontField::new(params.length_scale, 0.2, 1.0);
    let config = SimulationConfig::new(params, Box::new(RelaxationField::default()))
        .with_phase_field(Box::new(phase))
        .with_sink(Box::new(DiscardSink));
    let grid = CellGrid::hyper_rectangle(2, &[n, n], &[1.0, 1.0]).unwrap();
    (config, grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagger_engine::SimulationController;

    #[test]
    fn reference_profile_refines_near_the_front() {
        let (config, grid) = reference_profile(3);
        let report = SimulationController::with_mesh(config, Box::new(grid))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(report.records.len(), 3);
        assert!(report.records[0].refined);
        assert!(report.active_cells > 32 * 32);
        assert!(report.records.iter().all(|r| r.retries() == 0));
    }

    #[test]
    fn front_gradient_points_towards_the_front() {
        let grid = CellGrid::hyper_rectangle(1, &[4], &[1.0]).unwrap();
        let field = FrontField::new(0.1, 0.5, 0.0);
        let cells = grid.locally_owned_cells();
        let mut out = Vec::new();
        field.quadrature_gradients(&grid, cells[0], &mut out);
        field.quadrature_gradients(&grid, cells[3], &mut out);
        assert!(out[0][0] > 0.0);
        assert!(out[1][0] < 0.0);
    }
}
