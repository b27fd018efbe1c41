//! Gradient-driven refinement criterion with global agreement.

use log::debug;
use stagger_core::{Communicator, Gradient};
use stagger_field::{FieldSolver, PointHistoryStore};
use stagger_mesh::{Mesh, MeshError, RefinementSummary};

use crate::clock::SimulationState;
use crate::config::Parameters;
use crate::controller::RunError;
use crate::staggered::StaggeredSolver;
use crate::transaction::StateTransferManager;

/// Gradient magnitude above which a cell is refined.
///
/// `(1 / l) * (exp(-a2) / exp(-a1)) * exp(-a1)` for length scale `l`,
/// initial influence `a1` and final influence `a2`.
pub fn refine_threshold(length_scale: f64, a1: f64, a2: f64) -> f64 {
    (1.0 / length_scale) * ((-a2).exp() / (-a1).exp()) * (-a1).exp()
}

fn norm(g: &Gradient) -> f64 {
    (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt()
}

/// Marks cells where the phase field is steep and decides, collectively,
/// whether the mesh is refined this cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshRefiner {
    threshold: f64,
    min_diameter: f64,
}

impl MeshRefiner {
    /// Refiner with an explicit gradient threshold and cell-size floor.
    pub fn new(threshold: f64, min_diameter: f64) -> Self {
        Self {
            threshold,
            min_diameter,
        }
    }

    /// Refiner configured from the run parameters.
    pub fn from_params(params: &Parameters) -> Self {
        Self::new(
            refine_threshold(
                params.length_scale,
                params.refine_influence_initial,
                params.refine_influence_final,
            ),
            params.length_scale * params.refine_minimum_size_ratio,
        )
    }

    /// Gradient threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Cells with a smaller diameter are never refined.
    pub fn min_diameter(&self) -> f64 {
        self.min_diameter
    }

    /// Flag locally owned cells whose largest quadrature-point gradient of
    /// `phase_field` exceeds the threshold. Returns the number of flagged cells.
    ///
    /// Cells below the size floor have any existing flag cleared.
    pub fn mark_cells(
        &self,
        mesh: &mut dyn Mesh,
        phase_field: Option<&dyn FieldSolver>,
    ) -> Result<usize, MeshError> {
        let mut gradients: Vec<Gradient> = Vec::new();
        let mut marked = 0;
        for cell in mesh.locally_owned_cells() {
            let diameter = mesh.diameter(cell).ok_or(MeshError::UnknownCell { cell })?;
            if diameter < self.min_diameter {
                mesh.clear_refine_flag(cell);
                continue;
            }
            let Some(field) = phase_field else {
                continue;
            };
            gradients.clear();
            field.quadrature_gradients(&*mesh, cell, &mut gradients);
            let steepest = gradients.iter().map(norm).fold(0.0, f64::max);
            if steepest > self.threshold {
                mesh.set_refine_flag(cell)?;
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Mark cells and agree across ranks whether any rank refines.
    ///
    /// Collective: every rank calls this every cycle. When the vote is
    /// negative, local flags are cleared.
    pub fn vote(
        &self,
        mesh: &mut dyn Mesh,
        phase_field: Option<&dyn FieldSolver>,
        comm: &dyn Communicator,
    ) -> Result<bool, MeshError> {
        let marked = self.mark_cells(mesh, phase_field)?;
        let refine = comm.any(marked > 0);
        debug!("refinement vote: {marked} local cells marked, global decision {refine}");
        if !refine {
            mesh.clear_refine_flags();
        }
        Ok(refine)
    }

    /// Evaluate the criterion and, if the ranks agree, refine the mesh and
    /// migrate all state onto it.
    ///
    /// Returns `None` when no refinement happened.
    pub fn evaluate_and_apply(
        &self,
        mesh: &mut dyn Mesh,
        history: &mut PointHistoryStore,
        solver: &mut StaggeredSolver,
        state: &SimulationState,
        comm: &dyn Communicator,
    ) -> Result<Option<RefinementSummary>, RunError> {
        if !self.vote(mesh, solver.phase_field(), comm)? {
            return Ok(None);
        }
        let summary = StateTransferManager.refine(mesh, history, solver, state)?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_reduces_to_final_influence() {
        let t = refine_threshold(0.5, 1.0, 3.0);
        assert!((t - 2.0 * (-3.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn from_params_uses_length_scale() {
        let params = Parameters {
            length_scale: 0.1,
            refine_minimum_size_ratio: 0.25,
            refine_influence_initial: 0.0,
            refine_influence_final: 0.0,
            ..Parameters::default()
        };
        let refiner = MeshRefiner::from_params(&params);
        assert!((refiner.threshold() - 10.0).abs() < 1e-12);
        assert!((refiner.min_diameter() - 0.025).abs() < 1e-15);
    }

    #[test]
    fn gradient_norm() {
        assert_eq!(norm(&[3.0, 4.0, 0.0]), 5.0);
    }
}
