//! Split-borrow context handed to field solvers.

use stagger_mesh::Mesh;

use crate::history::PointHistoryStore;

/// Everything a field may look at during setup, update or transfer.
///
/// The mesh is read-only; point history is writable so solvers can stage
/// candidate values. Time values describe the attempt in flight: `time`
/// is the end of the step being solved and `timestep` its size.
pub struct FieldContext<'a> {
    mesh: &'a dyn Mesh,
    history: &'a mut PointHistoryStore,
    time: f64,
    timestep: f64,
    timestep_number: u64,
}

impl<'a> FieldContext<'a> {
    /// Build a context for one call into a solver.
    pub fn new(
        mesh: &'a dyn Mesh,
        history: &'a mut PointHistoryStore,
        time: f64,
        timestep: f64,
        timestep_number: u64,
    ) -> Self {
        Self {
            mesh,
            history,
            time,
            timestep,
            timestep_number,
        }
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh
    }

    /// Point history, read-only.
    pub fn history(&self) -> &PointHistoryStore {
        self.history
    }

    /// Point history, for staging values.
    pub fn history_mut(&mut self) -> &mut PointHistoryStore {
        self.history
    }

    /// Simulation time at the end of the attempted step.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Size of the attempted step.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// 1-based number of the step being solved.
    pub fn timestep_number(&self) -> u64 {
        self.timestep_number
    }
}
