//! Solution vector with its start-of-attempt snapshot.

/// Current solution of one field plus the snapshot taken before each attempt.
///
/// `old_solution` always holds the accepted state at the start of the
/// current timestep attempt. [`restore`](FieldState::restore) copies it
/// back verbatim, so a rolled-back attempt leaves no trace in the
/// solution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldState {
    solution: Vec<f64>,
    old_solution: Vec<f64>,
}

impl FieldState {
    /// Zero-initialised state over `n_dofs` degrees of freedom.
    pub fn new(n_dofs: usize) -> Self {
        Self {
            solution: vec![0.0; n_dofs],
            old_solution: vec![0.0; n_dofs],
        }
    }

    /// State whose solution and snapshot both equal `solution`.
    pub fn from_solution(solution: Vec<f64>) -> Self {
        Self {
            old_solution: solution.clone(),
            solution,
        }
    }

    /// Number of degrees of freedom.
    pub fn n_dofs(&self) -> usize {
        self.solution.len()
    }

    /// The current solution.
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    /// Mutable access to the current solution. The length is fixed.
    pub fn solution_mut(&mut self) -> &mut [f64] {
        &mut self.solution
    }

    /// The snapshot taken by the last [`record`](FieldState::record).
    pub fn old_solution(&self) -> &[f64] {
        &self.old_solution
    }

    /// Snapshot the current solution.
    pub fn record(&mut self) {
        self.old_solution.clone_from(&self.solution);
    }

    /// Restore the current solution from the snapshot.
    pub fn restore(&mut self) {
        self.solution.clone_from(&self.old_solution);
    }

    /// Resize to a new degree-of-freedom layout, zeroing both vectors.
    pub fn reinit(&mut self, n_dofs: usize) {
        self.solution.clear();
        self.solution.resize(n_dofs, 0.0);
        self.old_solution.clear();
        self.old_solution.resize(n_dofs, 0.0);
    }

    /// Replace the solution after a mesh transfer; the snapshot follows it.
    pub fn replace(&mut self, solution: Vec<f64>) {
        self.old_solution.clone_from(&solution);
        self.solution = solution;
    }
}
