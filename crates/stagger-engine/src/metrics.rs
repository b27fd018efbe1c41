//! Run metrics and per-step records.
//!
//! [`RunMetrics`] accumulates counters and wall-clock timings over a
//! whole run; [`StepRecord`] describes how one step was accepted.

/// Cumulative counters and timings of a run.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunMetrics {
    /// Accepted steps.
    pub accepted_steps: u64,
    /// Retries caused by an agreed non-convergence.
    pub nonconvergence_retries: u64,
    /// Retries caused by an excessive residual reduction.
    pub residual_retries: u64,
    /// Steps accepted at the step-size floor despite an excessive residual.
    pub forced_acceptances: u64,
    /// Refinement cycles agreed by the collective vote.
    pub refinements: u64,
    /// Time spent in staggered attempts, including retries.
    pub solve_us: u64,
    /// Time spent collecting and writing output.
    pub output_us: u64,
    /// Time spent evaluating the criterion and transferring state.
    pub refine_us: u64,
}

impl RunMetrics {
    /// Fold one accepted step into the counters.
    pub fn record_step(&mut self, record: &StepRecord) {
        self.accepted_steps += 1;
        self.nonconvergence_retries += record.nonconvergence_retries;
        self.residual_retries += record.residual_retries;
        self.forced_acceptances += u64::from(record.floor_reached);
        self.refinements += u64::from(record.refined);
    }
}

/// How one step was accepted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepRecord {
    /// Number of the accepted step.
    pub step: u64,
    /// Simulation time at the end of the step.
    pub time: f64,
    /// Step size the step was accepted with.
    pub timestep: f64,
    /// Combined residual reduction of the accepted attempt.
    pub residual_reduction: f64,
    /// Retries caused by non-convergence.
    pub nonconvergence_retries: u64,
    /// Retries caused by an excessive residual reduction.
    pub residual_retries: u64,
    /// Whether the step was accepted at the step-size floor.
    pub floor_reached: bool,
    /// Whether the ranks agreed to refine after the step.
    pub refined: bool,
    /// Global active cells after the step (and its refinement, if any).
    pub active_cells: usize,
}

impl StepRecord {
    /// Total retries of either kind.
    pub fn retries(&self) -> u64 {
        self.nonconvergence_retries + self.residual_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = RunMetrics::default();
        assert_eq!(m.accepted_steps, 0);
        assert_eq!(m.nonconvergence_retries, 0);
        assert_eq!(m.residual_retries, 0);
        assert_eq!(m.forced_acceptances, 0);
        assert_eq!(m.refinements, 0);
        assert_eq!(m.solve_us, 0);
    }

    #[test]
    fn record_step_accumulates() {
        let mut m = RunMetrics::default();
        let record = StepRecord {
            step: 1,
            nonconvergence_retries: 2,
            residual_retries: 3,
            floor_reached: true,
            refined: true,
            ..StepRecord::default()
        };
        m.record_step(&record);
        m.record_step(&StepRecord::default());
        assert_eq!(m.accepted_steps, 2);
        assert_eq!(m.nonconvergence_retries, 2);
        assert_eq!(m.residual_retries, 3);
        assert_eq!(m.forced_acceptances, 1);
        assert_eq!(m.refinements, 1);
        assert_eq!(record.retries(), 5);
    }
}
