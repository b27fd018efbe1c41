//! Simulation clock.

/// Global time state of a run.
///
/// The clock remembers where the current step started, so rolling back
/// a failed attempt restores `time` bit for bit and re-advancing by a
/// shrunk step always lands on `origin + current_timestep`. Repeated
/// rollbacks therefore never accumulate rounding drift.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationState {
    time: f64,
    timestep_number: u64,
    current_timestep: f64,
    old_timestep: f64,
    origin: f64,
}

impl SimulationState {
    /// Clock at time zero, before step 1, with `timestep` as the initial step size.
    pub fn new(timestep: f64) -> Self {
        Self {
            time: 0.0,
            timestep_number: 1,
            current_timestep: timestep,
            old_timestep: timestep,
            origin: 0.0,
        }
    }

    /// Simulation time. Inside an attempt this is the end of the attempted step.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 1-based number of the step in progress (or the next step between steps).
    pub fn timestep_number(&self) -> u64 {
        self.timestep_number
    }

    /// Step size of the attempt in flight; may be shrunk during retries.
    pub fn current_timestep(&self) -> f64 {
        self.current_timestep
    }

    /// Base step size of the step in progress.
    pub fn old_timestep(&self) -> f64 {
        self.old_timestep
    }

    /// Time at which the step in progress started.
    pub fn step_origin(&self) -> f64 {
        self.origin
    }

    /// Start a new step of size `base` and advance the clock to its end.
    pub fn begin_step(&mut self, base: f64) {
        self.old_timestep = base;
        self.current_timestep = base;
        self.origin = self.time;
        self.time = self.origin + base;
    }

    /// Roll the clock back to the start of the step in progress.
    pub fn rewind(&mut self) {
        self.time = self.origin;
    }

    /// Advance from the start of the step by the current step size.
    pub fn advance(&mut self) {
        self.time = self.origin + self.current_timestep;
    }

    /// Replace the step size of the attempt in flight.
    ///
    /// The clock is not moved; callers pair this with
    /// [`rewind`](SimulationState::rewind) and [`advance`](SimulationState::advance).
    pub fn set_current_timestep(&mut self, timestep: f64) {
        self.current_timestep = timestep;
    }

    /// Accept the step in progress: restore the base step size and move to the next step.
    pub fn accept(&mut self) {
        self.current_timestep = self.old_timestep;
        self.timestep_number += 1;
    }
}
