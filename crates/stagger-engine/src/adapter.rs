//! Step-size policy for the attempt loop.

use crate::clock::SimulationState;
use crate::config::Parameters;

/// Step-size policy: base step per step number, shrink factor, residual
/// threshold and floor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestepAdapter {
    timestep: f64,
    timestep_size_2: f64,
    switch_timestep: u64,
    upper_threshold: f64,
    floor: f64,
}

impl TimestepAdapter {
    /// Divisor applied to the step size on every retry.
    pub const SHRINK_FACTOR: f64 = 10.0;

    /// Build the policy from validated parameters.
    pub fn from_params(params: &Parameters) -> Self {
        Self {
            timestep: params.timestep,
            timestep_size_2: params.timestep_size_2,
            switch_timestep: params.switch_timestep,
            upper_threshold: params.upper_newton_rho,
            floor: params.min_timestep,
        }
    }

    /// Base step size of step `timestep_number`.
    ///
    /// Switches to the secondary size strictly after `switch_timestep`,
    /// unless the switch is disabled with `switch_timestep == 0`.
    pub fn base_timestep(&self, timestep_number: u64) -> f64 {
        if self.switch_timestep > 0 && timestep_number > self.switch_timestep {
            self.timestep_size_2
        } else {
            self.timestep
        }
    }

    /// Whether a combined residual reduction calls for a smaller step.
    ///
    /// NaN is never acceptable.
    pub fn needs_shrink(&self, residual_reduction: f64) -> bool {
        residual_reduction.is_nan() || residual_reduction > self.upper_threshold
    }

    /// Whether `timestep` fell below the floor.
    pub fn below_floor(&self, timestep: f64) -> bool {
        timestep < self.floor
    }

    /// Roll the clock back, divide the step by [`SHRINK_FACTOR`](Self::SHRINK_FACTOR)
    /// and roll forward by the new step. Returns the new step size.
    pub fn shrink(&self, state: &mut SimulationState) -> f64 {
        state.rewind();
        let shrunk = state.current_timestep() / Self::SHRINK_FACTOR;
        state.set_current_timestep(shrunk);
        state.advance();
        shrunk
    }

    /// Residual reduction above which steps are shrunk.
    pub fn upper_threshold(&self) -> f64 {
        self.upper_threshold
    }

    /// Step size below which poor residuals are accepted.
    pub fn floor(&self) -> f64 {
        self.floor
    }
}
