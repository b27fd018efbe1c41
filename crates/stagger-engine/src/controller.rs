//! Top-level simulation driver.
//!
//! [`SimulationController`] owns the mesh, point history, clock and
//! fields, and moves through the phases
//! `Advancing → (Retrying →)* Accepted → Refining → Advancing …`
//! until the step counter exceeds `max_no_timesteps`.
//!
//! Two retry loops guard every step. The outer loop reacts to an agreed
//! non-convergence: roll back, shrink the step tenfold and restart the
//! whole attempt, including the snapshot. The inner loop reacts to an
//! excessive combined residual reduction: shrink and re-run until the
//! reduction is acceptable or the step falls below the floor, in which
//! case the step is accepted with a warning.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use log::{debug, info, trace, warn};
use stagger_core::{Communicator, SolveError, TransferError};
use stagger_field::{FieldOutput, PointHistoryStore};
use stagger_mesh::{read_mesh, Mesh, MeshError};

use crate::adapter::TimestepAdapter;
use crate::clock::SimulationState;
use crate::config::{ConfigError, Parameters, SimulationConfig};
use crate::metrics::{RunMetrics, StepRecord};
use crate::output::{ColumnFormat, OutputError, OutputSink, StatisticsTable, StepOutput};
use crate::refiner::MeshRefiner;
use crate::staggered::StaggeredSolver;

// ── RunError ───────────────────────────────────────────────────────

/// Errors that end a run.
#[derive(Debug)]
pub enum RunError {
    /// The configuration is invalid.
    Config(ConfigError),
    /// The mesh could not be read or queried.
    Mesh(MeshError),
    /// A field failed in a way the retry loops cannot recover from.
    Solve(SolveError),
    /// State could not be moved onto a refined mesh.
    Transfer(TransferError),
    /// An output sink failed.
    Output(OutputError),
    /// Point history does not cover the refined mesh exactly.
    HistoryMismatch {
        /// Entries the refined mesh needs.
        expected: usize,
        /// Entries actually present.
        actual: usize,
    },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Solve(e) => write!(f, "solve: {e}"),
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Output(e) => write!(f, "output: {e}"),
            Self::HistoryMismatch { expected, actual } => write!(
                f,
                "point history holds {actual} entries, refined mesh needs {expected}"
            ),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Solve(e) => Some(e),
            Self::Transfer(e) => Some(e),
            Self::Output(e) => Some(e),
            Self::HistoryMismatch { .. } => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<MeshError> for RunError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

impl From<SolveError> for RunError {
    fn from(e: SolveError) -> Self {
        Self::Solve(e)
    }
}

impl From<TransferError> for RunError {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

impl From<OutputError> for RunError {
    fn from(e: OutputError) -> Self {
        Self::Output(e)
    }
}

// ── Phase ──────────────────────────────────────────────────────────

/// Where the controller is in its state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Ready for, or running, the first attempt of a step.
    Advancing,
    /// Re-running a step with a shrunk step size.
    Retrying,
    /// Step accepted; outputs being recorded.
    Accepted,
    /// Evaluating the refinement criterion and migrating state.
    Refining,
    /// All steps done.
    Terminated,
}

// ── RunReport ──────────────────────────────────────────────────────

/// Summary returned by [`SimulationController::run`].
#[derive(Clone, Debug)]
pub struct RunReport {
    /// One record per accepted step.
    pub records: Vec<StepRecord>,
    /// Cumulative counters and timings.
    pub metrics: RunMetrics,
    /// Clock after the last step.
    pub final_state: SimulationState,
    /// Statistics table of the whole run.
    pub statistics: StatisticsTable,
    /// Global active cells at the end of the run.
    pub active_cells: usize,
}

// ── SimulationController ───────────────────────────────────────────

/// Drives a staggered simulation from the first to the last step.
pub struct SimulationController {
    params: Parameters,
    mesh: Box<dyn Mesh>,
    history: PointHistoryStore,
    solver: StaggeredSolver,
    adapter: TimestepAdapter,
    refiner: Option<MeshRefiner>,
    comm: Box<dyn Communicator>,
    sink: Box<dyn OutputSink>,
    state: SimulationState,
    statistics: StatisticsTable,
    metrics: RunMetrics,
    records: Vec<StepRecord>,
    phase: Phase,
}

impl SimulationController {
    /// Validate `config`, read the mesh and set up every field.
    ///
    /// A missing mesh file fails with [`MeshError::FileNotFound`] before
    /// anything else is allocated.
    pub fn new(config: SimulationConfig) -> Result<Self, RunError> {
        config.validate()?;
        let mesh = read_mesh(
            config.mesh_reader.as_ref(),
            &config.params.mesh_from,
            config.comm.rank(),
            config.comm.size(),
        )?;
        Self::with_mesh(config, mesh)
    }

    /// Like [`new`](SimulationController::new) with an already constructed mesh.
    ///
    /// `config.mesh_reader` and `config.params.mesh_from` are ignored.
    pub fn with_mesh(config: SimulationConfig, mesh: Box<dyn Mesh>) -> Result<Self, RunError> {
        config.validate()?;
        let SimulationConfig {
            params,
            mechanical,
            mut phase_field,
            comm,
            mesh_reader: _,
            sink,
        } = config;

        if mesh.dim() != params.dim {
            return Err(MeshError::InvalidDimension { dim: mesh.dim() }.into());
        }
        if !params.enable_phase_field && phase_field.take().is_some() && comm.is_root() {
            warn!("phase-field solver supplied but the phase field is disabled; ignoring it");
        }

        if comm.is_root() {
            info!("project: {}", params.project_name);
            info!("mesh: {}", params.mesh_from.display());
            info!("output directory: {}", params.output_dir.display());
            info!(
                "dimension {}, {} ranks, {} active cells",
                params.dim,
                comm.size(),
                mesh.n_global_active_cells()
            );
        }

        let adapter = TimestepAdapter::from_params(&params);
        let refiner = params
            .enable_refinement
            .then(|| MeshRefiner::from_params(&params));
        let mut history = PointHistoryStore::new(params.quadrature_points_per_cell());
        history.initialize(mesh.as_ref());
        let state = SimulationState::new(adapter.base_timestep(1));
        let mut solver = StaggeredSolver::new(mechanical, phase_field);
        solver.setup_system(mesh.as_ref(), &mut history, &state)?;

        Ok(Self {
            params,
            mesh,
            history,
            solver,
            adapter,
            refiner,
            comm,
            sink,
            state,
            statistics: StatisticsTable::new(),
            metrics: RunMetrics::default(),
            records: Vec::new(),
            phase: Phase::Advancing,
        })
    }

    /// Run every remaining step and finish the sink.
    pub fn run(mut self) -> Result<RunReport, RunError> {
        while !self.is_finished() {
            self.step()?;
        }
        self.sink.finish()?;
        self.set_phase(Phase::Terminated);
        Ok(RunReport {
            active_cells: self.mesh.n_global_active_cells(),
            records: self.records,
            metrics: self.metrics,
            final_state: self.state,
            statistics: self.statistics,
        })
    }

    /// Per-step banner, showing the time the step starts from.
    fn banner(&self, step: u64, base: f64) -> String {
        format!("timestep {step}: t = {:e}, dt = {base:e}", self.state.time())
    }

    /// Whether the step counter passed `max_no_timesteps`.
    pub fn is_finished(&self) -> bool {
        self.state.timestep_number() > self.params.max_no_timesteps
    }

    /// Solve, accept, output and (maybe) refine one step.
    pub fn step(&mut self) -> Result<StepRecord, RunError> {
        let step = self.state.timestep_number();
        let base = self.adapter.base_timestep(step);
        if self.comm.is_root() {
            info!("{}", self.banner(step, base));
        }
        self.state.begin_step(base);
        let mut record = StepRecord {
            step,
            ..StepRecord::default()
        };

        self.set_phase(Phase::Advancing);
        let started = Instant::now();
        let reduction = self.solve_step(&mut record)?;
        record.residual_reduction = reduction;
        self.metrics.solve_us += elapsed_us(started);

        self.set_phase(Phase::Accepted);
        record.time = self.state.time();
        record.timestep = self.state.current_timestep();
        let started = Instant::now();
        self.output_results(step)?;
        self.metrics.output_us += elapsed_us(started);
        self.state.accept();

        if let Some(refiner) = self.refiner {
            self.set_phase(Phase::Refining);
            let started = Instant::now();
            let outcome = refiner.evaluate_and_apply(
                self.mesh.as_mut(),
                &mut self.history,
                &mut self.solver,
                &self.state,
                self.comm.as_ref(),
            )?;
            self.metrics.refine_us += elapsed_us(started);
            if let Some(summary) = outcome {
                record.refined = true;
                if self.comm.is_root() {
                    info!(
                        "refined {} cells, {} active cells",
                        summary.refined,
                        self.mesh.n_global_active_cells()
                    );
                }
            }
        }
        record.active_cells = self.mesh.n_global_active_cells();

        self.metrics.record_step(&record);
        self.records.push(record.clone());
        self.set_phase(if self.is_finished() {
            Phase::Terminated
        } else {
            Phase::Advancing
        });
        Ok(record)
    }

    // Outer loop: agreed non-convergence restarts the whole attempt.
    fn solve_step(&mut self, record: &mut StepRecord) -> Result<f64, RunError> {
        loop {
            self.solver.record_old_solution();
            match self.attempt_with_residual_control(record) {
                Ok(reduction) => return Ok(reduction),
                Err(err) if err.is_recoverable() => {
                    if self.comm.is_root() {
                        warn!("Solver did not converge! Adjusting time step. ({err})");
                    }
                    self.solver.return_old_solution();
                    self.history.discard_staged();
                    let shrunk = self.adapter.shrink(&mut self.state);
                    if shrunk <= 0.0 {
                        return Err(err.into());
                    }
                    record.nonconvergence_retries += 1;
                    self.set_phase(Phase::Retrying);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // Inner loop: an excessive residual reduction shrinks and re-runs
    // until acceptable or below the floor.
    fn attempt_with_residual_control(
        &mut self,
        record: &mut StepRecord,
    ) -> Result<f64, SolveError> {
        let mut reduction = self.attempt()?;
        while self.adapter.needs_shrink(reduction) {
            let shrunk = self.adapter.shrink(&mut self.state);
            self.solver.return_old_solution();
            record.residual_retries += 1;
            self.set_phase(Phase::Retrying);
            debug!("residual reduction {reduction:e} too large, retrying with dt = {shrunk:e}");
            reduction = self.attempt()?;
            if self.adapter.below_floor(self.state.current_timestep()) {
                if self.comm.is_root() {
                    warn!("Step size too small - keeping the step size");
                }
                record.floor_reached = true;
                break;
            }
        }
        Ok(reduction)
    }

    fn attempt(&mut self) -> Result<f64, SolveError> {
        self.solver.attempt(
            self.mesh.as_ref(),
            &mut self.history,
            &self.state,
            self.comm.as_ref(),
        )
    }

    fn output_results(&mut self, step: u64) -> Result<(), RunError> {
        self.statistics.add_value("Step", step);
        self.statistics
            .set_format("Step", ColumnFormat::Fixed { precision: 1 });
        self.statistics.add_value("Time", self.state.time());
        self.statistics
            .set_format("Time", ColumnFormat::Scientific { precision: 8 });

        let rank = self.comm.rank();
        let mut fields = FieldOutput::new();
        fields.add_data_vector(
            "subdomain",
            vec![self.mesh.locally_owned_subdomain() as f64; self.mesh.n_locally_owned_cells()],
        );
        self.solver.output_results(&mut fields);
        self.sink.write_step(&StepOutput {
            step,
            time: self.state.time(),
            rank,
            fields: &fields,
            statistics: &self.statistics,
        })?;
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            trace!("phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Current phase of the state machine.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The clock.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Run parameters.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh.as_ref()
    }

    /// Point history of the owned cells.
    pub fn history(&self) -> &PointHistoryStore {
        &self.history
    }

    /// The coupled fields.
    pub fn solver(&self) -> &StaggeredSolver {
        &self.solver
    }

    /// Counters and timings so far.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Records of the accepted steps so far.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Statistics table so far.
    pub fn statistics(&self) -> &StatisticsTable {
        &self.statistics
    }
}

impl fmt::Debug for SimulationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationController")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("fields", &self.solver.kinds())
            .field("active_cells", &self.mesh.n_global_active_cells())
            .finish_non_exhaustive()
    }
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use stagger_test_utils::{line, ScriptedSolver};

    #[test]
    fn banner_shows_the_start_of_the_step() {
        let params = Parameters {
            dim: 1,
            timestep: 0.5,
            max_no_timesteps: 2,
            enable_phase_field: false,
            ..Parameters::default()
        };
        let config = SimulationConfig::new(params, ScriptedSolver::mechanical().boxed())
            .with_sink(Box::new(MemorySink::new()));
        let mut ctl = SimulationController::with_mesh(config, Box::new(line(2))).unwrap();
        assert_eq!(ctl.banner(1, 0.5), "timestep 1: t = 0e0, dt = 5e-1");

        ctl.step().unwrap();
        assert_eq!(ctl.banner(2, 0.5), "timestep 2: t = 5e-1, dt = 5e-1");
    }
}
