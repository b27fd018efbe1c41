//! Reusable field-solver and mesh fixtures.
//!
//! - [`ScriptedSolver`]: one degree of freedom per owned cell, outcomes
//!   scripted per update, every lifecycle call logged.
//! - [`line`] / [`unit_square`]: small reference grids.
//! - [`TempDir`]: scratch directory removed on drop.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stagger_core::{CellId, FieldKind, Gradient, SolveError, TransferError};
use stagger_field::{
    CellValues, FieldContext, FieldOutput, FieldSolver, FieldState, FieldTransfer, SolveStatus,
};
use stagger_mesh::{CellGrid, Mesh};

use crate::lock;

// ── ScriptedSolver ─────────────────────────────────────────────────

/// Outcome of one scripted update.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Converge with this residual reduction.
    Converge(f64),
    /// Diverge on this rank.
    Diverge,
}

/// Lifecycle call observed by a [`ScriptedSolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Setup,
    Record,
    Return,
    Update,
    Limit,
    PrepareRefine,
    PostRefine,
}

/// Clock seen by a call that received a [`FieldContext`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventClock {
    pub time: f64,
    pub timestep: f64,
    pub step: u64,
}

/// One logged call.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverEvent {
    pub field: FieldKind,
    pub call: Call,
    pub clock: Option<EventClock>,
    /// Solution when the call started.
    pub solution: Vec<f64>,
}

/// Event log shared between solvers and the test body.
pub type EventLog = Arc<Mutex<Vec<SolverEvent>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

type GradientProfile = Arc<dyn Fn([f64; 3]) -> Gradient + Send + Sync>;

/// Field solver with one degree of freedom per owned cell.
///
/// A converged update adds the step size to every degree of freedom and
/// stages the attempt's end time into every point-history entry, so
/// after `n` accepted steps the solution equals the accepted time. A
/// diverged update poisons the solution with NaN and stages `-1.0`,
/// which a correct rollback never lets through.
pub struct ScriptedSolver {
    kind: FieldKind,
    state: FieldState,
    script: VecDeque<Outcome>,
    fallback: Outcome,
    log: EventLog,
    gradient: Option<GradientProfile>,
}

impl ScriptedSolver {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            state: FieldState::default(),
            script: VecDeque::new(),
            fallback: Outcome::Converge(0.0),
            log: new_log(),
            gradient: None,
        }
    }

    pub fn mechanical() -> Self {
        Self::new(FieldKind::Mechanical)
    }

    pub fn phase_field() -> Self {
        Self::new(FieldKind::PhaseField)
    }

    /// Outcomes of the first updates, in order.
    pub fn with_script(mut self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.extend(outcomes);
        self
    }

    /// Outcome once the script is exhausted. Default: `Converge(0.0)`.
    pub fn with_fallback(mut self, outcome: Outcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Log into a shared log instead of a private one.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    /// Gradient reported at each cell center.
    pub fn with_gradient(
        mut self,
        profile: impl Fn([f64; 3]) -> Gradient + Send + Sync + 'static,
    ) -> Self {
        self.gradient = Some(Arc::new(profile));
        self
    }

    pub fn log(&self) -> EventLog {
        Arc::clone(&self.log)
    }

    pub fn boxed(self) -> Box<dyn FieldSolver> {
        Box::new(self)
    }

    fn push(&self, call: Call, ctx: Option<&FieldContext<'_>>) {
        lock(&self.log).push(SolverEvent {
            field: self.kind,
            call,
            clock: ctx.map(|c| EventClock {
                time: c.time(),
                timestep: c.timestep(),
                step: c.timestep_number(),
            }),
            solution: self.state.solution().to_vec(),
        });
    }

    fn stage_history(ctx: &mut FieldContext<'_>, value: f64) {
        let cells = ctx.mesh().locally_owned_cells();
        let history = ctx.history_mut();
        for cell in cells {
            if let Some(points) = history.cell_mut(cell) {
                for point in points {
                    point.stage(&[value]);
                }
            }
        }
    }
}

impl FieldSolver for ScriptedSolver {
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn state(&self) -> &FieldState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FieldState {
        &mut self.state
    }

    fn setup_system(&mut self, ctx: &mut FieldContext<'_>) -> Result<(), SolveError> {
        self.push(Call::Setup, Some(&*ctx));
        self.state.reinit(ctx.mesh().n_locally_owned_cells());
        Ok(())
    }

    fn record_old_solution(&mut self) {
        self.push(Call::Record, None);
        self.state.record();
    }

    fn return_old_solution(&mut self) {
        self.push(Call::Return, None);
        self.state.restore();
    }

    fn update(&mut self, ctx: &mut FieldContext<'_>) -> SolveStatus {
        self.push(Call::Update, Some(&*ctx));
        let outcome = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match outcome {
            Outcome::Converge(reduction) => {
                let dt = ctx.timestep();
                for u in self.state.solution_mut() {
                    *u += dt;
                }
                let time = ctx.time();
                Self::stage_history(ctx, time);
                SolveStatus::converged(reduction)
            }
            Outcome::Diverge => {
                self.state.solution_mut().fill(f64::NAN);
                Self::stage_history(ctx, -1.0);
                SolveStatus::diverged("scripted divergence")
            }
        }
    }

    fn enforce_limitation(&mut self, ctx: &mut FieldContext<'_>) {
        self.push(Call::Limit, Some(&*ctx));
    }

    fn prepare_refine(&self, mesh: &dyn Mesh) -> FieldTransfer {
        self.push(Call::PrepareRefine, None);
        let mut values = self.state.solution().iter().copied();
        let captured = CellValues::capture(mesh, |_| values.next().unwrap_or(f64::NAN));
        FieldTransfer::new(self.kind, captured)
    }

    fn post_refine(
        &mut self,
        transfer: FieldTransfer,
        ctx: &mut FieldContext<'_>,
    ) -> Result<(), TransferError> {
        self.push(Call::PostRefine, Some(&*ctx));
        let captured: CellValues<f64> = transfer.into_payload(self.kind)?;
        let solution = captured.relocate(ctx.mesh())?;
        let expected = ctx.mesh().n_locally_owned_cells();
        if solution.len() != expected {
            return Err(TransferError::CountMismatch {
                expected,
                actual: solution.len(),
            });
        }
        self.state.replace(solution);
        Ok(())
    }

    fn output_results(&self, out: &mut FieldOutput) {
        out.add_data_vector(self.kind.label(), self.state.solution().to_vec());
    }

    fn quadrature_gradients(&self, mesh: &dyn Mesh, cell: CellId, out: &mut Vec<Gradient>) {
        if let (Some(profile), Some(center)) = (&self.gradient, mesh.center(cell)) {
            out.push(profile(center));
        }
    }
}

// ── Grids ──────────────────────────────────────────────────────────

/// `n` unit cells on `[0, n]`.
pub fn line(n: usize) -> CellGrid {
    CellGrid::hyper_rectangle(1, &[n], &[n as f64]).expect("valid line grid")
}

/// `n x n` cells on the unit square.
pub fn unit_square(n: usize) -> CellGrid {
    CellGrid::hyper_rectangle(2, &[n, n], &[1.0, 1.0]).expect("valid square grid")
}

// ── TempDir ────────────────────────────────────────────────────────

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// Scratch directory under the system temp dir, removed on drop.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(tag: &str) -> Self {
        let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let path =
            std::env::temp_dir().join(format!("stagger-{tag}-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `contents` to `name` inside the directory and return its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let file = self.path.join(name);
        std::fs::write(&file, contents).expect("write temp file");
        file
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
