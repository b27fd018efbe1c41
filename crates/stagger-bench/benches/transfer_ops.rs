//! Criterion micro-benchmarks for refinement marking and state migration.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use stagger_bench::{FrontField, RelaxationField};
use stagger_core::SerialComm;
use stagger_engine::{MeshRefiner, SimulationState, StaggeredSolver, StateTransferManager};
use stagger_field::PointHistoryStore;
use stagger_mesh::{CellGrid, Mesh};

struct Setup {
    grid: CellGrid,
    history: PointHistoryStore,
    solver: StaggeredSolver,
    state: SimulationState,
}

/// 64x64 grid, four points per cell, both fields set up, front at `x = 0.5`.
fn setup() -> Setup {
    let grid = CellGrid::hyper_rectangle(2, &[64, 64], &[1.0, 1.0]).unwrap();
    let mut history = PointHistoryStore::new(4);
    history.initialize(&grid);
    let mut solver = StaggeredSolver::new(
        Box::new(RelaxationField::default()),
        Some(Box::new(FrontField::new(0.05, 0.5, 0.0))),
    );
    let state = SimulationState::new(0.1);
    solver.setup_system(&grid, &mut history, &state).unwrap();
    Setup {
        grid,
        history,
        solver,
        state,
    }
}

/// Benchmark: mark and vote on a 4K-cell grid around the front.
fn bench_vote_4k(c: &mut Criterion) {
    let refiner = MeshRefiner::new(10.0, 1e-3);
    let comm = SerialComm;

    c.bench_function("vote_4k", |b| {
        b.iter_batched(
            setup,
            |mut s| {
                let refine = refiner
                    .vote(&mut s.grid, s.solver.phase_field(), &comm)
                    .unwrap();
                std::hint::black_box(refine);
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark: refine half of a 4K-cell grid and migrate history and both fields.
fn bench_refine_half_4k(c: &mut Criterion) {
    c.bench_function("refine_half_4k", |b| {
        b.iter_batched(
            || {
                let mut s = setup();
                for cell in s.grid.locally_owned_cells().into_iter().step_by(2) {
                    s.grid.set_refine_flag(cell).unwrap();
                }
                s
            },
            |mut s| {
                let summary = StateTransferManager
                    .refine(&mut s.grid, &mut s.history, &mut s.solver, &s.state)
                    .unwrap();
                std::hint::black_box(summary);
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark: one staggered attempt over both fields on 4K cells.
fn bench_attempt_4k(c: &mut Criterion) {
    let mut s = setup();
    let comm = SerialComm;

    c.bench_function("attempt_4k", |b| {
        b.iter(|| {
            s.solver.record_old_solution();
            let reduction = s
                .solver
                .attempt(&s.grid, &mut s.history, &s.state, &comm)
                .unwrap();
            std::hint::black_box(reduction);
        });
    });
}

criterion_group!(benches, bench_vote_4k, bench_refine_half_4k, bench_attempt_4k);
criterion_main!(benches);
