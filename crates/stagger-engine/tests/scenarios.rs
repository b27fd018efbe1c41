//! End-to-end timestep scenarios: plain stepping, non-convergence retry,
//! residual-driven shrink down to the floor, step-size switch, collective
//! agreement, configuration and mesh input failures.

use stagger_core::FieldKind;
use stagger_engine::{
    ConfigError, MemorySink, Parameters, Phase, RunError, SimulationConfig, SimulationController,
    StatisticsFileSink, TableValue,
};
use stagger_field::FieldSolver;
use stagger_mesh::{Mesh, MeshError};
use stagger_test_utils::{
    line, new_log, unit_square, Call, EventLog, Outcome, ScriptedSolver, SolverEvent, StubComm,
    TempDir,
};

fn params_1d(max_no_timesteps: u64) -> Parameters {
    Parameters {
        dim: 1,
        timestep: 0.1,
        max_no_timesteps,
        enable_phase_field: false,
        ..Parameters::default()
    }
}

/// Configuration that keeps output in memory instead of writing files.
fn in_memory(params: Parameters, mechanical: Box<dyn FieldSolver>) -> SimulationConfig {
    SimulationConfig::new(params, mechanical).with_sink(Box::new(MemorySink::new()))
}

fn controller(config: SimulationConfig) -> SimulationController {
    SimulationController::with_mesh(config, Box::new(line(4))).expect("controller")
}

fn events(log: &EventLog) -> Vec<SolverEvent> {
    log.lock().expect("log").clone()
}

fn updates(log: &EventLog) -> Vec<SolverEvent> {
    events(log)
        .into_iter()
        .filter(|e| e.call == Call::Update)
        .collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

// ── Scenario A ─────────────────────────────────────────────────────

#[test]
fn plain_run_advances_three_steps() {
    let sink = MemorySink::new();
    let config = in_memory(params_1d(3), ScriptedSolver::mechanical().boxed())
        .with_sink(Box::new(sink.clone()));
    let report = controller(config).run().unwrap();

    assert_eq!(report.final_state.timestep_number(), 4);
    assert!(close(report.final_state.time(), 0.3));
    assert_eq!(report.final_state.current_timestep(), 0.1);
    assert_eq!(report.records.len(), 3);
    assert!(report.records.iter().all(|r| r.retries() == 0));
    assert_eq!(report.metrics.accepted_steps, 3);
    assert_eq!(report.metrics.nonconvergence_retries, 0);
    assert_eq!(report.metrics.residual_retries, 0);

    let steps = sink.steps();
    assert_eq!(steps.len(), 3);
    assert!(sink.is_finished());
    assert_eq!(steps[0].fields.get("subdomain"), Some(&[0.0; 4][..]));
    assert!(steps[2].fields.get("elasticity").is_some());

    assert_eq!(
        report.statistics.column("Step"),
        Some(
            &[
                TableValue::Integer(1),
                TableValue::Integer(2),
                TableValue::Integer(3)
            ][..]
        )
    );
    match report.statistics.column("Time") {
        Some([TableValue::Float(t1), _, TableValue::Float(t3)]) => {
            assert!(close(*t1, 0.1));
            assert!(close(*t3, 0.3));
        }
        other => panic!("expected three Time rows, got {other:?}"),
    }
}

// ── Scenario B ─────────────────────────────────────────────────────

#[test]
fn nonconvergence_shrinks_and_restores_step() {
    let log = new_log();
    let mechanical = ScriptedSolver::mechanical()
        .with_script([Outcome::Diverge])
        .with_log(log.clone());
    let mut ctl = controller(in_memory(params_1d(2), mechanical.boxed()));

    let first = ctl.step().unwrap();
    assert_eq!(first.nonconvergence_retries, 1);
    assert_eq!(first.residual_retries, 0);
    assert_eq!(first.timestep, 0.1 / 10.0);
    assert_eq!(first.time, 0.1 / 10.0);
    assert_eq!(ctl.state().current_timestep(), 0.1);
    assert_eq!(ctl.phase(), Phase::Advancing);

    let second = ctl.step().unwrap();
    assert_eq!(second.timestep, 0.1);
    assert!(close(second.time, 0.11));
    assert_eq!(ctl.phase(), Phase::Terminated);

    let updates = updates(&log);
    assert_eq!(updates.len(), 3);
    let clocks: Vec<_> = updates.iter().map(|e| e.clock.unwrap()).collect();
    assert_eq!((clocks[0].time, clocks[0].timestep, clocks[0].step), (0.1, 0.1, 1));
    assert_eq!(
        (clocks[1].time, clocks[1].timestep, clocks[1].step),
        (0.1 / 10.0, 0.1 / 10.0, 1)
    );
    assert_eq!(clocks[2].step, 2);
    assert_eq!(clocks[2].timestep, 0.1);

    // The retried attempt starts from the pre-attempt snapshot, not the
    // poisoned solution of the failed one.
    assert_eq!(updates[1].solution, vec![0.0; 4]);

    let solution = ctl.solver().mechanical().state().solution().to_vec();
    assert!(solution.iter().all(|&u| close(u, 0.11)));
}

#[test]
fn retry_rerecords_old_solution() {
    let log = new_log();
    let mechanical = ScriptedSolver::mechanical()
        .with_script([Outcome::Diverge])
        .with_log(log.clone());
    let mut ctl = controller(in_memory(params_1d(1), mechanical.boxed()));
    ctl.step().unwrap();

    let calls: Vec<Call> = events(&log)
        .into_iter()
        .map(|e| e.call)
        .filter(|c| *c != Call::Limit)
        .collect();
    assert_eq!(
        calls,
        vec![
            Call::Setup,
            Call::Record,
            Call::Update,
            Call::Return,
            Call::Record,
            Call::Update
        ]
    );
}

#[test]
fn diverged_history_is_never_committed() {
    let mechanical = ScriptedSolver::mechanical().with_script([Outcome::Diverge]);
    let mut ctl = controller(in_memory(params_1d(1), mechanical.boxed()));
    ctl.step().unwrap();

    let history = ctl.history();
    assert_eq!(history.len(), 4 * 2);
    for cell in ctl.mesh().locally_owned_cells() {
        for point in history.cell(cell).unwrap() {
            assert_eq!(point.values(), &[0.1 / 10.0]);
        }
    }
}

// ── Scenario C ─────────────────────────────────────────────────────

#[test]
fn excessive_residual_shrinks_down_to_floor() {
    let params = Parameters {
        upper_newton_rho: 1.0,
        min_timestep: 1e-9,
        ..params_1d(1)
    };
    let mechanical = ScriptedSolver::mechanical().with_fallback(Outcome::Converge(2.0));
    let report = controller(in_memory(params, mechanical.boxed())).run().unwrap();

    let mut expected_dt = 0.1;
    let mut expected_retries = 0;
    loop {
        expected_dt /= 10.0;
        expected_retries += 1;
        if expected_dt < 1e-9 {
            break;
        }
    }

    let record = &report.records[0];
    assert!(record.floor_reached);
    assert_eq!(record.residual_retries, expected_retries);
    assert_eq!(record.nonconvergence_retries, 0);
    assert_eq!(record.timestep, expected_dt);
    assert_eq!(record.time, expected_dt);
    assert_eq!(record.residual_reduction, 2.0);
    assert_eq!(report.metrics.forced_acceptances, 1);
    assert_eq!(report.final_state.current_timestep(), 0.1);
}

#[test]
fn residual_loop_uses_the_rerun_value() {
    let params = Parameters {
        upper_newton_rho: 1.0,
        ..params_1d(1)
    };
    let mechanical = ScriptedSolver::mechanical()
        .with_script([Outcome::Converge(2.0), Outcome::Converge(0.5)]);
    let report = controller(in_memory(params, mechanical.boxed())).run().unwrap();

    let record = &report.records[0];
    assert_eq!(record.residual_retries, 1);
    assert!(!record.floor_reached);
    assert_eq!(record.residual_reduction, 0.5);
    assert_eq!(record.timestep, 0.1 / 10.0);
}

#[test]
fn divergence_inside_residual_retry_falls_back_to_outer_loop() {
    let params = Parameters {
        upper_newton_rho: 1.0,
        ..params_1d(1)
    };
    let mechanical = ScriptedSolver::mechanical()
        .with_script([Outcome::Converge(2.0), Outcome::Diverge]);
    let report = controller(in_memory(params, mechanical.boxed())).run().unwrap();

    let record = &report.records[0];
    assert_eq!(record.residual_retries, 1);
    assert_eq!(record.nonconvergence_retries, 1);
    assert_eq!(record.timestep, 0.1 / 10.0 / 10.0);
}

// ── Step-size switch ───────────────────────────────────────────────

#[test]
fn secondary_step_applies_after_switch() {
    let params = Parameters {
        timestep_size_2: 0.05,
        switch_timestep: 2,
        ..params_1d(4)
    };
    let mechanical = ScriptedSolver::mechanical();
    let report = controller(in_memory(params, mechanical.boxed())).run().unwrap();
    let steps: Vec<f64> = report.records.iter().map(|r| r.timestep).collect();
    assert_eq!(steps, vec![0.1, 0.1, 0.05, 0.05]);
    assert!(close(report.final_state.time(), 0.3));
}

// ── Staggered order ────────────────────────────────────────────────

#[test]
fn phase_field_is_solved_first_and_max_reduction_wins() {
    let log = new_log();
    let params = Parameters {
        enable_phase_field: true,
        enable_refinement: false,
        ..params_1d(1)
    };
    let phase = ScriptedSolver::phase_field()
        .with_script([Outcome::Converge(0.3)])
        .with_log(log.clone());
    let mechanical = ScriptedSolver::mechanical()
        .with_script([Outcome::Converge(0.6)])
        .with_log(log.clone());
    let config = in_memory(params, mechanical.boxed()).with_phase_field(phase.boxed());
    let report = controller(config).run().unwrap();

    assert_eq!(report.records[0].residual_reduction, 0.6);
    let sweep: Vec<(FieldKind, Call)> = events(&log)
        .into_iter()
        .filter(|e| matches!(e.call, Call::Update | Call::Limit))
        .map(|e| (e.field, e.call))
        .collect();
    assert_eq!(
        sweep,
        vec![
            (FieldKind::PhaseField, Call::Update),
            (FieldKind::PhaseField, Call::Limit),
            (FieldKind::Mechanical, Call::Update),
            (FieldKind::Mechanical, Call::Limit),
        ]
    );
}

#[test]
fn phase_field_divergence_skips_mechanical_update() {
    let log = new_log();
    let params = Parameters {
        enable_phase_field: true,
        enable_refinement: false,
        ..params_1d(1)
    };
    let phase = ScriptedSolver::phase_field()
        .with_script([Outcome::Diverge])
        .with_log(log.clone());
    let mechanical = ScriptedSolver::mechanical().with_log(log.clone());
    let config = in_memory(params, mechanical.boxed()).with_phase_field(phase.boxed());
    let report = controller(config).run().unwrap();

    assert_eq!(report.records[0].nonconvergence_retries, 1);
    let order: Vec<FieldKind> = updates(&log).into_iter().map(|e| e.field).collect();
    assert_eq!(
        order,
        vec![
            FieldKind::PhaseField,
            FieldKind::PhaseField,
            FieldKind::Mechanical
        ]
    );
}

// ── Collective agreement ───────────────────────────────────────────

#[test]
fn divergence_on_another_rank_retries_everywhere() {
    let params = Parameters {
        enable_refinement: false,
        ..params_1d(1)
    };
    let comm = StubComm::new(0, 2).with_peer_sums([1]);
    let config = in_memory(params, ScriptedSolver::mechanical().boxed())
        .with_comm(Box::new(comm.clone()));
    let report = controller(config).run().unwrap();

    assert_eq!(report.records[0].nonconvergence_retries, 1);
    assert_eq!(report.records[0].timestep, 0.1 / 10.0);
    assert_eq!(comm.n_sums(), 2);
}

#[test]
fn peer_residual_drives_the_shrink() {
    let params = Parameters {
        enable_refinement: false,
        upper_newton_rho: 1.0,
        ..params_1d(1)
    };
    let comm = StubComm::new(0, 2).with_peer_max(5.0);
    let config = in_memory(params, ScriptedSolver::mechanical().boxed())
        .with_comm(Box::new(comm));
    let report = controller(config).run().unwrap();

    let record = &report.records[0];
    assert!(record.floor_reached);
    assert_eq!(record.residual_reduction, 5.0);
}

#[test]
fn vote_is_collective_every_step() {
    let comm = StubComm::serial();
    let config = in_memory(params_1d(3), ScriptedSolver::mechanical().boxed())
        .with_comm(Box::new(comm.clone()));
    controller(config).run().unwrap();
    // One divergence vote and one refinement vote per step.
    assert_eq!(comm.n_sums(), 6);
}

// ── Construction ───────────────────────────────────────────────────

#[test]
fn missing_mesh_fails_before_any_solve() {
    let log = new_log();
    let params = Parameters {
        mesh_from: "/definitely/not/here/mesh.grid".into(),
        ..params_1d(3)
    };
    let mechanical = ScriptedSolver::mechanical().with_log(log.clone());
    match SimulationController::new(in_memory(params, mechanical.boxed())) {
        Err(RunError::Mesh(MeshError::FileNotFound { path })) => {
            assert!(path.ends_with("mesh.grid"));
        }
        other => panic!("expected FileNotFound, got {other:?}"),
    }
    assert!(events(&log).is_empty());
}

#[test]
fn mesh_file_is_read_and_partitioned() {
    let dir = TempDir::new("scenario-mesh");
    let mesh_from = dir.write("bar.grid", "# bar\ndim 1\ncells 8\nextent 2.0\n");
    let params = Parameters {
        mesh_from,
        ..params_1d(2)
    };
    let config = in_memory(params, ScriptedSolver::mechanical().boxed())
        .with_comm(Box::new(StubComm::new(1, 2)));
    let ctl = SimulationController::new(config).unwrap();
    assert_eq!(ctl.mesh().n_global_active_cells(), 8);
    assert_eq!(ctl.mesh().n_locally_owned_cells(), 4);
    assert_eq!(ctl.history().len(), 4 * 2);
    assert_eq!(ctl.solver().mechanical().state().n_dofs(), 4);
    let report = ctl.run().unwrap();
    assert_eq!(report.final_state.timestep_number(), 3);
}

#[test]
fn mesh_dimension_must_match() {
    let params = Parameters {
        dim: 2,
        ..params_1d(1)
    };
    let config = in_memory(params, ScriptedSolver::mechanical().boxed());
    match SimulationController::with_mesh(config, Box::new(line(2))) {
        Err(RunError::Mesh(MeshError::InvalidDimension { dim: 1 })) => {}
        other => panic!("expected InvalidDimension, got {other:?}"),
    }
}

#[test]
fn enabled_phase_field_requires_a_solver() {
    let params = Parameters {
        enable_phase_field: true,
        ..params_1d(1)
    };
    let config = in_memory(params, ScriptedSolver::mechanical().boxed());
    match SimulationController::with_mesh(config, Box::new(line(2))) {
        Err(RunError::Config(ConfigError::MissingPhaseField)) => {}
        other => panic!("expected MissingPhaseField, got {other:?}"),
    }
}

#[test]
fn solver_slots_are_checked() {
    let config = in_memory(params_1d(1), ScriptedSolver::phase_field().boxed());
    assert_eq!(
        config.validate(),
        Err(ConfigError::FieldKindMismatch {
            expected: FieldKind::Mechanical,
            actual: FieldKind::PhaseField,
        })
    );
}

#[test]
fn disabled_phase_field_solver_is_dropped() {
    let config = in_memory(params_1d(1), ScriptedSolver::mechanical().boxed())
        .with_phase_field(ScriptedSolver::phase_field().boxed());
    let ctl = controller(config);
    assert!(ctl.solver().phase_field().is_none());
    assert_eq!(ctl.solver().kinds().as_slice(), &[FieldKind::Mechanical]);
}

// ── Output ─────────────────────────────────────────────────────────

#[test]
fn statistics_file_is_rewritten_each_step() {
    let dir = TempDir::new("scenario-stats");
    let sink = StatisticsFileSink::new(dir.path());
    let path = sink.path();
    let config = in_memory(params_1d(3), ScriptedSolver::mechanical().boxed())
        .with_sink(Box::new(sink));
    controller(config).run().unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Step Time");
    assert!(lines[1].starts_with("1 1.00000000e-1"));
}

#[test]
fn default_output_goes_to_the_output_directory() {
    let dir = TempDir::new("scenario-default-sink");
    let output_dir = dir.path().join("results");
    let params = Parameters {
        output_dir: output_dir.clone(),
        ..params_1d(2)
    };
    let config = SimulationConfig::new(params, ScriptedSolver::mechanical().boxed());
    controller(config).run().unwrap();

    let text = std::fs::read_to_string(output_dir.join(StatisticsFileSink::FILE_NAME)).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().nth(2).unwrap().starts_with("2 2.00000000e-1"));
}

#[test]
fn partitioned_output_reports_subdomain() {
    let sink = MemorySink::new();
    let params = Parameters {
        dim: 2,
        ..params_1d(1)
    };
    let mesh = unit_square(2).partition(1, 2).unwrap();
    let config = in_memory(params, ScriptedSolver::mechanical().boxed())
        .with_comm(Box::new(StubComm::new(1, 2)))
        .with_sink(Box::new(sink.clone()));
    SimulationController::with_mesh(config, Box::new(mesh))
        .unwrap()
        .run()
        .unwrap();

    let steps = sink.steps();
    assert_eq!(steps[0].fields.get("subdomain"), Some(&[1.0, 1.0][..]));
}
