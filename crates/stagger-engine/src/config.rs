//! Run configuration, validation, and error types.
//!
//! [`Parameters`] is the plain-value part of a run; [`SimulationConfig`]
//! adds the boxed collaborators. [`validate()`](SimulationConfig::validate)
//! checks structural invariants before the controller touches the mesh.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use stagger_core::{Communicator, FieldKind, SerialComm};
use stagger_field::FieldSolver;
use stagger_mesh::{GridFileReader, MeshReader};

use crate::output::{OutputSink, StatisticsFileSink};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`Parameters::validate()`] and
/// [`SimulationConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Spatial dimension outside `1..=3`.
    InvalidDimension {
        /// The configured dimension.
        dim: usize,
    },
    /// A floating-point parameter is NaN or infinite.
    NonFinite {
        /// Parameter name.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// A parameter that must be strictly positive is not.
    NonPositive {
        /// Parameter name.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// `max_no_timesteps` is zero.
    NoTimesteps,
    /// `poly_degree` is zero.
    InvalidPolyDegree {
        /// The configured degree.
        degree: u32,
    },
    /// The phase field is enabled but no phase-field solver was supplied.
    MissingPhaseField,
    /// A solver was supplied in the slot of a different field.
    FieldKindMismatch {
        /// Field the slot expects.
        expected: FieldKind,
        /// Field the solver reports.
        actual: FieldKind,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimension { dim } => write!(f, "dimension {dim} is not in 1..=3"),
            Self::NonFinite { name, value } => write!(f, "{name} must be finite, got {value}"),
            Self::NonPositive { name, value } => {
                write!(f, "{name} must be positive, got {value}")
            }
            Self::NoTimesteps => write!(f, "max_no_timesteps must be at least 1"),
            Self::InvalidPolyDegree { degree } => {
                write!(f, "poly_degree must be at least 1, got {degree}")
            }
            Self::MissingPhaseField => {
                write!(f, "phase field is enabled but no phase-field solver was supplied")
            }
            Self::FieldKindMismatch { expected, actual } => {
                write!(f, "expected a {expected} solver, got a {actual} solver")
            }
        }
    }
}

impl Error for ConfigError {}

// ── Parameters ─────────────────────────────────────────────────────

/// Plain-value run parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    /// Project name, reported in the run header.
    pub project_name: String,
    /// Path of the mesh description.
    pub mesh_from: PathBuf,
    /// Directory output sinks write into.
    pub output_dir: PathBuf,
    /// Spatial dimension, `1..=3`. Default: 2.
    pub dim: usize,
    /// Base step size. Default: 1e-2.
    pub timestep: f64,
    /// Base step size after `switch_timestep`. Default: 1e-3.
    pub timestep_size_2: f64,
    /// Step number after which `timestep_size_2` applies; 0 disables the switch.
    pub switch_timestep: u64,
    /// Number of steps to run. Default: 10.
    pub max_no_timesteps: u64,
    /// Combined residual reduction above which a step is shrunk and re-run.
    /// Default: 0.999.
    pub upper_newton_rho: f64,
    /// Step size below which a step is accepted despite a poor residual.
    /// Default: 1e-9.
    pub min_timestep: f64,
    /// Solve the phase field before the mechanical field. Default: true.
    pub enable_phase_field: bool,
    /// Evaluate the refinement criterion after each accepted step. Default: true.
    pub enable_refinement: bool,
    /// Initial influence decay `a1` of the refinement threshold.
    pub refine_influence_initial: f64,
    /// Final influence decay `a2` of the refinement threshold.
    pub refine_influence_final: f64,
    /// Phase-field length scale `l_phi`.
    pub length_scale: f64,
    /// Cells smaller than `length_scale * refine_minimum_size_ratio` are never refined.
    pub refine_minimum_size_ratio: f64,
    /// Polynomial degree of the finite elements. Default: 1.
    pub poly_degree: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            project_name: "stagger".to_string(),
            mesh_from: PathBuf::from("mesh.grid"),
            output_dir: PathBuf::from("output"),
            dim: 2,
            timestep: 1e-2,
            timestep_size_2: 1e-3,
            switch_timestep: 0,
            max_no_timesteps: 10,
            upper_newton_rho: 0.999,
            min_timestep: 1e-9,
            enable_phase_field: true,
            enable_refinement: true,
            refine_influence_initial: 1.0,
            refine_influence_final: 2.0,
            length_scale: 1e-2,
            refine_minimum_size_ratio: 0.5,
            poly_degree: 1,
        }
    }
}

impl Parameters {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.dim) {
            return Err(ConfigError::InvalidDimension { dim: self.dim });
        }
        let positive = [
            ("timestep", self.timestep),
            ("timestep_size_2", self.timestep_size_2),
            ("upper_newton_rho", self.upper_newton_rho),
            ("min_timestep", self.min_timestep),
            ("length_scale", self.length_scale),
        ];
        for (name, value) in positive {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        let finite = [
            ("refine_influence_initial", self.refine_influence_initial),
            ("refine_influence_final", self.refine_influence_final),
            ("refine_minimum_size_ratio", self.refine_minimum_size_ratio),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        if self.max_no_timesteps == 0 {
            return Err(ConfigError::NoTimesteps);
        }
        if self.poly_degree == 0 {
            return Err(ConfigError::InvalidPolyDegree {
                degree: self.poly_degree,
            });
        }
        Ok(())
    }

    /// Quadrature points per cell of the tensor Gauss rule of order `poly_degree + 1`.
    pub fn quadrature_points_per_cell(&self) -> usize {
        (self.poly_degree as usize + 1).pow(self.dim as u32)
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Complete configuration for constructing a
/// [`SimulationController`](crate::SimulationController).
pub struct SimulationConfig {
    /// Plain-value parameters.
    pub params: Parameters,
    /// Solver of the mechanical field. Always required.
    pub mechanical: Box<dyn FieldSolver>,
    /// Solver of the phase field; required when `params.enable_phase_field` is set.
    pub phase_field: Option<Box<dyn FieldSolver>>,
    /// Collective operations across ranks. Default: [`SerialComm`].
    pub comm: Box<dyn Communicator>,
    /// Mesh input. Default: [`GridFileReader`].
    pub mesh_reader: Box<dyn MeshReader>,
    /// Receives every accepted step. Default: a [`StatisticsFileSink`]
    /// writing into `params.output_dir`; use
    /// [`MemorySink`](crate::MemorySink) to keep output in memory.
    pub sink: Box<dyn OutputSink>,
}

impl SimulationConfig {
    /// Single-rank configuration with default collaborators.
    pub fn new(params: Parameters, mechanical: Box<dyn FieldSolver>) -> Self {
        let sink = StatisticsFileSink::new(params.output_dir.clone());
        Self {
            params,
            mechanical,
            phase_field: None,
            comm: Box::new(SerialComm),
            mesh_reader: Box::new(GridFileReader),
            sink: Box::new(sink),
        }
    }

    /// Attach a phase-field solver.
    pub fn with_phase_field(mut self, phase_field: Box<dyn FieldSolver>) -> Self {
        self.phase_field = Some(phase_field);
        self
    }

    /// Replace the communicator.
    pub fn with_comm(mut self, comm: Box<dyn Communicator>) -> Self {
        self.comm = comm;
        self
    }

    /// Replace the mesh reader.
    pub fn with_mesh_reader(mut self, reader: Box<dyn MeshReader>) -> Self {
        self.mesh_reader = reader;
        self
    }

    /// Replace the output sink.
    pub fn with_sink(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate parameters and the solver slots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        let actual = self.mechanical.kind();
        if actual != FieldKind::Mechanical {
            return Err(ConfigError::FieldKindMismatch {
                expected: FieldKind::Mechanical,
                actual,
            });
        }
        match &self.phase_field {
            Some(solver) if solver.kind() != FieldKind::PhaseField => {
                Err(ConfigError::FieldKindMismatch {
                    expected: FieldKind::PhaseField,
                    actual: solver.kind(),
                })
            }
            None if self.params.enable_phase_field => Err(ConfigError::MissingPhaseField),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationConfig")
            .field("params", &self.params)
            .field("mechanical", &self.mechanical.name())
            .field(
                "phase_field",
                &self.phase_field.as_ref().map(|p| p.name().to_string()),
            )
            .field("ranks", &self.comm.size())
            .finish_non_exhaustive()
    }
}
