//! Error types for mesh construction, input and queries.

use std::fmt;
use std::io;
use std::path::PathBuf;

use stagger_core::CellId;

/// Errors arising from mesh input, construction or cell queries.
#[derive(Debug)]
pub enum MeshError {
    /// The mesh description path does not resolve to a file.
    ///
    /// Fatal at startup: no timestep loop is entered.
    FileNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },
    /// An I/O error occurred while reading the mesh description.
    Io(io::Error),
    /// The mesh description could not be parsed.
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// Spatial dimension outside `1..=3`, or inconsistent with the input.
    InvalidDimension {
        /// The offending dimension.
        dim: usize,
    },
    /// Attempted to construct a mesh with zero cells or a degenerate extent.
    EmptyMesh,
    /// The coarse grid would hold more cells than a single mesh supports.
    TooManyCells {
        /// The largest supported coarse cell count.
        limit: usize,
    },
    /// Invalid rank layout (`rank >= n_ranks` or `n_ranks == 0`).
    InvalidPartition {
        /// The requested rank.
        rank: usize,
        /// The requested number of ranks.
        n_ranks: usize,
    },
    /// A cell id does not name an active cell of this mesh.
    UnknownCell {
        /// The offending id.
        cell: CellId,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound { path } => {
                write!(f, "mesh file does not exist: {}", path.display())
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse { line, reason } => write!(f, "line {line}: {reason}"),
            Self::InvalidDimension { dim } => {
                write!(f, "dimension {dim} is not supported (expected 1, 2 or 3)")
            }
            Self::EmptyMesh => write!(f, "mesh must have at least one cell"),
            Self::TooManyCells { limit } => {
                write!(f, "coarse grid exceeds the limit of {limit} cells")
            }
            Self::InvalidPartition { rank, n_ranks } => {
                write!(f, "rank {rank} is not valid for {n_ranks} rank(s)")
            }
            Self::UnknownCell { cell } => write!(f, "cell {cell} is not an active cell"),
        }
    }
}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MeshError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
