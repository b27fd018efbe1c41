//! Mesh input.
//!
//! [`read_mesh`] is the single entry point the simulation uses at
//! startup. It resolves the path before handing a buffered stream to a
//! [`MeshReader`], so a missing file always surfaces as
//! [`MeshError::FileNotFound`] regardless of the reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::MeshError;
use crate::grid::CellGrid;
use crate::mesh::Mesh;

/// Parses a mesh description into a partitioned mesh.
pub trait MeshReader: Send {
    /// Read a mesh from `input` and view it from `rank` of `n_ranks`.
    fn read(
        &self,
        input: &mut dyn BufRead,
        rank: usize,
        n_ranks: usize,
    ) -> Result<Box<dyn Mesh>, MeshError>;
}

/// Open `path` and parse it with `reader`.
///
/// Fails with [`MeshError::FileNotFound`] if `path` does not name a file.
pub fn read_mesh(
    reader: &dyn MeshReader,
    path: &Path,
    rank: usize,
    n_ranks: usize,
) -> Result<Box<dyn Mesh>, MeshError> {
    if !path.is_file() {
        return Err(MeshError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let mut input = BufReader::new(file);
    reader.read(&mut input, rank, n_ranks)
}

/// Reader for the keyword grid format producing a [`CellGrid`].
///
/// ```text
/// # notched plate
/// dim 2
/// cells 8 4
/// extent 2.0 1.0
/// origin -1.0 0.0
/// ```
///
/// `dim`, `cells` and `extent` are required; `origin` defaults to zero.
/// Everything after `#` on a line is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct GridFileReader;

impl GridFileReader {
    fn parse_values<T: std::str::FromStr>(
        line: usize,
        key: &str,
        tokens: &[&str],
    ) -> Result<Vec<T>, MeshError> {
        if tokens.is_empty() {
            return Err(MeshError::Parse {
                line,
                reason: format!("'{key}' needs at least one value"),
            });
        }
        tokens
            .iter()
            .map(|t| {
                t.parse::<T>().map_err(|_| MeshError::Parse {
                    line,
                    reason: format!("invalid value '{t}' for '{key}'"),
                })
            })
            .collect()
    }
}

impl MeshReader for GridFileReader {
    fn read(
        &self,
        input: &mut dyn BufRead,
        rank: usize,
        n_ranks: usize,
    ) -> Result<Box<dyn Mesh>, MeshError> {
        let mut dim: Option<usize> = None;
        let mut cells: Option<Vec<usize>> = None;
        let mut extent: Option<Vec<f64>> = None;
        let mut origin: Option<Vec<f64>> = None;

        for (index, raw) in input.lines().enumerate() {
            let raw = raw?;
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = content.split_whitespace().collect();
            let (key, values) = (tokens[0], &tokens[1..]);
            match key {
                "dim" => {
                    let parsed: Vec<usize> = Self::parse_values(line, key, values)?;
                    if parsed.len() != 1 {
                        return Err(MeshError::Parse {
                            line,
                            reason: "'dim' takes exactly one value".to_string(),
                        });
                    }
                    dim = Some(parsed[0]);
                }
                "cells" => cells = Some(Self::parse_values(line, key, values)?),
                "extent" => extent = Some(Self::parse_values(line, key, values)?),
                "origin" => origin = Some(Self::parse_values(line, key, values)?),
                other => {
                    return Err(MeshError::Parse {
                        line,
                        reason: format!("unknown keyword '{other}'"),
                    })
                }
            }
        }

        let missing = |key: &str| MeshError::Parse {
            line: 0,
            reason: format!("missing required '{key}' entry"),
        };
        let dim = dim.ok_or_else(|| missing("dim"))?;
        let cells = cells.ok_or_else(|| missing("cells"))?;
        let extent = extent.ok_or_else(|| missing("extent"))?;
        let origin = origin.unwrap_or_else(|| vec![0.0; dim]);

        let grid = CellGrid::hyper_rectangle_at(dim, &cells, &extent, &origin)?
            .partition(rank, n_ranks)?;
        Ok(Box::new(grid))
    }
}
