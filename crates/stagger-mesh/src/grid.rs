//! Hierarchical Cartesian grid with block partitioning.

use indexmap::IndexMap;
use smallvec::SmallVec;
use stagger_core::CellId;

use crate::error::MeshError;
use crate::mesh::{Mesh, RefinementSummary};

/// Largest coarse cell count [`CellGrid::hyper_rectangle`] accepts.
pub const MAX_COARSE_CELLS: usize = 1 << 24;

#[derive(Clone, Debug)]
struct Cell {
    origin: [f64; 3],
    extent: [f64; 3],
    level: u8,
    owner: usize,
    parent: Option<CellId>,
    refine: bool,
}

/// An axis-aligned hierarchical grid in one to three dimensions.
///
/// The coarse grid is a tensor-product subdivision of a box. Refining a
/// cell bisects it along every axis, replacing it with `2^dim` children
/// at the position it occupied in the cell order. Cells are split across
/// ranks in contiguous blocks of the coarse order; children inherit
/// their parent's owner, so refinement never migrates data between ranks.
///
/// Every rank holds the full cell list; ownership decides which cells a
/// rank solves for and stores history on. Only the local rank's
/// refinements are applied to that list, so after a cycle in which
/// peers refined, [`Mesh::n_global_active_cells`] counts the peers'
/// cells at their pre-refinement level and can differ between ranks.
///
/// # Examples
///
/// ```
/// use stagger_mesh::{CellGrid, Mesh};
///
/// let mut grid = CellGrid::hyper_rectangle(2, &[2, 2], &[1.0, 1.0]).unwrap();
/// assert_eq!(grid.n_global_active_cells(), 4);
///
/// let first = grid.locally_owned_cells()[0];
/// grid.set_refine_flag(first).unwrap();
/// let summary = grid.execute_coarsening_and_refinement();
/// assert_eq!(summary.created, 4);
/// assert_eq!(grid.n_global_active_cells(), 7);
/// ```
#[derive(Clone, Debug)]
pub struct CellGrid {
    dim: usize,
    rank: usize,
    n_ranks: usize,
    cells: IndexMap<CellId, Cell>,
    next_id: u64,
    generation: u64,
}

impl CellGrid {
    /// Deepest refinement level a cell may reach; marks beyond it are dropped.
    pub const MAX_LEVEL: u8 = 24;

    /// Build a `dim`-dimensional box `[0, extent]` split into `subdivisions` cells per axis.
    ///
    /// The grid starts as a single-rank partition; call
    /// [`partition`](CellGrid::partition) to distribute it.
    pub fn hyper_rectangle(
        dim: usize,
        subdivisions: &[usize],
        extent: &[f64],
    ) -> Result<Self, MeshError> {
        Self::hyper_rectangle_at(dim, subdivisions, extent, &[0.0; 3][..dim.min(3)])
    }

    /// Like [`hyper_rectangle`](CellGrid::hyper_rectangle) with an explicit lower corner.
    pub fn hyper_rectangle_at(
        dim: usize,
        subdivisions: &[usize],
        extent: &[f64],
        origin: &[f64],
    ) -> Result<Self, MeshError> {
        if !(1..=3).contains(&dim) {
            return Err(MeshError::InvalidDimension { dim });
        }
        if subdivisions.len() != dim || extent.len() != dim || origin.len() != dim {
            return Err(MeshError::InvalidDimension { dim });
        }
        if subdivisions.iter().any(|&n| n == 0)
            || extent.iter().any(|&e| !e.is_finite() || e <= 0.0)
            || origin.iter().any(|o| !o.is_finite())
        {
            return Err(MeshError::EmptyMesh);
        }

        let mut counts = [1usize; 3];
        let mut step = [0.0f64; 3];
        let mut lower = [0.0f64; 3];
        for axis in 0..dim {
            counts[axis] = subdivisions[axis];
            step[axis] = extent[axis] / subdivisions[axis] as f64;
            lower[axis] = origin[axis];
        }

        let n_cells = counts
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .filter(|&n| n <= MAX_COARSE_CELLS)
            .ok_or(MeshError::TooManyCells {
                limit: MAX_COARSE_CELLS,
            })?;

        let mut cells = IndexMap::with_capacity(n_cells);
        let mut next_id = 0u64;
        // x varies fastest.
        for k in 0..counts[2] {
            for j in 0..counts[1] {
                for i in 0..counts[0] {
                    let index = [i, j, k];
                    let mut cell_origin = [0.0; 3];
                    for axis in 0..dim {
                        cell_origin[axis] = lower[axis] + index[axis] as f64 * step[axis];
                    }
                    cells.insert(
                        CellId(next_id),
                        Cell {
                            origin: cell_origin,
                            extent: step,
                            level: 0,
                            owner: 0,
                            parent: None,
                            refine: false,
                        },
                    );
                    next_id += 1;
                }
            }
        }

        Ok(Self {
            dim,
            rank: 0,
            n_ranks: 1,
            cells,
            next_id,
            generation: 0,
        })
    }

    /// Distribute the current cells over `n_ranks` in contiguous blocks and
    /// view the grid from `rank`.
    pub fn partition(mut self, rank: usize, n_ranks: usize) -> Result<Self, MeshError> {
        if n_ranks == 0 || rank >= n_ranks {
            return Err(MeshError::InvalidPartition { rank, n_ranks });
        }
        let total = self.cells.len();
        for (index, cell) in self.cells.values_mut().enumerate() {
            cell.owner = index * n_ranks / total;
        }
        self.rank = rank;
        self.n_ranks = n_ranks;
        Ok(self)
    }

    /// Number of ranks the grid is partitioned over.
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Owning rank of an active cell.
    pub fn owner(&self, cell: CellId) -> Option<usize> {
        self.cells.get(&cell).map(|c| c.owner)
    }

    /// Refinement level of an active cell (0 for coarse cells).
    pub fn level(&self, cell: CellId) -> Option<u8> {
        self.cells.get(&cell).map(|c| c.level)
    }

    /// Lower corner and edge lengths of an active cell.
    pub fn bounds(&self, cell: CellId) -> Option<([f64; 3], [f64; 3])> {
        self.cells.get(&cell).map(|c| (c.origin, c.extent))
    }

    fn children_of(&mut self, parent_id: CellId, parent: &Cell) -> SmallVec<[(CellId, Cell); 8]> {
        let n_children = 1usize << self.dim;
        let mut half = parent.extent;
        for h in half.iter_mut().take(self.dim) {
            *h *= 0.5;
        }
        let mut children = SmallVec::new();
        for bits in 0..n_children {
            let mut origin = parent.origin;
            for axis in 0..self.dim {
                if bits & (1 << axis) != 0 {
                    origin[axis] += half[axis];
                }
            }
            let id = CellId(self.next_id);
            self.next_id += 1;
            children.push((
                id,
                Cell {
                    origin,
                    extent: half,
                    level: parent.level + 1,
                    owner: parent.owner,
                    parent: Some(parent_id),
                    refine: false,
                },
            ));
        }
        children
    }
}

impl Mesh for CellGrid {
    fn dim(&self) -> usize {
        self.dim
    }

    fn n_global_active_cells(&self) -> usize {
        self.cells.len()
    }

    fn locally_owned_cells(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|(_, c)| c.owner == self.rank)
            .map(|(&id, _)| id)
            .collect()
    }

    fn locally_owned_subdomain(&self) -> usize {
        self.rank
    }

    fn is_locally_owned(&self, cell: CellId) -> bool {
        self.cells.get(&cell).is_some_and(|c| c.owner == self.rank)
    }

    fn diameter(&self, cell: CellId) -> Option<f64> {
        self.cells.get(&cell).map(|c| {
            c.extent[..self.dim]
                .iter()
                .map(|e| e * e)
                .sum::<f64>()
                .sqrt()
        })
    }

    fn center(&self, cell: CellId) -> Option<[f64; 3]> {
        self.cells.get(&cell).map(|c| {
            let mut center = [0.0; 3];
            for axis in 0..self.dim {
                center[axis] = c.origin[axis] + 0.5 * c.extent[axis];
            }
            center
        })
    }

    fn parent(&self, cell: CellId) -> Option<CellId> {
        self.cells.get(&cell).and_then(|c| c.parent)
    }

    fn set_refine_flag(&mut self, cell: CellId) -> Result<(), MeshError> {
        match self.cells.get_mut(&cell) {
            Some(c) => {
                c.refine = true;
                Ok(())
            }
            None => Err(MeshError::UnknownCell { cell }),
        }
    }

    fn clear_refine_flag(&mut self, cell: CellId) {
        if let Some(c) = self.cells.get_mut(&cell) {
            c.refine = false;
        }
    }

    fn refine_flagged(&self, cell: CellId) -> bool {
        self.cells.get(&cell).is_some_and(|c| c.refine)
    }

    fn clear_refine_flags(&mut self) {
        for cell in self.cells.values_mut() {
            cell.refine = false;
        }
    }

    fn execute_coarsening_and_refinement(&mut self) -> RefinementSummary {
        let old = std::mem::take(&mut self.cells);
        let mut cells = IndexMap::with_capacity(old.len());
        let mut summary = RefinementSummary::default();

        for (id, mut cell) in old {
            if cell.refine && cell.level < Self::MAX_LEVEL {
                let children = self.children_of(id, &cell);
                summary.refined += 1;
                summary.created += children.len();
                cells.extend(children);
            } else {
                cell.refine = false;
                cell.parent = None;
                cells.insert(id, cell);
            }
        }

        self.cells = cells;
        summary.active_cells = self.cells.len();
        if summary.changed() {
            self.generation += 1;
        }
        summary
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}
