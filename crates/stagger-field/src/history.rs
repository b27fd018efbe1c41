//! Per-quadrature-point history storage.
//!
//! Constitutive models keep state at every quadrature point of every
//! locally owned cell (e.g. the maximal elastic energy seen so far).
//! Solvers stage candidate values during an attempt; the staggered
//! driver commits them with [`PointHistoryStore::finalize`] once the
//! owning field's update completed, even if the attempt is later
//! rejected for an excessive residual: a residual-driven retry restores
//! the field solutions but not the committed history. Only a diverged
//! attempt skips the commit; its staged values are dropped with
//! [`PointHistoryStore::discard_staged`].

use indexmap::IndexMap;
use smallvec::SmallVec;
use stagger_core::{CellId, TransferError};
use stagger_mesh::Mesh;

use crate::transfer::CellValues;

/// History values attached to one quadrature point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointHistory {
    values: SmallVec<[f64; 4]>,
    staged: Option<SmallVec<[f64; 4]>>,
}

impl PointHistory {
    /// History with the given committed values.
    pub fn with_values(values: &[f64]) -> Self {
        Self {
            values: SmallVec::from_slice(values),
            staged: None,
        }
    }

    /// Committed values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stage candidate values, replacing any earlier staged values.
    pub fn stage(&mut self, values: &[f64]) {
        self.staged = Some(SmallVec::from_slice(values));
    }

    /// Whether staged values are waiting to be committed.
    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// Drop staged values without committing them.
    pub fn discard(&mut self) {
        self.staged = None;
    }

    /// Commit staged values. Returns `true` if anything was committed.
    pub fn finalize(&mut self) -> bool {
        match self.staged.take() {
            Some(staged) => {
                self.values = staged;
                true
            }
            None => false,
        }
    }

    fn committed(&self) -> Self {
        Self {
            values: self.values.clone(),
            staged: None,
        }
    }
}

/// History for every quadrature point of every locally owned cell.
///
/// Entries are laid out cell by cell in the mesh's owned-cell order,
/// `points_per_cell` entries per cell.
#[derive(Clone, Debug, Default)]
pub struct PointHistoryStore {
    points_per_cell: usize,
    offsets: IndexMap<CellId, usize>,
    entries: Vec<PointHistory>,
}

impl PointHistoryStore {
    /// Empty store holding `points_per_cell` entries per cell once initialized.
    pub fn new(points_per_cell: usize) -> Self {
        Self {
            points_per_cell,
            offsets: IndexMap::new(),
            entries: Vec::new(),
        }
    }

    /// Allocate default entries for every locally owned cell of `mesh`.
    ///
    /// Any previous contents are dropped.
    pub fn initialize(&mut self, mesh: &dyn Mesh) {
        let cells = mesh.locally_owned_cells();
        self.offsets.clear();
        self.entries.clear();
        self.entries
            .resize(cells.len() * self.points_per_cell, PointHistory::default());
        for (index, cell) in cells.into_iter().enumerate() {
            self.offsets.insert(cell, index * self.points_per_cell);
        }
    }

    /// Quadrature points per cell.
    pub fn points_per_cell(&self) -> usize {
        self.points_per_cell
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cells with storage.
    pub fn n_cells(&self) -> usize {
        self.offsets.len()
    }

    /// Entries required for the locally owned cells of `mesh`.
    pub fn expected_len(&self, mesh: &dyn Mesh) -> usize {
        mesh.n_locally_owned_cells() * self.points_per_cell
    }

    /// Entries of one cell.
    pub fn cell(&self, cell: CellId) -> Option<&[PointHistory]> {
        let start = *self.offsets.get(&cell)?;
        self.entries.get(start..start + self.points_per_cell)
    }

    /// Mutable entries of one cell.
    pub fn cell_mut(&mut self, cell: CellId) -> Option<&mut [PointHistory]> {
        let start = *self.offsets.get(&cell)?;
        self.entries.get_mut(start..start + self.points_per_cell)
    }

    /// Commit every staged entry. Returns the number of committed entries.
    pub fn finalize(&mut self) -> usize {
        self.entries
            .iter_mut()
            .map(|e| usize::from(e.finalize()))
            .sum()
    }

    /// Drop every staged entry without committing.
    pub fn discard_staged(&mut self) {
        for entry in &mut self.entries {
            entry.discard();
        }
    }

    /// Capture committed history per cell ahead of a refinement.
    pub fn prepare_transfer(&self) -> HistoryTransfer {
        let data = CellValues::from_pairs(self.offsets.iter().map(|(&cell, &start)| {
            let entries = self.entries[start..start + self.points_per_cell]
                .iter()
                .map(PointHistory::committed)
                .collect();
            (cell, entries)
        }));
        HistoryTransfer {
            points_per_cell: self.points_per_cell,
            data,
        }
    }
}

/// Committed point history captured before a refinement.
///
/// Consumed by [`interpolate`](HistoryTransfer::interpolate) once the
/// store has been re-initialized on the refined mesh.
#[derive(Clone, Debug)]
pub struct HistoryTransfer {
    points_per_cell: usize,
    data: CellValues<Vec<PointHistory>>,
}

impl HistoryTransfer {
    /// Number of cells captured.
    pub fn n_cells(&self) -> usize {
        self.data.len()
    }

    /// Fill `store` for the refined `mesh`.
    ///
    /// Cells that were not refined keep their own history; children copy
    /// their parent's. Returns the number of entries written.
    pub fn interpolate(
        self,
        store: &mut PointHistoryStore,
        mesh: &dyn Mesh,
    ) -> Result<usize, TransferError> {
        if store.points_per_cell != self.points_per_cell {
            return Err(TransferError::CountMismatch {
                expected: store.points_per_cell,
                actual: self.points_per_cell,
            });
        }
        let mut written = 0;
        for cell in mesh.locally_owned_cells() {
            let source = self
                .data
                .source_for(mesh, cell)
                .ok_or(TransferError::MissingSource { cell })?;
            let target = store
                .cell_mut(cell)
                .ok_or(TransferError::MissingSource { cell })?;
            target.clone_from_slice(source);
            written += target.len();
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagger_mesh::CellGrid;

    fn line(n: usize) -> CellGrid {
        CellGrid::hyper_rectangle(1, &[n], &[n as f64]).unwrap()
    }

    #[test]
    fn initialize_sizes_to_mesh() {
        let grid = line(3);
        let mut store = PointHistoryStore::new(2);
        store.initialize(&grid);
        assert_eq!(store.len(), 6);
        assert_eq!(store.n_cells(), 3);
        assert_eq!(store.expected_len(&grid), 6);
        assert_eq!(store.cell(CellId(1)).unwrap().len(), 2);
        assert!(store.cell(CellId(7)).is_none());
    }

    #[test]
    fn staged_values_commit_only_on_finalize() {
        let grid = line(1);
        let mut store = PointHistoryStore::new(1);
        store.initialize(&grid);
        store.cell_mut(CellId(0)).unwrap()[0].stage(&[3.0]);
        assert!(store.cell(CellId(0)).unwrap()[0].values().is_empty());
        assert_eq!(store.finalize(), 1);
        assert_eq!(store.cell(CellId(0)).unwrap()[0].values(), &[3.0]);
        assert_eq!(store.finalize(), 0);
    }

    #[test]
    fn discarded_values_never_commit() {
        let mut point = PointHistory::with_values(&[1.0]);
        point.stage(&[2.0]);
        point.discard();
        assert!(!point.finalize());
        assert_eq!(point.values(), &[1.0]);
    }

    #[test]
    fn discard_keeps_values_committed_by_a_rejected_attempt() {
        let grid = line(1);
        let mut store = PointHistoryStore::new(1);
        store.initialize(&grid);
        // Attempt rejected for its residual: committed anyway.
        store.cell_mut(CellId(0)).unwrap()[0].stage(&[0.1]);
        store.finalize();
        // Retry diverges: only its staged value is dropped.
        store.cell_mut(CellId(0)).unwrap()[0].stage(&[-1.0]);
        store.discard_staged();
        assert_eq!(store.cell(CellId(0)).unwrap()[0].values(), &[0.1]);
    }

    #[test]
    fn transfer_keeps_unchanged_cells_and_copies_into_children() {
        let mut grid = line(2);
        let mut store = PointHistoryStore::new(2);
        store.initialize(&grid);
        for (value, cell) in grid.locally_owned_cells().into_iter().enumerate() {
            for point in store.cell_mut(cell).unwrap() {
                point.stage(&[value as f64]);
            }
        }
        store.finalize();

        let prepared = store.prepare_transfer();
        assert_eq!(prepared.n_cells(), 2);
        grid.set_refine_flag(CellId(1)).unwrap();
        grid.execute_coarsening_and_refinement();
        store.initialize(&grid);

        let written = prepared.interpolate(&mut store, &grid).unwrap();
        assert_eq!(written, 6);
        assert_eq!(store.len(), store.expected_len(&grid));
        for cell in grid.locally_owned_cells() {
            let expected = if cell == CellId(0) { 0.0 } else { 1.0 };
            for point in store.cell(cell).unwrap() {
                assert_eq!(point.values(), &[expected]);
            }
        }
    }

    #[test]
    fn transfer_drops_staged_values() {
        let grid = line(1);
        let mut store = PointHistoryStore::new(1);
        store.initialize(&grid);
        store.cell_mut(CellId(0)).unwrap()[0].stage(&[9.0]);
        let prepared = store.prepare_transfer();
        store.initialize(&grid);
        prepared.interpolate(&mut store, &grid).unwrap();
        let point = &store.cell(CellId(0)).unwrap()[0];
        assert!(!point.is_staged());
        assert!(point.values().is_empty());
    }

    #[test]
    fn transfer_rejects_layout_change() {
        let grid = line(1);
        let mut store = PointHistoryStore::new(2);
        store.initialize(&grid);
        let prepared = store.prepare_transfer();
        let mut other = PointHistoryStore::new(3);
        other.initialize(&grid);
        assert_eq!(
            prepared.interpolate(&mut other, &grid),
            Err(TransferError::CountMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
}
