//! Transfer handles for moving per-cell data across a refinement.
//!
//! A field prepares a [`FieldTransfer`] against the mesh that is about to
//! change and completes it once the new degree-of-freedom layout exists.
//! The handle is opaque to the core: each solver decides what it captures.
//! [`CellValues`] is the common case of data keyed by cell.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use stagger_core::{CellId, FieldKind, TransferError};
use stagger_mesh::Mesh;

/// Opaque, single-use handle produced by `FieldSolver::prepare_refine`.
pub struct FieldTransfer {
    field: FieldKind,
    payload: Box<dyn Any + Send>,
}

impl FieldTransfer {
    /// Wrap solver-specific transfer data for `field`.
    pub fn new<T: Any + Send>(field: FieldKind, payload: T) -> Self {
        Self {
            field,
            payload: Box::new(payload),
        }
    }

    /// The field that prepared this handle.
    pub fn field(&self) -> FieldKind {
        self.field
    }

    /// Unwrap the payload, checking it was prepared by `field` with type `T`.
    pub fn into_payload<T: Any>(self, field: FieldKind) -> Result<T, TransferError> {
        if self.field != field {
            return Err(TransferError::PayloadMismatch { field });
        }
        self.payload
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| TransferError::PayloadMismatch { field })
    }
}

impl fmt::Debug for FieldTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTransfer")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// Per-cell values captured on the locally owned cells of a mesh.
///
/// After a refinement, an unchanged cell finds its own value and a new
/// child finds its parent's value (via [`Mesh::parent`]).
#[derive(Clone, Debug, PartialEq)]
pub struct CellValues<T> {
    values: IndexMap<CellId, T>,
}

impl<T> CellValues<T> {
    /// Capture one value per locally owned cell of `mesh`.
    pub fn capture(mesh: &dyn Mesh, mut value: impl FnMut(CellId) -> T) -> Self {
        let values = mesh
            .locally_owned_cells()
            .into_iter()
            .map(|cell| (cell, value(cell)))
            .collect();
        Self { values }
    }

    /// Build from explicit `(cell, value)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (CellId, T)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    /// Number of captured cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The captured value of `cell` itself, if any.
    pub fn get(&self, cell: CellId) -> Option<&T> {
        self.values.get(&cell)
    }

    /// The value a cell of the refined mesh inherits.
    ///
    /// Unchanged cells resolve to their own value; children created by the
    /// latest refinement resolve to their parent's.
    pub fn source_for(&self, mesh: &dyn Mesh, cell: CellId) -> Option<&T> {
        self.values
            .get(&cell)
            .or_else(|| mesh.parent(cell).and_then(|p| self.values.get(&p)))
    }
}

impl<T: Clone> CellValues<T> {
    /// Values for every locally owned cell of the refined `mesh`, in mesh order.
    pub fn relocate(&self, mesh: &dyn Mesh) -> Result<Vec<T>, TransferError> {
        mesh.locally_owned_cells()
            .into_iter()
            .map(|cell| {
                self.source_for(mesh, cell)
                    .cloned()
                    .ok_or(TransferError::MissingSource { cell })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagger_mesh::CellGrid;

    #[test]
    fn payload_round_trips_for_matching_field() {
        let handle = FieldTransfer::new(FieldKind::PhaseField, vec![1.0f64, 2.0]);
        assert_eq!(handle.field(), FieldKind::PhaseField);
        let data: Vec<f64> = handle.into_payload(FieldKind::PhaseField).unwrap();
        assert_eq!(data, vec![1.0, 2.0]);
    }

    #[test]
    fn payload_rejects_wrong_field() {
        let handle = FieldTransfer::new(FieldKind::PhaseField, 3u32);
        assert_eq!(
            handle.into_payload::<u32>(FieldKind::Mechanical),
            Err(TransferError::PayloadMismatch {
                field: FieldKind::Mechanical
            })
        );
    }

    #[test]
    fn payload_rejects_wrong_type() {
        let handle = FieldTransfer::new(FieldKind::Mechanical, 3u32);
        assert!(handle.into_payload::<String>(FieldKind::Mechanical).is_err());
    }

    #[test]
    fn children_inherit_parent_value() {
        let mut grid = CellGrid::hyper_rectangle(1, &[3], &[3.0]).unwrap();
        let cells = grid.locally_owned_cells();
        let captured = CellValues::capture(&grid, |c| c.0 as f64 * 10.0);
        assert_eq!(captured.len(), 3);

        grid.set_refine_flag(cells[1]).unwrap();
        grid.execute_coarsening_and_refinement();

        let relocated = captured.relocate(&grid).unwrap();
        assert_eq!(relocated, vec![0.0, 10.0, 10.0, 20.0]);
    }

    #[test]
    fn relocate_reports_missing_source() {
        let grid = CellGrid::hyper_rectangle(1, &[2], &[1.0]).unwrap();
        let partial = CellValues::from_pairs([(CellId(0), 1.0)]);
        assert_eq!(
            partial.relocate(&grid),
            Err(TransferError::MissingSource { cell: CellId(1) })
        );
    }
}
