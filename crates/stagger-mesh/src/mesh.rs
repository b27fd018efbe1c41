//! The core `Mesh` trait.

use stagger_core::CellId;

use crate::error::MeshError;

/// Outcome of one [`Mesh::execute_coarsening_and_refinement`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefinementSummary {
    /// Number of cells that were replaced by children.
    pub refined: usize,
    /// Number of child cells created.
    pub created: usize,
    /// Active cells known to this rank after the change.
    pub active_cells: usize,
}

impl RefinementSummary {
    /// Whether the mesh topology changed.
    pub fn changed(&self) -> bool {
        self.refined > 0
    }
}

/// Narrow view of a distributed, adaptively refined mesh.
///
/// The orchestration core reads geometry, owns the refine markers and
/// triggers topology changes through this trait; everything else
/// (element geometry, partition exchange, hanging-node handling) is the
/// backend's business.
///
/// # Ownership
///
/// A mesh is owned exclusively by the simulation controller. Field
/// solvers and the point-history store only see `&dyn Mesh` and refer
/// to cells by [`CellId`].
///
/// # Collectives
///
/// [`execute_coarsening_and_refinement`](Mesh::execute_coarsening_and_refinement)
/// is collective in a distributed backend: every rank must call it,
/// even when it flagged nothing locally.
pub trait Mesh: Send {
    /// Number of spatial dimensions (1, 2 or 3).
    fn dim(&self) -> usize;

    /// Number of active cells across all ranks.
    fn n_global_active_cells(&self) -> usize;

    /// Active cells owned by this rank, in deterministic order.
    ///
    /// Two calls without an intervening refinement return the same sequence.
    fn locally_owned_cells(&self) -> Vec<CellId>;

    /// Number of active cells owned by this rank.
    fn n_locally_owned_cells(&self) -> usize {
        self.locally_owned_cells().len()
    }

    /// The rank this process owns cells for.
    fn locally_owned_subdomain(&self) -> usize;

    /// Whether `cell` is active and owned by this rank.
    fn is_locally_owned(&self, cell: CellId) -> bool;

    /// Diameter (longest diagonal) of an active cell.
    fn diameter(&self, cell: CellId) -> Option<f64>;

    /// Centroid of an active cell; unused trailing components are zero.
    fn center(&self, cell: CellId) -> Option<[f64; 3]>;

    /// The cell an active cell was created from by the most recent refinement.
    ///
    /// Returns `None` for cells that were not created by the most recent
    /// [`execute_coarsening_and_refinement`](Mesh::execute_coarsening_and_refinement)
    /// call. Transfer code uses this to relocate per-cell data from a
    /// refined parent into its children.
    fn parent(&self, cell: CellId) -> Option<CellId>;

    /// Mark an active cell for refinement.
    fn set_refine_flag(&mut self, cell: CellId) -> Result<(), MeshError>;

    /// Remove a refinement mark. Unknown or unmarked cells are ignored.
    fn clear_refine_flag(&mut self, cell: CellId);

    /// Whether an active cell carries a refinement mark.
    fn refine_flagged(&self, cell: CellId) -> bool;

    /// Remove every refinement mark held by this rank.
    fn clear_refine_flags(&mut self) {
        for cell in self.locally_owned_cells() {
            self.clear_refine_flag(cell);
        }
    }

    /// Refine every marked cell and clear all marks.
    fn execute_coarsening_and_refinement(&mut self) -> RefinementSummary;

    /// Counter incremented by every topology change.
    fn generation(&self) -> u64;
}
