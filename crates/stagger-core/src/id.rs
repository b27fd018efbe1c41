//! Strongly-typed identifiers shared across the workspace.

use std::fmt;

/// Identifies an active cell of the mesh.
///
/// Ids are never reused: refining a cell retires its id and allocates
/// fresh ids for the children, so a `CellId` always names exactly one
/// cell over the lifetime of a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CellId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// The physics fields a staggered scheme can couple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    /// Displacement field of the mechanical (elasticity) problem.
    Mechanical,
    /// Damage / phase field describing the crack.
    PhaseField,
}

impl FieldKind {
    /// Short lowercase label used in logs and output names.
    pub fn label(self) -> &'static str {
        match self {
            Self::Mechanical => "elasticity",
            Self::PhaseField => "phase_field",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gradient of a scalar field at one quadrature point.
///
/// Always three components; unused trailing components are zero for
/// 1D and 2D meshes.
pub type Gradient = [f64; 3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_display_and_from() {
        let id = CellId::from(17);
        assert_eq!(id, CellId(17));
        assert_eq!(format!("{id}"), "17");
    }

    #[test]
    fn field_kind_labels_are_distinct() {
        assert_ne!(FieldKind::Mechanical.label(), FieldKind::PhaseField.label());
        assert_eq!(format!("{}", FieldKind::PhaseField), "phase_field");
    }
}
