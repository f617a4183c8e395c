//! The surface-state seam.
//!
//! The engine never looks inside the surface representation. It projects
//! points, asks for basis operators, reads the current control points and
//! the two linear operators that connect them to the design variables, and
//! requests a recompute after the variables change. Anything that can answer
//! those calls implements [`SurfaceState`].

use super::core::Point3;
use super::sparse::{SparseError, SparseMatrix};

/// Topological/parametric location of a projected point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceLocation {
    /// Index of the surface (patch) the point landed on.
    pub surface: usize,
    pub u: f64,
    pub v: f64,
}

impl SurfaceLocation {
    #[must_use]
    pub const fn new(surface: usize, u: f64, v: f64) -> Self {
        Self { surface, u, v }
    }
}

/// A point could not be located on the surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("surface has no patches to project onto")]
    NoSurfaces,
    #[error("point {index} has non-finite coordinates")]
    NonFinitePoint { index: usize },
    #[error("point {index} lies {distance} from the surface (tolerance {tolerance})")]
    OutOfTolerance {
        index: usize,
        distance: f64,
        tolerance: f64,
    },
}

/// Failures while evaluating or recomputing the surface state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("{what}: expected {expected} entries, got {provided}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        provided: usize,
    },
    #[error("surface index {index} out of range ({count} surfaces)")]
    UnknownSurface { index: usize, count: usize },
    #[error(transparent)]
    Sparse(#[from] SparseError),
}

/// Provider of the geometry a configuration is built on.
///
/// Dofs are stored as a stacked `[x; y; z]` vector of length
/// `3 * dof_count()`. The operators compose as
/// `control_points = blend · dofs(axis)` and
/// `d dofs / d design = variable_jacobian`.
pub trait SurfaceState {
    /// Locates every point on the surface.
    fn project(&self, points: &[Point3]) -> Result<Vec<SurfaceLocation>, ProjectionError>;

    /// Operator of shape `locations × control points` evaluating the surface
    /// at each location.
    fn evaluate_basis(&self, locations: &[SurfaceLocation]) -> Result<SparseMatrix, StateError>;

    /// Current control points, one per column of the evaluation operators.
    fn control_points(&self) -> &[Point3];

    /// Blend operator `M` of shape `control points × dofs`.
    fn blend(&self) -> &SparseMatrix;

    /// Variable Jacobian `J` of shape `3·dofs × design variables`.
    fn variable_jacobian(&self) -> &SparseMatrix;

    fn dof_count(&self) -> usize {
        self.blend().cols()
    }

    /// Recomputes control points (and the Jacobian, for non-linear
    /// providers) from the flattened design vector.
    fn recompute(&mut self, design: &[f64]) -> Result<(), StateError>;
}
