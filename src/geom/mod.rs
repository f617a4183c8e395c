mod basis;
mod core;
mod lattice;
mod projection;
mod sparse;
mod state;

pub use self::core::{Axis, Point3, Tolerance, Vec3};
pub use lattice::{BSplineSurface, LatticeError, LatticeState};
pub use projection::ProjectionOptions;
pub use sparse::{SparseError, SparseMatrix};
pub use state::{ProjectionError, StateError, SurfaceLocation, SurfaceState};
