//! Linear B-spline lattice: the reference [`SurfaceState`] provider.
//!
//! A lattice is a list of tensor-product B-spline patches sharing one
//! control-point vector. Control points are a linear function of the design
//! variables:
//!
//! ```text
//! dofs           = base_dofs + J · design       (stacked [x; y; z], 3·nQ)
//! control_points = M · dofs(axis)               (per axis, nC)
//! ```
//!
//! so the variable Jacobian `J` and blend `M` never change and
//! [`SurfaceState::recompute`] is a pair of sparse products.

use super::basis::{basis_with_derivatives, clamped_uniform_knots, find_span, is_non_decreasing};
use super::core::{Axis, Point3, Vec3};
use super::projection::{ProjectionOptions, closest_point};
use super::sparse::SparseMatrix;
use super::state::{ProjectionError, StateError, SurfaceLocation, SurfaceState};

/// Errors raised while assembling a lattice.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LatticeError {
    #[error("invalid surface: {0}")]
    InvalidSurface(String),
    #[error("{what} must be {expected:?}, got {provided:?}")]
    OperatorShape {
        what: &'static str,
        expected: (usize, usize),
        provided: (usize, usize),
    },
    #[error("{what} must have {expected} entries, got {provided}")]
    Length {
        what: &'static str,
        expected: usize,
        provided: usize,
    },
    #[error("lattice needs at least one surface")]
    Empty,
}

/// Topology of one B-spline patch: degrees, control-net size, knots.
///
/// Control points of the patch are laid out row by row with `u` varying
/// fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineSurface {
    degree_u: usize,
    degree_v: usize,
    u_count: usize,
    v_count: usize,
    knots_u: Vec<f64>,
    knots_v: Vec<f64>,
}

impl BSplineSurface {
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        u_count: usize,
        v_count: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
    ) -> Result<Self, LatticeError> {
        if u_count < 2 || v_count < 2 {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface requires at least a 2x2 control net".to_string(),
            ));
        }
        if degree_u == 0 || degree_v == 0 {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface degrees must be >= 1".to_string(),
            ));
        }
        if degree_u >= u_count || degree_v >= v_count {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface degrees must be < control point counts".to_string(),
            ));
        }
        if knots_u.len() != u_count + degree_u + 1 {
            return Err(LatticeError::Length {
                what: "u knot vector",
                expected: u_count + degree_u + 1,
                provided: knots_u.len(),
            });
        }
        if knots_v.len() != v_count + degree_v + 1 {
            return Err(LatticeError::Length {
                what: "v knot vector",
                expected: v_count + degree_v + 1,
                provided: knots_v.len(),
            });
        }
        if !is_non_decreasing(&knots_u) || !is_non_decreasing(&knots_v) {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface knots must be non-decreasing".to_string(),
            ));
        }
        if knots_u.iter().chain(&knots_v).any(|k| !k.is_finite()) {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface knots must be finite".to_string(),
            ));
        }
        if knots_u[degree_u] >= knots_u[u_count] || knots_v[degree_v] >= knots_v[v_count] {
            return Err(LatticeError::InvalidSurface(
                "b-spline surface domain is empty".to_string(),
            ));
        }

        Ok(Self {
            degree_u,
            degree_v,
            u_count,
            v_count,
            knots_u,
            knots_v,
        })
    }

    /// Clamped patch with uniform interior knots on `[0, 1] x [0, 1]`.
    pub fn clamped_uniform(
        degree_u: usize,
        degree_v: usize,
        u_count: usize,
        v_count: usize,
    ) -> Result<Self, LatticeError> {
        Self::new(
            degree_u,
            degree_v,
            u_count,
            v_count,
            clamped_uniform_knots(u_count, degree_u),
            clamped_uniform_knots(v_count, degree_v),
        )
    }

    /// `(degree_u, degree_v)`.
    #[must_use]
    pub const fn degrees(&self) -> (usize, usize) {
        (self.degree_u, self.degree_v)
    }

    /// Control-net size as `(u_count, v_count)`.
    #[must_use]
    pub const fn control_net(&self) -> (usize, usize) {
        (self.u_count, self.v_count)
    }

    #[must_use]
    pub fn knots_u(&self) -> &[f64] {
        &self.knots_u
    }

    #[must_use]
    pub fn knots_v(&self) -> &[f64] {
        &self.knots_v
    }

    #[must_use]
    pub const fn control_point_count(&self) -> usize {
        self.u_count * self.v_count
    }

    #[must_use]
    pub fn domain_u(&self) -> (f64, f64) {
        (self.knots_u[self.degree_u], self.knots_u[self.u_count])
    }

    #[must_use]
    pub fn domain_v(&self) -> (f64, f64) {
        (self.knots_v[self.degree_v], self.knots_v[self.v_count])
    }

    /// Non-zero basis weights at `(u, v)` as
    /// `(local index, weight, d/du, d/dv)`. Parameters are clamped to the
    /// domain.
    fn basis_at(&self, u: f64, v: f64) -> Vec<(usize, f64, f64, f64)> {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = u.clamp(u0, u1);
        let v = v.clamp(v0, v1);
        let p = self.degree_u;
        let q = self.degree_v;

        let span_u = find_span(self.u_count - 1, p, u, &self.knots_u);
        let span_v = find_span(self.v_count - 1, q, v, &self.knots_v);
        let (nu, dnu) = basis_with_derivatives(span_u, u, p, &self.knots_u);
        let (nv, dnv) = basis_with_derivatives(span_v, v, q, &self.knots_v);

        let mut weights = Vec::with_capacity((p + 1) * (q + 1));
        for j in 0..=q {
            let v_index = span_v - q + j;
            for i in 0..=p {
                let u_index = span_u - p + i;
                weights.push((
                    v_index * self.u_count + u_index,
                    nu[i] * nv[j],
                    dnu[i] * nv[j],
                    nu[i] * dnv[j],
                ));
            }
        }
        weights
    }
}

/// Linear lattice of B-spline patches driven by design variables.
#[derive(Debug, Clone)]
pub struct LatticeState {
    surfaces: Vec<BSplineSurface>,
    offsets: Vec<usize>,
    base_dofs: Vec<f64>,
    dofs: Vec<f64>,
    blend: SparseMatrix,
    jacobian: SparseMatrix,
    control_points: Vec<Point3>,
    projection: ProjectionOptions,
}

impl LatticeState {
    /// Assembles a lattice from patches, baseline dofs, the blend `M`
    /// (`control points × dofs`) and the variable Jacobian `J`
    /// (`3·dofs × design variables`).
    pub fn new(
        surfaces: Vec<BSplineSurface>,
        dofs: &[Point3],
        blend: SparseMatrix,
        jacobian: SparseMatrix,
    ) -> Result<Self, LatticeError> {
        if surfaces.is_empty() {
            return Err(LatticeError::Empty);
        }

        let mut offsets = Vec::with_capacity(surfaces.len());
        let mut control_count = 0;
        for surface in &surfaces {
            offsets.push(control_count);
            control_count += surface.control_point_count();
        }

        let dof_count = dofs.len();
        if blend.shape() != (control_count, dof_count) {
            return Err(LatticeError::OperatorShape {
                what: "blend operator",
                expected: (control_count, dof_count),
                provided: blend.shape(),
            });
        }
        if jacobian.rows() != 3 * dof_count {
            return Err(LatticeError::OperatorShape {
                what: "variable jacobian",
                expected: (3 * dof_count, jacobian.cols()),
                provided: jacobian.shape(),
            });
        }
        if dofs.iter().any(|p| !p.is_finite()) {
            return Err(LatticeError::InvalidSurface(
                "lattice dofs must be finite".to_string(),
            ));
        }

        let mut base_dofs = vec![0.0; 3 * dof_count];
        for axis in Axis::ALL {
            let block = &mut base_dofs[axis.index() * dof_count..(axis.index() + 1) * dof_count];
            for (slot, point) in block.iter_mut().zip(dofs) {
                *slot = point.coord(axis);
            }
        }

        let mut state = Self {
            surfaces,
            offsets,
            dofs: base_dofs.clone(),
            base_dofs,
            blend,
            jacobian,
            control_points: vec![Point3::ORIGIN; control_count],
            projection: ProjectionOptions::default(),
        };
        state.refresh_control_points();
        Ok(state)
    }

    /// Lattice whose dofs are the control points themselves (identity blend).
    pub fn from_control_points(
        surfaces: Vec<BSplineSurface>,
        control_points: &[Point3],
        jacobian: SparseMatrix,
    ) -> Result<Self, LatticeError> {
        let blend = SparseMatrix::identity(control_points.len());
        Self::new(surfaces, control_points, blend, jacobian)
    }

    #[must_use]
    pub fn with_projection_options(mut self, options: ProjectionOptions) -> Self {
        self.projection = options;
        self
    }

    #[must_use]
    pub const fn projection_options(&self) -> &ProjectionOptions {
        &self.projection
    }

    #[must_use]
    pub fn surfaces(&self) -> &[BSplineSurface] {
        &self.surfaces
    }

    /// Number of design variables the Jacobian expects.
    #[must_use]
    pub const fn design_count(&self) -> usize {
        self.jacobian.cols()
    }

    /// Current stacked `[x; y; z]` dof vector.
    #[must_use]
    pub fn dofs(&self) -> &[f64] {
        &self.dofs
    }

    /// Surface point at `(u, v)` on patch `surface`.
    pub fn point_at(&self, surface: usize, u: f64, v: f64) -> Result<Point3, StateError> {
        Ok(self.frame_at(surface, u, v)?.0)
    }

    fn surface(&self, index: usize) -> Result<&BSplineSurface, StateError> {
        self.surfaces.get(index).ok_or(StateError::UnknownSurface {
            index,
            count: self.surfaces.len(),
        })
    }

    fn frame_at(&self, surface: usize, u: f64, v: f64) -> Result<(Point3, Vec3, Vec3), StateError> {
        let patch = self.surface(surface)?;
        let offset = self.offsets[surface];
        Ok(self.patch_frame(patch, offset, u, v))
    }

    fn patch_frame(&self, patch: &BSplineSurface, offset: usize, u: f64, v: f64) -> (Point3, Vec3, Vec3) {
        let mut point = Vec3::ZERO;
        let mut du = Vec3::ZERO;
        let mut dv = Vec3::ZERO;
        for (local, w, wu, wv) in patch.basis_at(u, v) {
            let c = self.control_points[offset + local];
            let c = Vec3::new(c.x, c.y, c.z);
            point = point + c * w;
            du = du + c * wu;
            dv = dv + c * wv;
        }
        (Point3::new(point.x, point.y, point.z), du, dv)
    }

    fn refresh_control_points(&mut self) {
        let dof_count = self.blend.cols();
        for axis in Axis::ALL {
            let block = &self.dofs[axis.index() * dof_count..(axis.index() + 1) * dof_count];
            for (row, point) in self.control_points.iter_mut().enumerate() {
                let value = self.blend.row(row).map(|(col, w)| w * block[col]).sum();
                point.set_coord(axis, value);
            }
        }
    }
}

impl SurfaceState for LatticeState {
    fn project(&self, points: &[Point3]) -> Result<Vec<SurfaceLocation>, ProjectionError> {
        if self.surfaces.is_empty() {
            return Err(ProjectionError::NoSurfaces);
        }

        let tolerance = self.projection.tolerance.eps;
        let mut locations = Vec::with_capacity(points.len());
        for (index, &target) in points.iter().enumerate() {
            if !target.is_finite() {
                return Err(ProjectionError::NonFinitePoint { index });
            }

            let mut best: Option<(usize, f64, f64, f64)> = None;
            for (surface, patch) in self.surfaces.iter().enumerate() {
                let offset = self.offsets[surface];
                let hit = closest_point(
                    |u, v| self.patch_frame(patch, offset, u, v),
                    patch.domain_u(),
                    patch.domain_v(),
                    target,
                    &self.projection,
                );
                if best.is_none_or(|(_, _, _, distance)| hit.distance < distance) {
                    best = Some((surface, hit.u, hit.v, hit.distance));
                }
            }

            let Some((surface, u, v, distance)) = best else {
                return Err(ProjectionError::NoSurfaces);
            };
            if !(distance <= tolerance) {
                return Err(ProjectionError::OutOfTolerance {
                    index,
                    distance,
                    tolerance,
                });
            }
            log::trace!("point {index} projected to surface {surface} at ({u}, {v}), distance {distance}");
            locations.push(SurfaceLocation::new(surface, u, v));
        }
        Ok(locations)
    }

    fn evaluate_basis(&self, locations: &[SurfaceLocation]) -> Result<SparseMatrix, StateError> {
        let mut triplets = Vec::new();
        for (row, location) in locations.iter().enumerate() {
            let patch = self.surface(location.surface)?;
            let offset = self.offsets[location.surface];
            for (local, weight, _, _) in patch.basis_at(location.u, location.v) {
                triplets.push((row, offset + local, weight));
            }
        }
        Ok(SparseMatrix::from_triplets(
            locations.len(),
            self.control_points.len(),
            &triplets,
        )?)
    }

    fn control_points(&self) -> &[Point3] {
        &self.control_points
    }

    fn blend(&self) -> &SparseMatrix {
        &self.blend
    }

    fn variable_jacobian(&self) -> &SparseMatrix {
        &self.jacobian
    }

    fn recompute(&mut self, design: &[f64]) -> Result<(), StateError> {
        if design.len() != self.jacobian.cols() {
            return Err(StateError::DimensionMismatch {
                what: "design vector",
                expected: self.jacobian.cols(),
                provided: design.len(),
            });
        }
        let delta = self.jacobian.mul_vec(design)?;
        for ((dof, base), change) in self.dofs.iter_mut().zip(&self.base_dofs).zip(delta) {
            *dof = base + change;
        }
        self.refresh_control_points();
        Ok(())
    }
}
