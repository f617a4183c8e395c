//! Named point sets bound to fixed surface locations.

use std::collections::BTreeMap;

use crate::geom::{Axis, Point3, SparseMatrix, SurfaceState};

use super::ConfigError;

/// A point cloud whose surface location is fixed at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    coordinates: Vec<Point3>,
    operator: SparseMatrix,
    current: bool,
}

impl PointSet {
    /// Latest coordinates; stale until the set is updated after a
    /// design-variable change.
    #[must_use]
    pub fn coordinates(&self) -> &[Point3] {
        &self.coordinates
    }

    /// Evaluation operator (`points × control points`).
    #[must_use]
    pub const fn operator(&self) -> &SparseMatrix {
        &self.operator
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.current
    }
}

/// Point sets keyed by name, with per-set staleness.
#[derive(Debug, Clone, Default)]
pub struct PointSetRegistry {
    sets: BTreeMap<String, PointSet>,
}

impl PointSetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects `coordinates` onto `state` and stores the resulting
    /// evaluation operator under `name`, replacing any previous set.
    ///
    /// On failure the registry is left untouched.
    pub fn add<S: SurfaceState + ?Sized>(
        &mut self,
        state: &S,
        name: impl Into<String>,
        coordinates: Vec<Point3>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        let locations = state.project(&coordinates)?;
        let operator = state.evaluate_basis(&locations)?;
        if operator.rows() != coordinates.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "evaluation operator rows",
                expected: coordinates.len(),
                provided: operator.rows(),
            });
        }
        if operator.cols() != state.control_points().len() {
            return Err(ConfigError::DimensionMismatch {
                what: "evaluation operator columns",
                expected: state.control_points().len(),
                provided: operator.cols(),
            });
        }

        log::debug!(
            "point set '{name}' registered: {} points, {} operator entries",
            coordinates.len(),
            operator.nnz()
        );
        let replaced = self
            .sets
            .insert(
                name.clone(),
                PointSet {
                    coordinates,
                    operator,
                    current: false,
                },
            )
            .is_some();
        if replaced {
            log::debug!("point set '{name}' replaced");
        }
        Ok(())
    }

    /// Recomputes the surface from `design` and re-evaluates `name`.
    pub fn update<S: SurfaceState + ?Sized>(
        &mut self,
        state: &mut S,
        design: &[f64],
        name: &str,
    ) -> Result<&[Point3], ConfigError> {
        let set = self
            .sets
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownPointSet(name.to_string()))?;

        state.recompute(design)?;
        let control_points = state.control_points();
        for axis in Axis::ALL {
            let column: Vec<f64> = control_points.iter().map(|p| p.coord(axis)).collect();
            let values = set.operator.mul_vec(&column)?;
            for (point, value) in set.coordinates.iter_mut().zip(values) {
                point.set_coord(axis, value);
            }
        }
        set.current = true;
        log::debug!("point set '{name}' updated");
        Ok(&set.coordinates)
    }

    /// Marks every set stale.
    pub fn invalidate_all(&mut self) {
        for set in self.sets.values_mut() {
            set.current = false;
        }
        log::debug!("{} point sets invalidated", self.sets.len());
    }

    /// False for unknown names and for sets not updated since the last
    /// invalidation.
    #[must_use]
    pub fn is_up_to_date(&self, name: &str) -> bool {
        self.sets.get(name).is_some_and(PointSet::is_current)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PointSet> {
        self.sets.get(name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&PointSet, ConfigError> {
        self.sets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPointSet(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
