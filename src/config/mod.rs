//! Design-variable configuration bound to a surface state.
//!
//! [`Configuration`] owns the shared [`SurfaceState`], the design-variable
//! catalogue and the point-set registry. Writing design variables marks every
//! point set stale; each set must be [`updated`](Configuration::update)
//! before its coordinates are trusted again. Reads never recompute.

mod design_var;
mod optimizer;
mod point_set;
mod sensitivity;

pub use design_var::{DesignVariable, DesignVariableSpec, DesignVariables, VariableValues};
pub use optimizer::{OptimizerSink, VariableGroup, VariableKind};
pub use point_set::{PointSet, PointSetRegistry};
pub use sensitivity::{
    PointGradient, SensitivityBlock, SensitivityMap, convert_sensitivity_to_dict,
    total_sensitivity, total_sensitivity_prod,
};

use crate::geom::{Point3, ProjectionError, SparseError, StateError, SurfaceState};

/// Errors surfaced by configuration operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("design variable '{0}' is missing from the supplied values")]
    UnknownVariable(String),
    #[error("design variable '{0}' is already registered")]
    DuplicateVariable(String),
    #[error("design variable '{name}' is invalid: {reason}")]
    InvalidVariable { name: String, reason: String },
    #[error("design variable '{name}' expects {expected} values, got {provided}")]
    SizeMismatch {
        name: String,
        expected: usize,
        provided: usize,
    },
    #[error("point set '{0}' is not registered")]
    UnknownPointSet(String),
    #[error("{what}: expected {expected}, got {provided}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        provided: usize,
    },
    #[error("projection failed: {0}")]
    Projection(#[from] ProjectionError),
    #[error("surface state: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Sparse(#[from] SparseError),
}

/// Design variables and point sets sharing one surface state.
#[derive(Debug, Clone)]
pub struct Configuration<S: SurfaceState> {
    state: S,
    variables: DesignVariables,
    point_sets: PointSetRegistry,
}

impl<S: SurfaceState> Configuration<S> {
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state,
            variables: DesignVariables::new(),
            point_sets: PointSetRegistry::new(),
        }
    }

    /// Configuration with a prepared catalogue.
    #[must_use]
    pub fn with_variables(state: S, variables: DesignVariables) -> Self {
        Self {
            state,
            variables,
            point_sets: PointSetRegistry::new(),
        }
    }

    pub fn add_design_variable(&mut self, variable: DesignVariable) -> Result<(), ConfigError> {
        log::debug!(
            "design variable '{}' registered with shape {:?}",
            variable.name(),
            variable.shape()
        );
        self.variables.add(variable)
    }

    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    #[must_use]
    pub const fn design_variables(&self) -> &DesignVariables {
        &self.variables
    }

    #[must_use]
    pub const fn point_sets(&self) -> &PointSetRegistry {
        &self.point_sets
    }

    /// Projects `points` onto the surface and registers them as `name`.
    pub fn add_point_set<P>(
        &mut self,
        points: impl IntoIterator<Item = P>,
        name: impl Into<String>,
    ) -> Result<(), ConfigError>
    where
        P: Into<Point3>,
    {
        let coordinates = points.into_iter().map(Into::into).collect();
        self.point_sets.add(&self.state, name, coordinates)
    }

    /// Writes all design variables (column-major arrays) and marks every
    /// point set stale. Nothing is written if any variable fails validation.
    pub fn set_design_variables(&mut self, values: &VariableValues) -> Result<(), ConfigError> {
        self.variables.set_values(values)?;
        log::debug!("{} design variables written", self.variables.len());
        self.point_sets.invalidate_all();
        Ok(())
    }

    /// Name → column-major flattened value.
    #[must_use]
    pub fn values(&self) -> VariableValues {
        self.variables.values()
    }

    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.names()
    }

    /// Total scalar design-variable count.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.count()
    }

    /// Recomputes the surface from the current design and re-evaluates
    /// `name`, returning its fresh coordinates.
    pub fn update(&mut self, name: &str) -> Result<&[Point3], ConfigError> {
        let design = self.variables.flattened();
        self.point_sets.update(&mut self.state, &design, name)
    }

    #[must_use]
    pub fn is_up_to_date(&self, name: &str) -> bool {
        self.point_sets.is_up_to_date(name)
    }

    /// Last computed coordinates of `name`, stale or not.
    #[must_use]
    pub fn points(&self, name: &str) -> Option<&[Point3]> {
        self.point_sets.get(name).map(PointSet::coordinates)
    }

    pub fn point_set_names(&self) -> impl Iterator<Item = &str> {
        self.point_sets.names()
    }

    /// Design gradient of the functions whose point gradient is `gradient`.
    pub fn total_sensitivity(
        &self,
        gradient: &PointGradient,
        name: &str,
    ) -> Result<SensitivityMap, ConfigError> {
        let point_set = self.point_sets.require(name)?;
        let total = total_sensitivity(&self.state, point_set, gradient, self.variable_count())?;
        convert_sensitivity_to_dict(&self.variables, &total, gradient.num_functions())
    }

    /// Coordinate perturbation of `name` caused by the design perturbation
    /// `perturbation`; absent variables count as unperturbed.
    pub fn total_sensitivity_prod(
        &self,
        perturbation: &VariableValues,
        name: &str,
    ) -> Result<Vec<Point3>, ConfigError> {
        let point_set = self.point_sets.require(name)?;
        let delta = self.variables.flatten_values(perturbation)?;
        total_sensitivity_prod(&self.state, point_set, &delta)
    }

    /// Registers every design variable, in order, with `sink`.
    pub fn register_with_optimizer<O: OptimizerSink>(&self, sink: &mut O) -> Result<(), O::Error> {
        for variable in self.variables.iter() {
            sink.add_var_group(VariableGroup {
                name: variable.name(),
                size: variable.size(),
                kind: VariableKind::Continuous,
                value: variable.flat_values(),
                lower: variable.lower(),
                upper: variable.upper(),
                scale: variable.scale(),
            })?;
        }
        Ok(())
    }
}
