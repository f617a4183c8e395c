//! Design-variable catalogue and its flattening rules.
//!
//! Values cross the API boundary as flat arrays in column-major (Fortran)
//! order. Inside a [`DesignVariable`] they are kept row-major for the
//! declared shape, so [`DesignVariable::element`] indexes the way the shape
//! reads.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Name → flattened (column-major) values.
pub type VariableValues = BTreeMap<String, Vec<f64>>;

/// A named, shaped, bounded, scaled optimization parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignVariable {
    name: String,
    shape: Vec<usize>,
    size: usize,
    value: Vec<f64>,
    lower: Option<f64>,
    upper: Option<f64>,
    scale: f64,
}

impl DesignVariable {
    /// New variable of `shape` with every element set to `initial`.
    ///
    /// An empty shape declares a scalar.
    pub fn new(
        name: impl Into<String>,
        shape: impl Into<Vec<usize>>,
        initial: f64,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let shape = shape.into();
        if name.is_empty() {
            return Err(ConfigError::InvalidVariable {
                name,
                reason: "name must not be empty".to_string(),
            });
        }
        if shape.contains(&0) {
            return Err(ConfigError::InvalidVariable {
                name,
                reason: format!("shape {shape:?} has a zero extent"),
            });
        }
        let size = shape.iter().product();
        Ok(Self {
            name,
            shape,
            size,
            value: vec![initial; size],
            lower: None,
            upper: None,
            scale: 1.0,
        })
    }

    /// Scalar variable.
    pub fn scalar(name: impl Into<String>, initial: f64) -> Result<Self, ConfigError> {
        Self::new(name, Vec::new(), initial)
    }

    pub fn with_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Result<Self, ConfigError> {
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Err(ConfigError::InvalidVariable {
                    name: self.name,
                    reason: format!("lower bound {lo} exceeds upper bound {hi}"),
                });
            }
        }
        self.lower = lower;
        self.upper = upper;
        Ok(self)
    }

    pub fn with_scale(mut self, scale: f64) -> Result<Self, ConfigError> {
        if !scale.is_finite() || scale == 0.0 {
            return Err(ConfigError::InvalidVariable {
                name: self.name,
                reason: format!("scale must be finite and non-zero, got {scale}"),
            });
        }
        self.scale = scale;
        Ok(self)
    }

    /// Replaces the value with a column-major flat array.
    pub fn with_values(mut self, values: &[f64]) -> Result<Self, ConfigError> {
        self.check_len(values)?;
        self.write_flat(values);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of scalar entries (product of the shape).
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn lower(&self) -> Option<f64> {
        self.lower
    }

    #[must_use]
    pub const fn upper(&self) -> Option<f64> {
        self.upper
    }

    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Element at a multi-index of the declared shape.
    #[must_use]
    pub fn element(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &extent) in index.iter().zip(&self.shape) {
            if i >= extent {
                return None;
            }
            offset = offset * extent + i;
        }
        self.value.get(offset).copied()
    }

    /// Column-major flattened copy of the value.
    #[must_use]
    pub fn flat_values(&self) -> Vec<f64> {
        column_major_order(&self.shape)
            .into_iter()
            .map(|row_major| self.value[row_major])
            .collect()
    }

    fn check_len(&self, values: &[f64]) -> Result<(), ConfigError> {
        if values.len() == self.size {
            Ok(())
        } else {
            Err(ConfigError::SizeMismatch {
                name: self.name.clone(),
                expected: self.size,
                provided: values.len(),
            })
        }
    }

    fn write_flat(&mut self, values: &[f64]) {
        for (&source, row_major) in values.iter().zip(column_major_order(&self.shape)) {
            self.value[row_major] = source;
        }
    }
}

/// Row-major offset of each column-major position for `shape`.
fn column_major_order(shape: &[usize]) -> Vec<usize> {
    let size: usize = shape.iter().product();
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    (0..size)
        .map(|flat| {
            let mut rest = flat;
            let mut offset = 0;
            for (extent, stride) in shape.iter().zip(&strides) {
                offset += (rest % extent) * stride;
                rest /= extent;
            }
            offset
        })
        .collect()
}

/// Serializable description of a design variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignVariableSpec {
    pub name: String,
    pub shape: Vec<usize>,
    /// Column-major initial values; empty means "all `initial`".
    pub values: Vec<f64>,
    pub initial: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub scale: f64,
}

impl Default for DesignVariableSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            shape: Vec::new(),
            values: Vec::new(),
            initial: 0.0,
            lower: None,
            upper: None,
            scale: 1.0,
        }
    }
}

impl TryFrom<DesignVariableSpec> for DesignVariable {
    type Error = ConfigError;

    fn try_from(spec: DesignVariableSpec) -> Result<Self, Self::Error> {
        let mut variable = Self::new(spec.name, spec.shape, spec.initial)?
            .with_bounds(spec.lower, spec.upper)?
            .with_scale(spec.scale)?;
        if !spec.values.is_empty() {
            variable = variable.with_values(&spec.values)?;
        }
        Ok(variable)
    }
}

impl From<&DesignVariable> for DesignVariableSpec {
    fn from(variable: &DesignVariable) -> Self {
        Self {
            name: variable.name.clone(),
            shape: variable.shape.clone(),
            values: variable.flat_values(),
            initial: 0.0,
            lower: variable.lower,
            upper: variable.upper,
            scale: variable.scale,
        }
    }
}

/// Registration-ordered set of design variables.
#[derive(Debug, Clone, Default)]
pub struct DesignVariables {
    variables: Vec<DesignVariable>,
    index: HashMap<String, usize>,
}

impl DesignVariables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, variable: DesignVariable) -> Result<(), ConfigError> {
        if self.index.contains_key(variable.name()) {
            return Err(ConfigError::DuplicateVariable(variable.name));
        }
        self.index.insert(variable.name.clone(), self.variables.len());
        self.variables.push(variable);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DesignVariable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesignVariable> {
        self.variables.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(DesignVariable::name).collect()
    }

    /// Total scalar count across all variables.
    #[must_use]
    pub fn count(&self) -> usize {
        self.variables.iter().map(DesignVariable::size).sum()
    }

    /// Writes every variable from `values`.
    ///
    /// Validation covers all variables before anything is written. Entries
    /// for unregistered names are ignored.
    pub fn set_values(&mut self, values: &VariableValues) -> Result<(), ConfigError> {
        let mut staged = Vec::with_capacity(self.variables.len());
        for variable in &self.variables {
            let flat = values
                .get(variable.name())
                .ok_or_else(|| ConfigError::UnknownVariable(variable.name.clone()))?;
            variable.check_len(flat)?;
            staged.push(flat);
        }

        for (variable, flat) in self.variables.iter_mut().zip(staged) {
            variable.write_flat(flat);
        }

        for name in values.keys().filter(|name| !self.index.contains_key(*name)) {
            log::debug!("ignoring value for unregistered design variable '{name}'");
        }
        Ok(())
    }

    /// Name → column-major flattened value.
    #[must_use]
    pub fn values(&self) -> VariableValues {
        self.variables
            .iter()
            .map(|variable| (variable.name.clone(), variable.flat_values()))
            .collect()
    }

    /// Global design vector: each variable's column-major values,
    /// concatenated in registration order.
    #[must_use]
    pub fn flattened(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.count());
        for variable in &self.variables {
            flat.extend(variable.flat_values());
        }
        flat
    }

    /// Global design vector for a partial map of values, zero where absent.
    /// Lengths of present entries are checked.
    pub(crate) fn flatten_values(&self, values: &VariableValues) -> Result<Vec<f64>, ConfigError> {
        let mut flat = Vec::with_capacity(self.count());
        for variable in &self.variables {
            match values.get(variable.name()) {
                Some(entry) => {
                    variable.check_len(entry)?;
                    flat.extend_from_slice(entry);
                }
                None => flat.extend(std::iter::repeat_n(0.0, variable.size())),
            }
        }
        Ok(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_order_for_matrix() {
        // 2x3 row-major [[a b c], [d e f]] in column-major reads a d b e c f
        assert_eq!(column_major_order(&[2, 3]), vec![0, 3, 1, 4, 2, 5]);
        assert_eq!(column_major_order(&[4]), vec![0, 1, 2, 3]);
        assert_eq!(column_major_order(&[]), vec![0]);
    }

    #[test]
    fn column_major_order_for_rank_three() {
        let order = column_major_order(&[2, 2, 2]);
        // first index varies fastest
        assert_eq!(order, vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn values_are_written_column_major() {
        let variable = DesignVariable::new("twist", vec![2, 3], 0.0)
            .unwrap()
            .with_values(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0])
            .unwrap();
        assert_eq!(variable.size(), 6);
        assert_eq!(variable.element(&[0, 0]), Some(1.0));
        assert_eq!(variable.element(&[0, 2]), Some(3.0));
        assert_eq!(variable.element(&[1, 0]), Some(4.0));
        assert_eq!(variable.element(&[1, 2]), Some(6.0));
        assert_eq!(variable.element(&[2, 0]), None);
        assert_eq!(variable.element(&[0]), None);
        assert_eq!(variable.flat_values(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn scalar_variable_has_size_one() {
        let variable = DesignVariable::scalar("span", 2.0).unwrap();
        assert_eq!(variable.size(), 1);
        assert!(variable.shape().is_empty());
        assert_eq!(variable.element(&[]), Some(2.0));
    }

    #[test]
    fn invalid_variables_are_rejected() {
        assert!(matches!(
            DesignVariable::new("", vec![1], 0.0),
            Err(ConfigError::InvalidVariable { .. })
        ));
        assert!(matches!(
            DesignVariable::new("x", vec![2, 0], 0.0),
            Err(ConfigError::InvalidVariable { .. })
        ));
        let bounded = DesignVariable::scalar("x", 0.0).unwrap();
        assert!(bounded.clone().with_bounds(Some(1.0), Some(-1.0)).is_err());
        assert!(bounded.clone().with_scale(0.0).is_err());
        assert!(matches!(
            bounded.with_values(&[1.0, 2.0]),
            Err(ConfigError::SizeMismatch { expected: 1, provided: 2, .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut variables = DesignVariables::new();
        variables.add(DesignVariable::scalar("a", 0.0).unwrap()).unwrap();
        let err = variables.add(DesignVariable::scalar("a", 1.0).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateVariable(name) if name == "a"));
        assert_eq!(variables.len(), 1);
    }

    #[test]
    fn set_values_is_all_or_nothing() {
        let mut variables = DesignVariables::new();
        variables.add(DesignVariable::new("a", vec![2], 1.0).unwrap()).unwrap();
        variables.add(DesignVariable::scalar("b", 1.0).unwrap()).unwrap();

        let mut values = VariableValues::new();
        values.insert("a".to_string(), vec![5.0, 6.0]);
        let err = variables.set_values(&values).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariable(name) if name == "b"));
        assert_eq!(variables.flattened(), vec![1.0, 1.0, 1.0]);

        values.insert("b".to_string(), vec![7.0, 8.0]);
        assert!(matches!(
            variables.set_values(&values),
            Err(ConfigError::SizeMismatch { .. })
        ));
        assert_eq!(variables.flattened(), vec![1.0, 1.0, 1.0]);

        values.insert("b".to_string(), vec![7.0]);
        values.insert("unused".to_string(), vec![0.0]);
        variables.set_values(&values).unwrap();
        assert_eq!(variables.flattened(), vec![5.0, 6.0, 7.0]);
        assert_eq!(variables.count(), 3);
        assert_eq!(variables.names(), vec!["a", "b"]);
    }

    #[test]
    fn partial_values_flatten_with_zeros() {
        let mut variables = DesignVariables::new();
        variables.add(DesignVariable::new("a", vec![2], 1.0).unwrap()).unwrap();
        variables.add(DesignVariable::scalar("b", 1.0).unwrap()).unwrap();
        let mut values = VariableValues::new();
        values.insert("b".to_string(), vec![3.0]);
        assert_eq!(variables.flatten_values(&values).unwrap(), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn spec_round_trip() {
        let spec = DesignVariableSpec {
            name: "chord".to_string(),
            shape: vec![3],
            values: vec![1.0, 2.0, 3.0],
            lower: Some(0.0),
            upper: Some(5.0),
            scale: 0.5,
            ..Default::default()
        };
        let variable = DesignVariable::try_from(spec.clone()).unwrap();
        assert_eq!(variable.scale(), 0.5);
        assert_eq!(variable.lower(), Some(0.0));
        assert_eq!(DesignVariableSpec::from(&variable), spec);
    }
}
