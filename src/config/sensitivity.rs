//! Sensitivity propagation from point coordinates to design variables.
//!
//! Forward, a point set's coordinates along axis `k` are
//! `E · M · P_k · (dofs0 + J · x)`, where `E` is the point set's evaluation
//! operator, `M` the blend, `P_k` the axis selection and `J` the variable
//! Jacobian. The design gradient of an output is the transpose of that chain
//! applied to the point gradient, one axis at a time.

use std::collections::BTreeMap;

use crate::geom::{Axis, Point3, SparseMatrix, SurfaceState};

use super::ConfigError;
use super::design_var::DesignVariables;
use super::point_set::PointSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Gradient of one or more scalar functions with respect to every
/// coordinate of a point set, shaped `(points, 3, functions)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGradient {
    num_points: usize,
    num_functions: usize,
    data: Vec<f64>,
}

impl PointGradient {
    /// All-zero gradient.
    #[must_use]
    pub fn zeros(num_points: usize, num_functions: usize) -> Self {
        Self {
            num_points,
            num_functions,
            data: vec![0.0; num_points * 3 * num_functions],
        }
    }

    /// Gradient of a single function, one `[dx, dy, dz]` per point.
    #[must_use]
    pub fn from_points(rows: &[[f64; 3]]) -> Self {
        Self {
            num_points: rows.len(),
            num_functions: 1,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    /// Gradients of several functions, each one row per point.
    pub fn from_functions(functions: &[Vec<[f64; 3]>]) -> Result<Self, ConfigError> {
        let num_points = functions.first().map_or(0, Vec::len);
        let mut gradient = Self::zeros(num_points, functions.len());
        for (f, rows) in functions.iter().enumerate() {
            if rows.len() != num_points {
                return Err(ConfigError::DimensionMismatch {
                    what: "function gradient points",
                    expected: num_points,
                    provided: rows.len(),
                });
            }
            for (point, row) in rows.iter().enumerate() {
                for axis in Axis::ALL {
                    gradient.set(point, axis, f, row[axis.index()]);
                }
            }
        }
        Ok(gradient)
    }

    #[must_use]
    pub const fn num_points(&self) -> usize {
        self.num_points
    }

    #[must_use]
    pub const fn num_functions(&self) -> usize {
        self.num_functions
    }

    /// Entry for `point`, `axis` and `function`; `None` out of range.
    #[must_use]
    pub fn get(&self, point: usize, axis: Axis, function: usize) -> Option<f64> {
        self.offset(point, axis, function)
            .and_then(|offset| self.data.get(offset))
            .copied()
    }

    /// Overwrites one entry, returning the previous value. Out-of-range
    /// indices leave the gradient unchanged and return `None`.
    pub fn set(&mut self, point: usize, axis: Axis, function: usize, value: f64) -> Option<f64> {
        let offset = self.offset(point, axis, function)?;
        let slot = self.data.get_mut(offset)?;
        Some(std::mem::replace(slot, value))
    }

    /// `a·self + b·other`, for gradients of the same shape.
    pub fn combine(&self, a: f64, other: &Self, b: f64) -> Result<Self, ConfigError> {
        if (self.num_points, self.num_functions) != (other.num_points, other.num_functions) {
            return Err(ConfigError::DimensionMismatch {
                what: "gradient points",
                expected: self.num_points,
                provided: other.num_points,
            });
        }
        Ok(Self {
            num_points: self.num_points,
            num_functions: self.num_functions,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(x, y)| a * x + b * y)
                .collect(),
        })
    }

    /// Column of function `function` restricted to `axis`.
    fn axis_column(&self, axis: Axis, function: usize) -> Vec<f64> {
        (0..self.num_points)
            .map(|point| self.get(point, axis, function).unwrap_or(0.0))
            .collect()
    }

    fn offset(&self, point: usize, axis: Axis, function: usize) -> Option<usize> {
        (point < self.num_points && function < self.num_functions)
            .then(|| (point * 3 + axis.index()) * self.num_functions + function)
    }
}

/// Design gradient of one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityBlock {
    /// Single function: one entry per variable element.
    Vector(Vec<f64>),
    /// Several functions: `size × functions`, row-major.
    Matrix {
        size: usize,
        functions: usize,
        data: Vec<f64>,
    },
}

impl SensitivityBlock {
    /// Entry for variable element `element` and function `function`.
    #[must_use]
    pub fn get(&self, element: usize, function: usize) -> Option<f64> {
        match self {
            Self::Vector(values) if function == 0 => values.get(element).copied(),
            Self::Vector(_) => None,
            Self::Matrix { size, functions, data } => {
                if element < *size && function < *functions {
                    data.get(element * functions + function).copied()
                } else {
                    None
                }
            }
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Vector(values) => Some(values),
            Self::Matrix { .. } => None,
        }
    }
}

/// Variable name → design gradient.
pub type SensitivityMap = BTreeMap<String, SensitivityBlock>;

/// Accumulates `Σ_k (E·M·P_k·J)ᵀ · G_k` into a row-major
/// `(design count × functions)` buffer.
pub fn total_sensitivity<S: SurfaceState + ?Sized>(
    state: &S,
    point_set: &PointSet,
    gradient: &PointGradient,
    design_count: usize,
) -> Result<Vec<f64>, ConfigError> {
    if gradient.num_points() != point_set.len() {
        return Err(ConfigError::DimensionMismatch {
            what: "gradient points",
            expected: point_set.len(),
            provided: gradient.num_points(),
        });
    }
    let jacobian = state.variable_jacobian();
    check_design_count(jacobian, design_count)?;

    let num_functions = gradient.num_functions();
    let axis_operators = axis_operators(state, point_set)?;

    let contribution = |(axis, operator): (Axis, &SparseMatrix)| -> Result<Vec<f64>, ConfigError> {
        let mut block = vec![0.0; design_count * num_functions];
        for function in 0..num_functions {
            let column = operator.transpose_mul_vec(&gradient.axis_column(axis, function))?;
            for (dv, value) in column.into_iter().enumerate() {
                block[dv * num_functions + function] += value;
            }
        }
        Ok(block)
    };

    #[cfg(feature = "parallel")]
    let blocks: Vec<Vec<f64>> = Axis::ALL
        .into_par_iter()
        .zip(axis_operators.par_iter())
        .map(contribution)
        .collect::<Result<_, _>>()?;

    #[cfg(not(feature = "parallel"))]
    let blocks: Vec<Vec<f64>> = Axis::ALL
        .into_iter()
        .zip(axis_operators.iter())
        .map(contribution)
        .collect::<Result<_, _>>()?;

    let mut total = vec![0.0; design_count * num_functions];
    for block in blocks {
        for (slot, value) in total.iter_mut().zip(block) {
            *slot += value;
        }
    }
    Ok(total)
}

/// Forward product: coordinate perturbation of every point for a design
/// perturbation `delta` (global design vector order).
pub fn total_sensitivity_prod<S: SurfaceState + ?Sized>(
    state: &S,
    point_set: &PointSet,
    delta: &[f64],
) -> Result<Vec<Point3>, ConfigError> {
    check_design_count(state.variable_jacobian(), delta.len())?;

    let mut moved = vec![Point3::ORIGIN; point_set.len()];
    for (axis, operator) in Axis::ALL.into_iter().zip(axis_operators(state, point_set)?) {
        for (point, value) in moved.iter_mut().zip(operator.mul_vec(delta)?) {
            point.set_coord(axis, value);
        }
    }
    Ok(moved)
}

/// Slices a row-major `(design count × functions)` buffer into per-variable
/// blocks in registration order.
pub fn convert_sensitivity_to_dict(
    variables: &DesignVariables,
    total: &[f64],
    num_functions: usize,
) -> Result<SensitivityMap, ConfigError> {
    let expected = variables.count() * num_functions;
    if total.len() != expected {
        return Err(ConfigError::DimensionMismatch {
            what: "sensitivity entries",
            expected,
            provided: total.len(),
        });
    }

    let mut map = SensitivityMap::new();
    let mut start = 0;
    for variable in variables.iter() {
        let end = start + variable.size() * num_functions;
        let data = total[start..end].to_vec();
        let block = if num_functions == 1 {
            SensitivityBlock::Vector(data)
        } else {
            SensitivityBlock::Matrix {
                size: variable.size(),
                functions: num_functions,
                data,
            }
        };
        map.insert(variable.name().to_string(), block);
        start = end;
    }
    Ok(map)
}

/// `A_k = E · M · P_k · J` for the three axes, composed sparsely.
fn axis_operators<S: SurfaceState + ?Sized>(
    state: &S,
    point_set: &PointSet,
) -> Result<[SparseMatrix; 3], ConfigError> {
    let evaluated_blend = point_set.operator().matmul(state.blend())?;
    let jacobian = state.variable_jacobian();
    let dof_count = state.dof_count();
    let compose = |axis: Axis| -> Result<SparseMatrix, ConfigError> {
        let selected = SparseMatrix::axis_selection(dof_count, axis).matmul(jacobian)?;
        Ok(evaluated_blend.matmul(&selected)?)
    };
    Ok([compose(Axis::X)?, compose(Axis::Y)?, compose(Axis::Z)?])
}

fn check_design_count(jacobian: &SparseMatrix, design_count: usize) -> Result<(), ConfigError> {
    if jacobian.cols() == design_count {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            what: "variable jacobian columns",
            expected: design_count,
            provided: jacobian.cols(),
        })
    }
}
