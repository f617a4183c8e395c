//! Compressed sparse row operators.
//!
//! Every linear map in the engine (evaluation operators, the blend from dofs
//! to control points, the variable Jacobian, axis selections) is a
//! [`SparseMatrix`]. Only the kernels the engine needs are provided:
//! construction from triplets, sparse·sparse products, and products with
//! dense vectors in both directions.

use super::core::Axis;

/// Errors raised by sparse operator kernels.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SparseError {
    #[error("{op}: operand shapes {left:?} and {right:?} are incompatible")]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("entry ({row}, {col}) lies outside a {rows}x{cols} operator")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("entry ({row}, {col}) is not finite")]
    NonFinite { row: usize, col: usize },
}

/// Row-major compressed sparse matrix of `f64`.
///
/// Column indices within a row are strictly increasing and duplicate
/// triplets are summed on construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    row_ptrs: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// An operator with no stored entries.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptrs: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::scaled_identity(n, 1.0)
    }

    #[must_use]
    pub fn scaled_identity(n: usize, scale: f64) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptrs: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![scale; n],
        }
    }

    /// Selection operator of shape `block × 3·block` extracting the `axis`
    /// block from a stacked `[x; y; z]` vector.
    #[must_use]
    pub fn axis_selection(block: usize, axis: Axis) -> Self {
        let offset = axis.index() * block;
        Self {
            rows: block,
            cols: 3 * block,
            row_ptrs: (0..=block).collect(),
            col_indices: (offset..offset + block).collect(),
            values: vec![1.0; block],
        }
    }

    /// Builds an operator from `(row, col, value)` triplets.
    ///
    /// Duplicate coordinates are summed; explicit zeros are kept out of the
    /// structure.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, SparseError> {
        let mut per_row: Vec<Vec<(usize, f64)>> = vec![Vec::new(); rows];
        for &(row, col, value) in triplets {
            if row >= rows || col >= cols {
                return Err(SparseError::OutOfBounds { row, col, rows, cols });
            }
            if !value.is_finite() {
                return Err(SparseError::NonFinite { row, col });
            }
            per_row[row].push((col, value));
        }

        let mut matrix = Self::zeros(rows, cols);
        matrix.row_ptrs.clear();
        matrix.row_ptrs.push(0);
        for mut entries in per_row {
            entries.sort_by_key(|&(col, _)| col);
            let mut last: Option<usize> = None;
            for (col, value) in entries {
                if last == Some(col) {
                    if let Some(slot) = matrix.values.last_mut() {
                        *slot += value;
                    }
                } else {
                    matrix.col_indices.push(col);
                    matrix.values.push(value);
                    last = Some(col);
                }
            }
            matrix.row_ptrs.push(matrix.col_indices.len());
        }
        matrix.prune_zeros();
        Ok(matrix)
    }

    /// Builds an operator from dense row-major rows. Mostly useful in tests.
    pub fn from_dense(rows: &[Vec<f64>]) -> Result<Self, SparseError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut triplets = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(SparseError::ShapeMismatch {
                    op: "from_dense",
                    left: (r, row.len()),
                    right: (rows.len(), cols),
                });
            }
            for (c, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    triplets.push((r, c, value));
                }
            }
        }
        Self::from_triplets(rows.len(), cols, &triplets)
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored entries of `row` as `(col, value)` pairs.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = if row < self.rows {
            (self.row_ptrs[row], self.row_ptrs[row + 1])
        } else {
            (0, 0)
        };
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Value at `(row, col)`, zero when not stored or out of range.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows {
            return 0.0;
        }
        let start = self.row_ptrs[row];
        let end = self.row_ptrs[row + 1];
        self.col_indices[start..end]
            .binary_search(&col)
            .map_or(0.0, |offset| self.values[start + offset])
    }

    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for value in &mut out.values {
            *value *= factor;
        }
        out.prune_zeros();
        out
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.cols + 1];
        for &col in &self.col_indices {
            counts[col + 1] += 1;
        }
        for i in 0..self.cols {
            counts[i + 1] += counts[i];
        }
        let row_ptrs = counts.clone();
        let mut next = counts;
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0; self.nnz()];
        for row in 0..self.rows {
            for (col, value) in self.row(row) {
                let slot = next[col];
                col_indices[slot] = row;
                values[slot] = value;
                next[col] += 1;
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            row_ptrs,
            col_indices,
            values,
        }
    }

    /// Sparse product `self · rhs`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self, SparseError> {
        if self.cols != rhs.rows {
            return Err(SparseError::ShapeMismatch {
                op: "matmul",
                left: self.shape(),
                right: rhs.shape(),
            });
        }

        let mut accumulator = vec![0.0; rhs.cols];
        let mut marker = vec![usize::MAX; rhs.cols];
        let mut touched: Vec<usize> = Vec::new();
        let mut out = Self::zeros(self.rows, rhs.cols);
        out.row_ptrs.clear();
        out.row_ptrs.push(0);

        for row in 0..self.rows {
            touched.clear();
            for (k, a) in self.row(row) {
                for (col, b) in rhs.row(k) {
                    if marker[col] != row {
                        marker[col] = row;
                        accumulator[col] = 0.0;
                        touched.push(col);
                    }
                    accumulator[col] += a * b;
                }
            }
            touched.sort_unstable();
            for &col in &touched {
                let value = accumulator[col];
                if value != 0.0 {
                    out.col_indices.push(col);
                    out.values.push(value);
                }
            }
            out.row_ptrs.push(out.col_indices.len());
        }
        Ok(out)
    }

    /// Dense product `self · x`.
    pub fn mul_vec(&self, x: &[f64]) -> Result<Vec<f64>, SparseError> {
        if x.len() != self.cols {
            return Err(SparseError::ShapeMismatch {
                op: "mul_vec",
                left: self.shape(),
                right: (x.len(), 1),
            });
        }
        Ok((0..self.rows)
            .map(|row| self.row(row).map(|(col, value)| value * x[col]).sum())
            .collect())
    }

    /// Dense product `selfᵀ · y` without materialising the transpose.
    pub fn transpose_mul_vec(&self, y: &[f64]) -> Result<Vec<f64>, SparseError> {
        if y.len() != self.rows {
            return Err(SparseError::ShapeMismatch {
                op: "transpose_mul_vec",
                left: (self.cols, self.rows),
                right: (y.len(), 1),
            });
        }
        let mut out = vec![0.0; self.cols];
        for (row, &weight) in y.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            for (col, value) in self.row(row) {
                out[col] += value * weight;
            }
        }
        Ok(out)
    }

    /// Dense row-major copy, for diagnostics and tests.
    #[must_use]
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.cols]; self.rows];
        for (row, dense_row) in dense.iter_mut().enumerate() {
            for (col, value) in self.row(row) {
                dense_row[col] = value;
            }
        }
        dense
    }

    fn prune_zeros(&mut self) {
        if self.values.iter().all(|&v| v != 0.0) {
            return;
        }
        let mut row_ptrs = Vec::with_capacity(self.rows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        row_ptrs.push(0);
        for row in 0..self.rows {
            for (col, value) in self.row(row) {
                if value != 0.0 {
                    col_indices.push(col);
                    values.push(value);
                }
            }
            row_ptrs.push(col_indices.len());
        }
        self.row_ptrs = row_ptrs;
        self.col_indices = col_indices;
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let cols = b.first().map_or(0, Vec::len);
        a.iter()
            .map(|row| {
                (0..cols)
                    .map(|c| row.iter().zip(b).map(|(x, b_row)| x * b_row[c]).sum())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn duplicate_triplets_are_summed() {
        let m = SparseMatrix::from_triplets(2, 3, &[(0, 2, 1.0), (0, 0, 2.0), (0, 2, 0.5)])
            .unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 2), 1.5);
        assert_eq!(m.get(0, 0), 2.0);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.row(0).collect::<Vec<_>>(), vec![(0, 2.0), (2, 1.5)]);
    }

    #[test]
    fn cancelling_triplets_leave_no_entry() {
        let m = SparseMatrix::from_triplets(1, 1, &[(0, 0, 1.0), (0, 0, -1.0)]).unwrap();
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn out_of_range_triplet_is_rejected() {
        let err = SparseMatrix::from_triplets(2, 2, &[(2, 0, 1.0)]).unwrap_err();
        assert_eq!(
            err,
            SparseError::OutOfBounds {
                row: 2,
                col: 0,
                rows: 2,
                cols: 2
            }
        );
        assert!(matches!(
            SparseMatrix::from_triplets(1, 1, &[(0, 0, f64::NAN)]),
            Err(SparseError::NonFinite { row: 0, col: 0 })
        ));
    }

    #[test]
    fn matmul_matches_dense_product() {
        let a = vec![vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 0.0]];
        let b = vec![vec![0.0, 1.0], vec![4.0, 0.0], vec![1.0, 1.0]];
        let sa = SparseMatrix::from_dense(&a).unwrap();
        let sb = SparseMatrix::from_dense(&b).unwrap();

        let product = sa.matmul(&sb).unwrap();
        assert_eq!(product.shape(), (2, 2));
        assert_eq!(product.to_dense(), dense_matmul(&a, &b));
    }

    #[test]
    fn matmul_rejects_incompatible_shapes() {
        let a = SparseMatrix::identity(2);
        let b = SparseMatrix::identity(3);
        assert!(matches!(
            a.matmul(&b),
            Err(SparseError::ShapeMismatch { op: "matmul", .. })
        ));
    }

    #[test]
    fn transpose_swaps_entries() {
        let m = SparseMatrix::from_dense(&[vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 4.0]]).unwrap();
        let t = m.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(
            t.to_dense(),
            vec![vec![1.0, 0.0], vec![0.0, 3.0], vec![2.0, 4.0]]
        );
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn transpose_product_matches_explicit_transpose() {
        let m = SparseMatrix::from_dense(&[vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 4.0]]).unwrap();
        let y = [2.0, -1.0];
        assert_eq!(
            m.transpose_mul_vec(&y).unwrap(),
            m.transpose().mul_vec(&y).unwrap()
        );
        assert_eq!(m.mul_vec(&[1.0, 1.0, 1.0]).unwrap(), vec![3.0, 7.0]);
        assert!(m.mul_vec(&[1.0]).is_err());
        assert!(m.transpose_mul_vec(&[1.0]).is_err());
    }

    #[test]
    fn axis_selection_extracts_block() {
        let stacked = [1.0, 2.0, 10.0, 20.0, 100.0, 200.0];
        let select_y = SparseMatrix::axis_selection(2, Axis::Y);
        assert_eq!(select_y.shape(), (2, 6));
        assert_eq!(select_y.mul_vec(&stacked).unwrap(), vec![10.0, 20.0]);

        let select_z = SparseMatrix::axis_selection(2, Axis::Z);
        assert_eq!(select_z.mul_vec(&stacked).unwrap(), vec![100.0, 200.0]);
    }

    #[test]
    fn scaled_identity_scales() {
        let m = SparseMatrix::scaled_identity(3, 2.0);
        assert_eq!(m.mul_vec(&[1.0, 2.0, 3.0]).unwrap(), vec![2.0, 4.0, 6.0]);
        assert_eq!(m.scaled(0.0).nnz(), 0);
    }
}
