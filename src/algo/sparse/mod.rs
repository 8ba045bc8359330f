//! Sparse matrices and least-squares solvers.
//!
//! [`CsrMatrix`] is the assembly format: triplets in, compressed rows out.
//! The contraction system is rectangular, so [`CholeskySolver`] and
//! [`ConjugateGradientSolver`] work on the normal equations `AᵗA x = Aᵗb`
//! built from it.

mod solver;

pub use solver::{
    CholeskyFactorization, CholeskySolver, ConjugateGradientSolver, FactorDiagnostic,
    LeastSquaresSolver, NormalEquations,
};

use nalgebra::DVector;

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` indexes the entries of row `i`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries at the same position are summed. Explicit zeros are
    /// kept so that the sparsity pattern reflects every pushed position.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({row}, {col}) out of bounds");
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }

        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over the `(col, value)` entries of one row.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Iterate over all stored entries as `(row, col, value)`.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |i| self.row(i).map(move |(j, v)| (i, j, v)))
    }

    /// Value at `(i, j)`, zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.row(i)
            .find(|&(col, _)| col == j)
            .map(|(_, v)| v)
            .unwrap_or(0.0)
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");
        DVector::from_iterator(
            self.rows,
            (0..self.rows).map(|i| self.row(i).map(|(j, v)| v * x[j]).sum::<f64>()),
        )
    }

    /// Multiply the transpose by a vector: y = Aᵗ * x.
    pub fn transpose_mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.rows, "Vector dimension mismatch");
        let mut y = DVector::zeros(self.cols);
        for i in 0..self.rows {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            for (j, v) in self.row(i) {
                y[j] += v * xi;
            }
        }
        y
    }

    /// Triplets of the normal matrix AᵗA.
    ///
    /// Every diagonal position appears at least once, even when its column of
    /// `A` is empty, so factorizations see the full diagonal.
    pub fn normal_triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut out: Vec<(usize, usize, f64)> = (0..self.cols).map(|j| (j, j, 0.0)).collect();
        for i in 0..self.rows {
            let entries: Vec<(usize, f64)> = self.row(i).collect();
            for &(j, vj) in &entries {
                for &(k, vk) in &entries {
                    out.push((j, k, vj * vk));
                }
            }
        }
        out
    }

    /// The normal matrix AᵗA in CSR form.
    pub fn normal_matrix(&self) -> CsrMatrix {
        CsrMatrix::from_triplets(self.cols, self.cols, self.normal_triplets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rectangular() -> CsrMatrix {
        // [ 1  2 ]
        // [ 0  3 ]
        // [ 4  0 ]
        CsrMatrix::from_triplets(3, 2, vec![(0, 0, 1.0), (2, 0, 4.0), (0, 1, 2.0), (1, 1, 3.0)])
    }

    #[test]
    fn test_duplicates_are_summed() {
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 2.0), (1, 1, 3.0), (0, 0, 2.0)]);
        assert_eq!(a.nnz(), 2);
        assert_relative_eq!(a.get(0, 0), 4.0);
        assert_relative_eq!(a.get(0, 1), 0.0);
    }

    #[test]
    fn test_empty_rows() {
        let a = CsrMatrix::from_triplets(4, 4, vec![(3, 1, 1.0)]);
        assert_eq!(a.row(0).count(), 0);
        assert_eq!(a.row(2).count(), 0);
        assert_eq!(a.row(3).collect::<Vec<_>>(), vec![(1, 1.0)]);
    }

    #[test]
    fn test_mul_and_transpose_mul() {
        let a = rectangular();
        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 1.0]));
        assert_eq!(y.as_slice(), &[3.0, 3.0, 4.0]);

        let z = a.transpose_mul_vec(&DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_eq!(z.as_slice(), &[5.0, 5.0]);
    }

    #[test]
    fn test_normal_matrix() {
        let ata = rectangular().normal_matrix();
        // AᵗA = [[17, 2], [2, 13]]
        assert_relative_eq!(ata.get(0, 0), 17.0);
        assert_relative_eq!(ata.get(0, 1), 2.0);
        assert_relative_eq!(ata.get(1, 0), 2.0);
        assert_relative_eq!(ata.get(1, 1), 13.0);
    }

    #[test]
    fn test_normal_matrix_keeps_empty_diagonal() {
        let a = CsrMatrix::from_triplets(1, 3, vec![(0, 0, 1.0)]);
        let ata = a.normal_matrix();
        assert_eq!(ata.row(2).collect::<Vec<_>>(), vec![(2, 0.0)]);
    }
}
