//! Least-squares solver adapters for the contraction system.
//!
//! The contraction system `A x = b` is overdetermined (`2n × n`), so both
//! solvers work on the normal equations `AᵗA x = Aᵗb`. A solver is used in
//! two steps: [`LeastSquaresSolver::factor`] once per contraction step, then
//! [`LeastSquaresSolver::solve`] once per coordinate channel.
//!
//! Singular or ill-conditioned systems are reported as
//! [`SkeletonError::Numerical`], never silently solved.

use std::fmt;

use log::trace;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use super::CsrMatrix;
use crate::error::{Result, SkeletonError};

/// Conditioning information gathered while factoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FactorDiagnostic {
    /// Natural log of the determinant of AᵗA, when the solver computes it.
    pub log_determinant: Option<f64>,
    /// Smallest squared Cholesky pivot relative to its diagonal entry.
    pub min_relative_pivot: Option<f64>,
}

/// A sparse linear least-squares solver.
pub trait LeastSquaresSolver {
    /// Reusable result of the factor step.
    type Factorization;

    /// Prepare to solve `min |A x - b|` for several right-hand sides.
    fn factor(&self, a: &CsrMatrix) -> Result<(Self::Factorization, FactorDiagnostic)>;

    /// Solve for one right-hand side of length `a.nrows()`.
    fn solve(&self, factorization: &Self::Factorization, b: &DVector<f64>) -> Result<DVector<f64>>;
}

/// Reject a right-hand side of the wrong length.
fn check_rhs(a: &CsrMatrix, b: &DVector<f64>) -> Result<()> {
    if b.len() != a.nrows() {
        return Err(SkeletonError::numerical(
            "solve",
            format!("right-hand side has {} rows, system has {}", b.len(), a.nrows()),
        ));
    }
    Ok(())
}

/// Reject a solution containing NaN or infinity.
fn check_finite(x: DVector<f64>) -> Result<DVector<f64>> {
    match x.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(SkeletonError::numerical(
            "solve",
            format!("non-finite value in solution at row {}", i),
        )),
        None => Ok(x),
    }
}

/// Diagonal of AᵗA, failing if any column of `A` is empty or not finite.
fn normal_diagonal(ata: &CsrMatrix) -> Result<Vec<f64>> {
    let diag: Vec<f64> = (0..ata.nrows()).map(|j| ata.get(j, j)).collect();
    if let Some(j) = diag.iter().position(|&d| !(d.is_finite() && d > 0.0)) {
        return Err(SkeletonError::numerical(
            "factorization",
            format!("normal matrix has diagonal {} in column {}", diag[j], j),
        ));
    }
    Ok(diag)
}

// ==================== Cholesky ====================

/// Direct solver: sparse Cholesky factorization of AᵗA.
///
/// The factorization runs in the vertex order the mesh hands out, with no
/// fill-reducing permutation, so fill-in (and memory) grows quickly past a
/// few tens of thousands of vertices. Use [`ConjugateGradientSolver`] for
/// large meshes.
#[derive(Debug, Clone, Copy)]
pub struct CholeskySolver {
    pivot_tolerance: f64,
}

impl CholeskySolver {
    /// Create a solver with the default pivot tolerance of `1e-12`.
    pub fn new() -> Self {
        Self {
            pivot_tolerance: 1e-12,
        }
    }

    /// Smallest accepted `L_jj² / (AᵗA)_jj` before the system counts as
    /// singular.
    pub fn with_pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.pivot_tolerance = tolerance;
        self
    }
}

impl Default for CholeskySolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Factored normal equations plus the original matrix for forming Aᵗb.
pub struct CholeskyFactorization {
    a: CsrMatrix,
    cholesky: CscCholesky<f64>,
}

impl fmt::Debug for CholeskyFactorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CholeskyFactorization")
            .field("rows", &self.a.nrows())
            .field("cols", &self.a.ncols())
            .finish_non_exhaustive()
    }
}

impl LeastSquaresSolver for CholeskySolver {
    type Factorization = CholeskyFactorization;

    fn factor(&self, a: &CsrMatrix) -> Result<(CholeskyFactorization, FactorDiagnostic)> {
        let n = a.ncols();
        if n == 0 {
            return Err(SkeletonError::numerical("factorization", "system has no unknowns"));
        }

        let ata = a.normal_matrix();
        let diag = normal_diagonal(&ata)?;

        let mut coo = CooMatrix::new(n, n);
        for (i, j, v) in ata.triplets() {
            coo.push(i, j, v);
        }
        let csc = CscMatrix::from(&coo);

        let cholesky = CscCholesky::factor(&csc).map_err(|e| {
            SkeletonError::numerical("factorization", format!("cholesky failed: {:?}", e))
        })?;

        let mut log_det = 0.0;
        let mut min_pivot = f64::INFINITY;
        let mut min_col = 0;
        let l = cholesky.l();
        for j in 0..n {
            let col = l.col(j);
            let pivot = col
                .row_indices()
                .iter()
                .zip(col.values())
                .find(|&(&row, _)| row == j)
                .map(|(_, &v)| v)
                .unwrap_or(0.0);
            let relative = pivot * pivot / diag[j];
            if relative < min_pivot {
                min_pivot = relative;
                min_col = j;
            }
            log_det += 2.0 * pivot.abs().ln();
        }

        if !(min_pivot.is_finite() && min_pivot >= self.pivot_tolerance) {
            return Err(SkeletonError::numerical(
                "factorization",
                format!(
                    "matrix is singular or ill-conditioned: relative pivot {:.3e} in column {}",
                    min_pivot, min_col
                ),
            ));
        }

        trace!(
            "cholesky: n={} nnz(AᵗA)={} log det={:.4} min pivot={:.3e}",
            n,
            ata.nnz(),
            log_det,
            min_pivot
        );

        Ok((
            CholeskyFactorization {
                a: a.clone(),
                cholesky,
            },
            FactorDiagnostic {
                log_determinant: Some(log_det),
                min_relative_pivot: Some(min_pivot),
            },
        ))
    }

    fn solve(&self, factorization: &CholeskyFactorization, b: &DVector<f64>) -> Result<DVector<f64>> {
        check_rhs(&factorization.a, b)?;
        let atb = factorization.a.transpose_mul_vec(b);
        let rhs = DMatrix::from_column_slice(atb.len(), 1, atb.as_slice());
        let x = factorization.cholesky.solve(&rhs);
        check_finite(x.column(0).into_owned())
    }
}

// ==================== Conjugate Gradient ====================

/// Iterative solver: Jacobi-preconditioned conjugate gradient on AᵗA.
///
/// Cannot certify that the system is non-singular; a consistent singular
/// system may converge to one of its solutions.
#[derive(Debug, Clone, Copy)]
pub struct ConjugateGradientSolver {
    /// Iteration cap per right-hand side.
    pub max_iterations: usize,
    /// Relative residual at which iteration stops.
    pub tolerance: f64,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-10,
        }
    }
}

/// Explicit normal equations used by the iterative solver.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    a: CsrMatrix,
    ata: CsrMatrix,
    inv_diag: DVector<f64>,
}

impl LeastSquaresSolver for ConjugateGradientSolver {
    type Factorization = NormalEquations;

    fn factor(&self, a: &CsrMatrix) -> Result<(NormalEquations, FactorDiagnostic)> {
        if a.ncols() == 0 {
            return Err(SkeletonError::numerical("factorization", "system has no unknowns"));
        }
        let ata = a.normal_matrix();
        let diag = normal_diagonal(&ata)?;
        let inv_diag = DVector::from_iterator(diag.len(), diag.iter().map(|d| 1.0 / d));
        Ok((
            NormalEquations {
                a: a.clone(),
                ata,
                inv_diag,
            },
            FactorDiagnostic::default(),
        ))
    }

    fn solve(&self, normal: &NormalEquations, b: &DVector<f64>) -> Result<DVector<f64>> {
        check_rhs(&normal.a, b)?;
        let atb = normal.a.transpose_mul_vec(b);
        let x = conjugate_gradient(
            &normal.ata,
            &atb,
            &normal.inv_diag,
            self.max_iterations,
            self.tolerance,
        )?;
        check_finite(x)
    }
}

/// Solve `A x = b` for symmetric positive definite `A` with a diagonal
/// preconditioner given as the inverse diagonal.
fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    inv_diag: &DVector<f64>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    let mut x = DVector::zeros(n);

    let b_norm = b.norm();
    if b_norm < 1e-300 {
        return Ok(x);
    }

    let mut r = b.clone();
    let mut z = r.component_mul(inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 0..max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if !(p_ap.is_finite() && p_ap > 0.0) {
            return Err(SkeletonError::numerical(
                "solve",
                format!("conjugate gradient breakdown at iteration {}", iter),
            ));
        }
        let alpha = rz / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        if r.norm() / b_norm < tolerance {
            return Ok(x);
        }

        z = r.component_mul(inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    Err(SkeletonError::numerical(
        "solve",
        format!("conjugate gradient did not converge in {} iterations", max_iter),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Overdetermined system with exact solution (1, 2).
    fn overdetermined() -> (CsrMatrix, DVector<f64>) {
        // [ 1  0 ]        [ 1 ]
        // [ 0  1 ] x  =   [ 2 ]
        // [ 1  1 ]        [ 3 ]
        let a = CsrMatrix::from_triplets(
            3,
            2,
            vec![(0, 0, 1.0), (1, 1, 1.0), (2, 0, 1.0), (2, 1, 1.0)],
        );
        (a, DVector::from_vec(vec![1.0, 2.0, 3.0]))
    }

    #[test]
    fn test_cholesky_exact_least_squares() {
        let (a, b) = overdetermined();
        let solver = CholeskySolver::new();
        let (f, diag) = solver.factor(&a).unwrap();
        let x = solver.solve(&f, &b).unwrap();

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        // det(AᵗA) = det([[2, 1], [1, 2]]) = 3
        assert_relative_eq!(diag.log_determinant.unwrap(), 3.0f64.ln(), epsilon = 1e-12);
        assert!(diag.min_relative_pivot.unwrap() > 0.1);
    }

    #[test]
    fn test_cholesky_inconsistent_system() {
        // Fit a constant to 1, 2, 6: the mean is 3.
        let a = CsrMatrix::from_triplets(3, 1, vec![(0, 0, 1.0), (1, 0, 1.0), (2, 0, 1.0)]);
        let b = DVector::from_vec(vec![1.0, 2.0, 6.0]);
        let solver = CholeskySolver::new();
        let (f, _) = solver.factor(&a).unwrap();
        assert_relative_eq!(solver.solve(&f, &b).unwrap()[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_empty_column() {
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (1, 0, 1.0)]);
        let err = CholeskySolver::new().factor(&a).unwrap_err();
        assert!(matches!(err, SkeletonError::Numerical { stage: "factorization", .. }));
    }

    #[test]
    fn test_cholesky_rejects_rank_deficient() {
        // Second column duplicates the first.
        let a = CsrMatrix::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 2.0), (1, 1, 2.0)],
        );
        assert!(CholeskySolver::new().factor(&a).is_err());
    }

    #[test]
    fn test_wrong_rhs_length() {
        let (a, _) = overdetermined();
        let solver = CholeskySolver::new();
        let (f, _) = solver.factor(&a).unwrap();
        assert!(solver.solve(&f, &DVector::zeros(2)).is_err());
    }

    #[test]
    fn test_cg_matches_cholesky() {
        let a = CsrMatrix::from_triplets(
            4,
            3,
            vec![
                (0, 0, 4.0),
                (0, 1, -1.0),
                (1, 1, 3.0),
                (1, 2, 1.0),
                (2, 0, 1.0),
                (2, 2, 5.0),
                (3, 0, 0.5),
                (3, 1, 0.5),
                (3, 2, 0.5),
            ],
        );
        let b = DVector::from_vec(vec![1.0, -2.0, 0.5, 3.0]);

        let direct = CholeskySolver::new();
        let (f, _) = direct.factor(&a).unwrap();
        let expected = direct.solve(&f, &b).unwrap();

        let iterative = ConjugateGradientSolver::default();
        let (n, diag) = iterative.factor(&a).unwrap();
        let x = iterative.solve(&n, &b).unwrap();

        assert!(diag.log_determinant.is_none());
        for i in 0..3 {
            assert_relative_eq!(x[i], expected[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_cg_iteration_cap() {
        let (a, b) = overdetermined();
        let solver = ConjugateGradientSolver {
            max_iterations: 0,
            tolerance: 1e-12,
        };
        let (n, _) = solver.factor(&a).unwrap();
        let err = solver.solve(&n, &b).unwrap_err();
        assert!(err.to_string().contains("did not converge"));
    }
}
