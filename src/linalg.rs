//! Bridge between `ndarray` arrays and the `faer` Cholesky factorization.
//!
//! Only the pieces the estimators need are exposed: factor a symmetric
//! positive definite matrix, solve against it, and back-substitute with the
//! transposed factor (used to draw from a Gaussian given its precision).

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

/// Failures of the dense factorizations.
#[derive(Debug, Error)]
pub enum LinalgError {
    /// The matrix is not positive definite.
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    /// Only square matrices can be factored.
    #[error("Expected a square matrix, found {rows}x{cols}.")]
    NotSquare {
        /// Row count.
        rows: usize,
        /// Column count.
        cols: usize,
    },
    /// Right-hand side of the wrong length.
    #[error("Right-hand side has length {found}, but the factor has dimension {expected}.")]
    DimensionMismatch {
        /// Dimension of the factor.
        expected: usize,
        /// Length of the right-hand side.
        found: usize,
    },
}

fn to_faer<S: Data<Elem = f64>>(array: &ArrayBase<S, Ix2>) -> Mat<f64> {
    let (rows, cols) = array.dim();
    Mat::from_fn(rows, cols, |i, j| array[(i, j)])
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Lower Cholesky factor `L` of a matrix `A = L Lᵀ`.
pub struct CholeskyFactor {
    factor: solvers::Llt<f64>,
    lower: Array2<f64>,
}

impl CholeskyFactor {
    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Solves `A x = rhs`.
    pub fn solve_vec(&self, rhs: &Array1<f64>) -> Result<Array1<f64>, LinalgError> {
        self.check_len(rhs.len())?;
        let rhs = Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        let sol = self.factor.solve(rhs.as_ref());
        Ok(Array1::from_shape_fn(self.dim(), |i| sol[(i, 0)]))
    }

    /// Solves `Lᵀ x = z` by back substitution.
    pub fn solve_upper(&self, z: &Array1<f64>) -> Result<Array1<f64>, LinalgError> {
        self.check_len(z.len())?;
        let n = self.dim();
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut acc = z[i];
            for k in (i + 1)..n {
                acc -= self.lower[(k, i)] * x[k];
            }
            x[i] = acc / self.lower[(i, i)];
        }
        Ok(x)
    }

    /// The lower triangular factor.
    pub fn lower(&self) -> &Array2<f64> {
        &self.lower
    }

    /// Ratio of the smallest to the largest diagonal entry of `L`.
    ///
    /// Values close to zero flag a numerically rank-deficient matrix that the
    /// factorization nevertheless accepted.
    pub fn pivot_ratio(&self) -> f64 {
        let diag = self.lower.diag();
        let max = diag.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let min = diag.iter().fold(f64::INFINITY, |acc, v| acc.min(v.abs()));
        if max == 0.0 {
            0.0
        } else {
            min / max
        }
    }

    fn check_len(&self, found: usize) -> Result<(), LinalgError> {
        if found != self.dim() {
            return Err(LinalgError::DimensionMismatch {
                expected: self.dim(),
                found,
            });
        }
        Ok(())
    }
}

/// Cholesky factorization of `ndarray` matrices through `faer`.
pub trait Cholesky {
    /// Factors a symmetric positive definite matrix.
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> Cholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError> {
        let (rows, cols) = self.dim();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }
        let mat = to_faer(self);
        let factor = mat
            .as_ref()
            .llt(Side::Lower)
            .map_err(LinalgError::Cholesky)?;
        let lower = mat_to_array(factor.L());
        Ok(CholeskyFactor { factor, lower })
    }
}
