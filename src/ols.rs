//! Ordinary least squares with an intercept.

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

use crate::linalg::Cholesky;

/// Smallest accepted ratio between the extreme pivots of the Gram factor.
const RANK_TOLERANCE: f64 = 1e-7;

/// Failures of the least-squares fit.
#[derive(Debug, Error)]
pub enum OlsError {
    /// Covariates and response disagree in length.
    #[error("Covariate matrix has {x_rows} rows but the response has {y_len} entries.")]
    DimensionMismatch {
        /// Rows of the covariate matrix.
        x_rows: usize,
        /// Length of the response.
        y_len: usize,
    },
    /// Fewer rows than coefficients.
    #[error("Need at least {needed} observations, got {got}.")]
    InsufficientObservations {
        /// Minimum number of rows.
        needed: usize,
        /// Rows supplied.
        got: usize,
    },
    /// The normal equations have no unique solution.
    #[error("Design matrix is singular: covariates are collinear or constant.")]
    SingularDesign,
}

/// Fitted least-squares coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Intercept on the original scale.
    pub intercept: f64,
    /// Slope of each covariate.
    pub coefficients: Array1<f64>,
}

impl OlsFit {
    /// Regresses `y` on `x` plus an intercept.
    ///
    /// The normal equations are solved on centered data, which is the same
    /// fit as the augmented design but better conditioned.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self, OlsError> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(OlsError::DimensionMismatch {
                x_rows: n,
                y_len: y.len(),
            });
        }
        if n < p + 1 {
            return Err(OlsError::InsufficientObservations {
                needed: p + 1,
                got: n,
            });
        }

        let x_mean = x.mean_axis(Axis(0)).ok_or(OlsError::InsufficientObservations {
            needed: p + 1,
            got: n,
        })?;
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = x - &x_mean;
        let yc = y - y_mean;

        // Columns are rescaled to unit norm so that the rank check does not
        // depend on the units of the covariates.
        let gram = xc.t().dot(&xc);
        let norms = gram.diag().mapv(f64::sqrt);
        if norms.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
            return Err(OlsError::SingularDesign);
        }
        let correlation =
            Array2::from_shape_fn((p, p), |(i, j)| gram[(i, j)] / (norms[i] * norms[j]));
        let factor = correlation
            .cholesky()
            .map_err(|_| OlsError::SingularDesign)?;
        if factor.pivot_ratio() < RANK_TOLERANCE {
            return Err(OlsError::SingularDesign);
        }
        let rhs = xc.t().dot(&yc) / &norms;
        let coefficients = factor
            .solve_vec(&rhs)
            .map_err(|_| OlsError::SingularDesign)?
            / &norms;
        let intercept = y_mean - x_mean.dot(&coefficients);

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Fitted values for the rows of `x`.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}
