//! Lasso regularization path computed with least angle regression (LARS)
//! and the lasso modification, following Efron, Hastie, Johnstone and
//! Tibshirani (2004).
//!
//! The path starts at the all-zero model and records the coefficients after
//! every breakpoint: a variable entering the active set, or an active
//! coefficient crossing zero and leaving it. Each step carries its residual
//! sum of squares and Mallows' Cp, which is used to pick the step whose
//! predictions are scored.

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

use crate::linalg::Cholesky;

/// Correlations and step lengths below this are treated as zero.
const EPS: f64 = 1e-12;
/// Active Gram factors with a smaller pivot ratio are treated as singular.
const PIVOT_TOL: f64 = 1e-7;

/// Failures of the lasso path or its Cp selection.
#[derive(Debug, Error)]
pub enum LassoError {
    /// Covariates and response disagree in length.
    #[error("Covariate matrix has {x_rows} rows but the response has {y_len} entries.")]
    DimensionMismatch {
        /// Rows of the covariate matrix.
        x_rows: usize,
        /// Length of the response.
        y_len: usize,
    },
    /// Too few rows to fit.
    #[error("Need at least {needed} observations, got {got}.")]
    InsufficientObservations {
        /// Minimum number of rows.
        needed: usize,
        /// Rows supplied.
        got: usize,
    },
    /// The active set became singular after a drop.
    #[error("Active set became collinear at step {step}.")]
    Collinear {
        /// Path step at which the factorization failed.
        step: usize,
    },
    /// No step has a finite Cp.
    #[error("Mallows' Cp is undefined for every step of the path (degenerate design).")]
    UndefinedCp,
    /// A prediction asked for a step past the end of the path.
    #[error("Step {step} is outside the path, which has {n_steps} steps.")]
    StepOutOfRange {
        /// Requested step.
        step: usize,
        /// Steps on the path.
        n_steps: usize,
    },
}

/// A change of the active set at one breakpoint of the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    /// Column entered the active set.
    Add(usize),
    /// Column left the active set after its coefficient reached zero.
    Drop(usize),
}

/// Coefficient path and per-step fit statistics.
#[derive(Debug, Clone)]
pub struct LassoPath {
    /// One row per step; row 0 is the empty model.
    pub coefficients: Array2<f64>,
    /// Mean of the training response.
    pub intercept: f64,
    /// Residual sum of squares per step.
    pub rss: Array1<f64>,
    /// Degrees of freedom per step: non-zero coefficients plus the intercept.
    pub df: Vec<usize>,
    /// Mallows' Cp per step; `NaN` when it cannot be estimated.
    pub cp: Array1<f64>,
    /// Active-set changes, one per step after the first.
    pub actions: Vec<PathAction>,
}

impl LassoPath {
    /// Number of steps, including the empty model.
    pub fn n_steps(&self) -> usize {
        self.coefficients.nrows()
    }

    /// The step with minimal Cp.
    pub fn select_step(&self) -> Result<usize, LassoError> {
        select_cp_step(&self.cp.to_vec())
    }

    /// Predicts the response at `step` for new (identically standardized) covariates.
    pub fn predict(&self, x: &Array2<f64>, step: usize) -> Result<Array1<f64>, LassoError> {
        if step >= self.n_steps() {
            return Err(LassoError::StepOutOfRange {
                step,
                n_steps: self.n_steps(),
            });
        }
        Ok(x.dot(&self.coefficients.row(step)) + self.intercept)
    }
}

/// Index of the smallest finite Cp. Ties resolve to the earliest step.
pub fn select_cp_step(cp: &[f64]) -> Result<usize, LassoError> {
    let mut best: Option<(usize, f64)> = None;
    for (step, &value) in cp.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        match best {
            Some((_, current)) if value >= current => {}
            _ => best = Some((step, value)),
        }
    }
    best.map(|(step, _)| step).ok_or(LassoError::UndefinedCp)
}

/// Computes the lasso path of `y` on `x`.
///
/// `x` is expected to be standardized; the response is centered internally
/// and the intercept is its mean. Columns with zero norm never enter, and a
/// column that would make the active set collinear is skipped for the rest
/// of the path.
pub fn lars_lasso_path(x: &Array2<f64>, y: &Array1<f64>) -> Result<LassoPath, LassoError> {
    let (n, p) = x.dim();
    if n != y.len() {
        return Err(LassoError::DimensionMismatch {
            x_rows: n,
            y_len: y.len(),
        });
    }
    if n < 2 {
        return Err(LassoError::InsufficientObservations { needed: 2, got: n });
    }

    let intercept = y.mean().unwrap_or(0.0);
    let yc = y - intercept;

    let mut usable: Vec<bool> = x
        .axis_iter(Axis(1))
        .map(|col| col.dot(&col) > EPS * n as f64)
        .collect();
    let mut m = usable.iter().filter(|&&u| u).count();
    let mut max_active = m.min(n - 1);
    let max_steps = 8 * max_active.max(1);

    let mut beta: Array1<f64> = Array1::zeros(p);
    let mut mu: Array1<f64> = Array1::zeros(n);
    let mut active: Vec<usize> = Vec::new();
    let mut path = vec![beta.clone()];
    let mut actions = Vec::new();
    let mut just_dropped: Option<usize> = None;

    while path.len() <= max_steps {
        let corr = x.t().dot(&(&yc - &mu));

        if just_dropped.is_none() {
            if active.len() >= max_active {
                break;
            }
            let candidate = (0..p)
                .filter(|&j| usable[j] && !active.contains(&j))
                .map(|j| (j, corr[j].abs()))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            match candidate {
                Some((j, c)) if c > EPS => {
                    active.push(j);
                    actions.push(PathAction::Add(j));
                }
                _ => break,
            }
        }

        let c_max = active
            .iter()
            .map(|&j| corr[j].abs())
            .fold(0.0_f64, f64::max);
        if c_max <= EPS {
            break;
        }

        let signs = Array1::from_iter(active.iter().map(|&j| corr[j].signum()));
        let xa = x.select(Axis(1), &active);
        let step = path.len();
        let solved = xa
            .t()
            .dot(&xa)
            .cholesky()
            .ok()
            .filter(|factor| factor.pivot_ratio() > PIVOT_TOL)
            .and_then(|factor| factor.solve_vec(&signs).ok())
            .map(|g_inv_s| {
                let a_norm = 1.0 / signs.dot(&g_inv_s).sqrt();
                (g_inv_s, a_norm)
            })
            .filter(|(_, a_norm)| a_norm.is_finite());
        let (g_inv_s, a_norm) = match solved {
            Some(solved) => solved,
            None => {
                let added = match actions.last() {
                    Some(&PathAction::Add(j)) if just_dropped.is_none() => Some(j),
                    _ => None,
                };
                let Some(j) = added else {
                    return Err(LassoError::Collinear { step });
                };
                log::debug!(
                    "LARS step {}: column {} is collinear with the active set, skipping it",
                    step,
                    j
                );
                active.pop();
                actions.pop();
                usable[j] = false;
                m -= 1;
                max_active = m.min(n - 1);
                continue;
            }
        };
        let direction = g_inv_s * a_norm;
        let u = xa.dot(&direction);
        let a = x.t().dot(&u);

        // Step to the next tie between an inactive and the active correlations,
        // or all the way to the least-squares fit on the active set.
        let mut gamma = c_max / a_norm;
        if active.len() < max_active {
            for j in 0..p {
                if !usable[j] || active.contains(&j) || just_dropped == Some(j) {
                    continue;
                }
                for candidate in [
                    (c_max - corr[j]) / (a_norm - a[j]),
                    (c_max + corr[j]) / (a_norm + a[j]),
                ] {
                    if candidate > EPS && candidate < gamma {
                        gamma = candidate;
                    }
                }
            }
        }

        // Lasso modification: stop early when an active coefficient hits zero.
        let mut drop_at = None;
        for (k, &j) in active.iter().enumerate() {
            if direction[k] == 0.0 {
                continue;
            }
            let crossing = -beta[j] / direction[k];
            if crossing > EPS && crossing < gamma {
                gamma = crossing;
                drop_at = Some(k);
            }
        }

        mu.scaled_add(gamma, &u);
        for (k, &j) in active.iter().enumerate() {
            beta[j] += gamma * direction[k];
        }

        just_dropped = None;
        if let Some(k) = drop_at {
            let j = active.remove(k);
            beta[j] = 0.0;
            actions.push(PathAction::Drop(j));
            just_dropped = Some(j);
        }
        log::debug!(
            "LARS step {}: gamma = {:.4e}, active = {:?}",
            step,
            gamma,
            active
        );
        path.push(beta.clone());

        if drop_at.is_none() && active.len() >= max_active {
            break;
        }
    }
    if path.len() > max_steps {
        log::warn!("LARS stopped after the maximum of {} steps", max_steps);
    }

    let n_steps = path.len();
    let coefficients = Array2::from_shape_fn((n_steps, p), |(s, j)| path[s][j]);
    let rss = Array1::from_iter(coefficients.outer_iter().map(|b| {
        let resid = &yc - &x.dot(&b);
        resid.dot(&resid)
    }));
    let df: Vec<usize> = coefficients
        .outer_iter()
        .map(|b| b.iter().filter(|v| **v != 0.0).count() + 1)
        .collect();
    let cp = mallows_cp(&rss, &df, n, m);

    Ok(LassoPath {
        coefficients,
        intercept,
        rss,
        df,
        cp,
        actions,
    })
}

/// `Cp = RSS / sigma² - n + 2 df` with `sigma²` estimated from the final
/// (least-squares) step on `n - m - 1` degrees of freedom.
fn mallows_cp(rss: &Array1<f64>, df: &[usize], n: usize, m: usize) -> Array1<f64> {
    let rss_last = rss[rss.len() - 1];
    if m + 1 >= n || !(rss_last > 0.0) {
        return Array1::from_elem(rss.len(), f64::NAN);
    }
    let sigma2 = rss_last / (n - m - 1) as f64;
    Array1::from_iter(
        rss.iter()
            .zip(df.iter())
            .map(|(r, &d)| r / sigma2 - n as f64 + 2.0 * d as f64),
    )
}
