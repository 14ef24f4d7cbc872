//! Gibbs sampler for linear regression under a Normal / Exponential scale
//! mixture prior on the coefficients, which covers the Generalized Double
//! Pareto model built by [`ModelSpec::gdp`].
//!
//! The sampler reads the model graph rather than hard-coding it: prior
//! hyperparameters are evaluated from the graph, the coefficient precision
//! is probed to confirm it has the `c * phi / tau` form the conjugate updates
//! rely on, and deterministic nodes are evaluated from their expressions.
//!
//! One sweep updates, in order:
//! 1. `beta | alpha, phi, tau`   multivariate Normal
//! 2. `alpha | beta, phi`        Normal
//! 3. `phi | beta, alpha, tau`   Gamma
//! 4. `1 / tau[j] | beta, phi, lambda`  inverse Gaussian
//! 5. `lambda | tau`             slice sampling on its log density

use std::collections::HashSet;

use ndarray::{Array1, Array2};
use rand::{Rng, RngCore};
use rand_distr::{Distribution as _, Exp1, Gamma, InverseGaussian, StandardNormal};
use thiserror::Error;

use crate::config::SamplerSettings;
use crate::linalg::{Cholesky, LinalgError};
use crate::model::{Distribution, Env, Expr, ModelError, ModelSpec, NodeKind, Value};
use crate::posterior::{Posterior, QuantityDraws};

/// Bounds keeping the local scales away from under- and overflow.
const TAU_MIN: f64 = 1e-12;
const TAU_MAX: f64 = 1e12;
/// Floor on `beta[j]^2` in the inverse Gaussian mean.
const BETA_SQ_MIN: f64 = 1e-20;
/// Initial bracket width and step-out limit of the slice sampler.
const SLICE_WIDTH: f64 = 1.0;
const SLICE_MAX_STEPS: usize = 50;
const SLICE_MAX_SHRINK: usize = 200;

/// Failures of a posterior sampler.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The graph is outside the supported model family.
    #[error("Model is outside the family this sampler supports: {0}")]
    UnsupportedModel(String),
    /// The graph failed validation or evaluation.
    #[error("Model graph error: {0}")]
    Model(#[from] ModelError),
    /// A monitored name is not a node.
    #[error("Unknown monitored quantity '{0}'.")]
    UnknownQuantity(String),
    /// A monitored name is an observed node.
    #[error("Observed node '{0}' cannot be monitored.")]
    ObservedQuantity(String),
    /// Data or settings are inconsistent.
    #[error("Sampler data is inconsistent: {0}")]
    InvalidData(String),
    /// The coefficient precision could not be factored.
    #[error("Numerical failure in the coefficient update: {0}")]
    Linalg(#[from] LinalgError),
    /// A conditional distribution received invalid parameters.
    #[error("Invalid parameter for the {distribution} update: {reason}")]
    InvalidParameter {
        /// Family of the conditional.
        distribution: &'static str,
        /// Parameter values and the rejection.
        reason: String,
    },
    /// Draws are non-finite or constant.
    #[error("Degenerate draws for '{quantity}': {reason}")]
    Degenerate {
        /// Monitored quantity.
        quantity: String,
        /// What was wrong with the draws.
        reason: String,
    },
    /// The chains disagree beyond the R-hat threshold.
    #[error("Chains did not converge: split R-hat of {quantity} is {rhat:.3} (threshold {threshold})")]
    NotConverged {
        /// Element with the largest R-hat.
        quantity: String,
        /// Its split R-hat.
        rhat: f64,
        /// Configured threshold.
        threshold: f64,
    },
}

/// Data handed to the sampler: standardized training covariates and
/// response, standardized test covariates (no test response), the
/// standardization vectors and the quantities to retain.
#[derive(Debug, Clone)]
pub struct SamplerData {
    /// Standardized training covariates.
    pub x: Array2<f64>,
    /// Training response.
    pub y: Array1<f64>,
    /// Standardized test covariates.
    pub x_test: Array2<f64>,
    /// Training column means.
    pub center: Array1<f64>,
    /// Training column scales.
    pub scale: Array1<f64>,
    /// Nodes whose draws are kept.
    pub monitor: Vec<String>,
}

impl SamplerData {
    fn check(&self) -> Result<(), SamplerError> {
        let p = self.x.ncols();
        let invalid = |msg: String| Err(SamplerError::InvalidData(msg));
        if self.x.nrows() != self.y.len() {
            return invalid(format!(
                "{} training rows but {} responses",
                self.x.nrows(),
                self.y.len()
            ));
        }
        if self.y.len() < 2 {
            return invalid("at least two training rows are required".into());
        }
        if self.x_test.ncols() != p || self.center.len() != p || self.scale.len() != p {
            return invalid(format!(
                "expected {p} columns in the test design and standardization vectors"
            ));
        }
        if self.x.iter().chain(self.y.iter()).any(|v| !v.is_finite()) {
            return invalid("training data contains non-finite values".into());
        }
        Ok(())
    }

    /// Data entries addressable from the model graph.
    fn environment(&self) -> Env {
        let mut env = Env::new();
        env.insert("n_train".into(), Value::Scalar(self.x.nrows() as f64));
        env.insert("n_test".into(), Value::Scalar(self.x_test.nrows() as f64));
        env.insert("p".into(), Value::Scalar(self.x.ncols() as f64));
        env.insert("x".into(), Value::Matrix(self.x.clone()));
        env.insert("x_test".into(), Value::Matrix(self.x_test.clone()));
        env.insert("x_center".into(), Value::Vector(self.center.clone()));
        env.insert("x_scale".into(), Value::Vector(self.scale.clone()));
        env.insert("y".into(), Value::Vector(self.y.clone()));
        env
    }
}

/// A backend that turns a model graph and data into posterior draws.
pub trait PosteriorSampler {
    /// Draws from the posterior of `model` given `data`.
    fn sample(
        &self,
        model: &ModelSpec,
        data: &SamplerData,
        settings: &SamplerSettings,
        rng: &mut dyn RngCore,
    ) -> Result<Posterior, SamplerError>;
}

/// Gibbs sampler for the GDP model family.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdpGibbs;

impl PosteriorSampler for GdpGibbs {
    fn sample(
        &self,
        model: &ModelSpec,
        data: &SamplerData,
        settings: &SamplerSettings,
        rng: &mut dyn RngCore,
    ) -> Result<Posterior, SamplerError> {
        data.check()?;
        if settings.n_chains == 0 || settings.thin == 0 || settings.draws_per_chain() == 0 {
            return Err(SamplerError::InvalidData(
                "sampler settings keep no draws".into(),
            ));
        }
        let env = data.environment();
        for decl in &model.data {
            if !env.contains_key(&decl.name) {
                return Err(SamplerError::InvalidData(format!(
                    "model expects data entry '{}'",
                    decl.name
                )));
            }
        }
        let structure = GdpStructure::resolve(model, &env, data.x.ncols())?;
        let plan = RecordPlan::new(model, &data.monitor)?;
        let stats = SufficientStats::new(&data.x, &data.y);

        let n_keep = settings.draws_per_chain();
        let mut storage: Vec<Vec<Vec<f64>>> = vec![Vec::new(); plan.monitor.len()];
        for chain in 0..settings.n_chains {
            let mut state = GdpState::new(&structure, &stats, env.clone(), rng);
            let mut kept: Vec<Vec<f64>> = vec![Vec::new(); plan.monitor.len()];
            for iter in 0..settings.n_iter {
                state.step(rng)?;
                if iter >= settings.burn_in && (iter - settings.burn_in) % settings.thin == 0 {
                    for (slot, values) in kept.iter_mut().zip(plan.record(model, &mut state)?) {
                        slot.extend(values);
                    }
                }
            }
            log::debug!(
                "Chain {} finished: lambda = {:.4}, sigma = {:.4}",
                chain + 1,
                state.lambda,
                state.phi.powf(-0.5)
            );
            for (q, values) in kept.into_iter().enumerate() {
                storage[q].push(values);
            }
        }

        let quantities = plan
            .monitor
            .iter()
            .zip(storage)
            .map(|(name, chains)| -> Result<QuantityDraws, SamplerError> {
                let dim = chains
                    .first()
                    .map(|c| c.len() / n_keep.max(1))
                    .unwrap_or(0);
                let chains = chains
                    .into_iter()
                    .map(|flat| {
                        Array2::from_shape_vec((n_keep, dim), flat).map_err(|e| {
                            SamplerError::InvalidData(format!("draw storage for '{name}': {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(QuantityDraws::new(name, chains))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let posterior = Posterior::new(quantities);

        check_degenerate(&posterior)?;
        if let Some((label, rhat)) = posterior.max_rhat() {
            if rhat > settings.rhat_threshold {
                if settings.discard_unconverged {
                    return Err(SamplerError::NotConverged {
                        quantity: label,
                        rhat,
                        threshold: settings.rhat_threshold,
                    });
                }
                log::warn!(
                    "Split R-hat of {} is {:.3}, above the threshold {}",
                    label,
                    rhat,
                    settings.rhat_threshold
                );
            }
        }
        Ok(posterior)
    }
}

fn check_degenerate(posterior: &Posterior) -> Result<(), SamplerError> {
    for quantity in posterior.quantities() {
        let pooled = quantity.pooled();
        if pooled.iter().any(|v| !v.is_finite()) {
            return Err(SamplerError::Degenerate {
                quantity: quantity.name.clone(),
                reason: "non-finite draws".into(),
            });
        }
        if quantity.dim() > 0
            && pooled.nrows() > 1
            && pooled.columns().into_iter().all(|col| {
                let first = col[0];
                col.iter().all(|&v| v == first)
            })
        {
            return Err(SamplerError::Degenerate {
                quantity: quantity.name.clone(),
                reason: "zero posterior variance".into(),
            });
        }
    }
    Ok(())
}

/// Conditional structure of a GDP-family graph.
struct GdpStructure {
    phi_shape: f64,
    phi_rate: f64,
    alpha_mean: f64,
    alpha_precision: f64,
    /// `c[j]` in `precision(beta[j]) = c[j] * phi / tau[j]`.
    beta_scale: Array1<f64>,
    tau_rate: Expr,
    lambda_prior: Distribution,
}

fn unsupported(msg: impl Into<String>) -> SamplerError {
    SamplerError::UnsupportedModel(msg.into())
}

fn latent<'a>(model: &'a ModelSpec, name: &str) -> Result<&'a Distribution, SamplerError> {
    match model.node(name).map(|n| &n.kind) {
        Some(NodeKind::Stochastic {
            distribution,
            observed: false,
        }) => Ok(distribution),
        _ => Err(unsupported(format!(
            "'{name}' must be an unobserved stochastic node"
        ))),
    }
}

fn constant(expr: &Expr, env: &Env, what: &str) -> Result<f64, SamplerError> {
    expr.eval(env)
        .ok()
        .and_then(|v| v.as_scalar())
        .filter(|v| v.is_finite())
        .ok_or_else(|| unsupported(format!("{what} must be a finite constant")))
}

fn broadcast(value: Value, p: usize, what: &str) -> Result<Array1<f64>, SamplerError> {
    match value {
        Value::Scalar(v) => Ok(Array1::from_elem(p, v)),
        Value::Vector(v) if v.len() == p => Ok(v),
        _ => Err(unsupported(format!("{what} must be a scalar or have length {p}"))),
    }
}

fn approx_eq(a: &Array1<f64>, b: &Array1<f64>) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0))
}

impl GdpStructure {
    fn resolve(model: &ModelSpec, env: &Env, p: usize) -> Result<Self, SamplerError> {
        model.validate()?;

        match model.node("y").map(|n| &n.kind) {
            Some(NodeKind::Stochastic {
                distribution:
                    Distribution::Normal {
                        mean: Expr::Ref(mean),
                        precision: Expr::Ref(precision),
                    },
                observed: true,
            }) if mean == "mu" && precision == "phi" => {}
            _ => return Err(unsupported("'y' must be observed as Normal(mu, phi)")),
        }
        match model.node("mu").map(|n| &n.kind) {
            Some(NodeKind::Deterministic(Expr::Add(lhs, rhs))) => {
                match (lhs.as_ref(), rhs.as_ref()) {
                    (Expr::RowDot(design, coef), Expr::Ref(intercept))
                        if design == "x" && coef == "beta" && intercept == "alpha" => {}
                    _ => return Err(unsupported("'mu' must be inprod(x[i,], beta) + alpha")),
                }
            }
            _ => return Err(unsupported("'mu' must be a deterministic node")),
        }

        let (phi_shape, phi_rate) = match latent(model, "phi")? {
            Distribution::Gamma { shape, rate } => (
                constant(shape, env, "phi shape")?,
                constant(rate, env, "phi rate")?,
            ),
            _ => return Err(unsupported("'phi' must have a Gamma prior")),
        };
        let (alpha_mean, alpha_precision) = match latent(model, "alpha")? {
            Distribution::Normal { mean, precision } => (
                constant(mean, env, "alpha mean")?,
                constant(precision, env, "alpha precision")?,
            ),
            _ => return Err(unsupported("'alpha' must have a Normal prior")),
        };

        let lambda_prior = latent(model, "lambda")?.clone();
        for param in lambda_prior.parameters() {
            constant(param, env, "lambda prior parameter")?;
        }

        let tau_rate = match latent(model, "tau")? {
            Distribution::Exponential { rate } => rate.clone(),
            _ => return Err(unsupported("'tau' must have an Exponential prior")),
        };
        if tau_rate
            .references()
            .iter()
            .any(|r| r != "lambda" && model.node(r).is_some())
        {
            return Err(unsupported("the rate of 'tau' may depend on 'lambda' only"));
        }

        let beta_scale = match latent(model, "beta")? {
            Distribution::Normal { mean, precision } => {
                let mut probe = env.clone();
                if broadcast(mean.eval(&probe)?, p, "beta mean")?
                    .iter()
                    .any(|&m| m != 0.0)
                {
                    return Err(unsupported("'beta' must have a zero prior mean"));
                }
                let mut eval_at = |phi: f64, tau: f64| -> Result<Array1<f64>, SamplerError> {
                    probe.insert("phi".into(), Value::Scalar(phi));
                    probe.insert("tau".into(), Value::Vector(Array1::from_elem(p, tau)));
                    broadcast(precision.eval(&probe)?, p, "beta precision")
                };
                let base = eval_at(1.0, 1.0)?;
                let doubled_phi = eval_at(2.0, 1.0)?;
                let doubled_tau = eval_at(1.0, 2.0)?;
                if base.iter().any(|&c| !(c > 0.0 && c.is_finite()))
                    || !approx_eq(&doubled_phi, &(&base * 2.0))
                    || !approx_eq(&doubled_tau, &(&base / 2.0))
                {
                    return Err(unsupported(
                        "the precision of 'beta' must be proportional to phi / tau",
                    ));
                }
                base
            }
            _ => return Err(unsupported("'beta' must have a Normal prior")),
        };

        Ok(Self {
            phi_shape,
            phi_rate,
            alpha_mean,
            alpha_precision,
            beta_scale,
            tau_rate,
            lambda_prior,
        })
    }
}

/// Cross products reused by every sweep.
struct SufficientStats<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    xtx: Array2<f64>,
    xty: Array1<f64>,
    col_sums: Array1<f64>,
}

impl<'a> SufficientStats<'a> {
    fn new(x: &'a Array2<f64>, y: &'a Array1<f64>) -> Self {
        Self {
            x,
            y,
            xtx: x.t().dot(x),
            xty: x.t().dot(y),
            col_sums: x.sum_axis(ndarray::Axis(0)),
        }
    }
}

/// Current values of one chain.
struct GdpState<'a> {
    structure: &'a GdpStructure,
    stats: &'a SufficientStats<'a>,
    /// Data plus the current parameter values, for expression evaluation.
    env: Env,
    beta: Array1<f64>,
    alpha: f64,
    phi: f64,
    tau: Array1<f64>,
    lambda: f64,
}

impl<'a> GdpState<'a> {
    /// Starts a chain from dispersed values so that chains are comparable
    /// for the R-hat diagnostic.
    fn new(
        structure: &'a GdpStructure,
        stats: &'a SufficientStats<'a>,
        env: Env,
        rng: &mut dyn RngCore,
    ) -> Self {
        let p = stats.x.ncols();
        let y = stats.y;
        let y_mean = y.mean().unwrap_or(0.0);
        let y_var = y.var(1.0);
        let y_sd = if y_var > 0.0 && y_var.is_finite() {
            y_var.sqrt()
        } else {
            1.0
        };
        let mut normal = || -> f64 { StandardNormal.sample(&mut *rng) };

        let beta = Array1::from_shape_fn(p, |_| 0.5 * y_sd * normal());
        let alpha = y_mean + y_sd * normal();
        let phi = (normal() * 0.5).exp() / (y_sd * y_sd);
        let lambda: f64 = Exp1.sample(&mut *rng);

        let mut state = Self {
            structure,
            stats,
            env,
            beta,
            alpha,
            phi,
            tau: Array1::ones(p),
            lambda: lambda.max(1e-3),
        };
        state.sync_env();
        state
    }

    fn sync_env(&mut self) {
        self.env.insert("beta".into(), Value::Vector(self.beta.clone()));
        self.env.insert("alpha".into(), Value::Scalar(self.alpha));
        self.env.insert("phi".into(), Value::Scalar(self.phi));
        self.env.insert("tau".into(), Value::Vector(self.tau.clone()));
        self.env.insert("lambda".into(), Value::Scalar(self.lambda));
    }

    /// One full Gibbs sweep.
    fn step(&mut self, rng: &mut dyn RngCore) -> Result<(), SamplerError> {
        let s = self.structure;
        let n = self.stats.y.len() as f64;
        let p = self.beta.len();

        // beta | alpha, phi, tau
        let prior_precision = &s.beta_scale * self.phi / &self.tau;
        let mut q = &self.stats.xtx * self.phi;
        for j in 0..p {
            q[(j, j)] += prior_precision[j];
        }
        let b = (&self.stats.xty - &(&self.stats.col_sums * self.alpha)) * self.phi;
        let factor = q.cholesky()?;
        let mean = factor.solve_vec(&b)?;
        let z = Array1::from_shape_fn(p, |_| -> f64 { StandardNormal.sample(&mut *rng) });
        self.beta = mean + factor.solve_upper(&z)?;

        // alpha | beta, phi
        let partial = self.stats.y - &self.stats.x.dot(&self.beta);
        let alpha_precision = n * self.phi + s.alpha_precision;
        let alpha_mean =
            (self.phi * partial.sum() + s.alpha_precision * s.alpha_mean) / alpha_precision;
        let z: f64 = StandardNormal.sample(&mut *rng);
        self.alpha = alpha_mean + z / alpha_precision.sqrt();

        // phi | beta, alpha, tau
        let sse: f64 = partial.iter().map(|r| (r - self.alpha).powi(2)).sum();
        let penalty: f64 = (0..p)
            .map(|j| s.beta_scale[j] * self.beta[j].powi(2) / self.tau[j])
            .sum();
        let shape = s.phi_shape + 0.5 * (n + p as f64);
        let rate = s.phi_rate + 0.5 * (sse + penalty);
        self.phi = Gamma::new(shape, 1.0 / rate)
            .map_err(|e| SamplerError::InvalidParameter {
                distribution: "Gamma",
                reason: format!("shape {shape}, rate {rate}: {e}"),
            })?
            .sample(&mut *rng);

        // tau | beta, phi, lambda
        self.env.insert("lambda".into(), Value::Scalar(self.lambda));
        let rates = broadcast(s.tau_rate.eval(&self.env)?, p, "tau rate")?;
        for j in 0..p {
            let precision_scale = s.beta_scale[j] * self.phi;
            let beta_sq = self.beta[j].powi(2).max(BETA_SQ_MIN);
            let ig_mean = (2.0 * rates[j] / (precision_scale * beta_sq)).sqrt();
            let ig_shape = 2.0 * rates[j];
            let inverse: f64 = InverseGaussian::new(ig_mean, ig_shape)
                .map_err(|e| SamplerError::InvalidParameter {
                    distribution: "inverse Gaussian",
                    reason: format!("mean {ig_mean}, shape {ig_shape}: {e}"),
                })?
                .sample(&mut *rng);
            self.tau[j] = if inverse > 0.0 && inverse.is_finite() {
                (1.0 / inverse).clamp(TAU_MIN, TAU_MAX)
            } else {
                TAU_MIN
            };
        }

        // lambda | tau
        self.env.insert("tau".into(), Value::Vector(self.tau.clone()));
        let tau_value = Value::Vector(self.tau.clone());
        let tau_prior = Distribution::Exponential {
            rate: s.tau_rate.clone(),
        };
        let env = &mut self.env;
        let log_density = |lambda: f64| -> f64 {
            if !(lambda > 0.0 && lambda.is_finite()) {
                return f64::NEG_INFINITY;
            }
            let value = Value::Scalar(lambda);
            env.insert("lambda".into(), value.clone());
            let prior = s.lambda_prior.log_density(&value, env, "lambda");
            let local = tau_prior.log_density(&tau_value, env, "tau");
            match (prior, local) {
                (Ok(a), Ok(b)) if !a.is_nan() && !b.is_nan() => a + b,
                _ => f64::NEG_INFINITY,
            }
        };
        self.lambda = slice_sample(self.lambda, log_density, rng);

        self.sync_env();
        Ok(())
    }
}

/// Univariate slice sampling with stepping out and shrinkage (Neal, 2003).
fn slice_sample<F: FnMut(f64) -> f64>(x0: f64, mut log_density: F, rng: &mut dyn RngCore) -> f64 {
    let current = log_density(x0);
    if !current.is_finite() {
        return x0;
    }
    let drop: f64 = Exp1.sample(&mut *rng);
    let threshold = current - drop;

    let u: f64 = rng.gen();
    let mut left = x0 - SLICE_WIDTH * u;
    let mut right = left + SLICE_WIDTH;
    let mut steps_left = (rng.gen::<f64>() * SLICE_MAX_STEPS as f64) as usize;
    let mut steps_right = SLICE_MAX_STEPS - 1 - steps_left.min(SLICE_MAX_STEPS - 1);
    while steps_left > 0 && log_density(left) > threshold {
        left -= SLICE_WIDTH;
        steps_left -= 1;
    }
    while steps_right > 0 && log_density(right) > threshold {
        right += SLICE_WIDTH;
        steps_right -= 1;
    }

    for _ in 0..SLICE_MAX_SHRINK {
        let candidate = left + rng.gen::<f64>() * (right - left);
        if log_density(candidate) >= threshold {
            return candidate;
        }
        if candidate < x0 {
            left = candidate;
        } else {
            right = candidate;
        }
    }
    log::debug!("Slice sampler did not find a point in the slice; keeping the current value");
    x0
}

/// Which nodes to evaluate and retain at every kept iteration.
struct RecordPlan {
    monitor: Vec<String>,
    /// Deterministic nodes needed by the monitored ones, parents first.
    deterministic: Vec<String>,
}

impl RecordPlan {
    fn new(model: &ModelSpec, monitor: &[String]) -> Result<Self, SamplerError> {
        let mut needed = HashSet::new();
        for name in monitor {
            let node = model
                .node(name)
                .ok_or_else(|| SamplerError::UnknownQuantity(name.clone()))?;
            if node.is_observed() {
                return Err(SamplerError::ObservedQuantity(name.clone()));
            }
            needed.extend(model.ancestors(name)?);
        }
        let deterministic = model
            .topological_order()?
            .into_iter()
            .filter(|name| {
                needed.contains(name)
                    && matches!(
                        model.node(name).map(|n| &n.kind),
                        Some(NodeKind::Deterministic(_))
                    )
            })
            .collect();
        Ok(Self {
            monitor: monitor.to_vec(),
            deterministic,
        })
    }

    /// Flattened values of every monitored quantity at the current state.
    fn record(
        &self,
        model: &ModelSpec,
        state: &mut GdpState<'_>,
    ) -> Result<Vec<Vec<f64>>, SamplerError> {
        for name in &self.deterministic {
            if let Some(NodeKind::Deterministic(expr)) = model.node(name).map(|n| &n.kind) {
                let value = expr.eval(&state.env)?;
                state.env.insert(name.clone(), value);
            }
        }
        self.monitor
            .iter()
            .map(|name| {
                state
                    .env
                    .get(name)
                    .map(Value::to_flat)
                    .ok_or_else(|| SamplerError::UnknownQuantity(name.clone()))
            })
            .collect()
    }
}
