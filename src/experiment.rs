//! Repeated random-split comparison of OLS, the Cp-selected lasso and the
//! GDP Bayesian regression.
//!
//! Every repetition draws a train/test split from one seeded generator,
//! fits the three models on the square root of the response and scores
//! each by its test RMSE. A failure of one model only marks that model's
//! score as missing for the repetition.

use std::fmt;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::config::{ConfigError, ExperimentConfig};
use crate::data::{DataError, RegressionData};
use crate::lasso::lars_lasso_path;
use crate::math::{rmse, FiveNumberSummary};
use crate::model::ModelSpec;
use crate::ols::OlsFit;
use crate::posterior::Posterior;
use crate::sampler::{GdpGibbs, PosteriorSampler, SamplerData, SamplerError};
use crate::split::{draw_split, train_size, SplitError};
use crate::standardize::Standardizer;

/// Name of the deterministic node holding the test-set predictions.
pub const PREDICTION_NODE: &str = "mu_pred";

/// Errors that stop a comparison run before or between repetitions.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// The dataset is unusable.
    #[error(transparent)]
    Data(#[from] DataError),
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No valid train/test split exists.
    #[error("Cannot split the data: {0}")]
    Split(#[from] SplitError),
}

/// The three competing estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Ordinary least squares.
    Ols,
    /// Lasso with the Cp-selected step of the LARS path.
    Lasso,
    /// Bayesian regression under the GDP prior.
    Gdp,
}

impl ModelKind {
    /// Every model, in report order.
    pub const ALL: [ModelKind; 3] = [ModelKind::Ols, ModelKind::Lasso, ModelKind::Gdp];

    /// Column name used in the score table.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Ols => "ols",
            ModelKind::Lasso => "lasso",
            ModelKind::Gdp => "gdp",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Ols => "OLS",
            ModelKind::Lasso => "Lasso",
            ModelKind::Gdp => "GDP",
        })
    }
}

/// Test RMSE of one model in one repetition.
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    /// Root-mean-squared error on the test rows.
    Value(f64),
    /// The fit failed; the reason is kept for the log and the report.
    Missing(String),
}

impl Score {
    /// The RMSE, if the fit succeeded.
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Missing(_) => None,
        }
    }

    /// Whether the fit failed.
    pub fn is_missing(&self) -> bool {
        matches!(self, Score::Missing(_))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Value(v) => write!(f, "{v:.4}"),
            Score::Missing(_) => f.write_str("NA"),
        }
    }
}

/// Scores of the three models in one repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct RepetitionResult {
    /// One-based repetition number.
    pub index: usize,
    /// OLS score.
    pub ols: Score,
    /// Lasso score.
    pub lasso: Score,
    /// GDP score.
    pub gdp: Score,
    /// Path step chosen by Cp, when the lasso succeeded.
    pub lasso_step: Option<usize>,
}

impl RepetitionResult {
    /// Score of `kind`.
    pub fn score(&self, kind: ModelKind) -> &Score {
        match kind {
            ModelKind::Ols => &self.ols,
            ModelKind::Lasso => &self.lasso,
            ModelKind::Gdp => &self.gdp,
        }
    }
}

/// Scores of every repetition and the posterior of the last successful
/// Bayesian fit.
#[derive(Debug, Clone, Default)]
pub struct ComparisonResults {
    /// Per-repetition scores, in run order.
    pub repetitions: Vec<RepetitionResult>,
    /// Posterior of the last repetition whose GDP fit succeeded.
    pub last_posterior: Option<Posterior>,
}

impl ComparisonResults {
    /// Scores of `kind` in repetition order, `None` where missing.
    pub fn scores(&self, kind: ModelKind) -> Vec<Option<f64>> {
        self.repetitions
            .iter()
            .map(|r| r.score(kind).value())
            .collect()
    }

    /// Scores of `kind` with missing values as `NaN`.
    pub fn score_array(&self, kind: ModelKind) -> Array1<f64> {
        self.scores(kind)
            .into_iter()
            .map(|s| s.unwrap_or(f64::NAN))
            .collect()
    }

    /// Number of repetitions in which `kind` failed.
    pub fn n_missing(&self, kind: ModelKind) -> usize {
        self.repetitions
            .iter()
            .filter(|r| r.score(kind).is_missing())
            .count()
    }

    /// Five-number summary and mean of the non-missing scores of `kind`.
    pub fn summary(&self, kind: ModelKind) -> Option<FiveNumberSummary> {
        let values: Vec<f64> = self.scores(kind).into_iter().flatten().collect();
        FiveNumberSummary::from_values(&values)
    }
}

/// Drives the repetitions. Holds the generator so that every split and
/// every sampler draw comes from the same seeded stream.
pub struct ComparisonState<'a, D: RegressionData> {
    data: &'a D,
    config: &'a ExperimentConfig,
    model: ModelSpec,
    sampler: Box<dyn PosteriorSampler>,
    monitor: Vec<String>,
    n_train: usize,
    rng: StdRng,
    results: ComparisonResults,
}

impl<'a, D: RegressionData> ComparisonState<'a, D> {
    /// Validates the inputs and seeds the generator.
    pub fn new(data: &'a D, config: &'a ExperimentConfig) -> Result<Self, ExperimentError> {
        config.validate()?;
        check_data(data)?;

        let n = data.n_obs();
        let n_train = train_size(n, config.experiment.train_fraction)?;
        if n_train < 2 || n_train >= n {
            return Err(SplitError::EmptyPartition { n, n_train }.into());
        }

        let mut monitor = config.sampler.monitor.clone();
        if !monitor.iter().any(|m| m == PREDICTION_NODE) {
            monitor.push(PREDICTION_NODE.to_string());
        }

        Ok(Self {
            data,
            config,
            model: ModelSpec::gdp(&config.priors),
            sampler: Box::new(GdpGibbs),
            monitor,
            n_train,
            rng: StdRng::seed_from_u64(config.experiment.seed),
            results: ComparisonResults::default(),
        })
    }

    /// Replaces the Bayesian backend.
    pub fn with_sampler(mut self, sampler: Box<dyn PosteriorSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// The Bayesian model graph in use.
    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Runs one repetition and records its scores.
    pub fn step(&mut self) -> Result<&RepetitionResult, ExperimentError> {
        let index = self.results.repetitions.len() + 1;
        let split = draw_split(self.data.n_obs(), self.n_train, &mut self.rng)?;
        let (x_train, y_train) = self.data.rows(&split.train);
        let (x_test, y_test) = self.data.rows(&split.test);
        let y_train = y_train.mapv(f64::sqrt);
        let y_test = y_test.mapv(f64::sqrt);

        let standardizer = Standardizer::fit(&x_train);
        let xs_train = standardizer.transform(&x_train);
        let xs_test = standardizer.transform(&x_test);

        let ols = match OlsFit::fit(&x_train, &y_train) {
            Ok(fit) => Score::Value(rmse(y_test.view(), fit.predict(&x_test).view())),
            Err(e) => missing(ModelKind::Ols, index, e),
        };

        let lasso_fit = lars_lasso_path(&xs_train, &y_train).and_then(|path| {
            let step = path.select_step()?;
            Ok((step, path.predict(&xs_test, step)?))
        });
        let (lasso, lasso_step) = match lasso_fit {
            Ok((step, predicted)) => (
                Score::Value(rmse(y_test.view(), predicted.view())),
                Some(step),
            ),
            Err(e) => (missing(ModelKind::Lasso, index, e), None),
        };

        let sampler_data = SamplerData {
            x: xs_train,
            y: y_train,
            x_test: xs_test,
            center: standardizer.center.clone(),
            scale: standardizer.scale.clone(),
            monitor: self.monitor.clone(),
        };
        log::debug!("Repetition {}: sampling the GDP posterior", index);
        let gdp = match self.sampler.sample(
            &self.model,
            &sampler_data,
            &self.config.sampler,
            &mut self.rng,
        ) {
            Ok(posterior) => match posterior.mean(PREDICTION_NODE) {
                Some(predicted) if predicted.len() == y_test.len() => {
                    let score = Score::Value(rmse(y_test.view(), predicted.view()));
                    self.results.last_posterior = Some(posterior);
                    score
                }
                _ => missing(
                    ModelKind::Gdp,
                    index,
                    SamplerError::UnknownQuantity(PREDICTION_NODE.to_string()),
                ),
            },
            Err(e) => missing(ModelKind::Gdp, index, e),
        };

        log::info!(
            "Repetition {}/{}: OLS {}, Lasso {}, GDP {}",
            index,
            self.config.experiment.nsim,
            ols,
            lasso,
            gdp
        );
        self.results.repetitions.push(RepetitionResult {
            index,
            ols,
            lasso,
            gdp,
            lasso_step,
        });
        Ok(&self.results.repetitions[index - 1])
    }

    /// Runs the remaining repetitions.
    pub fn run(mut self) -> Result<ComparisonResults, ExperimentError> {
        log::info!(
            "Comparing OLS, Lasso and GDP over {} splits ({} training rows of {})",
            self.config.experiment.nsim,
            self.n_train,
            self.data.n_obs()
        );
        while self.results.repetitions.len() < self.config.experiment.nsim {
            self.step()?;
        }
        for kind in ModelKind::ALL {
            let n_missing = self.results.n_missing(kind);
            if n_missing > 0 {
                log::warn!(
                    "{} failed in {} of {} repetitions",
                    kind,
                    n_missing,
                    self.config.experiment.nsim
                );
            }
        }
        Ok(self.results)
    }
}

/// Runs the whole comparison described by `config` on `data`.
pub fn run_comparison<D: RegressionData>(
    data: &D,
    config: &ExperimentConfig,
) -> Result<ComparisonResults, ExperimentError> {
    ComparisonState::new(data, config)?.run()
}

fn missing<E: fmt::Display>(kind: ModelKind, index: usize, error: E) -> Score {
    log::warn!("{} failed in repetition {}: {}", kind, index, error);
    Score::Missing(error.to_string())
}

fn check_data<D: RegressionData>(data: &D) -> Result<(), DataError> {
    let x = data.X();
    let y = data.y();
    if x.nrows() != y.len() {
        return Err(DataError::DimensionMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    if x.ncols() == 0 {
        return Err(DataError::NoPredictors);
    }
    if let Some((row, &value)) = y.iter().enumerate().find(|(_, v)| **v < 0.0) {
        return Err(DataError::NegativeResponse {
            row: row + 1,
            value,
        });
    }
    for ((row, col), value) in x.indexed_iter() {
        if !value.is_finite() {
            return Err(DataError::NonFinite {
                column: data
                    .names()
                    .get(col)
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", col + 1)),
                row: row + 1,
            });
        }
    }
    if let Some(row) = y.iter().position(|v| !v.is_finite()) {
        return Err(DataError::NonFinite {
            column: "response".to_string(),
            row: row + 1,
        });
    }
    Ok(())
}
