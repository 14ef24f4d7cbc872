//! Experiment configuration, read from a TOML file.
//!
//! Every section is optional and falls back to the defaults below, except
//! `[data]`, which only the command-line runner requires.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataSchema;

/// Errors raised while reading, writing or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// Serialization to TOML failed.
    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A setting is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// A data file is needed but no `[data]` section was given.
    #[error("The configuration has no [data] section.")]
    MissingData,
}

/// Where the dataset lives and how its columns are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// CSV file holding the response and covariates.
    pub path: PathBuf,
    /// Name of the response column.
    pub response: String,
    /// Columns dropped before fitting.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Columns expanded into treatment-coded indicators.
    #[serde(default)]
    pub categorical: Vec<String>,
}

impl DataConfig {
    /// Column roles for the CSV loader.
    pub fn schema(&self) -> DataSchema {
        DataSchema {
            response: self.response.clone(),
            exclude: self.exclude.clone(),
            categorical: self.categorical.clone(),
        }
    }
}

/// Repetition count, seed and split proportion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    /// Number of random train/test splits.
    pub nsim: usize,
    /// Seed of the single generator shared by all repetitions.
    pub seed: u64,
    /// Share of rows drawn into the training partition.
    pub train_fraction: f64,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            nsim: 10,
            seed: 42,
            train_fraction: 0.8,
        }
    }
}

/// Gibbs sampler run length and convergence policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of independent chains.
    pub n_chains: usize,
    /// Iterations per chain, burn-in included.
    pub n_iter: usize,
    /// Iterations discarded at the start of each chain.
    pub burn_in: usize,
    /// Keep every `thin`-th draw after burn-in.
    pub thin: usize,
    /// Largest acceptable split R-hat.
    pub rhat_threshold: f64,
    /// Treat an R-hat above the threshold as a failed fit instead of a warning.
    pub discard_unconverged: bool,
    /// Quantities whose draws are retained.
    pub monitor: Vec<String>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            n_chains: 3,
            n_iter: 2000,
            burn_in: 1000,
            thin: 1,
            rhat_threshold: 1.1,
            discard_unconverged: true,
            monitor: ["beta_orig", "beta0", "sigma", "mu_pred"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SamplerSettings {
    /// Number of draws each chain keeps.
    pub fn draws_per_chain(&self) -> usize {
        let thin = self.thin.max(1);
        (self.n_iter.saturating_sub(self.burn_in) + thin - 1) / thin
    }
}

/// Hyperparameters of the GDP model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Shape of the Gamma prior on the residual precision.
    pub phi_shape: f64,
    /// Rate of the Gamma prior on the residual precision.
    pub phi_rate: f64,
    /// Precision of the zero-mean Normal prior on the intercept.
    pub alpha_precision: f64,
    /// Shape of the Gamma prior on the shrinkage hyperparameter.
    pub lambda_shape: f64,
    /// Rate of the Gamma prior on the shrinkage hyperparameter.
    pub lambda_rate: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            phi_shape: 1e-6,
            phi_rate: 1e-6,
            alpha_precision: 1e-10,
            lambda_shape: 1.0,
            lambda_rate: 1.0,
        }
    }
}

/// Destination of the run outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving the CSV outputs.
    pub dir: PathBuf,
    /// Also write every retained posterior draw of the last fit.
    pub write_draws: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            write_draws: false,
        }
    }
}

/// Complete configuration of a comparison run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Input data; absent when the data are supplied directly.
    #[serde(default)]
    pub data: Option<DataConfig>,
    /// Repetitions, seed and split.
    #[serde(default)]
    pub experiment: ExperimentSettings,
    /// Gibbs sampler settings.
    #[serde(default)]
    pub sampler: SamplerSettings,
    /// Hyperparameters of the GDP model.
    #[serde(default)]
    pub priors: PriorConfig,
    /// Where results are written.
    #[serde(default)]
    pub output: OutputConfig,
}

impl ExperimentConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Pretty-printed TOML form of the configuration.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The `[data]` section, required when loading from disk.
    pub fn data(&self) -> Result<&DataConfig, ConfigError> {
        self.data.as_ref().ok_or(ConfigError::MissingData)
    }

    /// Checks the experiment, sampler and prior settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let e = &self.experiment;
        if e.nsim == 0 {
            return invalid("experiment.nsim must be at least 1".into());
        }
        if !(e.train_fraction > 0.0 && e.train_fraction < 1.0) {
            return invalid(format!(
                "experiment.train_fraction must lie in (0, 1), got {}",
                e.train_fraction
            ));
        }

        let s = &self.sampler;
        if s.n_chains == 0 {
            return invalid("sampler.n_chains must be at least 1".into());
        }
        if s.thin == 0 {
            return invalid("sampler.thin must be at least 1".into());
        }
        if s.burn_in >= s.n_iter {
            return invalid(format!(
                "sampler.burn_in ({}) must be smaller than sampler.n_iter ({})",
                s.burn_in, s.n_iter
            ));
        }
        if s.draws_per_chain() < 4 {
            return invalid("the sampler must keep at least 4 draws per chain".into());
        }
        if !(s.rhat_threshold >= 1.0) {
            return invalid("sampler.rhat_threshold must be at least 1".into());
        }
        if s.monitor.is_empty() {
            return invalid("sampler.monitor must name at least one quantity".into());
        }

        let p = &self.priors;
        for (name, value) in [
            ("phi_shape", p.phi_shape),
            ("phi_rate", p.phi_rate),
            ("alpha_precision", p.alpha_precision),
            ("lambda_shape", p.lambda_shape),
            ("lambda_rate", p.lambda_rate),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return invalid(format!("priors.{name} must be positive, got {value}"));
            }
        }
        Ok(())
    }
}
