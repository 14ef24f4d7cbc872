use gdp_compare::config::{ConfigError, ExperimentConfig};

#[test]
fn test_defaults_are_valid() {
    let config = ExperimentConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.experiment.nsim, 10);
    assert_eq!(config.sampler.n_chains, 3);
    assert_eq!(config.sampler.draws_per_chain(), 1000);
    assert!(config.sampler.monitor.contains(&"mu_pred".to_string()));
    assert!(matches!(config.data(), Err(ConfigError::MissingData)));
}

#[test]
fn test_partial_file_falls_back_to_defaults() {
    let text = r#"
[data]
path = "data/diabetes.csv"
response = "y"
exclude = ["id"]

[experiment]
nsim = 5
seed = 7

[sampler]
n_iter = 500
burn_in = 100
thin = 2
"#;
    let config = ExperimentConfig::from_toml_str(text).unwrap();
    let data = config.data().unwrap();
    assert_eq!(data.response, "y");
    assert_eq!(data.exclude, vec!["id".to_string()]);
    assert!(data.categorical.is_empty());
    assert_eq!(config.experiment.nsim, 5);
    assert_eq!(config.experiment.seed, 7);
    assert_eq!(config.experiment.train_fraction, 0.8);
    assert_eq!(config.sampler.draws_per_chain(), 200);
    assert_eq!(config.priors.lambda_shape, 1.0);
}

#[test]
fn test_invalid_settings_are_rejected() {
    for text in [
        "[experiment]\nnsim = 0",
        "[experiment]\ntrain_fraction = 1.5",
        "[sampler]\nn_iter = 100\nburn_in = 100",
        "[sampler]\nthin = 0",
        "[sampler]\nn_chains = 0",
        "[priors]\nphi_rate = 0.0",
    ] {
        assert!(
            matches!(ExperimentConfig::from_toml_str(text), Err(ConfigError::Invalid(_))),
            "accepted: {text}"
        );
    }
    assert!(matches!(
        ExperimentConfig::from_toml_str("[experiment]\nnsim = \"ten\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_serialized_config_reads_back() {
    let mut config = ExperimentConfig::default();
    config.experiment.nsim = 3;
    config.sampler.discard_unconverged = false;
    let text = config.to_toml_string().unwrap();
    let back = ExperimentConfig::from_toml_str(&text).unwrap();
    assert_eq!(back.experiment.nsim, 3);
    assert!(!back.sampler.discard_unconverged);
    assert_eq!(back.sampler.monitor, config.sampler.monitor);
}
