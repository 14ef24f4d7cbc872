//! Python entry point of the comparison: `gdp_compare_py.run_comparison`.

mod data;

use crate::data::dataset_from_numpy;

use gdp_compare::config::ExperimentConfig;
use gdp_compare::experiment::{run_comparison as run, ModelKind};
use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Runs `nsim` random train/test splits and returns the test RMSE of each
/// model as numpy arrays keyed `ols`, `lasso` and `gdp` (`NaN` where a fit
/// failed), plus the Cp-selected lasso step per repetition (`-1` when the
/// lasso failed).
#[pyfunction]
#[pyo3(signature = (X, y, nsim = 10, seed = 42, train_fraction = 0.8, n_chains = 3, n_iter = 2000, burn_in = 1000, thin = 1))]
#[allow(non_snake_case, clippy::too_many_arguments)]
fn run_comparison<'py>(
    py: Python<'py>,
    X: PyReadonlyArray2<f64>,
    y: PyReadonlyArray1<f64>,
    nsim: usize,
    seed: u64,
    train_fraction: f64,
    n_chains: usize,
    n_iter: usize,
    burn_in: usize,
    thin: usize,
) -> PyResult<Bound<'py, PyDict>> {
    let dataset = dataset_from_numpy(X, y).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let mut config = ExperimentConfig::default();
    config.experiment.nsim = nsim;
    config.experiment.seed = seed;
    config.experiment.train_fraction = train_fraction;
    config.sampler.n_chains = n_chains;
    config.sampler.n_iter = n_iter;
    config.sampler.burn_in = burn_in;
    config.sampler.thin = thin;

    let results = run(&dataset, &config).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let out = PyDict::new_bound(py);
    for kind in ModelKind::ALL {
        let scores = results.score_array(kind);
        out.set_item(kind.name(), PyArray1::from_array_bound(py, &scores.view()))?;
    }
    let steps: Vec<i64> = results
        .repetitions
        .iter()
        .map(|r| r.lasso_step.map_or(-1, |s| s as i64))
        .collect();
    out.set_item("lasso_step", PyArray1::from_vec_bound(py, steps))?;
    Ok(out)
}

#[pymodule]
fn gdp_compare_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_comparison, m)?)?;
    Ok(())
}
