#![allow(non_snake_case)]

use gdp_compare::data::{DataError, Dataset};
use numpy::{PyReadonlyArray1, PyReadonlyArray2};

/// Copies the covariates and response handed over from Python into a
/// validated [`Dataset`]. Columns are named `x1..xp`.
pub fn dataset_from_numpy(
    X: PyReadonlyArray2<f64>,
    y: PyReadonlyArray1<f64>,
) -> Result<Dataset, DataError> {
    let X = X.as_array().as_standard_layout().into_owned();
    let y = y.as_array().to_owned();
    let names = (1..=X.ncols()).map(|j| format!("x{j}")).collect();
    Dataset::new(names, X, y)
}
