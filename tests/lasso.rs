use approx::assert_abs_diff_eq;
use gdp_compare::lasso::{lars_lasso_path, select_cp_step, LassoError, PathAction};
use gdp_compare::ols::OlsFit;
use gdp_compare::standardize::Standardizer;
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn simulated(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let x = Array2::from_shape_fn((n, p), |_| normal.sample(&mut rng));
    let x = Standardizer::fit(&x).transform(&x);
    let beta = Array1::from_shape_fn(p, |j| if j < 2 { 2.0 - 3.0 * j as f64 } else { 0.0 });
    let noise = Array1::from_shape_fn(n, |_| 0.5 * normal.sample(&mut rng));
    let y = x.dot(&beta) + noise + 4.0;
    (x, y)
}

#[test]
fn test_cp_selection_takes_first_minimum() {
    assert_eq!(select_cp_step(&[5.0, 2.0, 2.0, 7.0]).unwrap(), 1);
    assert_eq!(select_cp_step(&[f64::NAN, 3.0, 1.0]).unwrap(), 2);
    assert!(matches!(
        select_cp_step(&[f64::NAN, f64::NAN]),
        Err(LassoError::UndefinedCp)
    ));
}

#[test]
fn test_path_starts_empty_and_ends_at_least_squares() {
    let (x, y) = simulated(60, 5, 21);
    let path = lars_lasso_path(&x, &y).unwrap();

    assert!(path.coefficients.row(0).iter().all(|b| *b == 0.0));
    assert_eq!(path.df[0], 1);
    assert_abs_diff_eq!(path.intercept, y.mean().unwrap(), epsilon = 1e-12);

    let ols = OlsFit::fit(&x, &y).unwrap();
    let last = path.coefficients.row(path.n_steps() - 1);
    for (l, o) in last.iter().zip(ols.coefficients.iter()) {
        assert_abs_diff_eq!(l, o, epsilon = 1e-6);
    }
    assert_eq!(*path.df.last().unwrap(), 6);
}

#[test]
fn test_first_variable_has_largest_correlation() {
    let (x, y) = simulated(60, 5, 8);
    let path = lars_lasso_path(&x, &y).unwrap();
    let yc = &y - y.mean().unwrap();
    let corr = x.t().dot(&yc);
    let strongest = (0..5)
        .max_by(|&a, &b| corr[a].abs().total_cmp(&corr[b].abs()))
        .unwrap();
    assert_eq!(path.actions[0], PathAction::Add(strongest));
}

#[test]
fn test_cp_is_defined_and_selects_a_sparse_model() {
    let (x, y) = simulated(80, 6, 2);
    let path = lars_lasso_path(&x, &y).unwrap();
    assert!(path.cp.iter().all(|c| c.is_finite()));

    let step = path.select_step().unwrap();
    let chosen = path.coefficients.row(step);
    assert!(chosen[0] > 0.0);
    assert!(chosen[1] < 0.0);

    let predicted = path.predict(&x, step).unwrap();
    assert_eq!(predicted.len(), 80);
    assert!(matches!(
        path.predict(&x, path.n_steps()),
        Err(LassoError::StepOutOfRange { .. })
    ));
}

#[test]
fn test_cp_undefined_without_residual_degrees_of_freedom() {
    let (x, y) = simulated(4, 4, 9);
    let path = lars_lasso_path(&x, &y).unwrap();
    assert!(path.cp.iter().all(|c| c.is_nan()));
    assert!(matches!(path.select_step(), Err(LassoError::UndefinedCp)));
}

#[test]
fn test_zero_column_never_enters() {
    let (x, y) = simulated(40, 3, 4);
    let mut padded = Array2::zeros((40, 4));
    padded.slice_mut(ndarray::s![.., 0..3]).assign(&x);
    let path = lars_lasso_path(&padded, &y).unwrap();
    assert!(path.coefficients.column(3).iter().all(|b| *b == 0.0));
    assert!(!path.actions.contains(&PathAction::Add(3)));
}

#[test]
fn test_dimension_mismatch() {
    let x = array![[1.0], [2.0], [3.0]];
    let y = array![1.0, 2.0];
    assert!(matches!(
        lars_lasso_path(&x, &y),
        Err(LassoError::DimensionMismatch { x_rows: 3, y_len: 2 })
    ));
}

#[test]
fn test_duplicated_column_is_skipped() {
    let (mut x, _) = simulated(50, 3, 17);
    let copy = x.column(0).to_owned();
    x.column_mut(2).assign(&copy);
    let mut rng = StdRng::seed_from_u64(3);
    let normal = Normal::new(0.0, 0.3).unwrap();
    let y = x.column(0).mapv(|v| 2.0 * v) + Array1::from_shape_fn(50, |_| normal.sample(&mut rng));

    let path = lars_lasso_path(&x, &y).unwrap();
    let step = path.select_step().unwrap();
    assert!(path.cp.iter().all(|c| c.is_finite()));

    // Only one of the two identical columns ever carries weight.
    for row in path.coefficients.outer_iter() {
        assert!(row[0] == 0.0 || row[2] == 0.0);
    }
    let last = path.coefficients.row(path.n_steps() - 1);
    assert_abs_diff_eq!(last[0] + last[2], 2.0, epsilon = 0.2);

    let predicted = path.predict(&x, step).unwrap();
    assert_eq!(predicted.len(), 50);
}
