use approx::assert_abs_diff_eq;
use gdp_compare::ols::{OlsError, OlsFit};
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

#[test]
fn test_exact_linear_relation_is_recovered() {
    let mut rng = StdRng::seed_from_u64(3);
    let uniform = Uniform::new(-5.0, 5.0);
    let x = Array2::from_shape_fn((20, 3), |_| uniform.sample(&mut rng));
    let beta = array![1.0, -2.0, 0.5];
    let y = x.dot(&beta) + 2.0;

    let fit = OlsFit::fit(&x, &y).unwrap();
    assert_abs_diff_eq!(fit.intercept, 2.0, epsilon = 1e-8);
    for (estimate, truth) in fit.coefficients.iter().zip(beta.iter()) {
        assert_abs_diff_eq!(estimate, truth, epsilon = 1e-8);
    }

    let predicted = fit.predict(&x);
    for (p, t) in predicted.iter().zip(y.iter()) {
        assert_abs_diff_eq!(p, t, epsilon = 1e-8);
    }
}

#[test]
fn test_duplicated_column_is_singular() {
    let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
    let y = array![1.0, 2.0, 2.5, 4.0];
    assert!(matches!(OlsFit::fit(&x, &y), Err(OlsError::SingularDesign)));
}

#[test]
fn test_constant_column_is_singular() {
    let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [5.0, 7.0]];
    let y = array![1.0, 2.0, 2.5, 4.0];
    assert!(matches!(OlsFit::fit(&x, &y), Err(OlsError::SingularDesign)));
}

#[test]
fn test_too_few_observations() {
    let x = Array2::<f64>::zeros((2, 2));
    let y = Array1::<f64>::zeros(2);
    assert!(matches!(
        OlsFit::fit(&x, &y),
        Err(OlsError::InsufficientObservations { needed: 3, got: 2 })
    ));
}
