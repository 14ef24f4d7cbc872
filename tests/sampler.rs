use gdp_compare::config::{PriorConfig, SamplerSettings};
use gdp_compare::math::rmse;
use gdp_compare::model::{Distribution, Expr, ModelSpec, NodeKind};
use gdp_compare::sampler::{GdpGibbs, PosteriorSampler, SamplerData, SamplerError};
use gdp_compare::standardize::Standardizer;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution as _, Normal, Uniform};

const INTERCEPT: f64 = 3.0;

struct Problem {
    data: SamplerData,
    truth_test: Array1<f64>,
}

fn problem(rng: &mut StdRng, n: usize, beta: &[f64], noise_sd: f64, monitor: &[&str]) -> Problem {
    let p = beta.len();
    let uniform = Uniform::new(-1.0, 1.0);
    let noise = Normal::new(0.0, noise_sd).unwrap();
    let beta = Array1::from_vec(beta.to_vec());

    let x = Array2::from_shape_fn((n, p), |_| uniform.sample(rng));
    let y = x.dot(&beta) + INTERCEPT + Array1::from_shape_fn(n, |_| noise.sample(rng));
    let x_test = Array2::from_shape_fn((10, p), |_| uniform.sample(rng));
    let truth_test = x_test.dot(&beta) + INTERCEPT;

    let standardizer = Standardizer::fit(&x);
    Problem {
        data: SamplerData {
            x: standardizer.transform(&x),
            y,
            x_test: standardizer.transform(&x_test),
            center: standardizer.center.clone(),
            scale: standardizer.scale.clone(),
            monitor: monitor.iter().map(|s| s.to_string()).collect(),
        },
        truth_test,
    }
}

fn settings(n_iter: usize, burn_in: usize) -> SamplerSettings {
    SamplerSettings {
        n_chains: 2,
        n_iter,
        burn_in,
        thin: 1,
        rhat_threshold: 1.1,
        discard_unconverged: false,
        monitor: vec![],
    }
}

fn gdp() -> ModelSpec {
    ModelSpec::gdp(&PriorConfig::default())
}

#[test]
fn test_unknown_and_observed_quantities_are_rejected() {
    let mut rng = StdRng::seed_from_u64(1);
    let problem = problem(&mut rng, 30, &[1.0, -1.0], 0.3, &["gamma"]);
    let result = GdpGibbs.sample(&gdp(), &problem.data, &settings(20, 10), &mut rng);
    assert!(matches!(result, Err(SamplerError::UnknownQuantity(name)) if name == "gamma"));

    let mut data = problem.data.clone();
    data.monitor = vec!["y".to_string()];
    let result = GdpGibbs.sample(&gdp(), &data, &settings(20, 10), &mut rng);
    assert!(matches!(result, Err(SamplerError::ObservedQuantity(name)) if name == "y"));
}

#[test]
fn test_models_outside_the_family_are_rejected() {
    let mut rng = StdRng::seed_from_u64(2);
    let problem = problem(&mut rng, 30, &[1.0, -1.0], 0.3, &["beta"]);

    let mut gamma_tau = gdp();
    if let Some(node) = gamma_tau.nodes.iter_mut().find(|n| n.name == "tau") {
        node.kind = NodeKind::Stochastic {
            distribution: Distribution::Gamma {
                shape: Expr::Const(1.0),
                rate: Expr::Const(1.0),
            },
            observed: false,
        };
    }
    let result = GdpGibbs.sample(&gamma_tau, &problem.data, &settings(20, 10), &mut rng);
    assert!(matches!(result, Err(SamplerError::UnsupportedModel(_))));

    let mut quadratic = gdp();
    if let Some(node) = quadratic.nodes.iter_mut().find(|n| n.name == "beta") {
        node.kind = NodeKind::Stochastic {
            distribution: Distribution::Normal {
                mean: Expr::Const(0.0),
                precision: Expr::var("phi") * Expr::var("phi") / Expr::var("tau"),
            },
            observed: false,
        };
    }
    let result = GdpGibbs.sample(&quadratic, &problem.data, &settings(20, 10), &mut rng);
    assert!(matches!(result, Err(SamplerError::UnsupportedModel(_))));
}

#[test]
fn test_original_scale_coefficients_match_every_draw() {
    let mut rng = StdRng::seed_from_u64(3);
    let problem = problem(
        &mut rng,
        40,
        &[1.5, 0.0, -0.7],
        0.4,
        &["beta", "alpha", "beta_orig", "beta0"],
    );
    let posterior = GdpGibbs
        .sample(&gdp(), &problem.data, &settings(60, 20), &mut rng)
        .unwrap();

    let beta = posterior.draws("beta").unwrap();
    let alpha = posterior.draws("alpha").unwrap();
    let beta_orig = posterior.draws("beta_orig").unwrap();
    let beta0 = posterior.draws("beta0").unwrap();
    assert_eq!(beta.nrows(), 80);
    assert_eq!(beta_orig.ncols(), 3);

    for d in 0..beta.nrows() {
        let expected = &beta.row(d) / &problem.data.scale;
        for j in 0..3 {
            assert!((beta_orig[(d, j)] - expected[j]).abs() < 1e-12);
        }
        let expected0 = alpha[(d, 0)] - expected.dot(&problem.data.center);
        assert!((beta0[(d, 0)] - expected0).abs() < 1e-10);
    }
}

#[test]
fn test_same_seed_gives_same_draws() {
    let run = || {
        let mut rng = StdRng::seed_from_u64(4);
        let problem = problem(&mut rng, 30, &[1.0, -0.5], 0.3, &["beta_orig", "sigma"]);
        GdpGibbs
            .sample(&gdp(), &problem.data, &settings(50, 10), &mut rng)
            .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.draws("beta_orig"), b.draws("beta_orig"));
    assert_eq!(a.draws("sigma"), b.draws("sigma"));
}

#[test]
fn test_predictions_and_noise_are_recovered() {
    let mut rng = StdRng::seed_from_u64(5);
    let problem = problem(&mut rng, 100, &[1.0, -0.5, 0.8], 0.1, &["mu_pred", "sigma"]);
    let posterior = GdpGibbs
        .sample(&gdp(), &problem.data, &settings(1500, 500), &mut rng)
        .unwrap();

    let predicted = posterior.mean("mu_pred").unwrap();
    assert!(rmse(problem.truth_test.view(), predicted.view()) < 0.1);

    let sigma = posterior.mean("sigma").unwrap()[0];
    assert!(sigma > 0.07 && sigma < 0.14, "sigma = {sigma}");
}

#[test]
fn test_credible_intervals_cover_true_coefficients() {
    let truth = [2.0, -1.5];
    let mut rng = StdRng::seed_from_u64(6);
    let mut equal_tail = 0;
    let mut hpd = 0;
    let trials = 30;
    for _ in 0..trials {
        let problem = problem(&mut rng, 60, &truth, 0.5, &["beta_orig"]);
        let posterior = GdpGibbs
            .sample(&gdp(), &problem.data, &settings(700, 200), &mut rng)
            .unwrap();
        for row in posterior.summarize() {
            assert_eq!(row.quantity, "beta_orig");
            let t = truth[row.index];
            if row.q025 <= t && t <= row.q975 {
                equal_tail += 1;
            }
            if row.hpd_lower <= t && t <= row.hpd_upper {
                hpd += 1;
            }
        }
    }
    let total = 2 * trials;
    assert!(equal_tail >= 54, "{equal_tail} of {total} 95% intervals covered the truth");
    assert!(hpd >= 54, "{hpd} of {total} 95% HPD intervals covered the truth");
}
