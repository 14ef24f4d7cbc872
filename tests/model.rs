use approx::assert_abs_diff_eq;
use gdp_compare::config::PriorConfig;
use gdp_compare::model::{Distribution, Env, Expr, ModelError, ModelSpec, Node, Value};
use ndarray::array;

fn gdp() -> ModelSpec {
    ModelSpec::gdp(&PriorConfig::default())
}

#[test]
fn test_gdp_graph_is_valid() {
    assert_eq!(gdp().validate(), Ok(()));
}

#[test]
fn test_topological_order_puts_parents_first() {
    let model = gdp();
    let order = model.topological_order().unwrap();
    assert_eq!(order.len(), model.nodes.len());
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    for name in &order {
        for parent in model.parents(name).unwrap() {
            assert!(
                position(parent.as_str()) < position(name.as_str()),
                "{parent} after {name}"
            );
        }
    }
}

#[test]
fn test_parents_exclude_data() {
    let model = gdp();
    let mut parents = model.parents("beta").unwrap();
    parents.sort();
    assert_eq!(parents, vec!["phi".to_string(), "tau".to_string()]);
    assert_eq!(model.parents("tau").unwrap(), vec!["lambda".to_string()]);
    assert!(model.parents("lambda").unwrap().is_empty());
}

#[test]
fn test_ancestors_of_predictions() {
    let ancestors = gdp().ancestors("mu_pred").unwrap();
    for name in ["mu_pred", "beta", "alpha", "phi", "tau", "lambda"] {
        assert!(ancestors.contains(name), "missing {name}");
    }
    assert!(!ancestors.contains("y"));
}

#[test]
fn test_renders_jags_model() {
    let text = gdp().to_string();
    assert!(text.starts_with("model {"));
    assert!(text.ends_with('}'));
    for line in [
        "mu[i] <- inprod(x[i,], beta) + alpha",
        "y[i] ~ dnorm(mu[i], phi)",
        "beta[i] ~ dnorm(0, sqrt(n_train - 1) * phi / tau[i])",
        "tau[i] ~ dexp(pow(lambda, 2) / 2)",
        "sigma <- pow(phi, -0.5)",
        "beta0 <- alpha - inprod(beta_orig, x_center)",
    ] {
        assert!(text.contains(line), "missing `{line}` in\n{text}");
    }
}

#[test]
fn test_cycle_is_rejected() {
    let model = ModelSpec {
        data: vec![],
        nodes: vec![
            Node::deterministic("a", None, Expr::var("b") + 1.0),
            Node::deterministic("b", None, Expr::var("a") * 2.0),
        ],
    };
    assert!(matches!(model.validate(), Err(ModelError::Cycle(_))));
}

#[test]
fn test_unknown_reference_and_duplicates_are_rejected() {
    let unknown = ModelSpec {
        data: vec![],
        nodes: vec![Node::deterministic("a", None, Expr::var("zzz"))],
    };
    assert_eq!(
        unknown.validate(),
        Err(ModelError::UnknownReference("zzz".to_string()))
    );

    let duplicate = ModelSpec {
        data: vec![],
        nodes: vec![
            Node::deterministic("a", None, Expr::Const(1.0)),
            Node::deterministic("a", None, Expr::Const(2.0)),
        ],
    };
    assert_eq!(
        duplicate.validate(),
        Err(ModelError::DuplicateNode("a".to_string()))
    );
}

#[test]
fn test_expression_evaluation_broadcasts() {
    let mut env = Env::new();
    env.insert("x".into(), Value::Matrix(array![[1.0, 2.0], [3.0, 4.0]]));
    env.insert("beta".into(), Value::Vector(array![0.5, -1.0]));
    env.insert("alpha".into(), Value::Scalar(10.0));

    let mu = Expr::RowDot("x".into(), "beta".into()) + Expr::var("alpha");
    assert_eq!(mu.eval(&env), Ok(Value::Vector(array![8.5, 7.5])));

    let scaled = Expr::var("beta") / 2.0;
    assert_eq!(scaled.eval(&env), Ok(Value::Vector(array![0.25, -0.5])));

    let bad = Expr::RowDot("x".into(), "alpha".into());
    assert!(matches!(bad.eval(&env), Err(ModelError::ShapeMismatch(_))));
}

#[test]
fn test_log_densities() {
    let env = Env::new();
    let normal = Distribution::Normal {
        mean: Expr::Const(0.0),
        precision: Expr::Const(1.0),
    };
    assert_abs_diff_eq!(
        normal.log_density(&Value::Scalar(0.0), &env, "n").unwrap(),
        -0.5 * (2.0 * std::f64::consts::PI).ln(),
        epsilon = 1e-12
    );

    let exponential = Distribution::Exponential {
        rate: Expr::Const(2.0),
    };
    assert_abs_diff_eq!(
        exponential
            .log_density(&Value::Vector(array![1.0, 0.5]), &env, "e")
            .unwrap(),
        2.0 * 2.0_f64.ln() - 3.0,
        epsilon = 1e-12
    );

    let gamma = Distribution::Gamma {
        shape: Expr::Const(2.0),
        rate: Expr::Const(3.0),
    };
    assert_abs_diff_eq!(
        gamma.log_density(&Value::Scalar(1.0), &env, "g").unwrap(),
        2.0 * 3.0_f64.ln() - 3.0,
        epsilon = 1e-10
    );
    assert_eq!(
        gamma.log_density(&Value::Scalar(-1.0), &env, "g").unwrap(),
        f64::NEG_INFINITY
    );
}
