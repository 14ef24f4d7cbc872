use gdp_compare::experiment::{ComparisonResults, RepetitionResult, Score};
use gdp_compare::posterior::{Posterior, QuantityDraws};
use gdp_compare::report::{comparison_table, write_outputs};
use ndarray::array;

fn results() -> ComparisonResults {
    let posterior = Posterior::new(vec![
        QuantityDraws::new(
            "beta_orig",
            vec![array![[1.0, 2.0], [1.5, 2.5]], array![[1.2, 2.2], [1.4, 2.4]]],
        ),
        QuantityDraws::new("sigma", vec![array![[0.3], [0.4]], array![[0.35], [0.45]]]),
    ]);
    ComparisonResults {
        repetitions: vec![
            RepetitionResult {
                index: 1,
                ols: Score::Value(0.5),
                lasso: Score::Missing("undefined Cp".to_string()),
                gdp: Score::Value(0.25),
                lasso_step: None,
            },
            RepetitionResult {
                index: 2,
                ols: Score::Value(0.75),
                lasso: Score::Missing("undefined Cp".to_string()),
                gdp: Score::Missing("not converged".to_string()),
                lasso_step: None,
            },
        ],
        last_posterior: Some(posterior),
    }
}

#[test]
fn test_outputs_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let written = write_outputs(dir.path(), &results(), true).unwrap();
    assert_eq!(written.len(), 3);

    let scores = std::fs::read_to_string(dir.path().join("scores.csv")).unwrap();
    assert_eq!(scores, "repetition,ols,lasso,gdp\n1,0.5,NA,0.25\n2,0.75,NA,NA\n");

    let summary = std::fs::read_to_string(dir.path().join("posterior_summary.csv")).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("quantity,mean,sd"));
    assert!(lines[1].starts_with("beta_orig[1],"));
    assert!(lines[3].starts_with("sigma,"));

    let draws = std::fs::read_to_string(dir.path().join("posterior_draws.csv")).unwrap();
    let lines: Vec<&str> = draws.lines().collect();
    assert_eq!(lines[0], "chain,draw,beta_orig[1],beta_orig[2],sigma");
    assert_eq!(lines[1], "1,1,1,2,0.3");
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_posterior_outputs_skipped_without_a_fit() {
    let mut results = results();
    results.last_posterior = None;
    let dir = tempfile::tempdir().unwrap();
    let written = write_outputs(dir.path().join("nested"), &results, true).unwrap();
    assert_eq!(written.len(), 1);
    assert!(dir.path().join("nested").join("scores.csv").exists());
}

#[test]
fn test_table_lists_every_model() {
    let table = comparison_table(&results());
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("OLS"));
    assert!(lines[1].contains("0.6250"));
    assert!(lines[2].starts_with("Lasso") && lines[2].contains("no successful fits"));
    assert!(lines[3].starts_with("GDP"));
}
