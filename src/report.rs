//! CSV artifacts and the console summary of a comparison run.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::experiment::{ComparisonResults, ModelKind};
use crate::posterior::Posterior;

/// Failures while writing the run outputs.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The CSV writer failed.
    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),
    /// The output directory or file could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const MISSING: &str = "NA";

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

/// `repetition,ols,lasso,gdp`, one row per repetition.
pub fn write_scores<P: AsRef<Path>>(
    path: P,
    results: &ComparisonResults,
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["repetition".to_string()];
    header.extend(ModelKind::ALL.iter().map(|k| k.name().to_string()));
    writer.write_record(&header)?;
    for rep in &results.repetitions {
        let mut record = vec![rep.index.to_string()];
        record.extend(ModelKind::ALL.iter().map(|&k| cell(rep.score(k).value())));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per monitored element with its summary statistics.
pub fn write_posterior_summary<P: AsRef<Path>>(
    path: P,
    posterior: &Posterior,
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "quantity", "mean", "sd", "q2.5", "q25", "q50", "q75", "q97.5", "hpd_lower",
        "hpd_upper", "rhat", "n_eff",
    ])?;
    for row in posterior.summarize() {
        let stats = [
            row.mean,
            row.sd,
            row.q025,
            row.q25,
            row.q50,
            row.q75,
            row.q975,
            row.hpd_lower,
            row.hpd_upper,
            row.rhat,
            row.n_eff,
        ];
        let mut record = vec![row.label];
        record.extend(stats.iter().map(|&v| cell(v.is_finite().then_some(v))));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Every retained draw: `chain,draw,<quantity[index]>...`.
pub fn write_posterior_draws<P: AsRef<Path>>(
    path: P,
    posterior: &Posterior,
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["chain".to_string(), "draw".to_string()];
    for quantity in posterior.quantities() {
        header.extend((0..quantity.dim()).map(|i| quantity.label(i)));
    }
    writer.write_record(&header)?;

    for chain in 0..posterior.n_chains() {
        let n_draws = posterior
            .quantities()
            .first()
            .map(|q| q.chains[chain].nrows())
            .unwrap_or(0);
        for draw in 0..n_draws {
            let mut record = vec![(chain + 1).to_string(), (draw + 1).to_string()];
            for quantity in posterior.quantities() {
                record.extend(quantity.chains[chain].row(draw).iter().map(|v| v.to_string()));
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Five-number summary and mean of each model's RMSE as a text table.
pub fn comparison_table(results: &ComparisonResults) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8}{:>10}{:>10}{:>10}{:>10}{:>10}{:>10}{:>9}",
        "model", "min", "q1", "median", "q3", "max", "mean", "missing"
    );
    for kind in ModelKind::ALL {
        let n_missing = results.n_missing(kind);
        match results.summary(kind) {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "{:<8}{:>10.4}{:>10.4}{:>10.4}{:>10.4}{:>10.4}{:>10.4}{:>9}",
                    kind.to_string(),
                    s.min,
                    s.q1,
                    s.median,
                    s.q3,
                    s.max,
                    s.mean,
                    n_missing
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "{:<8}{:>60}{:>9}",
                    kind.to_string(),
                    "no successful fits",
                    n_missing
                );
            }
        }
    }
    out
}

/// Writes every artifact into `dir`, creating it if needed, and returns the
/// paths written.
pub fn write_outputs<P: AsRef<Path>>(
    dir: P,
    results: &ComparisonResults,
    write_draws: bool,
) -> Result<Vec<PathBuf>, ReportError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let scores = dir.join("scores.csv");
    write_scores(&scores, results)?;
    written.push(scores);

    match &results.last_posterior {
        Some(posterior) => {
            let summary = dir.join("posterior_summary.csv");
            write_posterior_summary(&summary, posterior)?;
            written.push(summary);
            if write_draws {
                let draws = dir.join("posterior_draws.csv");
                write_posterior_draws(&draws, posterior)?;
                written.push(draws);
            }
        }
        None => log::warn!("No successful GDP fit; skipping the posterior outputs"),
    }
    Ok(written)
}
