//! Small numerical helpers shared by the estimators, the posterior summaries
//! and the report.

use ndarray::ArrayView1;

/// Arithmetic mean. Returns `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with `n - 1` in the denominator.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sample standard deviation with `n - 1` in the denominator.
pub fn sample_sd(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Root-mean-squared error between `truth` and `predicted`.
///
/// Panics if the two vectors differ in length.
pub fn rmse(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    assert_eq!(
        truth.len(),
        predicted.len(),
        "RMSE requires vectors of equal length"
    );
    if truth.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    (sse / truth.len() as f64).sqrt()
}

/// Quantile of already sorted values using linear interpolation between
/// order statistics (Hyndman & Fan type 7).
pub fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * prob.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Narrowest interval over sorted draws that contains `mass` of them.
pub fn hpd_interval(sorted: &[f64], mass: f64) -> (f64, f64) {
    let n = sorted.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let window = ((mass.clamp(0.0, 1.0) * n as f64).ceil() as usize).clamp(1, n);
    let mut best = (sorted[0], sorted[window - 1]);
    for start in 1..=(n - window) {
        let candidate = (sorted[start], sorted[start + window - 1]);
        if candidate.1 - candidate.0 < best.1 - best.0 {
            best = candidate;
        }
    }
    best
}

/// Sorts a copy of `values`, placing `NaN` last.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Boxplot statistics of a score sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiveNumberSummary {
    /// Smallest value.
    pub min: f64,
    /// First quartile.
    pub q1: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q3: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
}

impl FiveNumberSummary {
    /// Summarizes `values`; `None` when there is nothing to summarize.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted_copy(values);
        Some(Self {
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q3: quantile_sorted(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean: mean(values),
        })
    }
}
