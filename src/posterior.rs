//! Storage and summaries of posterior draws.

use ndarray::{concatenate, Array1, Array2, Axis};

use crate::math::{hpd_interval, mean, quantile_sorted, sample_sd, sample_variance, sorted_copy};

/// Draws of one monitored quantity, one `(draws × dim)` matrix per chain.
#[derive(Debug, Clone)]
pub struct QuantityDraws {
    /// Monitored node name.
    pub name: String,
    /// Draws per chain.
    pub chains: Vec<Array2<f64>>,
}

impl QuantityDraws {
    /// Wraps the per-chain draws of `name`.
    pub fn new(name: impl Into<String>, chains: Vec<Array2<f64>>) -> Self {
        Self {
            name: name.into(),
            chains,
        }
    }

    /// Number of elements (1 for scalars).
    pub fn dim(&self) -> usize {
        self.chains.first().map(|c| c.ncols()).unwrap_or(0)
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Draws of all chains stacked in chain order.
    pub fn pooled(&self) -> Array2<f64> {
        let views: Vec<_> = self.chains.iter().map(|c| c.view()).collect();
        concatenate(Axis(0), &views).unwrap_or_else(|_| Array2::zeros((0, self.dim())))
    }

    /// Per-element posterior means.
    pub fn mean(&self) -> Array1<f64> {
        let pooled = self.pooled();
        pooled
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(self.dim(), f64::NAN))
    }

    /// The draws of element `index` for each chain.
    fn element_chains(&self, index: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.column(index).to_vec())
            .collect()
    }

    /// Label of element `index`: the bare name for scalars, `name[k]` with
    /// a one-based `k` otherwise.
    pub fn label(&self, index: usize) -> String {
        if self.dim() == 1 {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, index + 1)
        }
    }
}

/// Summary statistics of one element of a monitored quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    /// Monitored node name.
    pub quantity: String,
    /// Zero-based element index.
    pub index: usize,
    /// `quantity[index]`, or the bare name for scalars.
    pub label: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub sd: f64,
    /// 2.5% quantile.
    pub q025: f64,
    /// 25% quantile.
    pub q25: f64,
    /// Median.
    pub q50: f64,
    /// 75% quantile.
    pub q75: f64,
    /// 97.5% quantile.
    pub q975: f64,
    /// Lower end of the 95% HPD interval.
    pub hpd_lower: f64,
    /// Upper end of the 95% HPD interval.
    pub hpd_upper: f64,
    /// Split R-hat; `NaN` when undefined.
    pub rhat: f64,
    /// Effective sample size.
    pub n_eff: f64,
}

/// Posterior draws of every monitored quantity.
#[derive(Debug, Clone, Default)]
pub struct Posterior {
    quantities: Vec<QuantityDraws>,
}

impl Posterior {
    /// Collects the monitored quantities.
    pub fn new(quantities: Vec<QuantityDraws>) -> Self {
        Self { quantities }
    }

    /// Quantities in monitoring order.
    pub fn quantities(&self) -> &[QuantityDraws] {
        &self.quantities
    }

    /// Names of the monitored quantities.
    pub fn names(&self) -> Vec<&str> {
        self.quantities.iter().map(|q| q.name.as_str()).collect()
    }

    /// Draws of `name`, if monitored.
    pub fn get(&self, name: &str) -> Option<&QuantityDraws> {
        self.quantities.iter().find(|q| q.name == name)
    }

    /// Pooled draws of `name`, `(draws × dim)`.
    pub fn draws(&self, name: &str) -> Option<Array2<f64>> {
        self.get(name).map(QuantityDraws::pooled)
    }

    /// Per-element posterior mean of `name`.
    pub fn mean(&self, name: &str) -> Option<Array1<f64>> {
        self.get(name).map(QuantityDraws::mean)
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.quantities.first().map(|q| q.n_chains()).unwrap_or(0)
    }

    /// One row per element of every quantity, in monitoring order.
    pub fn summarize(&self) -> Vec<SummaryRow> {
        let mut rows = Vec::new();
        for quantity in &self.quantities {
            let pooled = quantity.pooled();
            for index in 0..quantity.dim() {
                let chains = quantity.element_chains(index);
                let values = pooled.column(index).to_vec();
                let sorted = sorted_copy(&values);
                let (hpd_lower, hpd_upper) = hpd_interval(&sorted, 0.95);
                rows.push(SummaryRow {
                    quantity: quantity.name.clone(),
                    index,
                    label: quantity.label(index),
                    mean: mean(&values),
                    sd: sample_sd(&values),
                    q025: quantile_sorted(&sorted, 0.025),
                    q25: quantile_sorted(&sorted, 0.25),
                    q50: quantile_sorted(&sorted, 0.5),
                    q75: quantile_sorted(&sorted, 0.75),
                    q975: quantile_sorted(&sorted, 0.975),
                    hpd_lower,
                    hpd_upper,
                    rhat: split_rhat(&chains),
                    n_eff: effective_sample_size(&chains),
                });
            }
        }
        rows
    }

    /// Largest finite split R-hat over all elements, with its label.
    pub fn max_rhat(&self) -> Option<(String, f64)> {
        let mut worst: Option<(String, f64)> = None;
        for quantity in &self.quantities {
            for index in 0..quantity.dim() {
                let rhat = split_rhat(&quantity.element_chains(index));
                if !rhat.is_finite() {
                    continue;
                }
                if worst.as_ref().map_or(true, |(_, w)| rhat > *w) {
                    worst = Some((quantity.label(index), rhat));
                }
            }
        }
        worst
    }
}

/// Halves every chain, dropping the middle draw of odd-length chains.
fn split_chains(chains: &[Vec<f64>]) -> Vec<&[f64]> {
    let mut halves = Vec::with_capacity(2 * chains.len());
    for chain in chains {
        let half = chain.len() / 2;
        halves.push(&chain[..half]);
        halves.push(&chain[chain.len() - half..]);
    }
    halves
}

/// Within-chain mean variance `W`, between-chain variance `B` and the
/// pooled estimate `var⁺` over equal-length chains, or `None` when
/// fewer than two chains of at least two draws are available.
fn variance_components(chains: &[&[f64]]) -> Option<(f64, f64, f64, usize)> {
    let n = chains.first()?.len();
    if chains.len() < 2 || n < 2 {
        return None;
    }
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = mean(&chains.iter().map(|c| sample_variance(c)).collect::<Vec<_>>());
    let b = n as f64 * sample_variance(&means);
    let var_plus = (n - 1) as f64 / n as f64 * w + b / n as f64;
    Some((w, b, var_plus, n))
}

/// Potential scale reduction factor computed on split chains (Gelman et al.,
/// BDA3). `NaN` when it is undefined.
pub fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    let halves = split_chains(chains);
    match variance_components(&halves) {
        Some((w, _, var_plus, _)) if w > 0.0 => (var_plus / w).sqrt(),
        _ => f64::NAN,
    }
}

/// `min(m·n, m·n·var⁺ / B)` over split chains.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let halves = split_chains(chains);
    match variance_components(&halves) {
        Some((_, b, var_plus, n)) => {
            let total = (halves.len() * n) as f64;
            if b > 0.0 {
                total.min(total * var_plus / b)
            } else {
                total
            }
        }
        None => chains.iter().map(Vec::len).sum::<usize>() as f64,
    }
}
