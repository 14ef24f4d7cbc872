//! Column-wise centering and scaling fitted on the training partition.

use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Per-column center and scale learned from training covariates.
///
/// A column whose training standard deviation is zero keeps `scale = 1`, so
/// it is centered but never divided.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    /// Training column means.
    pub center: Array1<f64>,
    /// Training column standard deviations, 1 for constant columns.
    pub scale: Array1<f64>,
    constant: Vec<bool>,
}

impl Standardizer {
    /// Learns the column means and standard deviations (`n - 1` denominator).
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows();
        let p = x.ncols();
        let center = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(p));
        let sd = if n > 1 {
            x.std_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(p)
        };

        let constant: Vec<bool> = sd
            .iter()
            .zip(center.iter())
            .map(|(&s, &m)| !(s.is_finite() && s > 1e-10 * (1.0 + m.abs())))
            .collect();
        let scale = Array1::from_shape_fn(p, |j| if constant[j] { 1.0 } else { sd[j] });

        for (j, &is_constant) in constant.iter().enumerate() {
            if is_constant {
                log::debug!("Column {} has zero training variance; leaving it unscaled", j);
            }
        }

        Self {
            center,
            scale,
            constant,
        }
    }

    /// Applies `(x - center) / scale` column-wise.
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.center) / &self.scale
    }

    /// Whether column `j` had zero variance in the training data.
    pub fn is_constant(&self, j: usize) -> bool {
        self.constant[j]
    }

    /// Maps coefficients fitted on standardized covariates back to the
    /// original units: `beta_orig = beta / scale` and
    /// `beta0 = intercept - beta_orig · center`.
    pub fn unscale_coefficients(
        &self,
        beta: ArrayView1<f64>,
        intercept: f64,
    ) -> (f64, Array1<f64>) {
        let beta_orig = &beta / &self.scale;
        let beta0 = intercept - beta_orig.dot(&self.center);
        (beta0, beta_orig)
    }
}
