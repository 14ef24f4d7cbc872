//! Random train/test partition of row indices.

use rand::seq::index;
use rand::Rng;
use thiserror::Error;

/// Invalid split requests.
#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    /// One side of the split would have no rows.
    #[error("A training set of {n_train} rows out of {n} leaves an empty partition.")]
    EmptyPartition {
        /// Total rows.
        n: usize,
        /// Requested training rows.
        n_train: usize,
    },
    /// The fraction is outside `(0, 1)`.
    #[error("Training fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidFraction(f64),
}

/// Disjoint train and test row indices, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Training row indices.
    pub train: Vec<usize>,
    /// Test row indices.
    pub test: Vec<usize>,
}

/// `floor(fraction * n)`.
pub fn train_size(n: usize, fraction: f64) -> Result<usize, SplitError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SplitError::InvalidFraction(fraction));
    }
    Ok((fraction * n as f64).floor() as usize)
}

/// Draws `n_train` rows uniformly without replacement; the rest form the
/// test set.
///
/// The generator is borrowed, not owned: callers thread one stream through
/// all repetitions so that a run is reproducible from its seed alone.
pub fn draw_split<R: Rng + ?Sized>(
    n: usize,
    n_train: usize,
    rng: &mut R,
) -> Result<Split, SplitError> {
    if n_train == 0 || n_train >= n {
        return Err(SplitError::EmptyPartition { n, n_train });
    }
    let mut train = index::sample(rng, n, n_train).into_vec();
    train.sort_unstable();

    let mut in_train = vec![false; n];
    for &i in &train {
        in_train[i] = true;
    }
    let test = (0..n).filter(|&i| !in_train[i]).collect();

    Ok(Split { train, test })
}
