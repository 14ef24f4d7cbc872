//! Loading, encoding and validation of the regression dataset.
//!
//! The input is a CSV table with a header row. One column is the response,
//! some columns may be dropped (identifiers), declared categorical columns are
//! expanded into 0/1 indicator columns and every remaining column must be
//! numeric. Any violation fails the whole run, so the errors here are written
//! for the person who prepared the file.

use std::collections::BTreeSet;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use thiserror::Error;

/// Errors raised while reading or validating the dataset.
#[derive(Debug, Error)]
pub enum DataError {
    /// The CSV reader or writer failed.
    #[error("Failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),
    /// The file could not be opened.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A configured column is absent from the header.
    #[error("The required column '{0}' was not found in the input file.")]
    ColumnNotFound(String),
    /// An empty cell.
    #[error("Missing value in column '{column}' at data row {row}.")]
    MissingValue {
        /// Column name.
        column: String,
        /// One-based data row.
        row: usize,
    },
    /// A numeric column holds text.
    #[error("Column '{column}' contains the non-numeric entry '{value}' at data row {row}.")]
    NonNumeric {
        /// Column name.
        column: String,
        /// One-based data row.
        row: usize,
        /// The offending entry.
        value: String,
    },
    /// The response cannot be square-rooted.
    #[error("The response must be non-negative, found {value} at data row {row}.")]
    NegativeResponse {
        /// One-based data row.
        row: usize,
        /// The negative response.
        value: f64,
    },
    /// A NaN or infinite value.
    #[error("Non-finite value in column '{column}' at data row {row}.")]
    NonFinite {
        /// Column name, or `response`.
        column: String,
        /// One-based data row.
        row: usize,
    },
    /// Too few rows to split.
    #[error("The dataset has {found} rows, but at least {required} are required.")]
    InsufficientRows {
        /// Rows present.
        found: usize,
        /// Rows needed.
        required: usize,
    },
    /// Every column was excluded or used as the response.
    #[error("The dataset has no predictor columns.")]
    NoPredictors,
    /// Covariates and response disagree in length.
    #[error("Covariate matrix has {x_rows} rows but the response has {y_len} entries.")]
    DimensionMismatch {
        /// Rows of the covariate matrix.
        x_rows: usize,
        /// Length of the response.
        y_len: usize,
    },
    /// The predictor names do not match the columns.
    #[error("Expected {expected} predictor names, found {found}.")]
    NameCountMismatch {
        /// Number of covariate columns.
        expected: usize,
        /// Number of names supplied.
        found: usize,
    },
}

/// Access to the covariate matrix and response of a regression problem.
pub trait RegressionData {
    #![allow(non_snake_case)]
    /// Covariate matrix, one row per observation.
    fn X(&self) -> &Array2<f64>;
    /// Response vector.
    fn y(&self) -> &Array1<f64>;
    /// Predictor names, one per column of `X`.
    fn names(&self) -> &[String];

    /// Number of observations.
    fn n_obs(&self) -> usize {
        self.y().len()
    }

    /// Rows `indices` of the covariates and the response.
    fn rows(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        (
            self.X().select(Axis(0), indices),
            self.y().select(Axis(0), indices),
        )
    }
}

/// Which columns of the input table play which role.
#[derive(Debug, Clone, Default)]
pub struct DataSchema {
    /// Response column.
    pub response: String,
    /// Columns dropped before modelling (identifiers, grouping labels).
    pub exclude: Vec<String>,
    /// Columns encoded as 0/1 indicators.
    pub categorical: Vec<String>,
}

/// A validated regression dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Dataset {
    /// Creates a dataset, checking shapes, finiteness and a non-negative response.
    pub fn new(names: Vec<String>, x: Array2<f64>, y: Array1<f64>) -> Result<Self, DataError> {
        if x.nrows() != y.len() {
            return Err(DataError::DimensionMismatch {
                x_rows: x.nrows(),
                y_len: y.len(),
            });
        }
        if names.len() != x.ncols() {
            return Err(DataError::NameCountMismatch {
                expected: x.ncols(),
                found: names.len(),
            });
        }
        if x.ncols() == 0 {
            return Err(DataError::NoPredictors);
        }
        if y.len() < 2 {
            return Err(DataError::InsufficientRows {
                found: y.len(),
                required: 2,
            });
        }
        for ((row, col), value) in x.indexed_iter() {
            if !value.is_finite() {
                return Err(DataError::NonFinite {
                    column: names[col].clone(),
                    row: row + 1,
                });
            }
        }
        for (row, &value) in y.iter().enumerate() {
            if !value.is_finite() {
                return Err(DataError::NonFinite {
                    column: "response".to_string(),
                    row: row + 1,
                });
            }
            if value < 0.0 {
                return Err(DataError::NegativeResponse {
                    row: row + 1,
                    value,
                });
            }
        }
        Ok(Self { names, x, y })
    }

    /// Number of predictor columns after encoding.
    pub fn n_predictors(&self) -> usize {
        self.x.ncols()
    }
}

impl RegressionData for Dataset {
    fn X(&self) -> &Array2<f64> {
        &self.x
    }

    fn y(&self) -> &Array1<f64> {
        &self.y
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan")
}

fn parse_numeric(column: &str, row: usize, cell: &str) -> Result<f64, DataError> {
    if is_missing(cell) {
        return Err(DataError::MissingValue {
            column: column.to_string(),
            row,
        });
    }
    cell.parse::<f64>().map_err(|_| DataError::NonNumeric {
        column: column.to_string(),
        row,
        value: cell.to_string(),
    })
}

/// Loads a CSV file into a [`Dataset`] according to `schema`.
pub fn load_csv<P: AsRef<Path>>(path: P, schema: &DataSchema) -> Result<Dataset, DataError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    read_csv(reader, schema)
}

/// Parses CSV text into a [`Dataset`] according to `schema`.
pub fn parse_csv(text: &str, schema: &DataSchema) -> Result<Dataset, DataError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    read_csv(reader, schema)
}

fn read_csv<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    schema: &DataSchema,
) -> Result<Dataset, DataError> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    };
    let response_idx = position(schema.response.as_str())?;
    for name in schema.exclude.iter().chain(schema.categorical.iter()) {
        position(name.as_str())?;
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (col, cell) in record.iter().enumerate().take(headers.len()) {
            cells[col].push(cell.to_string());
        }
    }
    let n = cells[response_idx].len();

    let y = cells[response_idx]
        .iter()
        .enumerate()
        .map(|(row, cell)| parse_numeric(&schema.response, row + 1, cell))
        .collect::<Result<Vec<f64>, _>>()?;

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (col, header) in headers.iter().enumerate() {
        if col == response_idx || schema.exclude.contains(header) {
            continue;
        }
        if schema.categorical.contains(header) {
            for (name, indicator) in encode_categorical(header, &cells[col])? {
                names.push(name);
                columns.push(indicator);
            }
        } else {
            let values = cells[col]
                .iter()
                .enumerate()
                .map(|(row, cell)| parse_numeric(header, row + 1, cell))
                .collect::<Result<Vec<f64>, _>>()?;
            names.push(header.clone());
            columns.push(values);
        }
    }

    let p = columns.len();
    let x = Array2::from_shape_fn((n, p), |(i, j)| columns[j][i]);
    log::info!("Loaded {} observations with {} predictors", n, p);
    Dataset::new(names, x, Array1::from_vec(y))
}

/// Treatment coding: one 0/1 column per non-baseline level, levels sorted
/// lexicographically and the first one taken as baseline.
pub fn encode_categorical(
    column: &str,
    cells: &[String],
) -> Result<Vec<(String, Vec<f64>)>, DataError> {
    if let Some(row) = cells.iter().position(|c| is_missing(c)) {
        return Err(DataError::MissingValue {
            column: column.to_string(),
            row: row + 1,
        });
    }
    let levels: BTreeSet<&str> = cells.iter().map(String::as_str).collect();
    let encoded = levels
        .iter()
        .skip(1)
        .map(|level| {
            let indicator = cells
                .iter()
                .map(|c| if c == level { 1.0 } else { 0.0 })
                .collect();
            (format!("{column}{level}"), indicator)
        })
        .collect();
    Ok(encoded)
}

/// Linear ground truth used to generate synthetic data.
#[derive(Debug, Clone)]
pub struct SyntheticDesign {
    /// Number of observations.
    pub n: usize,
    /// True coefficients; their length sets the number of predictors.
    pub coefficients: Vec<f64>,
    /// True intercept on the square-root scale.
    pub intercept: f64,
    /// Standard deviation of the Gaussian noise.
    pub noise_sd: f64,
}

impl SyntheticDesign {
    /// A design whose first three coefficients are `1.5, -1.0, 0.5` and the
    /// rest zero, with an intercept large enough to keep the signal positive.
    pub fn sparse(n: usize, p: usize, noise_sd: f64) -> Self {
        let coefficients: Vec<f64> = (0..p)
            .map(|j| match j {
                0 => 1.5,
                1 => -1.0,
                2 => 0.5,
                _ => 0.0,
            })
            .collect();
        let intercept = coefficients.iter().map(|b| b.abs()).sum::<f64>() + 6.0 * noise_sd + 1.0;
        Self {
            n,
            coefficients,
            intercept,
            noise_sd,
        }
    }

    /// Draws covariates uniformly on `[-1, 1]` and a response whose square
    /// root is `intercept + x·coefficients + noise`.
    ///
    /// The intercept must dominate the signal for `sqrt(y)` to stay linear;
    /// a negative draw is folded to its absolute value.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Dataset, DataError> {
        let p = self.coefficients.len();
        let uniform = Uniform::new_inclusive(-1.0, 1.0);
        let noise = Normal::new(0.0, self.noise_sd.max(0.0)).map_err(|_| DataError::NonFinite {
            column: "noise".to_string(),
            row: 0,
        })?;
        let x = Array2::from_shape_fn((self.n, p), |_| uniform.sample(rng));
        let beta = Array1::from_vec(self.coefficients.clone());
        let signal = x.dot(&beta) + self.intercept;
        let y = signal.mapv(|s| (s + noise.sample(rng)).powi(2));
        let names = (1..=p).map(|j| format!("x{j}")).collect();
        Dataset::new(names, x, y)
    }
}

/// Writes `data` as CSV with a leading `id` column and the response last.
pub fn write_csv<P: AsRef<Path>, D: RegressionData>(
    path: P,
    data: &D,
    response: &str,
) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["id".to_string()];
    header.extend(data.names().iter().cloned());
    header.push(response.to_string());
    writer.write_record(&header)?;
    for (i, row) in data.X().outer_iter().enumerate() {
        let mut record = vec![(i + 1).to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        record.push(data.y()[i].to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
