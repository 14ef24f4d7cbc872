//   Copyright 2024 The PyMC Developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
#![warn(missing_docs)]
#![allow(non_snake_case)]

//! gdp_compare measures how well three linear regression methods predict
//! held-out data: ordinary least squares, the lasso with its penalty chosen
//! by Mallows' Cp along the LARS path, and Bayesian regression under the
//! Generalized Double Pareto (GDP) shrinkage prior of Armagan, Dunson and
//! Lee [2013], fitted by Gibbs sampling.
//!
//! The data are split at random into training and test rows many times
//! from one seeded generator. Each method is fitted on the square root of
//! the training response and scored by its root-mean-squared error on the
//! test rows. The Bayesian model is a declarative graph ([`model`]) that
//! the sampler ([`sampler`]) reads to derive its conditional updates.

pub mod config;
pub mod data;
pub mod experiment;
pub mod lasso;
pub mod linalg;
pub mod math;
pub mod model;
pub mod ols;
pub mod posterior;
pub mod report;
pub mod sampler;
pub mod split;
pub mod standardize;

pub use config::ExperimentConfig;
pub use data::{Dataset, RegressionData};
pub use experiment::{run_comparison, ComparisonResults, ModelKind, Score};
