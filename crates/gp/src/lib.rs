//! This library implements the maximum likelihood fitting of
//! [general linear models](https://en.wikipedia.org/wiki/Kriging), a trend built on a
//! functional basis plus a gaussian process with a parametric covariance model.
//!
//! The log-likelihood is concentrated on the covariance hyperparameters: the trend
//! coefficients are estimated by generalized least squares and the amplitude of scalar
//! models has a closed form. The covariance matrix is factorized either with a dense
//! Cholesky decomposition or, for large samples, with a hierarchical matrix whose
//! well separated blocks are compressed with adaptive cross approximation.
//!
//! Fitting is implemented by [GeneralLinearModelAlgorithm] parameterized by [GlmParams],
//! its outcome is a [GeneralLinearModelResult].
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod backend;
pub mod basis;
pub mod covariance_models;
mod errors;
pub mod hmat;
pub mod memoize;
pub mod optimization;
mod parameters;
pub mod reduction;
mod result;
pub mod trend;
mod utils;

pub use algorithm::*;
pub use backend::{CovarianceFactor, LinearAlgebraMethod};
pub use basis::*;
pub use covariance_models::*;
pub use errors::*;
pub use optimization::{CobylaParams, HyperOptimizer};
pub use parameters::*;
pub use result::*;
pub use utils::{lowest, regularized_cholesky, DiffMatrix, RegularizationParams};
