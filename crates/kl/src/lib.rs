//! This library computes the [Karhunen-Loeve](https://en.wikipedia.org/wiki/Kosambi%E2%80%93Karhunen%E2%80%93Lo%C3%A8ve_theorem)
//! decomposition of a covariance model over a bounded domain.
//!
//! The eigenfunctions of the covariance operator are approximated in the span of a
//! functional basis (Galerkin method) and the integrals are computed with the nodes
//! and weights of a [weighted experiment](uqbox_doe::WeightedExperiment), mapped from
//! the bounding box of its sampling distribution onto the one of the domain.
//! Only the modes needed to keep a given fraction of the variance are retained.
//!
//! Example:
//!
//! ```no_run
//! use linfa::ParamGuard;
//! use ndarray::array;
//! use uqbox_doe::GaussProductExperiment;
//! use uqbox_gp::{LegendreBasis, SquaredExponential};
//! use uqbox_kl::{BoxDomain, KarhunenLoeveQuadratureAlgorithm};
//!
//! let bounds = array![[0., 1.]];
//! let params = KarhunenLoeveQuadratureAlgorithm::params(
//!     BoxDomain::new(&bounds).unwrap(),
//!     SquaredExponential::new(array![0.3], array![1.]).unwrap(),
//!     GaussProductExperiment::new(&bounds, &[30]),
//!     LegendreBasis::new(10).with_bounds(&bounds).unwrap(),
//! )
//! .threshold(1e-3)
//! .check()
//! .unwrap();
//! let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
//! println!("{} modes: {}", result.n_modes(), result.eigenvalues());
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod domain;
mod errors;
mod parameters;
mod result;

pub use algorithm::*;
pub use domain::*;
pub use errors::*;
pub use parameters::*;
pub use result::*;
