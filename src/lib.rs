//! A toolbox for uncertainty quantification.
//!
//! * [doe]: sampling methods and weighted experiments (Gauss product quadrature,
//!   Monte Carlo, latin hypercube)
//! * [gp]: general linear models, a functional trend plus a gaussian process,
//!   fitted by maximization of the reduced log-likelihood of the covariance
//!   hyperparameters, with dense or hierarchical matrix factorization
//! * [kl]: Karhunen-Loeve decomposition of covariance models by quadrature
//!
//! Example: fit a covariance model to data, then decompose it over the sampled box.
//!
//! ```no_run
//! use linfa::prelude::*;
//! use ndarray::{array, Array, Axis};
//! use uqbox::doe::GaussProductExperiment;
//! use uqbox::gp::{ConstantBasis, GeneralLinearModelAlgorithm, LegendreBasis, Matern52};
//! use uqbox::kl::{BoxDomain, KarhunenLoeveQuadratureAlgorithm};
//!
//! let x = Array::linspace(0f64, 1., 20).insert_axis(Axis(1));
//! let y = x.mapv(|v| (6. * v).sin());
//! let fitted = GeneralLinearModelAlgorithm::params(
//!     Matern52::new(array![0.5], array![1.]).unwrap(),
//!     ConstantBasis(),
//! )
//! .fit(&Dataset::new(x, y))
//! .unwrap();
//!
//! let bounds = array![[0., 1.]];
//! let params = KarhunenLoeveQuadratureAlgorithm::params(
//!     BoxDomain::new(&bounds).unwrap(),
//!     fitted.covariance_model().clone(),
//!     GaussProductExperiment::new(&bounds, &[30]),
//!     LegendreBasis::new(10).with_bounds(&bounds).unwrap(),
//! )
//! .threshold(1e-2)
//! .check()
//! .unwrap();
//! let decomposition = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
//! println!("{decomposition}");
//! ```
pub use uqbox_doe as doe;
pub use uqbox_gp as gp;
pub use uqbox_kl as kl;
