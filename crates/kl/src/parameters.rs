use crate::domain::Domain;
use crate::errors::{KlError, Result};
use linfa::{Float, ParamGuard};
use std::marker::PhantomData;
use uqbox_doe::WeightedExperiment;
use uqbox_gp::{Basis, CovarianceModel};

/// A set of validated Karhunen-Loeve quadrature parameters.
#[derive(Clone)]
pub struct KlValidParams<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    /// Domain of the decomposition
    pub(crate) domain: D,
    /// Covariance model to decompose
    pub(crate) covariance: Cov,
    /// Quadrature rule over the bounding box of the sampling distribution
    pub(crate) experiment: E,
    /// Functional basis of the Galerkin approximation of the modes
    pub(crate) basis: B,
    /// Fraction of the variance which can be discarded
    pub(crate) threshold: F,
    /// Maximal number of modes
    pub(crate) max_modes: Option<usize>,
    /// Constant added to the diagonal of the Gram matrix of the basis
    pub(crate) regularization: F,
    pub(crate) phantom: PhantomData<F>,
}

impl<F, D, Cov, E, B> KlValidParams<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    /// Get the domain
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Get the covariance model
    pub fn covariance(&self) -> &Cov {
        &self.covariance
    }

    /// Get the weighted experiment
    pub fn experiment(&self) -> &E {
        &self.experiment
    }

    /// Get the basis
    pub fn basis(&self) -> &B {
        &self.basis
    }

    /// Get the truncation threshold
    pub fn threshold(&self) -> F {
        self.threshold
    }

    /// Get the maximal number of modes if any
    pub fn max_modes(&self) -> Option<usize> {
        self.max_modes
    }

    /// Get the Gram matrix regularization
    pub fn regularization(&self) -> F {
        self.regularization
    }
}

/// The set of hyperparameters that can be specified for the execution of
/// the [Karhunen-Loeve quadrature algorithm](crate::KarhunenLoeveQuadratureAlgorithm).
#[derive(Clone)]
pub struct KlParams<F, D, Cov, E, B>(KlValidParams<F, D, Cov, E, B>)
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>;

impl<F, D, Cov, E, B> KlParams<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    /// A constructor for parameters, no variance is discarded by default
    pub fn new(domain: D, covariance: Cov, experiment: E, basis: B) -> Self {
        Self(KlValidParams {
            domain,
            covariance,
            experiment,
            basis,
            threshold: F::zero(),
            max_modes: None,
            regularization: F::zero(),
            phantom: PhantomData,
        })
    }

    /// Set the fraction of the variance which can be discarded, in `[0, 1]`
    pub fn threshold(mut self, threshold: F) -> Self {
        self.0.threshold = threshold;
        self
    }

    /// Set the maximal number of modes
    pub fn max_modes(mut self, max_modes: usize) -> Self {
        self.0.max_modes = Some(max_modes);
        self
    }

    /// Set the constant added to the diagonal of the Gram matrix of the basis
    pub fn regularization(mut self, regularization: F) -> Self {
        self.0.regularization = regularization;
        self
    }
}

impl<F, D, Cov, E, B> ParamGuard for KlParams<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    type Checked = KlValidParams<F, D, Cov, E, B>;
    type Error = KlError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        if !(params.threshold >= F::zero() && params.threshold <= F::one()) {
            return Err(KlError::InvalidValueError(format!(
                "Threshold must be in [0, 1], got {}",
                params.threshold
            )));
        }
        if !(params.regularization >= F::zero()) {
            return Err(KlError::InvalidValueError(format!(
                "Regularization must be non negative, got {}",
                params.regularization
            )));
        }
        let nx = params.domain.dimension();
        if params.covariance.input_dimension() != nx {
            return Err(KlError::InvalidValueError(format!(
                "Covariance model input dimension {} does not match domain dimension {nx}",
                params.covariance.input_dimension()
            )));
        }
        let bounds = params.experiment.distribution_bounds();
        if bounds.nrows() != nx {
            return Err(KlError::InvalidValueError(format!(
                "Experiment dimension {} does not match domain dimension {nx}",
                bounds.nrows()
            )));
        }
        if bounds.rows().into_iter().any(|r| !(r[0] < r[1])) {
            return Err(KlError::InvalidValueError(format!(
                "Experiment distribution must have a non degenerate bounding box, got {bounds}"
            )));
        }
        Ok(params)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
