use crate::backend::LinearAlgebraMethod;
use crate::basis::Basis;
use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use crate::hmat::HMatrixParams;
use crate::optimization::HyperOptimizer;
use crate::utils::RegularizationParams;
use linfa::{Float, ParamGuard};
use ndarray::{Array1, Array2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Metamodel built at the end of the fitting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum FitVariant {
    /// Trend plus the gaussian process conditioned by the observations
    #[default]
    GeneralLinearModel,
    /// Trend only, the covariance model being estimated for other uses
    GaussianProcessFitter,
}

/// Options of the reduced log-likelihood maximization
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GlmOptions {
    /// When false, every covariance hyperparameter is kept at its initial value
    pub optimize_parameters: bool,
    /// Closed form estimation of the amplitude of scalar models without noise
    pub analytical_amplitude: bool,
    /// Divide by `N - P` instead of `N` in the analytical amplitude
    pub unbiased_variance: bool,
    /// Factorization of the covariance matrix
    pub method: LinearAlgebraMethod,
    /// Keep the covariance factor of the optimum in the result
    pub keep_covariance_factor: bool,
    /// Default lower bound of the active hyperparameters
    pub default_lower_bound: f64,
    /// Default upper bound of the active hyperparameters
    pub default_upper_bound: f64,
    /// Upper bound of `scale_l` is `scale_factor` times the range of the input `l`
    pub scale_factor: f64,
    /// Lower bound of the nugget factor
    pub nugget_lower_bound: f64,
    /// Jitter policy of the dense Cholesky factorization
    pub regularization: RegularizationParams,
    /// Hierarchical matrices parameters
    pub hmatrix: HMatrixParams,
}

impl Default for GlmOptions {
    fn default() -> Self {
        GlmOptions {
            optimize_parameters: true,
            analytical_amplitude: true,
            unbiased_variance: true,
            method: LinearAlgebraMethod::Dense,
            keep_covariance_factor: false,
            default_lower_bound: 1e-2,
            default_upper_bound: 1e2,
            scale_factor: 2.0,
            nugget_lower_bound: 0.0,
            regularization: RegularizationParams::default(),
            hmatrix: HMatrixParams::default(),
        }
    }
}

impl GlmOptions {
    fn check(&self) -> Result<()> {
        if !(self.default_lower_bound <= self.default_upper_bound) {
            return Err(GpError::InvalidValueError(format!(
                "Default lower bound {} exceeds default upper bound {}",
                self.default_lower_bound, self.default_upper_bound
            )));
        }
        if !(self.scale_factor > 0.) {
            return Err(GpError::InvalidValueError(format!(
                "`scale_factor` must be positive, got {}",
                self.scale_factor
            )));
        }
        if !(self.nugget_lower_bound >= 0.) {
            return Err(GpError::InvalidValueError(format!(
                "`nugget_lower_bound` must be non negative, got {}",
                self.nugget_lower_bound
            )));
        }
        let reg = &self.regularization;
        if !(reg.starting_scaling > 0.) || reg.starting_scaling > reg.maximal_scaling {
            return Err(GpError::InvalidValueError(format!(
                "Invalid regularization scalings: starting {}, maximal {}",
                reg.starting_scaling, reg.maximal_scaling
            )));
        }
        let hmat = &self.hmatrix;
        if hmat.leaf_size == 0 || !(hmat.eta > 0.) || !(hmat.regularization >= 0.) {
            return Err(GpError::InvalidValueError(format!(
                "Invalid hierarchical matrix parameters: {hmat:?}"
            )));
        }
        Ok(())
    }
}

/// A set of validated general linear model parameters.
#[derive(Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, B: Serialize, Cov: Serialize",
        deserialize = "F: Deserialize<'de>, B: Deserialize<'de>, Cov: Deserialize<'de>"
    ))
)]
pub struct GlmValidParams<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> {
    /// Initial covariance model, its active parameters are the ones optimized
    pub(crate) covariance: Cov,
    /// Basis of the trend of each output marginal
    pub(crate) basis: B,
    /// Fitting options
    pub(crate) options: GlmOptions,
    /// Optimizer of the reduced log-likelihood
    pub(crate) optimizer: HyperOptimizer,
    /// Observation noise variance of each point
    pub(crate) noise: Option<Array1<F>>,
    /// Optimization bounds of the active reduced parameters
    pub(crate) bounds: Option<Array2<F>>,
    /// Kind of metamodel built from the optimum
    pub(crate) variant: FitVariant,
    #[cfg_attr(feature = "serializable", serde(skip))]
    pub(crate) phantom: PhantomData<F>,
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> GlmValidParams<F, B, Cov> {
    /// Get the initial covariance model
    pub fn covariance(&self) -> &Cov {
        &self.covariance
    }

    /// Get the trend basis
    pub fn basis(&self) -> &B {
        &self.basis
    }

    /// Get fitting options
    pub fn options(&self) -> &GlmOptions {
        &self.options
    }

    /// Get the hyperparameters optimizer
    pub fn optimizer(&self) -> &HyperOptimizer {
        &self.optimizer
    }

    /// Get the observation noise if any
    pub fn noise(&self) -> Option<&Array1<F>> {
        self.noise.as_ref()
    }

    /// Get user defined optimization bounds if any
    pub fn bounds(&self) -> Option<&Array2<F>> {
        self.bounds.as_ref()
    }

    /// Get the fitted metamodel variant
    pub fn variant(&self) -> FitVariant {
        self.variant
    }
}

#[derive(Clone)]
/// The set of hyperparameters that can be specified for the execution of
/// the [general linear model algorithm](crate::GeneralLinearModelAlgorithm).
pub struct GlmParams<F: Float, B: Basis<F>, Cov: CovarianceModel<F>>(GlmValidParams<F, B, Cov>);

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> GlmParams<F, B, Cov> {
    /// A constructor for parameters given the initial covariance model and the trend basis
    pub fn new(covariance: Cov, basis: B) -> GlmParams<F, B, Cov> {
        Self(GlmValidParams {
            covariance,
            basis,
            options: GlmOptions::default(),
            optimizer: HyperOptimizer::default(),
            noise: None,
            bounds: None,
            variant: FitVariant::default(),
            phantom: PhantomData,
        })
    }

    /// A constructor for parameters from validated parameters
    pub fn new_from_valid(params: &GlmValidParams<F, B, Cov>) -> Self {
        Self(params.clone())
    }

    /// Set the initial covariance model.
    pub fn covariance(mut self, covariance: Cov) -> Self {
        self.0.covariance = covariance;
        self
    }

    /// Set the trend basis.
    pub fn basis(mut self, basis: B) -> Self {
        self.0.basis = basis;
        self
    }

    /// Set all the fitting options at once.
    pub fn options(mut self, options: GlmOptions) -> Self {
        self.0.options = options;
        self
    }

    /// Set whether the covariance hyperparameters are optimized.
    pub fn optimize_parameters(mut self, optimize: bool) -> Self {
        self.0.options.optimize_parameters = optimize;
        self
    }

    /// Set whether the amplitude is estimated in closed form when possible.
    pub fn analytical_amplitude(mut self, analytical: bool) -> Self {
        self.0.options.analytical_amplitude = analytical;
        self
    }

    /// Set the linear algebra method used to factorize the covariance matrix.
    pub fn method(mut self, method: LinearAlgebraMethod) -> Self {
        self.0.options.method = method;
        self
    }

    /// Set whether the covariance factor is kept in the result.
    pub fn keep_covariance_factor(mut self, keep: bool) -> Self {
        self.0.options.keep_covariance_factor = keep;
        self
    }

    /// Set the hyperparameters optimizer.
    pub fn optimizer(mut self, optimizer: HyperOptimizer) -> Self {
        self.0.optimizer = optimizer;
        self
    }

    /// Set the observation noise variance, one non negative value per point.
    ///
    /// Noise disables the analytical amplitude and is not supported by
    /// hierarchical matrices.
    pub fn noise(mut self, noise: Array1<F>) -> Self {
        self.0.noise = Some(noise);
        self
    }

    /// Set the optimization bounds `(n_active, 2)` of the active reduced parameters.
    pub fn bounds(mut self, bounds: Array2<F>) -> Self {
        self.0.bounds = Some(bounds);
        self
    }

    /// Set the metamodel variant.
    pub fn variant(mut self, variant: FitVariant) -> Self {
        self.0.variant = variant;
        self
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> From<GlmValidParams<F, B, Cov>>
    for GlmParams<F, B, Cov>
{
    fn from(valid: GlmValidParams<F, B, Cov>) -> Self {
        GlmParams(valid)
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> ParamGuard for GlmParams<F, B, Cov> {
    type Checked = GlmValidParams<F, B, Cov>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.options.check()?;
        if let Some(noise) = self.0.noise.as_ref() {
            if self.0.options.method == LinearAlgebraMethod::Hierarchical {
                return Err(GpError::UnsupportedFeatureError(
                    "observation noise is not supported with hierarchical matrices".to_string(),
                ));
            }
            if noise.iter().any(|&v| !(v >= F::zero()) || !v.is_finite()) {
                return Err(GpError::InvalidValueError(
                    "noise variances must be finite and non negative".to_string(),
                ));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::ConstantBasis;
    use crate::covariance_models::SquaredExponential;
    use ndarray::array;

    #[test]
    fn test_check_params() {
        let cov = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let params = GlmParams::new(cov, ConstantBasis());
        assert!(params.clone().check().is_ok());

        let res = params
            .clone()
            .noise(array![0.1, 0.1])
            .method(LinearAlgebraMethod::Hierarchical)
            .check();
        assert!(matches!(res, Err(GpError::UnsupportedFeatureError(_))));

        let res = params.clone().noise(array![-0.1]).check();
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));

        let options = GlmOptions {
            default_lower_bound: 10.,
            default_upper_bound: 1.,
            ..GlmOptions::default()
        };
        assert!(params.options(options).check().is_err());
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_options_serde() {
        let options = GlmOptions {
            method: LinearAlgebraMethod::Hierarchical,
            ..GlmOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: GlmOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }
}
