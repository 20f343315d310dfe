use crate::backend::{discretize_and_factor, CovarianceFactor, LinearAlgebraMethod};
use crate::basis::{design_matrix, Basis};
use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use crate::memoize::MemoizedObjective;
use crate::optimization::HyperOptimizer;
use crate::parameters::{FitVariant, GlmOptions, GlmParams, GlmValidParams};
use crate::reduction::{check_bounds, default_bounds, derive_reduced};
use crate::result::{marginal_residuals, relative_errors, GeneralLinearModelResult, Metamodel};
use crate::trend::{solve_trend, TrendFunction};
use crate::utils::{flatten, lowest, to_f64};

use linfa::prelude::{DatasetBase, Fit, Float};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

use log::{debug, info, warn};
use std::cell::RefCell;
use std::time::Instant;

/// State left by the latest evaluation of the reduced log-likelihood
#[derive(Clone, Debug)]
struct Evaluation<F: Float> {
    /// Trend coefficients
    beta: Array1<F>,
    /// Whitened residual
    rho: Array1<F>,
    /// Factor of the covariance matrix of the reduced model
    factor: Option<CovarianceFactor<F>>,
    /// Analytical amplitude, 1 when not applicable
    sigma: F,
}

impl<F: Float> Default for Evaluation<F> {
    fn default() -> Self {
        Evaluation {
            beta: Array1::zeros(0),
            rho: Array1::zeros(0),
            factor: None,
            sigma: F::one(),
        }
    }
}

/// Maximum likelihood estimation of a general linear model `Y(x) = F(x) beta + Z(x)`
/// where `F` gathers the functions of a basis for each output marginal and `Z` is a
/// centered gaussian process with a parametric covariance model.
///
/// The likelihood is concentrated on the covariance hyperparameters: the trend
/// coefficients are given by generalized least squares and, for scalar models without
/// observation noise, the amplitude has a closed form. The remaining active
/// hyperparameters are optimized within a box mapped onto the unit hypercube.
///
/// ```no_run
/// use uqbox_gp::{GeneralLinearModelAlgorithm, SquaredExponential, ConstantBasis};
/// use linfa::ParamGuard;
/// use ndarray::array;
///
/// let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
/// let y = array![[0.0], [1.0], [1.5], [0.9], [1.0]];
/// let covariance = SquaredExponential::new(array![1.0], array![1.0]).expect("valid model");
/// let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
///     .check()
///     .expect("valid params");
/// let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).expect("valid sample");
/// let result = algo.result().expect("GLM fitting");
/// println!("{result}");
/// ```
pub struct GeneralLinearModelAlgorithm<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> {
    x: Array2<F>,
    y: Array2<F>,
    /// Observations flattened point by point (`i * k + j`)
    y_flat: Array1<F>,
    covariance: Cov,
    reduced: Cov,
    analytical: bool,
    basis: B,
    design: Option<Array2<F>>,
    options: GlmOptions,
    optimizer: HyperOptimizer,
    noise: Option<Array1<F>>,
    bounds: Array2<F>,
    variant: FitVariant,
    state: Evaluation<F>,
    n_evaluations: usize,
    cache_hits: usize,
    result: Option<GeneralLinearModelResult<F, B, Cov>>,
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> GeneralLinearModelAlgorithm<F, B, Cov> {
    /// GLM parameters constructor
    pub fn params(covariance: Cov, basis: B) -> GlmParams<F, B, Cov> {
        GlmParams::new(covariance, basis)
    }

    /// Prepares the fitting of the `(N, nx)` inputs `x` and `(N, k)` outputs `y`
    pub fn new(
        params: &GlmValidParams<F, B, Cov>,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Self> {
        if x.nrows() == 0 || x.nrows() != y.nrows() {
            return Err(GpError::InvalidValueError(format!(
                "Expected a non empty sample with as many inputs as outputs, got {} inputs and {} outputs",
                x.nrows(),
                y.nrows()
            )));
        }
        let mut algo = GeneralLinearModelAlgorithm {
            x: x.to_owned(),
            y: y.to_owned(),
            y_flat: flatten(y),
            covariance: params.covariance.clone(),
            reduced: params.covariance.clone(),
            analytical: false,
            basis: params.basis.clone(),
            design: None,
            options: params.options,
            optimizer: params.optimizer,
            noise: None,
            bounds: Array2::zeros((0, 2)),
            variant: params.variant,
            state: Evaluation::default(),
            n_evaluations: 0,
            cache_hits: 0,
            result: None,
        };
        if let Some(noise) = params.noise.as_ref() {
            algo.check_noise(noise)?;
            algo.noise = Some(noise.to_owned());
        }
        algo.set_covariance_model(params.covariance.clone())?;
        if let Some(bounds) = params.bounds.as_ref() {
            algo.set_optimization_bounds(bounds.to_owned())?;
        }
        Ok(algo)
    }

    fn check_noise(&self, noise: &Array1<F>) -> Result<()> {
        if self.options.method == LinearAlgebraMethod::Hierarchical {
            return Err(GpError::UnsupportedFeatureError(
                "observation noise is not supported with hierarchical matrices".to_string(),
            ));
        }
        if noise.len() != self.x.nrows() {
            return Err(GpError::InvalidValueError(format!(
                "Expected noise of size {}, got {}",
                self.x.nrows(),
                noise.len()
            )));
        }
        if noise.iter().any(|&v| !(v >= F::zero()) || !v.is_finite()) {
            return Err(GpError::InvalidValueError(
                "noise variances must be finite and non negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Derives the reduced model from the current base model and resets the bounds
    fn reduce(&mut self) -> Result<()> {
        let (reduced, analytical) = derive_reduced(
            &self.covariance,
            self.options.optimize_parameters,
            self.options.analytical_amplitude,
            self.noise.is_some(),
        )?;
        if analytical && self.options.unbiased_variance {
            let p = self.basis.size(self.x.ncols());
            if self.x.nrows() <= p {
                return Err(GpError::InvalidValueError(format!(
                    "Unbiased amplitude estimation requires more than {p} points, got {}",
                    self.x.nrows()
                )));
            }
        }
        self.bounds = default_bounds(&reduced, &self.x, &self.options);
        self.reduced = reduced;
        self.analytical = analytical;
        self.state = Evaluation::default();
        self.result = None;
        Ok(())
    }

    /// Sets the initial covariance model, its active parameters being the ones optimized.
    ///
    /// The reduced model and the default optimization bounds are derived again.
    pub fn set_covariance_model(&mut self, covariance: Cov) -> Result<()> {
        if covariance.input_dimension() != self.x.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Covariance model input dimension {} does not match sample dimension {}",
                covariance.input_dimension(),
                self.x.ncols()
            )));
        }
        if covariance.output_dimension() != self.y.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Covariance model output dimension {} does not match output sample dimension {}",
                covariance.output_dimension(),
                self.y.ncols()
            )));
        }
        self.covariance = covariance;
        self.reduce()
    }

    /// Sets the linear algebra method, any stored covariance factor is dropped
    pub fn set_method(&mut self, method: LinearAlgebraMethod) -> Result<()> {
        if method == LinearAlgebraMethod::Hierarchical && self.noise.is_some() {
            return Err(GpError::UnsupportedFeatureError(
                "observation noise is not supported with hierarchical matrices".to_string(),
            ));
        }
        self.options.method = method;
        self.state.factor = None;
        self.result = None;
        Ok(())
    }

    /// Sets the observation noise variance, one value per point
    pub fn set_noise(&mut self, noise: Array1<F>) -> Result<()> {
        self.check_noise(&noise)?;
        self.noise = Some(noise);
        self.reduce()
    }

    /// Sets the `(n_active, 2)` optimization bounds of the active reduced parameters
    pub fn set_optimization_bounds(&mut self, bounds: Array2<F>) -> Result<()> {
        check_bounds(&bounds, self.reduced.active_parameter().len())?;
        self.bounds = bounds;
        self.result = None;
        Ok(())
    }

    /// Sets the hyperparameters optimizer
    pub fn set_optimizer(&mut self, optimizer: HyperOptimizer) {
        self.optimizer = optimizer;
        self.result = None;
    }

    /// Base covariance model
    pub fn covariance_model(&self) -> &Cov {
        &self.covariance
    }

    /// Reduced covariance model, as left by the latest evaluation
    pub fn reduced_covariance_model(&self) -> &Cov {
        &self.reduced
    }

    /// Whether the amplitude is estimated in closed form
    pub fn analytical_amplitude(&self) -> bool {
        self.analytical
    }

    /// Optimization bounds of the active reduced parameters
    pub fn optimization_bounds(&self) -> &Array2<F> {
        &self.bounds
    }

    /// Linear algebra method
    pub fn method(&self) -> LinearAlgebraMethod {
        self.options.method
    }

    /// Trend coefficients of the latest evaluation
    pub fn trend_coefficients(&self) -> &Array1<F> {
        &self.state.beta
    }

    /// Whitened residual of the latest evaluation
    pub fn whitened_residual(&self) -> &Array1<F> {
        &self.state.rho
    }

    /// Covariance factor of the reduced model left by the latest evaluation
    pub fn covariance_factor(&self) -> Option<&CovarianceFactor<F>> {
        self.state.factor.as_ref()
    }

    /// Number of likelihood computations of the latest maximization
    pub fn n_evaluations(&self) -> usize {
        self.n_evaluations
    }

    /// Number of likelihood values answered from the cache during the latest maximization
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Design matrix `(N * k, P * k)`, built on first use
    pub fn design_matrix(&mut self) -> &Array2<F> {
        self.design
            .get_or_insert_with(|| design_matrix(&self.basis, &self.x, self.y.ncols()))
    }

    /// Reduced log-likelihood of the sample for the given active reduced parameters.
    ///
    /// Degenerate configurations (covariance matrix not positive definite even after
    /// regularization, null residual, parameters out of the model domain) give the
    /// lowest finite value. A singular design is an error.
    pub fn compute_reduced_log_likelihood(&mut self, parameters: &Array1<F>) -> Result<F> {
        let n_active = self.reduced.active_parameter().len();
        if parameters.len() != n_active {
            return Err(GpError::InvalidValueError(format!(
                "Expected {n_active} reduced parameters, got {}",
                parameters.len()
            )));
        }
        let value = self.evaluate(parameters)?;
        debug!("Reduced log-likelihood at {parameters} = {value}");
        Ok(value)
    }

    fn evaluate(&mut self, parameters: &Array1<F>) -> Result<F> {
        if self.analytical {
            self.reduced.set_amplitude(&Array1::ones(1))?;
        }
        if let Err(err) = self.reduced.set_parameter(parameters) {
            debug!("Covariance parameters rejected: {err}");
            self.state.factor = None;
            return Ok(lowest());
        }
        if self.design.is_none() {
            self.design = Some(design_matrix(&self.basis, &self.x, self.y.ncols()));
        }

        let Some(factor) = discretize_and_factor(
            &self.reduced,
            &self.x,
            self.noise.as_ref(),
            self.options.method,
            &self.options.regularization,
            &self.options.hmatrix,
        )?
        else {
            debug!("Covariance matrix is not positive definite");
            self.state.factor = None;
            return Ok(lowest());
        };

        let mut log_det = factor.log_determinant();
        let rho0 = factor.solve_lower_vector(&self.y_flat)?;
        let (beta, mut rho) = match self.design.as_ref() {
            Some(design) if design.ncols() > 0 => {
                let phi = factor.solve_lower(design)?;
                solve_trend(&phi, &rho0)?
            }
            _ => (Array1::zeros(0), rho0),
        };

        let mut epsilon = rho.dot(&rho);
        let mut sigma = F::one();
        let degenerate = !(epsilon > F::zero()) || !epsilon.is_finite();
        if !degenerate && self.analytical {
            let n = F::cast(self.x.nrows());
            let dof = if self.options.unbiased_variance {
                n - F::cast(beta.len())
            } else {
                n
            };
            sigma = (epsilon / dof).sqrt();
            self.reduced.set_amplitude(&Array1::from_elem(1, sigma))?;
            log_det += F::cast(2.) * n * sigma.ln();
            rho.mapv_inplace(|v| v / sigma);
            epsilon = rho.dot(&rho);
        }
        self.state = Evaluation {
            beta,
            rho,
            factor: Some(factor),
            sigma,
        };
        if degenerate {
            debug!("Null or non finite whitened residual");
            return Ok(lowest());
        }

        let nk = F::cast(self.y_flat.len());
        let value = -nk / F::cast(2.) * F::cast(2. * std::f64::consts::PI).ln()
            - F::cast(0.5) * (log_det + epsilon);
        Ok(if value.is_finite() { value } else { lowest() })
    }

    /// Maximizes the reduced log-likelihood over the optimization bounds.
    ///
    /// Returns the optimal value and the optimal active reduced parameters. The state
    /// of the algorithm (reduced model, trend coefficients, factor) is the one of the
    /// returned optimum.
    pub fn maximize_reduced_log_likelihood(&mut self) -> Result<(F, Array1<F>)> {
        let initial = self.reduced.parameter();
        let dim = initial.len();
        if dim == 0 {
            let value = self.compute_reduced_log_likelihood(&initial)?;
            info!("No covariance parameter to optimize, reduced log-likelihood = {value}");
            self.n_evaluations = 1;
            self.cache_hits = 0;
            return Ok((value, initial));
        }

        let lower = self.bounds.column(0).mapv(to_f64);
        let upper = self.bounds.column(1).mapv(to_f64);
        let start = initial.mapv(to_f64);
        let feasible = Zip::from(&start)
            .and(&lower)
            .and(&upper)
            .all(|&p, &lo, &up| lo <= p && p <= up);
        let t0 = if feasible {
            Zip::from(&start)
                .and(&lower)
                .and(&upper)
                .map_collect(|&p, &lo, &up| if up > lo { (p - lo) / (up - lo) } else { 0.5 })
        } else {
            warn!("Starting point {initial} is not within the optimization bounds, starting from the middle of the box");
            Array1::from_elem(dim, 0.5)
        };
        let to_parameters = |t: &[f64]| -> Array1<F> {
            Array1::from_iter(
                t.iter()
                    .zip(lower.iter().zip(upper.iter()))
                    .map(|(&t, (&lo, &up))| F::cast(lo + t.clamp(0., 1.) * (up - lo))),
            )
        };

        let optimizer = self.optimizer;
        let failure: RefCell<Option<GpError>> = RefCell::new(None);
        let now = Instant::now();
        debug!(
            "Optimize {:?} with {optimizer:?} within bounds {}",
            self.reduced.parameter_description(),
            self.bounds
        );
        let (value, parameters, evaluations, hits) = {
            let memo =
                MemoizedObjective::new(|p: &Array1<F>| self.compute_reduced_log_likelihood(p));
            let objective = |t: &[f64]| -> f64 {
                if failure.borrow().is_some() || t.iter().any(|v| v.is_nan()) {
                    return f64::INFINITY;
                }
                match memo.evaluate(&to_parameters(t)) {
                    Ok(value) => -to_f64(value),
                    Err(err) => {
                        *failure.borrow_mut() = Some(err);
                        f64::INFINITY
                    }
                }
            };
            let candidate = optimizer.minimize(objective, &t0);
            if let Some(err) = failure.take() {
                return Err(err);
            }
            let candidate = candidate?;
            let parameters = to_parameters(&candidate.x.to_vec());
            let optimum = F::cast(-candidate.value);
            let value = if memo.last_value() != Some(optimum) {
                debug!("Last evaluation is not at the optimum, evaluating again at {parameters}");
                memo.evaluate_uncached(&parameters)?
            } else {
                optimum
            };
            (value, parameters, memo.evaluations(), memo.hits())
        };
        self.n_evaluations = evaluations;
        self.cache_hits = hits;
        info!(
            "Reduced log-likelihood optimization: value={value} at {parameters} ({evaluations} evaluations, {hits} cache hits, {} ms)",
            now.elapsed().as_millis()
        );
        Ok((value, parameters))
    }

    /// Runs the maximization and builds the result
    pub fn run(&mut self) -> Result<()> {
        let (value, _) = self.maximize_reduced_log_likelihood()?;
        self.result = Some(self.assemble(value)?);
        Ok(())
    }

    /// Result of the fitting, running the maximization on first call
    pub fn result(&mut self) -> Result<&GeneralLinearModelResult<F, B, Cov>> {
        if self.result.is_none() {
            self.run()?;
        }
        self.result.as_ref().ok_or_else(|| {
            GpError::LikelihoodComputationError("no result available".to_string())
        })
    }

    /// Consumes the algorithm returning its result
    pub fn into_result(mut self) -> Result<GeneralLinearModelResult<F, B, Cov>> {
        if self.result.is_none() {
            self.run()?;
        }
        self.result.ok_or_else(|| {
            GpError::LikelihoodComputationError("no result available".to_string())
        })
    }

    fn assemble(&mut self, value: F) -> Result<GeneralLinearModelResult<F, B, Cov>> {
        let k = self.y.ncols();
        let design = self.design_matrix().to_owned();
        let beta = self.state.beta.to_owned();
        if beta.len() != design.ncols() {
            return Err(GpError::LikelihoodComputationError(
                "no valid likelihood evaluation to build the trend from".to_string(),
            ));
        }
        let trend = TrendFunction::new(self.basis.clone(), beta, k);
        let residual = &self.y - &trend.value(&self.x);
        let (residuals, squares) = marginal_residuals(&residual);

        let mut covariance_model = self.reduced.clone();
        covariance_model.set_active_parameter(self.covariance.active_parameter().to_vec())?;

        let factor = self.state.factor.clone().map(|mut factor| {
            if self.analytical {
                factor.scale(self.state.sigma);
            }
            factor
        });
        let metamodel = match self.variant {
            FitVariant::GaussianProcessFitter => Metamodel::Trend(trend),
            FitVariant::GeneralLinearModel => {
                let factor = factor.as_ref().ok_or_else(|| {
                    GpError::LikelihoodComputationError(
                        "covariance matrix is not positive definite at the optimum".to_string(),
                    )
                })?;
                let gamma = factor
                    .solve(&flatten(&residual).insert_axis(Axis(1)))?
                    .column(0)
                    .to_owned();
                Metamodel::Conditioned {
                    trend,
                    covariance: covariance_model.clone(),
                    x: self.x.to_owned(),
                    gamma,
                }
            }
        };

        Ok(GeneralLinearModelResult {
            input_sample: self.x.to_owned(),
            output_sample: self.y.to_owned(),
            metamodel,
            design,
            covariance_model,
            optimal_log_likelihood: value,
            method: self.options.method,
            residuals,
            relative_errors: relative_errors(&self.y, &squares),
            covariance_factor: if self.options.keep_covariance_factor {
                factor
            } else {
                None
            },
        })
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, GpError> for GlmValidParams<F, B, Cov>
{
    type Object = GeneralLinearModelResult<F, B, Cov>;

    /// Fit the general linear model by maximizing the reduced log-likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<Self::Object> {
        GeneralLinearModelAlgorithm::new(self, dataset.records(), dataset.targets())?.into_result()
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GlmValidParams<F, B, Cov>
{
    type Object = GeneralLinearModelResult<F, B, Cov>;

    /// Fit the general linear model of a scalar output
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let y = dataset.targets().to_owned().insert_axis(Axis(1));
        GeneralLinearModelAlgorithm::new(self, dataset.records(), &y)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{ConstantBasis, EmptyBasis, FunctionalBasis, LinearBasis};
    use crate::covariance_models::{Matern52, SquaredExponential, UserDefinedCovariance};
    use crate::optimization::CobylaParams;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use linfa::prelude::{Dataset, Predict};
    use linfa::ParamGuard;
    use linfa_linalg::cholesky::*;
    use ndarray::{array, Array, ArrayView1};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn xsinx(x: &Array2<f64>) -> Array2<f64> {
        (x - 3.5) * ((x - 3.5) / 2.).mapv(|v| v.sin())
    }

    fn sample(n: usize) -> (Array2<f64>, Array2<f64>) {
        let x = Array::linspace(0., 10., n).insert_axis(Axis(1));
        let y = xsinx(&x);
        (x, y)
    }

    #[test]
    fn test_glm_xsinx() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (x, y) = sample(8);
        let covariance = Matern52::new(array![1.], array![1.]).unwrap();
        let result = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .fit(&Dataset::new(x.to_owned(), y.to_owned()))
            .expect("GLM fit error");
        // interpolation of the training points
        assert_abs_diff_eq!(result.predict(&x).unwrap(), y, epsilon = 1e-4);
        assert!(result.optimal_log_likelihood().is_finite());
        assert_eq!(result.covariance_model().active_parameter(), &[0, 1]);
        assert!(result.covariance_factor().is_none());

        let xtest = array![[2.5], [6.2]];
        let ytest: Array2<f64> = Predict::predict(&result, &xtest);
        assert_abs_diff_eq!(ytest, xsinx(&xtest), epsilon = 0.5);
    }

    #[test]
    fn test_analytical_amplitude_consistency() {
        let (x, y) = sample(10);
        let covariance = Matern52::new(array![1.], array![1.]).unwrap();
        let cobyla = HyperOptimizer::Cobyla(CobylaParams {
            ftol_rel: 1e-8,
            maxeval: 500,
            ..CobylaParams::default()
        });
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .optimizer(cobyla)
            .options(GlmOptions {
                unbiased_variance: false,
                ..GlmOptions::default()
            });

        let analytical = params.clone().bounds(array![[1e-2, 20.]]).check().unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&analytical, &x, &y).unwrap();
        assert!(algo.analytical_amplitude());
        let (value_analytical, _) = algo.maximize_reduced_log_likelihood().unwrap();

        let numerical = params
            .analytical_amplitude(false)
            .bounds(array![[1e-2, 20.], [1e-2, 1e2]])
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&numerical, &x, &y).unwrap();
        assert!(!algo.analytical_amplitude());
        let (value_numerical, _) = algo.maximize_reduced_log_likelihood().unwrap();

        assert_relative_eq!(value_analytical, value_numerical, max_relative = 1e-2);
    }

    #[test]
    fn test_no_optimization_single_evaluation() {
        let (x, y) = sample(6);
        let covariance = SquaredExponential::new(array![1.5], array![2.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance.clone(), LinearBasis())
            .optimize_parameters(false)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        assert_eq!(algo.optimization_bounds().nrows(), 0);
        let (value, optimum) = algo.maximize_reduced_log_likelihood().unwrap();
        assert_eq!(algo.n_evaluations(), 1);
        assert!(optimum.is_empty());
        let direct = algo.compute_reduced_log_likelihood(&optimum).unwrap();
        assert_eq!(value, direct);

        let result = algo.result().unwrap();
        assert_abs_diff_eq!(result.covariance_model().full_parameter(), covariance.full_parameter());
        assert_eq!(result.covariance_model().active_parameter(), &[0, 1]);
    }

    #[test]
    fn test_sentinel_is_finite() {
        let x = array![[0.], [0.], [1.]];
        let y = array![[1.], [2.], [3.]];
        let covariance = UserDefinedCovariance::<f64>::scalar(1, |s, t| {
            if s[0] == t[0] {
                f64::NAN
            } else {
                0.
            }
        });
        let params = GeneralLinearModelAlgorithm::params(covariance, EmptyBasis())
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let value = algo.compute_reduced_log_likelihood(&array![]).unwrap();
        assert_eq!(value, lowest::<f64>());

        // duplicated points and huge scale: singular up to regularization
        let covariance = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        for scale in [1e-300, 1e-3, 1., 1e3, 1e300, f64::MAX] {
            let value = algo.compute_reduced_log_likelihood(&array![scale]).unwrap();
            assert!(value.is_finite());
        }
        // out of the model domain
        let value = algo.compute_reduced_log_likelihood(&array![-1.]).unwrap();
        assert_eq!(value, lowest::<f64>());
        assert!(algo.compute_reduced_log_likelihood(&array![1., 1.]).is_err());
    }

    #[test]
    fn test_amplitude_and_scale_estimation() {
        let n = 150;
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array::linspace(0., 10., n).insert_axis(Axis(1));
        let (scale, amplitude) = (1.5, 2.);
        let truth = Matern52::new(array![scale], array![amplitude]).unwrap();
        let l = truth.discretize(&x).cholesky().unwrap();
        let y = l
            .dot(&Array::random_using(n, Normal::new(0., 1.).unwrap(), &mut rng))
            .insert_axis(Axis(1));

        let covariance = Matern52::new(array![1.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, EmptyBasis())
            .variant(FitVariant::GaussianProcessFitter)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let result = algo.result().unwrap();
        let model = result.covariance_model();
        assert_relative_eq!(model.amplitude()[0], amplitude, max_relative = 0.5);
        assert_relative_eq!(model.parameter()[0], scale, max_relative = 0.5);
        assert!(result.trend_coefficients().is_empty());
        assert!(matches!(result.metamodel(), Metamodel::Trend(_)));
    }

    #[test]
    fn test_degenerate_scale() {
        let x = Array::linspace(0f64, 1., 5).insert_axis(Axis(1));
        let y = array![[0.3], [-0.1], [0.4], [-0.5], [0.2]];
        let covariance = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, EmptyBasis())
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let value: f64 = algo.compute_reduced_log_likelihood(&array![1e-12]).unwrap();
        assert!(value.is_finite());
        assert!(value > lowest::<f64>());
        let Some(CovarianceFactor::Cholesky(l)) = algo.covariance_factor() else {
            panic!("dense factor expected");
        };
        assert!(l.diag().iter().all(|&v| v > 0.));
    }

    #[test]
    fn test_switch_method_drops_factor() {
        let (x, y) = sample(40);
        let covariance = Matern52::new(array![2.], array![1.])
            .unwrap()
            .with_nugget_factor(1e-4)
            .unwrap();
        let options = GlmOptions {
            hmatrix: crate::hmat::HMatrixParams {
                leaf_size: 6,
                ..Default::default()
            },
            ..GlmOptions::default()
        };
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .options(options)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let dense = algo.compute_reduced_log_likelihood(&array![2.]).unwrap();
        assert_eq!(
            algo.covariance_factor().map(|f| f.method()),
            Some(LinearAlgebraMethod::Dense)
        );

        algo.set_method(LinearAlgebraMethod::Hierarchical).unwrap();
        assert!(algo.covariance_factor().is_none());
        let hierarchical = algo.compute_reduced_log_likelihood(&array![2.]).unwrap();
        assert_eq!(
            algo.covariance_factor().map(|f| f.method()),
            Some(LinearAlgebraMethod::Hierarchical)
        );
        assert_relative_eq!(dense, hierarchical, max_relative = 1e-6);

        assert!(matches!(
            algo.set_noise(Array1::from_elem(40, 0.1)),
            Err(GpError::UnsupportedFeatureError(_))
        ));
        algo.set_method(LinearAlgebraMethod::Dense).unwrap();
        algo.set_noise(Array1::from_elem(40, 0.1)).unwrap();
        assert!(!algo.analytical_amplitude());
        assert_eq!(algo.optimization_bounds().nrows(), 2);
        assert!(matches!(
            algo.set_method(LinearAlgebraMethod::Hierarchical),
            Err(GpError::UnsupportedFeatureError(_))
        ));
    }

    fn likelihoods_by_method<B: Basis<f64>, Cov: CovarianceModel<f64>>(
        covariance: Cov,
        basis: B,
        x: &Array2<f64>,
        y: &Array2<f64>,
    ) -> (f64, f64) {
        let options = GlmOptions {
            hmatrix: crate::hmat::HMatrixParams {
                leaf_size: 8,
                ..Default::default()
            },
            ..GlmOptions::default()
        };
        let params = GeneralLinearModelAlgorithm::params(covariance, basis)
            .options(options)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, x, y).unwrap();
        let theta = algo.reduced_covariance_model().parameter();
        let dense = algo.compute_reduced_log_likelihood(&theta).unwrap();
        algo.set_method(LinearAlgebraMethod::Hierarchical).unwrap();
        let hierarchical = algo.compute_reduced_log_likelihood(&theta).unwrap();
        assert_eq!(
            algo.covariance_factor().map(|f| f.method()),
            Some(LinearAlgebraMethod::Hierarchical)
        );
        (dense, hierarchical)
    }

    #[test]
    fn test_methods_agree_with_correlated_outputs() {
        let x = Array::linspace(0f64, 10., 30).insert_axis(Axis(1));
        let y = ndarray::concatenate![Axis(1), x.mapv(|v| v.sin()), x.mapv(|v| 2. * v.cos())];
        let covariance = SquaredExponential::new(array![1.], array![1., 2.])
            .unwrap()
            .with_output_correlation(array![[1., 0.3], [0.3, 1.]])
            .unwrap()
            .with_nugget_factor(1e-3)
            .unwrap();
        let (dense, hierarchical) = likelihoods_by_method(covariance, ConstantBasis(), &x, &y);
        assert!(dense > lowest::<f64>());
        assert_relative_eq!(dense, hierarchical, max_relative = 1e-6);
    }

    #[test]
    fn test_methods_agree_in_two_dimensions() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let x = Array::random_using(
            (60, 2),
            ndarray_rand::rand_distr::Uniform::new(0f64, 5.),
            &mut rng,
        );
        let y = x
            .map_axis(Axis(1), |p| p[0].sin() + p[1].cos())
            .insert_axis(Axis(1));
        let covariance = Matern52::new(array![1., 1.], array![1.])
            .unwrap()
            .with_nugget_factor(1e-3)
            .unwrap();
        let (dense, hierarchical) = likelihoods_by_method(covariance, ConstantBasis(), &x, &y);
        assert!(dense > lowest::<f64>());
        assert_relative_eq!(dense, hierarchical, max_relative = 1e-6);
    }

    #[test]
    fn test_singular_design_aborts_optimization() {
        let (x, y) = sample(6);
        let basis = FunctionalBasis::new()
            .with_function(|x: &ArrayView1<f64>| x[0])
            .with_function(|x: &ArrayView1<f64>| 3. * x[0]);
        let covariance = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, basis)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let res = algo.maximize_reduced_log_likelihood();
        assert!(matches!(res, Err(GpError::SingularDesignError(_))));
    }

    #[test]
    fn test_reconciliation_with_lhs_search() {
        let (x, y) = sample(8);
        let covariance = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .optimizer(HyperOptimizer::LhsSearch {
                n_points: 20,
                seed: 42,
            })
            .bounds(array![[0.1, 2.]])
            .keep_covariance_factor(true)
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let (value, optimum) = algo.maximize_reduced_log_likelihood().unwrap();
        assert!(algo.n_evaluations() <= 21);
        // state is the one of the optimum
        assert_abs_diff_eq!(algo.reduced_covariance_model().parameter(), optimum);
        let again = algo.compute_reduced_log_likelihood(&optimum).unwrap();
        assert_eq!(value, again);

        let result = algo.result().unwrap();
        let factor = result.covariance_factor().expect("factor kept");
        // the kept factor is the one of the covariance with the estimated amplitude
        let l = factor.to_dense();
        assert_abs_diff_eq!(
            l.dot(&l.t()),
            result.covariance_model().discretize(&x),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_infeasible_start_and_bounds() {
        let (x, y) = sample(8);
        let covariance = SquaredExponential::new(array![50.], array![1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .bounds(array![[0.1, 5.]])
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        let (_, optimum) = algo.maximize_reduced_log_likelihood().unwrap();
        assert!((0.1..=5.).contains(&optimum[0]));
        assert!(algo.set_optimization_bounds(array![[0.1, 5.], [0.1, 5.]]).is_err());
    }

    #[test]
    fn test_multi_output() {
        let (x, y1) = sample(10);
        let y = ndarray::concatenate![Axis(1), y1, x.mapv(|v| v.cos())];
        let covariance = Matern52::new(array![1.], array![1., 1.]).unwrap();
        let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
            .check()
            .unwrap();
        let mut algo = GeneralLinearModelAlgorithm::new(&params, &x, &y).unwrap();
        assert!(!algo.analytical_amplitude());
        assert_eq!(algo.design_matrix().dim(), (20, 2));
        let result = algo.result().unwrap();
        assert_eq!(result.marginal_trend_coefficients().len(), 2);
        assert_eq!(result.residuals().len(), 2);
        assert_abs_diff_eq!(result.predict(&x).unwrap(), y, epsilon = 1e-4);
    }
}
