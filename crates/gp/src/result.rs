//! Result of a general linear model fitting and the metamodel built from it.

use crate::backend::{CovarianceFactor, LinearAlgebraMethod};
use crate::basis::Basis;
use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use crate::trend::TrendFunction;
use linfa::prelude::{Float, PredictInplace};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use std::fmt;

/// Metamodel of the observations
#[derive(Clone)]
pub enum Metamodel<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> {
    /// Trend only
    Trend(TrendFunction<F, B>),
    /// Trend plus the gaussian process conditioned by the observations:
    /// `m(x) = trend(x) + k(x, X) gamma` with `gamma = C^{-1} (y - F beta)`
    Conditioned {
        /// Trend function
        trend: TrendFunction<F, B>,
        /// Covariance model at the optimum
        covariance: Cov,
        /// Training inputs
        x: Array2<F>,
        /// Weights of the cross covariances
        gamma: Array1<F>,
    },
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> Metamodel<F, B, Cov> {
    /// Trend part of the metamodel
    pub fn trend(&self) -> &TrendFunction<F, B> {
        match self {
            Metamodel::Trend(trend) => trend,
            Metamodel::Conditioned { trend, .. } => trend,
        }
    }

    /// Values `(n, k)` of the metamodel at the `(n, nx)` points `x`
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        match self {
            Metamodel::Trend(trend) => trend.value(x),
            Metamodel::Conditioned {
                trend,
                covariance,
                x: xt,
                gamma,
            } => {
                let k = covariance.output_dimension();
                let cross = covariance.discretize_cross(x, xt).dot(gamma);
                let process = cross
                    .into_shape((x.nrows(), k))
                    .unwrap_or_else(|_| Array2::zeros((x.nrows(), k)));
                trend.value(x) + process
            }
        }
    }
}

/// Residuals `sqrt(sum r^2) / N` per output marginal, `r = y - trend(x)`,
/// along with the sums of squares
pub(crate) fn marginal_residuals<F: Float>(residual: &Array2<F>) -> (Array1<F>, Array1<F>) {
    let n = F::cast(residual.nrows());
    let squares = residual.mapv(|v| v * v).sum_axis(Axis(0));
    (squares.mapv(|s| s.sqrt() / n), squares)
}

/// Relative errors `sum r^2 / (N var_j)` per output marginal
pub(crate) fn relative_errors<F: Float>(y: &Array2<F>, squares: &Array1<F>) -> Array1<F> {
    let n = F::cast(y.nrows());
    let mean = y.sum_axis(Axis(0)) / n;
    let variance = (y - &mean).mapv(|v| v * v).sum_axis(Axis(0)) / n;
    Array1::from_iter(squares.iter().zip(variance.iter()).map(|(&s, &var)| {
        if var > F::zero() {
            s / (n * var)
        } else if s > F::zero() {
            F::infinity()
        } else {
            F::zero()
        }
    }))
}

/// Outcome of the reduced log-likelihood maximization of a
/// [GeneralLinearModelAlgorithm](crate::GeneralLinearModelAlgorithm)
#[derive(Clone)]
pub struct GeneralLinearModelResult<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> {
    pub(crate) input_sample: Array2<F>,
    pub(crate) output_sample: Array2<F>,
    pub(crate) metamodel: Metamodel<F, B, Cov>,
    pub(crate) design: Array2<F>,
    pub(crate) covariance_model: Cov,
    pub(crate) optimal_log_likelihood: F,
    pub(crate) method: LinearAlgebraMethod,
    pub(crate) residuals: Array1<F>,
    pub(crate) relative_errors: Array1<F>,
    pub(crate) covariance_factor: Option<CovarianceFactor<F>>,
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> fmt::Display
    for GeneralLinearModelResult<F, B, Cov>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GLM(covariance={}, trend={}, likelihood={}, method={})",
            self.covariance_model,
            self.metamodel.trend(),
            self.optimal_log_likelihood,
            self.method
        )
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> GeneralLinearModelResult<F, B, Cov> {
    /// Training inputs `(N, nx)`
    pub fn input_sample(&self) -> &Array2<F> {
        &self.input_sample
    }

    /// Training outputs `(N, k)`
    pub fn output_sample(&self) -> &Array2<F> {
        &self.output_sample
    }

    /// Fitted metamodel
    pub fn metamodel(&self) -> &Metamodel<F, B, Cov> {
        &self.metamodel
    }

    /// Trend function
    pub fn trend(&self) -> &TrendFunction<F, B> {
        self.metamodel.trend()
    }

    /// Basis of the trend of each output marginal
    pub fn basis(&self) -> &B {
        self.trend().basis()
    }

    /// Design matrix `(N * k, P * k)`
    pub fn design_matrix(&self) -> &Array2<F> {
        &self.design
    }

    /// All the trend coefficients `(P * k)`
    pub fn trend_coefficients(&self) -> &Array1<F> {
        self.trend().coefficients()
    }

    /// Trend coefficients of each output marginal
    pub fn marginal_trend_coefficients(&self) -> Vec<Array1<F>> {
        (0..self.output_sample.ncols())
            .map(|j| self.trend().marginal_coefficients(j))
            .collect()
    }

    /// Covariance model with optimized parameters, its active set being the one
    /// of the initial model
    pub fn covariance_model(&self) -> &Cov {
        &self.covariance_model
    }

    /// Value of the reduced log-likelihood at the optimum
    pub fn optimal_log_likelihood(&self) -> F {
        self.optimal_log_likelihood
    }

    /// Linear algebra method used for the fitting
    pub fn method(&self) -> LinearAlgebraMethod {
        self.method
    }

    /// Residuals per output marginal
    pub fn residuals(&self) -> &Array1<F> {
        &self.residuals
    }

    /// Relative errors per output marginal
    pub fn relative_errors(&self) -> &Array1<F> {
        &self.relative_errors
    }

    /// Cholesky factor of the covariance matrix at the optimum, when kept
    pub fn covariance_factor(&self) -> Option<&CovarianceFactor<F>> {
        self.covariance_factor.as_ref()
    }

    /// Predicts `(n, k)` values at the `(n, nx)` points `x`
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        if x.ncols() != self.input_sample.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Expected points of dimension {}, got {}",
                self.input_sample.ncols(),
                x.ncols()
            )));
        }
        Ok(self.metamodel.predict(x))
    }
}

impl<F, D, B, Cov> PredictInplace<ArrayBase<D, Ix2>, Array2<F>>
    for GeneralLinearModelResult<F, B, Cov>
where
    F: Float,
    D: Data<Elem = F>,
    B: Basis<F>,
    Cov: CovarianceModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array2<F>) {
        assert_eq!(
            x.nrows(),
            y.nrows(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("GLM prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array2<F> {
        Array2::zeros((x.nrows(), self.output_sample.ncols()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_residuals_and_relative_errors() {
        let residual = array![[1., 0.], [-1., 0.], [0., 0.]];
        let (residuals, squares) = marginal_residuals(&residual);
        assert_abs_diff_eq!(residuals, array![2f64.sqrt() / 3., 0.]);

        // variance of the first column is 2/3
        let y = array![[1., 5.], [2., 5.], [3., 5.]];
        assert_abs_diff_eq!(relative_errors(&y, &squares), array![1., 0.], epsilon = 1e-12);
    }
}
