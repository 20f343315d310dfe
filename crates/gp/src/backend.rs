//! Discretization of a covariance model over a sample and factorization of the
//! resulting covariance matrix, either dense or hierarchical.

use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use crate::hmat::{HMatrix, HMatrixParams};
use crate::utils::{regularized_cholesky, RegularizationParams};
use linfa::Float;
use linfa_linalg::triangular::*;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear algebra used to factorize covariance matrices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum LinearAlgebraMethod {
    /// Dense regularized Cholesky decomposition
    #[default]
    Dense,
    /// Hierarchical matrix Cholesky decomposition
    Hierarchical,
}

impl fmt::Display for LinearAlgebraMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinearAlgebraMethod::Dense => write!(f, "Dense"),
            LinearAlgebraMethod::Hierarchical => write!(f, "Hierarchical"),
        }
    }
}

/// Cholesky factor `L` of a covariance matrix `C = L L^T`
#[derive(Clone, Debug)]
pub enum CovarianceFactor<F: Float> {
    /// Dense lower triangular factor
    Cholesky(Array2<F>),
    /// Factorized hierarchical matrix
    Hierarchical(HMatrix<F>),
}

impl<F: Float> CovarianceFactor<F> {
    /// Method which produced the factor
    pub fn method(&self) -> LinearAlgebraMethod {
        match self {
            CovarianceFactor::Cholesky(_) => LinearAlgebraMethod::Dense,
            CovarianceFactor::Hierarchical(_) => LinearAlgebraMethod::Hierarchical,
        }
    }

    /// Size of the factorized matrix
    pub fn size(&self) -> usize {
        match self {
            CovarianceFactor::Cholesky(l) => l.nrows(),
            CovarianceFactor::Hierarchical(h) => h.size(),
        }
    }

    /// Whitening `L^{-1} b`
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        match self {
            CovarianceFactor::Cholesky(l) => Ok(l.solve_triangular(b, UPLO::Lower)?),
            CovarianceFactor::Hierarchical(h) => h.solve_lower(b),
        }
    }

    /// `L^{-T} b`
    pub fn solve_lower_transpose(
        &self,
        b: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        match self {
            CovarianceFactor::Cholesky(l) => Ok(l.t().solve_triangular(b, UPLO::Upper)?),
            CovarianceFactor::Hierarchical(h) => h.solve_lower_transpose(b),
        }
    }

    /// Whitening of a vector `L^{-1} b`
    pub fn solve_lower_vector(&self, b: &Array1<F>) -> Result<Array1<F>> {
        let rhs = b.to_owned().insert_axis(ndarray::Axis(1));
        Ok(self.solve_lower(&rhs)?.column(0).to_owned())
    }

    /// `C^{-1} b`
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        match self {
            CovarianceFactor::Cholesky(_) => self.solve_lower_transpose(&self.solve_lower(b)?),
            CovarianceFactor::Hierarchical(h) => h.solve(b),
        }
    }

    /// `log det C = 2 sum log L_ii`
    pub fn log_determinant(&self) -> F {
        match self {
            CovarianceFactor::Cholesky(l) => {
                F::cast(2.) * l.diag().iter().map(|v| v.ln()).sum::<F>()
            }
            CovarianceFactor::Hierarchical(h) => h.log_determinant(),
        }
    }

    /// Multiplies the factor by `factor`, turning it into the factor of `factor^2 C`
    pub fn scale(&mut self, factor: F) {
        match self {
            CovarianceFactor::Cholesky(l) => l.mapv_inplace(|v| v * factor),
            CovarianceFactor::Hierarchical(h) => h.scale(factor),
        }
    }

    /// Dense version of the factor
    pub fn to_dense(&self) -> Array2<F> {
        match self {
            CovarianceFactor::Cholesky(l) => l.to_owned(),
            CovarianceFactor::Hierarchical(h) => h.to_dense(),
        }
    }
}

/// Discretizes `model` over the `(n, nx)` sample `x`, adds the optional noise
/// (one value per point, added to the `k` diagonal entries of the point) and
/// factorizes the result with the given method.
///
/// Returns `None` when the matrix is not positive definite even after regularization.
pub fn discretize_and_factor<F: Float, Cov: CovarianceModel<F>>(
    model: &Cov,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    noise: Option<&Array1<F>>,
    method: LinearAlgebraMethod,
    regularization: &RegularizationParams,
    hmatrix: &HMatrixParams,
) -> Result<Option<CovarianceFactor<F>>> {
    let k = model.output_dimension();
    match method {
        LinearAlgebraMethod::Dense => {
            let mut cov = model.discretize(x);
            if let Some(noise) = noise {
                if noise.len() != x.nrows() {
                    return Err(GpError::InvalidValueError(format!(
                        "Expected noise of size {}, got {}",
                        x.nrows(),
                        noise.len()
                    )));
                }
                for (i, &nu) in noise.iter().enumerate() {
                    for c in 0..k {
                        cov[[i * k + c, i * k + c]] += nu;
                    }
                }
            }
            Ok(regularized_cholesky(&cov, regularization).map(CovarianceFactor::Cholesky))
        }
        LinearAlgebraMethod::Hierarchical => {
            if noise.is_some() {
                return Err(GpError::UnsupportedFeatureError(
                    "observation noise is not supported with hierarchical matrices".to_string(),
                ));
            }
            let mut hmat = HMatrix::assemble(model, x, hmatrix);
            if hmat.cholesky(hmatrix.recompression_epsilon)? {
                Ok(Some(CovarianceFactor::Hierarchical(hmat)))
            } else {
                debug!("H-matrix Cholesky factorization failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance_models::{Matern32, SquaredExponential};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{array, Array};

    #[test]
    fn test_dense_with_noise() {
        let x = array![[0.], [0.5], [1.]];
        let model = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let noise = array![0.1, 0.2, 0.3];
        let factor = discretize_and_factor(
            &model,
            &x,
            Some(&noise),
            LinearAlgebraMethod::Dense,
            &RegularizationParams::default(),
            &HMatrixParams::default(),
        )
        .unwrap()
        .unwrap();
        let mut expected = model.discretize(&x);
        expected.diag_mut().zip_mut_with(&noise, |v, n| *v += n);
        let l = factor.to_dense();
        assert_abs_diff_eq!(l.dot(&l.t()), expected, epsilon = 1e-12);

        let b = array![[1.], [0.], [-1.]];
        assert_abs_diff_eq!(expected.dot(&factor.solve(&b).unwrap()), b, epsilon = 1e-10);
    }

    #[test]
    fn test_hierarchical_rejects_noise() {
        let x = array![[0.], [1.]];
        let model = SquaredExponential::new(array![1.], array![1.]).unwrap();
        let res = discretize_and_factor(
            &model,
            &x,
            Some(&array![0.1, 0.1]),
            LinearAlgebraMethod::Hierarchical,
            &RegularizationParams::default(),
            &HMatrixParams::default(),
        );
        assert!(matches!(res, Err(GpError::UnsupportedFeatureError(_))));
    }

    #[test]
    fn test_methods_agree() {
        let x = Array::linspace(0f64, 10., 80).insert_axis(ndarray::Axis(1));
        let model = Matern32::new(array![0.7], array![1.5])
            .unwrap()
            .with_nugget_factor(1e-3)
            .unwrap();
        let hmatrix = HMatrixParams {
            leaf_size: 10,
            ..HMatrixParams::default()
        };
        let reg = RegularizationParams::default();
        let dense =
            discretize_and_factor(&model, &x, None, LinearAlgebraMethod::Dense, &reg, &hmatrix)
                .unwrap()
                .unwrap();
        let hier = discretize_and_factor(
            &model,
            &x,
            None,
            LinearAlgebraMethod::Hierarchical,
            &reg,
            &hmatrix,
        )
        .unwrap()
        .unwrap();
        assert_eq!(hier.method(), LinearAlgebraMethod::Hierarchical);
        assert_relative_eq!(
            dense.log_determinant(),
            hier.log_determinant(),
            max_relative = 1e-6
        );
        let y = x.mapv(|v: f64| v.sin());
        let wd = dense.solve_lower(&y).unwrap();
        let wh = hier.solve_lower(&y).unwrap();
        // different factors of the same matrix: only the norms agree
        assert_relative_eq!(
            wd.mapv(|v| v * v).sum(),
            wh.mapv(|v| v * v).sum(),
            max_relative = 1e-6
        );
    }
}
