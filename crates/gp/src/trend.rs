//! Generalized least squares estimation of the trend coefficients and the
//! resulting trend function.

use crate::basis::{combine, Basis};
use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::{qr::*, svd::*, triangular::*};
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix2};
use std::fmt;

/// Smallest accepted ratio between the extreme singular values of the whitened design
const DESIGN_CONDITION_THRESHOLD: f64 = 1e-12;

/// Solves `min_beta |phi beta - rho0|^2` through the QR decomposition of the
/// whitened design `phi` `(n * k, p * k)`.
///
/// Returns the coefficients `beta` and the residual `rho = rho0 - phi beta`.
/// A rank deficient design is an error.
pub fn solve_trend<F: Float>(
    phi: &ArrayBase<impl Data<Elem = F>, Ix2>,
    rho0: &Array1<F>,
) -> Result<(Array1<F>, Array1<F>)> {
    let (n, p) = phi.dim();
    if p == 0 {
        return Ok((Array1::zeros(0), rho0.to_owned()));
    }
    if n != rho0.len() {
        return Err(GpError::InvalidValueError(format!(
            "Whitened design has {n} rows while observations have size {}",
            rho0.len()
        )));
    }
    if p > n {
        return Err(GpError::SingularDesignError(format!(
            "{p} trend coefficients cannot be estimated from {n} values"
        )));
    }
    let (q, r) = phi.to_owned().qr()?.into_decomp();

    let (_, sv, _) = r.svd(false, false)?;
    let smax = sv.iter().fold(F::zero(), |acc, &v| acc.max(v));
    let smin = sv.iter().fold(F::infinity(), |acc, &v| acc.min(v));
    if !(smax > F::zero()) || !(smin / smax >= F::cast(DESIGN_CONDITION_THRESHOLD)) {
        return Err(GpError::SingularDesignError(format!(
            "whitened design matrix is ill conditioned (singular values ratio {})",
            smin / smax
        )));
    }

    let qty = q.t().dot(rho0).insert_axis(ndarray::Axis(1));
    let beta = r
        .solve_triangular_into(qty, UPLO::Upper)?
        .column(0)
        .to_owned();
    let rho = rho0 - &phi.dot(&beta);
    Ok((beta, rho))
}

/// Trend of a general linear model: each output marginal `j` is the linear
/// combination of the basis functions weighted by `beta[j * P..(j + 1) * P]`.
#[derive(Clone)]
pub struct TrendFunction<F: Float, B: Basis<F>> {
    basis: B,
    beta: Array1<F>,
    output_dim: usize,
}

impl<F: Float, B: Basis<F>> TrendFunction<F, B> {
    /// Constructor, `beta` has size `P * output_dim`
    pub fn new(basis: B, beta: Array1<F>, output_dim: usize) -> Self {
        TrendFunction {
            basis,
            beta,
            output_dim,
        }
    }

    /// Coefficients of the output marginal `j`
    pub fn marginal_coefficients(&self, j: usize) -> Array1<F> {
        let p = self.beta.len() / self.output_dim.max(1);
        self.beta.slice(s![j * p..(j + 1) * p]).to_owned()
    }

    /// Trend values `(n, k)` at the `(n, nx)` points `x`
    pub fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        if self.beta.is_empty() {
            return Array2::zeros((x.nrows(), self.output_dim));
        }
        combine(&self.basis.value(x), &self.beta, self.output_dim)
    }

    /// Basis of each output marginal
    pub fn basis(&self) -> &B {
        &self.basis
    }

    /// All the coefficients `(P * output_dim)`
    pub fn coefficients(&self) -> &Array1<F> {
        &self.beta
    }
}

impl<F: Float, B: Basis<F>> fmt::Display for TrendFunction<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Trend({}, beta={})", self.basis, self.beta)
    }
}
