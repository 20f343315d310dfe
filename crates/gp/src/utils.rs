use linfa::Float;
use linfa_linalg::cholesky::*;
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix2};

/// A structure to retain absolute differences between distinct points of a sample
#[derive(Debug)]
pub struct DiffMatrix<F: Float> {
    /// Absolute differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<F>,
    /// Indices (i, j) with i < j of the points involved in each difference
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let n_obs = x.nrows();
        let n_pairs = n_obs * n_obs.saturating_sub(1) / 2;
        let mut d_indices = Array2::<usize>::zeros((n_pairs, 2));
        let mut d = Array2::zeros((n_pairs, x.ncols()));
        let mut start = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let end = start + n_obs - k - 1;
            for (r, i) in (start..end).zip(k + 1..n_obs) {
                d_indices[[r, 0]] = k;
                d_indices[[r, 1]] = i;
            }
            let diff = &x.slice(s![k + 1..n_obs, ..]) - &x.slice(s![k, ..]);
            d.slice_mut(s![start..end, ..]).assign(&diff);
            start = end;
        }
        d.mapv_inplace(|v| v.abs());
        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }
}

/// Lowest finite value of `F`, used as the likelihood of degenerate configurations
pub fn lowest<F: Float>() -> F {
    <F as num_traits::Float>::min_value()
}

#[inline]
pub(crate) fn to_f64<F: Float>(v: F) -> f64 {
    num_traits::ToPrimitive::to_f64(&v).unwrap_or(f64::NAN)
}

/// Row-major flattening of a (n, k) output sample: entry (i, j) goes to `i * k + j`
pub(crate) fn flatten<F: Float>(y: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
    Array1::from_iter(y.iter().cloned())
}

/// Jitter policy used by [regularized_cholesky]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize, serde::Deserialize))]
pub struct RegularizationParams {
    /// First diagonal shift, relative to the largest diagonal entry
    pub starting_scaling: f64,
    /// Largest diagonal shift tried, relative to the largest diagonal entry
    pub maximal_scaling: f64,
}

impl Default for RegularizationParams {
    fn default() -> Self {
        RegularizationParams {
            starting_scaling: 1e-13,
            maximal_scaling: 1e5,
        }
    }
}

fn is_valid_factor<F: Float>(l: &Array2<F>) -> bool {
    l.diag().iter().all(|&v| v > F::zero() && v.is_finite()) && l.iter().all(|v| v.is_finite())
}

/// Cholesky factor of a symmetric matrix, shifting its diagonal by a doubling
/// amount until the factorization succeeds.
///
/// Returns `None` when the matrix is still not positive definite with the
/// maximal shift or contains non finite values.
pub fn regularized_cholesky<F: Float>(
    matrix: &Array2<F>,
    params: &RegularizationParams,
) -> Option<Array2<F>> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if let Ok(l) = matrix.cholesky() {
        if is_valid_factor(&l) {
            return Some(l);
        }
    }
    let base = matrix
        .diag()
        .iter()
        .fold(F::zero(), |acc, v| acc.max(v.abs()));
    let base = if base > F::zero() { base } else { F::one() };
    let mut scaling = params.starting_scaling;
    while scaling <= params.maximal_scaling {
        let mut shifted = matrix.to_owned();
        let shift = F::cast(scaling) * base;
        shifted.diag_mut().mapv_inplace(|v| v + shift);
        if let Ok(l) = shifted.cholesky() {
            if is_valid_factor(&l) {
                debug!("Cholesky regularized with diagonal shift {scaling:e}");
                return Some(l);
            }
        }
        scaling *= 2.;
    }
    None
}
