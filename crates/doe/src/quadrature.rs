use crate::errors::Result;
use crate::utils::check_xlimits;
use crate::WeightedExperiment;
use linfa::Float;
use linfa_linalg::eigh::*;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Computes the `n`-point Gauss-Legendre rule on `[-1, 1]` using the Golub-Welsch algorithm.
///
/// Nodes are the eigenvalues of the symmetric tridiagonal Jacobi matrix of the
/// Legendre recurrence (zero diagonal, off-diagonal `k / sqrt(4k² - 1)`), weights
/// are the squared first components of the normalized eigenvectors.
/// Weights are returned as probability weights of the uniform distribution,
/// they sum to one.
pub fn gauss_legendre(n: usize) -> Result<(Array1<f64>, Array1<f64>)> {
    if n == 0 {
        return Ok((Array1::zeros(0), Array1::zeros(0)));
    }
    let mut jacobi = Array2::<f64>::zeros((n, n));
    for i in 1..n {
        let k = i as f64;
        let b = k / (4. * k * k - 1.).sqrt();
        jacobi[[i - 1, i]] = b;
        jacobi[[i, i - 1]] = b;
    }
    let (values, vectors) = jacobi.eigh_into()?;
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(vectors.row(0).iter())
        .map(|(&x, &v)| (x, v * v))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let nodes = pairs.iter().map(|p| p.0).collect();
    let weights = pairs.iter().map(|p| p.1).collect();
    Ok((nodes, weights))
}

/// Tensor product of Gauss-Legendre rules over a box, weighted against the
/// uniform distribution of that box.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GaussProductExperiment<F: Float> {
    xlimits: Array2<F>,
    marginal_sizes: Vec<usize>,
}

impl<F: Float> GaussProductExperiment<F> {
    /// Constructor given a (nx, 2) box and the number of nodes per dimension
    ///
    /// **Panics** if xlimits is malformed or if `marginal_sizes` length is not `nx`.
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, marginal_sizes: &[usize]) -> Self {
        check_xlimits(xlimits);
        if marginal_sizes.len() != xlimits.nrows() {
            panic!(
                "GaussProductExperiment: expected {} marginal sizes, got {}",
                xlimits.nrows(),
                marginal_sizes.len()
            );
        }
        GaussProductExperiment {
            xlimits: xlimits.to_owned(),
            marginal_sizes: marginal_sizes.to_vec(),
        }
    }

    /// Number of nodes per dimension
    pub fn marginal_sizes(&self) -> &[usize] {
        &self.marginal_sizes
    }
}

impl<F: Float> WeightedExperiment<F> for GaussProductExperiment<F> {
    fn distribution_bounds(&self) -> Array2<F> {
        self.xlimits.to_owned()
    }

    fn pdf(&self, x: &ArrayView1<F>) -> F {
        uniform_pdf(&self.xlimits, x)
    }

    fn size(&self) -> usize {
        self.marginal_sizes.iter().product()
    }

    fn generate_with_weights(&self) -> Result<(Array2<F>, Array1<F>)> {
        let nx = self.xlimits.nrows();
        let rules = self
            .marginal_sizes
            .iter()
            .map(|&n| gauss_legendre(n))
            .collect::<Result<Vec<_>>>()?;
        let size = self.size();
        let mut nodes = Array2::zeros((size, nx));
        let mut weights = Array1::ones(size);
        // last dimension runs fastest
        let mut index = vec![0usize; nx];
        for i in 0..size {
            for j in 0..nx {
                let (lo, up) = (self.xlimits[[j, 0]], self.xlimits[[j, 1]]);
                let t = F::cast(rules[j].0[index[j]]);
                nodes[[i, j]] = lo + (t + F::one()) * (up - lo) / F::cast(2.);
                weights[i] *= F::cast(rules[j].1[index[j]]);
            }
            for j in (0..nx).rev() {
                index[j] += 1;
                if index[j] < self.marginal_sizes[j] {
                    break;
                }
                index[j] = 0;
            }
        }
        Ok((nodes, weights))
    }
}

/// Density of the uniform distribution over the `xlimits` box
pub(crate) fn uniform_pdf<F: Float>(xlimits: &Array2<F>, x: &ArrayView1<F>) -> F {
    let mut volume = F::one();
    for (row, &xi) in xlimits.rows().into_iter().zip(x.iter()) {
        if xi < row[0] || xi > row[1] {
            return F::zero();
        }
        volume *= row[1] - row[0];
    }
    if volume > F::zero() {
        F::one() / volume
    } else {
        F::zero()
    }
}
