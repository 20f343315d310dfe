//! Hierarchical matrix approximation of covariance matrices.
//!
//! The points are reordered along a geometric [`ClusterTree`](cluster::ClusterTree),
//! blocks of well separated clusters are compressed with adaptive cross approximation
//! and the matrix is factorized with a recursive block Cholesky decomposition
//! in which low-rank updates are recompressed.
//!
//! All the public operations work in the original ordering of the points.

mod aca;
mod block;
mod cluster;

use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use aca::aca;
use block::HBlock;
use cluster::{Cluster, ClusterTree};
use linfa::Float;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Parameters of the hierarchical matrix assembly and factorization
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct HMatrixParams {
    /// Maximal number of points of a leaf cluster
    pub leaf_size: usize,
    /// Admissibility factor `eta` of `min(diam(t), diam(s)) <= eta * dist(t, s)`
    pub eta: f64,
    /// Relative precision of the adaptive cross approximation
    pub assembly_epsilon: f64,
    /// Relative precision of the recompression of low-rank updates
    pub recompression_epsilon: f64,
    /// Constant added to the diagonal before factorization
    pub regularization: f64,
}

impl Default for HMatrixParams {
    fn default() -> Self {
        HMatrixParams {
            leaf_size: 32,
            eta: 2.0,
            assembly_epsilon: 1e-10,
            recompression_epsilon: 1e-10,
            regularization: 0.,
        }
    }
}

/// A hierarchical approximation of a symmetric covariance matrix or of its Cholesky factor
#[derive(Clone, Debug)]
pub struct HMatrix<F: Float> {
    tree: ClusterTree<F>,
    root: HBlock<F>,
    output_dim: usize,
    factorized: bool,
}

struct Assembler<'a, F: Float, Cov: CovarianceModel<F>> {
    model: &'a Cov,
    x: ArrayView2<'a, F>,
    permutation: &'a [usize],
    k: usize,
    eta: F,
    epsilon: F,
    regularization: F,
}

impl<'a, F: Float, Cov: CovarianceModel<F>> Assembler<'a, F, Cov> {
    /// Dense `(t, s)` block
    fn dense(&self, t: &Cluster<F>, s: &Cluster<F>) -> Array2<F> {
        let k = self.k;
        let mut res = Array2::zeros((t.size() * k, s.size() * k));
        for (a, p) in (t.start..t.end).enumerate() {
            let xp = self.x.row(self.permutation[p]);
            for (b, q) in (s.start..s.end).enumerate() {
                let xq = self.x.row(self.permutation[q]);
                if k == 1 {
                    res[[a, b]] = self.model.compute_scalar(&xp, &xq);
                } else {
                    let block = self.model.compute(&xp, &xq);
                    res.slice_mut(ndarray::s![a * k..(a + 1) * k, b * k..(b + 1) * k])
                        .assign(&block);
                }
            }
        }
        res
    }

    /// Row `i` (local index) of the `(t, s)` block
    fn row(&self, t: &Cluster<F>, s: &Cluster<F>, i: usize) -> Array1<F> {
        let k = self.k;
        let xp = self.x.row(self.permutation[t.start + i / k]);
        let mut res = Array1::zeros(s.size() * k);
        for (b, q) in (s.start..s.end).enumerate() {
            let xq = self.x.row(self.permutation[q]);
            if k == 1 {
                res[b] = self.model.compute_scalar(&xp, &xq);
            } else {
                let block = self.model.compute(&xp, &xq);
                for c in 0..k {
                    res[b * k + c] = block[[i % k, c]];
                }
            }
        }
        res
    }

    /// Column `j` (local index) of the `(t, s)` block
    fn col(&self, t: &Cluster<F>, s: &Cluster<F>, j: usize) -> Array1<F> {
        let k = self.k;
        let xq = self.x.row(self.permutation[s.start + j / k]);
        let mut res = Array1::zeros(t.size() * k);
        for (a, p) in (t.start..t.end).enumerate() {
            let xp = self.x.row(self.permutation[p]);
            if k == 1 {
                res[a] = self.model.compute_scalar(&xp, &xq);
            } else {
                let block = self.model.compute(&xp, &xq);
                for c in 0..k {
                    res[a * k + c] = block[[c, j % k]];
                }
            }
        }
        res
    }

    fn diagonal_block(&self, t: &Cluster<F>) -> HBlock<F> {
        match &t.children {
            None => {
                let mut a = self.dense(t, t);
                a.diag_mut().mapv_inplace(|v| v + self.regularization);
                HBlock::Full(a)
            }
            Some(c) => {
                let ((b11, b21), b22) = rayon::join(
                    || {
                        rayon::join(
                            || self.diagonal_block(&c[0]),
                            || self.off_diagonal_block(&c[1], &c[0]),
                        )
                    },
                    || self.diagonal_block(&c[1]),
                );
                let upper = HBlock::Zero {
                    nrows: c[0].size() * self.k,
                    ncols: c[1].size() * self.k,
                };
                HBlock::Hierarchical(Box::new([b11, upper, b21, b22]))
            }
        }
    }

    fn off_diagonal_block(&self, t: &Cluster<F>, s: &Cluster<F>) -> HBlock<F> {
        if t.is_admissible(s, self.eta) {
            let (m, n) = (t.size() * self.k, s.size() * self.k);
            if let Some((u, v)) = aca(
                m,
                n,
                self.k,
                |i| self.row(t, s, i),
                |j| self.col(t, s, j),
                self.epsilon,
            ) {
                return HBlock::LowRank { u, v };
            }
        }
        match (&t.children, &s.children) {
            (Some(tc), Some(sc)) => {
                let ((b11, b12), (b21, b22)) = rayon::join(
                    || {
                        rayon::join(
                            || self.off_diagonal_block(&tc[0], &sc[0]),
                            || self.off_diagonal_block(&tc[0], &sc[1]),
                        )
                    },
                    || {
                        rayon::join(
                            || self.off_diagonal_block(&tc[1], &sc[0]),
                            || self.off_diagonal_block(&tc[1], &sc[1]),
                        )
                    },
                );
                HBlock::Hierarchical(Box::new([b11, b12, b21, b22]))
            }
            _ => HBlock::Full(self.dense(t, s)),
        }
    }
}

impl<F: Float> HMatrix<F> {
    /// Hierarchical approximation of the covariance matrix of `model` over the `(n, nx)` points `x`.
    ///
    /// Scalar entries are assembled one by one when the output dimension is 1,
    /// otherwise one `(k, k)` block is computed per pair of points.
    pub fn assemble<Cov: CovarianceModel<F>>(
        model: &Cov,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        params: &HMatrixParams,
    ) -> Self {
        let tree = ClusterTree::new(x, params.leaf_size);
        let assembler = Assembler {
            model,
            x: x.view(),
            permutation: &tree.permutation,
            k: model.output_dimension(),
            eta: F::cast(params.eta),
            epsilon: F::cast(params.assembly_epsilon),
            regularization: F::cast(params.regularization),
        };
        let root = assembler.diagonal_block(&tree.root);
        let hmat = HMatrix {
            tree,
            root,
            output_dim: model.output_dimension(),
            factorized: false,
        };
        debug!(
            "H-matrix assembled: {} dofs, compression ratio {:.3}",
            hmat.size(),
            hmat.compression_ratio()
        );
        hmat
    }

    /// Number of rows (and columns) of the matrix
    pub fn size(&self) -> usize {
        self.root.nrows()
    }

    /// Whether the matrix holds its Cholesky factor
    pub fn is_factorized(&self) -> bool {
        self.factorized
    }

    /// Ratio of the stored scalars to the scalars of the lower triangle of the dense matrix
    pub fn compression_ratio(&self) -> f64 {
        let n = self.size() as f64;
        self.root.storage() as f64 / (n * (n + 1.) / 2.).max(1.)
    }

    /// In place Cholesky factorization `C = L L^T`.
    ///
    /// Returns `false` when the matrix is not numerically positive definite,
    /// the content of the matrix being then unspecified.
    pub fn cholesky(&mut self, recompression_epsilon: f64) -> Result<bool> {
        if self.factorized {
            return Err(GpError::InvalidValueError(
                "H-matrix is already factorized".to_string(),
            ));
        }
        let ok = self.root.cholesky(F::cast(recompression_epsilon))?;
        self.factorized = ok;
        Ok(ok)
    }

    fn permute(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let k = self.output_dim;
        let mut res = Array2::zeros(b.dim());
        for (new, &old) in self.tree.permutation.iter().enumerate() {
            for c in 0..k {
                res.row_mut(new * k + c).assign(&b.row(old * k + c));
            }
        }
        res
    }

    fn unpermute(&self, b: &Array2<F>) -> Array2<F> {
        let k = self.output_dim;
        let mut res = Array2::zeros(b.dim());
        for (new, &old) in self.tree.permutation.iter().enumerate() {
            for c in 0..k {
                res.row_mut(old * k + c).assign(&b.row(new * k + c));
            }
        }
        res
    }

    fn check_factorized(&self, rhs: usize) -> Result<()> {
        if !self.factorized {
            return Err(GpError::InvalidValueError(
                "H-matrix must be factorized before solving".to_string(),
            ));
        }
        if rhs != self.size() {
            return Err(GpError::InvalidValueError(format!(
                "Expected right hand side with {} rows, got {rhs}",
                self.size()
            )));
        }
        Ok(())
    }

    /// `L^{-1} b` for a `(n * k, m)` right hand side
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_factorized(b.nrows())?;
        let mut pb = self.permute(b);
        self.root.solve_lower(&mut pb)?;
        Ok(self.unpermute(&pb))
    }

    /// `L^{-T} b` for a `(n * k, m)` right hand side
    pub fn solve_lower_transpose(
        &self,
        b: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        self.check_factorized(b.nrows())?;
        let mut pb = self.permute(b);
        self.root.solve_lower_transpose(&mut pb)?;
        Ok(self.unpermute(&pb))
    }

    /// `C^{-1} b` for a `(n * k, m)` right hand side
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_factorized(b.nrows())?;
        let mut pb = self.permute(b);
        self.root.solve_lower(&mut pb)?;
        self.root.solve_lower_transpose(&mut pb)?;
        Ok(self.unpermute(&pb))
    }

    /// `log det C = 2 sum log L_ii` of a factorized matrix
    pub fn log_determinant(&self) -> F {
        F::cast(2.) * self.root.log_diagonal()
    }

    /// Multiplies the matrix by `factor`
    pub fn scale(&mut self, factor: F) {
        self.root.scale(factor);
    }

    /// Dense matrix: the symmetric covariance matrix, or `L` when factorized,
    /// in the original ordering
    pub fn to_dense(&self) -> Array2<F> {
        let mut dense = self.root.to_dense();
        if !self.factorized {
            let lower = dense.to_owned();
            for i in 0..dense.nrows() {
                for j in i + 1..dense.ncols() {
                    dense[[i, j]] = lower[[j, i]];
                }
            }
        }
        let rows = self.unpermute(&dense);
        self.unpermute(&rows.t().to_owned()).reversed_axes()
    }
}
