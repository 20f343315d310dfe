use super::aca::{add_low_rank, compress_dense, truncate};
use crate::errors::Result;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{s, Array2, ArrayView2};

/// A block of a hierarchical matrix.
///
/// Children of a `Hierarchical` block are ordered `[11, 12, 21, 22]`.
/// Diagonal blocks are stored as lower triangles: their `12` child is `Zero`
/// and is never updated.
#[derive(Clone, Debug)]
pub(crate) enum HBlock<F: Float> {
    Full(Array2<F>),
    LowRank { u: Array2<F>, v: Array2<F> },
    Hierarchical(Box<[HBlock<F>; 4]>),
    Zero { nrows: usize, ncols: usize },
}

impl<F: Float> HBlock<F> {
    pub fn nrows(&self) -> usize {
        match self {
            HBlock::Full(a) => a.nrows(),
            HBlock::LowRank { u, .. } => u.nrows(),
            HBlock::Hierarchical(c) => c[0].nrows() + c[2].nrows(),
            HBlock::Zero { nrows, .. } => *nrows,
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            HBlock::Full(a) => a.ncols(),
            HBlock::LowRank { v, .. } => v.nrows(),
            HBlock::Hierarchical(c) => c[0].ncols() + c[1].ncols(),
            HBlock::Zero { ncols, .. } => *ncols,
        }
    }

    /// Number of stored scalars
    pub fn storage(&self) -> usize {
        match self {
            HBlock::Full(a) => a.len(),
            HBlock::LowRank { u, v } => u.len() + v.len(),
            HBlock::Hierarchical(c) => c.iter().map(|b| b.storage()).sum(),
            HBlock::Zero { .. } => 0,
        }
    }

    pub fn to_dense(&self) -> Array2<F> {
        match self {
            HBlock::Full(a) => a.to_owned(),
            HBlock::LowRank { u, v } => u.dot(&v.t()),
            HBlock::Zero { nrows, ncols } => Array2::zeros((*nrows, *ncols)),
            HBlock::Hierarchical(c) => {
                let (r1, c1) = (c[0].nrows(), c[0].ncols());
                let mut res = Array2::zeros((self.nrows(), self.ncols()));
                res.slice_mut(s![..r1, ..c1]).assign(&c[0].to_dense());
                res.slice_mut(s![..r1, c1..]).assign(&c[1].to_dense());
                res.slice_mut(s![r1.., ..c1]).assign(&c[2].to_dense());
                res.slice_mut(s![r1.., c1..]).assign(&c[3].to_dense());
                res
            }
        }
    }

    /// `self . x`
    pub fn matmul(&self, x: &ArrayView2<F>) -> Array2<F> {
        match self {
            HBlock::Full(a) => a.dot(x),
            HBlock::LowRank { u, v } => u.dot(&v.t().dot(x)),
            HBlock::Zero { nrows, .. } => Array2::zeros((*nrows, x.ncols())),
            HBlock::Hierarchical(c) => {
                let c1 = c[0].ncols();
                let (x1, x2) = (x.slice(s![..c1, ..]), x.slice(s![c1.., ..]));
                let top = c[0].matmul(&x1) + c[1].matmul(&x2);
                let bottom = c[2].matmul(&x1) + c[3].matmul(&x2);
                ndarray::concatenate![ndarray::Axis(0), top, bottom]
            }
        }
    }

    /// `self^T . x`
    pub fn matmul_t(&self, x: &ArrayView2<F>) -> Array2<F> {
        match self {
            HBlock::Full(a) => a.t().dot(x),
            HBlock::LowRank { u, v } => v.dot(&u.t().dot(x)),
            HBlock::Zero { ncols, .. } => Array2::zeros((*ncols, x.ncols())),
            HBlock::Hierarchical(c) => {
                let r1 = c[0].nrows();
                let (x1, x2) = (x.slice(s![..r1, ..]), x.slice(s![r1.., ..]));
                let top = c[0].matmul_t(&x1) + c[2].matmul_t(&x2);
                let bottom = c[1].matmul_t(&x1) + c[3].matmul_t(&x2);
                ndarray::concatenate![ndarray::Axis(0), top, bottom]
            }
        }
    }

    pub fn scale(&mut self, factor: F) {
        match self {
            HBlock::Full(a) => a.mapv_inplace(|v| v * factor),
            HBlock::LowRank { u, .. } => u.mapv_inplace(|v| v * factor),
            HBlock::Hierarchical(c) => c.iter_mut().for_each(|b| b.scale(factor)),
            HBlock::Zero { .. } => (),
        }
    }

    /// Sum of the logarithms of the diagonal entries of a diagonal block
    pub fn log_diagonal(&self) -> F {
        match self {
            HBlock::Full(a) => a.diag().iter().map(|v| v.ln()).sum(),
            HBlock::Hierarchical(c) => c[0].log_diagonal() + c[3].log_diagonal(),
            _ => F::zero(),
        }
    }

    /// In place Cholesky factorization of a diagonal block.
    /// Returns `false` when the block is not numerically positive definite.
    pub fn cholesky(&mut self, epsilon: F) -> Result<bool> {
        match self {
            HBlock::Full(a) => {
                let Ok(mut l) = a.cholesky() else {
                    return Ok(false);
                };
                if l.diag().iter().any(|&v| !(v > F::zero()) || !v.is_finite()) {
                    return Ok(false);
                }
                for i in 0..l.nrows() {
                    l.slice_mut(s![i, i + 1..]).fill(F::zero());
                }
                *a = l;
                Ok(true)
            }
            HBlock::Hierarchical(c) => {
                let [l11, _, a21, a22] = &mut **c;
                if !l11.cholesky(epsilon)? {
                    return Ok(false);
                }
                right_solve_lower_transpose(l11, a21, epsilon)?;
                sub_product_sym(a22, a21, epsilon)?;
                a22.cholesky(epsilon)
            }
            _ => Ok(false),
        }
    }

    /// Solves `L x = b` in place, `self` being a factorized diagonal block
    pub fn solve_lower(&self, b: &mut Array2<F>) -> Result<()> {
        if b.ncols() == 0 {
            return Ok(());
        }
        match self {
            HBlock::Full(l) => {
                *b = l.solve_triangular(&*b, UPLO::Lower)?;
            }
            HBlock::Hierarchical(c) => {
                let r1 = c[0].nrows();
                let mut b1 = b.slice(s![..r1, ..]).to_owned();
                c[0].solve_lower(&mut b1)?;
                let mut b2 = &b.slice(s![r1.., ..]) - &c[2].matmul(&b1.view());
                c[3].solve_lower(&mut b2)?;
                b.slice_mut(s![..r1, ..]).assign(&b1);
                b.slice_mut(s![r1.., ..]).assign(&b2);
            }
            _ => (),
        }
        Ok(())
    }

    /// Solves `L^T x = b` in place, `self` being a factorized diagonal block
    pub fn solve_lower_transpose(&self, b: &mut Array2<F>) -> Result<()> {
        if b.ncols() == 0 {
            return Ok(());
        }
        match self {
            HBlock::Full(l) => {
                *b = l.t().solve_triangular(&*b, UPLO::Upper)?;
            }
            HBlock::Hierarchical(c) => {
                let r1 = c[0].nrows();
                let mut b2 = b.slice(s![r1.., ..]).to_owned();
                c[3].solve_lower_transpose(&mut b2)?;
                let mut b1 = &b.slice(s![..r1, ..]) - &c[2].matmul_t(&b2.view());
                c[0].solve_lower_transpose(&mut b1)?;
                b.slice_mut(s![..r1, ..]).assign(&b1);
                b.slice_mut(s![r1.., ..]).assign(&b2);
            }
            _ => (),
        }
        Ok(())
    }
}

/// `x := x L^{-T}` where `l` is a factorized diagonal block
fn right_solve_lower_transpose<F: Float>(
    l: &HBlock<F>,
    x: &mut HBlock<F>,
    epsilon: F,
) -> Result<()> {
    match x {
        HBlock::Zero { .. } => Ok(()),
        // u v^T L^{-T} = u (L^{-1} v)^T
        HBlock::LowRank { v, .. } => l.solve_lower(v),
        HBlock::Full(a) => {
            let mut at = a.t().to_owned();
            l.solve_lower(&mut at)?;
            *a = at.reversed_axes();
            Ok(())
        }
        HBlock::Hierarchical(xc) => {
            if let HBlock::Hierarchical(lc) = l {
                let [x11, x12, x21, x22] = &mut **xc;
                for (first, second) in [(x11, x12), (x21, x22)] {
                    right_solve_lower_transpose(&lc[0], first, epsilon)?;
                    sub_product(second, first, &lc[2], epsilon)?;
                    right_solve_lower_transpose(&lc[3], second, epsilon)?;
                }
                Ok(())
            } else {
                *x = HBlock::Full(x.to_dense());
                right_solve_lower_transpose(l, x, epsilon)
            }
        }
    }
}

/// `c := c - a b^T`
fn sub_product<F: Float>(c: &mut HBlock<F>, a: &HBlock<F>, b: &HBlock<F>, epsilon: F) -> Result<()> {
    match (a, b) {
        (HBlock::Zero { .. }, _) | (_, HBlock::Zero { .. }) => Ok(()),
        (HBlock::LowRank { u, v }, _) => {
            let w = b.matmul(&v.view());
            sub_low_rank(c, u, &w, false, epsilon)
        }
        (_, HBlock::LowRank { u, v }) => {
            let w = a.matmul(&v.view());
            sub_low_rank(c, &w, u, false, epsilon)
        }
        (HBlock::Hierarchical(ac), HBlock::Hierarchical(bc))
            if matches!(c, HBlock::Hierarchical(_)) =>
        {
            if let HBlock::Hierarchical(cc) = c {
                for i in 0..2 {
                    for j in 0..2 {
                        for l in 0..2 {
                            sub_product(&mut cc[2 * i + j], &ac[2 * i + l], &bc[2 * j + l], epsilon)?;
                        }
                    }
                }
            }
            Ok(())
        }
        _ => {
            let d = a.to_dense().dot(&b.to_dense().t());
            sub_dense(c, &d, false, epsilon)
        }
    }
}

/// `c := c - a a^T` where `c` is a diagonal block
fn sub_product_sym<F: Float>(c: &mut HBlock<F>, a: &HBlock<F>, epsilon: F) -> Result<()> {
    match a {
        HBlock::Zero { .. } => Ok(()),
        HBlock::LowRank { u, v } => {
            let w = u.dot(&v.t().dot(v));
            sub_low_rank(c, &w, u, true, epsilon)
        }
        HBlock::Hierarchical(ac) if matches!(c, HBlock::Hierarchical(_)) => {
            if let HBlock::Hierarchical(cc) = c {
                let [c11, _, c21, c22] = &mut **cc;
                sub_product_sym(c11, &ac[0], epsilon)?;
                sub_product_sym(c11, &ac[1], epsilon)?;
                sub_product(c21, &ac[2], &ac[0], epsilon)?;
                sub_product(c21, &ac[3], &ac[1], epsilon)?;
                sub_product_sym(c22, &ac[2], epsilon)?;
                sub_product_sym(c22, &ac[3], epsilon)?;
            }
            Ok(())
        }
        _ => {
            let d = a.to_dense();
            sub_dense(c, &d.dot(&d.t()), true, epsilon)
        }
    }
}

/// `c := c - u w^T`, `sym` telling `c` is a diagonal block stored as a lower triangle
fn sub_low_rank<F: Float>(
    c: &mut HBlock<F>,
    u: &Array2<F>,
    w: &Array2<F>,
    sym: bool,
    epsilon: F,
) -> Result<()> {
    if u.ncols() == 0 {
        return Ok(());
    }
    match c {
        HBlock::Full(a) => *a -= &u.dot(&w.t()),
        HBlock::LowRank { u: cu, v: cv } => {
            let (nu, nv) = add_low_rank((cu, cv), (&u.mapv(|x| -x), w), epsilon)?;
            *cu = nu;
            *cv = nv;
        }
        HBlock::Zero { .. } => {
            if !sym {
                let (nu, nv) = truncate(&u.mapv(|x| -x), w, epsilon)?;
                *c = HBlock::LowRank { u: nu, v: nv };
            }
        }
        HBlock::Hierarchical(cc) => {
            let (r1, c1) = (cc[0].nrows(), cc[0].ncols());
            let (u1, u2) = (u.slice(s![..r1, ..]).to_owned(), u.slice(s![r1.., ..]).to_owned());
            let (w1, w2) = (w.slice(s![..c1, ..]).to_owned(), w.slice(s![c1.., ..]).to_owned());
            sub_low_rank(&mut cc[0], &u1, &w1, sym, epsilon)?;
            if !sym {
                sub_low_rank(&mut cc[1], &u1, &w2, false, epsilon)?;
            }
            sub_low_rank(&mut cc[2], &u2, &w1, false, epsilon)?;
            sub_low_rank(&mut cc[3], &u2, &w2, sym, epsilon)?;
        }
    }
    Ok(())
}

/// `c := c - d`, `sym` telling `c` is a diagonal block stored as a lower triangle
fn sub_dense<F: Float>(c: &mut HBlock<F>, d: &Array2<F>, sym: bool, epsilon: F) -> Result<()> {
    match c {
        HBlock::Full(a) => *a -= d,
        HBlock::LowRank { u, v } => {
            let (nu, nv) = compress_dense(&(u.dot(&v.t()) - d), epsilon)?;
            *u = nu;
            *v = nv;
        }
        HBlock::Zero { .. } => {
            if !sym {
                let (nu, nv) = compress_dense(&d.mapv(|x| -x), epsilon)?;
                *c = HBlock::LowRank { u: nu, v: nv };
            }
        }
        HBlock::Hierarchical(cc) => {
            let (r1, c1) = (cc[0].nrows(), cc[0].ncols());
            sub_dense(&mut cc[0], &d.slice(s![..r1, ..c1]).to_owned(), sym, epsilon)?;
            if !sym {
                sub_dense(&mut cc[1], &d.slice(s![..r1, c1..]).to_owned(), false, epsilon)?;
            }
            sub_dense(&mut cc[2], &d.slice(s![r1.., ..c1]).to_owned(), false, epsilon)?;
            sub_dense(&mut cc[3], &d.slice(s![r1.., c1..]).to_owned(), sym, epsilon)?;
        }
    }
    Ok(())
}
