//! Low-rank approximation tools: adaptive cross approximation with partial
//! pivoting over point blocks and Gram based recompression.

use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::{eigh::*, qr::*};
use log::debug;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};

/// Number of unused point blocks, and of column point blocks, on which the
/// approximation is checked once the cross approximation has stopped
const CHECKED_BLOCKS: usize = 2;

/// Low-rank factors `(u, v)` of a `(m, n)` block `A ~ u v^T`, computed from
/// rows and columns of `A` only.
///
/// Rows and columns go by groups of `group` consecutive indices, the outputs of
/// one point: a pivot point contributes all of its rows before the stopping test.
///
/// Returns `None` when the approximation does not reach the relative precision
/// `epsilon` before the rank becomes too large to be worth it, or when it fails
/// the check on a sample of rows and columns left out of the pivoting.
pub(crate) fn aca<F: Float>(
    nrows: usize,
    ncols: usize,
    group: usize,
    row: impl Fn(usize) -> Array1<F>,
    col: impl Fn(usize) -> Array1<F>,
    epsilon: F,
) -> Option<(Array2<F>, Array2<F>)> {
    let npoints = nrows / group;
    let max_rank = (nrows.min(ncols) + 1) / 2;
    let mut us: Vec<Array1<F>> = vec![];
    let mut vs: Vec<Array1<F>> = vec![];
    let mut used = vec![false; npoints];
    let mut norm2 = F::zero();
    let mut pivot_point = 0;
    let mut converged = false;

    while us.len() < max_rank {
        used[pivot_point] = true;
        let mut step_norm2 = F::zero();
        let mut added = 0;
        for i in pivot_point * group..(pivot_point + 1) * group {
            if us.len() >= max_rank {
                break;
            }
            let mut r = row(i);
            for (u, v) in us.iter().zip(vs.iter()) {
                r.scaled_add(-u[i], v);
            }
            let (pivot_col, pivot) = argmax_abs(r.view(), |_| true);
            if pivot.abs() <= F::min_positive_value() {
                continue;
            }
            let v = r / pivot;
            let mut u = col(pivot_col);
            for (ul, vl) in us.iter().zip(vs.iter()) {
                u.scaled_add(-vl[pivot_col], ul);
            }
            let (u2, v2) = (u.dot(&u), v.dot(&v));
            let cross = us
                .iter()
                .zip(vs.iter())
                .fold(F::zero(), |acc, (ul, vl)| acc + ul.dot(&u) * vl.dot(&v));
            norm2 += F::cast(2.) * cross + u2 * v2;
            step_norm2 += u2 * v2;
            us.push(u);
            vs.push(v);
            added += 1;
        }
        let next = if added == 0 {
            // zero residual rows, try another point
            (0..npoints).find(|&p| !used[p])
        } else {
            if step_norm2.sqrt() <= epsilon * norm2.abs().sqrt() {
                converged = true;
                break;
            }
            next_point(&us[us.len() - added..], group, &used)
        };
        match next {
            Some(p) => pivot_point = p,
            None => {
                converged = true;
                break;
            }
        }
    }
    if !converged {
        return None;
    }

    let u = stack_columns(&us, nrows);
    let v = stack_columns(&vs, ncols);
    let tolerance = F::cast(10.) * epsilon * norm2.abs().sqrt();
    let unused: Vec<usize> = (0..npoints).filter(|&p| !used[p]).collect();
    for p in spread(&unused, CHECKED_BLOCKS) {
        for i in p * group..(p + 1) * group {
            let residual = row(i) - v.dot(&u.row(i));
            if max_abs(residual.view()) > tolerance {
                debug!("Cross approximation missed row {i} of a ({nrows}, {ncols}) block");
                return None;
            }
        }
    }
    let column_points: Vec<usize> = (0..ncols / group).collect();
    for p in spread(&column_points, CHECKED_BLOCKS) {
        for j in p * group..(p + 1) * group {
            let residual = col(j) - u.dot(&v.row(j));
            if max_abs(residual.view()) > tolerance {
                debug!("Cross approximation missed column {j} of a ({nrows}, {ncols}) block");
                return None;
            }
        }
    }
    Some((u, v))
}

/// Unused point with the largest entry in the columns `us`
fn next_point<F: Float>(us: &[Array1<F>], group: usize, used: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, F)> = None;
    for p in (0..used.len()).filter(|&p| !used[p]) {
        let score = us.iter().fold(F::zero(), |acc, u| {
            acc.max(max_abs(u.slice(ndarray::s![p * group..(p + 1) * group])))
        });
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((p, score));
        }
    }
    best.map(|(p, _)| p)
}

/// At most `count` evenly spread items
fn spread(items: &[usize], count: usize) -> Vec<usize> {
    if items.len() <= count {
        items.to_vec()
    } else {
        (0..count).map(|t| items[t * items.len() / count]).collect()
    }
}

fn max_abs<F: Float>(values: ArrayView1<F>) -> F {
    values.iter().fold(F::zero(), |acc, v| acc.max(v.abs()))
}

fn argmax_abs<F: Float>(values: ArrayView1<F>, allowed: impl Fn(usize) -> bool) -> (usize, F) {
    let mut best = (0, F::zero());
    let mut found = false;
    for (i, &v) in values.iter().enumerate() {
        if allowed(i) && (!found || v.abs() > best.1.abs()) {
            best = (i, v);
            found = true;
        }
    }
    best
}

fn stack_columns<F: Float>(columns: &[Array1<F>], nrows: usize) -> Array2<F> {
    let mut res = Array2::zeros((nrows, columns.len()));
    for (j, c) in columns.iter().enumerate() {
        res.column_mut(j).assign(c);
    }
    res
}

/// Indices of the values above `epsilon * max`, by decreasing value
fn retained<F: Float>(s: &Array1<F>, epsilon: F) -> Vec<usize> {
    let smax = s.iter().fold(F::zero(), |acc, &v| acc.max(v));
    let mut idx: Vec<usize> = (0..s.len())
        .filter(|&i| s[i] > epsilon * smax && s[i] > F::zero())
        .collect();
    idx.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal));
    idx
}

/// Factors `(b w, w)` with `b ~ (b w) w^T`, `w` being the eigenvectors of `b^T b`
/// whose image through `b` is above `epsilon` times the largest one.
/// Norms are taken on `b w`, not on the Gram eigenvalues.
fn dominant_directions<F: Float>(b: &Array2<F>, epsilon: F) -> Result<(Array2<F>, Array2<F>)> {
    let (_, w) = b.t().dot(b).eigh_into()?;
    let bw = b.dot(&w);
    let norms = bw.map_axis(Axis(0), |c| c.dot(&c).sqrt());
    let idx = retained(&norms, epsilon);
    Ok((bw.select(Axis(1), &idx), w.select(Axis(1), &idx)))
}

/// Low-rank factors of a dense block to the relative precision `epsilon`
pub(crate) fn compress_dense<F: Float>(
    block: &Array2<F>,
    epsilon: F,
) -> Result<(Array2<F>, Array2<F>)> {
    let (m, n) = block.dim();
    if block.iter().all(|v| v.is_zero()) {
        return Ok((Array2::zeros((m, 0)), Array2::zeros((n, 0))));
    }
    if m >= n {
        dominant_directions(block, epsilon)
    } else {
        let (right, left) = dominant_directions(&block.t().to_owned(), epsilon)?;
        Ok((left, right))
    }
}

/// Recompression of `u v^T` to the relative precision `epsilon`
pub(crate) fn truncate<F: Float>(
    u: &Array2<F>,
    v: &Array2<F>,
    epsilon: F,
) -> Result<(Array2<F>, Array2<F>)> {
    let (m, rank) = u.dim();
    let n = v.nrows();
    if rank == 0 {
        return Ok((u.to_owned(), v.to_owned()));
    }
    if rank >= m.min(n) {
        return compress_dense(&u.dot(&v.t()), epsilon);
    }
    // u v^T = (u rv^T) qv^T with qv orthonormal
    let (qv, rv) = v.qr()?.into_decomp();
    let (left, w) = dominant_directions(&u.dot(&rv.t()), epsilon)?;
    Ok((left, qv.dot(&w)))
}

/// Sum of two low-rank blocks `u1 v1^T + u2 v2^T`, recompressed
pub(crate) fn add_low_rank<F: Float>(
    (u1, v1): (&Array2<F>, &Array2<F>),
    (u2, v2): (&Array2<F>, &Array2<F>),
    epsilon: F,
) -> Result<(Array2<F>, Array2<F>)> {
    let u = concatenate(Axis(1), &[u1.view(), u2.view()])
        .map_err(|e| GpError::InvalidValueError(format!("Low-rank sum: {e}")))?;
    let v = concatenate(Axis(1), &[v1.view(), v2.view()])
        .map_err(|e| GpError::InvalidValueError(format!("Low-rank sum: {e}")))?;
    truncate(&u, &v, epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn kernel_block() -> Array2<f64> {
        let xs = Array::linspace(0f64, 1., 20);
        let ys = Array::linspace(3f64, 4., 15);
        Array2::from_shape_fn((20, 15), |(i, j)| (-(xs[i] - ys[j]).abs()).exp())
    }

    /// Output correlated exponential kernel between 1-D points, rows and
    /// columns interleaved as `point * 2 + output`
    fn correlated_block(xs: &Array1<f64>, ys: &Array1<f64>) -> Array2<f64> {
        let b = array![[1., 0.6], [0.6, 4.]];
        Array2::from_shape_fn((xs.len() * 2, ys.len() * 2), |(i, j)| {
            b[[i % 2, j % 2]] * (-(xs[i / 2] - ys[j / 2]).abs()).exp()
        })
    }

    #[test]
    fn test_aca_exponential_block() {
        let a = kernel_block();
        let (u, v) = aca(
            20,
            15,
            1,
            |i| a.row(i).to_owned(),
            |j| a.column(j).to_owned(),
            1e-10,
        )
        .expect("aca converged");
        assert!(u.ncols() <= 3);
        assert_abs_diff_eq!(u.dot(&v.t()), a, epsilon = 1e-9);
    }

    #[test]
    fn test_aca_point_blocks() {
        let xs = Array::linspace(0f64, 1., 12);
        let ys = Array::linspace(4f64, 5., 10);
        let a = correlated_block(&xs, &ys);
        let (u, v) = aca(
            24,
            20,
            2,
            |i| a.row(i).to_owned(),
            |j| a.column(j).to_owned(),
            1e-10,
        )
        .expect("aca converged");
        // rank two: one per output
        assert!(u.ncols() >= 2 && u.ncols() <= 4);
        assert_abs_diff_eq!(u.dot(&v.t()), a, epsilon = 1e-9);
    }

    #[test]
    fn test_aca_rejects_missed_entries() {
        // the second cross is negligible and stops the pivoting before row 9 is seen
        let mut a = Array2::<f64>::ones((16, 16));
        a[[1, 0]] = 1. + 1e-14;
        a[[9, 5]] = 2.;
        let res = aca(
            16,
            16,
            1,
            |i| a.row(i).to_owned(),
            |j| a.column(j).to_owned(),
            1e-10,
        );
        assert!(res.is_none());
    }

    #[test]
    fn test_compress_rank_one_kernel_block() {
        let a = kernel_block();
        let (u, v) = compress_dense(&a, 1e-10).unwrap();
        assert_eq!(u.ncols(), 1);
        assert_abs_diff_eq!(u.dot(&v.t()), a, epsilon = 1e-12);

        let at = a.t().to_owned();
        let (u, v) = compress_dense(&at, 1e-10).unwrap();
        assert_eq!(u.ncols(), 1);
        assert_abs_diff_eq!(u.dot(&v.t()), at, epsilon = 1e-12);
    }

    #[test]
    fn test_truncate() {
        let u = array![[1., 2.], [2., 4.], [0., 0.], [1., 2.]];
        let v = array![[1., 0.], [0., 1.], [1., 1.]];
        // u columns are colinear: rank one
        let (ut, vt) = truncate(&u, &v, 1e-12).unwrap();
        assert_eq!(ut.ncols(), 1);
        assert_abs_diff_eq!(ut.dot(&vt.t()), u.dot(&v.t()), epsilon = 1e-12);

        let a = kernel_block();
        let (ud, vd) = compress_dense(&a.t().to_owned(), 1e-12).unwrap();
        assert_abs_diff_eq!(ud.dot(&vd.t()), a.t(), epsilon = 1e-10);
    }

    #[test]
    fn test_add_low_rank() {
        let u1 = array![[1.], [0.], [2.], [1.]];
        let v1 = array![[1.], [1.], [0.]];
        let u2 = array![[2.], [0.], [4.], [2.]];
        let v2 = array![[0.], [1.], [1.]];
        let (u, v) = add_low_rank((&u1, &v1), (&u2, &v2), 1e-12).unwrap();
        let expected = u1.dot(&v1.t()) + u2.dot(&v2.t());
        assert_eq!(u.ncols(), 1);
        assert_abs_diff_eq!(u.dot(&v.t()), expected, epsilon = 1e-12);
    }
}
