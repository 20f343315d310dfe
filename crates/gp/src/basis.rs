//! A module for functional bases used to model the trend of a general linear model
//! and to expand the modes of a Karhunen-Loeve decomposition.
//!
//! The following bases are implemented:
//! * empty (no trend),
//! * constant,
//! * linear,
//! * quadratic,
//! * tensorized Legendre polynomials of bounded total degree,
//! * user defined functions.

use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{concatenate, s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip};
use paste::paste;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

/// A trait for finite collections of scalar functions `phi_p: R^nx -> R`
pub trait Basis<F: Float>: Clone + fmt::Display + Send + Sync {
    /// Number of functions `P` of the basis for inputs of dimension `nx`
    fn size(&self, nx: usize) -> usize;

    /// Values of the basis functions at the `(n, nx)` points `x` as a `(n, P)` matrix
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F>;
}

/// The empty basis: the trend is the null function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct EmptyBasis();

impl<F: Float> Basis<F> for EmptyBasis {
    fn size(&self, _nx: usize) -> usize {
        0
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        Array2::zeros((x.nrows(), 0))
    }
}

/// The constant function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct ConstantBasis();

impl<F: Float> Basis<F> for ConstantBasis {
    fn size(&self, _nx: usize) -> usize {
        1
    }

    /// phi(x) = [1]
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        Array2::ones((x.nrows(), 1))
    }
}

/// Affine functions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct LinearBasis();

impl<F: Float> Basis<F> for LinearBasis {
    fn size(&self, nx: usize) -> usize {
        1 + nx
    }

    /// phi(x) = [ 1, x_1, ..., x_n ]
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        concatenate![Axis(1), Array2::ones((x.nrows(), 1)), x.to_owned()]
    }
}

/// Polynomials of degree 2
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct QuadraticBasis();

impl<F: Float> Basis<F> for QuadraticBasis {
    fn size(&self, nx: usize) -> usize {
        1 + nx + nx * (nx + 1) / 2
    }

    /// phi(x) = [ 1, { x_i, i = 1,...,n }, { x_i * x_j,  (i,j) = 1,...,n  , j >= i } ]
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let mut res = concatenate![Axis(1), Array2::ones((x.nrows(), 1)), x.to_owned()];
        for k in 0..x.ncols() {
            let part = x.slice(s![.., k..]).to_owned() * x.slice(s![.., k..k + 1]);
            res = concatenate![Axis(1), res, part]
        }
        res
    }
}

macro_rules! declare_basis_util_impls {
    ($basis:ident) => {
        paste! {
            impl fmt::Display for [<$basis Basis>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}Basis", stringify!($basis))
                }
            }

            impl From<[<$basis Basis>]> for String {
                fn from(_item: [<$basis Basis>]) -> Self {
                    [<$basis Basis>]().to_string()
                }
            }

            impl TryFrom<String> for [<$basis Basis>] {
                type Error = &'static str;
                fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                    if s == stringify!([<$basis Basis>]) {
                        Ok(Self::default())
                    } else {
                        Err(concat!("Bad string value, should be '", stringify!([<$basis Basis>]), "'"))
                    }
                }
            }
        }
    };
}

declare_basis_util_impls!(Empty);
declare_basis_util_impls!(Constant);
declare_basis_util_impls!(Linear);
declare_basis_util_impls!(Quadratic);

/// Tensorized Legendre polynomials `prod_l P_{a_l}(t_l)` with total degree `sum a_l <= degree`,
/// where `t` is `x` affinely mapped from its bounds onto `[-1, 1]^nx`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LegendreBasis<F: Float> {
    degree: usize,
    /// (nx, 2) bounds mapped onto [-1, 1], none means x is used as is
    bounds: Option<Array2<F>>,
}

impl<F: Float> LegendreBasis<F> {
    /// Polynomials of total degree up to `degree` evaluated at `x` directly
    pub fn new(degree: usize) -> Self {
        LegendreBasis {
            degree,
            bounds: None,
        }
    }

    /// Maps the `(nx, 2)` box `bounds` onto `[-1, 1]^nx` before evaluation
    pub fn with_bounds(mut self, bounds: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Self> {
        if bounds.ncols() != 2 || bounds.rows().into_iter().any(|r| !(r[0] < r[1])) {
            return Err(GpError::InvalidValueError(
                "Legendre basis bounds must be a (nx, 2) array with lower < upper".to_string(),
            ));
        }
        self.bounds = Some(bounds.to_owned());
        Ok(self)
    }

    /// Multi-indices of total degree lower or equal to `degree`, by increasing total degree
    fn multi_indices(&self, nx: usize) -> Vec<Vec<usize>> {
        fn fill(prefix: &mut Vec<usize>, nx: usize, remaining: usize, out: &mut Vec<Vec<usize>>) {
            if prefix.len() == nx {
                if remaining == 0 {
                    out.push(prefix.clone());
                }
                return;
            }
            for a in (0..=remaining).rev() {
                prefix.push(a);
                fill(prefix, nx, remaining - a, out);
                prefix.pop();
            }
        }
        let mut indices = vec![];
        for total in 0..=self.degree {
            fill(&mut Vec::with_capacity(nx), nx, total, &mut indices);
        }
        indices
    }
}

/// Values `P_0(t), ..., P_n(t)` from the three terms recurrence
fn legendre_values<F: Float>(t: F, n: usize) -> Vec<F> {
    let mut values = Vec::with_capacity(n + 1);
    values.push(F::one());
    if n > 0 {
        values.push(t);
    }
    for m in 1..n {
        let mf = F::cast(m);
        let next = ((F::cast(2 * m + 1)) * t * values[m] - mf * values[m - 1]) / (mf + F::one());
        values.push(next);
    }
    values
}

impl<F: Float> fmt::Display for LegendreBasis<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LegendreBasis(degree={})", self.degree)
    }
}

impl<F: Float> Basis<F> for LegendreBasis<F> {
    fn size(&self, nx: usize) -> usize {
        // binomial(nx + degree, nx)
        (1..=nx).fold(1, |acc, i| acc * (self.degree + i) / i)
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let nx = x.ncols();
        let indices = self.multi_indices(nx);
        let mut res = Array2::zeros((x.nrows(), indices.len()));
        Zip::from(res.rows_mut())
            .and(x.rows())
            .par_for_each(|mut row, xi| {
                let per_dim: Vec<Vec<F>> = xi
                    .iter()
                    .enumerate()
                    .map(|(l, &v)| {
                        let t = match &self.bounds {
                            Some(b) => {
                                F::cast(2.) * (v - b[[l, 0]]) / (b[[l, 1]] - b[[l, 0]]) - F::one()
                            }
                            None => v,
                        };
                        legendre_values(t, self.degree)
                    })
                    .collect();
                for (p, alpha) in indices.iter().enumerate() {
                    row[p] = alpha
                        .iter()
                        .enumerate()
                        .fold(F::one(), |acc, (l, &a)| acc * per_dim[l][a]);
                }
            });
        res
    }
}

type BasisFn<F> = dyn Fn(&ArrayView1<F>) -> F + Send + Sync;

/// A basis made of user defined functions
#[derive(Clone, Default)]
pub struct FunctionalBasis<F: Float> {
    functions: Vec<Arc<BasisFn<F>>>,
}

impl<F: Float> FunctionalBasis<F> {
    /// An empty collection of functions
    pub fn new() -> Self {
        FunctionalBasis { functions: vec![] }
    }

    /// Appends a function to the basis
    pub fn with_function(
        mut self,
        function: impl Fn(&ArrayView1<F>) -> F + Send + Sync + 'static,
    ) -> Self {
        self.functions.push(Arc::new(function));
        self
    }

    /// Number of functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the basis has no function
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<F: Float> fmt::Display for FunctionalBasis<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FunctionalBasis(size={})", self.functions.len())
    }
}

impl<F: Float> fmt::Debug for FunctionalBasis<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<F: Float> Basis<F> for FunctionalBasis<F> {
    fn size(&self, _nx: usize) -> usize {
        self.functions.len()
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let mut res = Array2::zeros((x.nrows(), self.functions.len()));
        Zip::from(res.rows_mut())
            .and(x.rows())
            .par_for_each(|mut row, xi| {
                for (v, f) in row.iter_mut().zip(self.functions.iter()) {
                    *v = f(&xi);
                }
            });
        res
    }
}

/// Design matrix `(n * k, P * k)` of the basis at the `(n, nx)` points `x` for `k` outputs.
///
/// Each output marginal `j` has its own copy of the basis:
/// entry `(i * k + j, j * P + p)` is `phi_p(x_i)`, all other entries are zero.
pub fn design_matrix<F: Float, B: Basis<F>>(
    basis: &B,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    output_dim: usize,
) -> Array2<F> {
    let values = basis.value(x);
    let (n, p) = values.dim();
    let mut design = Array2::zeros((n * output_dim, p * output_dim));
    for j in 0..output_dim {
        design
            .slice_mut(s![j..;output_dim, j * p..(j + 1) * p])
            .assign(&values);
    }
    design
}

/// Trend values `(n, k)` given basis values `(n, P)` and coefficients laid out as in [design_matrix]
pub(crate) fn combine<F: Float>(values: &Array2<F>, beta: &Array1<F>, output_dim: usize) -> Array2<F> {
    let (n, p) = values.dim();
    let mut res = Array2::zeros((n, output_dim));
    if p == 0 {
        return res;
    }
    for j in 0..output_dim {
        let coefs = beta.slice(s![j * p..(j + 1) * p]);
        res.column_mut(j).assign(&values.dot(&coefs));
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_quadratic() {
        let a = array![[1., 2., 3.], [3., 4., 5.]];
        let actual = QuadraticBasis::default().value(&a);
        let expected = array![
            [1.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0, 6.0, 9.0],
            [1.0, 3.0, 4.0, 5.0, 9.0, 12.0, 15.0, 16.0, 20.0, 25.0]
        ];
        assert_abs_diff_eq!(expected, actual);
        assert_eq!(<QuadraticBasis as Basis<f64>>::size(&QuadraticBasis(), 3), 10);
    }

    #[test]
    fn test_legendre() {
        let basis = LegendreBasis::new(3);
        let x = array![[0.5]];
        let v = basis.value(&x);
        assert_abs_diff_eq!(v, array![[1., 0.5, -0.125, -0.4375]], epsilon = 1e-14);

        let basis = LegendreBasis::new(2)
            .with_bounds(&array![[0., 2.], [0., 1.]])
            .unwrap();
        assert_eq!(basis.size(2), 6);
        let v = basis.value(&array![[2., 0.5], [0., 0.]]);
        assert_eq!(v.dim(), (2, 6));
        // t = (1, 0): [1, P1(1), P1(0), P2(1), P1(1)P1(0), P2(0)]
        assert_abs_diff_eq!(v.row(0), array![1., 1., 0., 1., 0., -0.5], epsilon = 1e-14);
    }

    #[test]
    fn test_design_matrix() {
        let x = array![[1.], [2.], [3.]];
        let f = design_matrix(&LinearBasis(), &x, 2);
        assert_eq!(f.dim(), (6, 4));
        assert_abs_diff_eq!(f.row(2), array![1., 2., 0., 0.]);
        assert_abs_diff_eq!(f.row(3), array![0., 0., 1., 2.]);
        let trend = combine(&LinearBasis().value(&x), &array![1., 2., -1., 0.], 2);
        assert_abs_diff_eq!(trend, array![[3., -1.], [5., -1.], [7., -1.]]);
    }

    #[test]
    fn test_functional() {
        let basis = FunctionalBasis::new()
            .with_function(|x: &ArrayView1<f64>| x[0].sin())
            .with_function(|x: &ArrayView1<f64>| x[0] * x[0]);
        let v = basis.value(&array![[0.], [2.]]);
        assert_abs_diff_eq!(v, array![[0., 0.], [2f64.sin(), 4.]]);
        assert_eq!(EmptyBasis().value(&array![[1.]]).dim(), (1, 0));
        assert_eq!("LinearBasis", LinearBasis().to_string());
    }
}
