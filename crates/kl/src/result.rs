use crate::errors::{KlError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};
use std::fmt;
use uqbox_gp::{Basis, CovarianceModel};

/// Eigenfunction of a Karhunen-Loeve decomposition, a combination of the functions
/// of a basis for each output marginal
#[derive(Clone)]
pub struct KlMode<F: Float, B: Basis<F>> {
    basis: B,
    /// Coefficients `(P, k)`: column `c` gives marginal `c`
    coefficients: Array2<F>,
}

impl<F: Float, B: Basis<F>> KlMode<F, B> {
    pub(crate) fn new(basis: B, coefficients: Array2<F>) -> Self {
        KlMode {
            basis,
            coefficients,
        }
    }

    /// Coefficients `(P, k)` of the mode in the basis
    pub fn coefficients(&self) -> &Array2<F> {
        &self.coefficients
    }

    /// Values `(n, k)` of the mode at the `(n, nx)` points `x`
    pub fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        self.basis.value(x).dot(&self.coefficients)
    }
}

/// Outcome of a Karhunen-Loeve decomposition: the `K` largest eigenvalues of the
/// covariance operator and the associated modes, normalized in `L2` norm.
///
/// The modes are tabulated on the retained quadrature nodes, the projection matrix
/// `(K, N * k)` maps values on these nodes to the coefficients of the decomposition.
#[derive(Clone)]
pub struct KarhunenLoeveResult<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> {
    pub(crate) covariance: Cov,
    pub(crate) threshold: F,
    pub(crate) eigenvalues: Array1<F>,
    pub(crate) modes: Vec<KlMode<F, B>>,
    pub(crate) mesh: Array2<F>,
    pub(crate) modes_as_sample: Vec<Array2<F>>,
    pub(crate) projection: Array2<F>,
    pub(crate) selection_ratio: F,
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> fmt::Display
    for KarhunenLoeveResult<F, B, Cov>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "KL(covariance={}, threshold={}, eigenvalues={}, selection ratio={})",
            self.covariance, self.threshold, self.eigenvalues, self.selection_ratio
        )
    }
}

impl<F: Float, B: Basis<F>, Cov: CovarianceModel<F>> KarhunenLoeveResult<F, B, Cov> {
    /// Decomposed covariance model
    pub fn covariance_model(&self) -> &Cov {
        &self.covariance
    }

    /// Fraction of the variance allowed to be discarded
    pub fn threshold(&self) -> F {
        self.threshold
    }

    /// Retained eigenvalues in decreasing order
    pub fn eigenvalues(&self) -> &Array1<F> {
        &self.eigenvalues
    }

    /// Number `K` of retained modes
    pub fn n_modes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Retained modes
    pub fn modes(&self) -> &[KlMode<F, B>] {
        &self.modes
    }

    /// Quadrature nodes `(N, nx)` within the domain
    pub fn mesh(&self) -> &Array2<F> {
        &self.mesh
    }

    /// Values `(N, k)` of each mode on the mesh
    pub fn modes_as_sample(&self) -> &[Array2<F>] {
        &self.modes_as_sample
    }

    /// Projection matrix `(K, N * k)`
    pub fn projection_matrix(&self) -> &Array2<F> {
        &self.projection
    }

    /// Ratio of the retained variance to the variance of all computed modes
    pub fn selection_ratio(&self) -> F {
        self.selection_ratio
    }

    /// Values `(n, k)` of the mode `index` at the `(n, nx)` points `x`
    pub fn mode_value(
        &self,
        index: usize,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        let mode = self.modes.get(index).ok_or_else(|| {
            KlError::InvalidValueError(format!(
                "Mode index {index} out of range, {} modes retained",
                self.modes.len()
            ))
        })?;
        Ok(mode.value(x))
    }

    /// Coefficients `(K)` of the field with values `(N, k)` on the mesh
    pub fn project(&self, values: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let k = self.covariance.output_dimension();
        if values.dim() != (self.mesh.nrows(), k) {
            return Err(KlError::InvalidValueError(format!(
                "Expected values of shape ({}, {k}), got {:?}",
                self.mesh.nrows(),
                values.dim()
            )));
        }
        let flat = Array1::from_iter(values.iter().cloned());
        Ok(self.projection.dot(&flat))
    }

    /// Coefficients `(K)` of the field given by `function` mapping a point to its `k` values
    pub fn project_function(
        &self,
        function: impl Fn(&ArrayView1<F>) -> Array1<F>,
    ) -> Result<Array1<F>> {
        let k = self.covariance.output_dimension();
        let mut values = Array2::zeros((self.mesh.nrows(), k));
        for (mut row, x) in values.rows_mut().into_iter().zip(self.mesh.rows()) {
            let value = function(&x);
            if value.len() != k {
                return Err(KlError::InvalidValueError(format!(
                    "Expected function values of size {k}, got {}",
                    value.len()
                )));
            }
            row.assign(&value);
        }
        self.project(&values)
    }

    /// Values `(N, k)` on the mesh of the field `sum_j sqrt(lambda_j) xi_j phi_j`
    pub fn lift(&self, coefficients: &Array1<F>) -> Result<Array2<F>> {
        if coefficients.len() != self.n_modes() {
            return Err(KlError::InvalidValueError(format!(
                "Expected {} coefficients, got {}",
                self.n_modes(),
                coefficients.len()
            )));
        }
        let mut values = Array2::zeros((self.mesh.nrows(), self.covariance.output_dimension()));
        for ((mode, &lambda), &xi) in self
            .modes_as_sample
            .iter()
            .zip(self.eigenvalues.iter())
            .zip(coefficients.iter())
        {
            values.scaled_add(lambda.sqrt() * xi, mode);
        }
        Ok(values)
    }

    /// Values `(n, k)` at the `(n, nx)` points `x` of the field of given coefficients
    pub fn lift_function(
        &self,
        coefficients: &Array1<F>,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        if coefficients.len() != self.n_modes() {
            return Err(KlError::InvalidValueError(format!(
                "Expected {} coefficients, got {}",
                self.n_modes(),
                coefficients.len()
            )));
        }
        let k = self.covariance.output_dimension();
        let values = self
            .modes
            .iter()
            .zip(self.eigenvalues.iter())
            .zip(coefficients.iter())
            .fold(Array2::zeros((x.nrows(), k)), |acc, ((mode, &lambda), &xi)| {
                acc + mode.value(x) * (lambda.sqrt() * xi)
            });
        Ok(values)
    }

    /// Variance `sum_j lambda_j phi_j(x)^2` `(n, k)` of the truncated process at `x`
    pub fn variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let k = self.covariance.output_dimension();
        self.modes
            .iter()
            .zip(self.eigenvalues.iter())
            .fold(Array2::zeros((x.nrows(), k)), |acc, (mode, &lambda)| {
                acc + mode.value(x).mapv(|v| v * v) * lambda
            })
    }

    /// Sum of the retained eigenvalues
    pub fn retained_variance(&self) -> F {
        self.eigenvalues.sum()
    }
}
