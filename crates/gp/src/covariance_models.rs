//! A module for covariance models of the gaussian process term of a general linear model.
//!
//! A covariance model maps a sample of `n` points of dimension `nx` to a
//! `(n * k, n * k)` covariance matrix where `k` is the output dimension.
//! The entry of output component `c` of point `i` is located at `i * k + c`.
//!
//! Stationary models are built upon the following correlation kernels:
//! * squared exponential,
//! * absolute exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! Their full parameter vector is `[scale_0, ..., scale_{nx-1}, amplitude_0, ..., amplitude_{k-1}, nuggetFactor]`.

use crate::errors::{GpError, Result};
use crate::utils::DiffMatrix;
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip};
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

/// A trait for covariance models used by general linear model fitting
/// and Karhunen-Loeve decompositions
pub trait CovarianceModel<F: Float>: Clone + fmt::Display + Send + Sync {
    /// Dimension of the input points
    fn input_dimension(&self) -> usize;

    /// Dimension `k` of the process values
    fn output_dimension(&self) -> usize;

    /// All the hyperparameters, active or not
    fn full_parameter(&self) -> Array1<F>;

    /// Sets all the hyperparameters
    fn set_full_parameter(&mut self, parameter: &Array1<F>) -> Result<()>;

    /// Names of all the hyperparameters
    fn full_parameter_description(&self) -> Vec<String>;

    /// Indices within the full parameter of the parameters subject to optimization
    fn active_parameter(&self) -> &[usize];

    /// Sets the indices of the parameters subject to optimization
    fn set_active_parameter(&mut self, active: Vec<usize>) -> Result<()>;

    /// Amplitude vector (size `k`)
    fn amplitude(&self) -> Array1<F>;

    /// Sets the amplitude vector (size `k`)
    fn set_amplitude(&mut self, amplitude: &Array1<F>) -> Result<()>;

    /// Covariance `(k, k)` block between points `x` and `y`
    fn compute(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> Array2<F>;

    /// Covariance between `x` and `y` when output dimension is 1
    fn compute_scalar(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> F {
        self.compute(x, y)[[0, 0]]
    }

    /// Active hyperparameters
    fn parameter(&self) -> Array1<F> {
        let full = self.full_parameter();
        self.active_parameter().iter().map(|&i| full[i]).collect()
    }

    /// Sets the active hyperparameters, inactive ones are left unchanged
    fn set_parameter(&mut self, parameter: &Array1<F>) -> Result<()> {
        let active = self.active_parameter().to_vec();
        if parameter.len() != active.len() {
            return Err(GpError::InvalidValueError(format!(
                "Expected {} active parameters, got {}",
                active.len(),
                parameter.len()
            )));
        }
        let mut full = self.full_parameter();
        for (&i, &v) in active.iter().zip(parameter.iter()) {
            full[i] = v;
        }
        self.set_full_parameter(&full)
    }

    /// Names of the active hyperparameters
    fn parameter_description(&self) -> Vec<String> {
        let names = self.full_parameter_description();
        self.active_parameter()
            .iter()
            .map(|&i| names[i].clone())
            .collect()
    }

    /// Covariance matrix `(n * k, n * k)` of the `(n, nx)` sample `x`
    fn discretize(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let k = self.output_dimension();
        let n = x.nrows();
        let xv = x.view();
        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (0..=i).map(move |j| (i, j))).collect();
        let blocks: Vec<Array2<F>> = pairs
            .par_iter()
            .map(|&(i, j)| self.compute(&xv.row(i), &xv.row(j)))
            .collect();
        let mut matrix = Array2::zeros((n * k, n * k));
        for (&(i, j), block) in pairs.iter().zip(blocks.iter()) {
            for a in 0..k {
                for b in 0..k {
                    matrix[[i * k + a, j * k + b]] = block[[a, b]];
                    matrix[[j * k + b, i * k + a]] = block[[a, b]];
                }
            }
        }
        matrix
    }

    /// Cross covariance matrix `(n * k, m * k)` between samples `x` `(n, nx)` and `y` `(m, nx)`
    fn discretize_cross(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let k = self.output_dimension();
        let (xv, yv) = (x.view(), y.view());
        let m = y.nrows();
        let row_blocks: Vec<Array2<F>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let xi = xv.row(i);
                let mut rows = Array2::zeros((k, m * k));
                for (j, yj) in yv.rows().into_iter().enumerate() {
                    rows.slice_mut(s![.., j * k..(j + 1) * k])
                        .assign(&self.compute(&xi, &yj));
                }
                rows
            })
            .collect();
        let mut matrix = Array2::zeros((x.nrows() * k, m * k));
        for (i, rows) in row_blocks.iter().enumerate() {
            matrix.slice_mut(s![i * k..(i + 1) * k, ..]).assign(rows);
        }
        matrix
    }
}

/// A correlation kernel of stationary models: correlation given the absolute
/// differences between points already divided by the scale parameters
pub trait CorrelationKernel<F: Float>: Clone + Copy + Default + fmt::Display + Send + Sync {
    /// Correlations of `(n, nx)` scaled absolute differences, returned as a (n,) vector
    fn correlation(&self, scaled: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;
}

macro_rules! declare_kernel_util_impls {
    ($kernel:ident, $name:literal) => {
        impl fmt::Display for $kernel {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, $name)
            }
        }

        impl From<$kernel> for String {
            fn from(_item: $kernel) -> String {
                $name.to_string()
            }
        }

        impl TryFrom<String> for $kernel {
            type Error = &'static str;
            fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                if s == $name {
                    Ok(Self::default())
                } else {
                    Err(concat!("Bad string value, should be '", $name, "'"))
                }
            }
        }
    };
}

/// Squared exponential correlation kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct SquaredExponentialCorr();

impl<F: Float> CorrelationKernel<F> for SquaredExponentialCorr {
    ///   nx
    /// prod exp( - t_l^2 / 2 )
    ///  l=1
    fn correlation(&self, scaled: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        scaled
            .mapv(|v| v * v)
            .sum_axis(Axis(1))
            .mapv(|v| F::exp(F::cast(-0.5) * v))
    }
}

/// Absolute exponential correlation kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct AbsoluteExponentialCorr();

impl<F: Float> CorrelationKernel<F> for AbsoluteExponentialCorr {
    ///   nx
    /// prod exp( - t_l )
    ///  l=1
    fn correlation(&self, scaled: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        scaled.sum_axis(Axis(1)).mapv(|v| F::exp(-v))
    }
}

/// Matern 3/2 correlation kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern32Corr();

impl<F: Float> CorrelationKernel<F> for Matern32Corr {
    ///   nx
    /// prod (1 + sqrt(3) t_l) exp( - sqrt(3) t_l )
    ///  l=1
    fn correlation(&self, scaled: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        let sqrt3 = F::cast(3.).sqrt();
        let a = scaled
            .mapv(|v| F::one() + sqrt3 * v)
            .map_axis(Axis(1), |row| row.product());
        let b = scaled.sum_axis(Axis(1)).mapv(|v| F::exp(-sqrt3 * v));
        a * b
    }
}

/// Matern 5/2 correlation kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern52Corr();

impl<F: Float> CorrelationKernel<F> for Matern52Corr {
    ///   nx
    /// prod (1 + sqrt(5) t_l + 5/3 t_l^2) exp( - sqrt(5) t_l )
    ///  l=1
    fn correlation(&self, scaled: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        let sqrt5 = F::cast(5.).sqrt();
        let div5_3 = F::cast(5. / 3.);
        let a = scaled
            .mapv(|v| F::one() + sqrt5 * v + div5_3 * v * v)
            .map_axis(Axis(1), |row| row.product());
        let b = scaled.sum_axis(Axis(1)).mapv(|v| F::exp(-sqrt5 * v));
        a * b
    }
}

declare_kernel_util_impls!(SquaredExponentialCorr, "SquaredExponential");
declare_kernel_util_impls!(AbsoluteExponentialCorr, "AbsoluteExponential");
declare_kernel_util_impls!(Matern32Corr, "Matern32");
declare_kernel_util_impls!(Matern52Corr, "Matern52");

/// Stationary covariance model `C(x, y) = rho((x - y) / scale) * S` where
/// `S = diag(amplitude) R diag(amplitude)` with `R` the output correlation matrix.
/// At zero lag the correlation is increased by the nugget factor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Corr: Serialize",
        deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>"
    ))
)]
pub struct StationaryCovariance<F: Float, Corr: CorrelationKernel<F>> {
    kernel: Corr,
    scale: Array1<F>,
    amplitude: Array1<F>,
    output_correlation: Array2<F>,
    nugget_factor: F,
    active: Vec<usize>,
}

/// Squared exponential covariance model
pub type SquaredExponential<F> = StationaryCovariance<F, SquaredExponentialCorr>;
/// Absolute exponential covariance model
pub type AbsoluteExponential<F> = StationaryCovariance<F, AbsoluteExponentialCorr>;
/// Matern 3/2 covariance model
pub type Matern32<F> = StationaryCovariance<F, Matern32Corr>;
/// Matern 5/2 covariance model
pub type Matern52<F> = StationaryCovariance<F, Matern52Corr>;

fn check_positive<F: Float>(name: &str, values: &Array1<F>) -> Result<()> {
    if values.iter().any(|&v| !(v > F::zero()) || !v.is_finite()) {
        return Err(GpError::InvalidValueError(format!(
            "{name} values must be positive, got {values}"
        )));
    }
    Ok(())
}

impl<F: Float, Corr: CorrelationKernel<F>> StationaryCovariance<F, Corr> {
    /// Constructor given the scale (size nx) and amplitude (size k) vectors.
    /// Scale and amplitude parameters are active, the nugget factor is null and inactive.
    pub fn new(scale: Array1<F>, amplitude: Array1<F>) -> Result<Self> {
        check_positive("scale", &scale)?;
        check_positive("amplitude", &amplitude)?;
        let k = amplitude.len();
        let active = (0..scale.len() + k).collect();
        Ok(StationaryCovariance {
            kernel: Corr::default(),
            scale,
            amplitude,
            output_correlation: Array2::eye(k),
            nugget_factor: F::zero(),
            active,
        })
    }

    /// Sets the nugget factor added to the correlation at zero lag
    pub fn with_nugget_factor(mut self, nugget_factor: F) -> Result<Self> {
        if nugget_factor < F::zero() || !nugget_factor.is_finite() {
            return Err(GpError::InvalidValueError(format!(
                "nugget factor must be non negative, got {nugget_factor}"
            )));
        }
        self.nugget_factor = nugget_factor;
        Ok(self)
    }

    /// Sets the `(k, k)` correlation matrix between output components
    pub fn with_output_correlation(mut self, correlation: Array2<F>) -> Result<Self> {
        let k = self.amplitude.len();
        if correlation.dim() != (k, k) {
            return Err(GpError::InvalidValueError(format!(
                "output correlation must be ({k}, {k}), got {:?}",
                correlation.dim()
            )));
        }
        let symmetric = correlation
            .indexed_iter()
            .all(|((i, j), &v)| (v - correlation[[j, i]]).abs() <= F::epsilon());
        let unit = correlation.diag().iter().all(|&v| v == F::one());
        if !symmetric || !unit {
            return Err(GpError::InvalidValueError(
                "output correlation must be symmetric with unit diagonal".to_string(),
            ));
        }
        self.output_correlation = correlation;
        Ok(self)
    }

    /// Scale parameters
    pub fn scale(&self) -> &Array1<F> {
        &self.scale
    }

    /// Nugget factor
    pub fn nugget_factor(&self) -> F {
        self.nugget_factor
    }

    /// Correlation kernel
    pub fn kernel(&self) -> Corr {
        self.kernel
    }

    /// `diag(amplitude) R diag(amplitude)`
    fn output_covariance(&self) -> Array2<F> {
        let a = &self.amplitude;
        let mut cov = self.output_correlation.to_owned();
        Zip::indexed(&mut cov).for_each(|(i, j), v| *v *= a[i] * a[j]);
        cov
    }

    fn scaled_differences(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> Array2<F> {
        let d = (x - y).mapv(|v| v.abs()) / &self.scale;
        d.insert_axis(Axis(0))
    }

    fn correlation(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> F {
        let rho = self.kernel.correlation(&self.scaled_differences(x, y))[0];
        if x == y {
            rho + self.nugget_factor
        } else {
            rho
        }
    }
}

impl<F: Float, Corr: CorrelationKernel<F>> fmt::Display for StationaryCovariance<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}(scale={}, amplitude={}, nuggetFactor={})",
            self.kernel, self.scale, self.amplitude, self.nugget_factor
        )
    }
}

impl<F: Float, Corr: CorrelationKernel<F>> CovarianceModel<F> for StationaryCovariance<F, Corr> {
    fn input_dimension(&self) -> usize {
        self.scale.len()
    }

    fn output_dimension(&self) -> usize {
        self.amplitude.len()
    }

    fn full_parameter(&self) -> Array1<F> {
        self.scale
            .iter()
            .chain(self.amplitude.iter())
            .cloned()
            .chain(std::iter::once(self.nugget_factor))
            .collect()
    }

    fn set_full_parameter(&mut self, parameter: &Array1<F>) -> Result<()> {
        let (nx, k) = (self.scale.len(), self.amplitude.len());
        if parameter.len() != nx + k + 1 {
            return Err(GpError::InvalidValueError(format!(
                "Expected {} parameters, got {}",
                nx + k + 1,
                parameter.len()
            )));
        }
        let scale = parameter.slice(ndarray::s![..nx]).to_owned();
        let amplitude = parameter.slice(ndarray::s![nx..nx + k]).to_owned();
        check_positive("scale", &scale)?;
        check_positive("amplitude", &amplitude)?;
        let nugget = parameter[nx + k];
        if nugget < F::zero() || !nugget.is_finite() {
            return Err(GpError::InvalidValueError(format!(
                "nugget factor must be non negative, got {nugget}"
            )));
        }
        self.scale = scale;
        self.amplitude = amplitude;
        self.nugget_factor = nugget;
        Ok(())
    }

    fn full_parameter_description(&self) -> Vec<String> {
        (0..self.scale.len())
            .map(|i| format!("scale_{i}"))
            .chain((0..self.amplitude.len()).map(|j| format!("amplitude_{j}")))
            .chain(std::iter::once("nuggetFactor".to_string()))
            .collect()
    }

    fn active_parameter(&self) -> &[usize] {
        &self.active
    }

    fn set_active_parameter(&mut self, active: Vec<usize>) -> Result<()> {
        check_active(&active, self.scale.len() + self.amplitude.len() + 1)?;
        self.active = active;
        Ok(())
    }

    fn amplitude(&self) -> Array1<F> {
        self.amplitude.to_owned()
    }

    fn set_amplitude(&mut self, amplitude: &Array1<F>) -> Result<()> {
        if amplitude.len() != self.amplitude.len() {
            return Err(GpError::InvalidValueError(format!(
                "Expected amplitude of size {}, got {}",
                self.amplitude.len(),
                amplitude.len()
            )));
        }
        check_positive("amplitude", amplitude)?;
        self.amplitude = amplitude.to_owned();
        Ok(())
    }

    fn compute(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> Array2<F> {
        self.output_covariance() * self.correlation(x, y)
    }

    fn compute_scalar(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> F {
        self.amplitude[0] * self.amplitude[0] * self.correlation(x, y)
    }

    fn discretize(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let n = x.nrows();
        let k = self.amplitude.len();
        let dm = DiffMatrix::new(x);
        let rho = self.kernel.correlation(&(&dm.d / &self.scale));
        let mut corr = Array2::<F>::eye(n) * (F::one() + self.nugget_factor);
        Zip::from(dm.d_indices.rows())
            .and(&rho)
            .for_each(|ij, &r| {
                corr[[ij[0], ij[1]]] = r;
                corr[[ij[1], ij[0]]] = r;
            });
        if k == 1 {
            return corr * (self.amplitude[0] * self.amplitude[0]);
        }
        let cov = self.output_covariance();
        let mut matrix = Array2::zeros((n * k, n * k));
        Zip::indexed(&mut matrix).par_for_each(|(r, c), v| {
            *v = corr[[r / k, c / k]] * cov[[r % k, c % k]];
        });
        matrix
    }
}

fn check_active(active: &[usize], size: usize) -> Result<()> {
    let mut sorted = active.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != active.len() || active.iter().any(|&i| i >= size) {
        return Err(GpError::InvalidValueError(format!(
            "Active parameter indices must be distinct and lower than {size}, got {active:?}"
        )));
    }
    Ok(())
}

type KernelFn<F> = dyn Fn(&ArrayView1<F>, &ArrayView1<F>) -> Array2<F> + Send + Sync;

/// A covariance model defined by a user function returning `(k, k)` blocks,
/// multiplied on both sides by `diag(amplitude)`.
///
/// Its only hyperparameters are the amplitudes, inactive by default.
#[derive(Clone)]
pub struct UserDefinedCovariance<F: Float> {
    function: Arc<KernelFn<F>>,
    input_dimension: usize,
    amplitude: Array1<F>,
    active: Vec<usize>,
}

impl<F: Float> UserDefinedCovariance<F> {
    /// Constructor given the input and output dimensions and the covariance function
    pub fn new(
        input_dimension: usize,
        output_dimension: usize,
        function: impl Fn(&ArrayView1<F>, &ArrayView1<F>) -> Array2<F> + Send + Sync + 'static,
    ) -> Self {
        UserDefinedCovariance {
            function: Arc::new(function),
            input_dimension,
            amplitude: Array1::ones(output_dimension),
            active: vec![],
        }
    }

    /// Scalar covariance model from a scalar function
    pub fn scalar(
        input_dimension: usize,
        function: impl Fn(&ArrayView1<F>, &ArrayView1<F>) -> F + Send + Sync + 'static,
    ) -> Self {
        Self::new(input_dimension, 1, move |x, y| {
            Array2::from_elem((1, 1), function(x, y))
        })
    }
}

impl<F: Float> fmt::Display for UserDefinedCovariance<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "UserDefinedCovariance(input_dimension={}, amplitude={})",
            self.input_dimension, self.amplitude
        )
    }
}

impl<F: Float> fmt::Debug for UserDefinedCovariance<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<F: Float> CovarianceModel<F> for UserDefinedCovariance<F> {
    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.amplitude.len()
    }

    fn full_parameter(&self) -> Array1<F> {
        self.amplitude.to_owned()
    }

    fn set_full_parameter(&mut self, parameter: &Array1<F>) -> Result<()> {
        self.set_amplitude(parameter)
    }

    fn full_parameter_description(&self) -> Vec<String> {
        (0..self.amplitude.len())
            .map(|j| format!("amplitude_{j}"))
            .collect()
    }

    fn active_parameter(&self) -> &[usize] {
        &self.active
    }

    fn set_active_parameter(&mut self, active: Vec<usize>) -> Result<()> {
        check_active(&active, self.amplitude.len())?;
        self.active = active;
        Ok(())
    }

    fn amplitude(&self) -> Array1<F> {
        self.amplitude.to_owned()
    }

    fn set_amplitude(&mut self, amplitude: &Array1<F>) -> Result<()> {
        if amplitude.len() != self.amplitude.len() {
            return Err(GpError::InvalidValueError(format!(
                "Expected amplitude of size {}, got {}",
                self.amplitude.len(),
                amplitude.len()
            )));
        }
        check_positive("amplitude", amplitude)?;
        self.amplitude = amplitude.to_owned();
        Ok(())
    }

    fn compute(&self, x: &ArrayView1<F>, y: &ArrayView1<F>) -> Array2<F> {
        let mut block = (self.function)(x, y);
        let a = &self.amplitude;
        Zip::indexed(&mut block).for_each(|(i, j), v| *v *= a[i] * a[j]);
        block
    }
}
