//! Derivation of the reduced covariance model actually optimized and of the
//! default optimization bounds of its active parameters.

use crate::covariance_models::CovarianceModel;
use crate::errors::{GpError, Result};
use crate::parameters::GlmOptions;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};

/// Name of the amplitude parameter concentrated out of the likelihood
pub const AMPLITUDE_NAME: &str = "amplitude_0";

/// Builds the reduced model from the `base` covariance model.
///
/// When `optimize` is false every parameter becomes inactive. When the analytical
/// amplitude applies (scalar output, no noise, active `amplitude_0`), the amplitude is
/// removed from the active parameters and pinned to 1.
///
/// Returns the reduced model and whether the analytical amplitude applies.
pub fn derive_reduced<F: Float, Cov: CovarianceModel<F>>(
    base: &Cov,
    optimize: bool,
    analytical_amplitude: bool,
    has_noise: bool,
) -> Result<(Cov, bool)> {
    let mut reduced = base.clone();
    if !optimize {
        reduced.set_active_parameter(vec![])?;
    }
    if !analytical_amplitude || reduced.output_dimension() != 1 || has_noise {
        return Ok((reduced, false));
    }
    let names = reduced.parameter_description();
    match names.iter().position(|n| n == AMPLITUDE_NAME) {
        Some(position) => {
            let mut active = reduced.active_parameter().to_vec();
            active.remove(position);
            reduced.set_active_parameter(active)?;
            reduced.set_amplitude(&Array1::ones(1))?;
            Ok((reduced, true))
        }
        None => Ok((reduced, false)),
    }
}

/// Default `(n_active, 2)` optimization bounds of the active parameters of `reduced`
pub fn default_bounds<F: Float, Cov: CovarianceModel<F>>(
    reduced: &Cov,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    options: &GlmOptions,
) -> Array2<F> {
    let names = reduced.parameter_description();
    let lower = F::cast(options.default_lower_bound);
    let upper = F::cast(options.default_upper_bound);
    let mut bounds = Array2::zeros((names.len(), 2));
    for (mut row, name) in bounds.rows_mut().into_iter().zip(names.iter()) {
        row[0] = lower;
        row[1] = upper;
        if let Some(l) = name.strip_prefix("scale_").and_then(|l| l.parse::<usize>().ok()) {
            if l < x.ncols() {
                let column = x.index_axis(Axis(1), l);
                let range = column.fold(F::neg_infinity(), |acc, &v| acc.max(v))
                    - column.fold(F::infinity(), |acc, &v| acc.min(v));
                let scaled = F::cast(options.scale_factor) * range;
                if scaled > lower {
                    row[1] = scaled;
                }
            }
        } else if name == "nuggetFactor" {
            row[0] = F::cast(options.nugget_lower_bound);
        }
    }
    bounds
}

/// Checks user supplied bounds against the number of active parameters
pub fn check_bounds<F: Float>(bounds: &Array2<F>, n_active: usize) -> Result<()> {
    if bounds.dim() != (n_active, 2) {
        return Err(GpError::InvalidValueError(format!(
            "Expected bounds of shape ({n_active}, 2), got {:?}",
            bounds.dim()
        )));
    }
    if bounds.rows().into_iter().any(|r| !(r[0] <= r[1])) {
        return Err(GpError::InvalidValueError(format!(
            "Lower bounds must not exceed upper bounds, got {bounds}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance_models::{SquaredExponential, UserDefinedCovariance};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_analytical_amplitude_reduction() {
        let base = SquaredExponential::new(array![0.5, 2.], array![3.]).unwrap();
        let (reduced, analytical) = derive_reduced(&base, true, true, false).unwrap();
        assert!(analytical);
        assert_eq!(reduced.parameter_description(), vec!["scale_0", "scale_1"]);
        assert_abs_diff_eq!(reduced.amplitude(), array![1.]);
        // base left unchanged
        assert_eq!(base.active_parameter(), &[0, 1, 2]);

        let (reduced, analytical) = derive_reduced(&base, true, true, true).unwrap();
        assert!(!analytical);
        assert_eq!(reduced.active_parameter(), &[0, 1, 2]);

        let (reduced, analytical) = derive_reduced(&base, false, true, false).unwrap();
        assert!(!analytical);
        assert!(reduced.parameter().is_empty());
    }

    #[test]
    fn test_no_amplitude_parameter() {
        let base = UserDefinedCovariance::<f64>::scalar(1, |s, t| s[0] * t[0]);
        let (_, analytical) = derive_reduced(&base, true, true, false).unwrap();
        assert!(!analytical);

        let multi = SquaredExponential::new(array![1.], array![1., 1.]).unwrap();
        let (_, analytical) = derive_reduced(&multi, true, true, false).unwrap();
        assert!(!analytical);
    }

    #[test]
    fn test_default_bounds() {
        let x = array![[0., 10.], [0.004, 30.]];
        let mut model = SquaredExponential::new(array![1., 1.], array![1.])
            .unwrap()
            .with_nugget_factor(0.1)
            .unwrap();
        model.set_active_parameter(vec![0, 1, 3]).unwrap();
        let bounds = default_bounds(&model, &x, &GlmOptions::default());
        assert_abs_diff_eq!(bounds, array![[1e-2, 1e2], [1e-2, 40.], [0., 1e2]]);
        assert!(check_bounds(&bounds, 3).is_ok());
        assert!(check_bounds(&bounds, 2).is_err());
        assert!(check_bounds(&array![[1., 0.]], 1).is_err());
    }
}
