use crate::domain::Domain;
use crate::errors::{KlError, Result};
use crate::parameters::{KlParams, KlValidParams};
use crate::result::{KarhunenLoeveResult, KlMode};
use linfa::Float;
use linfa_linalg::{eigh::*, triangular::*};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, Axis};
use uqbox_doe::WeightedExperiment;
use uqbox_gp::{regularized_cholesky, Basis, CovarianceModel, RegularizationParams};

/// Quadrature nodes within the domain with the square roots of their weights
struct Discretization<F: Float> {
    nodes: Array2<F>,
    sqrt_weights: Array1<F>,
}

/// Karhunen-Loeve decomposition of a covariance model over a domain by the
/// Galerkin method: the modes are sought in the span of a functional basis and the
/// integrals of the Fredholm eigenproblem are computed with a weighted experiment.
///
/// The discretized problem `C' alpha = lambda G alpha`, `G` being the Gram matrix of
/// the basis, is reduced to a standard symmetric eigenproblem with the Cholesky
/// factor of `G`.
pub struct KarhunenLoeveQuadratureAlgorithm<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    params: KlValidParams<F, D, Cov, E, B>,
}

impl<F, D, Cov, E, B> KarhunenLoeveQuadratureAlgorithm<F, D, Cov, E, B>
where
    F: Float,
    D: Domain<F>,
    Cov: CovarianceModel<F>,
    E: WeightedExperiment<F>,
    B: Basis<F>,
{
    /// KL parameters constructor
    pub fn params(domain: D, covariance: Cov, experiment: E, basis: B) -> KlParams<F, D, Cov, E, B> {
        KlParams::new(domain, covariance, experiment, basis)
    }

    /// Constructor from validated parameters
    pub fn new(params: KlValidParams<F, D, Cov, E, B>) -> Self {
        KarhunenLoeveQuadratureAlgorithm { params }
    }

    /// Parameters of the decomposition
    pub fn parameters(&self) -> &KlValidParams<F, D, Cov, E, B> {
        &self.params
    }

    /// Maps the experiment nodes onto the bounding box of the domain and keeps
    /// the ones within the domain
    fn discretize(&self) -> Result<Discretization<F>> {
        let experiment = &self.params.experiment;
        let source = experiment.distribution_bounds();
        let target = self.params.domain.bounding_box();
        let ratio = (&target.column(1) - &target.column(0)) / (&source.column(1) - &source.column(0));
        let jacobian = ratio.product();

        let (raw_nodes, raw_weights) = experiment.generate_with_weights()?;
        let mut nodes = Vec::with_capacity(raw_nodes.len());
        let mut sqrt_weights = Vec::with_capacity(raw_weights.len());
        let mut n_retained = 0;
        for (node, &weight) in raw_nodes.rows().into_iter().zip(raw_weights.iter()) {
            let mapped = (&node - &source.column(0)) * &ratio + target.column(0);
            if !self.params.domain.contains(&mapped.view()) {
                continue;
            }
            let pdf = experiment.pdf(&node);
            if !(pdf > F::zero()) {
                continue;
            }
            let w = jacobian * weight / pdf;
            if !(w >= F::zero()) {
                return Err(KlError::InvalidValueError(format!(
                    "Quadrature weights must be non negative, got {weight}"
                )));
            }
            nodes.extend(mapped.iter().cloned());
            sqrt_weights.push(w.sqrt());
            n_retained += 1;
        }
        if n_retained == 0 {
            return Err(KlError::EmptyDiscretization);
        }
        debug!(
            "{n_retained} quadrature nodes out of {} within the domain",
            raw_nodes.nrows()
        );
        let nodes = Array2::from_shape_vec((n_retained, target.nrows()), nodes)
            .map_err(|e| KlError::InvalidValueError(e.to_string()))?;
        Ok(Discretization {
            nodes,
            sqrt_weights: Array1::from_vec(sqrt_weights),
        })
    }

    /// Computes the decomposition
    pub fn run(&self) -> Result<KarhunenLoeveResult<F, B, Cov>> {
        let Discretization {
            nodes,
            sqrt_weights,
        } = self.discretize()?;
        let n = nodes.nrows();
        let covariance = &self.params.covariance;
        let basis = &self.params.basis;
        let k = covariance.output_dimension();

        // basis values scaled by the square roots of the weights (n, p)
        let mut theta = basis.value(&nodes);
        let p = theta.ncols();
        if p == 0 {
            return Err(KlError::InvalidValueError(
                "the basis must contain at least one function".to_string(),
            ));
        }
        theta
            .axis_iter_mut(Axis(0))
            .zip(sqrt_weights.iter())
            .for_each(|(mut row, &w)| row.mapv_inplace(|v| v * w));

        // omega (n * k, p * k): entry (i * k + c, q * k + c) = theta[i, q]
        let mut omega = Array2::<F>::zeros((n * k, p * k));
        for c in 0..k {
            omega.slice_mut(s![c..;k, c..;k]).assign(&theta);
        }

        let mut gram = omega.t().dot(&omega);
        gram.diag_mut()
            .mapv_inplace(|v| v + self.params.regularization);
        let lchol = regularized_cholesky(&gram, &RegularizationParams::default()).ok_or_else(
            || {
                KlError::InvalidValueError(
                    "Gram matrix of the basis is not positive definite".to_string(),
                )
            },
        )?;

        let mut weighted = covariance.discretize(&nodes);
        let mut wk = Array1::<F>::zeros(n * k);
        for (i, &w) in sqrt_weights.iter().enumerate() {
            wk.slice_mut(s![i * k..(i + 1) * k]).fill(w);
        }
        for (mut row, &wi) in weighted.rows_mut().into_iter().zip(wk.iter()) {
            row.zip_mut_with(&wk, |v, &wj| *v = *v * wi * wj);
        }
        let reduced = omega.t().dot(&weighted.dot(&omega));

        // A = L^{-1} C' L^{-T}
        let half = lchol.solve_triangular(&reduced, UPLO::Lower)?;
        let a = lchol.solve_triangular(&half.t().to_owned(), UPLO::Lower)?;
        let a = (&a + &a.t()) * F::cast(0.5);
        let (values, vectors) = a.eigh_into()?;

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&i, &j| {
            values[j]
                .partial_cmp(&values[i])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let eigenvalues: Array1<F> = order.iter().map(|&i| values[i].max(F::zero())).collect();
        let beta = vectors.select(Axis(1), &order);
        let alpha = lchol.t().solve_triangular(&beta, UPLO::Upper)?;

        let total = eigenvalues.sum();
        let target = (F::one() - self.params.threshold) * total;
        let cap = self.params.max_modes.unwrap_or(usize::MAX);
        let mut n_modes = 0;
        let mut cumulated = F::zero();
        while n_modes < eigenvalues.len() && n_modes < cap && cumulated < target {
            cumulated += eigenvalues[n_modes];
            n_modes += 1;
        }
        if n_modes == 0 {
            warn!("Karhunen-Loeve decomposition retains no mode (total variance {total})");
        }
        let selection_ratio = if total > F::zero() {
            cumulated / total
        } else {
            F::one()
        };
        info!(
            "Karhunen-Loeve decomposition: {n_modes} modes out of {} retained, selection ratio {selection_ratio}",
            eigenvalues.len()
        );

        let unscaled = basis.value(&nodes);
        let mut modes = Vec::with_capacity(n_modes);
        let mut modes_as_sample = Vec::with_capacity(n_modes);
        let mut projection = Array2::<F>::zeros((n_modes, n * k));
        for j in 0..n_modes {
            let mut coefficients = alpha.column(j).to_owned();
            let mut scaled = omega.dot(&coefficients);
            let norm = scaled.dot(&scaled).sqrt();
            if norm > F::zero() {
                let sign = if scaled[0] < F::zero() { -F::one() } else { F::one() };
                coefficients.mapv_inplace(|v| v * sign / norm);
                scaled.mapv_inplace(|v| v * sign / norm);
            }
            // coefficient q * k + c goes to (q, c)
            let coefficients = coefficients
                .into_shape((p, k))
                .map_err(|e| KlError::InvalidValueError(e.to_string()))?;
            modes_as_sample.push(unscaled.dot(&coefficients));
            modes.push(KlMode::new(basis.clone(), coefficients));

            let factor = if eigenvalues[j] > F::zero() {
                F::one() / eigenvalues[j].sqrt()
            } else {
                F::zero()
            };
            let mut row = projection.row_mut(j);
            row.assign(&(&wk * &scaled));
            row.mapv_inplace(|v| v * factor);
        }

        Ok(KarhunenLoeveResult {
            covariance: covariance.clone(),
            threshold: self.params.threshold,
            eigenvalues: eigenvalues.slice(s![..n_modes]).to_owned(),
            modes,
            mesh: nodes,
            modes_as_sample,
            projection,
            selection_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoxDomain, LevelSetDomain};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use linfa::ParamGuard;
    use ndarray::{array, ArrayView1};
    use uqbox_doe::{GaussProductExperiment, LhsExperiment, LhsKind, MonteCarloExperiment};
    use uqbox_gp::{LegendreBasis, SquaredExponential, UserDefinedCovariance};

    fn legendre(degree: usize, bounds: &Array2<f64>) -> LegendreBasis<f64> {
        LegendreBasis::new(degree).with_bounds(bounds).unwrap()
    }

    #[test]
    fn test_rank_one_kernel() {
        let _ = env_logger::builder().is_test(true).try_init();
        let bounds = array![[0., 1.]];
        for threshold in [1e-6, 0.01, 0.5] {
            let params = KarhunenLoeveQuadratureAlgorithm::params(
                BoxDomain::new(&bounds).unwrap(),
                UserDefinedCovariance::<f64>::scalar(1, |s, t| s[0] * t[0]),
                GaussProductExperiment::new(&bounds, &[10]),
                legendre(3, &bounds),
            )
            .threshold(threshold)
            .check()
            .unwrap();
            let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
            assert_eq!(result.n_modes(), 1);
            assert_relative_eq!(result.eigenvalues()[0], 1. / 3., max_relative = 1e-10);
            // phi(s) = sqrt(3) s
            let value = result.mode_value(0, &array![[0.5]]).unwrap();
            assert_abs_diff_eq!(value[[0, 0]], 3f64.sqrt() / 2., epsilon = 1e-8);
            assert_relative_eq!(result.selection_ratio(), 1., max_relative = 1e-10);
        }
    }

    #[test]
    fn test_rank_two_separable_kernel() {
        let bounds = array![[0., 1.]];
        // 2 * 1 * 1 + 0.5 * phi2(s) phi2(t) with phi2(s) = sqrt(3) (2 s - 1)
        let kernel = |s: &ArrayView1<f64>, t: &ArrayView1<f64>| {
            2. + 1.5 * (2. * s[0] - 1.) * (2. * t[0] - 1.)
        };
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            UserDefinedCovariance::<f64>::scalar(1, kernel),
            GaussProductExperiment::new(&bounds, &[8]),
            legendre(4, &bounds),
        )
        .threshold(1e-8);
        let result = KarhunenLoeveQuadratureAlgorithm::new(params.clone().check().unwrap())
            .run()
            .unwrap();
        assert_eq!(result.n_modes(), 2);
        assert_abs_diff_eq!(result.eigenvalues(), &array![2., 0.5], epsilon = 1e-10);
        assert_eq!(result.projection_matrix().dim(), (2, 8));
        assert_eq!(result.modes_as_sample().len(), 2);
        // both modes retained: the variance is the one of the kernel
        let x = array![[0.], [0.3], [1.]];
        let expected = x.mapv(|v| 2. + 1.5 * (2. * v - 1.) * (2. * v - 1.));
        assert_abs_diff_eq!(result.variance(&x), expected, epsilon = 1e-8);

        let result = KarhunenLoeveQuadratureAlgorithm::new(params.max_modes(1).check().unwrap())
            .run()
            .unwrap();
        assert_eq!(result.n_modes(), 1);
        assert_relative_eq!(result.selection_ratio(), 0.8, max_relative = 1e-10);
    }

    #[test]
    fn test_box_2d_product_kernel() {
        let bounds = array![[0., 1.], [0., 1.]];
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            UserDefinedCovariance::<f64>::scalar(2, |s, t| s[0] * t[0] * s[1] * t[1]),
            GaussProductExperiment::new(&bounds, &[5, 5]),
            legendre(2, &bounds),
        )
        .threshold(1e-3)
        .check()
        .unwrap();
        let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
        assert_eq!(result.n_modes(), 1);
        assert_relative_eq!(result.eigenvalues()[0], 1. / 9., max_relative = 1e-10);
        assert_eq!(result.mesh().dim(), (25, 2));
    }

    #[test]
    fn test_centered_lhs_experiment() {
        // midpoint rule: eigenvalue int t^2 dt up to O(1 / n^2)
        let bounds = array![[0., 1.]];
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            UserDefinedCovariance::<f64>::scalar(1, |s, t| s[0] * t[0]),
            LhsExperiment::new(&bounds, 200, 0).kind(LhsKind::Centered),
            legendre(2, &bounds),
        )
        .threshold(1e-6)
        .check()
        .unwrap();
        let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
        assert_eq!(result.n_modes(), 1);
        assert_relative_eq!(result.eigenvalues()[0], 1. / 3., max_relative = 1e-4);
    }

    #[test]
    fn test_spectrum_truncation() {
        let bounds = array![[-1., 1.]];
        let threshold = 1e-3;
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            SquaredExponential::new(array![0.5], array![1.]).unwrap(),
            GaussProductExperiment::new(&bounds, &[30]),
            legendre(12, &bounds),
        )
        .threshold(threshold)
        .check()
        .unwrap();
        let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
        let eigenvalues = result.eigenvalues();
        assert!(result.n_modes() > 1 && result.n_modes() < 13);
        assert!(eigenvalues.iter().all(|&v| v >= 0.));
        assert!(eigenvalues
            .windows(2)
            .into_iter()
            .all(|w| w[0] >= w[1]));
        assert!(result.selection_ratio() >= 1. - threshold);
        // the trace of the operator is the integral of the variance
        assert!(result.retained_variance() <= 2. + 1e-8);
        assert_eq!(result.projection_matrix().nrows(), result.n_modes());
    }

    #[test]
    fn test_project_lift_round_trip() {
        let bounds = array![[0., 1.]];
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            SquaredExponential::new(array![0.3], array![1.5]).unwrap(),
            GaussProductExperiment::new(&bounds, &[25]),
            legendre(8, &bounds),
        )
        .threshold(1e-4)
        .check()
        .unwrap();
        let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
        for j in 0..result.n_modes() {
            let mut xi = Array1::zeros(result.n_modes());
            xi[j] = 1.;
            let values = result.lift(&xi).unwrap();
            let back = result.project(&values).unwrap();
            assert_abs_diff_eq!(back, xi, epsilon = 1e-6);
        }
        let xi = Array1::linspace(-1., 1., result.n_modes());
        let field = result.lift_function(&xi, result.mesh()).unwrap();
        assert_abs_diff_eq!(field, result.lift(&xi).unwrap(), epsilon = 1e-10);
        assert!(result.lift(&array![1.]).is_err() || result.n_modes() == 1);
    }

    #[test]
    fn test_multi_output_blocks() {
        let bounds = array![[0., 1.]];
        let basis = legendre(6, &bounds);
        let experiment = GaussProductExperiment::new(&bounds, &[15]);
        let scalar = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            SquaredExponential::new(array![1.], array![1.]).unwrap(),
            experiment.clone(),
            basis.clone(),
        )
        .max_modes(1)
        .check()
        .unwrap();
        let scalar = KarhunenLoeveQuadratureAlgorithm::new(scalar).run().unwrap();

        let vector = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            SquaredExponential::new(array![1.], array![1., 2.]).unwrap(),
            experiment,
            basis,
        )
        .max_modes(2)
        .check()
        .unwrap();
        let vector = KarhunenLoeveQuadratureAlgorithm::new(vector).run().unwrap();
        // independent outputs: the leading mode is the one of the second output
        assert_relative_eq!(
            vector.eigenvalues()[0],
            4. * scalar.eigenvalues()[0],
            max_relative = 1e-8
        );
        assert_relative_eq!(
            vector.eigenvalues()[1],
            scalar.eigenvalues()[0],
            max_relative = 1e-8
        );
        assert_eq!(vector.projection_matrix().dim(), (2, 30));
        let leading = &vector.modes_as_sample()[0];
        assert_abs_diff_eq!(leading.column(0).mapv(f64::abs).sum(), 0., epsilon = 1e-8);
    }

    #[test]
    fn test_level_set_domain() {
        let bounds = array![[-1., 1.], [-1., 1.]];
        let disk = LevelSetDomain::new(|x: &ArrayView1<f64>| x.dot(x), 1., &bounds).unwrap();
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            disk,
            SquaredExponential::new(array![1., 1.], array![1.]).unwrap(),
            MonteCarloExperiment::new(&array![[0., 1.], [0., 1.]], 400, 42),
            legendre(3, &bounds),
        )
        .threshold(1e-2)
        .check()
        .unwrap();
        let result = KarhunenLoeveQuadratureAlgorithm::new(params).run().unwrap();
        let n = result.mesh().nrows();
        assert!(n > 250 && n < 400);
        assert!(result
            .mesh()
            .rows()
            .into_iter()
            .all(|x| x.dot(&x) <= 1.));
        // trace of the operator is the area of the disk
        assert!(result.retained_variance() <= std::f64::consts::PI * 1.1);
        let coefficients = result.project_function(|x| array![x[0] + x[1]]).unwrap();
        assert_eq!(coefficients.len(), result.n_modes());
    }

    #[test]
    fn test_empty_discretization() {
        let bounds = array![[-1., 1.]];
        let nowhere = LevelSetDomain::new(|_: &ArrayView1<f64>| 1., 0., &bounds).unwrap();
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            nowhere,
            SquaredExponential::new(array![1.], array![1.]).unwrap(),
            GaussProductExperiment::new(&bounds, &[5]),
            legendre(2, &bounds),
        )
        .check()
        .unwrap();
        let res = KarhunenLoeveQuadratureAlgorithm::new(params).run();
        assert!(matches!(res, Err(KlError::EmptyDiscretization)));
    }

    /// An experiment whose rule cannot be computed
    #[derive(Clone)]
    struct BrokenRule;

    impl WeightedExperiment<f64> for BrokenRule {
        fn distribution_bounds(&self) -> Array2<f64> {
            array![[0., 1.]]
        }

        fn pdf(&self, _x: &ArrayView1<f64>) -> f64 {
            1.
        }

        fn size(&self) -> usize {
            4
        }

        fn generate_with_weights(&self) -> uqbox_doe::Result<(Array2<f64>, Array1<f64>)> {
            Err(linfa_linalg::LinalgError::NotThin { rows: 0, cols: 1 }.into())
        }
    }

    #[test]
    fn test_experiment_failure_is_reported() {
        let bounds = array![[0., 1.]];
        let params = KarhunenLoeveQuadratureAlgorithm::params(
            BoxDomain::new(&bounds).unwrap(),
            SquaredExponential::new(array![1.], array![1.]).unwrap(),
            BrokenRule,
            legendre(2, &bounds),
        )
        .check()
        .unwrap();
        let res = KarhunenLoeveQuadratureAlgorithm::new(params).run();
        assert!(matches!(res, Err(KlError::DoeError(_))));
    }
}
