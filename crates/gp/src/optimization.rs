//! Optimizers of the covariance hyperparameters.
//!
//! All of them minimize a function over the unit hypercube `[0, 1]^d`, the
//! hyperparameters box being mapped onto it by the caller.

use crate::errors::{GpError, Result};
use log::{debug, warn};
use ndarray::{arr1, Array1, Array2};
use rand_xoshiro::Xoshiro256Plus;
use uqbox_doe::{Lhs, LhsKind, SamplingMethod};

use ndarray_rand::rand::SeedableRng;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Parameters of the Cobyla local optimizer
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct CobylaParams {
    /// Initial trust region radius (in the unit hypercube)
    pub rhobeg: f64,
    /// Relative tolerance on the objective value
    pub ftol_rel: f64,
    /// Maximal number of objective evaluations
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Strategy used to optimize the covariance hyperparameters
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum HyperOptimizer {
    /// Cobyla local optimization from the starting point
    Cobyla(CobylaParams),
    /// Best point of a maximin LHS design, the starting point is not used
    LhsSearch {
        /// Size of the design
        n_points: usize,
        /// Seed of the design generator
        seed: u64,
    },
    /// Cobyla runs from the starting point and from the points of a maximin LHS design
    MultiStart {
        /// Number of additional starting points
        n_start: usize,
        /// Parameters of each local optimization
        cobyla: CobylaParams,
        /// Seed of the design generator
        seed: u64,
    },
}

impl Default for HyperOptimizer {
    fn default() -> Self {
        HyperOptimizer::Cobyla(CobylaParams::default())
    }
}

/// Point retained by an optimizer
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub x: Array1<f64>,
    pub value: f64,
}

fn best(candidates: Vec<Candidate>) -> Result<Candidate> {
    candidates
        .into_iter()
        .filter(|c| !c.value.is_nan())
        .min_by(|a, b| a.value.total_cmp(&b.value))
        .ok_or_else(|| {
            GpError::OptimizationError("optimizer returned no candidate point".to_string())
        })
}

fn lhs_points(dim: usize, n_points: usize, seed: u64) -> Array2<f64> {
    let mut xlimits = Array2::zeros((dim, 2));
    xlimits.column_mut(1).fill(1.);
    Lhs::new(&xlimits)
        .kind(LhsKind::Maximin)
        .with_rng(Xoshiro256Plus::seed_from_u64(seed))
        .sample(n_points)
}

impl HyperOptimizer {
    /// Minimizes `objective` over `[0, 1]^d` starting from `x0`
    pub(crate) fn minimize(
        &self,
        objective: impl Fn(&[f64]) -> f64,
        x0: &Array1<f64>,
    ) -> Result<Candidate> {
        let dim = x0.len();
        match self {
            HyperOptimizer::Cobyla(params) => {
                debug!("Cobyla optimization in dimension {dim}");
                best(optimize_params(&objective, x0, params).into_iter().collect())
            }
            HyperOptimizer::LhsSearch { n_points, seed } => {
                debug!("LHS search of {n_points} points in dimension {dim}");
                let points = lhs_points(dim, *n_points, *seed);
                let candidates = points
                    .rows()
                    .into_iter()
                    .map(|p| {
                        let x = p.to_owned();
                        let value = objective(&x.to_vec());
                        Candidate { x, value }
                    })
                    .collect();
                best(candidates)
            }
            HyperOptimizer::MultiStart {
                n_start,
                cobyla,
                seed,
            } => {
                debug!("Multistart Cobyla optimization ({n_start} + 1 starts) in dimension {dim}");
                let starts = lhs_points(dim, *n_start, *seed);
                let candidates = std::iter::once(x0.to_owned())
                    .chain(starts.rows().into_iter().map(|r| r.to_owned()))
                    .filter_map(|start| optimize_params(&objective, &start, cobyla))
                    .collect();
                best(candidates)
            }
        }
    }
}

/// Optimize given an initial guess in the unit hypercube with NLOPT::Cobyla
#[cfg(feature = "nlopt")]
pub(crate) fn optimize_params(
    objective: &impl Fn(&[f64]) -> f64,
    x0: &Array1<f64>,
    cobyla: &CobylaParams,
) -> Option<Candidate> {
    use nlopt::*;

    let dim = x0.len();
    let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| objective(x);
    let mut optimizer = Nlopt::new(Algorithm::Cobyla, dim, objfn, Target::Minimize, ());
    let mut x = x0.to_vec();
    optimizer.set_lower_bounds(&vec![0.; dim]).ok()?;
    optimizer.set_upper_bounds(&vec![1.; dim]).ok()?;
    optimizer.set_initial_step1(cobyla.rhobeg).ok()?;
    optimizer.set_maxeval(cobyla.maxeval as u32).ok()?;
    optimizer.set_ftol_rel(cobyla.ftol_rel).ok()?;

    match optimizer.optimize(&mut x) {
        Ok((_, fmin)) => Some(Candidate {
            x: arr1(&x),
            value: fmin,
        }),
        Err((status, fmin)) => {
            warn!("Nlopt Cobyla optimizer failed status={status:?}");
            (!fmin.is_nan()).then(|| Candidate {
                x: arr1(&x),
                value: fmin,
            })
        }
    }
}

/// Optimize given an initial guess in the unit hypercube with cobyla
#[cfg(not(feature = "nlopt"))]
pub(crate) fn optimize_params(
    objective: &impl Fn(&[f64]) -> f64,
    x0: &Array1<f64>,
    cobyla: &CobylaParams,
) -> Option<Candidate> {
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let bounds = vec![(0., 1.); x0.len()];

    match minimize(
        |x: &[f64], _u: &mut ()| objective(x),
        x0.as_slice()?,
        &bounds,
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => Some(Candidate {
            x: arr1(&x_opt),
            value: fval,
        }),
        Err((status, x_opt, fval)) => {
            warn!("Cobyla optimizer failed status={status:?}");
            (!fval.is_nan()).then(|| Candidate {
                x: arr1(&x_opt),
                value: fval,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 0.3).powi(2) + (x[1] - 0.7).powi(2)
    }

    #[test]
    fn test_cobyla() {
        let params = CobylaParams {
            ftol_rel: 1e-10,
            maxeval: 500,
            ..CobylaParams::default()
        };
        let res = HyperOptimizer::Cobyla(params)
            .minimize(quadratic, &array![0.5, 0.5])
            .unwrap();
        assert_abs_diff_eq!(res.x, array![0.3, 0.7], epsilon = 1e-3);
    }

    #[test]
    fn test_lhs_search() {
        let res = HyperOptimizer::LhsSearch {
            n_points: 50,
            seed: 42,
        }
        .minimize(quadratic, &array![0.5, 0.5])
        .unwrap();
        assert!(res.value < 0.05);
        assert!(res.x.iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_multistart_and_no_candidate() {
        let res = HyperOptimizer::MultiStart {
            n_start: 3,
            cobyla: CobylaParams::default(),
            seed: 42,
        }
        .minimize(quadratic, &array![0., 0.])
        .unwrap();
        assert!(res.value < 1e-3);

        let res = HyperOptimizer::LhsSearch {
            n_points: 5,
            seed: 0,
        }
        .minimize(|_| f64::NAN, &array![0.5]);
        assert!(matches!(res, Err(GpError::OptimizationError(_))));
    }
}
