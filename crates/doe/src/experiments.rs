use crate::errors::Result;
use crate::quadrature::uniform_pdf;
use crate::{Lhs, LhsKind, Random, SamplingMethod, WeightedExperiment};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};
use ndarray_rand::rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

/// Equally weighted experiment made of `size` points of a sampling method.
///
/// The sampling distribution is the uniform distribution over the sampling space.
#[derive(Clone, Debug)]
pub struct SamplingExperiment<F: Float, S: SamplingMethod<F>> {
    sampling: S,
    size: usize,
    phantom: std::marker::PhantomData<F>,
}

/// Monte Carlo experiment: uniform random points with weights `1/size`
pub type MonteCarloExperiment<F, R = Xoshiro256Plus> = SamplingExperiment<F, Random<F, R>>;

/// Latin hypercube experiment: LHS points with weights `1/size`
pub type LhsExperiment<F, R = Xoshiro256Plus> = SamplingExperiment<F, Lhs<F, R>>;

impl<F: Float, S: SamplingMethod<F>> SamplingExperiment<F, S> {
    /// Wraps a sampling method drawing `size` points
    pub fn from_sampling(sampling: S, size: usize) -> Self {
        SamplingExperiment {
            sampling,
            size,
            phantom: std::marker::PhantomData,
        }
    }
}

impl<F: Float> MonteCarloExperiment<F> {
    /// Monte Carlo experiment over a (nx, 2) box with a seeded generator
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, size: usize, seed: u64) -> Self {
        Self::from_sampling(Random::seeded(xlimits, seed), size)
    }
}

impl<F: Float> LhsExperiment<F> {
    /// Maximin LHS experiment over a (nx, 2) box with a seeded generator
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, size: usize, seed: u64) -> Self {
        Self::from_sampling(Lhs::seeded(xlimits, seed).kind(LhsKind::Maximin), size)
    }
}

impl<F: Float, R: Rng> SamplingExperiment<F, Lhs<F, R>> {
    /// Sets how the points are placed within their strata
    pub fn kind(self, kind: LhsKind) -> Self {
        SamplingExperiment::from_sampling(self.sampling.kind(kind), self.size)
    }
}

impl<F: Float, R: Rng> SamplingExperiment<F, Random<F, R>> {
    /// Sets the random generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> SamplingExperiment<F, Random<F, R2>> {
        SamplingExperiment::from_sampling(self.sampling.with_rng(rng), self.size)
    }
}

impl<F: Float, S: SamplingMethod<F>> WeightedExperiment<F> for SamplingExperiment<F, S> {
    fn distribution_bounds(&self) -> Array2<F> {
        self.sampling.sampling_space().to_owned()
    }

    fn pdf(&self, x: &ArrayView1<F>) -> F {
        uniform_pdf(self.sampling.sampling_space(), x)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn generate_with_weights(&self) -> Result<(Array2<F>, Array1<F>)> {
        let nodes = self.sampling.sample(self.size);
        let weights = Array1::from_elem(self.size, F::one() / F::cast(self.size.max(1)));
        Ok((nodes, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Axis};

    #[test]
    fn test_monte_carlo_mean() {
        let xlimits = arr2(&[[0., 2.]]);
        let experiment = MonteCarloExperiment::new(&xlimits, 4000, 42);
        let (nodes, weights) = experiment.generate_with_weights().unwrap();
        assert_eq!(nodes.nrows(), 4000);
        assert_abs_diff_eq!(weights.sum(), 1., epsilon = 1e-10);
        let mean = nodes.column(0).dot(&weights);
        assert_abs_diff_eq!(mean, 1., epsilon = 5e-2);
        assert_abs_diff_eq!(experiment.pdf(&nodes.row(0)), 0.5);
    }

    #[test]
    fn test_lhs_experiment() {
        let xlimits = arr2(&[[0., 1.], [0., 1.]]);
        let experiment = LhsExperiment::new(&xlimits, 20, 0);
        let (nodes, weights) = experiment.generate_with_weights().unwrap();
        let mean = nodes.t().dot(&weights);
        assert_abs_diff_eq!(mean, ndarray::array![0.5, 0.5], epsilon = 5e-2);
        assert_eq!(nodes.len_of(Axis(0)), experiment.size());
    }

    #[test]
    fn test_centered_lhs_experiment() {
        // midpoints of the strata: the mean is exact
        let xlimits = arr2(&[[0., 2.], [-1., 1.]]);
        let experiment = LhsExperiment::new(&xlimits, 10, 3).kind(LhsKind::Centered);
        let (nodes, weights) = experiment.generate_with_weights().unwrap();
        let mean = nodes.t().dot(&weights);
        assert_abs_diff_eq!(mean, ndarray::array![1., 0.], epsilon = 1e-12);
    }
}
