use crate::errors::Result;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView1};

/// Sampling method allowing to generate a DoE in a given sample space
///
/// The sample space is the box `[lower_bound_xi, upper_bound_xi]^nx` where `nx`
/// is the dimension of the samples.
pub trait SamplingMethod<F: Float> {
    /// Returns the bounds of the sample space as a (nx, 2) matrix
    fn sampling_space(&self) -> &Array2<F>;

    /// Generates a (ns, nx)-shaped array of samples belonging to `[0., 1.]^nx`
    fn normalized_sample(&self, ns: usize) -> Array2<F>;

    /// Generates a (ns, nx)-shaped array of samples belonging to the sample space
    fn sample(&self, ns: usize) -> Array2<F> {
        let xlimits = self.sampling_space();
        let lower = xlimits.column(0);
        let scaler = &xlimits.column(1) - &lower;
        self.normalized_sample(ns) * scaler + lower
    }
}

/// A weighted experiment produces nodes and weights approximating integrals
/// `∫ f(x) p(x) dx ≈ Σ w_i f(x_i)` where `p` is the density of the sampling
/// distribution of the experiment.
pub trait WeightedExperiment<F: Float> {
    /// Bounding box of the sampling distribution as a (nx, 2) matrix
    fn distribution_bounds(&self) -> Array2<F>;

    /// Density of the sampling distribution at `x`
    fn pdf(&self, x: &ArrayView1<F>) -> F;

    /// Number of nodes generated by [WeightedExperiment::generate_with_weights]
    fn size(&self) -> usize;

    /// Generates a (size, nx) array of nodes and their weights
    fn generate_with_weights(&self) -> Result<(Array2<F>, Array1<F>)>;
}
