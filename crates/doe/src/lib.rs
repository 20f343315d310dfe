/*!
This library implements design of experiments used by the uncertainty
quantification algorithms of `uqbox`.

Two families of designs are provided:

* plain sampling methods (see [SamplingMethod]): a set of points spread within a
  box `xlimits` defined as a `(nx, 2)` ndarray of lower and upper bounds,
  namely [Latin Hypercube sampling](crate::Lhs) and [Random sampling](crate::Random),
* weighted experiments (see [WeightedExperiment]): nodes and weights approximating
  integrals against the uniform distribution of a box, namely the
  [Gauss-Legendre tensor product](crate::GaussProductExperiment) and
  Monte Carlo like experiments built on top of sampling methods.

Example:
```
use uqbox_doe::{GaussProductExperiment, Lhs, LhsKind, SamplingMethod, WeightedExperiment};
use ndarray::arr2;

let xlimits = arr2(&[[0., 1.], [-1., 1.]]);
// Five samples using centered Latin Hypercube sampling
let samples = Lhs::new(&xlimits).kind(LhsKind::Centered).sample(5);
// A 4x3 Gauss-Legendre grid with weights summing to one
let (nodes, weights) = GaussProductExperiment::new(&xlimits, &[4, 3])
    .generate_with_weights()
    .expect("Gauss-Legendre rule");
assert_eq!(nodes.nrows(), 12);
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod experiments;
mod lhs;
mod quadrature;
mod random;
mod traits;
mod utils;

pub use errors::*;
pub use experiments::*;
pub use lhs::*;
pub use quadrature::*;
pub use random::*;
pub use traits::*;
