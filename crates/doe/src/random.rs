use std::sync::{Arc, RwLock};

use crate::utils::check_xlimits;
use crate::SamplingMethod;
use linfa::Float;
use ndarray::{Array, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{rand::Rng, rand::SeedableRng, rand_distr::Uniform, RandomExt};
use rand_xoshiro::Xoshiro256Plus;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Independent uniform draws in a box, the source of Monte Carlo experiments.
///
/// The generator is shared behind a lock: successive calls to
/// [SamplingMethod::sample] continue the same random stream.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Random<F: Float, R: Rng> {
    /// (nx, 2) box, row `j` holds the bounds of coordinate `j`
    xlimits: Array2<F>,
    rng: Arc<RwLock<R>>,
}

impl<F: Float> Random<F, Xoshiro256Plus> {
    /// Uniform draws in the `(nx, 2)` box `xlimits` with an entropy seeded generator
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::from_entropy())
    }

    /// Uniform draws in the `(nx, 2)` box `xlimits`, reproducible from `seed`
    pub fn seeded(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, seed: u64) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::seed_from_u64(seed))
    }
}

impl<F: Float, R: Rng> Random<F, R> {
    /// Uniform draws in the `(nx, 2)` box `xlimits` using `rng`
    ///
    /// **Panics** if `xlimits` is not a valid box.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, rng: R) -> Self {
        check_xlimits(xlimits);
        Random {
            xlimits: xlimits.to_owned(),
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// Same box, another generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Random<F, R2> {
        Random {
            xlimits: self.xlimits,
            rng: Arc::new(RwLock::new(rng)),
        }
    }
}

impl<F: Float, R: Rng> SamplingMethod<F> for Random<F, R> {
    fn sampling_space(&self) -> &Array2<F> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<F> {
        let nx = self.xlimits.nrows();
        let mut rng = self.rng.write().expect("random generator lock");
        Array::random_using((ns, nx), Uniform::new(0., 1.), &mut *rng).mapv(|v| F::cast(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_random_in_bounds() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let doe = Random::seeded(&xlimits, 42).sample(50);
        assert_eq!(doe.dim(), (50, 2));
        assert!(doe.column(0).iter().all(|&v| (5. ..=10.).contains(&v)));
        assert!(doe.column(1).iter().all(|&v| (0. ..=1.).contains(&v)));
    }

    #[test]
    fn test_seeded_stream() {
        let xlimits = arr2(&[[-1., 1.]]);
        let first = Random::seeded(&xlimits, 7).sample(10);
        let again = Random::seeded(&xlimits, 7).sample(10);
        assert_eq!(first, again);

        let random = Random::seeded(&xlimits, 7);
        let _ = random.sample(10);
        assert_ne!(random.sample(10), first);
    }
}
