use crate::utils::{check_xlimits, pdist};
use crate::SamplingMethod;
use linfa::Float;
use ndarray::{Array, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{rand::seq::SliceRandom, rand::Rng, rand::SeedableRng, rand_distr::Uniform, RandomExt};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use std::sync::{Arc, RwLock};

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Position of the points within their strata
#[derive(Clone, Debug, Default, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum LhsKind {
    /// uniform draw inside the stratum
    Classic,
    /// midpoint of the stratum, only the pairing of strata is random
    Centered,
    /// classic designs drawn several times, the one with the largest
    /// smallest inter-point distance is kept
    #[default]
    Maximin,
}

/// Latin hypercube sampling of a box.
///
/// With `ns` points, every coordinate axis is cut into `ns` equal strata and
/// each stratum of each axis holds exactly one point.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Lhs<F: Float, R: Rng> {
    /// (nx, 2) box, row `j` holds the bounds of coordinate `j`
    xlimits: Array2<F>,
    kind: LhsKind,
    n_candidates: usize,
    rng: Arc<RwLock<R>>,
}

impl<F: Float> Lhs<F, Xoshiro256Plus> {
    /// Latin hypercube sampling of the `(nx, 2)` box `xlimits` with an entropy seeded generator
    ///
    /// ```
    /// use uqbox_doe::{Lhs, SamplingMethod};
    /// use ndarray::arr2;
    ///
    /// let doe = Lhs::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]])).sample(4);
    /// assert_eq!(doe.dim(), (4, 2));
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::from_entropy())
    }

    /// Latin hypercube sampling of the `(nx, 2)` box `xlimits`, reproducible from `seed`
    pub fn seeded(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, seed: u64) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::seed_from_u64(seed))
    }
}

impl<F: Float, R: Rng> Lhs<F, R> {
    /// Latin hypercube sampling of the `(nx, 2)` box `xlimits` using `rng`
    ///
    /// **Panics** if `xlimits` is not a valid box.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, rng: R) -> Self {
        check_xlimits(xlimits);
        Lhs {
            xlimits: xlimits.to_owned(),
            kind: LhsKind::default(),
            n_candidates: 5,
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// Sets how points are placed within their strata
    pub fn kind(mut self, kind: LhsKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of designs compared by [LhsKind::Maximin]
    pub fn n_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates.max(1);
        self
    }

    /// Same box and kind, another generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Lhs<F, R2> {
        Lhs {
            xlimits: self.xlimits,
            kind: self.kind,
            n_candidates: self.n_candidates,
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// `(ns, nx)` design in the unit cube: one random permutation of the
    /// strata per axis, `centered` placing points at the strata midpoints
    fn latin_design(&self, ns: usize, centered: bool) -> Array2<F> {
        let nx = self.xlimits.nrows();
        let mut rng = self.rng.write().expect("lhs random generator lock");
        let offsets = if centered {
            Array2::from_elem((ns, nx), 0.5)
        } else {
            Array::random_using((ns, nx), Uniform::new(0., 1.), &mut *rng)
        };
        let mut strata: Vec<usize> = (0..ns).collect();
        let mut design = Array2::zeros((ns, nx));
        for (j, mut column) in design.columns_mut().into_iter().enumerate() {
            strata.shuffle(&mut *rng);
            for (i, value) in column.iter_mut().enumerate() {
                *value = F::cast((strata[i] as f64 + offsets[[i, j]]) / ns as f64);
            }
        }
        design
    }

    fn smallest_distance(design: &Array2<F>) -> F {
        pdist(design)
            .min()
            .map(|&d| d)
            .unwrap_or_else(|_| F::infinity())
    }

    fn maximin_design(&self, ns: usize) -> Array2<F> {
        let mut best = self.latin_design(ns, false);
        let mut best_distance = Self::smallest_distance(&best);
        for _ in 1..self.n_candidates {
            let candidate = self.latin_design(ns, false);
            let distance = Self::smallest_distance(&candidate);
            if distance > best_distance {
                best = candidate;
                best_distance = distance;
            }
        }
        best
    }
}

impl<F: Float, R: Rng> SamplingMethod<F> for Lhs<F, R> {
    fn sampling_space(&self) -> &Array2<F> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<F> {
        if ns == 0 {
            return Array2::zeros((0, self.xlimits.nrows()));
        }
        match self.kind {
            LhsKind::Classic => self.latin_design(ns, false),
            LhsKind::Centered => self.latin_design(ns, true),
            LhsKind::Maximin => self.maximin_design(ns),
        }
    }
}
