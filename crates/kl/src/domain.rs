//! Domains over which the covariance operator is decomposed.

use crate::errors::{KlError, Result};
use linfa::Float;
use ndarray::{Array2, ArrayBase, ArrayView1, Data, Ix2};
use std::fmt;
use std::sync::Arc;

/// A bounded subset of `R^nx`
pub trait Domain<F: Float>: Clone + Send + Sync {
    /// Dimension `nx` of the points
    fn dimension(&self) -> usize;

    /// Smallest box containing the domain as a `(nx, 2)` matrix
    fn bounding_box(&self) -> Array2<F>;

    /// Whether `x` belongs to the domain
    fn contains(&self, x: &ArrayView1<F>) -> bool;
}

fn check_box<F: Float>(bounds: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
    if bounds.ncols() != 2 || bounds.nrows() == 0 {
        return Err(KlError::InvalidValueError(format!(
            "Expected (nx, 2) bounds, got {:?}",
            bounds.dim()
        )));
    }
    if bounds
        .rows()
        .into_iter()
        .any(|r| !(r[0] < r[1]) || !r[0].is_finite() || !r[1].is_finite())
    {
        return Err(KlError::InvalidValueError(format!(
            "Bounds must be finite with lower < upper, got {bounds}"
        )));
    }
    Ok(())
}

/// The box `[lower_j, upper_j]^nx`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxDomain<F: Float> {
    bounds: Array2<F>,
}

impl<F: Float> BoxDomain<F> {
    /// Constructor given `(nx, 2)` bounds
    pub fn new(bounds: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Self> {
        check_box(bounds)?;
        Ok(BoxDomain {
            bounds: bounds.to_owned(),
        })
    }
}

impl<F: Float> Domain<F> for BoxDomain<F> {
    fn dimension(&self) -> usize {
        self.bounds.nrows()
    }

    fn bounding_box(&self) -> Array2<F> {
        self.bounds.to_owned()
    }

    fn contains(&self, x: &ArrayView1<F>) -> bool {
        self.bounds
            .rows()
            .into_iter()
            .zip(x.iter())
            .all(|(r, &v)| r[0] <= v && v <= r[1])
    }
}

impl<F: Float> fmt::Display for BoxDomain<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Box({})", self.bounds)
    }
}

type LevelFunction<F> = Arc<dyn Fn(&ArrayView1<F>) -> F + Send + Sync>;

/// The points of a bounding box where a function is lower than or equal to a level
#[derive(Clone)]
pub struct LevelSetDomain<F: Float> {
    function: LevelFunction<F>,
    level: F,
    bounds: Array2<F>,
}

impl<F: Float> LevelSetDomain<F> {
    /// Constructor of `{x in bounds, function(x) <= level}`
    pub fn new(
        function: impl Fn(&ArrayView1<F>) -> F + Send + Sync + 'static,
        level: F,
        bounds: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Self> {
        check_box(bounds)?;
        Ok(LevelSetDomain {
            function: Arc::new(function),
            level,
            bounds: bounds.to_owned(),
        })
    }
}

impl<F: Float> Domain<F> for LevelSetDomain<F> {
    fn dimension(&self) -> usize {
        self.bounds.nrows()
    }

    fn bounding_box(&self) -> Array2<F> {
        self.bounds.to_owned()
    }

    fn contains(&self, x: &ArrayView1<F>) -> bool {
        let inside = self
            .bounds
            .rows()
            .into_iter()
            .zip(x.iter())
            .all(|(r, &v)| r[0] <= v && v <= r[1]);
        inside && (self.function)(x) <= self.level
    }
}

impl<F: Float> fmt::Display for LevelSetDomain<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LevelSet(level={}, box={})", self.level, self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_box_domain() {
        let domain = BoxDomain::new(&array![[0., 1.], [-1., 1.]]).unwrap();
        assert_eq!(domain.dimension(), 2);
        assert!(domain.contains(&array![0.5, -1.].view()));
        assert!(!domain.contains(&array![1.5, 0.].view()));
        assert!(BoxDomain::new(&array![[1., 0.]]).is_err());
    }

    #[test]
    fn test_level_set_domain() {
        let disk = LevelSetDomain::new(
            |x: &ArrayView1<f64>| x.dot(x),
            1.,
            &array![[-1., 1.], [-1., 1.]],
        )
        .unwrap();
        assert!(disk.contains(&array![0.5, 0.5].view()));
        assert!(!disk.contains(&array![0.9, 0.9].view()));
        assert_eq!(disk.bounding_box(), array![[-1., 1.], [-1., 1.]]);
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_serde_box_domain() {
        let domain = BoxDomain::new(&array![[0., 1.], [-2., 2.]]).unwrap();
        let json = serde_json::to_string(&domain).unwrap();
        let back: BoxDomain<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, domain);
    }
}
