use linfa::Float;
use ndarray::{Array, Array1, ArrayBase, Data, Ix2};
use ndarray_stats::DeviationExt;
use rayon::prelude::*;

/// Computes the pairwise distances between rows of a 2D-array.
/// Distances are not ordered: only use it where order does not matter (e.g. min distance).
pub fn pdist<F: Float>(x: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>) -> Array1<F> {
    let nrows = x.nrows();
    let pairs: Vec<_> = (0..nrows)
        .flat_map(|i| ((i + 1)..nrows).map(move |j| (i, j)))
        .collect();

    let distances: Vec<_> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let d = x.row(i).l2_dist(&x.row(j)).unwrap_or(f64::NAN);
            F::cast(d)
        })
        .collect();

    Array::from_vec(distances)
}

/// Checks the (nx, 2) layout of design space bounds
///
/// **Panics** if xlimits has not 2 columns or if a lower bound is greater than its upper bound
pub(crate) fn check_xlimits<F: Float>(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>) {
    if xlimits.ncols() != 2 {
        panic!("xlimits must have 2 columns (lower, upper)");
    }
    if xlimits.rows().into_iter().any(|r| r[0] > r[1]) {
        panic!("xlimits lower bounds must be less or equal to upper bounds");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pdist() {
        let x = array![[1., 0., 0.], [0., 1., 0.], [0., 2., 0.], [3., 4., 5.]];
        let mut actual: Vec<f64> = pdist(&x).to_vec();
        actual.sort_by(|a, b| a.total_cmp(b));
        let expected = array![1., 1.41421356, 2.23606798, 6.164414, 6.55743852, 6.70820393];
        assert_abs_diff_eq!(Array::from_vec(actual), expected, epsilon = 1e-6);
    }

    #[test]
    #[should_panic]
    fn test_bad_xlimits() {
        check_xlimits(&array![[1., 0.]]);
    }
}
