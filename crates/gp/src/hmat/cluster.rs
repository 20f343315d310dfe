use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix2};

/// A node of the geometric cluster tree: the points at positions `start..end`
/// of the permuted ordering together with their bounding box.
#[derive(Clone, Debug)]
pub(crate) struct Cluster<F: Float> {
    pub start: usize,
    pub end: usize,
    lower: Array1<F>,
    upper: Array1<F>,
    pub children: Option<Box<[Cluster<F>; 2]>>,
}

impl<F: Float> Cluster<F> {
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Diagonal length of the bounding box
    pub fn diameter(&self) -> F {
        (&self.upper - &self.lower)
            .mapv(|v| v * v)
            .sum()
            .sqrt()
    }

    /// Euclidean distance between the bounding boxes
    pub fn distance(&self, other: &Cluster<F>) -> F {
        let mut d2 = F::zero();
        for l in 0..self.lower.len() {
            let gap = (other.lower[l] - self.upper[l])
                .max(self.lower[l] - other.upper[l])
                .max(F::zero());
            d2 += gap * gap;
        }
        d2.sqrt()
    }

    /// Standard admissibility condition `min(diam(t), diam(s)) <= eta * dist(t, s)`
    pub fn is_admissible(&self, other: &Cluster<F>, eta: F) -> bool {
        let dist = self.distance(other);
        dist > F::zero() && self.diameter().min(other.diameter()) <= eta * dist
    }
}

/// Binary cluster tree obtained by recursive median bisection along the widest
/// axis of the bounding box.
#[derive(Clone, Debug)]
pub(crate) struct ClusterTree<F: Float> {
    /// `permutation[new position] = original point index`
    pub permutation: Vec<usize>,
    pub root: Cluster<F>,
}

impl<F: Float> ClusterTree<F> {
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>, leaf_size: usize) -> Self {
        let mut permutation: Vec<usize> = (0..x.nrows()).collect();
        let root = bisect(x, &mut permutation, 0, leaf_size.max(1));
        ClusterTree { permutation, root }
    }
}

fn bisect<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    indices: &mut [usize],
    offset: usize,
    leaf_size: usize,
) -> Cluster<F> {
    let nx = x.ncols();
    let mut lower = Array1::from_elem(nx, F::infinity());
    let mut upper = Array1::from_elem(nx, F::neg_infinity());
    for &i in indices.iter() {
        for l in 0..nx {
            lower[l] = lower[l].min(x[[i, l]]);
            upper[l] = upper[l].max(x[[i, l]]);
        }
    }
    let mut cluster = Cluster {
        start: offset,
        end: offset + indices.len(),
        lower,
        upper,
        children: None,
    };
    if indices.len() <= leaf_size || cluster.diameter() <= F::zero() {
        return cluster;
    }
    let widths = &cluster.upper - &cluster.lower;
    let axis = widths
        .iter()
        .enumerate()
        .fold((0, F::neg_infinity()), |best, (l, &w)| {
            if w > best.1 {
                (l, w)
            } else {
                best
            }
        })
        .0;
    indices.sort_by(|&a, &b| {
        x[[a, axis]]
            .partial_cmp(&x[[b, axis]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mid = indices.len() / 2;
    let (left, right) = indices.split_at_mut(mid);
    let first = bisect(x, left, offset, leaf_size);
    let second = bisect(x, right, offset + mid, leaf_size);
    cluster.children = Some(Box::new([first, second]));
    cluster
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_bisection() {
        let x = Array::linspace(1., 0., 10).insert_axis(ndarray::Axis(1));
        let tree = ClusterTree::new(&x, 3);
        let mut sorted = tree.permutation.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
        // points are decreasing so the first half holds the last indices
        let children = tree.root.children.as_ref().unwrap();
        assert_eq!(children[0].size(), 5);
        assert!(tree.permutation[..5].iter().all(|&i| i >= 5));
        assert!(!children[0].is_admissible(&children[1], 2.));
        let grand = children[0].children.as_ref().unwrap();
        assert!(grand.iter().all(|c| c.is_leaf() && c.size() <= 3));
    }

    #[test]
    fn test_admissibility() {
        let x = array![[0f64, 0.], [0.1, 0.], [5., 0.], [5.1, 0.]];
        let tree = ClusterTree::new(&x, 2);
        let children = tree.root.children.as_ref().unwrap();
        let distance: f64 = children[0].distance(&children[1]);
        assert!((distance - 4.9).abs() < 1e-12);
        assert!(children[0].is_admissible(&children[1], 1.));
        assert!(!tree.root.is_admissible(&tree.root, 1.));
    }
}
