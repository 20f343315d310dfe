//! Memoization of the reduced log-likelihood.

use crate::errors::Result;
use crate::utils::to_f64;
use linfa::Float;
use ndarray::Array1;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

type ObjectiveFn<'a, F> = dyn FnMut(&Array1<F>) -> Result<F> + 'a;

/// Caches the values of an objective function, keyed by the bit pattern of its input.
///
/// Evaluation goes through a shared reference so that the wrapper can be captured
/// by the `Fn` closures optimizers require. It is not meant to be shared between threads.
pub struct MemoizedObjective<'a, F: Float> {
    function: RefCell<Box<ObjectiveFn<'a, F>>>,
    cache: RefCell<HashMap<Vec<u64>, F>>,
    hits: Cell<usize>,
    evaluations: Cell<usize>,
    last_value: Cell<Option<F>>,
}

impl<'a, F: Float> MemoizedObjective<'a, F> {
    /// Wraps `function`, the cache being empty
    pub fn new(function: impl FnMut(&Array1<F>) -> Result<F> + 'a) -> Self {
        MemoizedObjective {
            function: RefCell::new(Box::new(function)),
            cache: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            evaluations: Cell::new(0),
            last_value: Cell::new(None),
        }
    }

    fn key(x: &Array1<F>) -> Vec<u64> {
        x.iter().map(|&v| to_f64(v).to_bits()).collect()
    }

    /// Cached value at `x`, the function being called only on a cache miss
    pub fn evaluate(&self, x: &Array1<F>) -> Result<F> {
        let key = Self::key(x);
        if let Some(&value) = self.cache.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(value);
        }
        self.call(key, x)
    }

    /// Value at `x` computed by the function whatever the cache content
    pub fn evaluate_uncached(&self, x: &Array1<F>) -> Result<F> {
        self.call(Self::key(x), x)
    }

    fn call(&self, key: Vec<u64>, x: &Array1<F>) -> Result<F> {
        let value = {
            let mut function = self.function.borrow_mut();
            (*function)(x)?
        };
        self.evaluations.set(self.evaluations.get() + 1);
        self.last_value.set(Some(value));
        self.cache.borrow_mut().insert(key, value);
        Ok(value)
    }

    /// Number of calls answered from the cache
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    /// Number of calls of the underlying function
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    /// Value returned by the latest call of the underlying function
    pub fn last_value(&self) -> Option<F> {
        self.last_value.get()
    }
}
