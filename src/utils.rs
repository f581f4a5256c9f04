use std::collections::VecDeque;

/// Equality over `f64` where NaN equals NaN, for score comparisons.
pub fn f64_eq(f1: f64, f2: f64) -> bool {
    f1 == f2 || (f1.is_nan() && f2.is_nan())
}

/// Track a finite number of the most recently seen items in a stream.
#[derive(Debug, Clone)]
pub struct FiniteHistory<T> {
    size: usize,
    data: VecDeque<T>,
}

impl<T> FiniteHistory<T> {
    /// Create a new `FiniteHistory` that can hold `size` items.
    pub fn new(size: usize) -> Self {
        let mut data = VecDeque::new();
        data.reserve_exact(size);
        FiniteHistory { size, data }
    }
    /// Add an `item`, removing another if necessary.
    pub fn add(&mut self, item: T) {
        if self.data.len() == self.size {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }
}
impl<T> FiniteHistory<T>
where
    for<'a> &'a T: Into<f64>,
{
    /// Compute the mean value over the items currently in the history.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            0.0
        } else {
            self.data.iter().map(|x| x.into()).sum::<f64>() / (self.data.len() as f64)
        }
    }
}

/// A wrapper for `bool` that can be converted to `f64`.
#[derive(Debug, Clone, Copy)]
pub struct FHBool(pub bool);

impl<'a> From<&'a FHBool> for f64 {
    fn from(b: &FHBool) -> Self {
        if b.0 {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_history_evicts_and_averages() {
        let mut h = FiniteHistory::new(3);
        assert_eq!(h.mean(), 0.0);
        h.add(FHBool(true));
        assert!(f64_eq(h.mean(), 1.0));
        h.add(FHBool(false));
        h.add(FHBool(false));
        h.add(FHBool(false)); // evicts the initial `true`
        assert!(f64_eq(h.mean(), 0.0));
    }
}
