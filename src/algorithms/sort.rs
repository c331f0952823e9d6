//! Ordering of Ritz values and in-place reordering of the eigenvector matrix.
//!
//! After the projected problem has been diagonalized, its eigenpairs must be put
//! in the order requested by the user so that the wanted ones come first. Only
//! then can the restart lock a leading block of converged pairs and retain the
//! next most wanted ones.

use crate::config::Which;
use faer::{MatMut, prelude::ReborrowMut};
use std::cmp::Ordering;

/// A strict weak ordering on eigenvalues: `Less` means "wanted before".
///
/// Implemented for [`Which`] (through [`SpectrumOrdering`]) and for any closure
/// `Fn(f64, f64) -> Ordering`.
pub trait EigenvalueOrdering {
    fn compare(&self, a: f64, b: f64) -> Ordering;
}

impl<F> EigenvalueOrdering for F
where
    F: Fn(f64, f64) -> Ordering,
{
    fn compare(&self, a: f64, b: f64) -> Ordering {
        self(a, b)
    }
}

/// One of the predefined [`Which`] criteria, with its target when needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumOrdering {
    pub which: Which,
    pub target: f64,
}

impl SpectrumOrdering {
    pub fn new(which: Which, target: Option<f64>) -> Self {
        Self {
            which,
            target: target.unwrap_or(0.0),
        }
    }
}

impl EigenvalueOrdering for SpectrumOrdering {
    fn compare(&self, a: f64, b: f64) -> Ordering {
        match self.which {
            Which::LargestMagnitude => b.abs().total_cmp(&a.abs()),
            Which::SmallestMagnitude => a.abs().total_cmp(&b.abs()),
            Which::LargestReal => b.total_cmp(&a),
            Which::SmallestReal => a.total_cmp(&b),
            Which::TargetMagnitude | Which::TargetReal => {
                (a - self.target).abs().total_cmp(&(b - self.target).abs())
            }
        }
    }
}

/// Computes the permutation that sorts `values` according to `ordering`.
///
/// On return `perm[i]` is the index in `values` of the `i`-th wanted eigenvalue.
/// The sort is stable: equal keys keep their original relative order.
pub fn sort_eigenvalues(values: &[f64], ordering: &dyn EigenvalueOrdering, perm: &mut [usize]) {
    debug_assert_eq!(values.len(), perm.len());
    for (i, p) in perm.iter_mut().enumerate() {
        *p = i;
    }
    perm.sort_by(|&i, &j| ordering.compare(values[i], values[j]));
}

/// Reorders the columns of `q` in place so that column `i` of the result is
/// column `perm[i]` of the input.
///
/// The permutation is applied cycle by cycle with column swaps; `visited` must
/// have at least `perm.len()` entries and is used to skip indices that were
/// already placed.
pub fn permute_columns(mut q: MatMut<'_, f64>, perm: &[usize], visited: &mut [bool]) {
    let n = perm.len();
    let visited = &mut visited[..n];
    visited.fill(false);
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut j = start;
        loop {
            visited[j] = true;
            let next = perm[j];
            if next == start {
                break;
            }
            swap_columns(q.rb_mut(), j, next);
            j = next;
        }
    }
}

fn swap_columns(mut q: MatMut<'_, f64>, a: usize, b: usize) {
    for r in 0..q.nrows() {
        let tmp = q[(r, a)];
        q[(r, a)] = q[(r, b)];
        q[(r, b)] = tmp;
    }
}

/// Applies `perm` to `values`, writing `values[perm[i]]` into `out[i]`.
pub fn gather(values: &[f64], perm: &[usize], out: &mut [f64]) {
    for (o, &p) in out.iter_mut().zip(perm) {
        *o = values[p];
    }
}
