//! Matrix-free reference operators.
//!
//! The eigensolver never looks at matrix entries: its only access to the operator
//! is the product `y = A x` through [`faer::matrix_free::LinOp`]. Any faer dense or
//! sparse matrix view already implements that trait, and so can user types that
//! compute the product on the fly.
//!
//! This module provides two such operators whose spectra are known in closed form.
//! They are used by the test suite and the experiment binaries:
//!
//! 1.  [`Laplacian1d`]: the `n x n` tridiagonal matrix `tridiag(-1, 2, -1)`, the
//!     standard second-difference operator with Dirichlet boundaries. Its
//!     eigenvalues are `4 sin^2(k pi / (2 (n + 1)))` for `k = 1..=n`.
//! 2.  [`DiagonalOperator`]: `diag(d_1, ..., d_n)` for an arbitrary spectrum.

use faer::{
    MatMut, MatRef, Par,
    dyn_stack::{MemStack, StackReq},
    matrix_free::LinOp,
};
use std::f64::consts::PI;

/// The one-dimensional discrete Laplacian `tridiag(-1, 2, -1)` of order `n`.
#[derive(Debug, Clone, Copy)]
pub struct Laplacian1d {
    n: usize,
}

impl Laplacian1d {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    /// The `k`-th smallest eigenvalue, `k` counted from 1.
    pub fn eigenvalue(&self, k: usize) -> f64 {
        let s = (k as f64 * PI / (2.0 * (self.n as f64 + 1.0))).sin();
        4.0 * s * s
    }

    /// All eigenvalues in ascending order.
    pub fn eigenvalues(&self) -> Vec<f64> {
        (1..=self.n).map(|k| self.eigenvalue(k)).collect()
    }
}

impl LinOp<f64> for Laplacian1d {
    fn apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        let _ = (rhs_ncols, par);
        StackReq::empty()
    }

    fn nrows(&self) -> usize {
        self.n
    }

    fn ncols(&self) -> usize {
        self.n
    }

    fn apply(&self, mut out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, _: Par, _: &mut MemStack) {
        assert_eq!(
            self.n,
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.n,
            rhs.nrows(),
        );
        let n = self.n;
        for j in 0..rhs.ncols() {
            for i in 0..n {
                let mut value = 2.0 * rhs[(i, j)];
                if i > 0 {
                    value -= rhs[(i - 1, j)];
                }
                if i + 1 < n {
                    value -= rhs[(i + 1, j)];
                }
                out[(i, j)] = value;
            }
        }
    }

    fn conj_apply(&self, out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, par: Par, stack: &mut MemStack) {
        // Real symmetric: A^H = A.
        self.apply(out, rhs, par, stack);
    }
}

/// A diagonal operator with a user-supplied spectrum.
#[derive(Debug, Clone)]
pub struct DiagonalOperator {
    diagonal: Vec<f64>,
}

impl DiagonalOperator {
    pub fn new(diagonal: Vec<f64>) -> Self {
        Self { diagonal }
    }

    /// Eigenvalues `start, start + step, ...` (`n` of them).
    pub fn linspace(n: usize, start: f64, end: f64) -> Self {
        let step = (end - start) / (n.max(2) - 1) as f64;
        Self::new((0..n).map(|i| start + step * i as f64).collect())
    }

    pub fn diagonal(&self) -> &[f64] {
        &self.diagonal
    }
}

impl LinOp<f64> for DiagonalOperator {
    fn apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        let _ = (rhs_ncols, par);
        StackReq::empty()
    }

    fn nrows(&self) -> usize {
        self.diagonal.len()
    }

    fn ncols(&self) -> usize {
        self.diagonal.len()
    }

    fn apply(&self, mut out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, _: Par, _: &mut MemStack) {
        assert_eq!(
            self.diagonal.len(),
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.diagonal.len(),
            rhs.nrows(),
        );
        for j in 0..rhs.ncols() {
            for (i, &d) in self.diagonal.iter().enumerate() {
                out[(i, j)] = d * rhs[(i, j)];
            }
        }
    }

    fn conj_apply(&self, out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, par: Par, stack: &mut MemStack) {
        self.apply(out, rhs, par, stack);
    }
}
