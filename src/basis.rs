//! Storage for the orthonormal Krylov basis.
//!
//! The [`Basis`] owns an `n x ncv` column-major matrix. The solver mutates it in
//! place: the Lanczos extender appends columns, the restart recombines a block of
//! columns with the eigenvector matrix of the projected problem, and fresh start
//! vectors are inserted after a breakdown.
//!
//! Orthogonalization uses classical Gram-Schmidt with one conditional refinement
//! pass (the DGKS criterion): if the norm of the vector drops by more than a factor
//! `1/sqrt(2)` during the first pass, the pass is repeated. Twice is enough.

use faer::{
    Accum, Col, ColMut, ColRef, Mat, MatRef, Par,
    linalg::matmul::matmul,
    prelude::{Reborrow, ReborrowMut},
    unzip, zip,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::ops::Range;

/// Refinement threshold of the DGKS criterion.
const DGKS_ETA: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// How many random candidates are tried before a start vector is declared impossible.
const START_VECTOR_ATTEMPTS: usize = 3;

/// Result of asking the basis for a new start vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartVectorOutcome {
    /// The column now holds a unit vector orthogonal to all previous columns.
    Generated,
    /// No vector orthogonal to the previous columns could be produced; the
    /// ambient space is (numerically) exhausted.
    Exhausted,
}

/// A source of raw candidate vectors used to (re)start the Lanczos process.
///
/// Candidates do not need to be normalized or orthogonal to anything: the
/// [`Basis`] takes care of that and reports failure if the candidate lies in
/// the span of the previous columns.
pub trait StartVectorSource {
    /// Fills `out` with a candidate for basis column `index`.
    fn fill(&mut self, index: usize, out: ColMut<'_, f64>);
}

/// Default start vectors: an optional user-supplied vector for column 0 and
/// seeded uniform random vectors in `[-1, 1)` for everything else.
#[derive(Debug)]
pub struct StartVectors {
    initial: Option<Col<f64>>,
    rng: StdRng,
}

impl StartVectors {
    pub fn new(seed: u64) -> Self {
        Self {
            initial: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uses `initial` for the first column. The vector is consumed on first use.
    pub fn with_initial(mut self, initial: Col<f64>) -> Self {
        self.initial = Some(initial);
        self
    }
}

impl StartVectorSource for StartVectors {
    fn fill(&mut self, index: usize, mut out: ColMut<'_, f64>) {
        if index == 0 {
            if let Some(initial) = self.initial.take() {
                out.copy_from(initial.as_ref());
                return;
            }
        }
        let rng = &mut self.rng;
        zip!(out.rb_mut()).for_each(|unzip!(x)| *x = rng.random_range(-1.0..1.0));
    }
}

/// Orthonormal basis vectors stored as the columns of a dense matrix.
#[derive(Debug, Clone)]
pub struct Basis {
    v: Mat<f64>,
}

impl Basis {
    /// Allocates a zeroed basis with `ncols` columns of length `n`.
    pub fn zeros(n: usize, ncols: usize) -> Self {
        Self {
            v: Mat::zeros(n, ncols),
        }
    }

    /// Ambient dimension of the vectors.
    pub fn dim(&self) -> usize {
        self.v.nrows()
    }

    /// Number of allocated columns.
    pub fn capacity(&self) -> usize {
        self.v.ncols()
    }

    pub fn column(&self, j: usize) -> ColRef<'_, f64> {
        self.v.col(j)
    }

    pub fn column_mut(&mut self, j: usize) -> ColMut<'_, f64> {
        self.v.col_mut(j)
    }

    /// View of a contiguous block of columns, e.g. a single column as an `n x 1`
    /// right-hand side for an operator.
    pub fn columns(&self, range: Range<usize>) -> MatRef<'_, f64> {
        self.v.as_ref().get(.., range)
    }

    /// View of the leading `ncols` columns.
    pub fn leading(&self, ncols: usize) -> MatRef<'_, f64> {
        self.v.as_ref().get(.., 0..ncols)
    }

    /// Consumes the basis and returns the leading `ncols` columns.
    pub fn into_leading(self, ncols: usize) -> Mat<f64> {
        if ncols == self.v.ncols() {
            self.v
        } else {
            self.v.as_ref().get(.., 0..ncols).to_owned()
        }
    }

    /// Orthogonalizes `w` against the columns listed in `columns`.
    ///
    /// The projection coefficients of both Gram-Schmidt passes are accumulated in
    /// `h`, indexed by column number, so `h[j]` holds `v_j^T w` of the original
    /// `w` for every `j` in `columns`. Entries of `h` for other columns are
    /// left untouched.
    ///
    /// Returns the norm of `w` after orthogonalization.
    pub fn orthogonalize(&self, mut w: ColMut<'_, f64>, columns: &[usize], h: &mut [f64]) -> f64 {
        for &j in columns {
            h[j] = 0.0;
        }
        let mut norm = w.norm_l2();
        if columns.is_empty() {
            return norm;
        }
        for _pass in 0..2 {
            self.gram_schmidt_pass(w.rb_mut(), columns, h);
            let new_norm = w.norm_l2();
            let refine = new_norm < DGKS_ETA * norm;
            norm = new_norm;
            if !refine {
                break;
            }
        }
        norm
    }

    /// Orthogonalizes `w` against the contiguous range of columns `[0, ncols)`.
    pub fn orthogonalize_prefix(&self, w: ColMut<'_, f64>, ncols: usize, h: &mut [f64]) -> f64 {
        let columns: Vec<usize> = (0..ncols).collect();
        self.orthogonalize(w, &columns, h)
    }

    fn gram_schmidt_pass(&self, mut w: ColMut<'_, f64>, columns: &[usize], h: &mut [f64]) {
        // Classical Gram-Schmidt: all coefficients are computed from the same `w`.
        let mut coefficients = Vec::with_capacity(columns.len());
        for &j in columns {
            let coefficient: f64 = self.v.col(j).transpose() * w.rb();
            coefficients.push(coefficient);
        }
        for (&j, &coefficient) in columns.iter().zip(coefficients.iter()) {
            h[j] += coefficient;
            zip!(w.rb_mut(), self.v.col(j)).for_each(|unzip!(w, v)| *w -= coefficient * *v);
        }
    }

    /// Writes `w / norm` into column `j`.
    pub fn set_normalized(&mut self, j: usize, w: ColRef<'_, f64>, norm: f64) {
        let scale = 1.0 / norm;
        let mut col = self.v.col_mut(j);
        zip!(col.rb_mut(), w).for_each(|unzip!(dst, src)| *dst = *src * scale);
    }

    /// Replaces columns `[offset, offset + q.ncols())` with `V_active * q`, where
    /// `V_active` is the block of `q.nrows()` columns starting at `offset`.
    ///
    /// `scratch` must have at least `dim()` rows and `q.ncols()` columns.
    pub fn recombine(&mut self, offset: usize, q: MatRef<'_, f64>, scratch: &mut Mat<f64>) {
        let active = q.nrows();
        let kept = q.ncols();
        if kept == 0 {
            return;
        }
        let n = self.dim();
        let mut tmp = scratch.as_mut().get_mut(0..n, 0..kept);
        matmul(
            tmp.rb_mut(),
            Accum::Replace,
            self.v.as_ref().get(.., offset..offset + active),
            q,
            1.0,
            Par::Seq,
        );
        self.v
            .as_mut()
            .get_mut(.., offset..offset + kept)
            .copy_from(tmp.rb());
    }

    /// Fills column `index` with a unit vector orthogonal to columns `[0, index)`.
    ///
    /// Candidates come from `source`. A candidate that loses almost all of its norm
    /// during orthogonalization is discarded and another one is requested, up to a
    /// small number of attempts.
    pub fn insert_start_vector(
        &mut self,
        index: usize,
        source: &mut dyn StartVectorSource,
    ) -> StartVectorOutcome {
        let n = self.dim();
        if index >= n || index >= self.capacity() {
            return StartVectorOutcome::Exhausted;
        }
        let mut w = Col::<f64>::zeros(n);
        let mut h = vec![0.0; index.max(1)];
        let threshold = n as f64 * f64::EPSILON;
        for _attempt in 0..START_VECTOR_ATTEMPTS {
            source.fill(index, w.as_mut());
            let original = w.norm_l2();
            if original == 0.0 || !original.is_finite() {
                continue;
            }
            let norm = self.orthogonalize_prefix(w.as_mut(), index, &mut h);
            if norm > threshold * original {
                self.set_normalized(index, w.as_ref(), norm);
                return StartVectorOutcome::Generated;
            }
        }
        StartVectorOutcome::Exhausted
    }

    /// Frobenius norm of `I - V^T V` over the leading `ncols` columns.
    pub fn orthogonality_loss(&self, ncols: usize) -> f64 {
        let v = self.leading(ncols);
        let gram = v.transpose() * v;
        let identity = Mat::<f64>::identity(ncols, ncols);
        (&identity - &gram).norm_l2()
    }
}
