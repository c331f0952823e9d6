//! Extension of a symmetric Lanczos factorization.
//!
//! Given a basis `V_k` whose columns are orthonormal, [`LanczosExtender::extend`]
//! runs the three-term recurrence
//!
//! ```text
//! w = A v_j,   alpha_j = v_j^T w,   w <- w - alpha_j v_j - beta_{j-1} v_{j-1},
//! beta_j = ||w||,   v_{j+1} = w / beta_j
//! ```
//!
//! for `j = k, ..., m-1`, writing the coefficients to caller-owned arrays and the
//! new vectors to the [`Basis`] in place. The residual `f = beta_{m-1} v_m` of the
//! last step is kept unnormalized in the extender, see [`LanczosExtender::residual`].
//!
//! In floating point the recurrence alone loses orthogonality as soon as Ritz
//! values start to converge, so the residual is reorthogonalized according to a
//! [`Reorthogonalization`] policy:
//!
//! - `Full`: against every previous column.
//! - `Local`: against the columns `[0, k)` present before the extension plus the
//!   two most recent Lanczos vectors.
//! - `Periodic` / `Partial`: local, while Simon's recurrence tracks an estimate
//!   `omega` of the loss of orthogonality of the new vector against each active
//!   column. When an estimate exceeds `sqrt(eps)` the vector (and the next one) is
//!   reorthogonalized against the whole active block (`Periodic`) or only against
//!   the intervals of columns whose estimate is not negligible (`Partial`).
//!
//! The first step of an extension always uses every column: after a thick restart
//! the new vector is coupled to all retained Ritz vectors, not just to its
//! predecessor.
//!
//! ## Breakdown
//!
//! If `beta_j` falls below `n * eps * ||A||` the basis spans an invariant subspace
//! and `v_{j+1}` cannot be formed. The extension then stops and reports
//! [`LanczosOutcome::Breakdown`]; this is not an error. The operator norm is
//! estimated on the fly from the quantities of the recurrence.

use super::breakdown_tolerance;
use crate::{basis::Basis, config::Reorthogonalization};
use faer::{ColRef, Mat, Par, dyn_stack::MemStack, matrix_free::LinOp};

/// How an extension ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanczosOutcome {
    /// All steps up to `m` were taken.
    Continued { m: usize },
    /// The residual vanished at step `m - 1`. Columns `[0, m)` are valid and span
    /// an invariant subspace; column `m` was not written.
    Breakdown { m: usize },
}

impl LanczosOutcome {
    /// Number of valid basis columns after the extension.
    pub fn size(self) -> usize {
        match self {
            LanczosOutcome::Continued { m } | LanczosOutcome::Breakdown { m } => m,
        }
    }

    pub fn is_breakdown(self) -> bool {
        matches!(self, LanczosOutcome::Breakdown { .. })
    }
}

/// Stateful driver of the Lanczos recurrence for one solve.
///
/// The extender owns the scratch it needs (operator output, projection
/// coefficients, orthogonality estimates), allocated once for a basis of at most
/// `ncv` columns, and keeps the running estimate of `||A||` across extensions.
#[derive(Debug)]
pub struct LanczosExtender {
    policy: Reorthogonalization,
    n: usize,
    anorm: f64,
    /// Set once the orthogonality model becomes unreliable; from then on every
    /// step is fully reorthogonalized.
    full: bool,
    eps1: f64,
    delta: f64,
    eta: f64,
    omega: Vec<f64>,
    omega_old: Vec<f64>,
    intervals: Vec<bool>,
    columns: Vec<usize>,
    h: Vec<f64>,
    w: Mat<f64>,
}

impl LanczosExtender {
    pub fn new(policy: Reorthogonalization, n: usize, ncv: usize) -> Self {
        let eps = f64::EPSILON;
        let sqrt_ncv = (ncv as f64).sqrt();
        Self {
            policy,
            n,
            anorm: 0.0,
            full: false,
            eps1: (n as f64).sqrt() * eps / 2.0,
            delta: eps.sqrt() / sqrt_ncv,
            eta: eps.powf(0.75) / sqrt_ncv,
            omega: vec![0.0; ncv],
            omega_old: vec![0.0; ncv],
            intervals: vec![false; ncv],
            columns: Vec::with_capacity(ncv),
            h: vec![0.0; ncv],
            w: Mat::zeros(n, 1),
        }
    }

    pub fn policy(&self) -> Reorthogonalization {
        self.policy
    }

    /// Current estimate of `||A||_2`.
    pub fn norm_estimate(&self) -> f64 {
        self.anorm
    }

    /// Unnormalized residual of the last step taken, orthogonal to the basis.
    pub fn residual(&self) -> ColRef<'_, f64> {
        self.w.col(0)
    }

    fn tracks_orthogonality(&self) -> bool {
        matches!(
            self.policy,
            Reorthogonalization::Periodic | Reorthogonalization::Partial
        ) && !self.full
    }

    /// Extends the factorization from `k` to `m` columns.
    ///
    /// Column `k` of `basis` must already hold a unit vector orthogonal to
    /// columns `[0, k)`. On return `alpha[j - k]` and `beta[j - k]` hold the
    /// coefficients of step `j` for every step taken, and columns `(k, m)` of
    /// `basis` the new Lanczos vectors.
    pub fn extend<O: LinOp<f64>>(
        &mut self,
        operator: &O,
        basis: &mut Basis,
        alpha: &mut [f64],
        beta: &mut [f64],
        k: usize,
        m: usize,
        stack: &mut MemStack,
    ) -> LanczosOutcome {
        debug_assert!(k < m && m <= basis.capacity());
        self.omega[..m - k].fill(0.0);
        self.omega_old[..m - k].fill(0.0);
        let mut force = false;

        for j in k..m {
            let jj = j - k;
            operator.apply(self.w.as_mut(), basis.columns(j..j + 1), Par::Seq, stack);
            self.anorm = self.anorm.max(self.w.norm_l2());

            self.select_columns(k, j);
            let mut norm = basis.orthogonalize(self.w.col_mut(0), &self.columns, &mut self.h);
            alpha[jj] = self.h[j];
            beta[jj] = norm;
            let previous = if jj > 0 { beta[jj - 1] } else { 0.0 };
            self.anorm = self.anorm.max(alpha[jj].abs() + norm + previous);

            if self.tracks_orthogonality() && jj > 0 {
                self.update_omega(jj, &alpha[..=jj], &beta[..=jj]);
                let lost = self.omega[..jj].iter().any(|w| w.abs() > self.delta);
                if lost || force {
                    let first = !force;
                    force = first;
                    self.select_active(k, jj, first);
                    norm = basis.orthogonalize(self.w.col_mut(0), &self.columns, &mut self.h);
                }
            }

            if norm <= breakdown_tolerance(self.n, self.anorm) {
                beta[jj] = norm;
                log::debug!(
                    "Lanczos breakdown at step {} (beta = {:e}, ||A|| ~ {:e})",
                    j,
                    norm,
                    self.anorm
                );
                return LanczosOutcome::Breakdown { m: j + 1 };
            }
            if self.tracks_orthogonality() && norm * self.delta < self.anorm * self.eps1 {
                self.full = true;
                log::debug!("Switching to full reorthogonalization at step {}", j);
            }

            beta[jj] = norm;
            if j + 1 < m {
                basis.set_normalized(j + 1, self.w.col(0), norm);
            }
        }
        LanczosOutcome::Continued { m }
    }

    /// Columns the new vector of step `j` is orthogonalized against.
    fn select_columns(&mut self, k: usize, j: usize) {
        self.columns.clear();
        let local = match self.policy {
            Reorthogonalization::Full => false,
            _ => !self.full && j > k,
        };
        if local {
            self.columns.extend(0..k);
            self.columns.extend(j - 1..=j);
        } else {
            self.columns.extend(0..=j);
        }
    }

    /// Columns of the active block `[k, k + jj)` for a reorthogonalization pass.
    ///
    /// `first` is set on the first of the two consecutive corrected steps; the
    /// intervals used by `Partial` are recomputed only then.
    fn select_active(&mut self, k: usize, jj: usize, first: bool) {
        self.columns.clear();
        match self.policy {
            Reorthogonalization::Partial => {
                if first {
                    mark_intervals(
                        &mut self.intervals[..jj],
                        &self.omega[..jj],
                        self.delta,
                        self.eta,
                    );
                    for (w, &marked) in self.omega[..jj].iter_mut().zip(&self.intervals[..jj]) {
                        if marked {
                            *w = self.eps1;
                        }
                    }
                }
                self.columns.extend(
                    self.intervals[..jj]
                        .iter()
                        .enumerate()
                        .filter(|&(_, &marked)| marked)
                        .map(|(i, _)| k + i),
                );
            }
            _ => {
                self.omega[..jj].fill(self.eps1);
                self.columns.extend(k..k + jj);
            }
        }
    }

    /// One step of Simon's recurrence for the orthogonality estimates.
    ///
    /// On entry `omega[i]` estimates `v_i^T v_jj` and `omega_old[i]` estimates
    /// `v_i^T v_{jj-1}` (indices relative to the start of the extension). On exit
    /// `omega` estimates `v_i^T v_{jj+1}`.
    fn update_omega(&mut self, jj: usize, alpha: &[f64], beta: &[f64]) {
        let t = self.eps1 * self.anorm;
        let binv = 1.0 / beta[jj];
        let nudge = |x: f64| if x > 0.0 { binv * (x + t) } else { binv * (x - t) };

        let omega = &self.omega;
        let old = &mut self.omega_old;
        old[0] = nudge(
            beta[0] * omega[1] + (alpha[0] - alpha[jj]) * omega[0] - beta[jj - 1] * old[0],
        );
        for i in 1..jj.saturating_sub(1) {
            old[i] = nudge(
                beta[i] * omega[i + 1] + (alpha[i] - alpha[jj]) * omega[i] + beta[i - 1] * omega[i - 1]
                    - beta[jj - 1] * old[i],
            );
        }
        old[jj - 1] = binv * t;

        self.omega[..jj].swap_with_slice(&mut self.omega_old[..jj]);
        self.omega[jj] = self.eps1;
    }
}

/// Marks the columns to reorthogonalize against under the `Partial` policy.
///
/// Every index with `|mu| >= delta` is marked (or the largest one if none is),
/// and each mark is grown in both directions while `|mu| >= eta`.
fn mark_intervals(which: &mut [bool], mu: &[f64], delta: f64, eta: f64) {
    let j = mu.len();
    let mut found = false;
    let mut max_pos = 0;
    let mut max = 0.0;
    for i in 0..j {
        which[i] = mu[i].abs() >= delta;
        found |= which[i];
        if mu[i].abs() > max {
            max_pos = i;
            max = mu[i].abs();
        }
    }
    if !found && j > 0 {
        which[max_pos] = true;
    }

    for i in 0..j {
        if !which[i] {
            continue;
        }
        for k in (0..i).rev() {
            if mu[k].abs() < eta || which[k] {
                break;
            }
            which[k] = true;
        }
        for k in i + 1..j {
            if mu[k].abs() < eta || which[k] {
                break;
            }
            which[k] = true;
        }
    }
}
