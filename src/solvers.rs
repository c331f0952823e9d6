//! This module provides the high-level eigensolver: a thick-restart Krylov-Schur
//! iteration for symmetric operators, built on the Lanczos recurrence.
//!
//! Each outer iteration extends the Lanczos factorization to at most `ncv`
//! columns, solves the small projected problem, locks the leading Ritz pairs
//! whose residual estimate is below the tolerance, and restarts with half of the
//! remaining unconverged Ritz vectors. Breakdown of the recurrence and running out
//! of iterations are reported through [`ConvergedReason`], not as errors.

use crate::{
    algorithms::{
        arrow::arrow_tridiag_flip,
        estimate::{count_converged, estimate_errors},
        lanczos::LanczosExtender,
        sort::{EigenvalueOrdering, SpectrumOrdering, gather, permute_columns, sort_eigenvalues},
    },
    basis::{Basis, StartVectorOutcome, StartVectorSource, StartVectors},
    config::{Dimensions, KrylovSchurConfig},
    error::{KrylovSchurError, KrylovSchurErrorKind},
};
use faer::{
    Col, Mat, Par,
    dyn_stack::{MemStack, StackReq},
    matrix_free::LinOp,
};

/// State of the outer iteration. Everything but `Iterating` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergedReason {
    Iterating,
    /// At least `nev` eigenpairs satisfy the tolerance.
    ConvergedTol,
    /// The iteration limit was reached first.
    DivergedIts,
    /// The recurrence broke down and no new start vector could be generated.
    DivergedBreakdown,
}

/// Snapshot passed to a [`Monitor`] after every outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport<'a> {
    pub iteration: usize,
    /// Number of converged (locked) pairs at the end of this iteration.
    pub nconv: usize,
    /// Ritz values of all active slots, `eigenvalues.len() == active`.
    pub eigenvalues: &'a [f64],
    pub error_estimates: &'a [f64],
    pub active: usize,
}

/// Observer of the outer iteration. Purely informational.
pub trait Monitor {
    fn on_iteration(&mut self, report: &IterationReport<'_>);
}

impl<F> Monitor for F
where
    F: FnMut(&IterationReport<'_>),
{
    fn on_iteration(&mut self, report: &IterationReport<'_>) {
        self(report)
    }
}

/// A monitor that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMonitor;

impl Monitor for NoMonitor {
    fn on_iteration(&mut self, _report: &IterationReport<'_>) {}
}

/// Logs the first unconverged Ritz value and its estimate at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn on_iteration(&mut self, report: &IterationReport<'_>) {
        if let (Some(value), Some(error)) = (
            report.eigenvalues.get(report.nconv),
            report.error_estimates.get(report.nconv),
        ) {
            log::info!(
                "{:3} KS nconv={} first unconverged value (error) {} ({:10.8e})",
                report.iteration,
                report.nconv,
                value,
                error
            );
        } else {
            log::info!("{:3} KS nconv={}", report.iteration, report.nconv);
        }
    }
}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct EigenSolution {
    pub reason: ConvergedReason,
    pub iterations: usize,
    pub nconv: usize,
    /// The `nconv` converged eigenvalues, in the requested order.
    pub eigenvalues: Vec<f64>,
    pub error_estimates: Vec<f64>,
    /// `n x nconv`, orthonormal columns.
    pub eigenvectors: Mat<f64>,
}

impl EigenSolution {
    pub fn is_converged(&self) -> bool {
        self.reason == ConvergedReason::ConvergedTol
    }

    /// Computes the explicit residual norms `||A x_i - lambda_i x_i||_2`.
    ///
    /// `stack` must provide at least `operator.apply_scratch(1, Par::Seq)`.
    pub fn residual_norms<O: LinOp<f64>>(&self, operator: &O, stack: &mut MemStack) -> Vec<f64> {
        let n = self.eigenvectors.nrows();
        let mut ax = Mat::<f64>::zeros(n, 1);
        (0..self.nconv)
            .map(|i| {
                let x = self.eigenvectors.as_ref().get(.., i..i + 1);
                operator.apply(ax.as_mut(), x, Par::Seq, stack);
                let lambda = self.eigenvalues[i];
                (0..n)
                    .map(|r| (ax[(r, 0)] - lambda * x[(r, 0)]).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect()
    }
}

/// Scratch of one solve, allocated once at solve start.
struct Workspace {
    /// Diagonal of the projected matrix; the first `l` entries are retained Ritz values.
    a: Vec<f64>,
    /// Arrow couplings followed by the Lanczos subdiagonal.
    b: Vec<f64>,
    q: Mat<f64>,
    s: Mat<f64>,
    eigr: Vec<f64>,
    errest: Vec<f64>,
    perm: Vec<usize>,
    visited: Vec<bool>,
    /// `n x lds` target of the basis recombination.
    update: Mat<f64>,
}

impl Workspace {
    fn new(dims: &Dimensions) -> Self {
        let lds = dims.lds();
        Self {
            a: vec![0.0; lds],
            b: vec![0.0; lds],
            q: Mat::zeros(lds, lds),
            s: Mat::zeros(lds, lds),
            eigr: vec![0.0; dims.ncv],
            errest: vec![0.0; dims.ncv],
            perm: vec![0; lds],
            visited: vec![false; lds],
            update: Mat::zeros(dims.n, lds),
        }
    }
}

/// Thick-restart Krylov-Schur eigensolver for real symmetric operators.
///
/// # Example
/// ```rust
/// use faer::dyn_stack::{MemBuffer, MemStack};
/// use krylov_schur::{KrylovSchur, KrylovSchurConfig, matrix::Laplacian1d};
///
/// let op = Laplacian1d::new(30);
/// let solver = KrylovSchur::new(KrylovSchurConfig::new(3).with_ncv(12).with_tol(1e-10));
/// let mut mem = MemBuffer::new(solver.apply_scratch(&op));
/// let solution = solver.solve(&op, MemStack::new(&mut mem)).unwrap();
/// assert!(solution.is_converged());
/// assert!((solution.eigenvalues[0] - op.eigenvalue(1)).abs() < 1e-8);
/// ```
#[derive(Debug, Clone)]
pub struct KrylovSchur {
    config: KrylovSchurConfig,
    initial: Option<Col<f64>>,
}

impl KrylovSchur {
    pub fn new(config: KrylovSchurConfig) -> Self {
        Self {
            config,
            initial: None,
        }
    }

    /// Uses `initial` as the first Lanczos vector instead of a random one.
    pub fn with_initial_vector(mut self, initial: Col<f64>) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn config(&self) -> &KrylovSchurConfig {
        &self.config
    }

    /// Scratch needed by [`KrylovSchur::solve`] for one operator application.
    pub fn apply_scratch<O: LinOp<f64>>(&self, operator: &O) -> StackReq {
        operator.apply_scratch(1, Par::Seq)
    }

    /// Solves with the ordering, start vectors and logging monitor implied by the
    /// configuration.
    ///
    /// # Errors
    /// Fails on an invalid configuration, a non-square operator, an initial vector
    /// of the wrong length or zero norm, and if the dense kernels fail.
    pub fn solve<O: LinOp<f64>>(
        &self,
        operator: &O,
        stack: &mut MemStack,
    ) -> Result<EigenSolution, KrylovSchurError> {
        let n = operator.nrows();
        let mut starts = StartVectors::new(self.config.seed);
        if let Some(initial) = &self.initial {
            if initial.nrows() != n {
                return Err(KrylovSchurErrorKind::DimensionMismatch {
                    operator_dim: n,
                    vector_rows: initial.nrows(),
                }
                .into());
            }
            if initial.norm_l2() == 0.0 {
                return Err(KrylovSchurErrorKind::ZeroInitialVector.into());
            }
            starts = starts.with_initial(initial.clone());
        }
        let ordering = SpectrumOrdering::new(self.config.which, self.config.target);
        self.solve_with(operator, &ordering, &mut starts, &mut LogMonitor, stack)
    }

    /// Runs the restarted iteration with caller-supplied collaborators.
    ///
    /// # Errors
    /// Same as [`KrylovSchur::solve`], except that the initial vector set with
    /// [`KrylovSchur::with_initial_vector`] is ignored in favor of `starts`.
    pub fn solve_with<O: LinOp<f64>>(
        &self,
        operator: &O,
        ordering: &dyn EigenvalueOrdering,
        starts: &mut dyn StartVectorSource,
        monitor: &mut dyn Monitor,
        stack: &mut MemStack,
    ) -> Result<EigenSolution, KrylovSchurError> {
        let (nrows, ncols) = (operator.nrows(), operator.ncols());
        if nrows != ncols {
            return Err(KrylovSchurErrorKind::NonSquareOperator { nrows, ncols }.into());
        }
        let dims = self.config.setup(nrows)?;
        let tol = self.config.tol;
        log::debug!(
            "Krylov-Schur setup: n={} nev={} ncv={} mpd={} max_it={} tol={:e}",
            dims.n,
            dims.nev,
            dims.ncv,
            dims.mpd,
            dims.max_it,
            tol
        );

        let mut ws = Workspace::new(&dims);
        let mut basis = Basis::zeros(dims.n, dims.ncv);
        let mut extender =
            LanczosExtender::new(self.config.reorthogonalization, dims.n, dims.ncv);

        let mut reason = ConvergedReason::Iterating;
        let mut its = 0;
        let mut nconv = 0;
        let mut l = 0;

        if basis.insert_start_vector(0, starts) == StartVectorOutcome::Exhausted {
            log::warn!("Unable to generate an initial vector");
            reason = ConvergedReason::DivergedBreakdown;
        }

        while reason == ConvergedReason::Iterating {
            its += 1;

            let m = (nconv + dims.mpd).min(dims.ncv);
            let outcome = extender.extend(
                operator,
                &mut basis,
                &mut ws.a[l..],
                &mut ws.b[l..],
                nconv + l,
                m,
                stack,
            );
            let breakdown = outcome.is_breakdown();
            let nv = outcome.size() - nconv;
            let beta = ws.b[nv - 1];

            if !ws.a[..nv].iter().chain(&ws.b[..nv]).all(|x| x.is_finite()) {
                return Err(KrylovSchurErrorKind::NonFiniteProjection { iteration: its }.into());
            }

            // Projected problem: eigenvalues land in `a`, eigenvectors in `q`.
            arrow_tridiag_flip(
                l,
                &mut ws.a[..nv],
                &mut ws.b[..nv - 1],
                ws.q.as_mut(),
                ws.s.as_mut(),
            )?;
            sort_eigenvalues(&ws.a[..nv], ordering, &mut ws.perm[..nv]);
            gather(&ws.a[..nv], &ws.perm[..nv], &mut ws.eigr[nconv..nconv + nv]);
            permute_columns(
                ws.q.as_mut().get_mut(0..nv, 0..nv),
                &ws.perm[..nv],
                &mut ws.visited,
            );
            let q = ws.q.as_ref().get(0..nv, 0..nv);
            estimate_errors(
                beta,
                q,
                &ws.eigr[nconv..nconv + nv],
                self.config.convergence_test,
                &mut ws.errest[nconv..nconv + nv],
            );

            let k = nconv + count_converged(&ws.errest[nconv..nconv + nv], tol);
            if its >= dims.max_it {
                reason = ConvergedReason::DivergedIts;
            }
            if k >= dims.nev {
                reason = ConvergedReason::ConvergedTol;
            }

            l = if reason != ConvergedReason::Iterating || breakdown {
                0
            } else {
                (nconv + nv - k) / 2
            };
            if reason == ConvergedReason::Iterating && !breakdown {
                // Retained Ritz values and their couplings to the next Lanczos vector.
                for i in 0..l {
                    ws.a[i] = ws.eigr[i + k];
                    ws.b[i] = q[(nv - 1, i + k - nconv)] * beta;
                }
            }

            basis.recombine(nconv, q.get(.., 0..k + l - nconv), &mut ws.update);

            if reason == ConvergedReason::Iterating {
                if breakdown {
                    log::info!("Breakdown in Krylov-Schur method (it={} norm={:e})", its, beta);
                    if basis.insert_start_vector(k, starts) == StartVectorOutcome::Exhausted {
                        log::warn!("Unable to generate more start vectors");
                        reason = ConvergedReason::DivergedBreakdown;
                    }
                } else {
                    basis.set_normalized(k + l, extender.residual(), beta);
                }
            }

            log::debug!(
                "Restart {}: nconv={} -> {}, nv={}, l={}, beta={:e}",
                its,
                nconv,
                k,
                nv,
                l,
                beta
            );
            monitor.on_iteration(&IterationReport {
                iteration: its,
                nconv: k,
                eigenvalues: &ws.eigr[..nconv + nv],
                error_estimates: &ws.errest[..nconv + nv],
                active: nconv + nv,
            });
            nconv = k;
        }

        log::info!(
            "Krylov-Schur finished: {:?} after {} iterations, {} of {} requested eigenpairs converged",
            reason,
            its,
            nconv,
            dims.nev
        );
        Ok(EigenSolution {
            reason,
            iterations: its,
            nconv,
            eigenvalues: ws.eigr[..nconv].to_vec(),
            error_estimates: ws.errest[..nconv].to_vec(),
            eigenvectors: basis.into_leading(nconv),
        })
    }
}
