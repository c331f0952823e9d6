//! Experiment Runner for Convergence History Analysis.
//!
//! This executable runs a single Krylov-Schur solve on a test operator with a
//! known spectrum and records, for every outer iteration, how many eigenpairs are
//! locked and how the residual estimate of the first unconverged Ritz pair
//! evolves. The final eigenvalues are compared against their closed form.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use faer::{
    dyn_stack::{MemBuffer, MemStack},
    matrix_free::LinOp,
};
use krylov_schur::{
    EigenvalueOrdering, IterationReport, KrylovSchur, KrylovSchurConfig, LogMonitor, Monitor,
    Reorthogonalization, Which,
    algorithms::sort::SpectrumOrdering,
    basis::StartVectors,
    matrix::{DiagonalOperator, Laplacian1d},
    utils::perf,
};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};

/// The test operator.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Problem {
    /// The 1-D Laplacian `tridiag(-1, 2, -1)`.
    Laplacian,
    /// `diag(1, 2, ..., n)`.
    Diagonal,
}

/// Which end of the spectrum to compute.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Spectrum {
    Smallest,
    Largest,
    LargestMagnitude,
    SmallestMagnitude,
}

impl From<Spectrum> for Which {
    fn from(spectrum: Spectrum) -> Self {
        match spectrum {
            Spectrum::Smallest => Which::SmallestReal,
            Spectrum::Largest => Which::LargestReal,
            Spectrum::LargestMagnitude => Which::LargestMagnitude,
            Spectrum::SmallestMagnitude => Which::SmallestMagnitude,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Copy)]
enum Reorth {
    Local,
    Full,
    Periodic,
    Partial,
}

impl From<Reorth> for Reorthogonalization {
    fn from(reorth: Reorth) -> Self {
        match reorth {
            Reorth::Local => Reorthogonalization::Local,
            Reorth::Full => Reorthogonalization::Full,
            Reorth::Periodic => Reorthogonalization::Periodic,
            Reorth::Partial => Reorthogonalization::Partial,
        }
    }
}

/// Command-line arguments for the convergence history runner.
#[derive(Parser, Debug)]
#[clap(
    name = "convergence-runner",
    about = "Records the per-iteration convergence history of a Krylov-Schur solve."
)]
struct ConvergenceArgs {
    /// The test operator.
    #[clap(long, value_enum, default_value_t = Problem::Laplacian)]
    problem: Problem,
    /// Dimension of the operator.
    #[clap(long, default_value_t = 1000)]
    n: usize,
    /// Number of requested eigenpairs.
    #[clap(long, default_value_t = 4)]
    nev: usize,
    /// Maximum subspace dimension.
    #[clap(long)]
    ncv: Option<usize>,
    /// Maximum projected problem dimension.
    #[clap(long)]
    mpd: Option<usize>,
    /// Convergence tolerance (relative residual estimate).
    #[clap(long, default_value_t = 1e-8)]
    tol: f64,
    /// Maximum number of restarts.
    #[clap(long)]
    max_it: Option<usize>,
    #[clap(long, value_enum, default_value_t = Spectrum::Smallest)]
    which: Spectrum,
    #[clap(long, value_enum, default_value_t = Reorth::Full)]
    reorth: Reorth,
    /// Seed of the random start vectors.
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Path to the output CSV file where the history will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// One row of the output CSV file.
#[derive(Debug, Serialize)]
struct IterationRecord {
    iteration: usize,
    nconv: usize,
    active: usize,
    /// First Ritz value that is not yet converged, if any.
    first_unconverged: Option<f64>,
    first_unconverged_error: Option<f64>,
    /// Largest estimate among the locked pairs.
    max_locked_error: f64,
}

/// Exact eigenvalues of the test operator, in ascending order.
fn exact_spectrum(problem: Problem, n: usize) -> Vec<f64> {
    match problem {
        Problem::Laplacian => Laplacian1d::new(n).eigenvalues(),
        Problem::Diagonal => (1..=n).map(|i| i as f64).collect(),
    }
}

fn run<O: LinOp<f64>>(operator: &O, args: &ConvergenceArgs) -> Result<()> {
    let mut config = KrylovSchurConfig::new(args.nev)
        .with_tol(args.tol)
        .with_which(args.which.into())
        .with_reorthogonalization(args.reorth.into())
        .with_seed(args.seed);
    config.ncv = args.ncv;
    config.mpd = args.mpd;
    config.max_it = args.max_it;

    let solver = KrylovSchur::new(config);
    let mut mem = MemBuffer::new(solver.apply_scratch(operator));
    let config = solver.config();
    let ordering = SpectrumOrdering::new(config.which, config.target);
    let mut starts = StartVectors::new(config.seed);

    let mut history = Vec::new();
    let mut log_monitor = LogMonitor;
    let mut monitor = |report: &IterationReport<'_>| {
        log_monitor.on_iteration(report);
        history.push(IterationRecord {
            iteration: report.iteration,
            nconv: report.nconv,
            active: report.active,
            first_unconverged: report.eigenvalues.get(report.nconv).copied(),
            first_unconverged_error: report.error_estimates.get(report.nconv).copied(),
            max_locked_error: report.error_estimates[..report.nconv]
                .iter()
                .copied()
                .fold(0.0, f64::max),
        });
    };

    let start = Instant::now();
    let solution = solver.solve_with(
        operator,
        &ordering,
        &mut starts,
        &mut monitor,
        MemStack::new(&mut mem),
    )?;
    let elapsed = start.elapsed();

    let mut writer = csv::Writer::from_path(&args.output)?;
    for record in &history {
        writer.serialize(record)?;
    }
    writer.flush()?;

    let mut exact = exact_spectrum(args.problem, args.n);
    exact.sort_by(|a, b| ordering.compare(*a, *b));
    let residuals = solution.residual_norms(operator, MemStack::new(&mut mem));
    for (i, (&value, residual)) in solution.eigenvalues.iter().zip(residuals).enumerate() {
        log::info!(
            "lambda_{} = {:.12e} (exact {:.12e}, estimate {:.2e}, residual {:.2e})",
            i + 1,
            value,
            exact[i],
            solution.error_estimates[i],
            residual
        );
    }
    log::info!(
        "{:?} after {} iterations in {:.3?}, peak RSS {} KB. History saved to {:?}.",
        solution.reason,
        solution.iterations,
        elapsed,
        perf::get_peak_rss_kb(),
        &args.output
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = ConvergenceArgs::parse();
    log::info!(
        "Starting convergence run: {:?} (n = {}), nev = {}, which = {:?}, reorth = {:?}",
        args.problem,
        args.n,
        args.nev,
        args.which,
        args.reorth
    );

    match args.problem {
        Problem::Laplacian => run(&Laplacian1d::new(args.n), &args),
        Problem::Diagonal => run(&DiagonalOperator::linspace(args.n, 1.0, args.n as f64), &args),
    }
}
