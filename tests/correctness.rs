//! Integration test suite to verify the mathematical correctness of the Krylov-Schur solver.
//!
//! # Test Methodology
//!
//! Every test runs the full restarted solver on an operator whose spectrum is known
//! in closed form and compares the result against it:
//! 1.  **Construct a Test Operator:** either the 1-D Laplacian `tridiag(-1, 2, -1)`,
//!     assembled as a sparse matrix, whose eigenvalues are
//!     `4 sin^2(k pi / (2 (n + 1)))`, or a diagonal operator.
//! 2.  **Solve:** the solver is run for the requested part of the spectrum with a
//!     given reorthogonalization policy.
//! 3.  **Verify Accuracy:** the computed eigenvalues are compared against the exact
//!     ones, the explicit residuals `||A x - lambda x||` are checked, and the returned
//!     eigenvectors are checked for orthonormality.

use anyhow::{Result, anyhow, ensure};
use faer::{
    Col, ColMut, Mat,
    dyn_stack::{MemBuffer, MemStack},
    matrix_free::LinOp,
    sparse::{SparseColMat, Triplet},
};
use krylov_schur::{
    ConvergedReason, EigenSolution, IterationReport, KrylovSchur, KrylovSchurConfig, NoMonitor,
    Reorthogonalization, Which,
    algorithms::sort::SpectrumOrdering,
    basis::{StartVectorSource, StartVectors},
    matrix::DiagonalOperator,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cmp::Ordering;

/// Tolerance on the distance between computed and exact eigenvalues.
const EIGENVALUE_TOLERANCE: f64 = 1e-8;

/// Tolerance on the explicit residual norm of a returned eigenpair.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Assembles the `n x n` 1-D Laplacian as a sparse matrix.
fn create_laplacian(n: usize) -> SparseColMat<usize, f64> {
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push(Triplet {
            row: i,
            col: i,
            val: 2.0,
        });
        if i + 1 < n {
            triplets.push(Triplet {
                row: i,
                col: i + 1,
                val: -1.0,
            });
            triplets.push(Triplet {
                row: i + 1,
                col: i,
                val: -1.0,
            });
        }
    }
    SparseColMat::try_new_from_triplets(n, n, &triplets).unwrap()
}

/// Exact eigenvalues of the Laplacian, in ascending order.
fn laplacian_spectrum(n: usize) -> Vec<f64> {
    (1..=n)
        .map(|k| {
            let theta = k as f64 * std::f64::consts::PI / (2.0 * (n as f64 + 1.0));
            4.0 * theta.sin().powi(2)
        })
        .collect()
}

fn solve(
    operator: &impl LinOp<f64>,
    solver: &KrylovSchur,
) -> Result<EigenSolution, krylov_schur::KrylovSchurError> {
    let mut mem = MemBuffer::new(solver.apply_scratch(operator));
    solver.solve(operator, MemStack::new(&mut mem))
}

fn residuals(operator: &impl LinOp<f64>, solution: &EigenSolution) -> Vec<f64> {
    let mut mem = MemBuffer::new(operator.apply_scratch(1, faer::Par::Seq));
    solution.residual_norms(operator, MemStack::new(&mut mem))
}

/// `||I - X^T X||_F` over the returned eigenvectors.
fn orthogonality_loss(eigenvectors: &Mat<f64>) -> f64 {
    let k = eigenvectors.ncols();
    let gram = eigenvectors.transpose() * eigenvectors;
    (&Mat::<f64>::identity(k, k) - &gram).norm_l2()
}

/// A macro to generate the boilerplate for each Laplacian test.
///
/// The macro:
/// 1. Builds the sparse Laplacian of dimension 40.
/// 2. Solves for three eigenvalues at the requested end of the spectrum.
/// 3. Checks convergence, the eigenvalues against their closed form, the explicit
///    residuals, and the orthonormality of the eigenvectors.
macro_rules! generate_laplacian_test {
    ($test_name:ident, $which:expr, $policy:expr, $ortho_tolerance:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let n = 40;
            let nev = 3;
            let a = create_laplacian(n);

            let mut exact = laplacian_spectrum(n);
            if $which == Which::LargestReal {
                exact.reverse();
            }

            let config = KrylovSchurConfig::new(nev)
                .with_ncv(15)
                .with_tol(1e-10)
                .with_max_it(1000)
                .with_which($which)
                .with_reorthogonalization($policy);
            let solution = solve(&a.as_ref(), &KrylovSchur::new(config))?;

            ensure!(
                solution.is_converged(),
                "{:?} did not converge: {:?} after {} iterations",
                $policy,
                solution.reason,
                solution.iterations
            );
            ensure!(solution.nconv >= nev, "Only {} pairs converged", solution.nconv);
            for i in 0..nev {
                let err = (solution.eigenvalues[i] - exact[i]).abs();
                ensure!(
                    err < EIGENVALUE_TOLERANCE,
                    "lambda_{} = {} differs from {} by {}",
                    i,
                    solution.eigenvalues[i],
                    exact[i],
                    err
                );
            }
            for (i, residual) in residuals(&a.as_ref(), &solution).into_iter().enumerate() {
                ensure!(
                    residual < RESIDUAL_TOLERANCE,
                    "Residual of pair {} too high: {}",
                    i,
                    residual
                );
            }
            let loss = orthogonality_loss(&solution.eigenvectors);
            ensure!(
                loss < $ortho_tolerance,
                "Eigenvectors lost orthogonality: {}",
                loss
            );
            Ok(())
        }
    };
}

// --- Test Suite ---
// Both ends of the spectrum, with every policy that keeps the basis (semi-)orthogonal.

generate_laplacian_test!(
    test_smallest_full,
    Which::SmallestReal,
    Reorthogonalization::Full,
    1e-10
);
generate_laplacian_test!(
    test_largest_full,
    Which::LargestReal,
    Reorthogonalization::Full,
    1e-10
);
generate_laplacian_test!(
    test_smallest_periodic,
    Which::SmallestReal,
    Reorthogonalization::Periodic,
    1e-5
);
generate_laplacian_test!(
    test_largest_periodic,
    Which::LargestReal,
    Reorthogonalization::Periodic,
    1e-5
);
generate_laplacian_test!(
    test_smallest_partial,
    Which::SmallestReal,
    Reorthogonalization::Partial,
    1e-5
);
generate_laplacian_test!(
    test_largest_partial,
    Which::LargestReal,
    Reorthogonalization::Partial,
    1e-5
);

/// Without reorthogonalization against the active block, spurious copies of
/// converged eigenvalues may appear, but every returned value is still an
/// eigenvalue of the operator.
#[test]
fn test_local_policy_returns_true_eigenvalues() -> Result<()> {
    let n = 40;
    let a = create_laplacian(n);
    let exact = laplacian_spectrum(n);
    let config = KrylovSchurConfig::new(3)
        .with_ncv(15)
        .with_tol(1e-10)
        .with_max_it(2000)
        .with_reorthogonalization(Reorthogonalization::Local);
    let solution = solve(&a.as_ref(), &KrylovSchur::new(config))?;

    ensure!(solution.is_converged(), "{:?}", solution.reason);
    ensure!(
        (solution.eigenvalues[0] - exact[0]).abs() < EIGENVALUE_TOLERANCE,
        "Smallest eigenvalue wrong: {}",
        solution.eigenvalues[0]
    );
    for &value in &solution.eigenvalues {
        let distance = exact
            .iter()
            .map(|e| (e - value).abs())
            .fold(f64::INFINITY, f64::min);
        ensure!(
            distance < EIGENVALUE_TOLERANCE,
            "{} is not an eigenvalue (distance {})",
            value,
            distance
        );
    }
    Ok(())
}

/// The sparse Laplacian of order 30: three smallest eigenvalues to a relative
/// tolerance of 1e-10 within 100 restarts.
#[test]
fn test_end_to_end_laplacian() -> Result<()> {
    let n = 30;
    let nev = 3;
    let tol = 1e-10;
    let a = create_laplacian(n);
    let exact = laplacian_spectrum(n);
    let config = KrylovSchurConfig::new(nev)
        .with_ncv(12)
        .with_tol(tol)
        .with_max_it(100)
        .with_which(Which::SmallestReal);
    let solution = solve(&a.as_ref(), &KrylovSchur::new(config))?;

    ensure!(solution.is_converged(), "{:?}", solution.reason);
    ensure!(
        solution.iterations <= 100,
        "{} iterations",
        solution.iterations
    );
    ensure!(solution.nconv >= nev);
    for (i, &err) in solution.error_estimates.iter().enumerate() {
        ensure!(err < tol, "Estimate of pair {} is {}", i, err);
    }
    for i in 0..nev {
        ensure!(
            (solution.eigenvalues[i] - exact[i]).abs() < EIGENVALUE_TOLERANCE,
            "lambda_{} = {}, expected {}",
            i,
            solution.eigenvalues[i],
            exact[i]
        );
    }
    Ok(())
}

/// Locked pairs are never unlocked: the converged count reported to the monitor
/// never decreases, and the solve finishes within 100 restarts.
#[test]
fn test_convergence_is_monotone() -> Result<()> {
    let n = 50;
    let nev = 4;
    let tol = 1e-8;
    let a = create_laplacian(n);
    let exact = laplacian_spectrum(n);
    let solver = KrylovSchur::new(KrylovSchurConfig::new(nev).with_ncv(20).with_tol(tol));
    let config = solver.config();
    let ordering = SpectrumOrdering::new(config.which, config.target);
    let mut starts = StartVectors::new(config.seed);

    let mut history = Vec::new();
    let mut monitor = |report: &IterationReport<'_>| history.push(report.nconv);
    let mut mem = MemBuffer::new(solver.apply_scratch(&a.as_ref()));
    let solution = solver.solve_with(
        &a.as_ref(),
        &ordering,
        &mut starts,
        &mut monitor,
        MemStack::new(&mut mem),
    )?;

    ensure!(solution.is_converged(), "{:?}", solution.reason);
    ensure!(
        solution.iterations <= 100,
        "{} iterations",
        solution.iterations
    );
    ensure!(history.len() == solution.iterations);
    ensure!(
        history.windows(2).all(|w| w[0] <= w[1]),
        "Converged count decreased: {:?}",
        history
    );
    ensure!(history.last() == Some(&solution.nconv));
    for (i, &err) in solution.error_estimates.iter().enumerate() {
        ensure!(err < tol, "Estimate of pair {} is {}", i, err);
    }
    for i in 0..nev {
        ensure!((solution.eigenvalues[i] - exact[i]).abs() < 1e-6);
    }
    Ok(())
}

/// A start vector in a two-dimensional invariant subspace breaks the recurrence
/// down after two steps. The solver locks the two exact pairs, restarts from a new
/// vector, and goes on to find the largest eigenvalues of the complement.
#[test]
fn test_breakdown_recovery() -> Result<()> {
    let n = 20;
    let a = DiagonalOperator::linspace(n, 1.0, n as f64);
    let initial = Col::from_fn(n, |i| if i < 2 { 1.0 } else { 0.0 });
    let config = KrylovSchurConfig::new(4)
        .with_ncv(10)
        .with_tol(1e-10)
        .with_which(Which::LargestReal);
    let solver = KrylovSchur::new(config).with_initial_vector(initial);
    let solution = solve(&a, &solver)?;

    ensure!(
        solution.reason == ConvergedReason::ConvergedTol,
        "Expected convergence, got {:?}",
        solution.reason
    );
    let expected = [2.0, 1.0, 20.0, 19.0];
    for (i, &value) in expected.iter().enumerate() {
        ensure!(
            (solution.eigenvalues[i] - value).abs() < EIGENVALUE_TOLERANCE,
            "lambda_{} = {}, expected {}",
            i,
            solution.eigenvalues[i],
            value
        );
    }
    ensure!(orthogonality_loss(&solution.eigenvectors) < 1e-10);
    Ok(())
}

/// Always proposes `e_0 + e_1`, which lies in an invariant subspace of a
/// diagonal operator.
struct SameVector;

impl StartVectorSource for SameVector {
    fn fill(&mut self, _index: usize, mut out: ColMut<'_, f64>) {
        for i in 0..out.nrows() {
            out[i] = if i < 2 { 1.0 } else { 0.0 };
        }
    }
}

/// After the breakdown every candidate lies in the span of the locked vectors,
/// so no new start vector exists and the solve stops.
#[test]
fn test_breakdown_without_new_start_vector() -> Result<()> {
    let n = 20;
    let a = DiagonalOperator::linspace(n, 1.0, n as f64);
    let solver = KrylovSchur::new(
        KrylovSchurConfig::new(4)
            .with_ncv(10)
            .with_tol(1e-10)
            .with_which(Which::LargestReal),
    );
    let ordering = SpectrumOrdering::new(Which::LargestReal, None);
    let mut mem = MemBuffer::new(solver.apply_scratch(&a));
    let solution = solver.solve_with(
        &a,
        &ordering,
        &mut SameVector,
        &mut NoMonitor,
        MemStack::new(&mut mem),
    )?;

    ensure!(
        solution.reason == ConvergedReason::DivergedBreakdown,
        "Expected a breakdown, got {:?}",
        solution.reason
    );
    ensure!(solution.iterations == 1);
    ensure!(solution.nconv == 2, "nconv = {}", solution.nconv);
    ensure!((solution.eigenvalues[0] - 2.0).abs() < EIGENVALUE_TOLERANCE);
    ensure!((solution.eigenvalues[1] - 1.0).abs() < EIGENVALUE_TOLERANCE);
    Ok(())
}

#[test]
fn test_iteration_limit_is_reported() -> Result<()> {
    let a = create_laplacian(100);
    let config = KrylovSchurConfig::new(4)
        .with_ncv(10)
        .with_tol(1e-12)
        .with_max_it(1);
    let solution = solve(&a.as_ref(), &KrylovSchur::new(config))?;

    ensure!(solution.reason == ConvergedReason::DivergedIts);
    ensure!(!solution.is_converged());
    ensure!(solution.iterations == 1);
    ensure!(solution.nconv < 4);
    ensure!(solution.eigenvectors.ncols() == solution.nconv);
    Ok(())
}

#[test]
fn test_invalid_configuration_is_rejected() -> Result<()> {
    let a = create_laplacian(50);
    let config = KrylovSchurConfig::new(5).with_ncv(5);
    let err = solve(&a.as_ref(), &KrylovSchur::new(config))
        .err()
        .ok_or_else(|| anyhow!("ncv = nev < n must be rejected"))?;
    ensure!(err.is_configuration_error(), "Unexpected error: {}", err);

    let config = KrylovSchurConfig::new(3).with_which(Which::TargetMagnitude);
    let err = solve(&a.as_ref(), &KrylovSchur::new(config))
        .err()
        .ok_or_else(|| anyhow!("A target ordering without target must be rejected"))?;
    ensure!(err.is_configuration_error(), "Unexpected error: {}", err);
    Ok(())
}

/// A caller-supplied ordering, start vectors from a random initial vector, and a
/// monitor that checks the history is consistent.
#[test]
fn test_custom_ordering_and_monitor() -> Result<()> {
    let n = 60;
    let a = DiagonalOperator::linspace(n, -30.0, 29.0);
    let mut rng = StdRng::seed_from_u64(42);
    let initial = Col::from_fn(n, |_| rng.random::<f64>() + 0.5);

    // Most negative first: equivalent to `Which::SmallestReal`.
    let ordering = |x: f64, y: f64| -> Ordering { x.total_cmp(&y) };
    let config = KrylovSchurConfig::new(3).with_ncv(16).with_tol(1e-10);
    let solver = KrylovSchur::new(config);
    let mut starts = StartVectors::new(solver.config().seed).with_initial(initial);

    let mut last_nconv = 0;
    let mut iterations = 0;
    let mut monitor = |report: &IterationReport<'_>| {
        assert!(report.nconv >= last_nconv);
        assert_eq!(report.eigenvalues.len(), report.active);
        last_nconv = report.nconv;
        iterations += 1;
    };

    let mut mem = MemBuffer::new(solver.apply_scratch(&a));
    let solution = solver.solve_with(
        &a,
        &ordering,
        &mut starts,
        &mut monitor,
        MemStack::new(&mut mem),
    )?;

    ensure!(solution.is_converged(), "{:?}", solution.reason);
    ensure!(iterations == solution.iterations);
    for (i, expected) in [-30.0, -29.0, -28.0].into_iter().enumerate() {
        ensure!((solution.eigenvalues[i] - expected).abs() < EIGENVALUE_TOLERANCE);
    }
    for residual in residuals(&a, &solution) {
        ensure!(residual < RESIDUAL_TOLERANCE, "Residual too high: {}", residual);
    }
    Ok(())
}
