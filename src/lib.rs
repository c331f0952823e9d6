//! Restarted Krylov-Schur eigensolver for large symmetric linear operators.
//!
//! This crate computes a few eigenpairs `A x = lambda x` of a real symmetric
//! operator `A` that is too large to diagonalize directly. It implements the
//! thick-restart Krylov-Schur method specialized to the symmetric case, where the
//! Krylov decomposition is a Lanczos factorization and the projected matrix stays
//! tridiagonal apart from the arrowhead introduced by each restart.
//!
//! Built on the [`faer`] linear algebra framework, the solver operates on
//! matrix-free linear operators ([`faer::matrix_free::LinOp`]): any faer dense or
//! sparse matrix view works, as does a user type that only knows how to compute
//! `A x`.
//!
//! ## Algorithm
//!
//! Every outer iteration runs four stages, see [`algorithms`]:
//!
//! 1. **Extension**: the Lanczos recurrence grows the orthonormal basis `V` to at
//!    most `ncv` columns, reorthogonalizing according to the configured policy.
//! 2. **Projected problem**: the arrowhead-tridiagonal matrix `V^T A V` is reduced
//!    to tridiagonal form and diagonalized.
//! 3. **Selection**: Ritz pairs are sorted by the requested criterion and their
//!    residual norms are estimated from the last row of the eigenvectors.
//! 4. **Restart**: the leading converged pairs are locked, half of the remaining
//!    Ritz vectors are kept, and the basis is compressed with a dense update.
//!
//! A breakdown of the recurrence (an invariant subspace was found) is handled by
//! inserting a fresh start vector. Neither breakdown nor running out of iterations
//! is an error: check [`EigenSolution::reason`] after every solve.
//!
//! ## Example Usage
//!
//! The following example computes the three smallest eigenvalues of a sparse
//! matrix and checks them against their closed form.
//!
//! ```rust
//! use faer::{
//!     dyn_stack::{MemBuffer, MemStack},
//!     sparse::{SparseColMat, Triplet},
//! };
//! use krylov_schur::{KrylovSchur, KrylovSchurConfig, Which};
//!
//! let n = 30;
//! let mut triplets = Vec::new();
//! for i in 0..n {
//!     triplets.push(Triplet { row: i, col: i, val: 2.0 });
//!     if i + 1 < n {
//!         triplets.push(Triplet { row: i, col: i + 1, val: -1.0 });
//!         triplets.push(Triplet { row: i + 1, col: i, val: -1.0 });
//!     }
//! }
//! let a = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets).unwrap();
//!
//! let config = KrylovSchurConfig::new(3)
//!     .with_ncv(12)
//!     .with_tol(1e-10)
//!     .with_which(Which::SmallestReal);
//! let solver = KrylovSchur::new(config);
//!
//! // Allocate workspace for the operator.
//! let mut mem = MemBuffer::new(solver.apply_scratch(&a.as_ref()));
//! let solution = solver.solve(&a.as_ref(), MemStack::new(&mut mem)).unwrap();
//!
//! assert!(solution.is_converged());
//! for k in 1..=3 {
//!     let theta = k as f64 * std::f64::consts::PI / (2.0 * (n as f64 + 1.0));
//!     let exact = 4.0 * theta.sin().powi(2);
//!     assert!((solution.eigenvalues[k - 1] - exact).abs() < 1e-8);
//! }
//! ```
//!
//! ## Performance Characteristics
//!
//! All dense scratch (projected matrix, eigenvectors, recombination buffer) is
//! allocated once per solve. The basis recombination uses faer's `matmul`, and the
//! operator receives a [`faer::dyn_stack::MemStack`] sized by
//! [`KrylovSchur::apply_scratch`].

// Declare the modules that form the crate's API structure.
pub mod algorithms;
pub mod basis;
pub mod config;
pub mod error;
pub mod matrix;
pub mod solvers;
pub mod utils;

// Re-export the main API for convenient access.
pub use algorithms::sort::EigenvalueOrdering;
pub use config::{ConvergenceTest, KrylovSchurConfig, Reorthogonalization, Which};
pub use error::KrylovSchurError;
pub use solvers::{
    ConvergedReason, EigenSolution, IterationReport, KrylovSchur, LogMonitor, Monitor, NoMonitor,
};
