//! Building blocks of the restarted Krylov-Schur iteration.
//!
//! Each submodule implements one stage of an outer iteration, in the order the
//! controller in [`crate::solvers`] calls them:
//!
//! - [`lanczos`]: extends the Lanczos factorization `A V_m = V_m T_m + f e_m^T`.
//! - [`arrow`]: reduces the projected arrowhead matrix to tridiagonal form and
//!   diagonalizes it.
//! - [`sort`]: orders the Ritz pairs so the wanted ones come first.
//! - [`estimate`]: cheap residual bounds from the last row of the eigenvectors.

pub mod arrow;
pub mod estimate;
pub mod lanczos;
pub mod sort;

/// The residual norm below which a Lanczos step is considered a breakdown.
///
/// A residual this small relative to the operator norm means the current basis
/// spans an invariant subspace to working precision.
pub(crate) fn breakdown_tolerance(n: usize, anorm: f64) -> f64 {
    n as f64 * f64::EPSILON * anorm
}
