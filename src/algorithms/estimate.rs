//! Residual estimates for Ritz pairs of a Lanczos factorization.
//!
//! With `A V = V T + f e_m^T` and `T y = theta y`, the residual of the Ritz pair
//! `(theta, V y)` is `f (e_m^T y)`, so its norm is `beta |y_m|` where `beta = ||f||`.
//! No residual vector needs to be formed.

use crate::config::ConvergenceTest;
use faer::MatRef;

/// Writes the residual estimate of every column of `q` to `out`.
///
/// `q` is the (already ordered) eigenvector matrix of the projected problem and
/// `eigenvalues[i]` the Ritz value belonging to column `i`. The relative test
/// divides by `|eigenvalues[i]|`; a zero Ritz value falls back to the absolute
/// estimate.
pub fn estimate_errors(
    beta: f64,
    q: MatRef<'_, f64>,
    eigenvalues: &[f64],
    test: ConvergenceTest,
    out: &mut [f64],
) {
    let last = q.nrows() - 1;
    for (i, (err, &lambda)) in out.iter_mut().zip(eigenvalues).enumerate() {
        let residual = beta * q[(last, i)].abs();
        *err = match test {
            ConvergenceTest::Relative if lambda != 0.0 => residual / lambda.abs(),
            _ => residual,
        };
    }
}

/// Length of the leading run of estimates strictly below `tol`.
pub fn count_converged(errest: &[f64], tol: f64) -> usize {
    errest.iter().take_while(|&&err| err < tol).count()
}
