//! Dense solver for the projected eigenproblem.
//!
//! After a thick restart the projected matrix is not tridiagonal: the `l` Ritz
//! values kept from the previous cycle form a diagonal block which is coupled to
//! the first new Lanczos vector through a dense row and column,
//!
//! ```text
//!     | d_0             e_0                 |
//!     |     ...         ...                 |
//!     |         d_l-1   e_l-1               |
//!     | e_0 ... e_l-1   d_l   e_l           |
//!     |                 e_l   d_l+1  ...    |
//!     |                       ...    ...    |
//! ```
//!
//! The matrix is flipped along the anti-diagonal so that the arrowhead becomes the
//! trailing `(l+1) x (l+1)` block, that block is reduced to tridiagonal form with
//! faer's Householder tridiagonalization (which leaves its first row and column
//! untouched, so the coupling to the tridiagonal part survives), and the result is
//! flipped back. The
//! tridiagonal matrix obtained this way is then diagonalized with faer.

use crate::error::{KrylovSchurError, KrylovSchurErrorKind};
use faer::{
    Accum, Conj, MatMut, Par, Side,
    dyn_stack::{MemBuffer, MemStack, StackReq},
    linalg::{
        evd::tridiag::{tridiag_in_place, tridiag_in_place_scratch},
        householder::{
            apply_block_householder_sequence_on_the_left_in_place_scratch,
            apply_block_householder_sequence_on_the_left_in_place_with_conj,
        },
        matmul::matmul,
        qr::no_pivoting::factor::recommended_blocksize,
    },
    prelude::*,
    unzip, zip,
};

/// Solves the symmetric arrowhead-tridiagonal eigenproblem of order `d.len()`.
///
/// On input `d` holds the diagonal, `e` the `l` coupling entries of the arrow
/// followed by the subdiagonal of the trailing tridiagonal part (length `n - 1`).
/// On output `d` holds the eigenvalues in ascending order and the leading
/// `n x n` block of `q` the corresponding orthonormal eigenvectors. `e` is
/// destroyed and `s` is used as scratch; both matrices must be at least `n x n`.
///
/// # Errors
/// Returns an error if the tridiagonal eigensolver fails to converge.
pub fn arrow_tridiag_flip(
    l: usize,
    d: &mut [f64],
    e: &mut [f64],
    q: MatMut<'_, f64>,
    s: MatMut<'_, f64>,
) -> Result<(), KrylovSchurError> {
    let n = d.len();
    if n == 0 {
        return Ok(());
    }
    let mut q = q.get_mut(0..n, 0..n);
    let mut s = s.get_mut(0..n, 0..n);

    reduce_arrow(l, d, e, q.rb_mut(), s.rb_mut());

    // Reuse `s` for the tridiagonal matrix, then for the product Q U.
    zip!(s.rb_mut()).for_each(|unzip!(x)| *x = 0.0);
    for i in 0..n {
        s[(i, i)] = d[i];
        if i + 1 < n {
            s[(i + 1, i)] = e[i];
            s[(i, i + 1)] = e[i];
        }
    }
    let evd = s
        .rb()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| KrylovSchurError::from(KrylovSchurErrorKind::EvdError(err)))?;
    let values = evd.S();
    for (i, value) in d.iter_mut().enumerate() {
        *value = values[i];
    }
    matmul(s.rb_mut(), Accum::Replace, q.rb(), evd.U(), 1.0, Par::Seq);
    q.copy_from(s.rb());
    Ok(())
}

/// Flips the arrowhead matrix, reduces its arrow block to tridiagonal form and
/// flips it back.
///
/// On output `d` and `e[..n-1]` describe a symmetric tridiagonal matrix `T` and
/// `q` holds the orthogonal matrix with `A = Q T Q^T`. `Q` is the identity
/// outside its leading `(l+1) x (l+1)` block.
fn reduce_arrow(l: usize, d: &mut [f64], e: &mut [f64], mut q: MatMut<'_, f64>, mut s: MatMut<'_, f64>) {
    let n = d.len();
    let n1 = l + 1;
    let off = n - n1;

    zip!(s.rb_mut()).for_each(|unzip!(x)| *x = 0.0);
    for i in 0..n {
        s[(n - 1 - i, n - 1 - i)] = d[i];
    }
    for i in 0..l {
        set_symmetric(s.rb_mut(), n - 1 - i, n - 1 - l, e[i]);
    }
    for i in l..n - 1 {
        set_symmetric(s.rb_mut(), n - 1 - i, n - 2 - i, e[i]);
    }

    tridiagonalize_in_place(
        s.rb_mut().get_mut(off..n, off..n),
        q.rb_mut().get_mut(0..n1, 0..n1),
    );

    for i in 0..n - 1 {
        d[n - 1 - i] = s[(i, i)];
        e[n - 2 - i] = s[(i + 1, i)];
    }
    d[0] = s[(n - 1, n - 1)];

    // The reduction was computed in flipped coordinates: rotate the block by 180
    // degrees and complete it with the identity.
    let cells = n1 * n1;
    for p in 0..cells / 2 {
        let (i, j) = (p % n1, p / n1);
        let partner = cells - 1 - p;
        let (pi, pj) = (partner % n1, partner / n1);
        let tmp = q[(i, j)];
        q[(i, j)] = q[(pi, pj)];
        q[(pi, pj)] = tmp;
    }
    for j in 0..n {
        for i in 0..n {
            if i >= n1 || j >= n1 {
                q[(i, j)] = if i == j { 1.0 } else { 0.0 };
            }
        }
    }
}

fn set_symmetric(mut s: MatMut<'_, f64>, i: usize, j: usize, value: f64) {
    s[(i, j)] = value;
    s[(j, i)] = value;
}

/// Reduces the symmetric matrix `a` to tridiagonal form `T = Q^T A Q`, writing
/// the orthogonal factor to `q`.
///
/// The reduction is faer's blocked Householder tridiagonalization, and `Q` is
/// formed by applying the reflector sequence to the identity. Reflectors act on
/// rows and columns `1..m`, so row and column 0 of `a` are never mixed with the
/// rest. On return `a` holds `T` in both triangles and is exactly zero outside the
/// three central diagonals.
pub fn tridiagonalize_in_place(mut a: MatMut<'_, f64>, mut q: MatMut<'_, f64>) {
    let m = a.nrows();
    debug_assert_eq!(m, a.ncols());
    q.fill(0.0);
    q.rb_mut().diagonal_mut().column_vector_mut().fill(1.0);
    if m < 3 {
        return;
    }

    let blocksize = recommended_blocksize::<f64>(m, m);
    let mut householder = Mat::<f64>::zeros(blocksize, m - 1);
    let mut mem = MemBuffer::new(StackReq::any_of(&[
        tridiag_in_place_scratch::<f64>(m, Par::Seq, Default::default()),
        apply_block_householder_sequence_on_the_left_in_place_scratch::<f64>(m - 1, blocksize, m),
    ]));
    let stack = MemStack::new(&mut mem);

    tridiag_in_place(
        a.rb_mut(),
        householder.as_mut(),
        Par::Seq,
        stack,
        Default::default(),
    );
    apply_block_householder_sequence_on_the_left_in_place_with_conj(
        a.rb().submatrix(1, 0, m - 1, m - 1),
        householder.as_ref(),
        Conj::No,
        q.rb_mut().subrows_mut(1, m - 1),
        Par::Seq,
        stack,
    );

    // The strictly lower part below the subdiagonal holds the reflectors.
    let diag: Vec<f64> = (0..m).map(|i| a[(i, i)]).collect();
    let sub: Vec<f64> = (0..m - 1).map(|i| a[(i + 1, i)]).collect();
    a.fill(0.0);
    for (i, &value) in diag.iter().enumerate() {
        a[(i, i)] = value;
    }
    for (i, &value) in sub.iter().enumerate() {
        set_symmetric(a.rb_mut(), i + 1, i, value);
    }
}
