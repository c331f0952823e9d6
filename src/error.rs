//! This module defines the custom error types for the library.
//!
//! Only conditions that must abort a solve are represented here: invalid
//! configuration detected at setup, operator/vector shape problems, and failures of
//! the dense kernels used on the projected problem. Lanczos breakdown and iteration
//! exhaustion are *not* errors; they are reported through
//! [`crate::solvers::ConvergedReason`] in a successful result.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. Note that [`faer::linalg::evd::EvdError`] does not implement the standard
//! [`std::error::Error`] trait, so we wrap it manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can abort a Krylov-Schur solve.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct KrylovSchurError(#[from] KrylovSchurErrorKind);

/// Private enum containing the distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum KrylovSchurErrorKind {
    /// A configuration value was rejected during setup, before any iteration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The eigensolver only handles square operators.
    #[error("Operator must be square, but it has {nrows} rows and {ncols} columns.")]
    NonSquareOperator { nrows: usize, ncols: usize },

    /// The user-supplied initial vector does not match the operator dimension.
    #[error(
        "Dimension mismatch: operator has dimension {operator_dim} but vector has {vector_rows} rows."
    )]
    DimensionMismatch {
        operator_dim: usize,
        vector_rows: usize,
    },

    /// The user-supplied initial vector has zero norm.
    #[error("The initial vector must not be a zero vector.")]
    ZeroInitialVector,

    /// The projected matrix contains NaN or infinite entries. This means the
    /// factorization has been corrupted and no dense kernel should be run on it.
    #[error("Non-finite entry in the projected matrix at iteration {iteration}.")]
    NonFiniteProjection { iteration: usize },

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred in the projected eigenproblem: {0:?}")]
    EvdError(faer::linalg::evd::EvdError),
}

impl KrylovSchurError {
    /// Returns `true` if the error was raised while validating the configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self.0, KrylovSchurErrorKind::InvalidConfiguration(_))
    }

    /// Returns `true` if a dense numerical kernel failed (fatal, never retried).
    pub fn is_numerical_error(&self) -> bool {
        matches!(
            self.0,
            KrylovSchurErrorKind::EvdError(_) | KrylovSchurErrorKind::NonFiniteProjection { .. }
        )
    }
}

// Manually implement PartialEq for the public error type.
// We compare the inner `KrylovSchurErrorKind`.
impl PartialEq for KrylovSchurError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

pub(crate) fn invalid_config(message: impl Into<String>) -> KrylovSchurError {
    KrylovSchurErrorKind::InvalidConfiguration(message.into()).into()
}
