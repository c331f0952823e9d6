//! Solver configuration and setup-time validation.
//!
//! A [`KrylovSchurConfig`] carries the user's requests (how many eigenpairs, which
//! part of the spectrum, tolerance, subspace sizes). Most sizes are optional; the
//! concrete values are resolved against the operator dimension by
//! [`KrylovSchurConfig::setup`], which is also where invalid combinations are
//! rejected, before any iteration begins.

use crate::error::{KrylovSchurError, invalid_config};
use serde::{Deserialize, Serialize};

/// Default convergence tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Which part of the spectrum is sought.
///
/// All eigenvalues of a symmetric operator are real, so the real/magnitude
/// variants are the only meaningful ones. Arbitrary predicates can be supplied
/// through [`crate::algorithms::sort::EigenvalueOrdering`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Which {
    LargestMagnitude,
    SmallestMagnitude,
    LargestReal,
    #[default]
    SmallestReal,
    /// Closest to the target in absolute value.
    TargetMagnitude,
    /// Closest to the target along the real axis. Identical to
    /// [`Which::TargetMagnitude`] for real spectra.
    TargetReal,
}

impl Which {
    /// Returns `true` if the criterion needs [`KrylovSchurConfig::target`].
    pub fn needs_target(self) -> bool {
        matches!(self, Which::TargetMagnitude | Which::TargetReal)
    }
}

/// Reorthogonalization strategy used while extending the Lanczos factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reorthogonalization {
    /// Only the three-term recurrence (plus the locked prefix). Cheapest, but
    /// orthogonality is lost as Ritz values converge.
    Local,
    /// Against every previous vector, with one conditional refinement pass.
    #[default]
    Full,
    /// Local, with a full pass over the active block whenever the estimated
    /// loss of orthogonality exceeds `sqrt(eps)`.
    Periodic,
    /// Local, with reorthogonalization restricted to the vectors whose
    /// estimated loss of orthogonality is significant.
    Partial,
}

/// How the residual estimate is compared with the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceTest {
    /// `beta * |q_last| / |lambda|`
    #[default]
    Relative,
    /// `beta * |q_last|`
    Absolute,
}

/// User-facing configuration of a Krylov-Schur solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrylovSchurConfig {
    /// Number of requested eigenpairs.
    pub nev: usize,
    /// Maximum dimension of the subspace (basis columns). `None` picks a default.
    pub ncv: Option<usize>,
    /// Maximum dimension of the projected problem. `None` means `ncv`.
    pub mpd: Option<usize>,
    pub tol: f64,
    /// Maximum number of restarts. `None` means `max(100, 2n/ncv)`.
    pub max_it: Option<usize>,
    pub which: Which,
    pub target: Option<f64>,
    pub reorthogonalization: Reorthogonalization,
    pub convergence_test: ConvergenceTest,
    /// Seed for the random start vectors.
    pub seed: u64,
}

impl Default for KrylovSchurConfig {
    fn default() -> Self {
        Self {
            nev: 1,
            ncv: None,
            mpd: None,
            tol: DEFAULT_TOLERANCE,
            max_it: None,
            which: Which::default(),
            target: None,
            reorthogonalization: Reorthogonalization::default(),
            convergence_test: ConvergenceTest::default(),
            seed: 42,
        }
    }
}

/// Concrete sizes resolved by [`KrylovSchurConfig::setup`] for a given operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Ambient dimension of the operator.
    pub n: usize,
    pub nev: usize,
    pub ncv: usize,
    pub mpd: usize,
    pub max_it: usize,
}

impl Dimensions {
    /// Leading dimension of the projected problem workspace.
    pub fn lds(&self) -> usize {
        (self.nev + self.mpd).min(self.ncv)
    }
}

impl KrylovSchurConfig {
    pub fn new(nev: usize) -> Self {
        Self {
            nev,
            ..Self::default()
        }
    }

    pub fn with_ncv(mut self, ncv: usize) -> Self {
        self.ncv = Some(ncv);
        self
    }

    pub fn with_mpd(mut self, mpd: usize) -> Self {
        self.mpd = Some(mpd);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_it(mut self, max_it: usize) -> Self {
        self.max_it = Some(max_it);
        self
    }

    pub fn with_which(mut self, which: Which) -> Self {
        self.which = which;
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_reorthogonalization(mut self, reorthogonalization: Reorthogonalization) -> Self {
        self.reorthogonalization = reorthogonalization;
        self
    }

    pub fn with_convergence_test(mut self, convergence_test: ConvergenceTest) -> Self {
        self.convergence_test = convergence_test;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration against an operator of dimension `n` and fills
    /// in the default subspace sizes.
    ///
    /// # Errors
    /// Returns an invalid-configuration error for any inconsistent request, e.g.
    /// `ncv < nev + 1`, `ncv > nev + mpd`, a non-positive tolerance, or a
    /// target-based ordering without a target.
    pub fn setup(&self, n: usize) -> Result<Dimensions, KrylovSchurError> {
        let nev = self.nev;
        if n == 0 {
            return Err(invalid_config("The operator must have at least one row"));
        }
        if nev == 0 {
            return Err(invalid_config("The value of nev must be at least 1"));
        }
        if nev > n {
            return Err(invalid_config(format!(
                "The value of nev ({nev}) must not exceed the problem size ({n})"
            )));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(invalid_config(format!(
                "The tolerance must be positive and finite, got {}",
                self.tol
            )));
        }
        if self.mpd == Some(0) {
            return Err(invalid_config("The value of mpd must be at least 1"));
        }
        if self.which.needs_target() && self.target.is_none() {
            return Err(invalid_config(format!(
                "Ordering {:?} requires a target value",
                self.which
            )));
        }

        let mut mpd = self.mpd;
        let ncv = match (self.ncv, mpd) {
            (Some(ncv), _) => {
                if !(ncv > nev || (ncv == nev && ncv == n)) {
                    return Err(invalid_config(format!(
                        "The value of ncv ({ncv}) must be at least nev+1 ({})",
                        nev + 1
                    )));
                }
                if ncv > n {
                    return Err(invalid_config(format!(
                        "The value of ncv ({ncv}) must not exceed the problem size ({n})"
                    )));
                }
                ncv
            }
            (None, Some(mpd)) => n.min(nev + mpd),
            (None, None) => {
                if nev < 500 {
                    n.min((2 * nev).max(nev + 15))
                } else {
                    mpd = Some(500);
                    n.min(nev + 500)
                }
            }
        };
        let mpd = mpd.unwrap_or(ncv);
        if ncv > nev + mpd {
            return Err(invalid_config(format!(
                "The value of ncv ({ncv}) must not be larger than nev+mpd ({})",
                nev + mpd
            )));
        }
        let max_it = self.max_it.unwrap_or_else(|| 100.max(2 * n / ncv));
        if max_it == 0 {
            return Err(invalid_config("The value of max_it must be at least 1"));
        }

        Ok(Dimensions {
            n,
            nev,
            ncv,
            mpd,
            max_it,
        })
    }
}
