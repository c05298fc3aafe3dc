//! Estimators of the dual-space projection pair `(U, V)`.
//!
//! Every fit maps kernel matrices, a Tikhonov regularization strength and a target
//! rank to a [`Projections`] value. The linear-algebra backend used to solve the
//! underlying (generalized) eigenproblem is selected through [`SolverStrategy`]:
//!
//! - [`SolverStrategy::Exact`]: dense eigendecomposition of the whole problem.
//! - [`SolverStrategy::Iterative`]: Lanczos on a symmetric reformulation, computing
//!   only `rank + 3` leading eigenpairs.
//! - [`SolverStrategy::Randomized`]: randomized range finding with a seeded sketch.
//!
//! The Nystrom estimators only support the first two strategies.

pub mod nystrom;
pub mod pcr;
pub mod rrr;

pub use nystrom::{nystrom_principal_component_regression, nystrom_reduced_rank_regression};
pub use pcr::principal_component_regression;
pub use rrr::reduced_rank_regression;

use crate::{
    diagnostics::{Diagnostic, Diagnostics},
    error::{KoopmanError, ensure_shape, invalid_argument},
};
use faer::{Mat, MatRef};
use std::{fmt, str::FromStr};

/// Number of eigenpairs requested by the iterative solvers on top of the rank.
pub(crate) const ITERATIVE_EXTRA_PAIRS: usize = 3;

/// Parameters of the randomized sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomizedSketch {
    /// Number of sketch columns beyond the rank.
    pub oversamples: usize,
    /// Number of power iterations of the range finder.
    pub iterated_power: usize,
    pub seed: u64,
    /// Draw the sketch from `N(0, n⁻¹ K_Y)` instead of `N(0, I)`. Only used by
    /// reduced rank regression.
    pub optimal_sketching: bool,
}

impl Default for RandomizedSketch {
    fn default() -> Self {
        Self {
            oversamples: 5,
            iterated_power: 1,
            seed: 0,
            optimal_sketching: false,
        }
    }
}

/// Backend used to solve the eigenproblem of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStrategy {
    Exact,
    Iterative,
    Randomized(RandomizedSketch),
}

impl SolverStrategy {
    /// Short tag used in logs and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            SolverStrategy::Exact => "exact",
            SolverStrategy::Iterative => "iterative",
            SolverStrategy::Randomized(_) => "randomized",
        }
    }
}

impl fmt::Display for SolverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SolverStrategy {
    type Err = KoopmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" | "full" => Ok(SolverStrategy::Exact),
            "iterative" | "arnoldi" => Ok(SolverStrategy::Iterative),
            "randomized" => Ok(SolverStrategy::Randomized(RandomizedSketch::default())),
            other => Err(invalid_argument(format!("unknown solver `{other}`."))),
        }
    }
}

/// The projection pair of a fitted estimator.
#[derive(Debug, Clone)]
pub struct Projections {
    pub u: Mat<f64>,
    pub v: Mat<f64>,
    /// Retained squared singular values (reduced rank regression) or eigenvalues
    /// (principal component regression), one per column of `u`.
    pub singular_values_sq: Vec<f64>,
    pub diagnostics: Diagnostics,
}

impl Projections {
    /// Number of columns of the projections.
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }
}

pub(crate) fn ensure_square(
    operand: &'static str,
    m: MatRef<'_, f64>,
) -> Result<usize, KoopmanError> {
    ensure_shape(operand, (m.nrows(), m.ncols()), (m.nrows(), m.nrows()))?;
    Ok(m.nrows())
}

pub(crate) fn ensure_rank(rank: usize, dim: usize) -> Result<(), KoopmanError> {
    if rank == 0 || rank > dim {
        return Err(invalid_argument(format!(
            "rank must lie in 1..={dim}, got {rank}."
        )));
    }
    Ok(())
}

pub(crate) fn ensure_regularization(tikhonov_reg: f64) -> Result<(), KoopmanError> {
    if !tikhonov_reg.is_finite() || tikhonov_reg < 0.0 {
        return Err(invalid_argument(format!(
            "tikhonov_reg must be finite and non-negative, got {tikhonov_reg}."
        )));
    }
    Ok(())
}

/// Records an overfitting signal if some retained values are below `tikhonov_reg`.
pub(crate) fn check_overfit(values: &[f64], tikhonov_reg: f64, diagnostics: &mut Diagnostics) {
    let below = values.iter().filter(|v| v.abs() < tikhonov_reg).count();
    if below > 0 {
        diagnostics.push(Diagnostic::Overfit {
            below_regularization: below,
            retained: values.len(),
            tikhonov_reg,
        });
    }
}

/// Multiplies column `j` of `m` by `factors[j]`.
pub(crate) fn scale_columns(m: MatRef<'_, f64>, factors: &[f64]) -> Mat<f64> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] * factors[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KoopmanErrorKind;

    #[test]
    fn test_solver_tags() {
        assert_eq!("full".parse::<SolverStrategy>().unwrap(), SolverStrategy::Exact);
        assert_eq!(
            "arnoldi".parse::<SolverStrategy>().unwrap(),
            SolverStrategy::Iterative
        );
        assert_eq!(
            "randomized".parse::<SolverStrategy>().unwrap(),
            SolverStrategy::Randomized(RandomizedSketch::default())
        );
        let err = "lobpcg".parse::<SolverStrategy>().unwrap_err();
        assert!(matches!(err.kind(), KoopmanErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn test_rank_bounds() {
        assert!(ensure_rank(0, 4).is_err());
        assert!(ensure_rank(5, 4).is_err());
        assert!(ensure_rank(4, 4).is_ok());
    }

    #[test]
    fn test_regularization_bounds() {
        assert!(ensure_regularization(-1e-3).is_err());
        assert!(ensure_regularization(f64::NAN).is_err());
        assert!(ensure_regularization(0.0).is_ok());
    }

    #[test]
    fn test_overfit_check() {
        let mut diagnostics = Diagnostics::new();
        check_overfit(&[1.0, 1e-4, 1e-5], 1e-3, &mut diagnostics);
        assert_eq!(
            diagnostics.iter().next(),
            Some(&Diagnostic::Overfit {
                below_regularization: 2,
                retained: 3,
                tikhonov_reg: 1e-3,
            })
        );
    }
}
