//! This module defines the custom error types for the library.
//!
//! All fatal conditions raised by the fitting, forecasting and spectral routines are
//! centralized in a single enum, [`KoopmanErrorKind`], wrapped by the public
//! [`KoopmanError`]. Non-fatal conditions (rank deficiency, overfitting signals,
//! solver fallbacks) are *not* errors: they travel alongside results as
//! [`crate::diagnostics::Diagnostics`].
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. Note that [`faer::linalg::evd::EvdError`] does not implement the standard
//! [`std::error::Error`] trait, so we wrap it manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur while estimating or evaluating
/// a dual-space operator.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct KoopmanError(#[from] KoopmanErrorKind);

impl KoopmanError {
    /// Returns the specific kind of this error, for callers that need to branch on it.
    pub fn kind(&self) -> &KoopmanErrorKind {
        &self.0
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub enum KoopmanErrorKind {
    /// An argument is outside its admissible range (unknown solver tag, rank larger
    /// than the problem dimension, zero forecasting horizon, negative regularization...).
    #[error("Invalid input parameter: {0}")]
    InvalidArgument(String),

    /// Two operands have incompatible shapes.
    #[error(
        "Dimension mismatch for `{operand}`: expected {expected_rows}x{expected_cols}, got {actual_rows}x{actual_cols}."
    )]
    DimensionMismatch {
        operand: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// Eigenvectors that must be real kept a non-negligible imaginary component.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A factorization or an iterative procedure did not converge.
    #[error("Convergence failure: {0}")]
    ConvergenceFailure(String),

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred during an eigendecomposition: {0:?}")]
    Eigendecomposition(faer::linalg::evd::EvdError),

    /// A matrix that must be symmetric positive definite could not be factorized.
    #[error("Matrix is not numerically positive definite ({context}).")]
    NotPositiveDefinite { context: &'static str },
}

// Manually implement PartialEq for the public error type.
// We compare the inner `KoopmanErrorKind`.
impl PartialEq for KoopmanError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<faer::linalg::evd::EvdError> for KoopmanError {
    fn from(err: faer::linalg::evd::EvdError) -> Self {
        KoopmanError(KoopmanErrorKind::Eigendecomposition(err))
    }
}

/// Shorthand for building an [`KoopmanErrorKind::InvalidArgument`] error.
pub(crate) fn invalid_argument(message: impl Into<String>) -> KoopmanError {
    KoopmanError(KoopmanErrorKind::InvalidArgument(message.into()))
}

/// Checks that `actual` has exactly the `expected` shape.
pub(crate) fn ensure_shape(
    operand: &'static str,
    actual: (usize, usize),
    expected: (usize, usize),
) -> Result<(), KoopmanError> {
    if actual != expected {
        return Err(KoopmanErrorKind::DimensionMismatch {
            operand,
            expected_rows: expected.0,
            expected_cols: expected.1,
            actual_rows: actual.0,
            actual_cols: actual.1,
        }
        .into());
    }
    Ok(())
}
