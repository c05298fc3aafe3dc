//! Structured, non-fatal diagnostics returned next to numerical results.
//!
//! The fitting routines never swallow warnings: every condition that a caller may
//! want to react to (a truncated rank, a regularization strength that dominates the
//! retained spectrum, a solver fallback) is recorded as a [`Diagnostic`] in the
//! [`Diagnostics`] list that travels with the result. Each entry is also forwarded to
//! the [`log`] facade at `warn` level when it is recorded.

use std::fmt;

/// A single non-fatal condition detected while fitting an estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Fewer valid spectral components than requested were found.
    RankDeficiency {
        requested: usize,
        retained: usize,
        /// Magnitude of the largest discarded eigenvalue (0 when nothing was available).
        largest_discarded: f64,
    },
    /// Some retained squared singular values are smaller than the Tikhonov
    /// regularization strength, a typical overfitting signal.
    Overfit {
        below_regularization: usize,
        retained: usize,
        tikhonov_reg: f64,
    },
    /// The primary solver failed and a documented alternative was used instead.
    SolverFallback { reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RankDeficiency {
                requested,
                retained,
                largest_discarded,
            } => write!(
                f,
                "Discarded {} of the {requested} requested dimensions, consider decreasing the rank. Largest discarded eigenvalue: {largest_discarded:.3e}.",
                requested - retained
            ),
            Diagnostic::Overfit {
                below_regularization,
                retained,
                tikhonov_reg,
            } => write!(
                f,
                "{below_regularization} out of the {retained} squared singular values are smaller than the regularization strength {tikhonov_reg:.2e}. Consider reducing the regularization strength to avoid overfitting."
            ),
            Diagnostic::SolverFallback { reason } => {
                write!(f, "Primary solver failed, fallback used: {reason}")
            }
        }
    }
}

/// The ordered list of diagnostics produced by one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and forwards it to the logger.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Returns `true` if any rank deficiency was recorded.
    pub fn has_rank_deficiency(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::RankDeficiency { .. }))
    }

    /// Returns `true` if any overfitting signal was recorded.
    pub fn has_overfit(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::Overfit { .. }))
    }

    /// Returns `true` if a solver fallback was taken.
    pub fn has_fallback(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::SolverFallback { .. }))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_deficiency_message() {
        let d = Diagnostic::RankDeficiency {
            requested: 5,
            retained: 3,
            largest_discarded: 1.5e-3,
        };
        assert_eq!(
            d.to_string(),
            "Discarded 2 of the 5 requested dimensions, consider decreasing the rank. Largest discarded eigenvalue: 1.500e-3."
        );
    }

    #[test]
    fn test_diagnostics_are_kept_in_order() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        diagnostics.push(Diagnostic::Overfit {
            below_regularization: 1,
            retained: 4,
            tikhonov_reg: 1e-2,
        });
        diagnostics.push(Diagnostic::SolverFallback {
            reason: "singular Gram matrix".to_string(),
        });
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.has_overfit());
        assert!(diagnostics.has_fallback());
        assert!(!diagnostics.has_rank_deficiency());
        let first = diagnostics.iter().next().cloned();
        assert!(matches!(first, Some(Diagnostic::Overfit { .. })));
    }
}
