//! This module defines the core abstraction for linear operators.
//!
//! The iterative-truncated solvers never need the entries of the operator whose
//! leading eigenpairs they compute, only its action on vectors. Several of the
//! operators they work with are *implicit*: products of kernel matrices with Cholesky
//! solves, or a symmetric matrix whitened by a triangular factor. Forming them
//! explicitly would cost a dense product and, worse, destroy the symmetry that the
//! Lanczos process relies on.
//!
//! The central piece of this module is the [`LinearOperator`] trait, implemented for
//! dense `faer` matrices and for the two implicit operators used by the estimators:
//!
//! - [`RegressionOperator`]: the symmetric form `n⁻¹ Rᵗ K_X (K_X + nλI)⁻¹ R` of the
//!   reduced-rank-regression eigenproblem, where `K_Y = R Rᵗ`.
//! - [`WhitenedOperator`]: `L⁻¹ A L⁻ᵗ` for a symmetric `A` and a Cholesky factor
//!   `B = L Lᵗ`, turning `A v = λ B v` into a standard symmetric problem.

use crate::linalg::{solve_lower_in_place, solve_lower_transpose_in_place};
use faer::{
    Mat, MatRef, Scale,
    linalg::solvers::{Llt, Solve},
    traits::ComplexField,
};

/// Represents a linear operator that can be applied to a vector (or a matrix).
///
/// # Type Parameters
///
/// *   `T`: The scalar type, which must implement `ComplexField`.
///
/// # Example
///
/// ```
/// use dual_koopman::matrix::LinearOperator;
/// use faer::mat;
///
/// let a = mat![[2.0, 1.0], [1.0, 3.0]];
/// let x = mat![[1.0], [1.0]];
/// let y = a.apply(x.as_ref());
/// assert_eq!(y, mat![[3.0], [4.0]]);
/// ```
pub trait LinearOperator<T: ComplexField> {
    /// Returns the number of rows of the operator.
    fn nrows(&self) -> usize;

    /// Returns the number of columns of the operator.
    fn ncols(&self) -> usize;

    /// Applies the linear operator to a matrix `rhs`, returning `A * rhs`.
    ///
    /// # Panics
    ///
    /// This method is expected to panic if the inner dimension of the operator does not match
    /// the number of rows of `rhs`.
    fn apply(&self, rhs: MatRef<'_, T>) -> Mat<T>;
}

impl<'a, T: ComplexField> LinearOperator<T> for MatRef<'a, T> {
    #[inline]
    fn nrows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, T>) -> Mat<T> {
        assert_eq!(
            self.ncols(),
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.ncols(),
            rhs.nrows(),
        );
        *self * rhs
    }
}

impl<T: ComplexField> LinearOperator<T> for Mat<T> {
    #[inline]
    fn nrows(&self) -> usize {
        self.as_ref().nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.as_ref().ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, T>) -> Mat<T> {
        self.as_ref().apply(rhs)
    }
}

/// The symmetric reduced-rank-regression operator `n⁻¹ Rᵗ K_X M⁻¹ R`.
///
/// Here `M = K_X + nλI` is given through its Cholesky factorization and `R` is a lower
/// Cholesky factor of the output kernel, `K_Y ≈ R Rᵗ`. Since `K_X` and `M` commute,
/// `K_X M⁻¹` is symmetric and so is the operator. Its eigenvalues are the squared
/// singular values of the regression problem `n⁻¹ K_Y K_X v = σ² M v`, and an
/// eigenvector `z` maps back to `v = M⁻¹ R z`.
pub struct RegressionOperator<'a> {
    pub kernel_x: MatRef<'a, f64>,
    pub output_factor: MatRef<'a, f64>,
    pub regularized_input: &'a Llt<f64>,
}

impl RegressionOperator<'_> {
    /// Maps an eigenvector `z` of the symmetric operator to the regression eigenvector
    /// `v = M⁻¹ R z`.
    pub fn lift(&self, z: MatRef<'_, f64>) -> Mat<f64> {
        let rz = self.output_factor * z;
        self.regularized_input.solve(rz.as_ref())
    }
}

impl LinearOperator<f64> for RegressionOperator<'_> {
    fn nrows(&self) -> usize {
        self.kernel_x.nrows()
    }

    fn ncols(&self) -> usize {
        self.kernel_x.ncols()
    }

    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        let n = self.kernel_x.nrows() as f64;
        let lifted = self.lift(rhs);
        let projected = self.kernel_x * &lifted;
        self.output_factor.transpose() * &projected * Scale(1.0 / n)
    }
}

/// The whitened symmetric operator `L⁻¹ A L⁻ᵗ` of the generalized problem `A v = λ B v`,
/// where `B = L Lᵗ`. An eigenvector `w` maps back to `v = L⁻ᵗ w`.
pub struct WhitenedOperator<'a> {
    pub lhs: MatRef<'a, f64>,
    pub rhs_factor: MatRef<'a, f64>,
}

impl WhitenedOperator<'_> {
    /// Maps an eigenvector of the whitened problem back to the generalized one.
    pub fn unwhiten(&self, w: MatRef<'_, f64>) -> Mat<f64> {
        let mut v = w.to_owned();
        solve_lower_transpose_in_place(self.rhs_factor, v.as_mut());
        v
    }
}

impl LinearOperator<f64> for WhitenedOperator<'_> {
    fn nrows(&self) -> usize {
        self.lhs.nrows()
    }

    fn ncols(&self) -> usize {
        self.lhs.ncols()
    }

    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        let v = self.unwhiten(rhs);
        let mut out = self.lhs * &v;
        solve_lower_in_place(self.rhs_factor, out.as_mut());
        out
    }
}

// Unit tests to verify the correctness of the LinearOperator trait and its implementations.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::cholesky;
    use faer::mat;

    #[test]
    fn test_linear_operator_for_mat() {
        let matrix: Mat<f64> = mat![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0],];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]];
        let expected_result = &matrix * &vector;

        let operator: &dyn LinearOperator<f64> = &matrix;
        let result = operator.apply(vector.as_ref());

        assert_eq!(result, expected_result);
        assert_eq!(operator.nrows(), 3);
        assert_eq!(operator.ncols(), 3);
    }

    #[test]
    fn test_linear_operator_for_mat_ref() {
        let matrix: Mat<f64> = mat![[1.0, 2.0], [3.0, 4.0]];
        let vector: Mat<f64> = mat![[1.0], [1.0]];
        let expected = &matrix * &vector;

        let operator: &dyn LinearOperator<f64> = &matrix.as_ref();
        assert_eq!(operator.apply(vector.as_ref()), expected);
        assert_eq!((operator.nrows(), operator.ncols()), (2, 2));
    }

    #[test]
    #[should_panic(
        expected = "Dimension mismatch: operator columns (2) do not match vector rows (3)."
    )]
    fn test_dimension_mismatch_panic() {
        let matrix: Mat<f64> = mat![[1.0, 0.0], [0.0, 1.0]];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]];
        let operator: &dyn LinearOperator<f64> = &matrix;
        operator.apply(vector.as_ref());
    }

    #[test]
    fn test_whitened_operator_matches_explicit_form() {
        let a = mat![[2.0, 0.5, 0.0], [0.5, 1.0, 0.3], [0.0, 0.3, 3.0]];
        let b = mat![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let llt = cholesky(b.as_ref(), "test").unwrap();
        let l = llt.L();
        let op = WhitenedOperator {
            lhs: a.as_ref(),
            rhs_factor: l,
        };
        let x = mat![[1.0], [-2.0], [0.5]];
        let y = op.apply(x.as_ref());

        // L y must equal A L⁻ᵗ x.
        let v = op.unwhiten(x.as_ref());
        let lhs = l * &y;
        let rhs = &a * &v;
        assert!((&lhs - &rhs).norm_l2() < 1e-12);
        // and v must solve Lᵗ v = x.
        assert!((l.transpose() * &v - &x).norm_l2() < 1e-12);
    }

    #[test]
    fn test_regression_operator_is_symmetric() {
        let kx = mat![[2.0, 0.5, 0.1], [0.5, 1.5, 0.2], [0.1, 0.2, 1.0]];
        let ky = mat![[1.0, 0.3, 0.0], [0.3, 2.0, 0.4], [0.0, 0.4, 1.2]];
        let mut m = kx.clone();
        for i in 0..3 {
            m[(i, i)] += 0.3;
        }
        let m_llt = cholesky(m.as_ref(), "test").unwrap();
        let ky_llt = cholesky(ky.as_ref(), "test").unwrap();
        let op = RegressionOperator {
            kernel_x: kx.as_ref(),
            output_factor: ky_llt.L(),
            regularized_input: &m_llt,
        };
        let explicit = op.apply(Mat::<f64>::identity(3, 3).as_ref());
        assert!((&explicit - explicit.transpose()).norm_l2() < 1e-12);
    }
}
