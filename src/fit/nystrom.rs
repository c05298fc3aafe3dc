//! Nystrom-accelerated estimators.
//!
//! Both estimators work with `m` inducing points. They take the `m × m` kernels of
//! the inducing inputs/outputs and the `n × m` cross-kernels between the training
//! data and the inducing points, and return projections over the inducing points.

use super::{
    ITERATIVE_EXTRA_PAIRS, Projections, SolverStrategy, ensure_rank, ensure_regularization,
    ensure_square, scale_columns,
};
use crate::{
    algorithms::lanczos::truncated_eigen,
    diagnostics::{Diagnostic, Diagnostics},
    error::{KoopmanError, ensure_shape, invalid_argument},
    linalg::{
        Eigenpairs, cholesky, generalized_eigh, lstsq, modified_qr, symmetrize, topk,
    },
    matrix::WhitenedOperator,
    regularization::{is_numerically_positive, rank_reveal, regularize},
};
use faer::{Mat, MatRef, Scale};

/// Solves `lhs v = λ rhs v` for the leading eigenpairs, `rhs` symmetric positive definite.
fn generalized_leading_eigen(
    lhs: MatRef<'_, f64>,
    rhs: MatRef<'_, f64>,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Eigenpairs, KoopmanError> {
    match solver {
        SolverStrategy::Exact => generalized_eigh(lhs, rhs),
        SolverStrategy::Iterative => {
            let m = lhs.nrows();
            let llt = cholesky(rhs, "regularized inducing Gram matrix")?;
            let operator = WhitenedOperator {
                lhs,
                rhs_factor: llt.L(),
            };
            let eig = truncated_eigen(&operator, (rank + ITERATIVE_EXTRA_PAIRS).min(m))?;
            Ok(Eigenpairs {
                vectors: operator.unwhiten(eig.vectors.as_ref()),
                values: eig.values,
            })
        }
        SolverStrategy::Randomized(_) => Err(invalid_argument(
            "the Nystrom estimators do not support the randomized solver.",
        )),
    }
}

/// Checks the shapes of the four Nystrom kernels and returns `(n, m)`.
fn ensure_nystrom_shapes(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    kernel_xnys: MatRef<'_, f64>,
    kernel_ynys: MatRef<'_, f64>,
) -> Result<(usize, usize), KoopmanError> {
    let m = ensure_square("kernel_X", kernel_x)?;
    ensure_shape("kernel_Y", (kernel_y.nrows(), kernel_y.ncols()), (m, m))?;
    let n = kernel_xnys.nrows();
    ensure_shape("kernel_Xnys", (kernel_xnys.nrows(), kernel_xnys.ncols()), (n, m))?;
    ensure_shape("kernel_Ynys", (kernel_ynys.nrows(), kernel_ynys.ncols()), (n, m))?;
    Ok((n, m))
}

/// Fits the Nystrom reduced rank regression estimator.
///
/// # Arguments
/// * `kernel_x`, `kernel_y`: `m × m` kernels of the inducing inputs and outputs.
/// * `kernel_xnys`, `kernel_ynys`: `n × m` cross-kernels between the training inputs
///   (outputs) and the inducing inputs (outputs).
///
/// The output always has exactly `rank` columns: directions lost to numerical rank
/// deficiency are zero columns, reported as a [`Diagnostic::RankDeficiency`].
pub fn nystrom_reduced_rank_regression(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    kernel_xnys: MatRef<'_, f64>,
    kernel_ynys: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Projections, KoopmanError> {
    let (n, m) = ensure_nystrom_shapes(kernel_x, kernel_y, kernel_xnys, kernel_ynys)?;
    ensure_rank(rank, m)?;
    ensure_regularization(tikhonov_reg)?;
    log::debug!("Nystrom reduced rank regression: n = {n}, m = {m}, rank = {rank}, solver = {solver}");

    let eps = m as f64 * f64::EPSILON;
    let reg = tikhonov_reg.max(eps);

    let cross = kernel_ynys.transpose() * kernel_xnys;
    let cross_solved = lstsq(kernel_y, cross.as_ref())?;
    let lhs = symmetrize((cross.transpose() * &cross_solved).as_ref());
    let gram = kernel_xnys.transpose() * kernel_xnys + kernel_x * Scale(reg * m as f64);

    let eig = generalized_leading_eigen(
        lhs.as_ref(),
        regularize(gram.as_ref(), eps).as_ref(),
        rank,
        solver,
    )?;
    let magnitudes: Vec<f64> = eig.values.iter().map(|v| v.abs()).collect();
    let leading = topk(&magnitudes, rank);
    let candidates = Mat::from_fn(m, leading.len(), |i, j| eig.vectors[(i, leading[j])]);

    let qr = modified_qr(candidates.as_ref(), Some(lhs.as_ref()), true);
    let mut restored: Vec<(usize, usize)> = qr
        .permutation
        .iter()
        .enumerate()
        .map(|(col, &orig)| (orig, col))
        .collect();
    restored.sort_unstable();

    let mut diagnostics = Diagnostics::new();
    let mut vectors = Mat::<f64>::zeros(m, rank);
    let mut values = vec![0.0; rank];
    for (j, &(orig, col)) in restored.iter().enumerate() {
        vectors.col_mut(j).copy_from(qr.q.col(col));
        values[j] = eig.values[leading[orig]];
    }
    if qr.rank < rank {
        let largest_discarded = (0..leading.len())
            .filter(|i| !qr.permutation.contains(i))
            .map(|i| magnitudes[leading[i]])
            .fold(0.0_f64, f64::max);
        diagnostics.push(Diagnostic::RankDeficiency {
            requested: rank,
            retained: qr.rank,
            largest_discarded,
        });
    }

    let u = lstsq(gram.as_ref(), lhs.as_ref())? * &vectors;
    let v = &cross_solved * &vectors;
    Ok(Projections {
        u,
        v,
        singular_values_sq: values,
        diagnostics,
    })
}

/// Fits the Nystrom principal component regression estimator.
///
/// Arguments are laid out as in [`nystrom_reduced_rank_regression`]. `U` comes from the
/// generalized eigenproblem `K_Xnysᵗ K_Xnys q = λ (K_X + mλI) q`; `V` is recovered by a
/// least-squares solve against the regularized output kernel.
pub fn nystrom_principal_component_regression(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    kernel_xnys: MatRef<'_, f64>,
    kernel_ynys: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Projections, KoopmanError> {
    let (n, m) = ensure_nystrom_shapes(kernel_x, kernel_y, kernel_xnys, kernel_ynys)?;
    ensure_rank(rank, m)?;
    ensure_regularization(tikhonov_reg)?;
    log::debug!("Nystrom principal component regression: n = {n}, m = {m}, rank = {rank}, solver = {solver}");

    let eps = m as f64 * f64::EPSILON;
    let reg = tikhonov_reg.max(eps);
    let gram = kernel_xnys.transpose() * kernel_xnys;
    let eig = generalized_leading_eigen(
        gram.as_ref(),
        regularize(kernel_x, reg).as_ref(),
        rank,
        solver,
    )?;

    let mut diagnostics = Diagnostics::new();
    let revealed = rank_reveal(
        &eig.values,
        eig.vectors.as_ref(),
        rank,
        is_numerically_positive(&eig.values),
        &mut diagnostics,
    );
    let sqrt_m = (m as f64).sqrt();
    let u = scale_columns(revealed.vectors.as_ref(), &revealed.rsqrt_values) * Scale(sqrt_m);

    let cross = kernel_ynys.transpose() * kernel_xnys * &revealed.vectors;
    let v = lstsq(regularize(kernel_y, eps).as_ref(), cross.as_ref())?;
    let v = scale_columns(v.as_ref(), &revealed.rsqrt_values) * Scale(sqrt_m);
    Ok(Projections {
        u,
        v,
        singular_values_sq: revealed.values,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::KoopmanErrorKind, fit::RandomizedSketch};
    use faer::mat;

    #[test]
    fn test_randomized_solver_is_rejected() {
        let k = mat![[1.0, 0.0], [0.0, 1.0]];
        let err = nystrom_reduced_rank_regression(
            k.as_ref(),
            k.as_ref(),
            k.as_ref(),
            k.as_ref(),
            0.0,
            1,
            &SolverStrategy::Randomized(RandomizedSketch::default()),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), KoopmanErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn test_cross_kernel_shape_is_checked() {
        let k = Mat::<f64>::identity(2, 2);
        let wrong = Mat::<f64>::identity(3, 3);
        let err = nystrom_principal_component_regression(
            k.as_ref(),
            k.as_ref(),
            k.as_ref(),
            wrong.as_ref(),
            0.0,
            1,
            &SolverStrategy::Exact,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), KoopmanErrorKind::DimensionMismatch { .. }));
    }

    #[test]
    fn test_degenerate_cross_term_is_zero_padded() {
        // The output kernel only sees the first inducing point, so the cross term has rank one.
        let kx = Mat::<f64>::identity(3, 3);
        let ky = mat![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let ynys = mat![[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let fit = nystrom_reduced_rank_regression(
            kx.as_ref(),
            ky.as_ref(),
            kx.as_ref(),
            ynys.as_ref(),
            1e-3,
            2,
            &SolverStrategy::Exact,
        )
        .unwrap();
        assert_eq!(fit.rank(), 2);
        assert!(fit.diagnostics.has_rank_deficiency());
        assert_eq!(fit.u.col(1).norm_l2(), 0.0);
        assert_eq!(fit.v.col(1).norm_l2(), 0.0);
    }
}
