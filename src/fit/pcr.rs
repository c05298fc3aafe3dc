//! Principal component regression in dual space.
//!
//! The estimator keeps the leading eigenpairs `(λ, q)` of the regularized input kernel
//! `K_X + nλI` and sets `U = V = √n · q · λ^{-1/2}`.

use super::{
    ITERATIVE_EXTRA_PAIRS, Projections, SolverStrategy, ensure_rank, ensure_regularization,
    ensure_square, scale_columns,
};
use crate::{
    algorithms::{lanczos::truncated_eigen, randomized::randomized_svd},
    diagnostics::Diagnostics,
    error::KoopmanError,
    linalg::{Eigenpairs, symmetric_eigen},
    regularization::{is_numerically_positive, rank_reveal, regularize},
};
use faer::{MatRef, Scale};

/// Fits the principal component regression estimator.
///
/// `optimal_sketching` is ignored by the randomized solver: the sketch is always
/// standard normal.
pub fn principal_component_regression(
    kernel_x: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Projections, KoopmanError> {
    let n = ensure_square("kernel_X", kernel_x)?;
    ensure_rank(rank, n)?;
    ensure_regularization(tikhonov_reg)?;
    log::debug!("Principal component regression: n = {n}, rank = {rank}, solver = {solver}");

    let regularized = regularize(kernel_x, tikhonov_reg);
    let eig = match solver {
        SolverStrategy::Exact => symmetric_eigen(regularized.as_ref())?,
        SolverStrategy::Iterative => {
            truncated_eigen(&regularized, (rank + ITERATIVE_EXTRA_PAIRS).min(n))?
        }
        SolverStrategy::Randomized(sketch) => {
            let svd = randomized_svd(
                regularized.as_ref(),
                rank,
                sketch.oversamples,
                sketch.iterated_power,
                sketch.seed,
            )?;
            Eigenpairs {
                values: svd.s,
                vectors: svd.u,
            }
        }
    };

    let mut diagnostics = Diagnostics::new();
    let revealed = rank_reveal(
        &eig.values,
        eig.vectors.as_ref(),
        rank,
        is_numerically_positive(&eig.values),
        &mut diagnostics,
    );
    let u = scale_columns(revealed.vectors.as_ref(), &revealed.rsqrt_values)
        * Scale((n as f64).sqrt());
    Ok(Projections {
        v: u.clone(),
        u,
        singular_values_sq: revealed.values,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_diagonal_kernel() {
        let kx = mat![[4.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 9.0]];
        let fit = principal_component_regression(kx.as_ref(), 0.0, 2, &SolverStrategy::Exact)
            .unwrap();
        assert_eq!(fit.singular_values_sq, vec![9.0, 4.0]);
        // √3 · e_3 / 3 and √3 · e_1 / 2, up to sign.
        assert!((fit.u[(2, 0)].abs() - 3.0_f64.sqrt() / 3.0).abs() < 1e-12);
        assert!((fit.u[(0, 1)].abs() - 3.0_f64.sqrt() / 2.0).abs() < 1e-12);
        assert_eq!(fit.u, fit.v);
    }

    #[test]
    fn test_singular_kernel_is_rank_deficient() {
        let kx = mat![[1.0, 1.0], [1.0, 1.0]];
        let fit = principal_component_regression(kx.as_ref(), 0.0, 2, &SolverStrategy::Exact)
            .unwrap();
        assert_eq!(fit.rank(), 1);
        assert!(fit.diagnostics.has_rank_deficiency());
    }
}
