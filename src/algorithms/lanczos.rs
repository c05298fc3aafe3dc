//! Symmetric Lanczos process for truncated eigendecompositions.
//!
//! This module implements the Lanczos method that generates and stores the full
//! orthonormal basis V_k of the Krylov subspace K_k(A, b). Every new basis vector is
//! re-orthogonalized against all the previous ones (twice), so the projected
//! tridiagonal matrix T_k = V_kᵗ A V_k stays faithful even after the Ritz values have
//! converged, which is exactly the regime an eigensolver operates in.
//!
//! [`truncated_eigen`] wraps the process into a solver for the leading eigenpairs
//! (largest magnitude first) of a symmetric operator. It monitors the Ritz residuals
//! `|β_k e_kᵗ y_i|` and enlarges the Krylov subspace until the requested pairs have
//! converged or the full dimension is reached (at which point the decomposition is
//! exact). An invariant Krylov subspace only holds one vector per eigenspace, so the
//! solver deflates it and restarts on the orthogonal complement.
//!
//! Memory usage scales as O(nk) where n is the problem dimension and k is the number
//! of iterations.

use crate::{
    error::{KoopmanError, KoopmanErrorKind, ensure_shape, invalid_argument},
    linalg::{Eigenpairs, symmetric_eigen},
    matrix::LinearOperator,
};
use faer::{Mat, MatRef, Scale};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cmp::Ordering;

/// Seed of the deterministic starting vector used by [`truncated_eigen`].
const START_VECTOR_SEED: u64 = 0x5eed_1a2c;

/// Relative Ritz-residual tolerance, w.r.t. the largest Ritz value in magnitude.
const RITZ_TOLERANCE: f64 = 1e-10;

/// Number of Lanczos steps beyond twice the number of wanted pairs in the first sweep.
const EXTRA_STEPS: usize = 20;

/// The scalar output of the Lanczos process: the entries of the tridiagonal matrix T_k.
#[derive(Debug, Clone)]
pub struct LanczosDecomposition {
    /// Diagonal entries α_1..α_k.
    pub alphas: Vec<f64>,
    /// Off-diagonal entries β_1..β_{k-1}.
    pub betas: Vec<f64>,
    /// Norm of the residual after the last step, β_k.
    pub residual_beta: f64,
    pub steps_taken: usize,
    /// `true` if the Krylov subspace became invariant before `k` steps.
    pub breakdown: bool,
}

/// Basis and tridiagonal coefficients produced by [`lanczos_standard`].
#[derive(Debug, Clone)]
pub struct LanczosOutput {
    pub v_k: Mat<f64>,
    pub decomposition: LanczosDecomposition,
}

/// Returns the relative threshold under which a β coefficient signals breakdown.
#[inline]
fn breakdown_tolerance() -> f64 {
    f64::EPSILON.sqrt() * f64::EPSILON.sqrt().sqrt()
}

/// Performs up to `k` steps of the symmetric Lanczos process with full re-orthogonalization.
///
/// # Arguments
/// * `operator`: A symmetric linear operator.
/// * `b`: The starting vector. Must not be a zero vector.
/// * `k`: The maximum number of iterations to perform, at most the operator dimension.
///
/// # Returns
/// The basis V_k (with as many columns as steps taken) and the coefficients of T_k.
pub fn lanczos_standard(
    operator: &impl LinearOperator<f64>,
    b: MatRef<'_, f64>,
    k: usize,
) -> Result<LanczosOutput, KoopmanError> {
    let n = operator.nrows();
    if operator.ncols() != n {
        return Err(invalid_argument(format!(
            "the Lanczos process needs a square operator, got {}x{}.",
            n,
            operator.ncols()
        )));
    }
    ensure_shape("b", (b.nrows(), b.ncols()), (n, 1))?;
    if k == 0 || k > n {
        return Err(invalid_argument(format!(
            "the number of Lanczos steps must lie in 1..={n}, got {k}."
        )));
    }
    let b_norm = b.norm_l2();
    if b_norm == 0.0 {
        return Err(invalid_argument(
            "The initial vector `b` must not be a zero vector.",
        ));
    }

    let mut v_k = Mat::<f64>::zeros(n, k);
    v_k.col_mut(0).copy_from((b * Scale(1.0 / b_norm)).col(0));

    let mut alphas = Vec::with_capacity(k);
    let mut betas = Vec::with_capacity(k.saturating_sub(1));
    let mut residual_beta = 0.0;
    let mut breakdown = false;
    let mut scale = 0.0_f64;

    for j in 0..k {
        let mut w = operator.apply(v_k.as_ref().get(.., j..j + 1));
        let alpha = (v_k.as_ref().get(.., j..j + 1).transpose() * &w)[(0, 0)];

        // Twice is enough: two Gram-Schmidt sweeps against the whole basis.
        for _ in 0..2 {
            let basis = v_k.as_ref().get(.., 0..j + 1);
            let coefficients = basis.transpose() * &w;
            w = &w - basis * &coefficients;
        }

        alphas.push(alpha);
        let beta = w.norm_l2();
        scale = scale.max(alpha.abs()).max(beta);
        residual_beta = beta;

        if beta <= breakdown_tolerance() * scale {
            breakdown = j + 1 < k;
            residual_beta = 0.0;
            break;
        }
        if j + 1 == k {
            break;
        }
        betas.push(beta);
        v_k.col_mut(j + 1).copy_from((&w * Scale(1.0 / beta)).col(0));
    }

    let steps_taken = alphas.len();
    let v_k = if steps_taken == k {
        v_k
    } else {
        v_k.as_ref().get(.., 0..steps_taken).to_owned()
    };

    Ok(LanczosOutput {
        v_k,
        decomposition: LanczosDecomposition {
            alphas,
            betas,
            residual_beta,
            steps_taken,
            breakdown,
        },
    })
}

/// Assembles the dense tridiagonal matrix T_k from the Lanczos coefficients.
fn assemble_tridiagonal(alphas: &[f64], betas: &[f64]) -> Mat<f64> {
    let steps = alphas.len();
    let mut t_k = Mat::zeros(steps, steps);
    for (i, &alpha) in alphas.iter().enumerate() {
        t_k[(i, i)] = alpha;
    }
    for (i, &beta) in betas.iter().enumerate() {
        t_k[(i, i + 1)] = beta;
        t_k[(i + 1, i)] = beta;
    }
    t_k
}

/// A symmetric operator restricted to the orthogonal complement of an orthonormal
/// `basis`: `P A P` with `P = I - Q Qᵗ`.
///
/// When `span(Q)` is invariant under `A`, the eigenpairs of the restriction are the
/// remaining eigenpairs of `A`.
struct DeflatedOperator<'a, O> {
    operator: &'a O,
    basis: MatRef<'a, f64>,
}

impl<O> DeflatedOperator<'_, O> {
    fn project(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        if self.basis.ncols() == 0 {
            return x.to_owned();
        }
        let coefficients = self.basis.transpose() * x;
        x - self.basis * &coefficients
    }
}

impl<O: LinearOperator<f64>> LinearOperator<f64> for DeflatedOperator<'_, O> {
    fn nrows(&self) -> usize {
        self.operator.nrows()
    }

    fn ncols(&self) -> usize {
        self.operator.ncols()
    }

    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        let projected = self.project(rhs);
        let image = self.operator.apply(projected.as_ref());
        self.project(image.as_ref())
    }
}

/// Ritz pairs extracted from one Krylov subspace.
struct KrylovBlock {
    pairs: Eigenpairs,
    /// The subspace is invariant: every returned pair is exact.
    invariant: bool,
}

/// Runs Lanczos from `start` inside a subspace of dimension `available`, enlarging the
/// Krylov space until the `wanted` leading Ritz pairs converge.
///
/// Convergence is measured against `max(reference_scale, max|θ|)`. On breakdown all
/// Ritz pairs of the invariant subspace are returned.
fn krylov_block(
    operator: &impl LinearOperator<f64>,
    start: MatRef<'_, f64>,
    wanted: usize,
    available: usize,
    reference_scale: f64,
) -> Result<KrylovBlock, KoopmanError> {
    let mut steps = (2 * wanted + EXTRA_STEPS).min(available);
    if steps == 0 {
        return Err(KoopmanErrorKind::ConvergenceFailure(
            "Lanczos process could not take any step".to_string(),
        )
        .into());
    }
    loop {
        let output = lanczos_standard(operator, start, steps)?;
        let decomposition = &output.decomposition;
        let m = decomposition.steps_taken;

        let t_k = assemble_tridiagonal(&decomposition.alphas, &decomposition.betas);
        let ritz = symmetric_eigen(t_k.as_ref())?;

        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| {
            ritz.values[b]
                .abs()
                .partial_cmp(&ritz.values[a].abs())
                .unwrap_or(Ordering::Equal)
        });
        let invariant = decomposition.breakdown || m == available;
        if !invariant {
            order.truncate(wanted);
        }

        let spectral_scale = order
            .first()
            .map(|&i| ritz.values[i].abs())
            .unwrap_or(0.0)
            .max(reference_scale)
            .max(f64::MIN_POSITIVE);
        let converged = invariant
            || order.iter().all(|&i| {
                (decomposition.residual_beta * ritz.vectors[(m - 1, i)]).abs()
                    <= RITZ_TOLERANCE * spectral_scale
            });

        if converged || steps == available {
            let selected = Mat::from_fn(m, order.len(), |r, c| ritz.vectors[(r, order[c])]);
            log::debug!(
                "Lanczos block converged after {m} steps ({} pairs kept, invariant: {invariant})",
                order.len()
            );
            return Ok(KrylovBlock {
                pairs: Eigenpairs {
                    values: order.iter().map(|&i| ritz.values[i]).collect(),
                    vectors: &output.v_k * &selected,
                },
                invariant,
            });
        }

        log::debug!("Lanczos not converged with {steps} steps, enlarging the Krylov subspace");
        steps = (2 * steps).min(available);
    }
}

/// Computes the `num_eigen` eigenpairs of largest magnitude of a symmetric operator.
///
/// Eigenvalues are returned in descending order of magnitude; eigenvectors are
/// orthonormal. When the Krylov subspace of the starting vector is invariant before
/// enough pairs are found (repeated leading eigenvalues, low-rank operators), its
/// pairs are kept and the process restarts on the orthogonal complement from a fresh
/// seeded vector, until `num_eigen` pairs are collected or the dimension runs out.
pub fn truncated_eigen(
    operator: &impl LinearOperator<f64>,
    num_eigen: usize,
) -> Result<Eigenpairs, KoopmanError> {
    let n = operator.nrows();
    let wanted = num_eigen.min(n);
    if wanted == 0 {
        return Ok(Eigenpairs {
            values: Vec::new(),
            vectors: Mat::zeros(n, 0),
        });
    }

    let mut rng = StdRng::seed_from_u64(START_VECTOR_SEED);
    let mut values: Vec<f64> = Vec::with_capacity(wanted);
    let mut basis = Mat::<f64>::zeros(n, 0);
    while values.len() < wanted && basis.ncols() < n {
        let deflated = DeflatedOperator {
            operator,
            basis: basis.as_ref(),
        };
        let mut start = Mat::<f64>::zeros(n, 1);
        for i in 0..n {
            start[(i, 0)] = rng.random::<f64>() - 0.5;
        }
        // Twice, as in the Lanczos sweeps.
        let start = deflated.project(deflated.project(start.as_ref()).as_ref());
        if start.norm_l2() <= breakdown_tolerance() {
            break;
        }

        let reference_scale = values.first().map(|v| v.abs()).unwrap_or(0.0);
        let block = krylov_block(
            &deflated,
            start.as_ref(),
            wanted,
            n - basis.ncols(),
            reference_scale,
        )?;
        values.extend_from_slice(&block.pairs.values);
        let found = basis.ncols();
        basis = Mat::from_fn(n, found + block.pairs.vectors.ncols(), |r, c| {
            if c < found {
                basis[(r, c)]
            } else {
                block.pairs.vectors[(r, c - found)]
            }
        });

        if !block.invariant {
            break;
        }
        log::debug!(
            "Krylov subspace invariant with {} of {wanted} pairs, restarting on its complement",
            values.len()
        );
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .abs()
            .partial_cmp(&values[a].abs())
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(wanted);
    Ok(Eigenpairs {
        values: order.iter().map(|&i| values[i]).collect(),
        vectors: Mat::from_fn(n, order.len(), |r, c| basis[(r, order[c])]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Side;

    fn random_spd(n: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Mat::from_fn(n, n, |_, _| rng.random::<f64>() - 0.5);
        &x * x.transpose()
    }

    #[test]
    fn test_basis_is_orthonormal_and_tridiagonalizes() {
        let a = random_spd(30, 3);
        let b = Mat::from_fn(30, 1, |i, _| 1.0 + i as f64);
        let out = lanczos_standard(&a, b.as_ref(), 12).unwrap();
        let v = &out.v_k;
        let gram = v.transpose() * v;
        assert!((&gram - Mat::<f64>::identity(12, 12)).norm_l2() < 1e-12);

        let projected = v.transpose() * &a * v;
        let t_k = assemble_tridiagonal(&out.decomposition.alphas, &out.decomposition.betas);
        assert!((&projected - &t_k).norm_l2() < 1e-10);
    }

    #[test]
    fn test_zero_start_vector_is_rejected() {
        let a = random_spd(5, 1);
        let b = Mat::<f64>::zeros(5, 1);
        assert!(lanczos_standard(&a, b.as_ref(), 3).is_err());
    }

    #[test]
    fn test_truncated_eigen_matches_dense() {
        let a = random_spd(60, 7);
        let dense = a.as_ref().self_adjoint_eigen(Side::Lower).unwrap();
        let diag = dense.S();
        let eig = truncated_eigen(&a, 4).unwrap();
        assert_eq!(eig.values.len(), 4);
        for (i, value) in eig.values.iter().enumerate() {
            // Dense eigenvalues are ascending; the operator is PSD.
            let expected = diag[59 - i];
            assert!((value - expected).abs() < 1e-8 * expected.abs().max(1.0));
            let v = eig.vectors.as_ref().get(.., i..i + 1);
            let residual = &a * v - v * Scale(*value);
            assert!(residual.norm_l2() < 1e-6);
        }
    }

    #[test]
    fn test_truncated_eigen_on_low_rank_operator() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = Mat::from_fn(40, 3, |_, _| rng.random::<f64>() - 0.5);
        let a = &x * x.transpose();
        let eig = truncated_eigen(&a, 6).unwrap();
        assert_eq!(eig.values.len(), 6);
        // Three non-trivial directions; the remaining Ritz values are numerically zero.
        let significant = eig.values.iter().filter(|v| v.abs() > 1e-8).count();
        assert_eq!(significant, 3);
        let gram = eig.vectors.transpose() * &eig.vectors;
        assert!((&gram - Mat::<f64>::identity(6, 6)).norm_l2() < 1e-10);
    }

    #[test]
    fn test_truncated_eigen_on_repeated_eigenvalue() {
        // Every start vector of the identity spans an invariant subspace of dimension one.
        let a = Mat::<f64>::identity(10, 10) * Scale(2.0);
        let eig = truncated_eigen(&a, 4).unwrap();
        assert_eq!(eig.values.len(), 4);
        assert!(eig.values.iter().all(|v| (v - 2.0).abs() < 1e-12));
        let gram = eig.vectors.transpose() * &eig.vectors;
        assert!((&gram - Mat::<f64>::identity(4, 4)).norm_l2() < 1e-10);
    }

    #[test]
    fn test_truncated_eigen_on_clustered_leading_eigenvalues() {
        // diag(5, 5, 5, 1, 0.5, ...): the leading eigenvalue has multiplicity three.
        let diag: Vec<f64> = (0..12)
            .map(|i| if i < 3 { 5.0 } else { 1.0 / (i - 2) as f64 })
            .collect();
        let a = Mat::from_fn(12, 12, |i, j| if i == j { diag[i] } else { 0.0 });
        let eig = truncated_eigen(&a, 4).unwrap();
        assert_eq!(eig.values.len(), 4);
        for (value, expected) in eig.values.iter().zip([5.0, 5.0, 5.0, 1.0]) {
            assert!((value - expected).abs() < 1e-10, "{value} != {expected}");
        }
    }
}
