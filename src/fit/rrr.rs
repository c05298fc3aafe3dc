//! Reduced rank regression in dual space.
//!
//! The estimator solves the generalized eigenproblem
//!
//! ```text
//! n⁻¹ K_Y K_X v = σ² (K_X + nλI) v
//! ```
//!
//! and keeps the `rank` leading (real, non-negative) squared singular values. The
//! exact solver diagonalizes `(K_X + nλI)⁻¹ n⁻¹ K_Y K_X` densely; the iterative solver
//! runs Lanczos on the equivalent symmetric operator `n⁻¹ Rᵗ K_X (K_X + nλI)⁻¹ R`
//! with `K_Y = R Rᵗ` (see [`RegressionOperator`]); the randomized solver projects the
//! problem onto a sketched subspace.

use super::{
    ITERATIVE_EXTRA_PAIRS, Projections, RandomizedSketch, SolverStrategy, check_overfit,
    ensure_rank, ensure_regularization, ensure_square,
};
use crate::{
    algorithms::{
        lanczos::truncated_eigen,
        randomized::{covariance_sketch, gaussian_sketch},
    },
    diagnostics::{Diagnostic, Diagnostics},
    error::{KoopmanError, KoopmanErrorKind, ensure_shape},
    linalg::{
        batch_spd_norm, cholesky, economic_qr, general_eigen, generalized_eigh,
        jittered_cholesky, pseudo_inverse_symmetric, real_part, scaled, symmetrize, to_complex,
        topk,
    },
    matrix::RegressionOperator,
    regularization::regularize,
};
use faer::{Mat, MatRef, Scale, c64, linalg::solvers::Solve};
use rand::{SeedableRng, rngs::StdRng};
use std::cmp::Ordering;

/// Relative tolerance on imaginary parts of eigenvalues and (phase-aligned) eigenvectors.
const IMAGINARY_TOLERANCE: f64 = 1e-10;

/// Fits the reduced rank regression estimator.
///
/// # Arguments
/// * `kernel_x`: `n × n` kernel matrix of the input data.
/// * `kernel_y`: `n × n` kernel matrix of the output data.
/// * `tikhonov_reg`: Tikhonov regularization strength, can be zero.
/// * `rank`: number of retained singular directions, in `1..=n`.
/// * `solver`: eigensolver backend.
///
/// # Errors
/// [`KoopmanErrorKind::InvariantViolation`] if a retained eigenvector cannot be made
/// real, in addition to argument, shape and factorization errors.
pub fn reduced_rank_regression(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Projections, KoopmanError> {
    let n = ensure_square("kernel_X", kernel_x)?;
    ensure_shape("kernel_Y", (kernel_y.nrows(), kernel_y.ncols()), (n, n))?;
    ensure_rank(rank, n)?;
    ensure_regularization(tikhonov_reg)?;
    log::debug!("Reduced rank regression: n = {n}, rank = {rank}, solver = {solver}");

    match solver {
        SolverStrategy::Exact | SolverStrategy::Iterative => {
            fit_eigen(kernel_x, kernel_y, tikhonov_reg, rank, solver)
        }
        SolverStrategy::Randomized(sketch) => {
            fit_randomized(kernel_x, kernel_y, tikhonov_reg, rank, sketch)
        }
    }
}

fn fit_eigen(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    solver: &SolverStrategy,
) -> Result<Projections, KoopmanError> {
    let n = kernel_x.nrows();
    let penalty = tikhonov_reg.max(f64::EPSILON);
    let regularized = regularize(kernel_x, penalty);
    let m_llt = cholesky(regularized.as_ref(), "regularized input kernel")?;

    let (sigma_sq, vectors) = if let SolverStrategy::Iterative = solver {
        let (k_y_llt, _) = jittered_cholesky(kernel_y, "output kernel")?;
        let operator = RegressionOperator {
            kernel_x,
            output_factor: k_y_llt.L(),
            regularized_input: &m_llt,
        };
        let eig = truncated_eigen(&operator, (rank + ITERATIVE_EXTRA_PAIRS).min(n))?;
        let lifted = operator.lift(eig.vectors.as_ref());
        let values = eig.values.iter().map(|&v| c64::new(v, 0.0)).collect();
        (values, to_complex(lifted.as_ref()))
    } else {
        let a = scaled((kernel_y * kernel_x).as_ref(), 1.0 / n as f64);
        let reduced = m_llt.solve(a.as_ref());
        let eig = general_eigen(reduced.as_ref())?;
        (eig.values, eig.vectors)
    };

    let mut diagnostics = Diagnostics::new();
    let (values, vectors) = filter_spectrum(&sigma_sq, vectors.as_ref(), rank, &mut diagnostics)?;
    check_overfit(&values, tikhonov_reg, &mut diagnostics);

    let u = normalize(kernel_x, vectors.as_ref(), tikhonov_reg);
    let v = kernel_x * &u;
    Ok(Projections {
        u,
        v,
        singular_values_sq: values,
        diagnostics,
    })
}

/// Whether a squared singular value can be retained: real and non-negative.
fn is_valid(sigma_sq: c64) -> bool {
    sigma_sq.re >= 0.0 && sigma_sq.im.abs() <= IMAGINARY_TOLERANCE * sigma_sq.norm().max(1.0)
}

/// Sorts the spectrum by decreasing magnitude and truncates it at the first invalid
/// value (capped at `rank`). Eigenvectors are returned as real vectors.
fn filter_spectrum(
    sigma_sq: &[c64],
    vectors: MatRef<'_, c64>,
    rank: usize,
    diagnostics: &mut Diagnostics,
) -> Result<(Vec<f64>, Mat<f64>), KoopmanError> {
    let mut order: Vec<usize> = (0..sigma_sq.len()).collect();
    order.sort_by(|&a, &b| {
        sigma_sq[b]
            .norm()
            .partial_cmp(&sigma_sq[a].norm())
            .unwrap_or(Ordering::Equal)
    });

    // Never skip an invalid value to keep a later valid one.
    let first_invalid = order
        .iter()
        .position(|&i| !is_valid(sigma_sq[i]))
        .unwrap_or(order.len());
    let retained = first_invalid.min(rank);
    if retained < rank {
        let largest_discarded = order[retained..]
            .iter()
            .map(|&i| sigma_sq[i].norm())
            .fold(0.0_f64, f64::max);
        diagnostics.push(Diagnostic::RankDeficiency {
            requested: rank,
            retained,
            largest_discarded,
        });
    }

    let mut real_vectors = Mat::<f64>::zeros(vectors.nrows(), retained);
    for (j, &i) in order[..retained].iter().enumerate() {
        let column = real_eigenvector(vectors.get(.., i..i + 1), j)?;
        real_vectors.col_mut(j).copy_from(column.col(0));
    }
    let values = order[..retained].iter().map(|&i| sigma_sq[i].re).collect();
    Ok((values, real_vectors))
}

/// Rotates a complex eigenvector so that its largest entry is real and returns its real
/// part, failing if the rotated vector keeps a non-negligible imaginary component.
fn real_eigenvector(column: MatRef<'_, c64>, index: usize) -> Result<Mat<f64>, KoopmanError> {
    let pivot = (0..column.nrows())
        .max_by(|&a, &b| {
            column[(a, 0)]
                .norm()
                .partial_cmp(&column[(b, 0)].norm())
                .unwrap_or(Ordering::Equal)
        })
        .unwrap_or(0);
    let largest = column[(pivot, 0)].norm();
    if largest == 0.0 {
        return Ok(Mat::zeros(column.nrows(), 1));
    }
    let phase = column[(pivot, 0)].conj() * (1.0 / largest);
    let rotated = Mat::from_fn(column.nrows(), 1, |i, _| column[(i, 0)] * phase);

    let residue = (0..rotated.nrows()).fold(0.0_f64, |acc, i| acc.max(rotated[(i, 0)].im.abs()));
    if residue > IMAGINARY_TOLERANCE * largest {
        return Err(KoopmanErrorKind::InvariantViolation(format!(
            "eigenvector {index} has an imaginary component of relative size {:.3e}. Decrease the rank or increase the regularization strength.",
            residue / largest
        ))
        .into());
    }
    Ok(real_part(rotated.as_ref()))
}

/// Scales every column `v` by the inverse of `(n⁻¹ ‖K_X v‖² + λ vᵗ K_X v)^{1/2}`,
/// zero columns staying zero.
fn normalize(kernel_x: MatRef<'_, f64>, vectors: MatRef<'_, f64>, tikhonov_reg: f64) -> Mat<f64> {
    let n = kernel_x.nrows() as f64;
    let kernel_x_vecs = kernel_x * vectors * Scale(n.sqrt().recip());
    let norms: Vec<f64> = (0..vectors.ncols())
        .map(|j| {
            let norm_sq = (0..vectors.nrows()).fold(0.0, |acc, i| {
                let kv = kernel_x_vecs[(i, j)];
                acc + kv * kv + tikhonov_reg * kv * vectors[(i, j)] * n.sqrt()
            });
            norm_sq.max(0.0).sqrt()
        })
        .collect();
    Mat::from_fn(vectors.nrows(), vectors.ncols(), |i, j| {
        if norms[j] == 0.0 {
            0.0
        } else {
            vectors[(i, j)] / norms[j]
        }
    })
}

/// Randomized reduced rank regression.
///
/// A sketch `Ω` of width `rank + oversamples` is refined by power iterations against
/// `n⁻¹ K_Y K_X (K_X + nλI)⁻¹` and the problem is reduced to the small pencil
/// `(F₁, F₀)` with `F₀ = Ωᵗ K_X M⁻¹ Ω` and `F₁ = n⁻¹ (K_X M⁻¹ Ω)ᵗ K_Y (K_X M⁻¹ Ω)`.
/// When the pencil is not symmetric-definite the reduced problem falls back to the
/// general eigendecomposition of `F₀⁺ F₁`.
fn fit_randomized(
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    tikhonov_reg: f64,
    rank: usize,
    sketch: &RandomizedSketch,
) -> Result<Projections, KoopmanError> {
    let n = kernel_x.nrows();
    let inv_dim = 1.0 / n as f64;
    let penalty = tikhonov_reg.max(f64::EPSILON);
    let (m_llt, jitter) = jittered_cholesky(
        regularize(kernel_x, penalty).as_ref(),
        "regularized input kernel",
    )?;
    // `M = K_X + αI` exactly, including the jitter of the factorization.
    let alpha = n as f64 * penalty + jitter;

    let width = (rank + sketch.oversamples).min(n);
    let mut rng = StdRng::seed_from_u64(sketch.seed);
    let scaled_output = scaled(kernel_y, inv_dim);
    let mut omega = if sketch.optimal_sketching {
        covariance_sketch(&mut rng, scaled_output.as_ref(), width)?
    } else {
        gaussian_sketch(&mut rng, n, width)
    };

    for _ in 0..sketch.iterated_power {
        let k_omega = m_llt.solve(omega.as_ref());
        let powered = &scaled_output * (&omega - &k_omega * Scale(alpha));
        omega = economic_qr(powered.as_ref());
    }

    let k_omega = m_llt.solve(omega.as_ref());
    let k_omega_p = &omega - &k_omega * Scale(alpha);
    let f_0 = symmetrize((omega.transpose() * &k_omega_p).as_ref());
    let f_1 = symmetrize((k_omega_p.transpose() * (&scaled_output * &k_omega_p)).as_ref());

    let mut diagnostics = Diagnostics::new();
    let (values, q): (Vec<c64>, Mat<c64>) = match generalized_eigh(f_1.as_ref(), f_0.as_ref()) {
        Ok(eig) => (
            eig.values.iter().map(|&v| c64::new(v, 0.0)).collect(),
            to_complex(eig.vectors.as_ref()),
        ),
        Err(err) => {
            diagnostics.push(Diagnostic::SolverFallback {
                reason: format!("reduced generalized eigenproblem: {err}"),
            });
            let pinv = pseudo_inverse_symmetric(f_0.as_ref())?;
            let eig = general_eigen((&pinv * &f_1).as_ref())?;
            (eig.values, eig.vectors)
        }
    };

    let norms = batch_spd_norm(q.as_ref(), f_0.as_ref());
    let real_values: Vec<f64> = values.iter().map(|z| z.re).collect();
    let selected = topk(&real_values, rank);
    let q = Mat::from_fn(q.nrows(), selected.len(), |i, j| {
        let col = selected[j];
        if norms[col] == 0.0 {
            c64::new(0.0, 0.0)
        } else {
            q[(i, col)] * (1.0 / norms[col])
        }
    });

    let sqrt_n = (n as f64).sqrt();
    let u = real_part((to_complex(k_omega.as_ref()) * &q).as_ref());
    let v = real_part((to_complex(k_omega_p.as_ref()) * &q).as_ref());
    Ok(Projections {
        u: u * Scale(sqrt_n),
        v: v * Scale(sqrt_n),
        singular_values_sq: selected.iter().map(|&i| real_values[i]).collect(),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_truncation_stops_at_first_invalid_value() {
        // Sorted by magnitude: 4, -3 (invalid), 2. The valid 2 must not be kept.
        let values = [c64::new(2.0, 0.0), c64::new(-3.0, 0.0), c64::new(4.0, 0.0)];
        let vectors = to_complex(Mat::<f64>::identity(3, 3).as_ref());
        let mut diagnostics = Diagnostics::new();
        let (kept, vecs) = filter_spectrum(&values, vectors.as_ref(), 3, &mut diagnostics).unwrap();
        assert_eq!(kept, vec![4.0]);
        assert_eq!(vecs[(2, 0)], 1.0);
        assert!(diagnostics.has_rank_deficiency());
    }

    #[test]
    fn test_complex_values_are_invalid() {
        assert!(!is_valid(c64::new(1.0, 1e-3)));
        assert!(is_valid(c64::new(1.0, 1e-14)));
        assert!(!is_valid(c64::new(-1e-3, 0.0)));
    }

    #[test]
    fn test_phase_rotated_vector_is_recovered() {
        let phase = c64::new(0.6, 0.8);
        let column = Mat::from_fn(3, 1, |i, _| phase * (i as f64 + 1.0));
        let real = real_eigenvector(column.as_ref(), 0).unwrap();
        assert!((real[(2, 0)] - 3.0).abs() < 1e-12);
        assert!((real[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_genuinely_complex_vector_is_rejected() {
        let column = mat![[c64::new(1.0, 0.0)], [c64::new(0.0, 1.0)]];
        let err = real_eigenvector(column.as_ref(), 0).unwrap_err();
        assert!(matches!(err.kind(), KoopmanErrorKind::InvariantViolation(_)));
    }

    #[test]
    fn test_exact_fit_on_diagonal_kernels() {
        let kx = mat![[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.5]];
        let ky = mat![[1.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 2.0]];
        let fit =
            reduced_rank_regression(kx.as_ref(), ky.as_ref(), 0.0, 2, &SolverStrategy::Exact)
                .unwrap();
        assert_eq!(fit.rank(), 2);
        // σ² = K_Y,ii / 3 for a zero regularization (up to the ε floor).
        assert!((fit.singular_values_sq[0] - 1.0).abs() < 1e-10);
        assert!((fit.singular_values_sq[1] - 2.0 / 3.0).abs() < 1e-10);
        assert!((&fit.v - &kx * &fit.u).norm_l2() < 1e-14);
    }
}
