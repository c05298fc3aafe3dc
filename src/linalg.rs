//! Dense linear-algebra primitives used by the estimators.
//!
//! Every routine here operates on [`faer`] matrices and returns owned results. The
//! module gathers the building blocks that the fitting, spectral and risk routines
//! share:
//!
//! - symmetric, general (left/right) and generalized symmetric eigendecompositions,
//! - weighted (RKHS) norms under a possibly asymmetric PSD-like matrix,
//! - Cholesky factorizations (with an optional diagonal jitter retry) and triangular solves,
//! - minimum-norm least squares and symmetric pseudo-inverses,
//! - modified Gram-Schmidt QR, optionally column-pivoted and under a weighted inner product,
//! - small helpers (`topk`, fuzzy complex parsing, integer matrix powers).

use crate::error::{KoopmanError, KoopmanErrorKind};
use faer::{
    Mat, MatMut, MatRef, Par, Scale, Side, c64,
    linalg::{
        solvers::Llt,
        triangular_solve::{solve_lower_triangular_in_place, solve_upper_triangular_in_place},
    },
};
use std::cmp::Ordering;

/// Relative threshold, in units of machine epsilon, under which the real or imaginary
/// part of an eigenvalue is snapped to zero by [`fuzzy_parse_complex`].
const FUZZY_EPS_FACTOR: f64 = 1e3;

/// Relative column-norm threshold (w.r.t. the largest initial column) under which the
/// pivoted QR declares the remaining columns numerically dependent.
const QR_RANK_EPS_FACTOR: f64 = 1e3;

/// Maximum number of diagonal-jitter increases attempted by [`jittered_cholesky`].
const MAX_JITTER_ATTEMPTS: usize = 12;

/// Real eigenpairs of a symmetric (or symmetric-definite) problem.
#[derive(Debug, Clone)]
pub struct Eigenpairs {
    pub values: Vec<f64>,
    pub vectors: Mat<f64>,
}

/// Complex eigenpairs of a general real matrix.
#[derive(Debug, Clone)]
pub struct ComplexEigenpairs {
    pub values: Vec<c64>,
    pub vectors: Mat<c64>,
}

/// Eigenvalues of a general real matrix `A` with matched right and left eigenvectors.
///
/// Column `i` of `right` satisfies `A r = λ_i r` and column `i` of `left` satisfies
/// `lᵗ A = λ_i lᵗ` (plain transpose, no conjugation), so the pairing is index-aligned.
#[derive(Debug, Clone)]
pub struct GeneralEigen {
    pub values: Vec<c64>,
    pub left: Mat<c64>,
    pub right: Mat<c64>,
}

/// Column-pivoted modified Gram-Schmidt factorization.
#[derive(Debug, Clone)]
pub struct PivotedQr {
    /// Orthonormal columns (under the requested inner product), `rank` of them.
    pub q: Mat<f64>,
    /// `permutation[j]` is the original index of the column that produced `q.col(j)`.
    pub permutation: Vec<usize>,
    /// Numerical rank detected during the factorization.
    pub rank: usize,
}

/// Returns `c * a` as a new matrix.
pub(crate) fn scaled(a: MatRef<'_, f64>, c: f64) -> Mat<f64> {
    a * Scale(c)
}

/// Lifts a real matrix to the complex field.
pub(crate) fn to_complex(a: MatRef<'_, f64>) -> Mat<c64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| c64::new(a[(i, j)], 0.0))
}

/// Real part of a complex matrix.
pub(crate) fn real_part(a: MatRef<'_, c64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)].re)
}

/// Returns the symmetric part `(a + aᵗ) / 2`.
pub(crate) fn symmetrize(a: MatRef<'_, f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| 0.5 * (a[(i, j)] + a[(j, i)]))
}

/// Eigendecomposition of a symmetric matrix, eigenvalues in ascending order.
///
/// Only the lower triangle of `a` is read.
pub fn symmetric_eigen(a: MatRef<'_, f64>) -> Result<Eigenpairs, KoopmanError> {
    let n = a.nrows();
    if n == 0 {
        return Ok(Eigenpairs {
            values: Vec::new(),
            vectors: Mat::zeros(0, 0),
        });
    }
    let evd = a.self_adjoint_eigen(Side::Lower)?;
    let diag = evd.S();
    let values = (0..n).map(|i| diag[i]).collect();
    Ok(Eigenpairs {
        values,
        vectors: evd.U().to_owned(),
    })
}

/// Eigendecomposition of a general real matrix (right eigenvectors only).
pub fn general_eigen(a: MatRef<'_, f64>) -> Result<ComplexEigenpairs, KoopmanError> {
    let n = a.nrows();
    if n == 0 {
        return Ok(ComplexEigenpairs {
            values: Vec::new(),
            vectors: Mat::zeros(0, 0),
        });
    }
    let evd = a.eigen()?;
    let diag = evd.S();
    let values = (0..n).map(|i| diag[i]).collect();
    Ok(ComplexEigenpairs {
        values,
        vectors: evd.U().to_owned(),
    })
}

/// Eigendecomposition of a general real matrix with both left and right eigenvectors.
///
/// Left eigenvectors are the right eigenvectors of `aᵗ`. The two spectra are computed
/// independently, so each left eigenvector is assigned to the right eigenvalue nearest
/// to its own (greedily, in the order of the right spectrum).
pub fn general_eigen_left_right(a: MatRef<'_, f64>) -> Result<GeneralEigen, KoopmanError> {
    let n = a.nrows();
    let mut right = general_eigen(a)?;
    let mut left = general_eigen(a.transpose())?;
    fuzzy_parse_complex(&mut right.values);
    fuzzy_parse_complex(&mut left.values);

    let mut used = vec![false; n];
    let mut paired_left = Mat::<c64>::zeros(n, n);
    for (i, &lambda) in right.values.iter().enumerate() {
        let best = (0..n)
            .filter(|&j| !used[j])
            .min_by(|&p, &q| {
                let dp = (left.values[p] - lambda).norm();
                let dq = (left.values[q] - lambda).norm();
                dp.partial_cmp(&dq).unwrap_or(Ordering::Equal)
            })
            .ok_or_else(|| {
                KoopmanError::from(KoopmanErrorKind::ConvergenceFailure(
                    "left and right spectra have different sizes".to_string(),
                ))
            })?;
        used[best] = true;
        paired_left.col_mut(i).copy_from(left.vectors.col(best));
    }

    Ok(GeneralEigen {
        values: right.values,
        left: paired_left,
        right: right.vectors,
    })
}

/// Solves the symmetric-definite generalized eigenproblem `a v = λ b v`.
///
/// `b` is whitened through its own eigendecomposition, `b = Q Λ Qᵗ`, and the
/// symmetrized whitened operator `½ Wᵗ (a + aᵗ) W` with `W = Q Λ^{-1/2}` is diagonalized.
/// Eigenvalues are ascending and the eigenvectors are `b`-orthonormal.
///
/// Fails with [`KoopmanErrorKind::NotPositiveDefinite`] when `b` has an eigenvalue that
/// is not numerically positive.
pub fn generalized_eigh(
    a: MatRef<'_, f64>,
    b: MatRef<'_, f64>,
) -> Result<Eigenpairs, KoopmanError> {
    let n = b.nrows();
    let b_eig = symmetric_eigen(b)?;
    let largest = b_eig.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let threshold = (n.max(1) as f64) * f64::EPSILON * largest;
    if b_eig.values.iter().any(|&v| v <= threshold) || largest == 0.0 {
        return Err(KoopmanErrorKind::NotPositiveDefinite {
            context: "right-hand side of a generalized eigenproblem",
        }
        .into());
    }

    let whitening = Mat::from_fn(n, n, |i, j| b_eig.vectors[(i, j)] / b_eig.values[j].sqrt());
    let whitened = whitening.transpose() * a * &whitening;
    let c = symmetrize(whitened.as_ref());
    let c_eig = symmetric_eigen(c.as_ref())?;

    Ok(Eigenpairs {
        values: c_eig.values,
        vectors: &whitening * &c_eig.vectors,
    })
}

/// Weighted norm `sqrt(Re(vᴴ S v))` of a (possibly complex) vector, where `S` is the
/// Hermitian part `½ (m + mᵗ)` of the weighting matrix.
///
/// Negative quadratic forms produced by round-off are clamped to zero.
pub fn spd_norm(vector: MatRef<'_, c64>, m: MatRef<'_, f64>) -> f64 {
    debug_assert_eq!(vector.ncols(), 1);
    batch_spd_norm(vector, m)[0]
}

/// Column-wise [`spd_norm`].
///
/// For `v = a + i b`, `Re(vᴴ S v) = aᵗ S a + bᵗ S b` because `S` is real symmetric.
pub fn batch_spd_norm(vectors: MatRef<'_, c64>, m: MatRef<'_, f64>) -> Vec<f64> {
    let s = symmetrize(m);
    let re = Mat::from_fn(vectors.nrows(), vectors.ncols(), |i, j| vectors[(i, j)].re);
    let im = Mat::from_fn(vectors.nrows(), vectors.ncols(), |i, j| vectors[(i, j)].im);
    let s_re = &s * &re;
    let s_im = &s * &im;

    (0..vectors.ncols())
        .map(|j| {
            let mut quad = 0.0;
            for i in 0..vectors.nrows() {
                quad += re[(i, j)] * s_re[(i, j)] + im[(i, j)] * s_im[(i, j)];
            }
            quad.max(0.0).sqrt()
        })
        .collect()
}

/// Real-valued counterpart of [`batch_spd_norm`].
pub(crate) fn batch_spd_norm_real(vectors: MatRef<'_, f64>, m: MatRef<'_, f64>) -> Vec<f64> {
    let s = symmetrize(m);
    let sv = &s * vectors;
    (0..vectors.ncols())
        .map(|j| {
            let mut quad = 0.0;
            for i in 0..vectors.nrows() {
                quad += vectors[(i, j)] * sv[(i, j)];
            }
            quad.max(0.0).sqrt()
        })
        .collect()
}

/// Cholesky factorization `a = L Lᵗ`.
pub fn cholesky(a: MatRef<'_, f64>, context: &'static str) -> Result<Llt<f64>, KoopmanError> {
    a.llt(Side::Lower)
        .map_err(|_| KoopmanErrorKind::NotPositiveDefinite { context }.into())
}

/// Cholesky factorization of a positive semi-definite matrix.
///
/// When `a` is numerically singular, a diagonal jitter starting at `n·ε·max(diag)` is
/// added and increased tenfold until the factorization succeeds. Returns the factor
/// together with the jitter that was used (zero when none was needed).
pub fn jittered_cholesky(
    a: MatRef<'_, f64>,
    context: &'static str,
) -> Result<(Llt<f64>, f64), KoopmanError> {
    if let Ok(llt) = a.llt(Side::Lower) {
        return Ok((llt, 0.0));
    }
    let n = a.nrows();
    let max_diag = (0..n).fold(0.0_f64, |acc, i| acc.max(a[(i, i)].abs()));
    let mut jitter = (n as f64) * f64::EPSILON * max_diag.max(f64::MIN_POSITIVE);
    for _ in 0..MAX_JITTER_ATTEMPTS {
        let mut shifted = a.to_owned();
        for i in 0..n {
            shifted[(i, i)] += jitter;
        }
        if let Ok(llt) = shifted.as_ref().llt(Side::Lower) {
            log::debug!("Cholesky of {context} required a diagonal jitter of {jitter:.3e}");
            return Ok((llt, jitter));
        }
        jitter *= 10.0;
    }
    Err(KoopmanErrorKind::NotPositiveDefinite { context }.into())
}

/// Overwrites `rhs` with `L⁻¹ rhs` for a lower-triangular `l`.
pub(crate) fn solve_lower_in_place(l: MatRef<'_, f64>, rhs: MatMut<'_, f64>) {
    solve_lower_triangular_in_place(l, rhs, Par::Seq);
}

/// Overwrites `rhs` with `L⁻ᵗ rhs` for a lower-triangular `l`.
pub(crate) fn solve_lower_transpose_in_place(l: MatRef<'_, f64>, rhs: MatMut<'_, f64>) {
    solve_upper_triangular_in_place(l.transpose(), rhs, Par::Seq);
}

/// Minimum-norm least-squares solution of `a x = b`.
///
/// Computed through a thin SVD; singular values below `ε·max(m, n)·σ_max` are treated
/// as zero.
pub fn lstsq(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Result<Mat<f64>, KoopmanError> {
    let svd = a.thin_svd().map_err(|err| {
        KoopmanError::from(KoopmanErrorKind::ConvergenceFailure(format!(
            "SVD in least-squares solve: {err:?}"
        )))
    })?;
    let s = svd.S();
    let k = a.nrows().min(a.ncols());
    let s_max = (0..k).fold(0.0_f64, |acc, i| acc.max(s[i]));
    let cutoff = f64::EPSILON * (a.nrows().max(a.ncols()) as f64) * s_max;

    let utb = svd.U().transpose() * b;
    let scaled_utb = Mat::from_fn(k, b.ncols(), |i, j| {
        if s[i] > cutoff {
            utb[(i, j)] / s[i]
        } else {
            0.0
        }
    });
    Ok(svd.V() * &scaled_utb)
}

/// Pseudo-inverse of a symmetric matrix through its eigendecomposition.
pub fn pseudo_inverse_symmetric(a: MatRef<'_, f64>) -> Result<Mat<f64>, KoopmanError> {
    let n = a.nrows();
    let eig = symmetric_eigen(a)?;
    let largest = eig.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let cutoff = (n.max(1) as f64) * f64::EPSILON * largest;
    let inverted = Mat::from_fn(n, n, |i, j| {
        let v = eig.values[j];
        if v.abs() > cutoff {
            eig.vectors[(i, j)] / v
        } else {
            0.0
        }
    });
    Ok(&inverted * eig.vectors.transpose())
}

/// Modified Gram-Schmidt QR under the inner product `⟨x, y⟩ = xᵗ M y`
/// (`M = I` when `inner` is `None`).
///
/// With `column_pivoting`, the remaining column of largest norm is processed first and
/// the factorization stops as soon as every remaining column is numerically zero. The
/// returned `permutation` maps each computed column back to its original index.
pub fn modified_qr(
    a: MatRef<'_, f64>,
    inner: Option<MatRef<'_, f64>>,
    column_pivoting: bool,
) -> PivotedQr {
    let (n, k) = (a.nrows(), a.ncols());
    let mut work = a.to_owned();
    let mut permutation: Vec<usize> = (0..k).collect();
    let mut q = Mat::<f64>::zeros(n, k);
    let mut rank = 0;

    let weight = inner.map(symmetrize);
    let norms_of = |w: &Mat<f64>| -> Vec<f64> {
        match &weight {
            Some(m) => batch_spd_norm_real(w.as_ref(), m.as_ref()),
            None => (0..w.ncols()).map(|j| w.col(j).norm_l2()).collect(),
        }
    };
    let initial_max = norms_of(&work).into_iter().fold(0.0_f64, f64::max);
    let tolerance = QR_RANK_EPS_FACTOR * f64::EPSILON * initial_max;

    for j in 0..k {
        let norms = norms_of(&work);
        let norm = if column_pivoting {
            let pivot = (j..k)
                .max_by(|&p, &r| norms[p].partial_cmp(&norms[r]).unwrap_or(Ordering::Equal))
                .unwrap_or(j);
            if norms[pivot] <= tolerance {
                break;
            }
            if pivot != j {
                for row in 0..n {
                    let tmp = work[(row, j)];
                    work[(row, j)] = work[(row, pivot)];
                    work[(row, pivot)] = tmp;
                }
                permutation.swap(j, pivot);
            }
            norms[pivot]
        } else {
            if norms[j] <= tolerance {
                continue;
            }
            permutation[rank] = permutation[j];
            norms[j]
        };

        for row in 0..n {
            q[(row, rank)] = work[(row, j)] / norm;
        }

        // Remove the new direction from the columns that are still to be processed.
        let q_col = q.as_ref().get(.., rank..rank + 1);
        let weighted_q = match &weight {
            Some(m) => m * q_col,
            None => q_col.to_owned(),
        };
        for col in (j + 1)..k {
            let mut tau = 0.0;
            for row in 0..n {
                tau += weighted_q[(row, 0)] * work[(row, col)];
            }
            for row in 0..n {
                work[(row, col)] -= tau * q[(row, rank)];
            }
        }
        rank += 1;
    }

    PivotedQr {
        q: q.as_ref().get(.., 0..rank).to_owned(),
        permutation: permutation[..rank].to_vec(),
        rank,
    }
}

/// Orthonormal basis of the column space of `a`, with the same number of columns.
///
/// Classical Gram-Schmidt applied twice per column; a column that collapses numerically
/// is left at zero.
pub fn economic_qr(a: MatRef<'_, f64>) -> Mat<f64> {
    let (n, k) = (a.nrows(), a.ncols());
    let mut q = a.to_owned();
    let scale = (0..k).fold(0.0_f64, |acc, j| acc.max(a.col(j).norm_l2()));
    let tolerance = (n.max(1) as f64) * f64::EPSILON * scale;

    for j in 0..k {
        for _ in 0..2 {
            for p in 0..j {
                let mut dot = 0.0;
                for row in 0..n {
                    dot += q[(row, p)] * q[(row, j)];
                }
                for row in 0..n {
                    q[(row, j)] -= dot * q[(row, p)];
                }
            }
        }
        let norm = q.col(j).norm_l2();
        for row in 0..n {
            q[(row, j)] = if norm > tolerance {
                q[(row, j)] / norm
            } else {
                0.0
            };
        }
    }
    q
}

/// Indices of the `k` largest entries of `values`, in descending order of value.
pub fn topk(values: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(k);
    order
}

/// Snaps numerically negligible real/imaginary parts of eigenvalues to zero and turns
/// near-conjugate pairs into exact conjugates.
///
/// The tolerance is `1e3·ε·max(1, ρ)` where `ρ` is the largest modulus in `values`.
pub fn fuzzy_parse_complex(values: &mut [c64]) {
    let radius = values.iter().fold(1.0_f64, |acc, z| acc.max(z.norm()));
    let tolerance = FUZZY_EPS_FACTOR * f64::EPSILON * radius;

    for z in values.iter_mut() {
        if z.im.abs() <= tolerance {
            z.im = 0.0;
        }
        if z.re.abs() <= tolerance {
            z.re = 0.0;
        }
    }
    for i in 0..values.len() {
        if values[i].im <= 0.0 {
            continue;
        }
        for j in 0..values.len() {
            if i != j && (values[j] - values[i].conj()).norm() <= tolerance {
                values[j] = values[i].conj();
            }
        }
    }
}

/// Integer power of a square matrix by repeated squaring (`a⁰ = I`).
pub fn matrix_power(a: MatRef<'_, f64>, mut exponent: usize) -> Mat<f64> {
    let n = a.nrows();
    let mut result = Mat::<f64>::identity(n, n);
    let mut base = a.to_owned();
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = &result * &base;
        }
        exponent >>= 1;
        if exponent > 0 {
            base = &base * &base;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    fn spd_test_matrix() -> Mat<f64> {
        mat![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]]
    }

    #[test]
    fn test_symmetric_eigen_reconstructs() {
        let a = spd_test_matrix();
        let eig = symmetric_eigen(a.as_ref()).unwrap();
        assert!(eig.values.windows(2).all(|w| w[0] <= w[1]));
        let d = Mat::from_fn(3, 3, |i, j| if i == j { eig.values[i] } else { 0.0 });
        let rebuilt = &eig.vectors * &d * eig.vectors.transpose();
        assert!((&rebuilt - &a).norm_l2() < 1e-12);
    }

    #[test]
    fn test_generalized_eigh_residual_and_normalization() {
        let a = mat![[2.0, 0.3, 0.0], [0.3, 1.0, 0.1], [0.0, 0.1, 0.5]];
        let b = spd_test_matrix();
        let eig = generalized_eigh(a.as_ref(), b.as_ref()).unwrap();
        for j in 0..3 {
            let v = eig.vectors.as_ref().get(.., j..j + 1);
            let residual = &a * v - (&b * v) * Scale(eig.values[j]);
            assert!(residual.norm_l2() < 1e-10);
        }
        let gram = eig.vectors.transpose() * &b * &eig.vectors;
        assert!((&gram - Mat::<f64>::identity(3, 3)).norm_l2() < 1e-10);
    }

    #[test]
    fn test_generalized_eigh_rejects_singular_rhs() {
        let a = spd_test_matrix();
        let b = mat![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let err = generalized_eigh(a.as_ref(), b.as_ref()).unwrap_err();
        assert!(matches!(
            err.kind(),
            KoopmanErrorKind::NotPositiveDefinite { .. }
        ));
    }

    #[test]
    fn test_spd_norm_uses_hermitian_part() {
        // The antisymmetric part of the weight must not contribute.
        let m = mat![[2.0, 5.0], [-5.0, 2.0]];
        let v = mat![[c64::new(1.0, 0.0)], [c64::new(0.0, 1.0)]];
        let norm = spd_norm(v.as_ref(), m.as_ref());
        assert!((norm - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_batch_spd_norm_clamps_negative_forms() {
        let m = mat![[-1.0, 0.0], [0.0, 1.0]];
        let v = mat![[c64::new(1.0, 0.0), c64::new(0.0, 0.0)], [c64::new(0.0, 0.0), c64::new(3.0, 0.0)]];
        let norms = batch_spd_norm(v.as_ref(), m.as_ref());
        assert_eq!(norms[0], 0.0);
        assert!((norms[1] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_lstsq_matches_exact_solution() {
        let a = spd_test_matrix();
        let x_true = mat![[1.0, -1.0], [2.0, 0.5], [-0.5, 3.0]];
        let b = &a * &x_true;
        let x = lstsq(a.as_ref(), b.as_ref()).unwrap();
        assert!((&x - &x_true).norm_l2() < 1e-10);
    }

    #[test]
    fn test_lstsq_minimum_norm_on_singular_system() {
        let a = mat![[1.0, 1.0], [1.0, 1.0]];
        let b = mat![[2.0], [2.0]];
        let x = lstsq(a.as_ref(), b.as_ref()).unwrap();
        assert!((x[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((x[(1, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pivoted_qr_detects_rank_and_pivots() {
        // Third column is the sum of the first two; second column has the largest norm.
        let a = mat![[1.0, 0.0, 1.0], [0.0, 5.0, 5.0], [0.0, 0.0, 0.0]];
        let qr = modified_qr(a.as_ref(), None, true);
        assert_eq!(qr.rank, 2);
        assert_eq!(qr.permutation[0], 2);
        let gram = qr.q.transpose() * &qr.q;
        assert!((&gram - Mat::<f64>::identity(2, 2)).norm_l2() < 1e-12);
    }

    #[test]
    fn test_weighted_qr_is_orthonormal_under_weight() {
        let m = spd_test_matrix();
        let a = mat![[1.0, 2.0], [0.0, 1.0], [1.0, 0.0]];
        let qr = modified_qr(a.as_ref(), Some(m.as_ref()), false);
        assert_eq!(qr.rank, 2);
        let gram = qr.q.transpose() * &m * &qr.q;
        assert!((&gram - Mat::<f64>::identity(2, 2)).norm_l2() < 1e-12);
    }

    #[test]
    fn test_economic_qr_orthonormal() {
        let a = mat![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
        let q = economic_qr(a.as_ref());
        let gram = q.transpose() * &q;
        assert!((&gram - Mat::<f64>::identity(2, 2)).norm_l2() < 1e-12);
    }

    #[test]
    fn test_topk_descending() {
        assert_eq!(topk(&[0.5, 3.0, -1.0, 2.0], 2), vec![1, 3]);
        assert_eq!(topk(&[1.0], 4), vec![0]);
    }

    #[test]
    fn test_fuzzy_parse_snaps_noise() {
        let mut values = vec![
            c64::new(0.5, 1e-17),
            c64::new(1e-18, 2.0),
            c64::new(0.3, 0.4),
            c64::new(0.3 + 1e-17, -0.4),
        ];
        fuzzy_parse_complex(&mut values);
        assert_eq!(values[0], c64::new(0.5, 0.0));
        assert_eq!(values[1], c64::new(0.0, 2.0));
        assert_eq!(values[3], values[2].conj());
    }

    #[test]
    fn test_general_eigen_left_right_pairing() {
        let a = mat![[0.9, 0.4, 0.0], [-0.4, 0.9, 0.1], [0.0, 0.0, 0.3]];
        let eig = general_eigen_left_right(a.as_ref()).unwrap();
        let ac = to_complex(a.as_ref());
        for i in 0..3 {
            let lambda = eig.values[i];
            let r = eig.right.as_ref().get(.., i..i + 1);
            let l = eig.left.as_ref().get(.., i..i + 1);
            let right_res = &ac * r - r * Scale(lambda);
            let left_res = l.transpose() * &ac - l.transpose() * Scale(lambda);
            assert!(right_res.norm_l2() < 1e-10);
            assert!(left_res.norm_l2() < 1e-10);
        }
    }

    #[test]
    fn test_matrix_power() {
        let a = mat![[1.0, 1.0], [0.0, 1.0]];
        assert_eq!(matrix_power(a.as_ref(), 0), Mat::<f64>::identity(2, 2));
        let a5 = matrix_power(a.as_ref(), 5);
        assert_eq!(a5, mat![[1.0, 5.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_jittered_cholesky_on_singular_psd() {
        let a = mat![[1.0, 1.0], [1.0, 1.0]];
        let (llt, _jitter) = jittered_cholesky(a.as_ref(), "test matrix").unwrap();
        let l = llt.L();
        let rebuilt = l * l.transpose();
        assert!((&rebuilt - &a).norm_l2() < 1e-6);
    }
}
