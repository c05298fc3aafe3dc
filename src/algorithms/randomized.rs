//! Randomized sketches and the randomized range finder.
//!
//! All routines draw from a single [`StdRng`] stream, column by column, so a
//! sketch only depends on the seed and its shape.

use crate::{
    error::{KoopmanError, KoopmanErrorKind, invalid_argument},
    linalg::{economic_qr, symmetric_eigen, topk},
};
use faer::{Mat, MatRef};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};

/// Draws an `nrows × ncols` matrix of i.i.d. standard normal entries.
pub fn gaussian_sketch(rng: &mut StdRng, nrows: usize, ncols: usize) -> Mat<f64> {
    let mut sketch = Mat::<f64>::zeros(nrows, ncols);
    for j in 0..ncols {
        for i in 0..nrows {
            sketch[(i, j)] = StandardNormal.sample(rng);
        }
    }
    sketch
}

/// Draws `ncols` samples of the centered Gaussian `N(0, covariance)` as columns.
///
/// The covariance is factored through its eigendecomposition, `C = Q Λ Qᵗ`, and the
/// sketch is `Q Λ^{1/2} Z` with `Z` standard normal. Negative eigenvalues produced by
/// round-off are clamped to zero.
pub fn covariance_sketch(
    rng: &mut StdRng,
    covariance: MatRef<'_, f64>,
    ncols: usize,
) -> Result<Mat<f64>, KoopmanError> {
    let n = covariance.nrows();
    let eig = symmetric_eigen(covariance)?;
    let factor = Mat::from_fn(n, n, |i, j| eig.vectors[(i, j)] * eig.values[j].max(0.0).sqrt());
    let z = gaussian_sketch(rng, n, ncols);
    Ok(&factor * &z)
}

/// Output of [`randomized_svd`]: the leading left singular vectors and values.
#[derive(Debug, Clone)]
pub struct RandomizedSvd {
    pub u: Mat<f64>,
    /// Singular values, in descending order.
    pub s: Vec<f64>,
}

/// Orthonormal basis approximating the range of `a`, with `size` columns.
///
/// Runs `n_iter` power iterations `Q ← qr(A Aᵗ Q)`, re-orthonormalizing after every
/// product.
pub fn randomized_range_finder(
    a: MatRef<'_, f64>,
    size: usize,
    n_iter: usize,
    rng: &mut StdRng,
) -> Mat<f64> {
    let omega = gaussian_sketch(rng, a.ncols(), size);
    let mut q = economic_qr((a * &omega).as_ref());
    for _ in 0..n_iter {
        q = economic_qr((a.transpose() * &q).as_ref());
        q = economic_qr((a * &q).as_ref());
    }
    q
}

/// Truncated SVD of `a` via the randomized range finder.
///
/// The sketch has `rank + oversamples` columns (capped at the smaller dimension of
/// `a`); the small projected matrix `B = Qᵗ A` is decomposed exactly through the
/// eigendecomposition of `B Bᵗ`.
pub fn randomized_svd(
    a: MatRef<'_, f64>,
    rank: usize,
    oversamples: usize,
    n_iter: usize,
    seed: u64,
) -> Result<RandomizedSvd, KoopmanError> {
    let max_rank = a.nrows().min(a.ncols());
    if rank == 0 || rank > max_rank {
        return Err(invalid_argument(format!(
            "randomized SVD rank must lie in 1..={max_rank}, got {rank}."
        )));
    }
    let size = (rank + oversamples).min(max_rank);
    let mut rng = StdRng::seed_from_u64(seed);
    let q = randomized_range_finder(a, size, n_iter, &mut rng);

    let b = q.transpose() * a;
    let gram = &b * b.transpose();
    let eig = symmetric_eigen(gram.as_ref())?;
    if eig.values.iter().any(|v| !v.is_finite()) {
        return Err(KoopmanErrorKind::ConvergenceFailure(
            "non-finite values in the sketched Gram matrix".to_string(),
        )
        .into());
    }

    let s_all: Vec<f64> = eig.values.iter().map(|v| v.max(0.0).sqrt()).collect();
    let order = topk(&s_all, rank);
    let selected = Mat::from_fn(size, order.len(), |i, j| eig.vectors[(i, order[j])]);
    Ok(RandomizedSvd {
        u: &q * &selected,
        s: order.iter().map(|&i| s_all[i]).collect(),
    })
}
