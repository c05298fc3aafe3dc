//! Spectral decomposition of a fitted estimator.

use crate::{
    error::{KoopmanError, ensure_shape},
    linalg::{batch_spd_norm, general_eigen_left_right, to_complex},
};
use faer::{Mat, MatMut, MatRef, Scale, c64, linalg::solvers::Solve, prelude::Reborrow};
use std::{cmp::Ordering, ops::Range};

/// Eigenvalues closer than this, relative to `max(1, ρ)`, form one cluster.
const CLUSTER_TOLERANCE: f64 = 1e-8;

/// Eigenvalues and biorthogonal eigenvectors of an estimator, expressed as
/// coefficients over the training samples.
#[derive(Debug, Clone)]
pub struct SpectralDecomposition {
    /// Eigenvalues in ascending order (real part first, then imaginary part).
    pub values: Vec<c64>,
    /// `n × r` left eigenvectors, `V · vl`; column `i` pairs with `values[i]`.
    pub left: Mat<c64>,
    /// `n × r` right eigenvectors, `U · vr`; unit norm in the RKHS of the inputs.
    pub right: Mat<c64>,
}

impl SpectralDecomposition {
    pub fn rank(&self) -> usize {
        self.values.len()
    }
}

fn ascending(a: &c64, b: &c64) -> Ordering {
    a.re.partial_cmp(&b.re)
        .unwrap_or(Ordering::Equal)
        .then(a.im.partial_cmp(&b.im).unwrap_or(Ordering::Equal))
}

/// Ranges of consecutive sorted eigenvalues that coincide up to [`CLUSTER_TOLERANCE`].
fn clusters(values: &[c64]) -> Vec<Range<usize>> {
    let radius = values.iter().fold(1.0_f64, |acc, v| acc.max(v.norm()));
    let tolerance = CLUSTER_TOLERANCE * radius;
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=values.len() {
        if i == values.len() || (values[i] - values[i - 1]).norm() > tolerance {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges
}

/// Rescales the left eigenvectors `vl_c` of one cluster so that `vl_cᵗ W_YX vr_c = I`.
///
/// Inside an eigenspace of dimension > 1 the left and right bases returned by the
/// eigensolver are unrelated, so the whole pairing block `P = vl_cᵗ W_YX vr_c` is
/// inverted: `vl_c ← vl_c P⁻ᵗ`. A singular block (defective eigenvalue) falls back to
/// column-wise scaling, and zero pairings yield zero vectors.
fn pair_cluster(mut vl_c: MatMut<'_, c64>, w_yx: MatRef<'_, c64>, vr_c: MatRef<'_, c64>) {
    let pairing = vl_c.rb().transpose() * (w_yx * vr_c);
    let k = pairing.nrows();

    if k > 1 {
        let corrected = pairing.partial_piv_lu().solve(vl_c.rb().transpose());
        let finite = (0..corrected.ncols()).all(|j| {
            (0..k).all(|i| corrected[(i, j)].re.is_finite() && corrected[(i, j)].im.is_finite())
        });
        if finite {
            vl_c.copy_from(corrected.transpose());
            return;
        }
        log::warn!("singular pairing block in a cluster of {k} eigenvalues, scaling column-wise");
    }
    for j in 0..k {
        let d = pairing[(j, j)];
        for i in 0..vl_c.nrows() {
            vl_c[(i, j)] = if d.norm() == 0.0 {
                c64::new(0.0, 0.0)
            } else {
                vl_c[(i, j)] / d
            };
        }
    }
}

/// Eigendecomposition of the estimator defined by the projections `(U, V)`.
///
/// The compressed operator `W_YX = n⁻¹ Vᵗ K_YX U` is diagonalized; right eigenvectors
/// are normalized under `W_X = n⁻¹ Uᵗ K_X U` and left eigenvectors are chosen so that
/// `Lᵗ W_YX R = I`, repeated eigenvalues included. Zero norms yield zero vectors.
pub fn estimator_eig(
    u: MatRef<'_, f64>,
    v: MatRef<'_, f64>,
    kernel_x: MatRef<'_, f64>,
    kernel_yx: MatRef<'_, f64>,
) -> Result<SpectralDecomposition, KoopmanError> {
    let (n, r) = (u.nrows(), u.ncols());
    ensure_shape("V", (v.nrows(), v.ncols()), (n, r))?;
    ensure_shape("kernel_X", (kernel_x.nrows(), kernel_x.ncols()), (n, n))?;
    ensure_shape("kernel_YX", (kernel_yx.nrows(), kernel_yx.ncols()), (n, n))?;

    let inv_dim = (n as f64).recip();
    let w_yx = v.transpose() * kernel_yx * u * Scale(inv_dim);
    let w_x = u.transpose() * kernel_x * u * Scale(inv_dim);

    let eig = general_eigen_left_right(w_yx.as_ref())?;
    let mut perm: Vec<usize> = (0..r).collect();
    perm.sort_by(|&a, &b| ascending(&eig.values[a], &eig.values[b]));
    let values: Vec<c64> = perm.iter().map(|&i| eig.values[i]).collect();
    let vr = Mat::from_fn(r, r, |i, j| eig.right[(i, perm[j])]);
    let vl = Mat::from_fn(r, r, |i, j| eig.left[(i, perm[j])]);

    let norms = batch_spd_norm(vr.as_ref(), w_x.as_ref());
    let vr = Mat::from_fn(r, r, |i, j| {
        if norms[j] == 0.0 {
            c64::new(0.0, 0.0)
        } else {
            vr[(i, j)] * norms[j].recip()
        }
    });

    let w_yx_c = to_complex(w_yx.as_ref());
    let mut vl = vl;
    for cluster in clusters(&values) {
        let vr_c = vr.as_ref().get(.., cluster.clone());
        pair_cluster(vl.as_mut().get_mut(.., cluster), w_yx_c.as_ref(), vr_c);
    }

    Ok(SpectralDecomposition {
        values,
        left: to_complex(v) * &vl,
        right: to_complex(u) * &vr,
    })
}
