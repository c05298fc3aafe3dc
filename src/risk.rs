//! Held-out risk and singular values of a fitted estimator.

use crate::{
    error::{KoopmanError, ensure_shape},
    linalg::general_eigen,
};
use faer::{MatRef, Scale};
use std::cmp::Ordering;

/// Neumaier-compensated running sum.
#[derive(Debug, Default, Clone, Copy)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    fn total(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Estimates the squared-error risk of the estimator on validation data.
///
/// Computes
///
/// ```text
/// n_val⁻¹ tr(K_Yv) − 2 n_val⁻¹ n⁻¹ tr(K_YYvᵗ V Uᵗ K_XXv) + n_val⁻¹ n⁻² tr(K_XXvᵗ U Vᵗ K_Y V Uᵗ K_XXv)
/// ```
///
/// The three traces are not formed separately: the terms are combined point by point
/// over the validation set and accumulated with a compensated sum, so that large
/// traces cancel before rounding.
///
/// # Arguments
/// * `kernel_yv`: `n_val × n_val` kernel of the validation outputs.
/// * `kernel_y`: `n × n` kernel of the training outputs.
/// * `kernel_xxv`: `n × n_val` cross-kernel of training and validation inputs.
/// * `kernel_yyv`: `n × n_val` cross-kernel of training and validation outputs.
/// * `u`, `v`: `n × r` projections.
pub fn estimator_risk(
    kernel_yv: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
    kernel_xxv: MatRef<'_, f64>,
    kernel_yyv: MatRef<'_, f64>,
    u: MatRef<'_, f64>,
    v: MatRef<'_, f64>,
) -> Result<f64, KoopmanError> {
    let (n, r) = (u.nrows(), u.ncols());
    let n_val = kernel_yv.nrows();
    ensure_shape("V", (v.nrows(), v.ncols()), (n, r))?;
    ensure_shape("kernel_Yv", (kernel_yv.nrows(), kernel_yv.ncols()), (n_val, n_val))?;
    ensure_shape("kernel_Y", (kernel_y.nrows(), kernel_y.ncols()), (n, n))?;
    ensure_shape("kernel_XXv", (kernel_xxv.nrows(), kernel_xxv.ncols()), (n, n_val))?;
    ensure_shape("kernel_YYv", (kernel_yyv.nrows(), kernel_yyv.ncols()), (n, n_val))?;

    let inv_n = (n as f64).recip();
    // Column j of `p` (`q`) holds the coefficients of validation point j.
    let p = u.transpose() * kernel_xxv;
    let q = v.transpose() * kernel_yyv;
    let gram = v.transpose() * kernel_y * v;
    let gram_p = &gram * &p;

    let mut risk = CompensatedSum::default();
    for j in 0..n_val {
        let mut cross = 0.0;
        let mut quadratic = 0.0;
        for k in 0..r {
            cross += q[(k, j)] * p[(k, j)];
            quadratic += p[(k, j)] * gram_p[(k, j)];
        }
        let mut point = CompensatedSum::default();
        point.add(kernel_yv[(j, j)]);
        point.add(-2.0 * inv_n * cross);
        point.add(inv_n * inv_n * quadratic);
        risk.add(point.total());
    }
    Ok(risk.total() / n_val.max(1) as f64)
}

/// Singular values of the estimator, in descending order.
///
/// They are the square roots of the eigenvalues of `(n⁻¹ Vᵗ K_Y V)(n⁻¹ Uᵗ K_X U)`.
/// Negative real parts, produced by round-off, are clipped to zero.
pub fn svdvals(
    u: MatRef<'_, f64>,
    v: MatRef<'_, f64>,
    kernel_x: MatRef<'_, f64>,
    kernel_y: MatRef<'_, f64>,
) -> Result<Vec<f64>, KoopmanError> {
    let (n, r) = (u.nrows(), u.ncols());
    ensure_shape("V", (v.nrows(), v.ncols()), (n, r))?;
    ensure_shape("kernel_X", (kernel_x.nrows(), kernel_x.ncols()), (n, n))?;
    ensure_shape("kernel_Y", (kernel_y.nrows(), kernel_y.ncols()), (n, n))?;

    let inv_n = (n as f64).recip();
    let a = v.transpose() * kernel_y * v * Scale(inv_n);
    let b = u.transpose() * kernel_x * u * Scale(inv_n);
    let eig = general_eigen((&a * &b).as_ref())?;

    let mut values: Vec<f64> = eig.values.iter().map(|z| z.re.max(0.0).sqrt()).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::{Mat, mat};

    #[test]
    fn test_compensated_sum_keeps_small_terms() {
        let mut sum = CompensatedSum::default();
        sum.add(1e16);
        sum.add(1.0);
        sum.add(-1e16);
        assert_eq!(sum.total(), 1.0);
    }

    #[test]
    fn test_zero_estimator_risk_is_output_variance() {
        let k_yv = mat![[2.0, 0.1], [0.1, 4.0]];
        let k_y = Mat::<f64>::identity(3, 3);
        let cross = Mat::<f64>::zeros(3, 2);
        let u = Mat::<f64>::zeros(3, 1);
        let risk = estimator_risk(
            k_yv.as_ref(),
            k_y.as_ref(),
            cross.as_ref(),
            cross.as_ref(),
            u.as_ref(),
            u.as_ref(),
        )
        .unwrap();
        assert!((risk - 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_risk_matches_trace_formula() {
        let k_yv = mat![[1.0, 0.2], [0.2, 1.5]];
        let k_y = mat![[1.0, 0.3, 0.0], [0.3, 2.0, 0.1], [0.0, 0.1, 1.0]];
        let k_xxv = mat![[0.5, 0.1], [0.2, 0.7], [0.3, 0.4]];
        let k_yyv = mat![[0.6, 0.0], [0.1, 0.9], [0.2, 0.3]];
        let u = mat![[1.0, 0.0], [0.5, 1.0], [0.0, -1.0]];
        let v = mat![[0.3, 1.0], [0.0, 0.2], [1.0, 0.5]];
        let risk = estimator_risk(
            k_yv.as_ref(),
            k_y.as_ref(),
            k_xxv.as_ref(),
            k_yyv.as_ref(),
            u.as_ref(),
            v.as_ref(),
        )
        .unwrap();

        let trace = |m: Mat<f64>| (0..m.nrows()).map(|i| m[(i, i)]).sum::<f64>();
        let r_y = trace(k_yv.clone()) / 2.0;
        let r_xy = -2.0 / 6.0 * trace(k_yyv.transpose() * &v * u.transpose() * &k_xxv);
        let r_x = 1.0 / 18.0
            * trace(k_xxv.transpose() * &u * v.transpose() * &k_y * &v * u.transpose() * &k_xxv);
        assert!((risk - (r_y + r_xy + r_x)).abs() < 1e-12);
    }

    #[test]
    fn test_svdvals_are_non_negative_and_sorted() {
        let k = mat![[2.0, 0.0], [0.0, 1.0]];
        let u = mat![[1.0, 0.0], [0.0, 1.0]];
        let v = mat![[1.0, 0.0], [0.0, 1e-9]];
        let values = svdvals(u.as_ref(), v.as_ref(), k.as_ref(), k.as_ref()).unwrap();
        assert!(values.iter().all(|&s| s >= 0.0));
        assert!(values[0] >= values[1]);
        assert!((values[0] - 1.0).abs() < 1e-12);
    }
}
