//! Principal angles between column spaces.

use crate::{
    error::{KoopmanError, KoopmanErrorKind},
    linalg::economic_qr,
};
use faer::{Mat, MatRef};
use std::cmp::Ordering;

fn singular_values(a: MatRef<'_, f64>) -> Result<Vec<f64>, KoopmanError> {
    let k = a.nrows().min(a.ncols());
    if k == 0 {
        return Ok(Vec::new());
    }
    let svd = a.thin_svd().map_err(|err| {
        KoopmanError::from(KoopmanErrorKind::ConvergenceFailure(format!(
            "SVD in principal angles: {err:?}"
        )))
    })?;
    let s = svd.S();
    let mut values: Vec<f64> = (0..k).map(|i| s[i]).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    Ok(values)
}

/// Principal angles (radians, ascending) between the column spaces of `a` and `b`.
///
/// Both matrices must have full column rank and the same number of rows.
pub fn principal_angles(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Result<Vec<f64>, KoopmanError> {
    let qa = economic_qr(a);
    let qb = economic_qr(b);
    let cosines = singular_values((qa.transpose() * &qb).as_ref())?;
    Ok(cosines.iter().map(|c| c.clamp(-1.0, 1.0).acos()).collect())
}

/// Largest principal angle between the column spaces of `a` and `b`.
///
/// Computed from the sine, `‖(I - Q_a Q_aᵗ) Q_b‖₂`, which stays accurate for nearly
/// identical subspaces. The spaces are compared in both directions so that the result
/// is symmetric when the dimensions differ.
pub fn max_principal_angle(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Result<f64, KoopmanError> {
    let qa = economic_qr(a);
    let qb = economic_qr(b);
    let residual = |q: &Mat<f64>, p: &Mat<f64>| -> Result<f64, KoopmanError> {
        let projected = q * (q.transpose() * p);
        let values = singular_values((p - &projected).as_ref())?;
        Ok(values.first().copied().unwrap_or(0.0).clamp(0.0, 1.0))
    };
    let sine = residual(&qa, &qb)?.max(residual(&qb, &qa)?);
    Ok(sine.asin())
}
