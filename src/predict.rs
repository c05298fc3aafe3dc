//! Multi-step forecasting of observables.

use crate::{
    error::{KoopmanError, ensure_shape, invalid_argument},
    linalg::matrix_power,
};
use faer::{Mat, MatRef, Scale};

/// Forecasts an observable `num_steps` steps ahead from each initial condition.
///
/// With `T = n⁻¹ Vᵗ K_YX U`, the forecast is
/// `(n^{-1/2} K_Xin_X U) · T^{num_steps - 1} · (n^{-1/2} Vᵗ obs)`.
///
/// # Arguments
/// * `num_steps`: forecasting horizon, at least 1.
/// * `u`, `v`: `n × r` projections of a fitted estimator.
/// * `kernel_yx`: `n × n` kernel between training outputs and training inputs.
/// * `kernel_xin_x`: `n_init × n` kernel between the initial conditions and the
///   training inputs.
/// * `obs_train_y`: `n × d` observable evaluated on the training outputs.
///
/// # Returns
/// The `n_init × d` forecast.
pub fn predict(
    num_steps: usize,
    u: MatRef<'_, f64>,
    v: MatRef<'_, f64>,
    kernel_yx: MatRef<'_, f64>,
    kernel_xin_x: MatRef<'_, f64>,
    obs_train_y: MatRef<'_, f64>,
) -> Result<Mat<f64>, KoopmanError> {
    if num_steps == 0 {
        return Err(invalid_argument("num_steps must be at least 1."));
    }
    let (n, r) = (u.nrows(), u.ncols());
    ensure_shape("V", (v.nrows(), v.ncols()), (n, r))?;
    ensure_shape("kernel_YX", (kernel_yx.nrows(), kernel_yx.ncols()), (n, n))?;
    ensure_shape(
        "kernel_Xin_X",
        (kernel_xin_x.nrows(), kernel_xin_x.ncols()),
        (kernel_xin_x.nrows(), n),
    )?;
    ensure_shape(
        "obs_train_Y",
        (obs_train_y.nrows(), obs_train_y.ncols()),
        (n, obs_train_y.ncols()),
    )?;

    let rsqrt_dim = (n as f64).sqrt().recip();
    let k_dot_u = kernel_xin_x * u * Scale(rsqrt_dim);
    let v_dot_obs = v.transpose() * obs_train_y * Scale(rsqrt_dim);
    let transition = v.transpose() * kernel_yx * u * Scale((n as f64).recip());
    let propagated = matrix_power(transition.as_ref(), num_steps - 1);
    Ok(k_dot_u * propagated * v_dot_obs)
}
