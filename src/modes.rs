//! Eigenfunctions and spectral modes of a fitted estimator.
//!
//! The forecast operator decomposes as a sum of rank-one terms, one per eigenvalue:
//! the value of the right eigenfunction at an initial condition times the (rescaled)
//! left eigenfunction coefficients over the training outputs. Each term is a *mode*.
//! Weighting the modes by eigenvalue powers reconstructs [`crate::predict::predict`].

use crate::{
    error::{KoopmanError, ensure_shape, invalid_argument},
    linalg::to_complex,
};
use faer::{Mat, MatRef, c64};

/// Evaluates eigenfunctions at new points: `n^{-1/2} · kernel · vectors`, with `n` the
/// number of columns of `kernel`.
///
/// Pass the kernel against the training inputs with right eigenvectors, or the kernel
/// against the training outputs with left eigenvectors.
pub fn evaluate_eigenfunction(
    kernel: MatRef<'_, f64>,
    vectors: MatRef<'_, c64>,
) -> Result<Mat<c64>, KoopmanError> {
    let n = kernel.ncols();
    ensure_shape("eigenvectors", (vectors.nrows(), vectors.ncols()), (n, vectors.ncols()))?;
    let rsqrt_dim = (n as f64).sqrt().recip();
    let values = to_complex(kernel) * vectors;
    Ok(Mat::from_fn(values.nrows(), values.ncols(), |i, j| {
        values[(i, j)] * rsqrt_dim
    }))
}

/// Spectral modes: one `n_init × n_train` matrix per eigenvalue.
#[derive(Debug, Clone)]
pub struct Modes {
    pub modes: Vec<Mat<c64>>,
}

impl Modes {
    pub fn rank(&self) -> usize {
        self.modes.len()
    }

    /// Reconstructs the `num_steps` forecast of an observable,
    /// `Re Σ_k λ_k^{num_steps} · modes_k · obs_train_y`.
    pub fn forecast(
        &self,
        eigenvalues: &[c64],
        num_steps: usize,
        obs_train_y: MatRef<'_, f64>,
    ) -> Result<Mat<f64>, KoopmanError> {
        if eigenvalues.len() != self.modes.len() {
            return Err(invalid_argument(format!(
                "expected {} eigenvalues, got {}.",
                self.modes.len(),
                eigenvalues.len()
            )));
        }
        let Some(first) = self.modes.first() else {
            return Ok(Mat::zeros(0, obs_train_y.ncols()));
        };
        let (n_init, n_train) = (first.nrows(), first.ncols());
        ensure_shape(
            "obs_train_Y",
            (obs_train_y.nrows(), obs_train_y.ncols()),
            (n_train, obs_train_y.ncols()),
        )?;

        let exponent = u32::try_from(num_steps).map_err(|_| {
            invalid_argument(format!("cannot raise eigenvalues to the power {num_steps}."))
        })?;

        let obs = to_complex(obs_train_y);
        let mut total = Mat::<c64>::zeros(n_init, obs_train_y.ncols());
        for (mode, &lambda) in self.modes.iter().zip(eigenvalues) {
            let weight = lambda.powu(exponent);
            let contribution = mode * &obs;
            for j in 0..obs.ncols() {
                for i in 0..n_init {
                    total[(i, j)] += contribution[(i, j)] * weight;
                }
            }
        }
        Ok(Mat::from_fn(n_init, obs.ncols(), |i, j| total[(i, j)].re))
    }
}

/// Builds the spectral modes of an estimator.
///
/// # Arguments
/// * `kernel_xin_x`: `n_init × n` kernel between initial conditions and training inputs.
/// * `right`, `left`: `n × r` right and left eigenvectors from
///   [`crate::eig::estimator_eig`].
///
/// Mode `k` is `ψ_k(x_init) ⊗ n^{-1/2} left_k`, with `ψ_k` the right eigenfunction.
pub fn estimator_modes(
    kernel_xin_x: MatRef<'_, f64>,
    right: MatRef<'_, c64>,
    left: MatRef<'_, c64>,
) -> Result<Modes, KoopmanError> {
    ensure_shape("left", (left.nrows(), left.ncols()), (right.nrows(), right.ncols()))?;
    let right_in = evaluate_eigenfunction(kernel_xin_x, right)?;
    let rsqrt_dim = (left.nrows() as f64).sqrt().recip();

    let modes = (0..right.ncols())
        .map(|k| {
            Mat::from_fn(right_in.nrows(), left.nrows(), |i, j| {
                right_in[(i, k)] * left[(j, k)] * rsqrt_dim
            })
        })
        .collect();
    Ok(Modes { modes })
}
