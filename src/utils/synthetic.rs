//! Synthetic data: noisy linear dynamical systems and linear kernels.

use crate::{
    algorithms::randomized::gaussian_sketch,
    error::{KoopmanError, ensure_shape, invalid_argument},
    linalg::general_eigen,
};
use faer::{Mat, MatRef, Scale};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};

/// The system `x_{t+1} = A x_t + σ ξ_t` with standard normal `ξ_t`.
#[derive(Debug, Clone)]
pub struct NoisyLinearSystem {
    pub transition: Mat<f64>,
    pub noise: f64,
    pub seed: u64,
}

impl NoisyLinearSystem {
    /// A random system of dimension `dim` whose transition matrix has spectral radius
    /// `spectral_radius`.
    pub fn random_stable(
        dim: usize,
        spectral_radius: f64,
        noise: f64,
        seed: u64,
    ) -> Result<Self, KoopmanError> {
        if dim == 0 {
            return Err(invalid_argument("the state dimension must be at least 1."));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let a = gaussian_sketch(&mut rng, dim, dim);
        let radius = general_eigen(a.as_ref())?
            .values
            .iter()
            .fold(0.0_f64, |acc, z| acc.max(z.norm()));
        if radius == 0.0 {
            return Err(invalid_argument("degenerate random transition matrix."));
        }
        Ok(Self {
            transition: a * Scale(spectral_radius / radius),
            noise,
            seed: seed.wrapping_add(1),
        })
    }

    pub fn dim(&self) -> usize {
        self.transition.nrows()
    }

    /// Samples `length` consecutive states starting from `initial` (`dim × 1`).
    ///
    /// Row `t` of the result is `x_t`, so the first row is the initial state.
    pub fn trajectory(
        &self,
        initial: MatRef<'_, f64>,
        length: usize,
    ) -> Result<Mat<f64>, KoopmanError> {
        let d = self.dim();
        ensure_shape("initial", (initial.nrows(), initial.ncols()), (d, 1))?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut states = Mat::<f64>::zeros(length, d);
        let mut x = initial.to_owned();
        for t in 0..length {
            for i in 0..d {
                states[(t, i)] = x[(i, 0)];
            }
            let mut next = &self.transition * &x;
            for i in 0..d {
                let xi: f64 = StandardNormal.sample(&mut rng);
                next[(i, 0)] += self.noise * xi;
            }
            x = next;
        }
        Ok(states)
    }
}

/// Splits a trajectory into input/output snapshot pairs `(x_t, x_{t+1})`.
pub fn snapshots(trajectory: MatRef<'_, f64>) -> (Mat<f64>, Mat<f64>) {
    let n = trajectory.nrows().saturating_sub(1);
    let inputs = trajectory.get(0..n, ..).to_owned();
    let outputs = trajectory.get(1..n + 1, ..).to_owned();
    (inputs, outputs)
}

/// Linear kernel (Gram matrix) `X Yᵗ` between two sample sets stored row-wise.
pub fn linear_kernel(x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> Result<Mat<f64>, KoopmanError> {
    ensure_shape("y", (y.nrows(), y.ncols()), (y.nrows(), x.ncols()))?;
    Ok(x * y.transpose())
}
