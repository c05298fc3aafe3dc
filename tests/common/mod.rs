//! Shared problem generators for the integration tests.

#![allow(dead_code)]

use dual_koopman::utils::synthetic::{NoisyLinearSystem, snapshots};
use faer::{Mat, MatRef, c64};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};

/// Kernel matrices of a set of snapshot pairs.
pub struct KernelProblem {
    pub x: Mat<f64>,
    pub y: Mat<f64>,
    pub k_x: Mat<f64>,
    pub k_y: Mat<f64>,
    /// `K_YX[i, j] = k(y_i, x_j)`.
    pub k_yx: Mat<f64>,
}

impl KernelProblem {
    fn from_samples(x: Mat<f64>, y: Mat<f64>) -> Self {
        let k_x = &x * x.transpose();
        let k_y = &y * y.transpose();
        let k_yx = &y * x.transpose();
        Self { x, y, k_x, k_y, k_yx }
    }

    pub fn n(&self) -> usize {
        self.k_x.nrows()
    }
}

fn gaussian(rng: &mut StdRng, nrows: usize, ncols: usize, scale: f64) -> Mat<f64> {
    let mut m = Mat::<f64>::zeros(nrows, ncols);
    for j in 0..ncols {
        for i in 0..nrows {
            let z: f64 = StandardNormal.sample(rng);
            m[(i, j)] = scale * z;
        }
    }
    m
}

/// `n` snapshot pairs in a random feature space of dimension `features`.
///
/// Outputs are a random linear map of the inputs plus noise. With `features ≥ n`
/// both kernels are positive definite.
pub fn random_feature_problem(n: usize, features: usize, seed: u64) -> KernelProblem {
    let mut rng = StdRng::seed_from_u64(seed);
    let scale = (features as f64).sqrt().recip();
    let x = gaussian(&mut rng, n, features, scale);
    let map = gaussian(&mut rng, features, features, scale);
    let noise = gaussian(&mut rng, n, features, 0.1 * scale);
    let y = &(&x * &map) + &noise;
    KernelProblem::from_samples(x, y)
}

/// Linear kernels over a trajectory of a random stable linear system.
pub fn linear_system_problem(dim: usize, n: usize, seed: u64) -> anyhow::Result<KernelProblem> {
    let system = NoisyLinearSystem::random_stable(dim, 0.9, 0.05, seed)?;
    let initial = Mat::from_fn(dim, 1, |i, _| 1.0 / (i + 1) as f64);
    let trajectory = system.trajectory(initial.as_ref(), n + 1)?;
    let (x, y) = snapshots(trajectory.as_ref());
    Ok(KernelProblem::from_samples(x, y))
}

pub fn relative_error(approx: MatRef<'_, f64>, exact: MatRef<'_, f64>) -> f64 {
    let diff = approx - exact;
    diff.norm_l2() / exact.norm_l2().max(f64::MIN_POSITIVE)
}

/// `aᵗ m b` for complex columns `a`, `b` and a real matrix `m`, without conjugation.
pub fn bilinear(a: MatRef<'_, c64>, m: MatRef<'_, f64>, b: MatRef<'_, c64>) -> c64 {
    let mut total = c64::new(0.0, 0.0);
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            total += a[(i, 0)] * b[(j, 0)] * m[(i, j)];
        }
    }
    total
}

/// `aᴴ m b` for complex columns `a`, `b` and a real matrix `m`.
pub fn sesquilinear(a: MatRef<'_, c64>, m: MatRef<'_, f64>, b: MatRef<'_, c64>) -> c64 {
    let mut total = c64::new(0.0, 0.0);
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            total += a[(i, 0)].conj() * b[(j, 0)] * m[(i, j)];
        }
    }
    total
}
