//! Kernel (dual-space) estimators of Koopman and transfer operators.
//!
//! This crate estimates the evolution operator of a dynamical system from snapshot
//! pairs `(x_t, x_{t+1})`, given only kernel matrices over the samples. A fitted
//! estimator is a pair of `n × r` projections `(U, V)`: the operator acts on a function
//! through its values at the training outputs, compressed by `V`, and expands back over
//! the training inputs through `U`.
//!
//! Built on the [`faer`] linear algebra framework, all routines take dense kernel
//! matrices as [`faer::MatRef`] and return owned results.
//!
//! ## Estimators
//!
//! **Reduced rank regression** ([`reduced_rank_regression`]): the rank-`r` estimator
//! minimizing the regularized empirical risk. Solves a generalized eigenproblem
//! between `n⁻¹ K_Y K_X` and `K_X + nλI`.
//!
//! **Principal component regression** ([`principal_component_regression`]): projects
//! onto the leading eigenvectors of the regularized input kernel. Cheaper, but ignores
//! the outputs when choosing the subspace.
//!
//! Both have Nystrom counterparts ([`nystrom_reduced_rank_regression`],
//! [`nystrom_principal_component_regression`]) working with `m ≪ n` inducing points.
//! The backend of every fit is chosen through [`SolverStrategy`]: a dense exact
//! eigensolver, a Lanczos solver computing only the leading pairs, or a seeded
//! randomized sketch.
//!
//! Non-fatal numerical conditions (rank deficiency, overfitting signals, solver
//! fallbacks) are returned as [`diagnostics::Diagnostics`] next to the projections and
//! mirrored to the [`log`] facade.
//!
//! ## Downstream routines
//!
//! - [`predict`]: multi-step forecasts of observables.
//! - [`estimator_eig`]: eigenvalues and biorthogonal left/right eigenvectors.
//! - [`estimator_modes`] and [`evaluate_eigenfunction`]: spectral modes and
//!   eigenfunction values.
//! - [`estimator_risk`] and [`svdvals`]: held-out risk and singular values.
//!
//! ## Example Usage
//!
//! ```rust
//! use dual_koopman::{SolverStrategy, predict, reduced_rank_regression};
//! use faer::Mat;
//!
//! // Snapshots of the scalar system x_{t+1} = 0.9 x_t, with a linear kernel.
//! let states: Vec<f64> = (0..9).map(|t| 0.9_f64.powi(t)).collect();
//! let x = Mat::from_fn(8, 1, |i, _| states[i]);
//! let y = Mat::from_fn(8, 1, |i, _| states[i + 1]);
//!
//! let k_x = &x * x.transpose();
//! let k_y = &y * y.transpose();
//! let k_yx = &y * x.transpose();
//!
//! let fit = reduced_rank_regression(k_x.as_ref(), k_y.as_ref(), 1e-8, 1, &SolverStrategy::Exact)
//!     .unwrap();
//! assert_eq!(fit.u.ncols(), 1);
//!
//! // One-step forecast of the identity observable from the first training input.
//! let obs = Mat::from_fn(8, 1, |i, _| states[i + 1]);
//! let k_in = k_x.as_ref().get(0..1, ..);
//! let forecast = predict(1, fit.u.as_ref(), fit.v.as_ref(), k_yx.as_ref(), k_in, obs.as_ref())
//!     .unwrap();
//! assert!((forecast[(0, 0)] - 0.9).abs() < 1e-3);
//! ```

pub mod algorithms;
pub mod diagnostics;
pub mod eig;
pub mod error;
pub mod fit;
pub mod linalg;
pub mod matrix;
pub mod modes;
pub mod predict;
pub mod regularization;
pub mod risk;
pub mod utils;

// Re-export the main API for convenient access.
pub use diagnostics::{Diagnostic, Diagnostics};
pub use eig::{SpectralDecomposition, estimator_eig};
pub use error::{KoopmanError, KoopmanErrorKind};
pub use fit::{
    Projections, RandomizedSketch, SolverStrategy, nystrom_principal_component_regression,
    nystrom_reduced_rank_regression, principal_component_regression, reduced_rank_regression,
};
pub use modes::{Modes, estimator_modes, evaluate_eigenfunction};
pub use predict::predict;
pub use regularization::{rank_reveal, regularize, regularize_in_place};
pub use risk::{estimator_risk, svdvals};
