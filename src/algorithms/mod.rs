//! Eigensolvers behind the non-exact solver strategies.
//!
//! - [`lanczos`]: the symmetric Lanczos process with full re-orthogonalization, used to
//!   compute a few leading eigenpairs of an implicit symmetric operator
//!   ([`crate::matrix::LinearOperator`]). This realizes the *iterative-truncated* strategy.
//! - [`randomized`]: Gaussian sketches, orthonormalization and the randomized SVD used
//!   by the *randomized* strategy.

pub mod lanczos;
pub mod randomized;

pub use lanczos::{lanczos_standard, truncated_eigen};
pub use randomized::{gaussian_sketch, randomized_svd};
