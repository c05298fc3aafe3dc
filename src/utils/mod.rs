//! Helpers shared by the experiment binary and the tests.
//!
//! - **`synthetic`**: noisy linear dynamical systems and linear (Gram) kernels, used to
//!   produce reproducible kernel matrices.
//! - **`subspace`**: principal angles between column spaces, used to compare the
//!   projections returned by different solvers.

pub mod subspace;
pub mod synthetic;
