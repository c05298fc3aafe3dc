//! Ridge regularization and rank revealing of eigenpair sets.

use crate::diagnostics::{Diagnostic, Diagnostics};
use faer::{Mat, MatMut, MatRef};
use std::cmp::Ordering;

/// Eigenvalues at or below `RANK_REVEAL_EPS_FACTOR · len · ε · max(1, max|λ|)` are invalid.
const RANK_REVEAL_EPS_FACTOR: f64 = 10.0;

/// Returns `m + reg · n · I`, where `n` is the dimension of the square matrix `m`.
///
/// The input is never aliased by the result.
pub fn regularize(m: MatRef<'_, f64>, reg: f64) -> Mat<f64> {
    let mut out = m.to_owned();
    regularize_in_place(out.as_mut(), reg);
    out
}

/// Adds `reg · n` to the diagonal of `m` in place. Nothing but the diagonal is touched.
pub fn regularize_in_place(mut m: MatMut<'_, f64>, reg: f64) {
    let n = m.nrows();
    let shift = reg * n as f64;
    for i in 0..n.min(m.ncols()) {
        m[(i, i)] += shift;
    }
}

/// The eigenpairs kept by [`rank_reveal`].
#[derive(Debug, Clone)]
pub struct RankRevealed {
    pub vectors: Mat<f64>,
    /// Retained eigenvalues, in descending order of magnitude.
    pub values: Vec<f64>,
    /// `1/√λ` for every retained eigenvalue; `0` when `λ = 0`.
    pub rsqrt_values: Vec<f64>,
}

/// Default validity predicate for symmetric problems: strictly positive eigenvalues
/// above a round-off floor.
pub fn is_numerically_positive(values: &[f64]) -> impl Fn(f64) -> bool {
    let scale = values.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let floor = RANK_REVEAL_EPS_FACTOR * values.len().max(1) as f64 * f64::EPSILON * scale;
    move |v| v > floor
}

/// Filters eigenpairs down to at most `rank` valid ones.
///
/// The pairs are sorted by descending magnitude, those rejected by `is_valid` are
/// dropped and the first `min(rank, #valid)` survivors are kept. A
/// [`Diagnostic::RankDeficiency`] is recorded when fewer than `rank` remain.
pub fn rank_reveal(
    values: &[f64],
    vectors: MatRef<'_, f64>,
    rank: usize,
    is_valid: impl Fn(f64) -> bool,
    diagnostics: &mut Diagnostics,
) -> RankRevealed {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .abs()
            .partial_cmp(&values[a].abs())
            .unwrap_or(Ordering::Equal)
    });

    let (kept, discarded): (Vec<usize>, Vec<usize>) =
        order.into_iter().partition(|&i| is_valid(values[i]));
    let retained: Vec<usize> = kept.into_iter().take(rank).collect();

    if retained.len() < rank {
        let largest_discarded = discarded
            .iter()
            .map(|&i| values[i].abs())
            .fold(0.0_f64, f64::max);
        diagnostics.push(Diagnostic::RankDeficiency {
            requested: rank,
            retained: retained.len(),
            largest_discarded,
        });
    }

    let selected = Mat::from_fn(vectors.nrows(), retained.len(), |i, j| {
        vectors[(i, retained[j])]
    });
    let values: Vec<f64> = retained.iter().map(|&i| values[i]).collect();
    let rsqrt_values = values
        .iter()
        .map(|&v| if v == 0.0 { 0.0 } else { v.abs().sqrt().recip() })
        .collect();

    RankRevealed {
        vectors: selected,
        values,
        rsqrt_values,
    }
}
