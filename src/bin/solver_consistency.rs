//! Experiment Runner for the cross-solver consistency analysis.
//!
//! This executable samples a trajectory of a random, stable, noisy linear system,
//! builds linear kernels over the snapshot pairs and fits every estimator with every
//! solver it supports. For each pair it reports how far the fitted subspace is from
//! the exact solver of the same estimator, the risk on held-out snapshots, the number
//! of diagnostics raised and the runtime.

use anyhow::{Result, anyhow};
use clap::Parser;
use dual_koopman::{
    Projections, RandomizedSketch, SolverStrategy, estimator_risk,
    nystrom_principal_component_regression, nystrom_reduced_rank_regression,
    principal_component_regression, reduced_rank_regression,
    utils::{
        subspace::max_principal_angle,
        synthetic::{NoisyLinearSystem, linear_kernel, snapshots},
    },
};
use faer::{Mat, MatRef};
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};

/// Command-line arguments for the consistency experiment.
#[derive(Parser, Debug)]
#[clap(
    name = "consistency-runner",
    about = "Fits every estimator with every solver and compares them against the exact solver."
)]
struct ConsistencyArgs {
    /// Dimension of the state of the linear system.
    #[clap(long, default_value_t = 8)]
    dim: usize,

    /// Number of training snapshot pairs.
    #[clap(long, default_value_t = 200)]
    samples: usize,

    /// Number of held-out snapshot pairs used to estimate the risk.
    #[clap(long, default_value_t = 100)]
    validation_samples: usize,

    /// Use one inducing point every `nystrom_stride` training samples.
    #[clap(long, default_value_t = 2)]
    nystrom_stride: usize,

    /// Rank of the estimators.
    #[clap(long, default_value_t = 4)]
    rank: usize,

    /// Tikhonov regularization strength.
    #[clap(long, default_value_t = 1e-6)]
    tikhonov_reg: f64,

    /// Standard deviation of the process noise.
    #[clap(long, default_value_t = 0.1)]
    noise: f64,

    /// Spectral radius of the transition matrix.
    #[clap(long, default_value_t = 0.95)]
    spectral_radius: f64,

    /// Oversampling of the randomized sketch.
    #[clap(long, default_value_t = 10)]
    oversamples: usize,

    /// Number of power iterations of the randomized solvers.
    #[clap(long, default_value_t = 2)]
    iterated_power: usize,

    /// Seed for the system, the trajectory and the sketches.
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data for the consistency CSV.
#[derive(Debug, Serialize)]
struct ConsistencyResult {
    strategy: &'static str,
    solver: &'static str,
    /// Number of non-zero columns of `U`.
    retained_rank: usize,
    /// Largest principal angle between `U` and the `U` of the exact solver (radians).
    principal_angle: f64,
    validation_risk: f64,
    diagnostics: usize,
    runtime_ms: f64,
}

#[derive(Debug, Clone, Copy)]
enum Estimator {
    ReducedRank,
    PrincipalComponent,
    NystromReducedRank,
    NystromPrincipalComponent,
}

impl Estimator {
    fn name(self) -> &'static str {
        match self {
            Estimator::ReducedRank => "rrr",
            Estimator::PrincipalComponent => "pcr",
            Estimator::NystromReducedRank => "nystrom_rrr",
            Estimator::NystromPrincipalComponent => "nystrom_pcr",
        }
    }

    /// The solvers compared against the exact one.
    fn alternative_solvers(self, sketch: RandomizedSketch) -> Vec<SolverStrategy> {
        if self.is_nystrom() {
            vec![SolverStrategy::Iterative]
        } else {
            vec![SolverStrategy::Iterative, SolverStrategy::Randomized(sketch)]
        }
    }

    fn is_nystrom(self) -> bool {
        matches!(
            self,
            Estimator::NystromReducedRank | Estimator::NystromPrincipalComponent
        )
    }
}

/// Training and validation kernels, for the full training set and for the inducing points.
struct Kernels {
    k_x: Mat<f64>,
    k_y: Mat<f64>,
    k_ind_x: Mat<f64>,
    k_ind_y: Mat<f64>,
    k_xnys: Mat<f64>,
    k_ynys: Mat<f64>,
    k_yv: Mat<f64>,
    k_xxv: Mat<f64>,
    k_yyv: Mat<f64>,
    k_ind_xxv: Mat<f64>,
    k_ind_yyv: Mat<f64>,
}

impl Kernels {
    fn build(
        train: (MatRef<'_, f64>, MatRef<'_, f64>),
        validation: (MatRef<'_, f64>, MatRef<'_, f64>),
        stride: usize,
    ) -> Result<Self> {
        let (x, y) = train;
        let (x_val, y_val) = validation;
        let inducing: Vec<usize> = (0..x.nrows()).step_by(stride.max(1)).collect();
        let x_ind = Mat::from_fn(inducing.len(), x.ncols(), |i, j| x[(inducing[i], j)]);
        let y_ind = Mat::from_fn(inducing.len(), y.ncols(), |i, j| y[(inducing[i], j)]);

        Ok(Self {
            k_x: linear_kernel(x, x)?,
            k_y: linear_kernel(y, y)?,
            k_ind_x: linear_kernel(x_ind.as_ref(), x_ind.as_ref())?,
            k_ind_y: linear_kernel(y_ind.as_ref(), y_ind.as_ref())?,
            k_xnys: linear_kernel(x, x_ind.as_ref())?,
            k_ynys: linear_kernel(y, y_ind.as_ref())?,
            k_yv: linear_kernel(y_val, y_val)?,
            k_xxv: linear_kernel(x, x_val)?,
            k_yyv: linear_kernel(y, y_val)?,
            k_ind_xxv: linear_kernel(x_ind.as_ref(), x_val)?,
            k_ind_yyv: linear_kernel(y_ind.as_ref(), y_val)?,
        })
    }
}

fn fit(
    estimator: Estimator,
    solver: &SolverStrategy,
    kernels: &Kernels,
    tikhonov_reg: f64,
    rank: usize,
) -> Result<Projections> {
    let projections = match estimator {
        Estimator::ReducedRank => reduced_rank_regression(
            kernels.k_x.as_ref(),
            kernels.k_y.as_ref(),
            tikhonov_reg,
            rank,
            solver,
        )?,
        Estimator::PrincipalComponent => {
            principal_component_regression(kernels.k_x.as_ref(), tikhonov_reg, rank, solver)?
        }
        Estimator::NystromReducedRank => nystrom_reduced_rank_regression(
            kernels.k_ind_x.as_ref(),
            kernels.k_ind_y.as_ref(),
            kernels.k_xnys.as_ref(),
            kernels.k_ynys.as_ref(),
            tikhonov_reg,
            rank,
            solver,
        )?,
        Estimator::NystromPrincipalComponent => nystrom_principal_component_regression(
            kernels.k_ind_x.as_ref(),
            kernels.k_ind_y.as_ref(),
            kernels.k_xnys.as_ref(),
            kernels.k_ynys.as_ref(),
            tikhonov_reg,
            rank,
            solver,
        )?,
    };
    Ok(projections)
}

fn validation_risk(estimator: Estimator, kernels: &Kernels, fit: &Projections) -> Result<f64> {
    // Nystrom projections live on the inducing points.
    let (k_y, k_xxv, k_yyv) = if estimator.is_nystrom() {
        (&kernels.k_ind_y, &kernels.k_ind_xxv, &kernels.k_ind_yyv)
    } else {
        (&kernels.k_y, &kernels.k_xxv, &kernels.k_yyv)
    };
    Ok(estimator_risk(
        kernels.k_yv.as_ref(),
        k_y.as_ref(),
        k_xxv.as_ref(),
        k_yyv.as_ref(),
        fit.u.as_ref(),
        fit.v.as_ref(),
    )?)
}

/// Drops the zero columns that pad rank-deficient Nystrom projections.
fn nonzero_columns(u: MatRef<'_, f64>) -> Mat<f64> {
    let kept: Vec<usize> = (0..u.ncols())
        .filter(|&j| u.col(j).norm_l2() > 0.0)
        .collect();
    Mat::from_fn(u.nrows(), kept.len(), |i, j| u[(i, kept[j])])
}

/// The main entry point for the consistency experiment.
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = ConsistencyArgs::parse();
    log::info!(
        "Starting solver consistency analysis: dim = {}, samples = {}, rank = {}",
        args.dim,
        args.samples,
        args.rank
    );

    // 1. Sample the trajectory and build the kernels.
    let system =
        NoisyLinearSystem::random_stable(args.dim, args.spectral_radius, args.noise, args.seed)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let initial = dual_koopman::algorithms::gaussian_sketch(&mut rng, args.dim, 1);
    let trajectory = system.trajectory(initial.as_ref(), args.samples + args.validation_samples + 1)?;
    let (x_all, y_all) = snapshots(trajectory.as_ref());
    let n = args.samples;
    let kernels = Kernels::build(
        (x_all.as_ref().get(0..n, ..), y_all.as_ref().get(0..n, ..)),
        (x_all.as_ref().get(n.., ..), y_all.as_ref().get(n.., ..)),
        args.nystrom_stride,
    )?;

    let sketch = RandomizedSketch {
        oversamples: args.oversamples,
        iterated_power: args.iterated_power,
        seed: args.seed,
        optimal_sketching: false,
    };
    // 2. Fit every estimator with the exact solver first, then with the others.
    let mut results = Vec::new();
    let estimators = [
        Estimator::ReducedRank,
        Estimator::PrincipalComponent,
        Estimator::NystromReducedRank,
        Estimator::NystromPrincipalComponent,
    ];
    for estimator in estimators {
        log::info!("Fitting {} with the exact solver...", estimator.name());
        let start = Instant::now();
        let reference = fit(estimator, &SolverStrategy::Exact, &kernels, args.tikhonov_reg, args.rank)
            .map_err(|err| anyhow!("exact {} fit failed: {err}", estimator.name()))?;
        let runtime_ms = start.elapsed().as_secs_f64() * 1e3;
        let reference_u = nonzero_columns(reference.u.as_ref());
        results.push(ConsistencyResult {
            strategy: estimator.name(),
            solver: SolverStrategy::Exact.tag(),
            retained_rank: reference_u.ncols(),
            principal_angle: 0.0,
            validation_risk: validation_risk(estimator, &kernels, &reference)?,
            diagnostics: reference.diagnostics.len(),
            runtime_ms,
        });

        for solver in estimator.alternative_solvers(sketch) {
            log::info!("Fitting {} with the {} solver...", estimator.name(), solver);
            let start = Instant::now();
            let projections = match fit(estimator, &solver, &kernels, args.tikhonov_reg, args.rank)
            {
                Ok(p) => p,
                Err(err) => {
                    log::warn!("{} with the {} solver failed: {err}", estimator.name(), solver);
                    continue;
                }
            };
            let runtime_ms = start.elapsed().as_secs_f64() * 1e3;
            let u = nonzero_columns(projections.u.as_ref());
            let principal_angle = if u.ncols() == 0 || reference_u.ncols() == 0 {
                f64::NAN
            } else {
                max_principal_angle(u.as_ref(), reference_u.as_ref())?
            };

            results.push(ConsistencyResult {
                strategy: estimator.name(),
                solver: solver.tag(),
                retained_rank: u.ncols(),
                principal_angle,
                validation_risk: validation_risk(estimator, &kernels, &projections)?,
                diagnostics: projections.diagnostics.len(),
                runtime_ms,
            });
        }
    }

    // 3. Write results to CSV.
    log::info!("Writing results to {:?}...", &args.output);
    let mut writer = csv::Writer::from_path(&args.output)?;
    for record in results {
        writer.serialize(record)?;
    }
    writer.flush()?;

    log::info!("Consistency analysis complete.");
    Ok(())
}
