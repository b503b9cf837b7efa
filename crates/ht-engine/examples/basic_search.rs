//! Tune a ridge regressor and a k-NN classifier on synthetic data.
//!
//! Run with `cargo run -p ht-engine --example basic_search`.

use nalgebra::DMatrix;

use ht_engine::{KNeighbors, Ridge};
use ht_optimizer::{BayesianSearchCv, CvSpec, Distribution, ParamGrid, ScoringSpec, SearchConfig};
use ht_types::{HtResult, ParamMap, Task};

fn main() -> HtResult<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // y = 1.5 x0 - 0.5 x1 + small deterministic wobble
    let n = 60;
    let x = DMatrix::from_fn(n, 2, |i, j| ((i * (j + 3)) % 17) as f64 / 4.0);
    let y = DMatrix::from_fn(n, 1, |i, _| {
        1.5 * x[(i, 0)] - 0.5 * x[(i, 1)] + ((i % 5) as f64 - 2.0) * 0.05
    });

    let grid = ParamGrid::new()
        .add_distribution(
            "alpha",
            Distribution::LogUniform {
                low: 1e-3,
                high: 10.0,
            },
        )
        .add_values("fit_intercept", [true, false]);
    let config = SearchConfig::default()
        .with_cv(CvSpec::Folds(5))
        .with_n_iter(15)
        .with_seed(7)
        .with_verbose(2);

    let mut ridge = BayesianSearchCv::new(Ridge::default(), &grid, &ScoringSpec::named("r2"), config)?;
    ridge.fit(&x, &y, &ParamMap::new())?;
    println!(
        "ridge: best r2 {:.4} with {:?}",
        ridge.best_score()?,
        ridge.best_params()?
    );

    let labels = DMatrix::from_fn(n, 1, |i, _| if x[(i, 0)] > x[(i, 1)] { 1.0 } else { 0.0 });
    let grid = ParamGrid::new()
        .add_values("n_neighbors", [1i64, 3, 5, 7, 9])
        .add_values("weights", ["uniform", "distance"]);
    let config = SearchConfig::default()
        .with_n_iter(8)
        .with_eps(None)
        .with_seed(7)
        .with_n_jobs(-1);

    let mut knn = BayesianSearchCv::new(
        KNeighbors::new(Task::Classification),
        &grid,
        &ScoringSpec::named("accuracy"),
        config,
    )?;
    knn.fit(&x, &labels, &ParamMap::new())?;
    println!(
        "k-nn: best accuracy {:.4} with {:?}",
        knn.best_score()?,
        knn.best_params()?
    );

    Ok(())
}
