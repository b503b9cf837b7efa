//! Sequential model-based optimizers behind a small trait seam.
//!
//! Optimizers work on the numeric bounds produced by the domain translator
//! and always maximize: the objective adapter already flips losses.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::space::{BoundKind, ParameterBound};

/// One coordinate per bound, in bound order.
pub type Point = Vec<f64>;

/// Largest discrete grid that is scored exhaustively instead of sampled.
const MAX_ENUMERATED: usize = 10_000;

/// Evaluated points and their objective values, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    points: Vec<Point>,
    values: Vec<f64>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, point: Point, value: f64) {
        self.points.push(point);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Highest value seen so far.
    pub fn best(&self) -> Option<(&Point, f64)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &v)| (&self.points[i], v))
    }

    /// Euclidean distance between the last two evaluated points.
    pub fn last_distance(&self) -> Option<f64> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let (a, b) = (&self.points[n - 2], &self.points[n - 1]);
        Some(
            a.iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
        )
    }
}

/// A black-box maximizer over discrete/continuous bounds.
pub trait SurrogateOptimizer: Send {
    fn name(&self) -> &str;

    /// Points evaluated before any model is fitted.
    fn initial_design(&mut self, bounds: &[ParameterBound], n: usize) -> Vec<Point>;

    /// Up to `batch` new points given everything evaluated so far.
    fn propose(&mut self, bounds: &[ParameterBound], trace: &Trace, batch: usize) -> Vec<Point>;
}

/// Which optimizer a search should build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    GaussianProcess,
    Random,
}

impl OptimizerKind {
    pub fn build(self, seed: u64, n_candidates: usize, xi: f64) -> Box<dyn SurrogateOptimizer> {
        match self {
            Self::GaussianProcess => Box::new(
                GaussianProcessOptimizer::new(seed)
                    .with_candidates(n_candidates)
                    .with_xi(xi),
            ),
            Self::Random => Box::new(RandomOptimizer::new(seed).with_candidates(n_candidates)),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate generation
// ---------------------------------------------------------------------------

fn point_key(point: &[f64]) -> Vec<u64> {
    point.iter().map(|v| (v + 0.0).to_bits()).collect()
}

fn sample_point(bounds: &[ParameterBound], rng: &mut ChaCha8Rng) -> Point {
    bounds
        .iter()
        .map(|bound| match bound.kind {
            BoundKind::Discrete => bound.domain.choose(&mut *rng).copied().unwrap_or(0.0),
            BoundKind::Continuous => {
                let (low, high) = bound.range();
                if high > low {
                    rng.gen_range(low..=high)
                } else {
                    low
                }
            }
        })
        .collect()
}

/// Size of the full discrete grid, `None` when continuous or too large.
fn grid_size(bounds: &[ParameterBound]) -> Option<usize> {
    bounds.iter().try_fold(1usize, |acc, bound| match bound.kind {
        BoundKind::Discrete => acc
            .checked_mul(bound.domain.len())
            .filter(|&n| n <= MAX_ENUMERATED),
        BoundKind::Continuous => None,
    })
}

fn enumerate_grid(bounds: &[ParameterBound]) -> Vec<Point> {
    let mut points: Vec<Point> = vec![Vec::with_capacity(bounds.len())];
    for bound in bounds {
        points = points
            .into_iter()
            .flat_map(|prefix| {
                bound.domain.iter().map(move |&v| {
                    let mut next = prefix.clone();
                    next.push(v);
                    next
                })
            })
            .collect();
    }
    let mut seen = HashSet::new();
    points.retain(|p| seen.insert(point_key(p)));
    points
}

/// `n` starting points, distinct whenever the grid allows it.
fn design(bounds: &[ParameterBound], n: usize, rng: &mut ChaCha8Rng) -> Vec<Point> {
    if grid_size(bounds).is_some() {
        let mut grid = enumerate_grid(bounds);
        grid.shuffle(rng);
        if n <= grid.len() {
            grid.truncate(n);
            return grid;
        }
        let mut points = grid.clone();
        while points.len() < n {
            points.push(sample_point(bounds, rng));
        }
        return points;
    }
    (0..n).map(|_| sample_point(bounds, rng)).collect()
}

/// Unevaluated candidates; evaluated ones come back only when nothing else is left.
fn candidates(
    bounds: &[ParameterBound],
    trace: &Trace,
    n_candidates: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<Point> {
    let seen: HashSet<Vec<u64>> = trace.points().iter().map(|p| point_key(p)).collect();
    let pool: Vec<Point> = match grid_size(bounds) {
        Some(_) => enumerate_grid(bounds),
        None => (0..n_candidates.max(1)).map(|_| sample_point(bounds, rng)).collect(),
    };
    let fresh: Vec<Point> = pool
        .iter()
        .filter(|p| !seen.contains(&point_key(p)))
        .cloned()
        .collect();
    if fresh.is_empty() {
        debug!("Every candidate has been evaluated; allowing repeats");
        pool
    } else {
        fresh
    }
}

// ---------------------------------------------------------------------------
// Random search
// ---------------------------------------------------------------------------

/// Uniform proposals over unevaluated candidates.
#[derive(Debug, Clone)]
pub struct RandomOptimizer {
    rng: ChaCha8Rng,
    n_candidates: usize,
}

impl RandomOptimizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            n_candidates: 1000,
        }
    }

    pub fn with_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates;
        self
    }
}

impl SurrogateOptimizer for RandomOptimizer {
    fn name(&self) -> &str {
        "random"
    }

    fn initial_design(&mut self, bounds: &[ParameterBound], n: usize) -> Vec<Point> {
        design(bounds, n, &mut self.rng)
    }

    fn propose(&mut self, bounds: &[ParameterBound], trace: &Trace, batch: usize) -> Vec<Point> {
        let mut pool = candidates(bounds, trace, self.n_candidates, &mut self.rng);
        pool.shuffle(&mut self.rng);
        pool.truncate(batch);
        pool
    }
}

// ---------------------------------------------------------------------------
// Gaussian process with expected improvement
// ---------------------------------------------------------------------------

/// GP surrogate (Matérn 5/2) with expected-improvement acquisition.
///
/// Inputs are scaled to `[0, 1]` per bound and outputs standardized before
/// fitting. Discrete grids small enough are scored exhaustively; otherwise
/// `n_candidates` random points are scored.
#[derive(Debug, Clone)]
pub struct GaussianProcessOptimizer {
    rng: ChaCha8Rng,
    n_candidates: usize,
    xi: f64,
    noise: f64,
}

impl GaussianProcessOptimizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            n_candidates: 1000,
            xi: 0.01,
            noise: 1e-6,
        }
    }

    pub fn with_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates;
        self
    }

    /// Exploration margin added to the incumbent in expected improvement.
    pub fn with_xi(mut self, xi: f64) -> Self {
        self.xi = xi;
        self
    }
}

impl SurrogateOptimizer for GaussianProcessOptimizer {
    fn name(&self) -> &str {
        "gaussian_process"
    }

    fn initial_design(&mut self, bounds: &[ParameterBound], n: usize) -> Vec<Point> {
        design(bounds, n, &mut self.rng)
    }

    fn propose(&mut self, bounds: &[ParameterBound], trace: &Trace, batch: usize) -> Vec<Point> {
        let mut pool = candidates(bounds, trace, self.n_candidates, &mut self.rng);

        let usable: Vec<usize> = (0..trace.len())
            .filter(|&i| trace.values()[i].is_finite())
            .collect();
        let x_train: Vec<Point> = usable
            .iter()
            .map(|&i| normalize(bounds, &trace.points()[i]))
            .collect();
        let y_train: Vec<f64> = usable.iter().map(|&i| trace.values()[i]).collect();

        let Some(model) = GpModel::fit(&x_train, &y_train, self.noise) else {
            warn!("Gaussian process fit failed on {} points; proposing at random", y_train.len());
            pool.shuffle(&mut self.rng);
            pool.truncate(batch);
            return pool;
        };

        let mut scored: Vec<(Point, f64)> = pool
            .into_iter()
            .map(|p| {
                let (mean, std) = model.predict(&normalize(bounds, &p));
                let ei = expected_improvement(mean, std, model.f_best, self.xi);
                (p, ei)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(batch);
        scored.into_iter().map(|(p, _)| p).collect()
    }
}

fn normalize(bounds: &[ParameterBound], point: &[f64]) -> Point {
    bounds
        .iter()
        .zip(point)
        .map(|(bound, &v)| {
            let (low, high) = bound.range();
            if high > low {
                (v - low) / (high - low)
            } else {
                0.5
            }
        })
        .collect()
}

fn matern52(a: &[f64], b: &[f64], lengthscales: &[f64]) -> f64 {
    let r_sq: f64 = a
        .iter()
        .zip(b)
        .zip(lengthscales)
        .map(|((x, y), l)| ((x - y) / l).powi(2))
        .sum();
    let sqrt5_r = (5.0 * r_sq).sqrt();
    (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

struct GpModel {
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    x_train: Vec<Point>,
    lengthscales: Vec<f64>,
    f_best: f64,
}

impl GpModel {
    fn fit(x_train: &[Point], y_train: &[f64], noise: f64) -> Option<Self> {
        let n = y_train.len();
        if n == 0 {
            return None;
        }
        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = y_train.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = y_var.sqrt().max(1e-10);
        let y: Vec<f64> = y_train.iter().map(|y| (y - y_mean) / y_std).collect();

        let d = x_train[0].len();
        let lengthscales: Vec<f64> = (0..d)
            .map(|j| {
                let mean = x_train.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                let var = x_train.iter().map(|x| (x[j] - mean).powi(2)).sum::<f64>() / n as f64;
                var.sqrt().clamp(0.05, 1.0)
            })
            .collect();

        let k = DMatrix::from_fn(n, n, |i, j| {
            let v = matern52(&x_train[i], &x_train[j], &lengthscales);
            if i == j {
                v + noise
            } else {
                v
            }
        });
        let cholesky = Cholesky::new(k)?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y));
        let f_best = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            cholesky,
            alpha,
            x_train: x_train.to_vec(),
            lengthscales,
            f_best,
        })
    }

    /// Posterior mean and standard deviation, in standardized units.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales)
        });
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (1.0 - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }
}

fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF, Hart/Zelen-Severo rational approximation.
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let upper = norm_pdf(x.abs()) * poly;
    if x >= 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

/// Expected improvement over `f_best + xi` for a maximization problem.
fn expected_improvement(mean: f64, std: f64, f_best: f64, xi: f64) -> f64 {
    let gain = mean - f_best - xi;
    if std < 1e-12 {
        return gain.max(0.0);
    }
    let z = gain / std;
    (gain * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete(name: &str, domain: &[f64]) -> ParameterBound {
        ParameterBound {
            name: name.to_string(),
            kind: BoundKind::Discrete,
            domain: domain.to_vec(),
        }
    }

    #[test]
    fn trace_tracks_best_and_last_step() {
        let mut trace = Trace::new();
        assert_eq!(trace.last_distance(), None);
        trace.record(vec![0.0, 0.0], -1.0);
        trace.record(vec![3.0, 4.0], 2.0);
        assert_eq!(trace.last_distance(), Some(5.0));
        assert_eq!(trace.best().map(|(_, v)| v), Some(2.0));
    }

    #[test]
    fn grid_enumeration_is_the_cartesian_product() {
        let bounds = vec![discrete("a", &[1.0, 2.0, 3.0]), discrete("b", &[0.0, 1.0])];
        let grid = enumerate_grid(&bounds);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0], vec![1.0, 0.0]);
        assert_eq!(grid[5], vec![3.0, 1.0]);
        assert_eq!(grid_size(&bounds), Some(6));
    }

    #[test]
    fn initial_design_is_distinct_on_small_grids() {
        let bounds = vec![discrete("a", &[1.0, 2.0, 3.0]), discrete("b", &[0.0, 1.0, 2.0])];
        let mut optimizer = GaussianProcessOptimizer::new(7);
        let design = optimizer.initial_design(&bounds, 3);
        let keys: HashSet<_> = design.iter().map(|p| point_key(p)).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn proposals_skip_evaluated_points() {
        let bounds = vec![discrete("a", &[1.0, 2.0, 3.0])];
        let mut trace = Trace::new();
        trace.record(vec![1.0], 0.1);
        trace.record(vec![2.0], 0.5);

        let mut gp = GaussianProcessOptimizer::new(1);
        assert_eq!(gp.propose(&bounds, &trace, 1), vec![vec![3.0]]);

        let mut random = RandomOptimizer::new(1);
        assert_eq!(random.propose(&bounds, &trace, 4), vec![vec![3.0]]);

        trace.record(vec![3.0], 0.2);
        assert_eq!(gp.propose(&bounds, &trace, 1).len(), 1);
    }

    #[test]
    fn gp_heads_for_the_peak() {
        let bounds = vec![discrete("x", &(0..=10).map(f64::from).collect::<Vec<_>>())];
        let mut trace = Trace::new();
        for x in [0.0, 2.0, 4.0, 6.0, 8.0, 10.0] {
            trace.record(vec![x], -(x - 7.0_f64).powi(2));
        }
        let mut gp = GaussianProcessOptimizer::new(3);
        assert_eq!(gp.propose(&bounds, &trace, 1), vec![vec![7.0]]);
    }

    #[test]
    fn gp_interpolates_training_data() {
        let x: Vec<Point> = vec![vec![0.0], vec![0.5], vec![1.0]];
        let y = vec![1.0, 3.0, 2.0];
        let model = GpModel::fit(&x, &y, 1e-8).unwrap();
        let mean = 2.0;
        let std = (2.0f64 / 3.0).sqrt();
        for (xi, yi) in x.iter().zip(&y) {
            let (predicted, sigma) = model.predict(xi);
            assert!((predicted * std + mean - yi).abs() < 1e-3);
            assert!(sigma < 1e-2);
        }
    }

    #[test]
    fn continuous_bounds_are_sampled_inside_the_range() {
        let bounds = vec![ParameterBound {
            name: "lr".to_string(),
            kind: BoundKind::Continuous,
            domain: vec![0.1, 0.2],
        }];
        let mut gp = GaussianProcessOptimizer::new(5).with_candidates(50);
        let mut trace = Trace::new();
        trace.record(vec![0.15], 1.0);
        let proposals = gp.propose(&bounds, &trace, 3);
        assert_eq!(proposals.len(), 3);
        assert!(proposals.iter().all(|p| (0.1..=0.2).contains(&p[0])));
    }

    #[test]
    fn normal_cdf_is_accurate_enough() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 1e-3);
    }

    #[test]
    fn same_seed_same_proposals() {
        let bounds = vec![discrete("a", &[1.0, 2.0, 3.0, 4.0]), discrete("b", &[0.0, 1.0])];
        let run = || {
            let mut optimizer = OptimizerKind::GaussianProcess.build(9, 100, 0.01);
            optimizer.initial_design(&bounds, 2)
        };
        assert_eq!(run(), run());
    }
}
