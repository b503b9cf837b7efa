//! Cross-validation: fold strategies, the worker pool and per-fold scoring.

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use ht_types::{internal_error, take_rows, validation_error, EstimatorError, HtResult, ParamMap};

use crate::estimator::Estimator;
use crate::scoring::Scoring;

/// Train/test row indices for one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// A fold-splitting strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CvStrategy {
    KFold {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// K-fold preserving the class proportions of the first target column.
    StratifiedKFold {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// K-fold repeated `n_repeats` times with a fresh shuffle each time.
    RepeatedKFold {
        n_splits: usize,
        n_repeats: usize,
        seed: u64,
    },
    Predefined { splits: Vec<Split> },
}

/// Either a plain fold count or a full strategy.
///
/// A fold count becomes stratified k-fold for classifiers and k-fold
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CvSpec {
    Folds(usize),
    Strategy(CvStrategy),
}

impl Default for CvSpec {
    fn default() -> Self {
        Self::Folds(5)
    }
}

impl From<usize> for CvSpec {
    fn from(n_splits: usize) -> Self {
        Self::Folds(n_splits)
    }
}

impl From<CvStrategy> for CvSpec {
    fn from(strategy: CvStrategy) -> Self {
        Self::Strategy(strategy)
    }
}

impl CvSpec {
    pub fn resolve(&self, classifier: bool) -> CvStrategy {
        match self {
            Self::Folds(n_splits) if classifier => CvStrategy::StratifiedKFold {
                n_splits: *n_splits,
                shuffle: false,
                seed: None,
            },
            Self::Folds(n_splits) => CvStrategy::KFold {
                n_splits: *n_splits,
                shuffle: false,
                seed: None,
            },
            Self::Strategy(strategy) => strategy.clone(),
        }
    }
}

impl CvStrategy {
    /// Total number of folds produced by [`CvStrategy::split`].
    pub fn n_splits(&self) -> usize {
        match self {
            Self::KFold { n_splits, .. } | Self::StratifiedKFold { n_splits, .. } => *n_splits,
            Self::RepeatedKFold {
                n_splits,
                n_repeats,
                ..
            } => n_splits * n_repeats,
            Self::Predefined { splits } => splits.len(),
        }
    }

    /// Turn plain or stratified k-fold into repeated k-fold.
    pub fn repeated(&self, n_repeats: usize, seed: u64) -> Option<Self> {
        match self {
            Self::KFold { n_splits, .. } | Self::StratifiedKFold { n_splits, .. } => {
                Some(Self::RepeatedKFold {
                    n_splits: *n_splits,
                    n_repeats,
                    seed,
                })
            }
            _ => None,
        }
    }

    /// Compute the folds for a target matrix with one row per sample.
    pub fn split(&self, y: &DMatrix<f64>) -> HtResult<Vec<Split>> {
        let n = y.nrows();
        match self {
            Self::KFold {
                n_splits,
                shuffle,
                seed,
            } => {
                check_fold_count(*n_splits, n)?;
                let mut order: Vec<usize> = (0..n).collect();
                if *shuffle {
                    order.shuffle(&mut seeded(*seed));
                }
                Ok(contiguous_folds(&order, *n_splits))
            }
            Self::StratifiedKFold {
                n_splits,
                shuffle,
                seed,
            } => {
                check_fold_count(*n_splits, n)?;
                stratified_folds(y, *n_splits, shuffle.then(|| seeded(*seed)))
            }
            Self::RepeatedKFold {
                n_splits,
                n_repeats,
                seed,
            } => {
                check_fold_count(*n_splits, n)?;
                if *n_repeats == 0 {
                    return Err(validation_error!("n_repeats must be at least 1"));
                }
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                let mut splits = Vec::with_capacity(n_splits * n_repeats);
                for _ in 0..*n_repeats {
                    let mut order: Vec<usize> = (0..n).collect();
                    order.shuffle(&mut rng);
                    splits.extend(contiguous_folds(&order, *n_splits));
                }
                Ok(splits)
            }
            Self::Predefined { splits } => {
                if splits.is_empty() {
                    return Err(validation_error!("predefined splits are empty"));
                }
                for (i, split) in splits.iter().enumerate() {
                    if let Some(bad) = split.train.iter().chain(&split.test).find(|&&r| r >= n) {
                        return Err(validation_error!(
                            "split {} references row {} but only {} samples exist",
                            i,
                            bad,
                            n
                        ));
                    }
                    if split.train.is_empty() || split.test.is_empty() {
                        return Err(validation_error!("split {} has an empty side", i));
                    }
                }
                Ok(splits.clone())
            }
        }
    }
}

fn seeded(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn check_fold_count(n_splits: usize, n_samples: usize) -> HtResult<()> {
    if n_splits < 2 {
        return Err(validation_error!(
            "cross-validation needs at least 2 folds, got {}",
            n_splits
        ));
    }
    if n_splits > n_samples {
        return Err(validation_error!(
            "cannot split {} samples into {} folds",
            n_samples,
            n_splits
        ));
    }
    Ok(())
}

/// Consecutive chunks of `order`; the first `n % k` folds get one extra row.
fn contiguous_folds(order: &[usize], n_splits: usize) -> Vec<Split> {
    let n = order.len();
    let base = n / n_splits;
    let extra = n % n_splits;
    let mut splits = Vec::with_capacity(n_splits);
    let mut start = 0;
    for fold in 0..n_splits {
        let size = base + usize::from(fold < extra);
        let mut test: Vec<usize> = order[start..start + size].to_vec();
        test.sort_unstable();
        let mut train: Vec<usize> = order[..start]
            .iter()
            .chain(&order[start + size..])
            .copied()
            .collect();
        train.sort_unstable();
        splits.push(Split { train, test });
        start += size;
    }
    splits
}

fn stratified_folds(
    y: &DMatrix<f64>,
    n_splits: usize,
    rng: Option<ChaCha8Rng>,
) -> HtResult<Vec<Split>> {
    if y.ncols() == 0 {
        return Err(validation_error!("stratification needs a target column"));
    }
    let mut classes: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for i in 0..y.nrows() {
        // Normalise -0.0 so it lands in the same class as 0.0.
        let label = y[(i, 0)] + 0.0;
        classes.entry(label.to_bits()).or_default().push(i);
    }

    let smallest = classes.values().map(Vec::len).min().unwrap_or(0);
    if smallest < n_splits {
        warn!(
            "The least populated class has only {} members, which is less than n_splits={}",
            smallest, n_splits
        );
    }

    let mut rng = rng;
    let mut tests: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    let mut cursor = 0;
    for members in classes.values_mut() {
        if let Some(rng) = rng.as_mut() {
            members.shuffle(rng);
        }
        for &row in members.iter() {
            tests[cursor % n_splits].push(row);
            cursor += 1;
        }
    }

    let n = y.nrows();
    Ok(tests
        .into_iter()
        .map(|mut test| {
            test.sort_unstable();
            let mut in_test = vec![false; n];
            for &row in &test {
                in_test[row] = true;
            }
            let train = (0..n).filter(|&row| !in_test[row]).collect();
            Split { train, test }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Worker pool shared by batch evaluation and fold-level cross-validation.
///
/// `n_jobs` follows the usual convention: `1` runs inline, `-1` uses every
/// core, `-2` all but one, and `k > 1` exactly `k` workers.
#[derive(Debug, Clone, Default)]
pub struct Workers {
    pool: Option<Arc<ThreadPool>>,
}

impl Workers {
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    pub fn new(n_jobs: i32) -> HtResult<Self> {
        let threads = match n_jobs {
            0 => return Err(validation_error!("n_jobs must not be 0")),
            1 => return Ok(Self::sequential()),
            n if n > 1 => n as usize,
            n => {
                let cores = std::thread::available_parallelism()
                    .map(|c| c.get())
                    .unwrap_or(1) as i64;
                (cores + 1 + i64::from(n)).max(1) as usize
            }
        };
        if threads == 1 {
            return Ok(Self::sequential());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hypertune-worker-{i}"))
            .build()
            .map_err(|e| internal_error!("failed to build worker pool: {}", e))?;
        debug!("Built worker pool with {} threads", threads);
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Apply `f` to every item, possibly in parallel; output keeps input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.pool {
            None => items.iter().map(f).collect(),
            Some(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-validation
// ---------------------------------------------------------------------------

/// Per-fold outcome of one cross-validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    pub fit_time: Vec<f64>,
    pub score_time: Vec<f64>,
    pub test_score: Vec<f64>,
}

impl CvScores {
    pub fn n_folds(&self) -> usize {
        self.test_score.len()
    }

    pub fn mean_test_score(&self) -> f64 {
        self.test_score.iter().sum::<f64>() / self.test_score.len() as f64
    }
}

/// Fit and score `estimator` once per split.
///
/// The estimator is cloned for every fold; the first failing fold aborts.
pub fn cross_validate<E: Estimator>(
    estimator: &E,
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    scoring: &Scoring,
    splits: &[Split],
    fit_params: &ParamMap,
    workers: &Workers,
) -> HtResult<CvScores> {
    let folds = workers.map(splits, |split| {
        fit_and_score(estimator, x, y, scoring, split, fit_params)
    });

    let mut scores = CvScores::default();
    for fold in folds {
        let (fit_time, score_time, test_score) = fold?;
        scores.fit_time.push(fit_time);
        scores.score_time.push(score_time);
        scores.test_score.push(test_score);
    }
    Ok(scores)
}

fn fit_and_score<E: Estimator>(
    estimator: &E,
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    scoring: &Scoring,
    split: &Split,
    fit_params: &ParamMap,
) -> HtResult<(f64, f64, f64)> {
    let mut model = estimator.clone_unfitted();
    let x_train = take_rows(x, &split.train);
    let y_train = take_rows(y, &split.train);
    let x_test = take_rows(x, &split.test);
    let y_test = take_rows(y, &split.test);

    let start = Instant::now();
    model.fit(&x_train, &y_train, fit_params)?;
    let fit_time = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let predicted = model.predict(&x_test)?;
    if predicted.shape() != y_test.shape() {
        return Err(EstimatorError::ShapeMismatch {
            message: format!(
                "{} predicted {:?} for targets of shape {:?}",
                model.name(),
                predicted.shape(),
                y_test.shape()
            ),
        }
        .into());
    }
    let test_score = scoring.score(&y_test, &predicted);
    let score_time = start.elapsed().as_secs_f64();

    Ok((fit_time, score_time, test_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoringSpec;
    use ht_types::ParamValue;

    fn targets(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    /// Predicts the training mean of `y` plus a configurable offset.
    #[derive(Debug, Clone, Default)]
    struct MeanModel {
        offset: f64,
        mean: Option<f64>,
    }

    impl Estimator for MeanModel {
        fn name(&self) -> &str {
            "mean"
        }

        fn get_params(&self) -> ParamMap {
            ParamMap::from([("offset".to_string(), ParamValue::Float(self.offset))])
        }

        fn set_params(&mut self, params: &ParamMap) -> HtResult<()> {
            if let Some(v) = params.get("offset").and_then(ParamValue::as_f64) {
                self.offset = v;
            }
            Ok(())
        }

        fn fit(&mut self, _x: &DMatrix<f64>, y: &DMatrix<f64>, _fit_params: &ParamMap) -> HtResult<()> {
            self.mean = Some(y.mean());
            Ok(())
        }

        fn predict(&self, x: &DMatrix<f64>) -> HtResult<DMatrix<f64>> {
            let mean = self.mean.ok_or_else(|| EstimatorError::NotFitted {
                estimator: "mean".to_string(),
            })?;
            Ok(DMatrix::from_element(x.nrows(), 1, mean + self.offset))
        }

        fn clone_unfitted(&self) -> Self {
            Self {
                offset: self.offset,
                mean: None,
            }
        }
    }

    #[test]
    fn kfold_partitions_every_row_once() {
        let y = targets(&[0.0; 10]);
        let strategy = CvStrategy::KFold {
            n_splits: 3,
            shuffle: false,
            seed: None,
        };
        let splits = strategy.split(&y).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].test, vec![0, 1, 2, 3]);
        assert_eq!(splits[1].test, vec![4, 5, 6]);
        assert_eq!(splits[2].test, vec![7, 8, 9]);

        let mut all: Vec<usize> = splits.iter().flat_map(|s| s.test.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        for split in &splits {
            assert_eq!(split.train.len() + split.test.len(), 10);
        }
    }

    #[test]
    fn shuffled_kfold_is_seed_stable() {
        let y = targets(&[0.0; 12]);
        let strategy = CvStrategy::KFold {
            n_splits: 4,
            shuffle: true,
            seed: Some(3),
        };
        assert_eq!(strategy.split(&y).unwrap(), strategy.split(&y).unwrap());
    }

    #[test]
    fn stratified_keeps_class_balance() {
        let y = targets(&[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        let strategy = CvSpec::Folds(2).resolve(true);
        assert!(matches!(strategy, CvStrategy::StratifiedKFold { .. }));

        for split in strategy.split(&y).unwrap() {
            let positives = split.test.iter().filter(|&&r| y[(r, 0)] > 0.5).count();
            assert_eq!(split.test.len(), 4);
            assert_eq!(positives, 2);
        }
    }

    #[test]
    fn repeated_kfold_multiplies_folds() {
        let y = targets(&[0.0; 9]);
        let strategy = CvStrategy::KFold {
            n_splits: 3,
            shuffle: false,
            seed: None,
        }
        .repeated(2, 11)
        .unwrap();
        assert_eq!(strategy.n_splits(), 6);
        assert_eq!(strategy.split(&y).unwrap().len(), 6);
    }

    #[test]
    fn fold_count_is_validated() {
        let y = targets(&[0.0; 3]);
        assert!(CvSpec::Folds(1).resolve(false).split(&y).is_err());
        assert!(CvSpec::Folds(4).resolve(false).split(&y).is_err());

        let bad = CvStrategy::Predefined {
            splits: vec![Split {
                train: vec![0, 1],
                test: vec![5],
            }],
        };
        assert!(bad.split(&y).is_err());
    }

    #[test]
    fn cv_spec_accepts_integer_or_strategy_json() {
        let folds: CvSpec = serde_json::from_str("3").unwrap();
        assert_eq!(folds, CvSpec::Folds(3));
        let strategy: CvSpec =
            serde_json::from_str(r#"{"kind": "repeated_k_fold", "n_splits": 3, "n_repeats": 2, "seed": 1}"#)
                .unwrap();
        assert_eq!(
            strategy,
            CvSpec::Strategy(CvStrategy::RepeatedKFold {
                n_splits: 3,
                n_repeats: 2,
                seed: 1
            })
        );
    }

    #[test]
    fn cross_validate_scores_each_fold() {
        let x = DMatrix::from_element(6, 1, 0.0);
        let y = targets(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let splits = CvSpec::Folds(3).resolve(false).split(&y).unwrap();
        let scoring = Scoring::resolve(&ScoringSpec::named("mean_absolute_error")).unwrap();
        let model = MeanModel {
            offset: 0.5,
            mean: None,
        };

        let scores =
            cross_validate(&model, &x, &y, &scoring, &splits, &ParamMap::new(), &Workers::sequential())
                .unwrap();
        assert_eq!(scores.n_folds(), 3);
        assert!(scores.test_score.iter().all(|s| (s - 0.5).abs() < 1e-12));
        assert!((scores.mean_test_score() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn parallel_workers_preserve_fold_order() {
        let x = DMatrix::from_element(8, 1, 0.0);
        let y = targets(&[0.0, 0.0, 0.0, 0.0, 4.0, 4.0, 4.0, 4.0]);
        let splits = CvSpec::Folds(2).resolve(false).split(&y).unwrap();
        let scoring = Scoring::resolve(&ScoringSpec::named("mean_absolute_error")).unwrap();
        let model = MeanModel::default();

        let sequential =
            cross_validate(&model, &x, &y, &scoring, &splits, &ParamMap::new(), &Workers::sequential())
                .unwrap();
        let parallel =
            cross_validate(&model, &x, &y, &scoring, &splits, &ParamMap::new(), &Workers::new(2).unwrap())
                .unwrap();
        assert_eq!(sequential.test_score, parallel.test_score);
        assert_eq!(Workers::sequential().n_workers(), 1);
        assert_eq!(Workers::new(2).unwrap().n_workers(), 2);
        assert!(Workers::new(0).is_err());
    }
}
