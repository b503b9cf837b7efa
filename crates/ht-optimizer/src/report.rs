//! Per-iteration bookkeeping and the final results table.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::info;

use ht_types::{validation_error, HtResult, ParamMap};

use crate::cv::CvScores;

pub const DEFAULT_CAPACITY: usize = 100;

/// Progress lines are right-aligned to this width.
const LINE_WIDTH: usize = 80;

/// Append-only recorder of completed iterations.
///
/// Columns are pre-allocated to an explicit capacity that doubles whenever
/// it fills up.
#[derive(Debug, Clone)]
pub struct ResultAccumulator {
    n_folds: usize,
    maximize: bool,
    verbose: u8,
    capacity: usize,
    total_time: f64,
    params: Vec<ParamMap>,
    mean_fit_time: Vec<f64>,
    std_fit_time: Vec<f64>,
    mean_score_time: Vec<f64>,
    std_score_time: Vec<f64>,
    fold_scores: Vec<Vec<f64>>,
    mean_test_score: Vec<f64>,
    std_test_score: Vec<f64>,
    cumulative_time: Vec<f64>,
}

impl ResultAccumulator {
    pub fn new(n_folds: usize, maximize: bool) -> Self {
        Self::with_capacity(n_folds, maximize, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(n_folds: usize, maximize: bool, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            n_folds,
            maximize,
            verbose: 0,
            capacity,
            total_time: 0.0,
            params: Vec::with_capacity(capacity),
            mean_fit_time: Vec::with_capacity(capacity),
            std_fit_time: Vec::with_capacity(capacity),
            mean_score_time: Vec::with_capacity(capacity),
            std_score_time: Vec::with_capacity(capacity),
            fold_scores: Vec::with_capacity(capacity),
            mean_test_score: Vec::with_capacity(capacity),
            std_test_score: Vec::with_capacity(capacity),
            cumulative_time: Vec::with_capacity(capacity),
        }
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Record one completed iteration.
    pub fn update(&mut self, params: ParamMap, scores: &CvScores, elapsed: f64) -> HtResult<()> {
        if scores.n_folds() != self.n_folds
            || scores.fit_time.len() != self.n_folds
            || scores.score_time.len() != self.n_folds
        {
            return Err(validation_error!(
                "expected {} fold scores, got {}",
                self.n_folds,
                scores.n_folds()
            ));
        }

        if self.len() == self.capacity {
            self.grow();
        }

        let (mean_score, std_score) = mean_std(&scores.test_score);
        self.total_time += elapsed;

        if self.verbose > 0 {
            let line = progress_line(
                self.len() + 1,
                self.n_folds,
                &params,
                mean_score,
                self.total_time,
                self.verbose,
            );
            info!(target: "hypertune::progress", "{}", line);
        }

        let (mean_fit, std_fit) = mean_std(&scores.fit_time);
        let (mean_scoring, std_scoring) = mean_std(&scores.score_time);
        self.params.push(params);
        self.mean_fit_time.push(mean_fit);
        self.std_fit_time.push(std_fit);
        self.mean_score_time.push(mean_scoring);
        self.std_score_time.push(std_scoring);
        self.fold_scores.push(scores.test_score.clone());
        self.mean_test_score.push(mean_score);
        self.std_test_score.push(std_score);
        self.cumulative_time.push(self.total_time);
        Ok(())
    }

    fn grow(&mut self) {
        let additional = self.capacity;
        self.capacity *= 2;
        self.params.reserve_exact(additional);
        self.mean_fit_time.reserve_exact(additional);
        self.std_fit_time.reserve_exact(additional);
        self.mean_score_time.reserve_exact(additional);
        self.std_score_time.reserve_exact(additional);
        self.fold_scores.reserve_exact(additional);
        self.mean_test_score.reserve_exact(additional);
        self.std_test_score.reserve_exact(additional);
        self.cumulative_time.reserve_exact(additional);
    }

    /// Parameters and mean test score of row `i`.
    pub fn row(&self, i: usize) -> Option<(&ParamMap, f64)> {
        Some((self.params.get(i)?, self.mean_test_score[i]))
    }

    /// Finalize every completed row into a [`Report`].
    pub fn report(&self) -> Report {
        let split_test_scores = (0..self.n_folds)
            .map(|fold| self.fold_scores.iter().map(|row| row[fold]).collect())
            .collect();

        let rank_test_score = rank(&self.mean_test_score, self.maximize);
        let best_index = best_index(&self.mean_test_score, self.maximize);

        let cv_results = CvResults {
            params: self.params.clone(),
            mean_fit_time: self.mean_fit_time.clone(),
            std_fit_time: self.std_fit_time.clone(),
            mean_score_time: self.mean_score_time.clone(),
            std_score_time: self.std_score_time.clone(),
            split_test_scores: SplitScores(split_test_scores),
            mean_test_score: self.mean_test_score.clone(),
            std_test_score: self.std_test_score.clone(),
            rank_test_score,
            cumulative_time: self.cumulative_time.clone(),
        };

        Report {
            best_params: best_index.map(|i| self.params[i].clone()),
            best_score: best_index.map(|i| self.mean_test_score[i]),
            best_index,
            cv_results,
        }
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn oriented(score: f64, maximize: bool) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else if maximize {
        score
    } else {
        -score
    }
}

/// Index of the best score; ties resolve to the later row, NaN never wins.
fn best_index(scores: &[f64], maximize: bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some(b) if oriented(score, maximize) < oriented(scores[b], maximize) => {}
            _ => best = Some(i),
        }
    }
    best
}

/// 1-based ranks, best first; equal scores share the lowest rank.
fn rank(scores: &[f64], maximize: bool) -> Vec<usize> {
    scores
        .iter()
        .map(|&s| {
            let own = oriented(s, maximize);
            1 + scores
                .iter()
                .filter(|&&other| oriented(other, maximize) > own)
                .count()
        })
        .collect()
}

/// Format seconds the way the progress lines do.
pub fn short_format_time(seconds: f64) -> String {
    if seconds > 60.0 {
        format!("{:4.1}min", seconds / 60.0)
    } else {
        format!(" {:5.1}s", seconds)
    }
}

/// Build one progress line for iteration `iteration` (1-based).
pub fn progress_line(
    iteration: usize,
    n_folds: usize,
    params: &ParamMap,
    mean_score: f64,
    total_time: f64,
    verbose: u8,
) -> String {
    let mut line = format!("[{iteration}][CV {n_folds}/{n_folds}] END ");
    let mut result = String::new();

    if verbose > 1 {
        let pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        if !pairs.is_empty() {
            result.push_str(&pairs.join(", "));
            result.push(';');
        }
        if verbose > 2 {
            result.push_str(&format!(", score={mean_score:.3}"));
        }
    }
    result.push_str(&format!(" total time={}", short_format_time(total_time)));

    let dots = LINE_WIDTH.saturating_sub(line.len() + result.len());
    line.push_str(&".".repeat(dots));
    line.push_str(&result);
    line
}

/// Per-fold test scores, serialized as `split{i}_test_score` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitScores(pub Vec<Vec<f64>>);

impl SplitScores {
    pub fn key(fold: usize) -> String {
        format!("split{fold}_test_score")
    }

    fn parse_key(key: &str) -> Option<usize> {
        key.strip_prefix("split")?
            .strip_suffix("_test_score")?
            .parse()
            .ok()
    }
}

impl Serialize for SplitScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (fold, column) in self.0.iter().enumerate() {
            map.serialize_entry(&Self::key(fold), column)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SplitScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<f64>>::deserialize(deserializer)?;
        let mut indexed = BTreeMap::new();
        for (key, column) in raw {
            let fold = Self::parse_key(&key)
                .ok_or_else(|| D::Error::custom(format!("unexpected results column `{key}`")))?;
            indexed.insert(fold, column);
        }
        if indexed.keys().enumerate().any(|(expected, &fold)| expected != fold) {
            return Err(D::Error::custom("split score columns are not contiguous"));
        }
        Ok(Self(indexed.into_values().collect()))
    }
}

/// Columnar results table, one entry per completed iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    pub params: Vec<ParamMap>,
    pub mean_fit_time: Vec<f64>,
    pub std_fit_time: Vec<f64>,
    pub mean_score_time: Vec<f64>,
    pub std_score_time: Vec<f64>,
    #[serde(flatten)]
    pub split_test_scores: SplitScores,
    pub mean_test_score: Vec<f64>,
    pub std_test_score: Vec<f64>,
    pub rank_test_score: Vec<usize>,
    pub cumulative_time: Vec<f64>,
}

impl CvResults {
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn n_splits(&self) -> usize {
        self.split_test_scores.0.len()
    }

    /// A numeric column by its serialized name.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let column = match name {
            "mean_fit_time" => &self.mean_fit_time,
            "std_fit_time" => &self.std_fit_time,
            "mean_score_time" => &self.mean_score_time,
            "std_score_time" => &self.std_score_time,
            "mean_test_score" => &self.mean_test_score,
            "std_test_score" => &self.std_test_score,
            "cumulative_time" => &self.cumulative_time,
            "rank_test_score" => {
                return Some(self.rank_test_score.iter().map(|&r| r as f64).collect())
            }
            other => self.split_test_scores.0.get(SplitScores::parse_key(other)?)?,
        };
        Some(column.clone())
    }
}

/// Finalized search outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub cv_results: CvResults,
    pub best_index: Option<usize>,
    pub best_params: Option<ParamMap>,
    pub best_score: Option<f64>,
}
