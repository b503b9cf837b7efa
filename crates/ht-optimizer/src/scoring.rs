//! Scorers and scoring-direction resolution.

use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

use ht_types::{HtResult, SearchError};

/// Scores predictions against ground truth. Both matrices are `n × k`.
pub trait Scorer: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64;
}

/// Whether a scorer name denotes a loss.
///
/// Names ending in `loss` or `error` are minimized, everything else is
/// maximized.
pub fn maximize_for(name: &str) -> bool {
    !(name.ends_with("loss") || name.ends_with("error"))
}

/// How the caller asks for scoring.
#[derive(Debug, Clone)]
pub enum ScoringSpec {
    /// A built-in scorer by name; direction follows [`maximize_for`].
    Named(String),
    /// A scorer with an explicit direction.
    Custom { scorer: Arc<dyn Scorer>, maximize: bool },
}

impl ScoringSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn custom(scorer: impl Scorer + 'static, maximize: bool) -> Self {
        Self::Custom {
            scorer: Arc::new(scorer),
            maximize,
        }
    }

    /// Declared direction, without resolving the scorer.
    pub fn maximize(&self) -> bool {
        match self {
            Self::Named(name) => maximize_for(name),
            Self::Custom { maximize, .. } => *maximize,
        }
    }

    /// Parse `"r2"` or `{"scoring": "r2", "maximize": true}`.
    pub fn from_json(value: &serde_json::Value) -> HtResult<Self> {
        match value {
            serde_json::Value::String(name) => Ok(Self::Named(name.clone())),
            serde_json::Value::Object(map) => {
                let name = map.get("scoring").and_then(|v| v.as_str()).ok_or_else(|| {
                    SearchError::InvalidScoring {
                        message: "scoring mapping needs a string `scoring` key".to_string(),
                    }
                })?;
                let maximize = map.get("maximize").and_then(|v| v.as_bool()).ok_or_else(|| {
                    SearchError::InvalidScoring {
                        message: "scoring mapping needs a boolean `maximize` key".to_string(),
                    }
                })?;
                let scorer = builtin_scorer(name).ok_or_else(|| SearchError::InvalidScoring {
                    message: format!("unknown scorer `{name}`"),
                })?;
                Ok(Self::Custom { scorer, maximize })
            }
            other => Err(SearchError::InvalidScoring {
                message: format!("expected a scorer name or a mapping, got {other}"),
            }
            .into()),
        }
    }
}

/// A resolved scorer plus the direction the search should push it.
#[derive(Debug, Clone)]
pub struct Scoring {
    scorer: Arc<dyn Scorer>,
    maximize: bool,
}

impl Scoring {
    pub fn resolve(spec: &ScoringSpec) -> HtResult<Self> {
        match spec {
            ScoringSpec::Named(name) => {
                let scorer = builtin_scorer(name).ok_or_else(|| SearchError::InvalidScoring {
                    message: format!("unknown scorer `{name}`"),
                })?;
                Ok(Self {
                    scorer,
                    maximize: maximize_for(name),
                })
            }
            ScoringSpec::Custom { scorer, maximize } => Ok(Self {
                scorer: Arc::clone(scorer),
                maximize: *maximize,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.scorer.name()
    }

    pub fn maximize(&self) -> bool {
        self.maximize
    }

    pub fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        self.scorer.score(y_true, y_pred)
    }

    /// Map a score onto the optimizer's "higher is better" scale.
    pub fn signal(&self, score: f64) -> f64 {
        if self.maximize {
            score
        } else {
            -score
        }
    }
}

/// Look up a built-in scorer.
pub fn builtin_scorer(name: &str) -> Option<Arc<dyn Scorer>> {
    let scorer: Arc<dyn Scorer> = match name {
        "accuracy" => Arc::new(Accuracy),
        "roc_auc" => Arc::new(RocAuc),
        "r2" => Arc::new(R2),
        "explained_variance" => Arc::new(ExplainedVariance),
        "mean_squared_error" => Arc::new(MeanSquaredError),
        "mean_absolute_error" => Arc::new(MeanAbsoluteError),
        _ => return None,
    };
    Some(scorer)
}

/// Average a per-column metric over all target columns.
fn column_average(
    y_true: &DMatrix<f64>,
    y_pred: &DMatrix<f64>,
    metric: impl Fn(&[f64], &[f64]) -> f64,
) -> f64 {
    let k = y_true.ncols().min(y_pred.ncols());
    if k == 0 {
        return f64::NAN;
    }
    let total: f64 = (0..k)
        .map(|j| {
            let t: Vec<f64> = y_true.column(j).iter().copied().collect();
            let p: Vec<f64> = y_pred.column(j).iter().copied().collect();
            metric(&t, &p)
        })
        .sum();
    total / k as f64
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Fraction of rows predicted exactly (all target columns).
#[derive(Debug, Clone, Copy)]
pub struct Accuracy;

impl Scorer for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        let n = y_true.nrows();
        if n == 0 {
            return f64::NAN;
        }
        let hits = (0..n)
            .filter(|&i| {
                y_true
                    .row(i)
                    .iter()
                    .zip(y_pred.row(i).iter())
                    .all(|(t, p)| (t - p).abs() < 1e-9)
            })
            .count();
        hits as f64 / n as f64
    }
}

/// Area under the ROC curve for a binary first target column, treating the
/// predictions as scores (Mann-Whitney formulation, ties count half).
#[derive(Debug, Clone, Copy)]
pub struct RocAuc;

impl Scorer for RocAuc {
    fn name(&self) -> &str {
        "roc_auc"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        let positives: Vec<f64> = (0..y_true.nrows())
            .filter(|&i| y_true[(i, 0)] > 0.5)
            .map(|i| y_pred[(i, 0)])
            .collect();
        let negatives: Vec<f64> = (0..y_true.nrows())
            .filter(|&i| y_true[(i, 0)] <= 0.5)
            .map(|i| y_pred[(i, 0)])
            .collect();
        if positives.is_empty() || negatives.is_empty() {
            return f64::NAN;
        }
        let mut wins = 0.0;
        for p in &positives {
            for n in &negatives {
                if p > n {
                    wins += 1.0;
                } else if p == n {
                    wins += 0.5;
                }
            }
        }
        wins / (positives.len() * negatives.len()) as f64
    }
}

/// Coefficient of determination, averaged over target columns.
#[derive(Debug, Clone, Copy)]
pub struct R2;

impl Scorer for R2 {
    fn name(&self) -> &str {
        "r2"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        column_average(y_true, y_pred, |t, p| {
            let m = mean(t);
            let ss_res: f64 = t.iter().zip(p).map(|(a, b)| (a - b).powi(2)).sum();
            let ss_tot: f64 = t.iter().map(|a| (a - m).powi(2)).sum();
            if ss_tot == 0.0 {
                if ss_res == 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                1.0 - ss_res / ss_tot
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExplainedVariance;

impl Scorer for ExplainedVariance {
    fn name(&self) -> &str {
        "explained_variance"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        column_average(y_true, y_pred, |t, p| {
            let residuals: Vec<f64> = t.iter().zip(p).map(|(a, b)| a - b).collect();
            let var_true = variance(t);
            if var_true == 0.0 {
                return if variance(&residuals) == 0.0 { 1.0 } else { 0.0 };
            }
            1.0 - variance(&residuals) / var_true
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeanSquaredError;

impl Scorer for MeanSquaredError {
    fn name(&self) -> &str {
        "mean_squared_error"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        column_average(y_true, y_pred, |t, p| {
            mean(&t.iter().zip(p).map(|(a, b)| (a - b).powi(2)).collect::<Vec<_>>())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeanAbsoluteError;

impl Scorer for MeanAbsoluteError {
    fn name(&self) -> &str {
        "mean_absolute_error"
    }

    fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> f64 {
        column_average(y_true, y_pred, |t, p| {
            mean(&t.iter().zip(p).map(|(a, b)| (a - b).abs()).collect::<Vec<_>>())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_types::HtError;
    use serde_json::json;

    fn column(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    #[test]
    fn direction_from_name_suffix() {
        assert!(!maximize_for("neg_mean_squared_error"));
        assert!(!maximize_for("log_loss"));
        assert!(maximize_for("roc_auc"));
        assert!(maximize_for("accuracy"));
    }

    #[test]
    fn mapping_direction_is_honoured_exactly() {
        let spec = ScoringSpec::from_json(&json!({"scoring": "r2", "maximize": false})).unwrap();
        assert!(!spec.maximize());
        let scoring = Scoring::resolve(&spec).unwrap();
        assert!(!scoring.maximize());
        assert_eq!(scoring.name(), "r2");

        let spec = ScoringSpec::custom(MeanSquaredError, true);
        assert!(Scoring::resolve(&spec).unwrap().maximize());
    }

    #[test]
    fn invalid_scoring_is_rejected() {
        for bad in [json!(5), json!({"scoring": "r2"}), json!({"maximize": true})] {
            match ScoringSpec::from_json(&bad).unwrap_err() {
                HtError::Search(SearchError::InvalidScoring { .. }) => (),
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(Scoring::resolve(&ScoringSpec::named("no_such_metric")).is_err());
    }

    #[test]
    fn signal_flips_for_losses() {
        let loss = Scoring::resolve(&ScoringSpec::named("mean_squared_error")).unwrap();
        assert!(!loss.maximize());
        assert_eq!(loss.signal(2.5), -2.5);

        let gain = Scoring::resolve(&ScoringSpec::named("r2")).unwrap();
        assert_eq!(gain.signal(0.5), 0.5);
    }

    #[test]
    fn regression_metrics() {
        let t = column(&[1.0, 2.0, 3.0, 4.0]);
        let p = column(&[1.0, 2.0, 3.0, 5.0]);
        assert!((MeanSquaredError.score(&t, &p) - 0.25).abs() < 1e-12);
        assert!((MeanAbsoluteError.score(&t, &p) - 0.25).abs() < 1e-12);
        assert!((R2.score(&t, &t) - 1.0).abs() < 1e-12);
        assert!((R2.score(&t, &p) - (1.0 - 1.0 / 5.0)).abs() < 1e-12);
    }

    #[test]
    fn classification_metrics() {
        let t = column(&[0.0, 0.0, 1.0, 1.0]);
        let p = column(&[0.0, 1.0, 1.0, 1.0]);
        assert!((Accuracy.score(&t, &p) - 0.75).abs() < 1e-12);
        // Two positives, two negatives; one negative ties with both positives.
        assert!((RocAuc.score(&t, &p) - 0.75).abs() < 1e-12);
    }
}
