//! k-nearest-neighbours estimator for classification and regression.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

use ht_optimizer::Estimator;
use ht_types::{EstimatorError, HtResult, ParamMap, ParamValue, Task};

/// How neighbours contribute to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weights {
    Uniform,
    /// Inverse distance; exact matches take all the weight.
    Distance,
}

impl fmt::Display for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => f.write_str("uniform"),
            Self::Distance => f.write_str("distance"),
        }
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    x: DMatrix<f64>,
    y: DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub struct KNeighbors {
    task: Task,
    n_neighbors: usize,
    weights: Weights,
    p: f64,
    fitted: Option<Fitted>,
}

impl KNeighbors {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            n_neighbors: 5,
            weights: Weights::Uniform,
            p: 2.0,
            fitted: None,
        }
    }

    pub fn with_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn task(&self) -> Task {
        self.task
    }

    fn minkowski(&self, a: &[f64], b: &[f64]) -> f64 {
        let sum: f64 = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(self.p))
            .sum();
        sum.powf(1.0 / self.p)
    }

    /// Indices and distances of the `k` nearest training rows, nearest first.
    fn neighbours(&self, train: &DMatrix<f64>, query: &[f64]) -> Vec<(usize, f64)> {
        let mut distances: Vec<(usize, f64)> = (0..train.nrows())
            .map(|i| {
                let row: Vec<f64> = train.row(i).iter().copied().collect();
                (i, self.minkowski(&row, query))
            })
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        distances.truncate(self.n_neighbors);
        distances
    }

    fn neighbour_weights(&self, neighbours: &[(usize, f64)]) -> Vec<f64> {
        match self.weights {
            Weights::Uniform => vec![1.0; neighbours.len()],
            Weights::Distance => {
                if neighbours.iter().any(|(_, d)| *d == 0.0) {
                    neighbours
                        .iter()
                        .map(|(_, d)| if *d == 0.0 { 1.0 } else { 0.0 })
                        .collect()
                } else {
                    neighbours.iter().map(|(_, d)| 1.0 / d).collect()
                }
            }
        }
    }
}

/// Label with the highest total weight; ties go to the smaller label.
fn vote(labels: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut tally: Vec<(f64, f64)> = Vec::new();
    for (label, weight) in labels {
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 += weight,
            None => tally.push((label, weight)),
        }
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.total_cmp(&a.0)))
        .map_or(f64::NAN, |(label, _)| label)
}

impl Estimator for KNeighbors {
    fn name(&self) -> &str {
        "k_neighbors"
    }

    fn is_classifier(&self) -> bool {
        self.task == Task::Classification
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("n_neighbors".to_string(), ParamValue::Int(self.n_neighbors as i64)),
            ("weights".to_string(), ParamValue::Str(self.weights.to_string())),
            ("p".to_string(), ParamValue::Float(self.p)),
        ])
    }

    fn set_params(&mut self, params: &ParamMap) -> HtResult<()> {
        for (name, value) in params {
            match name.as_str() {
                "n_neighbors" => {
                    self.n_neighbors = value
                        .as_i64()
                        .filter(|&k| k >= 1)
                        .map(|k| k as usize)
                        .ok_or_else(|| EstimatorError::InvalidParameter {
                            name: name.clone(),
                            message: format!("expected a positive integer, got {value}"),
                        })?;
                }
                "weights" => {
                    self.weights = match value.as_str() {
                        Some("uniform") => Weights::Uniform,
                        Some("distance") => Weights::Distance,
                        _ => {
                            return Err(EstimatorError::InvalidParameter {
                                name: name.clone(),
                                message: format!("expected 'uniform' or 'distance', got {value}"),
                            }
                            .into())
                        }
                    };
                }
                "p" => {
                    self.p = value.as_f64().filter(|&p| p >= 1.0).ok_or_else(|| {
                        EstimatorError::InvalidParameter {
                            name: name.clone(),
                            message: format!("expected a number >= 1, got {value}"),
                        }
                    })?;
                }
                _ => {
                    return Err(EstimatorError::UnknownParameter {
                        estimator: self.name().to_string(),
                        name: name.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>, _fit_params: &ParamMap) -> HtResult<()> {
        if x.nrows() != y.nrows() {
            return Err(EstimatorError::ShapeMismatch {
                message: format!("x has {} rows but y has {}", x.nrows(), y.nrows()),
            }
            .into());
        }
        if self.n_neighbors > x.nrows() {
            return Err(EstimatorError::FitFailed {
                message: format!(
                    "n_neighbors={} exceeds the {} training samples",
                    self.n_neighbors,
                    x.nrows()
                ),
            }
            .into());
        }
        self.fitted = Some(Fitted {
            x: x.clone(),
            y: y.clone(),
        });
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> HtResult<DMatrix<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| EstimatorError::NotFitted {
            estimator: self.name().to_string(),
        })?;
        if x.ncols() != fitted.x.ncols() {
            return Err(EstimatorError::ShapeMismatch {
                message: format!(
                    "fitted on {} features, asked to predict {}",
                    fitted.x.ncols(),
                    x.ncols()
                ),
            }
            .into());
        }

        let k = fitted.y.ncols();
        let mut out = DMatrix::zeros(x.nrows(), k);
        for i in 0..x.nrows() {
            let query: Vec<f64> = x.row(i).iter().copied().collect();
            let neighbours = self.neighbours(&fitted.x, &query);
            let weights = self.neighbour_weights(&neighbours);
            let total: f64 = weights.iter().sum();

            for j in 0..k {
                let pairs = neighbours
                    .iter()
                    .zip(&weights)
                    .map(|((row, _), w)| (fitted.y[(*row, j)], *w));
                out[(i, j)] = match self.task {
                    Task::Classification => vote(pairs),
                    Task::Regression => pairs.map(|(v, w)| v * w).sum::<f64>() / total,
                };
            }
        }
        Ok(out)
    }

    fn clone_unfitted(&self) -> Self {
        Self {
            fitted: None,
            ..self.clone()
        }
    }
}
