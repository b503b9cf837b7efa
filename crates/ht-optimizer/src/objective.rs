//! Bridges optimizer points to cross-validated estimator scores.

use nalgebra::DMatrix;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::debug;

use ht_types::{validation_error, HtResult, ParamMap, ParamValue};

use crate::cv::{cross_validate, CvScores, Split, Workers};
use crate::estimator::Estimator;
use crate::report::ResultAccumulator;
use crate::scoring::Scoring;
use crate::space::TranslatedSpace;

/// Turn an optimizer point back into estimator parameters.
///
/// Categorical coordinates round to the nearest index; other coordinates
/// become integers when integral and floats otherwise.
pub fn decode(space: &TranslatedSpace, point: &[f64]) -> HtResult<ParamMap> {
    if point.len() != space.dimensions() {
        return Err(validation_error!(
            "point has {} coordinates but the space has {} dimensions",
            point.len(),
            space.dimensions()
        ));
    }

    let mut params = ParamMap::new();
    for (bound, &coordinate) in space.bounds.iter().zip(point) {
        let value = if space.categorical.contains(&bound.name) {
            space
                .categorical
                .decode(&bound.name, coordinate)
                .cloned()
                .ok_or_else(|| {
                    validation_error!(
                        "coordinate {} is outside the {} categories of `{}`",
                        coordinate,
                        space.categorical.get(&bound.name).map_or(0, <[ParamValue]>::len),
                        bound.name
                    )
                })?
        } else {
            ParamValue::from_coordinate(coordinate)
        };
        params.insert(bound.name.clone(), value);
    }
    Ok(params)
}

/// One finished but not yet recorded evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub params: ParamMap,
    pub scores: CvScores,
    pub elapsed: f64,
}

/// The objective handed to the optimizer for one `fit` call.
pub struct ObjectiveAdapter<'a, E: Estimator> {
    pub space: &'a TranslatedSpace,
    pub estimator: &'a E,
    pub x: &'a DMatrix<f64>,
    pub y: &'a DMatrix<f64>,
    pub fit_params: &'a ParamMap,
    pub scoring: &'a Scoring,
    pub splits: &'a [Split],
    pub workers: &'a Workers,
    pub results: &'a Mutex<ResultAccumulator>,
}

impl<'a, E: Estimator> ObjectiveAdapter<'a, E> {
    /// Decode, configure a fresh estimator copy and cross-validate it.
    pub fn evaluate(&self, point: &[f64]) -> HtResult<Evaluation> {
        let params = decode(self.space, point)?;
        let mut estimator = self.estimator.clone_unfitted();
        estimator.set_params(&params)?;

        let start = Instant::now();
        let scores = cross_validate(
            &estimator,
            self.x,
            self.y,
            self.scoring,
            self.splits,
            self.fit_params,
            self.workers,
        )?;
        let elapsed = start.elapsed().as_secs_f64();
        debug!(
            "Evaluated {:?}: mean {}={:.6} in {:.3}s",
            params,
            self.scoring.name(),
            scores.mean_test_score(),
            elapsed
        );

        Ok(Evaluation {
            params,
            scores,
            elapsed,
        })
    }

    /// Evaluate several points on the worker pool; results keep input order.
    pub fn evaluate_batch(&self, points: &[Vec<f64>]) -> Vec<HtResult<Evaluation>> {
        self.workers.map(points, |point| self.evaluate(point))
    }

    /// Append an evaluation to the results and return its optimizer signal.
    pub fn record(&self, evaluation: Evaluation) -> HtResult<f64> {
        let mean = evaluation.scores.mean_test_score();
        self.results
            .lock()
            .update(evaluation.params, &evaluation.scores, evaluation.elapsed)?;
        Ok(self.scoring.signal(mean))
    }

    /// Evaluate and record a single point.
    pub fn call(&self, point: &[f64]) -> HtResult<f64> {
        let evaluation = self.evaluate(point)?;
        self.record(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::CvSpec;
    use crate::scoring::ScoringSpec;
    use crate::space::{translate, ParamGrid};
    use crate::testing::{zeros, Bowl};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space(grid: &ParamGrid) -> TranslatedSpace {
        translate(grid, 4, &mut ChaCha8Rng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn integral_coordinates_become_integers() {
        let space = space(&ParamGrid::new().add_values("a", [4.0, 4.3]));
        assert_eq!(decode(&space, &[4.0]).unwrap()["a"], ParamValue::Int(4));
        assert_eq!(decode(&space, &[4.3]).unwrap()["a"], ParamValue::Float(4.3));
    }

    #[test]
    fn categorical_coordinates_round_to_labels() {
        let space = space(&ParamGrid::new().add_values("weights", ["uniform", "distance", "x"]));
        let first = decode(&space, &[1.0]).unwrap();
        assert_eq!(first["weights"], ParamValue::from("distance"));
        assert_eq!(decode(&space, &[0.6]).unwrap(), first);
        assert!(decode(&space, &[3.0]).is_err());
    }

    #[test]
    fn point_length_must_match() {
        let space = space(&ParamGrid::new().add_values("a", [1i64, 2]));
        assert!(decode(&space, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn call_records_and_flips_losses() {
        let space = space(&ParamGrid::new().add_values("a", [1i64, 2, 3]).add_values("b", [0i64, 1]));
        let (x, y) = zeros(6);
        let scoring = Scoring::resolve(&ScoringSpec::named("mean_absolute_error")).unwrap();
        let splits = CvSpec::Folds(3).resolve(false).split(&y).unwrap();
        let results = Mutex::new(ResultAccumulator::new(3, false));
        let estimator = Bowl::default();
        let workers = Workers::sequential();
        let objective = ObjectiveAdapter {
            space: &space,
            estimator: &estimator,
            x: &x,
            y: &y,
            fit_params: &ParamMap::new(),
            scoring: &scoring,
            splits: &splits,
            workers: &workers,
            results: &results,
        };

        let signal = objective.call(&[3.0, 0.0]).unwrap();
        assert!((signal + 2.0).abs() < 1e-12);

        let batch = objective.evaluate_batch(&[vec![2.0, 1.0], vec![1.0, 1.0]]);
        for evaluation in batch {
            objective.record(evaluation.unwrap()).unwrap();
        }

        let report = results.lock().report();
        assert_eq!(report.cv_results.len(), 3);
        assert_eq!(report.best_index, Some(1));
        assert_eq!(report.best_params.unwrap()["a"], ParamValue::Int(2));
        assert!(!estimator.is_fitted());
    }

    #[test]
    fn estimator_errors_propagate() {
        let space = space(&ParamGrid::new().add_values("c", [1i64, 2]));
        let (x, y) = zeros(4);
        let scoring = Scoring::resolve(&ScoringSpec::named("mean_absolute_error")).unwrap();
        let splits = CvSpec::Folds(2).resolve(false).split(&y).unwrap();
        let results = Mutex::new(ResultAccumulator::new(2, false));
        let estimator = Bowl::default();
        let workers = Workers::sequential();
        let objective = ObjectiveAdapter {
            space: &space,
            estimator: &estimator,
            x: &x,
            y: &y,
            fit_params: &ParamMap::new(),
            scoring: &scoring,
            splits: &splits,
            workers: &workers,
            results: &results,
        };

        assert!(objective.call(&[1.0]).is_err());
        assert!(results.lock().is_empty());
    }
}
