//! The contract a model must satisfy to be searched.

use nalgebra::DMatrix;
use std::fmt;

use ht_types::{HtResult, ParamMap};

/// A configurable, fittable model.
///
/// The search never mutates the estimator it was given: every evaluation
/// works on [`Estimator::clone_unfitted`].
pub trait Estimator: Clone + fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Classifiers get stratified folds when the search is given a plain
    /// fold count.
    fn is_classifier(&self) -> bool {
        false
    }

    /// Current hyperparameters.
    fn get_params(&self) -> ParamMap;

    /// Apply hyperparameters. Unknown names and invalid values are errors.
    fn set_params(&mut self, params: &ParamMap) -> HtResult<()>;

    /// Fit on `x` (`n × d`) and `y` (`n × k`). `fit_params` are passed
    /// through untouched from the caller of the search.
    fn fit(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>, fit_params: &ParamMap) -> HtResult<()>;

    /// Predict an `m × k` matrix for `x`.
    fn predict(&self, x: &DMatrix<f64>) -> HtResult<DMatrix<f64>>;

    /// A copy carrying the same hyperparameters but no fitted state.
    ///
    /// Defaults to `clone`; estimators that hold fitted state override it.
    fn clone_unfitted(&self) -> Self {
        self.clone()
    }
}
