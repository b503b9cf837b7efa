//! # ht-optimizer
//!
//! Cross-validated Bayesian hyperparameter search for HyperTune.
//!
//! Provides the parameter-grid translator, scorers, fold strategies, the
//! result accumulator, surrogate optimizers (Gaussian process and random),
//! and the [`BayesianSearchCv`] driver that ties them together.

mod cv;
mod estimator;
mod objective;
mod report;
mod scoring;
mod search;
mod space;
mod surrogate;

#[cfg(test)]
mod testing;

pub use cv::{cross_validate, CvScores, CvSpec, CvStrategy, Split, Workers};
pub use estimator::Estimator;
pub use objective::{decode, Evaluation, ObjectiveAdapter};
pub use report::{
    progress_line, short_format_time, CvResults, Report, ResultAccumulator, SplitScores,
    DEFAULT_CAPACITY,
};
pub use scoring::{
    builtin_scorer, maximize_for, Accuracy, ExplainedVariance, MeanAbsoluteError,
    MeanSquaredError, RocAuc, Scorer, Scoring, ScoringSpec, R2,
};
pub use search::{
    check_trials, BayesianSearchCv, EstimatorSnapshot, ResultsPackage, SearchBudget,
    SearchConfig, SearchId, SearchState,
};
pub use space::{
    translate, BoundKind, BoundSpec, CategoricalIndex, Distribution, DomainSpec, ParamDistribution,
    ParamGrid, ParameterBound, TranslatedSpace,
};
pub use surrogate::{
    GaussianProcessOptimizer, OptimizerKind, Point, RandomOptimizer, SurrogateOptimizer, Trace,
};
