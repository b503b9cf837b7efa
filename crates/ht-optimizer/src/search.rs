//! The search driver: budget resolution, the optimization loop and refit.

use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ht_types::{validation_error, HtError, HtResult, ParamMap, SearchError};

use crate::cv::{CvSpec, CvStrategy, Split, Workers};
use crate::estimator::Estimator;
use crate::objective::ObjectiveAdapter;
use crate::report::{CvResults, Report, ResultAccumulator};
use crate::scoring::{Scoring, ScoringSpec};
use crate::space::{translate, ParamGrid, TranslatedSpace};
use crate::surrogate::{OptimizerKind, Point, SurrogateOptimizer, Trace};

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Knobs of a search run. Every field has a default, so partial JSON works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fold count or explicit splitter.
    pub cv: CvSpec,
    /// Repeat k-fold this many times with a seed drawn from the search RNG.
    pub cv_repeats: Option<usize>,
    /// Initial design size; defaults to the number of parameters.
    pub init_trials: Option<usize>,
    /// Total evaluations; defaults to five per parameter.
    pub n_iter: Option<usize>,
    pub max_time_secs: Option<f64>,
    /// Stop once two consecutive points are this close; `None` disables.
    pub eps: Option<f64>,
    pub refit: bool,
    pub n_jobs: i32,
    pub verbose: u8,
    pub seed: Option<u64>,
    /// Points proposed per guided step.
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub n_candidates: usize,
    /// Expected-improvement exploration margin.
    pub xi: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cv: CvSpec::default(),
            cv_repeats: None,
            init_trials: None,
            n_iter: None,
            max_time_secs: None,
            eps: Some(1e-3),
            refit: true,
            n_jobs: 1,
            verbose: 0,
            seed: None,
            batch_size: 1,
            optimizer: OptimizerKind::default(),
            n_candidates: 1000,
            xi: 0.01,
        }
    }
}

impl SearchConfig {
    pub fn with_cv(mut self, cv: impl Into<CvSpec>) -> Self {
        self.cv = cv.into();
        self
    }

    pub fn with_cv_repeats(mut self, repeats: usize) -> Self {
        self.cv_repeats = Some(repeats);
        self
    }

    pub fn with_init_trials(mut self, n: usize) -> Self {
        self.init_trials = Some(n);
        self
    }

    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = Some(n);
        self
    }

    pub fn with_max_time(mut self, seconds: f64) -> Self {
        self.max_time_secs = Some(seconds);
        self
    }

    pub fn with_eps(mut self, eps: Option<f64>) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates;
        self
    }

    pub fn with_xi(mut self, xi: f64) -> Self {
        self.xi = xi;
        self
    }
}

/// Resolved evaluation totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBudget {
    pub n_iter: usize,
    pub init_trials: usize,
}

impl SearchBudget {
    /// Evaluations left for the optimizer after the initial design.
    pub fn guided(&self) -> usize {
        self.n_iter - self.init_trials
    }
}

/// Fill in budget defaults and check them against the parameter count.
pub fn check_trials(
    n_iter: Option<usize>,
    init_trials: Option<usize>,
    n_params: usize,
) -> HtResult<SearchBudget> {
    let init_trials = init_trials.unwrap_or(n_params);
    let n_iter = n_iter.unwrap_or(5 * n_params);
    let budget_error = |message: &str| -> HtError {
        SearchError::Budget {
            message: message.to_string(),
            n_iter,
            init_trials,
            n_params,
        }
        .into()
    };

    if init_trials >= n_iter {
        return Err(budget_error(
            "total number of iterations should be higher than the number of initial trials",
        ));
    }
    if init_trials < n_params {
        return Err(budget_error(
            "number of initial trials should be at least equal to the number of search params",
        ));
    }
    Ok(SearchBudget {
        n_iter,
        init_trials,
    })
}

/// Lifecycle of a [`BayesianSearchCv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Constructed,
    Fitting,
    Fitted,
    Failed,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Constructed => "constructed",
            Self::Fitting => "fitting",
            Self::Fitted => "fitted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Name and hyperparameters of an estimator, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSnapshot {
    pub name: String,
    pub params: ParamMap,
}

impl EstimatorSnapshot {
    pub fn of<E: Estimator>(estimator: &E) -> Self {
        Self {
            name: estimator.name().to_string(),
            params: estimator.get_params(),
        }
    }
}

/// Persistable outcome of a search; unset entries are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPackage {
    pub id: SearchId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_results: Option<CvResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_params: Option<ParamMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_estimator: Option<EstimatorSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_estimator: Option<EstimatorSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_splitter: Option<CvStrategy>,
}

/// Cross-validated Bayesian hyperparameter search.
///
/// Construction resolves scoring, budget, folds and the search domain;
/// [`BayesianSearchCv::fit`] runs the initial design followed by the guided
/// loop and, with `refit`, trains the best configuration on all data.
pub struct BayesianSearchCv<E: Estimator> {
    id: SearchId,
    created_at: DateTime<Utc>,
    estimator: E,
    scoring: Scoring,
    config: SearchConfig,
    budget: SearchBudget,
    cv: CvStrategy,
    space: TranslatedSpace,
    optimizer: Box<dyn SurrogateOptimizer>,
    state: SearchState,
    trace: Trace,
    report: Option<Report>,
    best_estimator: Option<E>,
}

impl<E: Estimator> fmt::Debug for BayesianSearchCv<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BayesianSearchCv")
            .field("id", &self.id)
            .field("estimator", &self.estimator.name())
            .field("optimizer", &self.optimizer.name())
            .field("budget", &self.budget)
            .field("state", &self.state)
            .finish()
    }
}

impl<E: Estimator> BayesianSearchCv<E> {
    pub fn new(
        estimator: E,
        grid: &ParamGrid,
        scoring: &ScoringSpec,
        config: SearchConfig,
    ) -> HtResult<Self> {
        let scoring = Scoring::resolve(scoring)?;
        let budget = check_trials(config.n_iter, config.init_trials, grid.len())?;
        if config.batch_size == 0 {
            return Err(validation_error!("batch_size must be at least 1"));
        }

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut cv = config.cv.resolve(estimator.is_classifier());
        if let Some(repeats) = config.cv_repeats {
            cv = cv.repeated(repeats, rng.gen()).ok_or_else(|| {
                validation_error!("cv_repeats only applies to k-fold cross-validation")
            })?;
        }

        let space = translate(grid, budget.guided(), &mut rng)?;
        let optimizer = config
            .optimizer
            .build(rng.gen(), config.n_candidates, config.xi);

        let id = Uuid::new_v4();
        info!(
            "Created search {} for {}: {} parameters, {} iterations ({} initial), {} folds, {} {}",
            id,
            estimator.name(),
            space.dimensions(),
            budget.n_iter,
            budget.init_trials,
            cv.n_splits(),
            if scoring.maximize() { "maximizing" } else { "minimizing" },
            scoring.name()
        );

        Ok(Self {
            id,
            created_at: Utc::now(),
            estimator,
            scoring,
            config,
            budget,
            cv,
            space,
            optimizer,
            state: SearchState::Constructed,
            trace: Trace::new(),
            report: None,
            best_estimator: None,
        })
    }

    /// Replace the optimizer built from the config.
    pub fn with_optimizer(mut self, optimizer: Box<dyn SurrogateOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Run the search on `x` (`n × d`) and `y` (`n × k`).
    ///
    /// `fit_params` reach every estimator `fit` call unchanged. Any failed
    /// evaluation aborts the run and leaves the search `Failed`.
    pub fn fit(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>, fit_params: &ParamMap) -> HtResult<()> {
        if self.state != SearchState::Constructed {
            return Err(SearchError::InvalidState {
                state: self.state.to_string(),
            }
            .into());
        }
        if x.nrows() != y.nrows() {
            return Err(validation_error!(
                "x has {} rows but y has {}",
                x.nrows(),
                y.nrows()
            ));
        }
        if y.ncols() == 0 {
            return Err(validation_error!("y needs at least one column"));
        }

        self.state = SearchState::Fitting;
        match self.run(x, y, fit_params) {
            Ok(()) => {
                self.state = SearchState::Fitted;
                Ok(())
            }
            Err(e) => {
                warn!("Search {} failed: {}", self.id, e);
                self.state = SearchState::Failed;
                Err(e)
            }
        }
    }

    fn run(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>, fit_params: &ParamMap) -> HtResult<()> {
        let splits: Vec<Split> = self.cv.split(y)?;
        let workers = Workers::new(self.config.n_jobs)?;
        debug!(
            "Evaluating {} folds on {} worker(s)",
            splits.len(),
            workers.n_workers()
        );
        let results = Mutex::new(
            ResultAccumulator::new(splits.len(), self.scoring.maximize())
                .with_verbose(self.config.verbose),
        );
        let objective = ObjectiveAdapter {
            space: &self.space,
            estimator: &self.estimator,
            x,
            y,
            fit_params,
            scoring: &self.scoring,
            splits: &splits,
            workers: &workers,
            results: &results,
        };

        let started = Instant::now();
        let mut trace = Trace::new();

        let initial = self
            .optimizer
            .initial_design(&self.space.bounds, self.budget.init_trials);
        evaluate_points(&objective, &initial, &mut trace)?;

        let guided = self.budget.guided();
        let mut proposed = 0;
        while proposed < guided {
            if let Some(limit) = self.config.max_time_secs {
                if started.elapsed().as_secs_f64() > limit {
                    info!("Stopping after {} evaluations: time limit of {}s reached", trace.len(), limit);
                    break;
                }
            }
            if let (Some(eps), Some(step)) = (self.config.eps, trace.last_distance()) {
                if step <= eps {
                    info!(
                        "Stopping after {} evaluations: last step {:.3e} within eps {:.3e}",
                        trace.len(),
                        step,
                        eps
                    );
                    break;
                }
            }

            let batch = self.config.batch_size.min(guided - proposed);
            let points = self.optimizer.propose(&self.space.bounds, &trace, batch);
            if points.is_empty() {
                debug!("Optimizer {} proposed nothing; stopping", self.optimizer.name());
                break;
            }
            proposed += points.len();
            evaluate_points(&objective, &points, &mut trace)?;
        }

        let report = results.into_inner().report();
        info!(
            "Search {} finished {} evaluations in {:.2}s; best {} = {:?} with {:?}",
            self.id,
            trace.len(),
            started.elapsed().as_secs_f64(),
            self.scoring.name(),
            report.best_score,
            report.best_params
        );
        if let Some((point, signal)) = trace.best() {
            debug!("Best optimizer point {:?} with signal {:.6}", point, signal);
        }

        if self.config.refit {
            self.best_estimator = Some(self.refit(&report, x, y, fit_params)?);
        }
        self.trace = trace;
        self.report = Some(report);
        Ok(())
    }

    fn refit(
        &self,
        report: &Report,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        fit_params: &ParamMap,
    ) -> HtResult<E> {
        let best_params = report.best_params.as_ref().ok_or_else(|| SearchError::Refit {
            message: "no evaluation produced a usable score".to_string(),
        })?;
        let mut best = self.estimator.clone_unfitted();
        best.set_params(best_params)
            .and_then(|()| best.fit(x, y, fit_params))
            .map_err(|e| SearchError::Refit {
                message: e.to_string(),
            })?;
        debug!("Refitted {} with {:?}", best.name(), best_params);
        Ok(best)
    }

    pub fn id(&self) -> SearchId {
        self.id
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn budget(&self) -> SearchBudget {
        self.budget
    }

    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }

    pub fn cv(&self) -> &CvStrategy {
        &self.cv
    }

    /// The translated domain the optimizer searches.
    pub fn space(&self) -> &TranslatedSpace {
        &self.space
    }

    pub fn base_estimator(&self) -> &E {
        &self.estimator
    }

    /// Points evaluated by the last `fit`, with their optimizer signals.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn report(&self) -> HtResult<&Report> {
        self.report.as_ref().ok_or_else(|| SearchError::NotFitted.into())
    }

    pub fn cv_results(&self) -> HtResult<&CvResults> {
        Ok(&self.report()?.cv_results)
    }

    pub fn best_params(&self) -> HtResult<&ParamMap> {
        self.report()?
            .best_params
            .as_ref()
            .ok_or_else(|| SearchError::NotFitted.into())
    }

    pub fn best_score(&self) -> HtResult<f64> {
        self.report()?
            .best_score
            .ok_or_else(|| SearchError::NotFitted.into())
    }

    /// Present only after a successful `fit` with `refit` enabled.
    pub fn best_estimator(&self) -> Option<&E> {
        self.best_estimator.as_ref()
    }

    /// Snapshot of everything worth persisting so far.
    pub fn results_package(&self) -> ResultsPackage {
        ResultsPackage {
            id: self.id,
            created_at: self.created_at,
            cv_results: self.report.as_ref().map(|r| r.cv_results.clone()),
            best_params: self.report.as_ref().and_then(|r| r.best_params.clone()),
            best_score: self.report.as_ref().and_then(|r| r.best_score),
            base_estimator: Some(EstimatorSnapshot::of(&self.estimator)),
            best_estimator: self.best_estimator.as_ref().map(EstimatorSnapshot::of),
            cv_splitter: Some(self.cv.clone()),
        }
    }
}

/// Evaluate `points` as one batch and record them in order, stopping at the
/// first failure.
fn evaluate_points<E: Estimator>(
    objective: &ObjectiveAdapter<'_, E>,
    points: &[Point],
    trace: &mut Trace,
) -> HtResult<()> {
    for (point, evaluation) in points.iter().zip(objective.evaluate_batch(points)) {
        let iteration = trace.len() + 1;
        let signal = evaluation
            .and_then(|evaluation| objective.record(evaluation))
            .map_err(|e| SearchError::EvaluationFailed {
                iteration,
                source: Box::new(e),
            })?;
        trace.record(point.clone(), signal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{zeros, Bowl};
    use ht_types::ParamValue;

    fn bowl_grid() -> ParamGrid {
        ParamGrid::new()
            .add_values("a", [1i64, 2, 3])
            .add_values("b", [0i64, 1, 2])
    }

    fn mae() -> ScoringSpec {
        ScoringSpec::named("mean_absolute_error")
    }

    fn config() -> SearchConfig {
        SearchConfig::default()
            .with_cv(CvSpec::Folds(3))
            .with_init_trials(3)
            .with_n_iter(9)
            .with_eps(None)
            .with_seed(42)
    }

    #[test]
    fn budget_defaults_follow_parameter_count() {
        let budget = check_trials(None, None, 2).unwrap();
        assert_eq!(budget, SearchBudget { n_iter: 10, init_trials: 2 });
        assert_eq!(budget.guided(), 8);
    }

    #[test]
    fn budget_rejects_inverted_or_short_designs() {
        let too_many = check_trials(Some(3), Some(3), 2).unwrap_err();
        assert!(matches!(too_many, HtError::Search(SearchError::Budget { .. })));
        let too_few = check_trials(Some(5), Some(1), 2).unwrap_err();
        assert!(matches!(too_few, HtError::Search(SearchError::Budget { .. })));
        assert!(BayesianSearchCv::new(
            Bowl::default(),
            &bowl_grid(),
            &mae(),
            SearchConfig::default().with_init_trials(9).with_n_iter(9)
        )
        .is_err());
    }

    #[test]
    fn finds_the_analytic_optimum_on_a_full_grid() {
        let (x, y) = zeros(12);
        let mut search =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), config()).unwrap();
        search.fit(&x, &y, &ParamMap::new()).unwrap();

        assert_eq!(search.state(), SearchState::Fitted);
        let results = search.cv_results().unwrap();
        assert_eq!(results.len(), 9);
        assert_eq!(results.n_splits(), 3);

        let best = search.best_params().unwrap();
        assert_eq!(best["a"], ParamValue::Int(2));
        assert_eq!(best["b"], ParamValue::Int(1));
        assert_eq!(search.best_score().unwrap(), 0.0);

        let refitted = search.best_estimator().unwrap();
        assert!(refitted.is_fitted());
        assert_eq!(refitted.loss(), 0.0);
        assert!(!search.base_estimator().is_fitted());
    }

    #[test]
    fn same_seed_same_trajectory() {
        let (x, y) = zeros(12);
        let run = || {
            let mut search =
                BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), config()).unwrap();
            search.fit(&x, &y, &ParamMap::new()).unwrap();
            search.trace().points().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn fit_runs_only_once() {
        let (x, y) = zeros(12);
        let mut search =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), config()).unwrap();
        assert!(matches!(
            search.report().unwrap_err(),
            HtError::Search(SearchError::NotFitted)
        ));
        search.fit(&x, &y, &ParamMap::new()).unwrap();
        let again = search.fit(&x, &y, &ParamMap::new()).unwrap_err();
        assert!(matches!(again, HtError::Search(SearchError::InvalidState { .. })));
    }

    #[test]
    fn failing_evaluation_aborts_the_search() {
        let (x, y) = zeros(12);
        let mut search =
            BayesianSearchCv::new(Bowl::failing_on(3.0), &bowl_grid(), &mae(), config()).unwrap();
        let err = search.fit(&x, &y, &ParamMap::new()).unwrap_err();
        match err {
            HtError::Search(SearchError::EvaluationFailed { iteration, .. }) => {
                assert!((1..=9).contains(&iteration));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(search.state(), SearchState::Failed);
        assert!(search.report().is_err());
        assert!(search.results_package().cv_results.is_none());
    }

    #[test]
    fn failed_refit_leaves_no_report() {
        let (x, y) = zeros(12);
        let mut search = BayesianSearchCv::new(
            Bowl::fitting_fewer_than(12),
            &bowl_grid(),
            &mae(),
            config(),
        )
        .unwrap();
        let err = search.fit(&x, &y, &ParamMap::new()).unwrap_err();
        match err {
            HtError::Search(SearchError::Refit { message }) => {
                assert!(message.contains("12 rows"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(search.state(), SearchState::Failed);
        assert!(search.report().is_err());
        assert!(search.best_estimator().is_none());
    }

    #[test]
    fn mismatched_rows_are_rejected_before_fitting() {
        let x = DMatrix::zeros(10, 1);
        let y = DMatrix::zeros(9, 1);
        let mut search =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), config()).unwrap();
        assert!(search.fit(&x, &y, &ParamMap::new()).is_err());
        assert_eq!(search.state(), SearchState::Constructed);
    }

    #[test]
    fn loose_eps_stops_after_the_initial_design() {
        let (x, y) = zeros(12);
        let mut search = BayesianSearchCv::new(
            Bowl::default(),
            &bowl_grid(),
            &mae(),
            config().with_eps(Some(10.0)),
        )
        .unwrap();
        search.fit(&x, &y, &ParamMap::new()).unwrap();
        assert_eq!(search.cv_results().unwrap().len(), 3);
    }

    #[test]
    fn exhausted_time_budget_stops_after_the_initial_design() {
        let (x, y) = zeros(12);
        let mut search = BayesianSearchCv::new(
            Bowl::default(),
            &bowl_grid(),
            &mae(),
            config().with_max_time(0.0),
        )
        .unwrap();
        search.fit(&x, &y, &ParamMap::new()).unwrap();
        assert_eq!(search.cv_results().unwrap().len(), 3);
    }

    #[test]
    fn repeated_folds_and_parallel_batches() {
        let (x, y) = zeros(12);
        let batched = |n_jobs| {
            config()
                .with_cv_repeats(2)
                .with_batch_size(2)
                .with_n_jobs(n_jobs)
                .with_optimizer(OptimizerKind::Random)
        };
        let mut search =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), batched(2)).unwrap();
        assert_eq!(search.cv().n_splits(), 6);
        search.fit(&x, &y, &ParamMap::new()).unwrap();
        let results = search.cv_results().unwrap();
        assert_eq!(results.len(), 9);
        assert_eq!(results.n_splits(), 6);
        assert_eq!(search.best_score().unwrap(), 0.0);

        let mut sequential =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), batched(1)).unwrap();
        sequential.fit(&x, &y, &ParamMap::new()).unwrap();
        assert_eq!(sequential.cv_results().unwrap().params, results.params);
    }

    #[test]
    fn unknown_scorer_is_rejected() {
        let err = BayesianSearchCv::new(
            Bowl::default(),
            &bowl_grid(),
            &ScoringSpec::named("neg_mean_squared_error"),
            config(),
        )
        .unwrap_err();
        assert!(matches!(err, HtError::Search(SearchError::InvalidScoring { .. })));
    }

    #[test]
    fn results_package_omits_unset_entries() {
        let (x, y) = zeros(12);
        let mut search =
            BayesianSearchCv::new(Bowl::default(), &bowl_grid(), &mae(), config().with_refit(false))
                .unwrap();

        let before = serde_json::to_value(search.results_package()).unwrap();
        assert!(before.get("cv_results").is_none());
        assert!(before.get("base_estimator").is_some());

        search.fit(&x, &y, &ParamMap::new()).unwrap();
        assert!(search.best_estimator().is_none());
        let after = serde_json::to_value(search.results_package()).unwrap();
        assert_eq!(after["best_params"], serde_json::json!({"a": 2, "b": 1}));
        assert!(after["cv_results"]["split2_test_score"].is_array());
        assert!(after.get("best_estimator").is_none());

        let back: ResultsPackage = serde_json::from_value(after).unwrap();
        assert_eq!(back.id, search.id());
    }

    #[test]
    fn config_parses_from_partial_json() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"cv": 4, "n_iter": 20, "eps": null, "optimizer": "random"}"#)
                .unwrap();
        assert_eq!(config.cv, CvSpec::Folds(4));
        assert_eq!(config.n_iter, Some(20));
        assert_eq!(config.eps, None);
        assert_eq!(config.optimizer, OptimizerKind::Random);
        assert!(config.refit);
    }
}
