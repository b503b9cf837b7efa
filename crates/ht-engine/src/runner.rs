//! Run configuration and the glue between data, estimators and the search.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use ht_data::{load_json, ResultWriter};
use ht_optimizer::{
    BayesianSearchCv, CvStrategy, Estimator, ParamGrid, ResultsPackage, ScoringSpec, SearchBudget,
    SearchConfig, TranslatedSpace,
};
use ht_types::{config_error, Dataset, HtResult, ParamMap, Task};

use crate::knn::KNeighbors;
use crate::ridge::Ridge;

/// Estimators the runner can build by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    KNeighbors,
    Ridge,
}

/// Everything a search run needs besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelKind,
    pub task: Task,
    /// Mapping of name to values/distribution, or a list of bound descriptors.
    pub param_grid: serde_json::Value,
    /// Scorer name or `{scoring, maximize}`; defaults by task.
    #[serde(default)]
    pub scoring: Option<serde_json::Value>,
    /// Fixed estimator parameters applied before the search.
    #[serde(default)]
    pub const_params: ParamMap,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub write_path: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> HtResult<Self> {
        load_json(path)
    }

    pub fn grid(&self) -> HtResult<ParamGrid> {
        ParamGrid::from_json(&self.param_grid)
    }

    pub fn scoring(&self) -> HtResult<ScoringSpec> {
        match &self.scoring {
            Some(value) => ScoringSpec::from_json(value),
            None => Ok(ScoringSpec::named(default_scorer(self.task))),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.search.seed = Some(seed);
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.search.verbose = self.search.verbose.max(verbose);
        self
    }
}

pub fn default_scorer(task: Task) -> &'static str {
    match task {
        Task::Classification => "accuracy",
        Task::Regression => "r2",
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub package: ResultsPackage,
    pub saved_to: Option<PathBuf>,
}

/// What a config resolves to, without touching any data.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub model: ModelKind,
    pub task: Task,
    pub scoring: String,
    pub maximize: bool,
    pub budget: SearchBudget,
    pub cv: CvStrategy,
    pub space: TranslatedSpace,
}

/// Run a full search on `dataset` and save the results when a path is known.
pub fn run(config: &RunConfig, dataset: &Dataset, output: Option<&Path>) -> HtResult<RunOutcome> {
    info!(
        "Running {:?} search ({}) on {} samples x {} features",
        config.model,
        config.task,
        dataset.n_samples(),
        dataset.n_features()
    );
    match config.model {
        ModelKind::KNeighbors => run_search(KNeighbors::new(config.task), config, dataset, output),
        ModelKind::Ridge => run_search(ridge_for(config.task)?, config, dataset, output),
    }
}

/// Resolve scoring, budget, folds and the translated domain of a config.
pub fn inspect(config: &RunConfig) -> HtResult<Inspection> {
    match config.model {
        ModelKind::KNeighbors => inspect_search(KNeighbors::new(config.task), config),
        ModelKind::Ridge => inspect_search(ridge_for(config.task)?, config),
    }
}

fn ridge_for(task: Task) -> HtResult<Ridge> {
    match task {
        Task::Regression => Ok(Ridge::default()),
        Task::Classification => Err(config_error!("ridge only supports the 'reg' task")),
    }
}

fn build<E: Estimator>(mut estimator: E, config: &RunConfig) -> HtResult<BayesianSearchCv<E>> {
    if !config.const_params.is_empty() {
        estimator.set_params(&config.const_params)?;
    }
    BayesianSearchCv::new(
        estimator,
        &config.grid()?,
        &config.scoring()?,
        config.search.clone(),
    )
}

fn run_search<E: Estimator>(
    estimator: E,
    config: &RunConfig,
    dataset: &Dataset,
    output: Option<&Path>,
) -> HtResult<RunOutcome> {
    let mut search = build(estimator, config)?;
    search.fit(&dataset.features, &dataset.targets, &ParamMap::new())?;

    let package = search.results_package();
    let writer = ResultWriter::new(config.write_path.clone());
    let saved_to = match (output, writer.write_path()) {
        (None, None) => None,
        _ => Some(writer.save(&package, output)?),
    };
    Ok(RunOutcome { package, saved_to })
}

fn inspect_search<E: Estimator>(estimator: E, config: &RunConfig) -> HtResult<Inspection> {
    let search = build(estimator, config)?;
    Ok(Inspection {
        model: config.model,
        task: config.task,
        scoring: search.scoring().name().to_string(),
        maximize: search.scoring().maximize(),
        budget: search.budget(),
        cv: search.cv().clone(),
        space: search.space().clone(),
    })
}
