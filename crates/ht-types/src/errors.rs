use thiserror::Error;

/// Main error type for HyperTune
#[derive(Error, Debug)]
pub enum HtError {
    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Estimator error: {0}")]
    Estimator(#[from] EstimatorError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while translating a parameter grid into a search domain
#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("Invalid domain for parameter `{parameter}`: {message}")]
    InvalidDomain { parameter: String, message: String },

    #[error("Bound definition is not complete: missing `{missing}` in {bound}")]
    IncompleteBound { missing: String, bound: String },

    #[error("Invalid grid type: expected a mapping or a list of bounds, got {found}")]
    InvalidGridType { found: String },
}

/// Errors raised by the search driver
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid budget: {message} (n_iter={n_iter}, init_trials={init_trials}, n_params={n_params})")]
    Budget {
        message: String,
        n_iter: usize,
        init_trials: usize,
        n_params: usize,
    },

    #[error("Invalid scoring: {message}")]
    InvalidScoring { message: String },

    #[error("Refit with the best parameters failed: {message}")]
    Refit { message: String },

    #[error("Evaluation of iteration {iteration} failed: {source}")]
    EvaluationFailed {
        iteration: usize,
        #[source]
        source: Box<HtError>,
    },

    #[error("Search has not been fitted yet")]
    NotFitted,

    #[error("Search cannot be fitted from state {state}")]
    InvalidState { state: String },
}

/// Errors raised by estimators during configuration, fit or predict
#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Unknown parameter `{name}` for estimator {estimator}")]
    UnknownParameter { estimator: String, name: String },

    #[error("Invalid value for parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Estimator {estimator} is not fitted")]
    NotFitted { estimator: String },

    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    #[error("Fit failed: {message}")]
    FitFailed { message: String },
}

/// Data-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },
}

/// Result type alias for HyperTune operations
pub type HtResult<T> = Result<T, HtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HtError::Config(format!($($arg)*))
    };
}
