//! Reference estimators, run configuration and the command-line runner for
//! HyperTune.

pub mod knn;
pub mod ridge;
pub mod runner;

pub use knn::{KNeighbors, Weights};
pub use ridge::Ridge;
pub use runner::{default_scorer, inspect, run, Inspection, ModelKind, RunConfig, RunOutcome};
