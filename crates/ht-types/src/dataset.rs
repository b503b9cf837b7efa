//! Feature/target tables and learning task kinds.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{DataError, HtResult};

/// Learning task of the estimator being tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    #[serde(rename = "cl")]
    Classification,
    #[serde(rename = "reg")]
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => write!(f, "cl"),
            Self::Regression => write!(f, "reg"),
        }
    }
}

/// A feature matrix paired with its targets (one row per sample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub features: DMatrix<f64>,
    pub targets: DMatrix<f64>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
}

impl Dataset {
    pub fn new(features: DMatrix<f64>, targets: DMatrix<f64>) -> HtResult<Self> {
        let feature_names = (0..features.ncols()).map(|i| format!("x{i}")).collect();
        let target_names = (0..targets.ncols()).map(|i| format!("y{i}")).collect();
        Self::with_names(features, targets, feature_names, target_names)
    }

    pub fn with_names(
        features: DMatrix<f64>,
        targets: DMatrix<f64>,
        feature_names: Vec<String>,
        target_names: Vec<String>,
    ) -> HtResult<Self> {
        if features.nrows() != targets.nrows() {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "features have {} rows but targets have {}",
                    features.nrows(),
                    targets.nrows()
                ),
            }
            .into());
        }
        if targets.ncols() == 0 {
            return Err(DataError::InsufficientData {
                message: "targets have no columns".to_string(),
            }
            .into());
        }
        Ok(Self {
            features,
            targets,
            feature_names,
            target_names,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// Copy the given rows of `matrix`, in order, into a new matrix.
pub fn take_rows(matrix: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), matrix.ncols(), |i, j| matrix[(rows[i], j)])
}
