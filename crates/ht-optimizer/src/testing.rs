//! Deterministic stub estimator shared by the unit tests.

use nalgebra::DMatrix;

use ht_types::{EstimatorError, HtResult, ParamMap, ParamValue};

use crate::estimator::Estimator;

/// Predicts `(a - 2)² + (b - 1)²` for every row, so with all-zero targets
/// the mean absolute error is minimized at `a = 2, b = 1`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bowl {
    pub a: f64,
    pub b: f64,
    pub fail_on_a: Option<f64>,
    /// Fits on at most this many rows.
    pub max_rows: Option<usize>,
    fitted: bool,
}

impl Bowl {
    /// A bowl whose `fit` fails whenever `a` equals `a_to_reject`.
    pub fn failing_on(a_to_reject: f64) -> Self {
        Self {
            fail_on_a: Some(a_to_reject),
            ..Self::default()
        }
    }

    /// A bowl that fits fold-sized training sets but not `rows` or more.
    pub fn fitting_fewer_than(rows: usize) -> Self {
        Self {
            max_rows: Some(rows - 1),
            ..Self::default()
        }
    }

    pub fn loss(&self) -> f64 {
        (self.a - 2.0).powi(2) + (self.b - 1.0).powi(2)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }
}

impl Estimator for Bowl {
    fn name(&self) -> &str {
        "bowl"
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("a".to_string(), ParamValue::Float(self.a)),
            ("b".to_string(), ParamValue::Float(self.b)),
        ])
    }

    fn set_params(&mut self, params: &ParamMap) -> HtResult<()> {
        for (name, value) in params {
            let slot = match name.as_str() {
                "a" => &mut self.a,
                "b" => &mut self.b,
                _ => {
                    return Err(EstimatorError::UnknownParameter {
                        estimator: "bowl".to_string(),
                        name: name.clone(),
                    }
                    .into())
                }
            };
            *slot = value.as_f64().ok_or_else(|| EstimatorError::InvalidParameter {
                name: name.clone(),
                message: format!("expected a number, got {value}"),
            })?;
        }
        Ok(())
    }

    fn fit(&mut self, x: &DMatrix<f64>, _y: &DMatrix<f64>, _fit_params: &ParamMap) -> HtResult<()> {
        if self.max_rows.is_some_and(|max| x.nrows() > max) {
            return Err(EstimatorError::FitFailed {
                message: format!("{} rows is too many", x.nrows()),
            }
            .into());
        }
        if self.fail_on_a == Some(self.a) {
            return Err(EstimatorError::FitFailed {
                message: format!("refusing a={}", self.a),
            }
            .into());
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> HtResult<DMatrix<f64>> {
        if !self.fitted {
            return Err(EstimatorError::NotFitted {
                estimator: "bowl".to_string(),
            }
            .into());
        }
        Ok(DMatrix::from_element(x.nrows(), 1, self.loss()))
    }

    fn clone_unfitted(&self) -> Self {
        Self {
            fitted: false,
            ..self.clone()
        }
    }
}

/// `n` rows of zero features and zero targets.
pub(crate) fn zeros(n: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    (DMatrix::zeros(n, 1), DMatrix::zeros(n, 1))
}
