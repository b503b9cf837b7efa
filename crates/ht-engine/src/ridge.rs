//! L2-regularised least squares.

use nalgebra::DMatrix;

use ht_optimizer::Estimator;
use ht_types::{EstimatorError, HtResult, ParamMap, ParamValue};

#[derive(Debug, Clone)]
struct Coefficients {
    weights: DMatrix<f64>,
    intercept: Vec<f64>,
}

/// Ridge regression solved in closed form: `(XᵀX + αI) W = XᵀY`.
#[derive(Debug, Clone)]
pub struct Ridge {
    alpha: f64,
    fit_intercept: bool,
    fitted: Option<Coefficients>,
}

impl Default for Ridge {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }

    /// Fitted weights (`d × k`), if any.
    pub fn coefficients(&self) -> Option<&DMatrix<f64>> {
        self.fitted.as_ref().map(|c| &c.weights)
    }

    pub fn intercept(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|c| c.intercept.as_slice())
    }
}

fn column_means(m: &DMatrix<f64>) -> Vec<f64> {
    (0..m.ncols()).map(|j| m.column(j).mean()).collect()
}

fn centered(m: &DMatrix<f64>, means: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] - means[j])
}

impl Estimator for Ridge {
    fn name(&self) -> &str {
        "ridge"
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("alpha".to_string(), ParamValue::Float(self.alpha)),
            ("fit_intercept".to_string(), ParamValue::Bool(self.fit_intercept)),
        ])
    }

    fn set_params(&mut self, params: &ParamMap) -> HtResult<()> {
        for (name, value) in params {
            match name.as_str() {
                "alpha" => {
                    self.alpha = value.as_f64().filter(|a| *a >= 0.0).ok_or_else(|| {
                        EstimatorError::InvalidParameter {
                            name: name.clone(),
                            message: format!("expected a non-negative number, got {value}"),
                        }
                    })?;
                }
                "fit_intercept" => {
                    self.fit_intercept =
                        value.as_bool().ok_or_else(|| EstimatorError::InvalidParameter {
                            name: name.clone(),
                            message: format!("expected a boolean, got {value}"),
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
        if x.nrows() != y.nrows() || x.nrows() == 0 {
            return Err(EstimatorError::ShapeMismatch {
                message: format!("x has {} rows but y has {}", x.nrows(), y.nrows()),
            }
            .into());
        }

        let (x_mean, y_mean) = if self.fit_intercept {
            (column_means(x), column_means(y))
        } else {
            (vec![0.0; x.ncols()], vec![0.0; y.ncols()])
        };
        let xc = centered(x, &x_mean);
        let yc = centered(y, &y_mean);

        let mut gram = xc.transpose() * &xc;
        for i in 0..gram.nrows() {
            gram[(i, i)] += self.alpha;
        }
        let rhs = xc.transpose() * &yc;

        let weights = match gram.clone().cholesky() {
            Some(cholesky) => cholesky.solve(&rhs),
            None => gram
                .svd(true, true)
                .solve(&rhs, 1e-12)
                .map_err(|e| EstimatorError::FitFailed {
                    message: format!("least-squares solve failed: {e}"),
                })?,
        };

        let intercept = (0..y.ncols())
            .map(|j| {
                y_mean[j]
                    - x_mean
                        .iter()
                        .enumerate()
                        .map(|(i, m)| m * weights[(i, j)])
                        .sum::<f64>()
            })
            .collect();

        self.fitted = Some(Coefficients { weights, intercept });
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> HtResult<DMatrix<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| EstimatorError::NotFitted {
            estimator: self.name().to_string(),
        })?;
        if x.ncols() != fitted.weights.nrows() {
            return Err(EstimatorError::ShapeMismatch {
                message: format!(
                    "fitted on {} features, asked to predict {}",
                    fitted.weights.nrows(),
                    x.ncols()
                ),
            }
            .into());
        }
        let mut out = x * &fitted.weights;
        for j in 0..out.ncols() {
            for i in 0..out.nrows() {
                out[(i, j)] += fitted.intercept[j];
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
