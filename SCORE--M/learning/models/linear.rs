use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{check_features, check_training, params::ParamSet, ModelError, Regressor};

/// Ordinary least squares with an intercept.
///
/// Solves the centered normal equations by Cholesky. A tiny diagonal jitter keeps the
/// system solvable when indicator columns are collinear; it only affects directions the
/// data does not determine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

const JITTER: f64 = 1e-8;

impl LinearRegression {
    /// Unfitted model. Accepts no hyperparameters.
    pub fn from_params(params: &ParamSet) -> Result<Self, ModelError> {
        params.ensure_known("linear_regression", &[])?;
        Ok(Self {
            coefficients: None,
            intercept: 0.0,
        })
    }

    /// Fitted slope per feature.
    #[must_use]
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Fitted intercept.
    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let x_mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let y_mean = y.mean().ok_or(ModelError::EmptyTrainingSet)?;
        let centered = &x - &x_mean;
        let target = y.mapv(|v| v - y_mean);

        let gram = centered.t().dot(&centered);
        let moment = centered.t().dot(&target);
        let scale = gram.diag().iter().copied().fold(0.0, f64::max);
        let coefficients = if scale > 0.0 {
            solve_with_jitter(gram, &moment, scale)?
        } else {
            Array1::zeros(x.ncols())
        };

        self.intercept = y_mean - x_mean.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let coefficients = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}

fn solve_with_jitter(
    gram: Array2<f64>,
    rhs: &Array1<f64>,
    scale: f64,
) -> Result<Array1<f64>, ModelError> {
    let mut ridge = JITTER * scale;
    for _ in 0..6 {
        let mut system = gram.clone();
        system.diag_mut().mapv_inplace(|d| d + ridge);
        if let Some(solution) = cholesky_solve(system, rhs) {
            return Ok(solution);
        }
        ridge *= 100.0;
    }
    Err(ModelError::Singular)
}

/// Solves `a · x = b` for symmetric positive definite `a`; `None` if a pivot is not positive.
fn cholesky_solve(mut a: Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    // Lower factor overwrites the lower triangle of `a`.
    for j in 0..n {
        let mut pivot = a[[j, j]];
        for k in 0..j {
            pivot -= a[[j, k]] * a[[j, k]];
        }
        if pivot <= 0.0 || !pivot.is_finite() {
            return None;
        }
        let pivot = pivot.sqrt();
        a[[j, j]] = pivot;
        for i in (j + 1)..n {
            let mut value = a[[i, j]];
            for k in 0..j {
                value -= a[[i, k]] * a[[j, k]];
            }
            a[[i, j]] = value / pivot;
        }
    }
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= a[[i, k]] * z[k];
        }
        z[i] = value / a[[i, i]];
    }
    let mut solution = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut value = z[i];
        for k in (i + 1)..n {
            value -= a[[k, i]] * solution[k];
        }
        solution[i] = value / a[[i, i]];
    }
    Some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn recovers_exact_linear_relation() {
        let x = array![[1.0, 2.0], [2.0, 0.0], [3.0, 5.0], [4.0, 1.0], [5.0, 3.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(1).mapv(|v| 0.5 * v) + 7.0;
        let mut model = LinearRegression::from_params(&ParamSet::new()).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let coefficients = model.coefficients().unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-6);
        assert!((coefficients[1] + 0.5).abs() < 1e-6);
        assert!((model.intercept() - 7.0).abs() < 1e-6);
    }

    #[test]
    fn collinear_indicator_columns_still_predict() {
        // Two complementary indicators plus their duplicate: rank-deficient design.
        let x = array![
            [1.0, 0.0, 1.0, 10.0],
            [0.0, 1.0, 0.0, 20.0],
            [1.0, 0.0, 1.0, 30.0],
            [0.0, 1.0, 0.0, 40.0],
            [1.0, 0.0, 1.0, 50.0]
        ];
        let y = array![13.0, 21.0, 33.0, 41.0, 53.0];
        let mut model = LinearRegression::from_params(&ParamSet::new()).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-4, "{p} vs {t}");
        }
    }

    #[test]
    fn rejects_hyperparameters() {
        let params = ParamSet::new().with("fit_intercept", "false");
        assert!(matches!(
            LinearRegression::from_params(&params),
            Err(ModelError::UnknownParam { .. })
        ));
    }

    #[test]
    fn constant_features_predict_the_mean() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 6.0];
        let mut model = LinearRegression::from_params(&ParamSet::new()).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(array![[1.0]].view()).unwrap()[0], 3.0);
    }
}
