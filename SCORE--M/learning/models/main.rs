//! Regression estimators behind a common fit / predict contract.

/// AdaBoost.R2 ensembles.
pub mod adaboost;
/// Bagged tree ensembles.
pub mod forest;
/// Stagewise gradient boosting.
pub mod gradient;
/// Ordinary least squares.
pub mod linear;
/// Boosting over oblivious trees.
pub mod oblivious;
/// Hyperparameter values, assignments, and grids.
pub mod params;
/// Second-order regularized boosting.
pub mod regularized;
/// CART regression trees.
pub mod tree;

use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use adaboost::AdaBoostRegressor;
use forest::RandomForestRegressor;
use gradient::GradientBoostingRegressor;
use linear::LinearRegression;
use oblivious::ObliviousBoostingRegressor;
use params::ParamSet;
use regularized::RegularizedBoostingRegressor;
use tree::DecisionTreeRegressor;

/// Errors raised while configuring, fitting, or applying an estimator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No rows to fit on.
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    /// Feature and target row counts differ.
    #[error("{rows} feature rows but {targets} targets")]
    LengthMismatch {
        /// Feature rows.
        rows: usize,
        /// Target values.
        targets: usize,
    },
    /// Input has a different width than the training data.
    #[error("model was fitted on {expected} features, got {got}")]
    FeatureMismatch {
        /// Fitted width.
        expected: usize,
        /// Width supplied.
        got: usize,
    },
    /// Inputs contain NaN or infinity.
    #[error("training data contains non-finite values")]
    NonFinite,
    /// Targets are unusable for the chosen objective.
    #[error("invalid targets: {0}")]
    InvalidTarget(String),
    /// A hyperparameter value is out of range or of the wrong kind.
    #[error("invalid value `{value}` for `{name}`: {reason}")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The estimator does not take this hyperparameter.
    #[error("{model} does not accept parameter `{name}`")]
    UnknownParam {
        /// Estimator family.
        model: String,
        /// Parameter name.
        name: String,
    },
    /// Prediction requested before fitting.
    #[error("model has not been fitted")]
    NotFitted,
    /// The normal equations could not be solved.
    #[error("linear system is singular")]
    Singular,
}

/// Fit / predict contract shared by every estimator.
pub trait Regressor {
    /// Learns from features `x` (rows are samples) and targets `y`.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError>;
    /// Predicts one value per row of `x`.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;
}

pub(crate) fn check_training(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::LengthMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if !x.iter().chain(y.iter()).all(|v| v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: ArrayView2<'_, f64>) -> Result<(), ModelError> {
    if x.ncols() == expected {
        Ok(())
    } else {
        Err(ModelError::FeatureMismatch {
            expected,
            got: x.ncols(),
        })
    }
}

/// Estimator families available to model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// [`RandomForestRegressor`].
    RandomForest,
    /// [`DecisionTreeRegressor`].
    DecisionTree,
    /// [`GradientBoostingRegressor`].
    GradientBoosting,
    /// [`LinearRegression`].
    LinearRegression,
    /// [`RegularizedBoostingRegressor`].
    RegularizedBoosting,
    /// [`ObliviousBoostingRegressor`].
    ObliviousBoosting,
    /// [`AdaBoostRegressor`].
    AdaBoost,
}

impl ModelKind {
    /// Builds an unfitted estimator; `seed` drives any resampling it does.
    pub fn configure(self, params: &ParamSet, seed: u64) -> Result<RegressionModel, ModelError> {
        Ok(match self {
            Self::RandomForest => {
                RegressionModel::RandomForest(RandomForestRegressor::from_params(params, seed)?)
            }
            Self::DecisionTree => {
                RegressionModel::DecisionTree(DecisionTreeRegressor::from_params(params)?)
            }
            Self::GradientBoosting => RegressionModel::GradientBoosting(
                GradientBoostingRegressor::from_params(params, seed)?,
            ),
            Self::LinearRegression => {
                RegressionModel::LinearRegression(LinearRegression::from_params(params)?)
            }
            Self::RegularizedBoosting => RegressionModel::RegularizedBoosting(
                RegularizedBoostingRegressor::from_params(params)?,
            ),
            Self::ObliviousBoosting => RegressionModel::ObliviousBoosting(
                ObliviousBoostingRegressor::from_params(params)?,
            ),
            Self::AdaBoost => {
                RegressionModel::AdaBoost(AdaBoostRegressor::from_params(params, seed)?)
            }
        })
    }

    /// Snake-case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::DecisionTree => "decision_tree",
            Self::GradientBoosting => "gradient_boosting",
            Self::LinearRegression => "linear_regression",
            Self::RegularizedBoosting => "regularized_boosting",
            Self::ObliviousBoosting => "oblivious_boosting",
            Self::AdaBoost => "adaboost",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any estimator, tagged by family so fitted state serializes self-describingly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionModel {
    /// Bagged trees.
    RandomForest(RandomForestRegressor),
    /// Single tree.
    DecisionTree(DecisionTreeRegressor),
    /// Gradient boosting.
    GradientBoosting(GradientBoostingRegressor),
    /// Least squares.
    LinearRegression(LinearRegression),
    /// Second-order boosting.
    RegularizedBoosting(RegularizedBoostingRegressor),
    /// Oblivious-tree boosting.
    ObliviousBoosting(ObliviousBoostingRegressor),
    /// AdaBoost.R2.
    AdaBoost(AdaBoostRegressor),
}

impl RegressionModel {
    /// Family of the wrapped estimator.
    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        match self {
            Self::RandomForest(_) => ModelKind::RandomForest,
            Self::DecisionTree(_) => ModelKind::DecisionTree,
            Self::GradientBoosting(_) => ModelKind::GradientBoosting,
            Self::LinearRegression(_) => ModelKind::LinearRegression,
            Self::RegularizedBoosting(_) => ModelKind::RegularizedBoosting,
            Self::ObliviousBoosting(_) => ModelKind::ObliviousBoosting,
            Self::AdaBoost(_) => ModelKind::AdaBoost,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            Self::RandomForest(model) => model,
            Self::DecisionTree(model) => model,
            Self::GradientBoosting(model) => model,
            Self::LinearRegression(model) => model,
            Self::RegularizedBoosting(model) => model,
            Self::ObliviousBoosting(model) => model,
            Self::AdaBoost(model) => model,
        }
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            Self::RandomForest(model) => model,
            Self::DecisionTree(model) => model,
            Self::GradientBoosting(model) => model,
            Self::LinearRegression(model) => model,
            Self::RegularizedBoosting(model) => model,
            Self::ObliviousBoosting(model) => model,
            Self::AdaBoost(model) => model,
        }
    }
}

impl Regressor for RegressionModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        self.inner().predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn every_kind_fits_and_round_trips_through_json() {
        let x = Array2::from_shape_fn((24, 2), |(row, col)| ((row * (col + 1)) % 7) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] + 2.0 * r[1] + 1.0).collect();
        let small = |kind: ModelKind| match kind {
            ModelKind::RandomForest | ModelKind::GradientBoosting | ModelKind::AdaBoost => {
                ParamSet::new().with("n_estimators", 4_i64)
            }
            ModelKind::RegularizedBoosting => ParamSet::new().with("n_estimators", 4_i64),
            ModelKind::ObliviousBoosting => ParamSet::new().with("iterations", 4_i64),
            ModelKind::DecisionTree | ModelKind::LinearRegression => ParamSet::new(),
        };
        for kind in [
            ModelKind::RandomForest,
            ModelKind::DecisionTree,
            ModelKind::GradientBoosting,
            ModelKind::LinearRegression,
            ModelKind::RegularizedBoosting,
            ModelKind::ObliviousBoosting,
            ModelKind::AdaBoost,
        ] {
            let mut model = kind.configure(&small(kind), 42).unwrap();
            model.fit(x.view(), y.view()).unwrap();
            assert_eq!(model.kind(), kind);
            let json = serde_json::to_string(&model).unwrap();
            let restored: RegressionModel = serde_json::from_str(&json).unwrap();
            assert_eq!(
                restored.predict(x.view()).unwrap(),
                model.predict(x.view()).unwrap(),
                "{kind}"
            );
        }
    }

    #[test]
    fn training_inputs_are_validated() {
        let mut model = ModelKind::LinearRegression
            .configure(&ParamSet::new(), 0)
            .unwrap();
        assert!(matches!(
            model.fit(array![[1.0], [2.0]].view(), array![1.0].view()),
            Err(ModelError::LengthMismatch { rows: 2, targets: 1 })
        ));
        assert!(matches!(
            model.fit(array![[f64::NAN]].view(), array![1.0].view()),
            Err(ModelError::NonFinite)
        ));
        assert!(matches!(
            model.predict(array![[1.0]].view()),
            Err(ModelError::NotFitted)
        ));
    }
}
