use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{
    check_features, check_training,
    params::ParamSet,
    tree::{Criterion, DecisionTreeRegressor, TreeParams},
    ModelError, Regressor,
};

/// Stagewise squared-loss boosting of shallow Friedman-MSE trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    learning_rate: f64,
    n_estimators: usize,
    subsample: f64,
    max_depth: usize,
    seed: u64,
    init: f64,
    stages: Vec<DecisionTreeRegressor>,
}

impl GradientBoostingRegressor {
    /// Hyperparameters accepted by [`GradientBoostingRegressor::from_params`].
    pub const PARAMS: [&'static str; 4] = ["learning_rate", "n_estimators", "subsample", "max_depth"];

    /// Unfitted model configured from a parameter assignment.
    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ModelError> {
        params.ensure_known("gradient_boosting", &Self::PARAMS)?;
        Ok(Self {
            learning_rate: params.positive_float("learning_rate", 0.1)?,
            n_estimators: params.count("n_estimators", 100)?,
            subsample: params.fraction("subsample", 1.0)?,
            max_depth: params.count("max_depth", 3)?,
            seed,
            init: 0.0,
            stages: Vec::new(),
        })
    }

    /// Number of fitted stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let n = x.nrows();
        self.init = y.mean().unwrap_or(0.0);
        let mut raw = Array1::from_elem(n, self.init);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let in_bag = ((self.subsample * n as f64) as usize).max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_params = TreeParams {
            criterion: Criterion::FriedmanMse,
            max_depth: Some(self.max_depth),
            ..TreeParams::default()
        };

        self.stages.clear();
        for _ in 0..self.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(raw.iter()).map(|(t, p)| t - p).collect();
            let rows = if in_bag < n {
                let mut rows = sample(&mut rng, n, in_bag).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };
            let mut tree = DecisionTreeRegressor::new(tree_params.clone());
            tree.fit_rows(x, &residuals, rows)?;
            for (value, row) in raw.iter_mut().zip(x.rows()) {
                *value += self.learning_rate * tree.predict_row(row);
            }
            self.stages.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let Some(first) = self.stages.first() else {
            return Err(ModelError::NotFitted);
        };
        check_features(first.n_features(), x)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                self.init
                    + self
                        .stages
                        .iter()
                        .map(|tree| self.learning_rate * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }
}
