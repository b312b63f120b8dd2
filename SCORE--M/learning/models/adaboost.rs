use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{
    check_features, check_training,
    params::ParamSet,
    tree::{DecisionTreeRegressor, TreeParams},
    ModelError, Regressor,
};

/// AdaBoost.R2 with linear loss over depth-3 regression trees.
///
/// Each round fits a tree on a weighted bootstrap of the training rows, then raises the
/// weight of rows it predicts badly. Prediction is the weighted median of the trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    learning_rate: f64,
    n_estimators: usize,
    seed: u64,
    estimators: Vec<DecisionTreeRegressor>,
    weights: Vec<f64>,
}

impl AdaBoostRegressor {
    /// Hyperparameters accepted by [`AdaBoostRegressor::from_params`].
    pub const PARAMS: [&'static str; 2] = ["learning_rate", "n_estimators"];

    /// Unfitted model configured from a parameter assignment.
    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ModelError> {
        params.ensure_known("adaboost", &Self::PARAMS)?;
        Ok(Self {
            learning_rate: params.positive_float("learning_rate", 1.0)?,
            n_estimators: params.count("n_estimators", 50)?,
            seed,
            estimators: Vec::new(),
            weights: Vec::new(),
        })
    }

    /// Fitted trees and their voting weights.
    pub fn ensemble(&self) -> impl Iterator<Item = (&DecisionTreeRegressor, f64)> {
        self.estimators.iter().zip(self.weights.iter().copied())
    }

    fn weighted_median(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut votes: Vec<(f64, f64)> = self
            .ensemble()
            .map(|(tree, weight)| (tree.predict_row(row), weight))
            .collect();
        votes.sort_by(|a, b| a.0.total_cmp(&b.0));
        let total: f64 = votes.iter().map(|(_, weight)| weight).sum();
        let mut cumulative = 0.0;
        for (prediction, weight) in &votes {
            cumulative += weight;
            if cumulative >= 0.5 * total {
                return *prediction;
            }
        }
        votes.last().map_or(f64::NAN, |(prediction, _)| *prediction)
    }
}

impl Regressor for AdaBoostRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let n = x.nrows();
        let targets = y.to_vec();
        #[allow(clippy::cast_precision_loss)]
        let mut sample_weight = vec![1.0 / n as f64; n];
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let base = TreeParams {
            max_depth: Some(3),
            ..TreeParams::default()
        };
        self.estimators.clear();
        self.weights.clear();

        for _ in 0..self.n_estimators {
            let sampler = WeightedIndex::new(&sample_weight)
                .map_err(|err| ModelError::InvalidTarget(format!("sample weights: {err}")))?;
            let rows: Vec<usize> = (0..n).map(|_| sampler.sample(&mut rng)).collect();
            let mut tree = DecisionTreeRegressor::new(base.clone());
            tree.fit_rows(x, &targets, rows)?;

            let errors: Vec<f64> = x
                .rows()
                .into_iter()
                .zip(&targets)
                .map(|(row, target)| (tree.predict_row(row) - target).abs())
                .collect();
            let error_max = errors.iter().copied().fold(0.0, f64::max);
            let losses: Vec<f64> = if error_max > 0.0 {
                errors.iter().map(|e| e / error_max).collect()
            } else {
                errors
            };
            let estimator_error: f64 = losses
                .iter()
                .zip(&sample_weight)
                .map(|(loss, weight)| loss * weight)
                .sum();

            if estimator_error <= 0.0 {
                // Perfect fit: keep it and stop.
                self.estimators.push(tree);
                self.weights.push(1.0);
                break;
            }
            if estimator_error >= 0.5 {
                // Worse than chance: drop it unless it is the only one.
                if self.estimators.is_empty() {
                    self.estimators.push(tree);
                    self.weights.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            let estimator_weight = self.learning_rate * (1.0 / beta).ln();
            for (weight, loss) in sample_weight.iter_mut().zip(&losses) {
                *weight *= beta.powf((1.0 - loss) * self.learning_rate);
            }
            let total: f64 = sample_weight.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                self.estimators.push(tree);
                self.weights.push(estimator_weight);
                break;
            }
            for weight in &mut sample_weight {
                *weight /= total;
            }
            self.estimators.push(tree);
            self.weights.push(estimator_weight);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let Some(first) = self.estimators.first() else {
            return Err(ModelError::NotFitted);
        };
        check_features(first.n_features(), x)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.weighted_median(row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn wave() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 1), |(row, _)| row as f64 / 10.0);
        let y = x.column(0).mapv(|v| (v * 1.3).sin() * 4.0 + v);
        (x, y)
    }

    #[test]
    fn ensemble_tracks_the_wave() {
        let (x, y) = wave();
        let mut model = AdaBoostRegressor::from_params(
            &ParamSet::new()
                .with("n_estimators", 32_i64)
                .with("learning_rate", 0.5),
            42,
        )
        .unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        let mse = (&pred - &y).mapv(|d| d * d).mean().unwrap();
        let mean = y.mean().unwrap();
        let var = y.mapv(|v| (v - mean).powi(2)).mean().unwrap();
        assert!(mse < 0.25 * var, "mse {mse} var {var}");
    }

    #[test]
    fn weights_are_positive_and_seeded() {
        let (x, y) = wave();
        let params = ParamSet::new().with("n_estimators", 8_i64);
        let mut first = AdaBoostRegressor::from_params(&params, 5).unwrap();
        let mut second = AdaBoostRegressor::from_params(&params, 5).unwrap();
        first.fit(x.view(), y.view()).unwrap();
        second.fit(x.view(), y.view()).unwrap();
        assert!(first.ensemble().all(|(_, weight)| weight > 0.0));
        assert_eq!(first, second);
    }

    #[test]
    fn perfect_fit_stops_early() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 1.0, 1.0, 1.0];
        let mut model =
            AdaBoostRegressor::from_params(&ParamSet::new().with("n_estimators", 10_i64), 0)
                .unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.ensemble().count(), 1);
        assert_eq!(model.predict(x.view()).unwrap(), y);
    }
}
