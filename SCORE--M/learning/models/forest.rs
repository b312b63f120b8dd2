use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    check_features, check_training,
    params::ParamSet,
    tree::{DecisionTreeRegressor, TreeParams},
    ModelError, Regressor,
};

/// Bagged ensemble of fully grown squared-error trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_estimators: usize,
    bootstrap: bool,
    seed: u64,
    trees: Vec<DecisionTreeRegressor>,
}

impl RandomForestRegressor {
    /// Hyperparameters accepted by [`RandomForestRegressor::from_params`].
    pub const PARAMS: [&'static str; 1] = ["n_estimators"];

    /// Unfitted forest.
    #[must_use]
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            bootstrap: true,
            seed,
            trees: Vec::new(),
        }
    }

    /// Unfitted forest configured from a parameter assignment.
    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ModelError> {
        params.ensure_known("random_forest", &Self::PARAMS)?;
        Ok(Self::new(params.count("n_estimators", 100)?, seed))
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTreeRegressor] {
        &self.trees
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let targets = y.to_vec();
        let n = x.nrows();
        // Per-tree seeds are drawn up front so parallel fitting stays reproducible.
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_estimators).map(|_| rng.gen()).collect();
        let bootstrap = self.bootstrap;
        self.trees = tree_seeds
            .into_par_iter()
            .map(|tree_seed| -> Result<DecisionTreeRegressor, ModelError> {
                let rows: Vec<usize> = if bootstrap {
                    let mut rng = ChaCha8Rng::seed_from_u64(tree_seed);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut tree = DecisionTreeRegressor::new(TreeParams::default());
                tree.fit_rows(x, &targets, rows)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let Some(first) = self.trees.first() else {
            return Err(ModelError::NotFitted);
        };
        check_features(first.n_features(), x)?;
        #[allow(clippy::cast_precision_loss)]
        let count = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>() / count)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn curve() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(row, col)| {
            if col == 0 {
                row as f64 / 6.0
            } else {
                (row % 4) as f64
            }
        });
        let y = x.column(0).mapv(|v| (v * 0.8).sin() * 10.0 + v);
        (x, y)
    }

    #[test]
    fn forest_is_reproducible_for_a_seed() {
        let (x, y) = curve();
        let mut first = RandomForestRegressor::new(8, 42);
        let mut second = RandomForestRegressor::new(8, 42);
        first.fit(x.view(), y.view()).unwrap();
        second.fit(x.view(), y.view()).unwrap();
        assert_eq!(first.trees().len(), 8);
        assert_eq!(
            first.predict(x.view()).unwrap(),
            second.predict(x.view()).unwrap()
        );
    }

    #[test]
    fn forest_tracks_the_training_curve() {
        let (x, y) = curve();
        let mut forest = RandomForestRegressor::from_params(
            &ParamSet::new().with("n_estimators", 16_i64),
            7,
        )
        .unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        let mse = (&pred - &y).mapv(|d| d * d).mean().unwrap();
        assert!(mse < 2.0, "mse {mse}");
    }

    #[test]
    fn unfitted_forest_refuses_to_predict() {
        let forest = RandomForestRegressor::new(4, 0);
        assert!(matches!(
            forest.predict(Array2::zeros((1, 2)).view()),
            Err(ModelError::NotFitted)
        ));
    }
}
