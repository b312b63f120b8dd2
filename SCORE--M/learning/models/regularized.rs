use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{
    check_features, check_training,
    params::ParamSet,
    tree::{walk, Node},
    ModelError, Regressor,
};

/// Boosted trees grown on squared-loss gradients with an L2 penalty on leaf weights.
///
/// Split gain is `½·(G_L²/(H_L+λ) + G_R²/(H_R+λ) − G²/(H+λ)) − γ` and leaf weights are
/// `−G/(H+λ)` scaled by the learning rate. Squared loss has unit hessians, so `H` is a
/// row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularizedBoostingRegressor {
    learning_rate: f64,
    n_estimators: usize,
    max_depth: usize,
    reg_lambda: f64,
    gamma: f64,
    min_child_weight: f64,
    base_score: f64,
    n_features: usize,
    trees: Vec<Vec<Node>>,
}

const MIN_GAIN: f64 = 1e-6;

impl RegularizedBoostingRegressor {
    /// Hyperparameters accepted by [`RegularizedBoostingRegressor::from_params`].
    pub const PARAMS: [&'static str; 6] = [
        "learning_rate",
        "n_estimators",
        "max_depth",
        "reg_lambda",
        "gamma",
        "min_child_weight",
    ];

    /// Unfitted model configured from a parameter assignment.
    pub fn from_params(params: &ParamSet) -> Result<Self, ModelError> {
        params.ensure_known("regularized_boosting", &Self::PARAMS)?;
        let gamma = match params.get("gamma") {
            None => 0.0,
            Some(_) => params.positive_float("gamma", 0.0)?,
        };
        Ok(Self {
            learning_rate: params.positive_float("learning_rate", 0.3)?,
            n_estimators: params.count("n_estimators", 100)?,
            max_depth: params.count("max_depth", 6)?,
            reg_lambda: params.positive_float("reg_lambda", 1.0)?,
            gamma,
            min_child_weight: params.positive_float("min_child_weight", 1.0)?,
            base_score: 0.0,
            n_features: 0,
            trees: Vec::new(),
        })
    }

    /// Number of boosting rounds fitted.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow(&self, x: ArrayView2<'_, f64>, gradients: &[f64]) -> Vec<Node> {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![(0_usize, (0..x.nrows()).collect::<Vec<_>>(), 0_usize)];
        while let Some((node, rows, depth)) = stack.pop() {
            let g: f64 = rows.iter().map(|&idx| gradients[idx]).sum();
            #[allow(clippy::cast_precision_loss)]
            let h = rows.len() as f64;
            nodes[node] = Node::Leaf {
                value: -self.learning_rate * g / (h + self.reg_lambda),
            };
            if depth >= self.max_depth || h < 2.0 * self.min_child_weight {
                continue;
            }
            let Some((feature, threshold)) = self.best_split(x, gradients, &rows, g, h) else {
                continue;
            };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .iter()
                .copied()
                .partition(|&idx| x[[idx, feature]] <= threshold);
            let left = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node] = Node::Split {
                feature,
                threshold,
                left,
                right: left + 1,
            };
            stack.push((left + 1, right_rows, depth + 1));
            stack.push((left, left_rows, depth + 1));
        }
        nodes
    }

    fn best_split(
        &self,
        x: ArrayView2<'_, f64>,
        gradients: &[f64],
        rows: &[usize],
        g: f64,
        h: f64,
    ) -> Option<(usize, f64)> {
        let lambda = self.reg_lambda;
        let parent = g * g / (h + lambda);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = rows.to_vec();
        for feature in 0..x.ncols() {
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
            let mut g_left = 0.0;
            for position in 1..order.len() {
                g_left += gradients[order[position - 1]];
                let low = x[[order[position - 1], feature]];
                let high = x[[order[position], feature]];
                #[allow(clippy::cast_precision_loss)]
                let h_left = position as f64;
                let h_right = h - h_left;
                if low >= high || h_left < self.min_child_weight || h_right < self.min_child_weight {
                    continue;
                }
                let g_right = g - g_left;
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent)
                    - self.gamma;
                if gain > MIN_GAIN && best.map_or(true, |(_, _, top)| gain > top) {
                    best = Some((feature, low + (high - low) / 2.0, gain));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

impl Regressor for RegularizedBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        self.n_features = x.ncols();
        self.base_score = y.mean().unwrap_or(0.0);
        let mut raw = Array1::from_elem(x.nrows(), self.base_score);
        self.trees.clear();
        for _ in 0..self.n_estimators {
            let gradients: Vec<f64> = raw.iter().zip(y.iter()).map(|(p, t)| p - t).collect();
            let tree = self.grow(x, &gradients);
            for (value, row) in raw.iter_mut().zip(x.rows()) {
                *value += walk(&tree, row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        check_features(self.n_features, x)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.base_score + self.trees.iter().map(|tree| walk(tree, row)).sum::<f64>())
            .collect())
    }
}
