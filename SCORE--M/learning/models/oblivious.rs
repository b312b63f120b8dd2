use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_features, check_training, params::ParamSet, ModelError, Regressor};

/// Symmetric tree: level `i` tests `splits[i]` for every node of that level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousTree {
    /// `(feature, threshold)` per level; rows above the threshold set the level's bit.
    pub splits: Vec<(usize, f64)>,
    /// `2^levels` leaf values indexed by the split bits.
    pub leaves: Vec<f64>,
}

impl ObliviousTree {
    fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        self.splits
            .iter()
            .enumerate()
            .fold(0, |index, (level, &(feature, threshold))| {
                index | (usize::from(row[feature] > threshold) << level)
            })
    }

    /// Leaf value for one feature row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.leaves[self.leaf_index(row)]
    }
}

/// Boosting over oblivious trees with quantized feature borders and L2-shrunk leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousBoostingRegressor {
    depth: usize,
    learning_rate: f64,
    iterations: usize,
    l2_leaf_reg: f64,
    border_count: usize,
    base_score: f64,
    n_features: usize,
    trees: Vec<ObliviousTree>,
}

#[derive(Clone, Copy, Default)]
struct Bucket {
    sum: f64,
    count: f64,
}

impl ObliviousBoostingRegressor {
    /// Hyperparameters accepted by [`ObliviousBoostingRegressor::from_params`].
    pub const PARAMS: [&'static str; 5] = [
        "depth",
        "learning_rate",
        "iterations",
        "l2_leaf_reg",
        "border_count",
    ];

    /// Unfitted model configured from a parameter assignment.
    pub fn from_params(params: &ParamSet) -> Result<Self, ModelError> {
        params.ensure_known("oblivious_boosting", &Self::PARAMS)?;
        let depth = params.count("depth", 6)?;
        if depth > 16 {
            return Err(ModelError::InvalidParam {
                name: "depth".into(),
                value: depth.to_string(),
                reason: "must be at most 16".into(),
            });
        }
        Ok(Self {
            depth,
            learning_rate: params.positive_float("learning_rate", 0.03)?,
            iterations: params.count("iterations", 1000)?,
            l2_leaf_reg: params.positive_float("l2_leaf_reg", 3.0)?,
            border_count: params.count("border_count", 254)?,
            base_score: 0.0,
            n_features: 0,
            trees: Vec::new(),
        })
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[ObliviousTree] {
        &self.trees
    }

    fn score(&self, bucket: Bucket) -> f64 {
        bucket.sum * bucket.sum / (bucket.count + self.l2_leaf_reg)
    }

    fn grow(&self, borders: &[Vec<f64>], bins: &[Vec<usize>], residuals: &[f64]) -> ObliviousTree {
        let n = residuals.len();
        let mut leaf_of = vec![0_usize; n];
        let mut splits = Vec::with_capacity(self.depth);

        for level in 0..self.depth {
            let leaves = 1_usize << level;
            let mut best: Option<(usize, usize, f64)> = None;
            for (feature, feature_borders) in borders.iter().enumerate() {
                if feature_borders.is_empty() {
                    continue;
                }
                let width = feature_borders.len() + 1;
                let mut histogram = vec![Bucket::default(); leaves * width];
                for row in 0..n {
                    let bucket = &mut histogram[leaf_of[row] * width + bins[feature][row]];
                    bucket.sum += residuals[row];
                    bucket.count += 1.0;
                }
                let totals: Vec<Bucket> = (0..leaves)
                    .map(|leaf| {
                        histogram[leaf * width..(leaf + 1) * width].iter().fold(
                            Bucket::default(),
                            |acc, b| Bucket {
                                sum: acc.sum + b.sum,
                                count: acc.count + b.count,
                            },
                        )
                    })
                    .collect();
                let mut lower = vec![Bucket::default(); leaves];
                for border in 0..feature_borders.len() {
                    let mut score = 0.0;
                    for leaf in 0..leaves {
                        let bin = histogram[leaf * width + border];
                        lower[leaf].sum += bin.sum;
                        lower[leaf].count += bin.count;
                        let upper = Bucket {
                            sum: totals[leaf].sum - lower[leaf].sum,
                            count: totals[leaf].count - lower[leaf].count,
                        };
                        score += self.score(lower[leaf]) + self.score(upper);
                    }
                    if best.map_or(true, |(_, _, top)| score > top) {
                        best = Some((feature, border, score));
                    }
                }
            }
            let Some((feature, border, _)) = best else {
                break;
            };
            for row in 0..n {
                if bins[feature][row] > border {
                    leaf_of[row] |= 1 << level;
                }
            }
            splits.push((feature, borders[feature][border]));
        }

        let mut buckets = vec![Bucket::default(); 1 << splits.len()];
        for row in 0..n {
            buckets[leaf_of[row]].sum += residuals[row];
            buckets[leaf_of[row]].count += 1.0;
        }
        let leaves = buckets
            .iter()
            .map(|b| self.learning_rate * b.sum / (b.count + self.l2_leaf_reg))
            .collect();
        ObliviousTree { splits, leaves }
    }
}

/// Midpoints between distinct sorted values, thinned evenly to at most `limit`.
fn feature_borders(values: &mut Vec<f64>, limit: usize) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    let midpoints: Vec<f64> = values
        .windows(2)
        .map(|pair| pair[0] + (pair[1] - pair[0]) / 2.0)
        .collect();
    if midpoints.len() <= limit {
        return midpoints;
    }
    (0..limit)
        .map(|k| midpoints[(k * midpoints.len()) / limit])
        .collect()
}

impl Regressor for ObliviousBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let n = x.nrows();
        self.n_features = x.ncols();
        self.base_score = y.mean().unwrap_or(0.0);

        let borders: Vec<Vec<f64>> = x
            .columns()
            .into_iter()
            .map(|column| feature_borders(&mut column.to_vec(), self.border_count))
            .collect();
        let bins: Vec<Vec<usize>> = x
            .columns()
            .into_iter()
            .zip(&borders)
            .map(|(column, feature_borders)| {
                column
                    .iter()
                    .map(|value| feature_borders.partition_point(|border| border < value))
                    .collect()
            })
            .collect();

        let mut raw = Array1::from_elem(n, self.base_score);
        self.trees.clear();
        for _ in 0..self.iterations {
            let residuals: Vec<f64> = y.iter().zip(raw.iter()).map(|(t, p)| t - p).collect();
            let tree = self.grow(&borders, &bins, &residuals);
            for (value, row) in raw.iter_mut().zip(x.rows()) {
                *value += tree.predict_row(row);
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
            .map(|row| {
                self.base_score + self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>()
            })
            .collect())
    }
}
