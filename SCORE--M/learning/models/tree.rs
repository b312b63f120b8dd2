use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_features, check_training, params::ParamSet, ModelError, Regressor};
use crate::transformation::imputer::median;

/// Split quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Variance reduction; leaves predict the mean.
    SquaredError,
    /// Variance reduction with Friedman's improvement score; leaves predict the mean.
    FriedmanMse,
    /// Absolute deviation reduction; leaves predict the median.
    AbsoluteError,
    /// Poisson deviance reduction; requires non-negative targets.
    Poisson,
}

impl Criterion {
    /// Parses the parameter spelling.
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        match name {
            "squared_error" => Ok(Self::SquaredError),
            "friedman_mse" => Ok(Self::FriedmanMse),
            "absolute_error" => Ok(Self::AbsoluteError),
            "poisson" => Ok(Self::Poisson),
            other => Err(ModelError::InvalidParam {
                name: "criterion".into(),
                value: other.to_string(),
                reason: "unknown criterion".into(),
            }),
        }
    }

    /// Parameter spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SquaredError => "squared_error",
            Self::FriedmanMse => "friedman_mse",
            Self::AbsoluteError => "absolute_error",
            Self::Poisson => "poisson",
        }
    }
}

/// Growth limits of a single tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Split quality measure.
    pub criterion: Criterion,
    /// Depth cap; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Fewest rows a node needs to be split.
    pub min_samples_split: usize,
    /// Fewest rows each child must keep.
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Flattened tree node; children are indices into the node vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Terminal prediction.
    Leaf {
        /// Predicted value.
        value: f64,
    },
    /// Binary split on `feature <= threshold`.
    Split {
        /// Feature column.
        feature: usize,
        /// Rows at or below go left.
        threshold: f64,
        /// Left child.
        left: usize,
        /// Right child.
        right: usize,
    },
}

/// CART regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    params: TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
}

impl DecisionTreeRegressor {
    /// Hyperparameters accepted by [`DecisionTreeRegressor::from_params`].
    pub const PARAMS: [&'static str; 4] = [
        "criterion",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
    ];

    /// Unfitted tree.
    #[must_use]
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            n_features: 0,
            nodes: Vec::new(),
        }
    }

    /// Unfitted tree configured from a parameter assignment.
    pub fn from_params(params: &ParamSet) -> Result<Self, ModelError> {
        params.ensure_known("decision_tree", &Self::PARAMS)?;
        let criterion = Criterion::parse(params.text("criterion", "squared_error")?)?;
        let max_depth = match params.get("max_depth") {
            None => None,
            Some(_) => Some(params.count("max_depth", 1)?),
        };
        Ok(Self::new(TreeParams {
            criterion,
            max_depth,
            min_samples_split: params.count("min_samples_split", 2)?.max(2),
            min_samples_leaf: params.count("min_samples_leaf", 1)?,
        }))
    }

    /// Fits on the rows listed in `indices`; repeats act as sample weights.
    pub fn fit_rows(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[f64],
        indices: Vec<usize>,
    ) -> Result<(), ModelError> {
        if indices.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if self.params.criterion == Criterion::Poisson {
            let total: f64 = indices.iter().map(|&idx| y[idx]).sum();
            if indices.iter().any(|&idx| y[idx] < 0.0) || total <= 0.0 {
                return Err(ModelError::InvalidTarget(
                    "poisson criterion needs non-negative targets with a positive sum".into(),
                ));
            }
        }
        self.n_features = x.ncols();
        self.nodes = grow(x, y, indices, &self.params);
        Ok(())
    }

    /// Prediction for one feature row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        walk(&self.nodes, row)
    }

    /// Longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Number of terminal nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Growth limits.
    #[must_use]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub(crate) fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub(crate) fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_training(x, y)?;
        let targets = y.to_vec();
        self.fit_rows(x, &targets, (0..x.nrows()).collect())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        check_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Follows splits from the root of `nodes` to a leaf value.
pub(crate) fn walk(nodes: &[Node], row: ArrayView1<'_, f64>) -> f64 {
    let mut at = 0;
    loop {
        match nodes.get(at) {
            Some(Node::Leaf { value }) => return *value,
            Some(Node::Split {
                feature,
                threshold,
                left,
                right,
            }) => at = if row[*feature] <= *threshold { *left } else { *right },
            None => return f64::NAN,
        }
    }
}

struct Task {
    node: usize,
    indices: Vec<usize>,
    depth: usize,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

pub(crate) fn grow(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    indices: Vec<usize>,
    params: &TreeParams,
) -> Vec<Node> {
    let mut nodes = vec![Node::Leaf { value: 0.0 }];
    let mut stack = vec![Task {
        node: 0,
        indices,
        depth: 0,
    }];
    while let Some(task) = stack.pop() {
        let value = leaf_value(params.criterion, y, &task.indices);
        nodes[task.node] = Node::Leaf { value };

        let n = task.indices.len();
        let depth_reached = params.max_depth.is_some_and(|cap| task.depth >= cap);
        if depth_reached
            || n < params.min_samples_split
            || n < 2 * params.min_samples_leaf
            || is_pure(y, &task.indices)
        {
            continue;
        }
        let Some(split) = best_split(x, y, &task.indices, params) else {
            continue;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = task
            .indices
            .iter()
            .copied()
            .partition(|&idx| x[[idx, split.feature]] <= split.threshold);

        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf { value: 0.0 });
        nodes.push(Node::Leaf { value: 0.0 });
        nodes[task.node] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        stack.push(Task {
            node: right,
            indices: right_rows,
            depth: task.depth + 1,
        });
        stack.push(Task {
            node: left,
            indices: left_rows,
            depth: task.depth + 1,
        });
    }
    nodes
}

fn is_pure(y: &[f64], indices: &[usize]) -> bool {
    let first = y[indices[0]];
    let tolerance = 1e-12 * first.abs().max(1.0);
    indices.iter().all(|&idx| (y[idx] - first).abs() <= tolerance)
}

fn leaf_value(criterion: Criterion, y: &[f64], indices: &[usize]) -> f64 {
    match criterion {
        Criterion::AbsoluteError => {
            let mut values: Vec<f64> = indices.iter().map(|&idx| y[idx]).collect();
            median(&mut values).unwrap_or(0.0)
        }
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let n = indices.len() as f64;
            indices.iter().map(|&idx| y[idx]).sum::<f64>() / n
        }
    }
}

fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    indices: &[usize],
    params: &TreeParams,
) -> Option<Candidate> {
    let parent = parent_score(params.criterion, y, indices);
    let min_gain = 1e-12 * parent.abs().max(1.0);
    let mut best: Option<Candidate> = None;
    let mut order = indices.to_vec();
    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let targets: Vec<f64> = order.iter().map(|&idx| y[idx]).collect();
        let values: Vec<f64> = order.iter().map(|&idx| x[[idx, feature]]).collect();
        let scores = split_scores(params.criterion, &targets, &values, params.min_samples_leaf);
        for (position, score) in scores {
            let improves = score - parent > min_gain;
            let beats = best.as_ref().map_or(true, |current| score > current.score);
            if improves && beats {
                best = Some(Candidate {
                    feature,
                    threshold: midpoint(values[position - 1], values[position]),
                    score,
                });
            }
        }
    }
    best
}

fn midpoint(low: f64, high: f64) -> f64 {
    let mid = low + (high - low) / 2.0;
    // Guard against the midpoint rounding up to `high`.
    if mid >= high {
        low
    } else {
        mid
    }
}

/// Score of the unsplit node on the same scale as [`split_scores`].
fn parent_score(criterion: Criterion, y: &[f64], indices: &[usize]) -> f64 {
    let mut targets: Vec<f64> = indices.iter().map(|&idx| y[idx]).collect();
    #[allow(clippy::cast_precision_loss)]
    let n = targets.len() as f64;
    let sum: f64 = targets.iter().sum();
    match criterion {
        Criterion::SquaredError => sum * sum / n,
        Criterion::FriedmanMse => 0.0,
        Criterion::Poisson => poisson_term(sum, n).unwrap_or(f64::NEG_INFINITY),
        Criterion::AbsoluteError => -absolute_deviation(&mut targets),
    }
}

/// Higher-is-better score for each admissible split position over sorted rows.
///
/// Position `p` sends rows `..p` left and `p..` right; only positions between distinct
/// feature values that leave `min_leaf` rows on each side are returned.
fn split_scores(
    criterion: Criterion,
    targets: &[f64],
    values: &[f64],
    min_leaf: usize,
) -> Vec<(usize, f64)> {
    let n = targets.len();
    let total: f64 = targets.iter().sum();
    let mut out = Vec::new();
    let mut left_sum = 0.0;
    let mut left_deviation = RunningDeviation::default();
    let right_deviation = if criterion == Criterion::AbsoluteError {
        suffix_deviations(targets)
    } else {
        Vec::new()
    };
    for position in 1..n {
        let moved = targets[position - 1];
        left_sum += moved;
        if criterion == Criterion::AbsoluteError {
            left_deviation.push(moved);
        }
        if position < min_leaf || n - position < min_leaf || values[position - 1] >= values[position]
        {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let (n_left, n_right) = (position as f64, (n - position) as f64);
        let right_sum = total - left_sum;
        let score = match criterion {
            Criterion::SquaredError => {
                left_sum * left_sum / n_left + right_sum * right_sum / n_right
            }
            Criterion::FriedmanMse => {
                let diff = left_sum / n_left - right_sum / n_right;
                n_left * n_right / (n_left + n_right) * diff * diff
            }
            Criterion::Poisson => match (
                poisson_term(left_sum, n_left),
                poisson_term(right_sum, n_right),
            ) {
                (Some(left), Some(right)) => left + right,
                _ => continue,
            },
            Criterion::AbsoluteError => {
                -(left_deviation.deviation() + right_deviation[position])
            }
        };
        out.push((position, score));
    }
    out
}

/// `out[p]` is the absolute deviation of `targets[p..]`.
fn suffix_deviations(targets: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; targets.len() + 1];
    let mut running = RunningDeviation::default();
    for (position, &target) in targets.iter().enumerate().rev() {
        running.push(target);
        out[position] = running.deviation();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ranked(f64);

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Absolute deviation around the median of a growing sample.
///
/// The lower half sits in a max-heap and the upper half in a min-heap; the
/// lower half holds the extra element when the count is odd.
#[derive(Debug, Default)]
struct RunningDeviation {
    lower: BinaryHeap<Ranked>,
    upper: BinaryHeap<Reverse<Ranked>>,
    lower_sum: f64,
    upper_sum: f64,
}

impl RunningDeviation {
    fn push(&mut self, value: f64) {
        if self.lower.peek().map_or(true, |top| value <= top.0) {
            self.lower.push(Ranked(value));
            self.lower_sum += value;
        } else {
            self.upper.push(Reverse(Ranked(value)));
            self.upper_sum += value;
        }
        if self.lower.len() > self.upper.len() + 1 {
            if let Some(Ranked(moved)) = self.lower.pop() {
                self.lower_sum -= moved;
                self.upper.push(Reverse(Ranked(moved)));
                self.upper_sum += moved;
            }
        } else if self.upper.len() > self.lower.len() {
            if let Some(Reverse(Ranked(moved))) = self.upper.pop() {
                self.upper_sum -= moved;
                self.lower.push(Ranked(moved));
                self.lower_sum += moved;
            }
        }
    }

    fn deviation(&self) -> f64 {
        let middle = if self.lower.len() > self.upper.len() {
            self.lower.peek().map_or(0.0, |top| top.0)
        } else {
            0.0
        };
        self.upper_sum - self.lower_sum + middle
    }
}

fn poisson_term(sum: f64, n: f64) -> Option<f64> {
    if sum <= f64::EPSILON {
        None
    } else {
        Some(sum * (sum / n).ln())
    }
}

fn absolute_deviation(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    sorted_absolute_deviation(values)
}

fn sorted_absolute_deviation(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    let center = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    sorted.iter().map(|v| (v - center).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 2), |(row, col)| {
            if col == 0 {
                row as f64
            } else {
                (row % 3) as f64
            }
        });
        let y = x.column(0).mapv(|v| if v < 10.0 { 5.0 } else { 15.0 });
        (x, y)
    }

    #[test]
    fn finds_the_step() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new(TreeParams::default());
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        let pred = tree.predict(array![[3.0, 0.0], [12.0, 1.0]].view()).unwrap();
        assert_eq!(pred.to_vec(), vec![5.0, 15.0]);
    }

    #[test]
    fn every_criterion_fits_training_data() {
        let (x, y) = step_data();
        for name in ["squared_error", "friedman_mse", "absolute_error", "poisson"] {
            let mut tree =
                DecisionTreeRegressor::from_params(&ParamSet::new().with("criterion", name))
                    .unwrap();
            tree.fit(x.view(), y.view()).unwrap();
            let pred = tree.predict(x.view()).unwrap();
            assert_eq!(pred, y, "criterion {name}");
        }
    }

    #[test]
    fn running_deviation_matches_sorting() {
        let values: Vec<f64> = (0..41_usize).map(|i| ((i * 37) % 23) as f64 - 7.5).collect();
        let mut running = RunningDeviation::default();
        for end in 1..=values.len() {
            running.push(values[end - 1]);
            let expected = absolute_deviation(&mut values[..end].to_vec());
            assert!((running.deviation() - expected).abs() < 1e-9, "prefix {end}");
        }
    }

    #[test]
    fn absolute_error_scores_match_brute_force() {
        let targets: Vec<f64> = (0..30_usize).map(|i| ((i * 11) % 17) as f64).collect();
        let values: Vec<f64> = (0..30_usize).map(|i| (i / 2) as f64).collect();
        let scores = split_scores(Criterion::AbsoluteError, &targets, &values, 2);
        assert!(!scores.is_empty());
        for (position, score) in scores {
            let expected = -(absolute_deviation(&mut targets[..position].to_vec())
                + absolute_deviation(&mut targets[position..].to_vec()));
            assert!((score - expected).abs() < 1e-9, "position {position}");
            assert_eq!(position % 2, 0);
        }
    }

    #[test]
    fn max_depth_caps_growth() {
        let x = Array2::from_shape_fn((32, 1), |(row, _)| row as f64);
        let y = x.column(0).mapv(|v| v * v);
        let mut tree =
            DecisionTreeRegressor::from_params(&ParamSet::new().with("max_depth", 3_i64)).unwrap();
        tree.fit(x.view(), y.view()).unwrap();
        assert!(tree.depth() <= 3);
        assert!(tree.n_leaves() <= 8);
    }

    #[test]
    fn absolute_error_leaves_use_the_median() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = array![1.0, 2.0, 30.0];
        let mut tree = DecisionTreeRegressor::from_params(
            &ParamSet::new().with("criterion", "absolute_error"),
        )
        .unwrap();
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.predict(x.view()).unwrap()[0], 2.0);
    }

    #[test]
    fn poisson_rejects_negative_targets() {
        let x = array![[0.0], [1.0]];
        let y = array![-1.0, 2.0];
        let mut tree =
            DecisionTreeRegressor::from_params(&ParamSet::new().with("criterion", "poisson"))
                .unwrap();
        assert!(matches!(
            tree.fit(x.view(), y.view()),
            Err(ModelError::InvalidTarget(_))
        ));
    }

    #[test]
    fn unknown_criterion_is_rejected() {
        let err = DecisionTreeRegressor::from_params(&ParamSet::new().with("criterion", "gini"))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParam { .. }));
    }
}
