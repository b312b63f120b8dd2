use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::metrics::r2_score;
use crate::models::{
    params::{ParamGrid, ParamSet},
    ModelError, ModelKind, Regressor,
};

/// Contiguous, unshuffled K-fold partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    /// `n_splits` folds; at least two.
    pub fn new(n_splits: usize) -> Result<Self, ModelError> {
        if n_splits < 2 {
            return Err(ModelError::InvalidParam {
                name: "cv".into(),
                value: n_splits.to_string(),
                reason: "need at least two folds".into(),
            });
        }
        Ok(Self { n_splits })
    }

    /// `(train, validation)` row indices per fold. The first `n % k` folds hold one extra row.
    pub fn split(&self, n: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, ModelError> {
        if n < self.n_splits {
            return Err(ModelError::InvalidParam {
                name: "cv".into(),
                value: self.n_splits.to_string(),
                reason: format!("cannot split {n} rows into {} folds", self.n_splits),
            });
        }
        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut start = 0;
        let mut folds = Vec::with_capacity(self.n_splits);
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let validation: Vec<usize> = (start..start + size).collect();
            let train: Vec<usize> = (0..start).chain(start + size..n).collect();
            folds.push((train, validation));
            start += size;
        }
        Ok(folds)
    }
}

/// Cross-validated score of one grid assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Assignment evaluated.
    pub params: ParamSet,
    /// Mean validation R²; NaN when a fold failed.
    pub mean_score: f64,
    /// Validation R² per fold.
    pub fold_scores: Vec<f64>,
}

/// Result of a grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// First assignment with the highest mean score.
    pub best_params: ParamSet,
    /// Its mean validation R².
    pub best_score: f64,
    /// Every assignment, in enumeration order.
    pub candidates: Vec<CandidateScore>,
}

/// Exhaustive cross-validated search over a parameter grid.
#[derive(Debug, Clone)]
pub struct GridSearch {
    kind: ModelKind,
    grid: ParamGrid,
    folds: KFold,
    seed: u64,
}

impl GridSearch {
    /// Search over `grid` for estimators of `kind`.
    #[must_use]
    pub fn new(kind: ModelKind, grid: ParamGrid, folds: KFold, seed: u64) -> Self {
        Self {
            kind,
            grid,
            folds,
            seed,
        }
    }

    /// Scores every assignment; fold fits run in parallel, results keep enumeration order.
    pub fn run(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<SearchOutcome, ModelError> {
        let combinations = self.grid.combinations();
        for params in &combinations {
            self.kind.configure(params, self.seed)?;
        }
        let folds = self.folds.split(x.nrows())?;
        let tasks: Vec<(usize, usize)> = (0..combinations.len())
            .flat_map(|combo| (0..folds.len()).map(move |fold| (combo, fold)))
            .collect();
        let scores: Vec<f64> = tasks
            .par_iter()
            .map(|&(combo, fold)| {
                let (train, validation) = &folds[fold];
                self.fold_score(&combinations[combo], x, y, train, validation)
                    .unwrap_or(f64::NAN)
            })
            .collect();

        let candidates: Vec<CandidateScore> = combinations
            .into_iter()
            .zip(scores.chunks(folds.len()))
            .map(|(params, fold_scores)| {
                #[allow(clippy::cast_precision_loss)]
                let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                CandidateScore {
                    params,
                    mean_score,
                    fold_scores: fold_scores.to_vec(),
                }
            })
            .collect();

        let mut best: Option<usize> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.mean_score.is_nan() {
                continue;
            }
            if best.map_or(true, |top| candidate.mean_score > candidates[top].mean_score) {
                best = Some(idx);
            }
        }
        let best = best.ok_or_else(|| {
            ModelError::InvalidTarget(format!("every {} candidate failed to fit", self.kind))
        })?;
        Ok(SearchOutcome {
            best_params: candidates[best].params.clone(),
            best_score: candidates[best].mean_score,
            candidates,
        })
    }

    fn fold_score(
        &self,
        params: &ParamSet,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        train: &[usize],
        validation: &[usize],
    ) -> Result<f64, ModelError> {
        let mut model = self.kind.configure(params, self.seed)?;
        let x_train = x.select(Axis(0), train);
        let y_train = y.select(Axis(0), train);
        model.fit(x_train.view(), y_train.view())?;
        let x_valid = x.select(Axis(0), validation);
        let y_valid = y.select(Axis(0), validation);
        let predicted = model.predict(x_valid.view())?;
        r2_score(y_valid.view(), predicted.view())
    }
}
