use std::path::PathBuf;

use indexmap::IndexMap;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use super::{
    catalog::{CatalogEntry, ModelCatalog},
    metrics::r2_score,
    search::{GridSearch, KFold},
};
use crate::{
    artifact::{save_artifact, Artifact},
    config::PipelineConfig,
    error::{PipelineError, Stage, StageResultExt},
    models::{params::ParamSet, ModelError, RegressionModel, Regressor},
    telemetry::PipelineTelemetry,
};

/// Settings for model selection.
#[derive(Debug, Clone)]
pub struct ModelTrainerConfig {
    /// Destination of the winning model.
    pub model_path: PathBuf,
    /// Minimum test R² for the winner to be persisted.
    pub acceptance_threshold: f64,
    /// Cross-validation folds.
    pub cv_folds: usize,
    /// Seed for every seeded estimator.
    pub seed: u64,
    /// Candidate models.
    pub catalog: ModelCatalog,
}

impl From<&PipelineConfig> for ModelTrainerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            model_path: config.artifacts.model_path.clone(),
            acceptance_threshold: config.acceptance_threshold,
            cv_folds: config.cv_folds,
            seed: config.seed,
            catalog: ModelCatalog::standard(),
        }
    }
}

/// Scores of one catalog entry after tuning and refitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// R² on the held-out test split; drives selection.
    pub test_r2: f64,
    /// R² on the training split.
    pub train_r2: f64,
    /// Chosen grid assignment.
    pub best_params: ParamSet,
    /// Mean cross-validation R² of that assignment.
    pub cv_score: f64,
}

/// Per-entry scores keyed by catalog name, in catalog order.
pub type ModelReport = IndexMap<String, ModelScore>;

/// Outcome of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Name of the persisted model.
    pub best_model: String,
    /// Its test R².
    pub test_r2: f64,
    /// Every entry's scores.
    pub report: ModelReport,
    /// Where the model was written.
    pub model_path: PathBuf,
}

/// Persisted winner: its catalog name, tuned parameters, and fitted estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Catalog name.
    pub name: String,
    /// Tuned parameters.
    pub params: ParamSet,
    /// Feature width the estimator expects.
    pub n_features: usize,
    /// Test R² at selection time.
    pub test_r2: f64,
    /// Fitted estimator.
    pub model: RegressionModel,
}

impl Artifact for TrainedModel {
    const KIND: &'static str = "model";
}

impl TrainedModel {
    /// Predicts one value per row of `x`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        self.model.predict(x)
    }
}

/// Splits a transformed matrix into features (all but the last column) and target.
pub fn split_features_target(
    data: &Array2<f64>,
) -> Result<(ArrayView2<'_, f64>, ArrayView1<'_, f64>), ModelError> {
    let Some(last) = data.ncols().checked_sub(1).filter(|&last| last > 0) else {
        return Err(ModelError::FeatureMismatch {
            expected: 2,
            got: data.ncols(),
        });
    };
    Ok((data.slice(s![.., ..last]), data.column(last)))
}

/// Tunes every catalog entry, keeps the best by test R², and persists it.
#[derive(Debug)]
pub struct ModelTrainer {
    config: ModelTrainerConfig,
    telemetry: PipelineTelemetry,
}

struct Evaluated {
    score: ModelScore,
    model: RegressionModel,
}

impl ModelTrainer {
    /// Creates the component.
    #[must_use]
    pub fn new(config: ModelTrainerConfig, telemetry: PipelineTelemetry) -> Self {
        Self { config, telemetry }
    }

    /// Runs selection and returns the winner's test R².
    pub fn initiate(&self, train: &Array2<f64>, test: &Array2<f64>) -> Result<f64, PipelineError> {
        self.run(train, test).map(|summary| summary.test_r2)
    }

    /// Runs selection and returns the full summary.
    pub fn run(
        &self,
        train: &Array2<f64>,
        test: &Array2<f64>,
    ) -> Result<TrainingSummary, PipelineError> {
        let (x_train, y_train) = split_features_target(train).in_stage(Stage::Training)?;
        let (x_test, y_test) = split_features_target(test).in_stage(Stage::Training)?;
        if x_train.ncols() != x_test.ncols() {
            return Err(PipelineError::message(
                Stage::Training,
                format!(
                    "train has {} feature columns but test has {}",
                    x_train.ncols(),
                    x_test.ncols()
                ),
            ));
        }
        if self.config.catalog.is_empty() {
            return Err(PipelineError::message(Stage::Training, "model catalog is empty"));
        }
        let folds = KFold::new(self.config.cv_folds).in_stage(Stage::Training)?;
        self.telemetry.note(
            LogLevel::Info,
            "training.start",
            json!({
                "train_rows": x_train.nrows(),
                "test_rows": x_test.nrows(),
                "features": x_train.ncols(),
                "models": self.config.catalog.len(),
            }),
        );

        let mut report = ModelReport::new();
        let mut best: Option<(String, Evaluated)> = None;
        for entry in self.config.catalog.entries() {
            let evaluated = self
                .evaluate(entry, folds, (x_train, y_train), (x_test, y_test))
                .in_stage(Stage::Training)?;
            self.telemetry.note(
                LogLevel::Info,
                "training.model_evaluated",
                json!({
                    "model": entry.name,
                    "test_r2": evaluated.score.test_r2,
                    "train_r2": evaluated.score.train_r2,
                    "cv_score": evaluated.score.cv_score,
                    "best_params": evaluated.score.best_params,
                }),
            );
            report.insert(entry.name.clone(), evaluated.score.clone());
            let improves = best
                .as_ref()
                .map_or(true, |(_, top)| evaluated.score.test_r2 > top.score.test_r2);
            if !evaluated.score.test_r2.is_nan() && improves {
                best = Some((entry.name.clone(), evaluated));
            }
        }

        let Some((best_model, winner)) = best else {
            return Err(PipelineError::message(
                Stage::Training,
                "no catalog entry produced a finite test score",
            ));
        };
        let test_r2 = winner.score.test_r2;
        if test_r2 < self.config.acceptance_threshold {
            self.telemetry.note(
                LogLevel::Warn,
                "training.rejected",
                json!({
                    "best_model": best_model,
                    "test_r2": test_r2,
                    "threshold": self.config.acceptance_threshold,
                }),
            );
            self.telemetry.signal(
                "pipeline.training.rejected",
                json!({ "best_model": best_model, "test_r2": test_r2 }),
            );
            return Err(PipelineError::NoAcceptableModel {
                best_model,
                best_score: test_r2,
                threshold: self.config.acceptance_threshold,
            });
        }

        let trained = TrainedModel {
            name: best_model.clone(),
            params: winner.score.best_params.clone(),
            n_features: x_train.ncols(),
            test_r2,
            model: winner.model,
        };
        save_artifact(&self.config.model_path, &trained).in_stage(Stage::Training)?;
        self.telemetry.note(
            LogLevel::Info,
            "training.completed",
            json!({
                "best_model": best_model,
                "test_r2": test_r2,
                "model_path": self.config.model_path,
            }),
        );
        self.telemetry.signal(
            "pipeline.training.completed",
            json!({ "best_model": best_model, "test_r2": test_r2 }),
        );
        Ok(TrainingSummary {
            best_model,
            test_r2,
            report,
            model_path: self.config.model_path.clone(),
        })
    }

    fn evaluate(
        &self,
        entry: &CatalogEntry,
        folds: KFold,
        (x_train, y_train): (ArrayView2<'_, f64>, ArrayView1<'_, f64>),
        (x_test, y_test): (ArrayView2<'_, f64>, ArrayView1<'_, f64>),
    ) -> Result<Evaluated, ModelError> {
        let search = GridSearch::new(entry.kind, entry.grid.clone(), folds, self.config.seed);
        let outcome = search.run(x_train, y_train)?;
        self.telemetry.note(
            LogLevel::Debug,
            "training.search_completed",
            json!({
                "model": entry.name,
                "candidates": outcome.candidates.len(),
                "best_params": outcome.best_params,
                "cv_score": outcome.best_score,
            }),
        );

        let mut model = entry.kind.configure(&outcome.best_params, self.config.seed)?;
        model.fit(x_train, y_train)?;
        let train_r2 = r2_score(y_train, model.predict(x_train)?.view())?;
        let test_r2 = r2_score(y_test, model.predict(x_test)?.view())?;
        Ok(Evaluated {
            score: ModelScore {
                test_r2,
                train_r2,
                best_params: outcome.best_params,
                cv_score: outcome.best_score,
            },
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::load_artifact;
    use crate::models::ModelKind;
    use crate::models::params::ParamGrid;
    use tempfile::tempdir;

    fn linear_data(rows: usize, noise: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, 3), |(row, col)| {
            let a = ((row * 13) % 17) as f64;
            let b = ((row * 7) % 11) as f64;
            match col {
                0 => a,
                1 => b,
                _ => 2.0 * a - b + noise * (((row * 31) % 5) as f64 - 2.0),
            }
        })
    }

    fn trainer(dir: &std::path::Path, catalog: ModelCatalog, threshold: f64) -> ModelTrainer {
        ModelTrainer::new(
            ModelTrainerConfig {
                model_path: dir.join("model.pkl"),
                acceptance_threshold: threshold,
                cv_folds: 3,
                seed: 42,
                catalog,
            },
            PipelineTelemetry::disabled(),
        )
    }

    fn small_catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            CatalogEntry::new(
                "Decision Tree",
                ModelKind::DecisionTree,
                ParamGrid::new().with("max_depth", [1_i64, 2]),
            ),
            CatalogEntry::new("Linear Regression", ModelKind::LinearRegression, ParamGrid::new()),
        ])
    }

    #[test]
    fn selects_highest_test_score_and_persists_it() {
        let dir = tempdir().unwrap();
        let train = linear_data(60, 0.1);
        let test = linear_data(20, 0.1);
        let summary = trainer(dir.path(), small_catalog(), 0.6)
            .run(&train, &test)
            .unwrap();

        assert_eq!(summary.report.len(), 2);
        assert_eq!(summary.best_model, "Linear Regression");
        let max = summary
            .report
            .values()
            .map(|score| score.test_r2)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(summary.test_r2, max);

        let stored: TrainedModel = load_artifact(&summary.model_path).unwrap();
        assert_eq!(stored.name, "Linear Regression");
        let (x_test, _) = split_features_target(&test).unwrap();
        assert_eq!(stored.n_features, 2);
        assert!(stored.predict(x_test).unwrap().iter().all(|v| v.is_finite()));
    }

    /// Strictly positive targets so every criterion, Poisson included, applies.
    fn positive_data(rows: usize) -> Array2<f64> {
        let mut data = linear_data(rows, 0.2);
        data.column_mut(2).mapv_inplace(|target| target + 20.0);
        data
    }

    /// Same families and names, each grid cut down to its first assignment.
    fn first_candidates(catalog: &ModelCatalog) -> ModelCatalog {
        ModelCatalog::new(
            catalog
                .entries()
                .iter()
                .map(|entry| {
                    let grid = entry.grid.combinations().first().map_or_else(
                        ParamGrid::new,
                        |first| {
                            first.iter().fold(ParamGrid::new(), |grid, (name, value)| {
                                grid.with(name, [value.clone()])
                            })
                        },
                    );
                    CatalogEntry::new(entry.name.clone(), entry.kind, grid)
                })
                .collect(),
        )
    }

    fn assert_reports_whole_catalog(summary: &TrainingSummary, catalog: &ModelCatalog) {
        let names: Vec<&str> = summary.report.keys().map(String::as_str).collect();
        let expected: Vec<&str> = catalog.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, expected);
        let max = summary
            .report
            .values()
            .map(|score| score.test_r2)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(summary.test_r2, max);
        assert_eq!(summary.report[&summary.best_model].test_r2, max);
    }

    #[test]
    fn standard_families_all_train_and_report() {
        let dir = tempdir().unwrap();
        let catalog = first_candidates(&ModelCatalog::standard());
        let summary = trainer(dir.path(), catalog.clone(), 0.0)
            .run(&positive_data(60), &positive_data(20))
            .unwrap();
        assert_eq!(summary.report.len(), 7);
        assert_reports_whole_catalog(&summary, &catalog);
    }

    #[test]
    #[ignore = "searches every grid of the standard catalog"]
    fn standard_catalog_full_search() {
        let dir = tempdir().unwrap();
        let catalog = ModelCatalog::standard();
        let summary = trainer(dir.path(), catalog.clone(), 0.6)
            .run(&positive_data(60), &positive_data(20))
            .unwrap();
        assert_eq!(summary.report.len(), 7);
        assert_reports_whole_catalog(&summary, &catalog);
        assert!(summary.model_path.exists());
    }

    #[test]
    fn quality_gate_rejects_and_writes_nothing() {
        let dir = tempdir().unwrap();
        // Target unrelated to the features.
        let train = Array2::from_shape_fn((30, 2), |(row, col)| {
            if col == 0 {
                row as f64
            } else {
                ((row * 7919) % 13) as f64
            }
        });
        let test = Array2::from_shape_fn((12, 2), |(row, col)| {
            if col == 0 {
                row as f64
            } else {
                ((row * 104_729) % 13) as f64
            }
        });
        let catalog = ModelCatalog::standard().only(&["Linear Regression"]);
        let err = trainer(dir.path(), catalog, 0.6)
            .initiate(&train, &test)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoAcceptableModel { .. }));
        assert!(!dir.path().join("model.pkl").exists());
    }

    #[test]
    fn ties_go_to_the_first_catalog_entry() {
        let dir = tempdir().unwrap();
        let catalog = ModelCatalog::new(vec![
            CatalogEntry::new("First", ModelKind::LinearRegression, ParamGrid::new()),
            CatalogEntry::new("Second", ModelKind::LinearRegression, ParamGrid::new()),
        ]);
        let summary = trainer(dir.path(), catalog, 0.0)
            .run(&linear_data(45, 0.5), &linear_data(15, 0.5))
            .unwrap();
        assert_eq!(summary.best_model, "First");
    }

    #[test]
    fn matrix_without_features_is_a_training_error() {
        let dir = tempdir().unwrap();
        let data = Array2::<f64>::zeros((5, 1));
        let err = trainer(dir.path(), small_catalog(), 0.6)
            .initiate(&data, &data)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Training);
    }
}
