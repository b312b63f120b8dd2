use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    artifact::load_artifact,
    config::ArtifactStore,
    error::{PipelineError, Stage, StageResultExt},
    selection::TrainedModel,
    table::{Table, TableError},
    telemetry::PipelineTelemetry,
    transformation::Preprocessor,
};

/// One student record as submitted for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    /// `female` / `male`.
    pub gender: String,
    /// `group A` .. `group E`.
    pub race_ethnicity: String,
    /// Highest parental education level.
    pub parental_level_of_education: String,
    /// `standard` / `free/reduced`.
    pub lunch: String,
    /// `none` / `completed`.
    pub test_preparation_course: String,
    /// Reading score, 0 to 100.
    pub reading_score: f64,
    /// Writing score, 0 to 100.
    pub writing_score: f64,
}

impl CustomData {
    /// Column names of [`CustomData::to_table`].
    pub const COLUMNS: [&'static str; 7] = [
        "gender",
        "race_ethnicity",
        "parental_level_of_education",
        "lunch",
        "test_preparation_course",
        "reading_score",
        "writing_score",
    ];

    /// Single-row table addressed by the preprocessing schema's column names.
    pub fn to_table(&self) -> Result<Table, TableError> {
        let row = vec![
            self.gender.clone(),
            self.race_ethnicity.clone(),
            self.parental_level_of_education.clone(),
            self.lunch.clone(),
            self.test_preparation_course.clone(),
            self.reading_score.to_string(),
            self.writing_score.to_string(),
        ];
        Table::from_rows(
            Self::COLUMNS.iter().map(ToString::to_string).collect(),
            vec![row],
        )
    }
}

/// Serving-time scoring against the persisted preprocessor and model.
///
/// Both artifacts are read from disk on every call, so a retrained model is
/// picked up without a restart.
#[derive(Debug, Clone)]
pub struct PredictPipeline {
    preprocessor_path: PathBuf,
    model_path: PathBuf,
    telemetry: PipelineTelemetry,
}

impl PredictPipeline {
    /// Scores against the artifacts of `store`.
    #[must_use]
    pub fn new(store: &ArtifactStore) -> Self {
        Self::from_paths(store.preprocessor_path.clone(), store.model_path.clone())
    }

    /// Scores against explicit artifact files.
    #[must_use]
    pub fn from_paths(preprocessor_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            preprocessor_path: preprocessor_path.into(),
            model_path: model_path.into(),
            telemetry: PipelineTelemetry::disabled(),
        }
    }

    /// Routes prediction logs through `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Predicts the math score of one record. Scores must be finite; a NaN
    /// score is rejected rather than imputed.
    pub fn predict(&self, record: &CustomData) -> Result<f64, PipelineError> {
        for (column, value) in [
            ("reading_score", record.reading_score),
            ("writing_score", record.writing_score),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::message(
                    Stage::Prediction,
                    format!("`{column}` must be a finite number, got {value}"),
                ));
            }
        }
        let table = record.to_table().in_stage(Stage::Prediction)?;
        let predictions = self.predict_table(&table)?;
        predictions.first().copied().ok_or_else(|| {
            PipelineError::message(Stage::Prediction, "model returned no prediction")
        })
    }

    /// Predicts every row of `table`; extra columns are ignored.
    pub fn predict_table(&self, table: &Table) -> Result<Vec<f64>, PipelineError> {
        let preprocessor: Preprocessor =
            load_artifact(&self.preprocessor_path).in_stage(Stage::Prediction)?;
        let model: TrainedModel = load_artifact(&self.model_path).in_stage(Stage::Prediction)?;
        let features = preprocessor.transform(table).in_stage(Stage::Prediction)?;
        let predictions = model.predict(features.view()).in_stage(Stage::Prediction)?;
        if let Some(row) = predictions.iter().position(|value| !value.is_finite()) {
            return Err(PipelineError::message(
                Stage::Prediction,
                format!("model produced a non-finite prediction for row {row}"),
            ));
        }
        self.telemetry.note(
            LogLevel::Debug,
            "prediction.completed",
            json!({ "rows": table.len(), "model": model.name }),
        );
        Ok(predictions.to_vec())
    }
}
