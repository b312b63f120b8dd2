#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Student math-score regressor: ingestion, preprocessing, model selection, and prediction.

/// Pipeline configuration and artifact locations.
#[path = "../config.rs"]
pub mod config;

/// Stage-tagged pipeline errors.
#[path = "../error.rs"]
pub mod error;

/// String-celled CSV tables.
#[path = "../table.rs"]
pub mod table;

/// Versioned artifact persistence.
#[path = "../artifact.rs"]
pub mod artifact;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Dataset ingestion and train/test split.
#[path = "../ingestion.rs"]
pub mod ingestion;

/// Preprocessing fit and application.
#[path = "../transformation/main.rs"]
pub mod transformation;

/// Regression estimators.
#[path = "../models/main.rs"]
pub mod models;

/// Grid search and model selection.
#[path = "../selection/main.rs"]
pub mod selection;

/// Serving-time prediction.
#[path = "../predict.rs"]
pub mod predict;

/// High-level orchestration entry point.
#[path = "../main.rs"]
pub mod orchestration_entry;

#[cfg(test)]
#[path = "../fixtures.rs"]
mod fixtures;

pub use artifact::{load_artifact, save_artifact, Artifact, ArtifactError};
pub use config::{ArtifactStore, PipelineConfig};
pub use error::{PipelineError, Stage, StageResultExt};
pub use ingestion::{DataIngestion, DataIngestionConfig, IngestionArtifacts};
pub use models::{ModelError, ModelKind, RegressionModel, Regressor};
pub use orchestration_entry::{build_telemetry, TrainingPipeline};
pub use predict::{CustomData, PredictPipeline};
pub use selection::{ModelCatalog, ModelReport, ModelScore, ModelTrainer, TrainedModel, TrainingSummary};
pub use table::{Table, TableError};
pub use telemetry::{PipelineTelemetry, PipelineTelemetryBuilder};
pub use transformation::{
    ColumnSchema, DataTransformation, DataTransformationConfig, Preprocessor, TransformationArtifacts,
};
