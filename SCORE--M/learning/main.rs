//! Offline training run: ingestion, transformation, then model selection.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    ingestion::{DataIngestion, DataIngestionConfig},
    selection::{ModelCatalog, ModelTrainer, ModelTrainerConfig, TrainingSummary},
    telemetry::PipelineTelemetry,
    transformation::{DataTransformation, DataTransformationConfig},
};

/// Runs the three offline stages in order against one configuration.
#[derive(Debug)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    catalog: ModelCatalog,
    telemetry: PipelineTelemetry,
}

impl TrainingPipeline {
    /// Pipeline over the standard catalog, with telemetry from `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let telemetry = build_telemetry(&config, false)?;
        Ok(Self::new(config, telemetry))
    }

    /// Pipeline over the standard catalog with explicit telemetry.
    #[must_use]
    pub fn new(config: PipelineConfig, telemetry: PipelineTelemetry) -> Self {
        Self {
            config,
            catalog: ModelCatalog::standard(),
            telemetry,
        }
    }

    /// Replaces the candidate models.
    #[must_use]
    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage; the first failure aborts the run.
    pub fn run(&self) -> Result<TrainingSummary, PipelineError> {
        self.telemetry.note(
            LogLevel::Info,
            "pipeline.start",
            json!({
                "source": self.config.source_data_path,
                "artifacts": self.config.artifacts.root,
                "seed": self.config.seed,
            }),
        );
        let result = self.stages();
        match &result {
            Ok(summary) => self.telemetry.note(
                LogLevel::Info,
                "pipeline.completed",
                json!({ "best_model": summary.best_model, "test_r2": summary.test_r2 }),
            ),
            Err(err) => {
                self.telemetry.note(
                    LogLevel::Error,
                    "pipeline.failed",
                    json!({ "stage": err.stage().as_str(), "error": err.report() }),
                );
                self.telemetry.signal(
                    "pipeline.failed",
                    json!({ "stage": err.stage().as_str() }),
                );
            }
        }
        result
    }

    fn stages(&self) -> Result<TrainingSummary, PipelineError> {
        let ingestion = DataIngestion::new(
            DataIngestionConfig::from(&self.config),
            self.telemetry.scoped("ingestion"),
        );
        let splits = ingestion.initiate()?;

        let transformation = DataTransformation::new(
            DataTransformationConfig::from(&self.config),
            self.telemetry.scoped("transformation"),
        );
        let transformed = transformation.initiate(&splits.train_path, &splits.test_path)?;

        let mut trainer_config = ModelTrainerConfig::from(&self.config);
        trainer_config.catalog = self.catalog.clone();
        let trainer = ModelTrainer::new(trainer_config, self.telemetry.scoped("training"));
        trainer.run(&transformed.train, &transformed.test)
    }
}

/// Telemetry for a training run: JSON log file and event log when configured.
pub fn build_telemetry(config: &PipelineConfig, echo_to_stderr: bool) -> Result<PipelineTelemetry> {
    let mut builder = PipelineTelemetry::builder("pipeline")
        .log_path_opt(config.log_path.clone())
        .echo_to_stderr(echo_to_stderr)
        .min_level(if echo_to_stderr {
            LogLevel::Info
        } else {
            LogLevel::Debug
        });
    if let Some(path) = &config.event_log_path {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build()
}
