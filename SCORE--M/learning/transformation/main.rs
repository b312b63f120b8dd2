//! Column-wise preprocessing: imputation, one-hot encoding, and scaling.

/// Indicator encoding of categorical columns.
pub mod encoder;
/// Missing-value imputers.
pub mod imputer;
/// Fitted preprocessing artifact.
pub mod preprocessor;
/// Standardization.
pub mod scaler;

use std::path::{Path, PathBuf};

use ndarray::{concatenate, Array2, Axis, ShapeError};
use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

pub use preprocessor::{ColumnSchema, Preprocessor};

use crate::{
    artifact::save_artifact,
    config::PipelineConfig,
    error::{PipelineError, Stage, StageResultExt},
    table::{Table, TableError},
    telemetry::PipelineTelemetry,
};

/// Errors raised while fitting or applying preprocessing steps.
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// Column lookup or parsing failed.
    #[error(transparent)]
    Table(#[from] TableError),
    /// A column had no observed values to learn from.
    #[error("column `{0}` has no observed values")]
    AllMissing(String),
    /// Input width does not match the fitted width.
    #[error("expected {expected} columns, got {got}")]
    WidthMismatch {
        /// Fitted width.
        expected: usize,
        /// Width supplied.
        got: usize,
    },
    /// No rows to fit on.
    #[error("cannot fit on an empty table")]
    EmptyInput,
    /// The target column has a missing cell.
    #[error("target column `{column}` is missing a value at row {row}")]
    MissingTarget {
        /// Target column name.
        column: String,
        /// Zero-based row index.
        row: usize,
    },
    /// Matrix assembly failed.
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),
}

/// Where the fitted preprocessor goes and which columns it uses.
#[derive(Debug, Clone)]
pub struct DataTransformationConfig {
    /// Destination of the serialized preprocessor.
    pub preprocessor_path: PathBuf,
    /// Column groups.
    pub schema: ColumnSchema,
}

impl From<&PipelineConfig> for DataTransformationConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            preprocessor_path: config.artifacts.preprocessor_path.clone(),
            schema: ColumnSchema::student_scores(),
        }
    }
}

/// Transformed splits (target as last column) and the preprocessor location.
#[derive(Debug, Clone)]
pub struct TransformationArtifacts {
    /// Transformed train rows.
    pub train: Array2<f64>,
    /// Transformed test rows.
    pub test: Array2<f64>,
    /// Serialized preprocessor.
    pub preprocessor_path: PathBuf,
}

/// Fits the preprocessor on train and applies it to both splits.
#[derive(Debug)]
pub struct DataTransformation {
    config: DataTransformationConfig,
    telemetry: PipelineTelemetry,
}

impl DataTransformation {
    /// Creates the component.
    #[must_use]
    pub fn new(config: DataTransformationConfig, telemetry: PipelineTelemetry) -> Self {
        Self { config, telemetry }
    }

    /// Fits this component's preprocessing on `train`.
    pub fn data_transformer(&self, train: &Table) -> Result<Preprocessor, PreprocessError> {
        Preprocessor::fit(self.config.schema.clone(), train)
    }

    /// Runs the stage.
    pub fn initiate(
        &self,
        train_path: &Path,
        test_path: &Path,
    ) -> Result<TransformationArtifacts, PipelineError> {
        let train_table = Table::read_csv(train_path).in_stage(Stage::Transformation)?;
        let test_table = Table::read_csv(test_path).in_stage(Stage::Transformation)?;
        self.telemetry.note(
            LogLevel::Info,
            "transformation.loaded",
            json!({ "train_rows": train_table.len(), "test_rows": test_table.len() }),
        );

        let preprocessor = self
            .data_transformer(&train_table)
            .in_stage(Stage::Transformation)?;
        self.telemetry.note(
            LogLevel::Debug,
            "transformation.fitted",
            json!({
                "numeric": self.config.schema.numeric,
                "categorical": self.config.schema.categorical,
                "features_out": preprocessor.n_features_out(),
            }),
        );

        let target = &self.config.schema.target;
        let train = with_target(
            preprocessor.transform(&train_table).in_stage(Stage::Transformation)?,
            &train_table,
            target,
        )
        .in_stage(Stage::Transformation)?;
        let test = with_target(
            preprocessor.transform(&test_table).in_stage(Stage::Transformation)?,
            &test_table,
            target,
        )
        .in_stage(Stage::Transformation)?;

        save_artifact(&self.config.preprocessor_path, &preprocessor)
            .in_stage(Stage::Transformation)?;
        self.telemetry.note(
            LogLevel::Info,
            "transformation.completed",
            json!({
                "train_shape": train.shape(),
                "test_shape": test.shape(),
                "preprocessor": self.config.preprocessor_path,
            }),
        );
        self.telemetry.signal(
            "pipeline.transformation.completed",
            json!({ "columns": train.ncols() }),
        );
        Ok(TransformationArtifacts {
            train,
            test,
            preprocessor_path: self.config.preprocessor_path.clone(),
        })
    }
}

/// Appends the untransformed target column of `table` to `features`.
pub fn with_target(
    features: Array2<f64>,
    table: &Table,
    target: &str,
) -> Result<Array2<f64>, PreprocessError> {
    let values = table
        .numeric_column(target)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PreprocessError::MissingTarget {
                column: target.to_string(),
                row,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let target = Array2::from_shape_vec((values.len(), 1), values)?;
    Ok(concatenate(Axis(1), &[features.view(), target.view()])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::load_artifact;
    use crate::config::ArtifactStore;
    use crate::fixtures::student_table;
    use crate::ingestion::train_test_split;
    use tempfile::tempdir;

    fn stage(dir: &Path) -> (DataTransformation, PathBuf, PathBuf) {
        let table = student_table(80, 21);
        let (train, test) = train_test_split(&table, 0.2, 42);
        let train_path = dir.join("train.csv");
        let test_path = dir.join("test.csv");
        train.write_csv(&train_path).unwrap();
        test.write_csv(&test_path).unwrap();
        let mut config = PipelineConfig::default();
        config.artifacts = ArtifactStore::under(dir.join("artifacts"));
        let component = DataTransformation::new(
            DataTransformationConfig::from(&config),
            PipelineTelemetry::disabled(),
        );
        (component, train_path, test_path)
    }

    #[test]
    fn appends_target_as_last_column() {
        let dir = tempdir().unwrap();
        let (component, train_path, test_path) = stage(dir.path());
        let artifacts = component.initiate(&train_path, &test_path).unwrap();

        let preprocessor: Preprocessor = load_artifact(&artifacts.preprocessor_path).unwrap();
        let width = preprocessor.n_features_out() + 1;
        assert_eq!(artifacts.train.ncols(), width);
        assert_eq!(artifacts.test.ncols(), width);
        assert_eq!(artifacts.train.nrows(), 64);
        assert_eq!(artifacts.test.nrows(), 16);

        let train_table = Table::read_csv(&train_path).unwrap();
        let first_target = train_table.numeric_column("math_score").unwrap()[0].unwrap();
        assert_eq!(artifacts.train[[0, width - 1]], first_target);
    }

    #[test]
    fn non_numeric_target_fails_the_stage() {
        let dir = tempdir().unwrap();
        let (component, train_path, test_path) = stage(dir.path());
        let mut train = Table::read_csv(&train_path).unwrap();
        let idx = train.column_index("math_score").unwrap();
        let mut row = train.rows()[0].clone();
        row[idx] = "eighty".into();
        train.push_row(row).unwrap();
        train.write_csv(&train_path).unwrap();

        let err = component.initiate(&train_path, &test_path).unwrap_err();
        assert_eq!(err.stage(), Stage::Transformation);
        assert!(err.report().contains("math_score"));
    }

    #[test]
    fn missing_target_value_is_rejected() {
        let table = Table::from_rows(
            vec!["math_score".into()],
            vec![vec!["70".into()], vec![String::new()]],
        )
        .unwrap();
        let err = with_target(Array2::zeros((2, 0)), &table, "math_score").unwrap_err();
        assert!(matches!(err, PreprocessError::MissingTarget { row: 1, .. }));
    }
}
