use std::{fmt, panic::Location};

use thiserror::Error;

/// Boxed cause carried by stage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading and splitting the source dataset.
    Ingestion,
    /// Fitting and applying the preprocessor.
    Transformation,
    /// Grid search, selection, and model persistence.
    Training,
    /// Serving-time scoring of a single record.
    Prediction,
}

impl Stage {
    /// Lowercase stage name used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Transformation => "transformation",
            Self::Training => "training",
            Self::Prediction => "prediction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source position where a failure crossed a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file.
    pub file: &'static str,
    /// Line within `file`.
    pub line: u32,
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Wrapped cause of a stage failure.
///
/// Displays only the wrap location when a cause is attached; the cause
/// itself is reached through [`std::error::Error::source`].
#[derive(Debug)]
pub struct StageFailure {
    /// Rendered message of the wrapped failure.
    pub message: String,
    /// Where the failure was wrapped.
    pub location: SourceLocation,
    /// Wrapped error, when there was one.
    pub source: Option<BoxError>,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_some() {
            write!(f, "at {}", self.location)
        } else {
            write!(f, "{} (at {})", self.message, self.location)
        }
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// The single domain error of the pipeline and the prediction service.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Ingestion could not read, split, or persist the dataset.
    #[error("data ingestion failed")]
    Ingestion(#[source] StageFailure),
    /// The preprocessor could not be fitted, applied, or saved.
    #[error("data transformation failed")]
    Transformation(#[source] StageFailure),
    /// Grid search or model persistence failed.
    #[error("model training failed")]
    Training(#[source] StageFailure),
    /// Quality gate: the best model scored below the acceptance threshold.
    #[error(
        "no acceptable model found: best was {best_model} with test R² {best_score:.4}, below {threshold}"
    )]
    NoAcceptableModel {
        /// Catalog name of the best candidate.
        best_model: String,
        /// Its test R².
        best_score: f64,
        /// Threshold it failed to reach.
        threshold: f64,
    },
    /// Artifacts could not be loaded or applied to a record.
    #[error("prediction failed")]
    Prediction(#[source] StageFailure),
}

impl PipelineError {
    /// Wraps a cause for `stage`, recording the caller's location.
    #[track_caller]
    pub fn wrap(stage: Stage, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self::from_failure(
            stage,
            StageFailure {
                message: cause.to_string(),
                location: Location::caller().into(),
                source: Some(cause),
            },
        )
    }

    /// Failure without an underlying error, recording the caller's location.
    #[track_caller]
    pub fn message(stage: Stage, message: impl Into<String>) -> Self {
        Self::from_failure(
            stage,
            StageFailure {
                message: message.into(),
                location: Location::caller().into(),
                source: None,
            },
        )
    }

    fn from_failure(stage: Stage, failure: StageFailure) -> Self {
        match stage {
            Stage::Ingestion => Self::Ingestion(failure),
            Stage::Transformation => Self::Transformation(failure),
            Stage::Training => Self::Training(failure),
            Stage::Prediction => Self::Prediction(failure),
        }
    }

    /// Stage the error originated in.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Ingestion(_) => Stage::Ingestion,
            Self::Transformation(_) => Stage::Transformation,
            Self::Training(_) | Self::NoAcceptableModel { .. } => Stage::Training,
            Self::Prediction(_) => Stage::Prediction,
        }
    }

    /// Every message in the source chain, outermost first, joined by `": "`.
    #[must_use]
    pub fn report(&self) -> String {
        let mut rendered = self.to_string();
        let mut next = std::error::Error::source(self);
        while let Some(cause) = next {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            next = cause.source();
        }
        rendered
    }

    /// Wrapped failure details, absent for the quality gate.
    #[must_use]
    pub const fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Ingestion(failure)
            | Self::Transformation(failure)
            | Self::Training(failure)
            | Self::Prediction(failure) => Some(failure),
            Self::NoAcceptableModel { .. } => None,
        }
    }
}

/// Converts component errors into [`PipelineError`] at a stage boundary.
pub trait StageResultExt<T> {
    /// Tags the error with `stage` and the caller's source location.
    fn in_stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E> StageResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    #[track_caller]
    fn in_stage(self, stage: Stage) -> Result<T, PipelineError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(PipelineError::wrap(stage, err)),
        }
    }
}
