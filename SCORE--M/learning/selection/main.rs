//! Cross-validated hyperparameter search and selection of the persisted model.

/// Candidate model families and their grids.
pub mod catalog;
/// Regression metrics.
pub mod metrics;
/// K-fold grid search.
pub mod search;
/// Selection across the catalog and the quality gate.
pub mod trainer;

pub use catalog::{CatalogEntry, ModelCatalog};
pub use metrics::r2_score;
pub use search::{CandidateScore, GridSearch, KFold, SearchOutcome};
pub use trainer::{
    split_features_target, ModelReport, ModelScore, ModelTrainer, ModelTrainerConfig,
    TrainedModel, TrainingSummary,
};
