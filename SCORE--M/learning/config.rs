use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// File names inside the artifact directory.
pub const RAW_DATA_FILE: &str = "data.csv";
/// Train split file name.
pub const TRAIN_DATA_FILE: &str = "train.csv";
/// Test split file name.
pub const TEST_DATA_FILE: &str = "test.csv";
/// Serialized preprocessor file name.
pub const PREPROCESSOR_FILE: &str = "proprocessor.pkl";
/// Serialized model file name.
pub const MODEL_FILE: &str = "model.pkl";

/// Filesystem locations of every pipeline artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    /// Directory holding all artifacts.
    pub root: PathBuf,
    /// Unmodified copy of the source dataset.
    pub raw_data_path: PathBuf,
    /// Train split (CSV with header).
    pub train_data_path: PathBuf,
    /// Test split (CSV with header).
    pub test_data_path: PathBuf,
    /// Fitted preprocessor.
    pub preprocessor_path: PathBuf,
    /// Winning fitted model.
    pub model_path: PathBuf,
}

impl ArtifactStore {
    /// Lays out the standard file names under `root`.
    #[must_use]
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw_data_path: root.join(RAW_DATA_FILE),
            train_data_path: root.join(TRAIN_DATA_FILE),
            test_data_path: root.join(TEST_DATA_FILE),
            preprocessor_path: root.join(PREPROCESSOR_FILE),
            model_path: root.join(MODEL_FILE),
            root,
        }
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::under("artifacts")
    }
}

/// Immutable settings for one offline training run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source CSV read by ingestion.
    pub source_data_path: PathBuf,
    /// Where artifacts are written.
    pub artifacts: ArtifactStore,
    /// Fraction of rows held out for the test split.
    pub test_ratio: f64,
    /// Seed for the split shuffle and every seeded estimator.
    pub seed: u64,
    /// Cross-validation folds used by grid search.
    pub cv_folds: usize,
    /// Minimum test R² a model needs to be persisted.
    pub acceptance_threshold: f64,
    /// JSON-lines log file; `None` keeps logs on stderr only.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log; `None` disables event publication.
    pub event_log_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_data_path: default_source_data_path(),
            artifacts: ArtifactStore::default(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            cv_folds: default_cv_folds(),
            acceptance_threshold: default_acceptance_threshold(),
            log_path: None,
            event_log_path: None,
        }
    }
}

impl PipelineConfig {
    /// Loads settings from a TOML file; relative paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        Self::from_toml_str(&raw, config_dir(path))
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses settings from TOML text, resolving relative paths against `base_dir`.
    pub fn from_toml_str(raw: &str, base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let document: PipelineDocument = toml::from_str(raw)?;
        if !(document.test_ratio > 0.0 && document.test_ratio < 1.0) {
            bail!("test_ratio must be in (0, 1), got {}", document.test_ratio);
        }
        if document.cv_folds < 2 {
            bail!("cv_folds must be at least 2, got {}", document.cv_folds);
        }
        Ok(Self {
            source_data_path: resolve(base_dir, &document.source_data_path),
            artifacts: ArtifactStore::under(resolve(base_dir, &document.artifacts.root)),
            test_ratio: document.test_ratio,
            seed: document.seed,
            cv_folds: document.cv_folds,
            acceptance_threshold: document.acceptance_threshold,
            log_path: document.log_path.map(|p| resolve(base_dir, &p)),
            event_log_path: document.event_log_path.map(|p| resolve(base_dir, &p)),
        })
    }
}

/// Directory used to resolve relative paths of a config file.
#[must_use]
pub fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Joins `candidate` onto `base_dir` unless it is already absolute.
#[must_use]
pub fn resolve(base_dir: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[derive(Debug, Deserialize)]
struct PipelineDocument {
    #[serde(default = "default_source_data_path")]
    source_data_path: PathBuf,
    #[serde(default)]
    artifacts: ArtifactSection,
    #[serde(default = "default_test_ratio")]
    test_ratio: f64,
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default = "default_cv_folds")]
    cv_folds: usize,
    #[serde(default = "default_acceptance_threshold")]
    acceptance_threshold: f64,
    #[serde(default)]
    log_path: Option<PathBuf>,
    #[serde(default)]
    event_log_path: Option<PathBuf>,
}

/// `[artifacts]` table shared by the pipeline and server configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSection {
    /// Artifact directory.
    #[serde(default = "default_artifact_root")]
    pub root: PathBuf,
}

impl Default for ArtifactSection {
    fn default() -> Self {
        Self {
            root: default_artifact_root(),
        }
    }
}

fn default_source_data_path() -> PathBuf {
    PathBuf::from("notebook/data/stud.csv")
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("artifacts")
}

const fn default_test_ratio() -> f64 {
    0.2
}

const fn default_seed() -> u64 {
    42
}

const fn default_cv_folds() -> usize {
    3
}

const fn default_acceptance_threshold() -> f64 {
    0.6
}
