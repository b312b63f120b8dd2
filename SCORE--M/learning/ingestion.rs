use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::PipelineConfig,
    error::{PipelineError, Stage, StageResultExt},
    table::Table,
    telemetry::PipelineTelemetry,
};

/// Paths and split settings used by ingestion.
#[derive(Debug, Clone)]
pub struct DataIngestionConfig {
    /// Source CSV.
    pub source_data_path: PathBuf,
    /// Raw copy destination.
    pub raw_data_path: PathBuf,
    /// Train split destination.
    pub train_data_path: PathBuf,
    /// Test split destination.
    pub test_data_path: PathBuf,
    /// Fraction of rows held out.
    pub test_ratio: f64,
    /// Shuffle seed.
    pub seed: u64,
}

impl From<&PipelineConfig> for DataIngestionConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            source_data_path: config.source_data_path.clone(),
            raw_data_path: config.artifacts.raw_data_path.clone(),
            train_data_path: config.artifacts.train_data_path.clone(),
            test_data_path: config.artifacts.test_data_path.clone(),
            test_ratio: config.test_ratio,
            seed: config.seed,
        }
    }
}

/// Locations of the persisted splits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionArtifacts {
    /// Train split CSV.
    pub train_path: PathBuf,
    /// Test split CSV.
    pub test_path: PathBuf,
}

/// Reads the source dataset and persists raw, train, and test copies.
#[derive(Debug)]
pub struct DataIngestion {
    config: DataIngestionConfig,
    telemetry: PipelineTelemetry,
}

impl DataIngestion {
    /// Creates the component.
    #[must_use]
    pub fn new(config: DataIngestionConfig, telemetry: PipelineTelemetry) -> Self {
        Self { config, telemetry }
    }

    /// Runs ingestion and returns the split paths.
    pub fn initiate(&self) -> Result<IngestionArtifacts, PipelineError> {
        let cfg = &self.config;
        self.telemetry.note(
            LogLevel::Info,
            "ingestion.start",
            json!({ "source": cfg.source_data_path }),
        );
        let table = Table::read_csv(&cfg.source_data_path).in_stage(Stage::Ingestion)?;
        if table.is_empty() {
            return Err(PipelineError::message(
                Stage::Ingestion,
                format!("source dataset {} has no rows", cfg.source_data_path.display()),
            ));
        }
        self.telemetry.note(
            LogLevel::Info,
            "ingestion.read",
            json!({ "rows": table.len(), "columns": table.headers() }),
        );

        for path in [&cfg.raw_data_path, &cfg.train_data_path, &cfg.test_data_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).in_stage(Stage::Ingestion)?;
            }
        }
        if !same_file(&cfg.source_data_path, &cfg.raw_data_path) {
            fs::copy(&cfg.source_data_path, &cfg.raw_data_path).in_stage(Stage::Ingestion)?;
        }
        self.telemetry.note(
            LogLevel::Debug,
            "ingestion.raw_saved",
            json!({ "path": cfg.raw_data_path }),
        );

        let (train, test) = train_test_split(&table, cfg.test_ratio, cfg.seed);
        if train.is_empty() || test.is_empty() {
            return Err(PipelineError::message(
                Stage::Ingestion,
                format!(
                    "split of {} rows at test ratio {} leaves an empty partition",
                    table.len(),
                    cfg.test_ratio
                ),
            ));
        }
        self.telemetry.note(
            LogLevel::Info,
            "ingestion.split",
            json!({ "train_rows": train.len(), "test_rows": test.len(), "seed": cfg.seed }),
        );
        train.write_csv(&cfg.train_data_path).in_stage(Stage::Ingestion)?;
        test.write_csv(&cfg.test_data_path).in_stage(Stage::Ingestion)?;

        let artifacts = IngestionArtifacts {
            train_path: cfg.train_data_path.clone(),
            test_path: cfg.test_data_path.clone(),
        };
        self.telemetry.note(
            LogLevel::Info,
            "ingestion.completed",
            json!({ "train": artifacts.train_path, "test": artifacts.test_path }),
        );
        self.telemetry.signal(
            "pipeline.ingestion.completed",
            json!({ "rows": table.len(), "train_rows": train.len(), "test_rows": test.len() }),
        );
        Ok(artifacts)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Number of rows held out for a given ratio (`ceil(ratio * rows)`, capped at `rows`).
#[must_use]
pub fn test_row_count(rows: usize, test_ratio: f64) -> usize {
    // The epsilon keeps products like 0.7 * 10 from rounding up past the exact count.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let count = (test_ratio * rows as f64 - 1e-9).ceil().max(0.0) as usize;
    count.min(rows)
}

/// Seeded shuffle split; returns `(train, test)` in permutation order.
#[must_use]
pub fn train_test_split(table: &Table, test_ratio: f64, seed: u64) -> (Table, Table) {
    let n_test = test_row_count(table.len(), test_ratio);
    let mut indices: Vec<usize> = (0..table.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(n_test);
    (table.take(train_idx), table.take(test_idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn numbered_table(rows: usize) -> Table {
        let rows = (0..rows)
            .map(|idx| vec![idx.to_string(), format!("{}", idx % 7)])
            .collect();
        Table::from_rows(vec!["id".into(), "score".into()], rows).unwrap()
    }

    #[test]
    fn split_is_a_seeded_partition() {
        let table = numbered_table(101);
        let (train, test) = train_test_split(&table, 0.2, 42);
        assert_eq!(test.len(), 21);
        assert_eq!(train.len() + test.len(), 101);

        let train_ids: HashSet<_> = train.rows().iter().map(|r| r[0].clone()).collect();
        let test_ids: HashSet<_> = test.rows().iter().map(|r| r[0].clone()).collect();
        assert!(train_ids.is_disjoint(&test_ids));
        assert_eq!(train_ids.union(&test_ids).count(), 101);

        let (again_train, again_test) = train_test_split(&table, 0.2, 42);
        assert_eq!(again_train, train);
        assert_eq!(again_test, test);
        let (other_train, _) = train_test_split(&table, 0.2, 7);
        assert_ne!(other_train, train);
    }

    #[test]
    fn test_row_count_rounds_up() {
        assert_eq!(test_row_count(100, 0.2), 20);
        assert_eq!(test_row_count(10, 0.7), 7);
        assert_eq!(test_row_count(9, 0.2), 2);
        assert_eq!(test_row_count(0, 0.2), 0);
    }

    #[test]
    fn ingestion_writes_raw_train_and_test() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("stud.csv");
        numbered_table(50).write_csv(&source).unwrap();
        let mut config = PipelineConfig::default();
        config.source_data_path = source;
        config.artifacts = crate::config::ArtifactStore::under(dir.path().join("artifacts"));

        let ingestion =
            DataIngestion::new(DataIngestionConfig::from(&config), PipelineTelemetry::disabled());
        let artifacts = ingestion.initiate().unwrap();

        let raw = Table::read_csv(&config.artifacts.raw_data_path).unwrap();
        let train = Table::read_csv(&artifacts.train_path).unwrap();
        let test = Table::read_csv(&artifacts.test_path).unwrap();
        assert_eq!(raw, numbered_table(50));
        assert_eq!(train.len(), 40);
        assert_eq!(test.len(), 10);
        assert_eq!(train.headers(), raw.headers());
    }

    #[test]
    fn raw_copy_keeps_source_bytes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("stud.csv");
        let mut text = String::from(" id ,Score \r\n");
        for idx in 0..12 {
            text.push_str(&format!("{idx}, {}\r\n", idx % 5));
        }
        fs::write(&source, &text).unwrap();
        let mut config = PipelineConfig::default();
        config.source_data_path = source.clone();
        config.artifacts = crate::config::ArtifactStore::under(dir.path().join("artifacts"));
        DataIngestion::new(DataIngestionConfig::from(&config), PipelineTelemetry::disabled())
            .initiate()
            .unwrap();
        assert_eq!(fs::read(&config.artifacts.raw_data_path).unwrap(), text.as_bytes());

        // Raw path pointing at the source leaves it intact.
        config.artifacts.raw_data_path = source.clone();
        DataIngestion::new(DataIngestionConfig::from(&config), PipelineTelemetry::disabled())
            .initiate()
            .unwrap();
        assert_eq!(fs::read(&source).unwrap(), text.as_bytes());
    }

    #[test]
    fn unreadable_source_is_an_ingestion_error() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.source_data_path = dir.path().join("missing.csv");
        config.artifacts = crate::config::ArtifactStore::under(dir.path().join("artifacts"));
        let err = DataIngestion::new(DataIngestionConfig::from(&config), PipelineTelemetry::disabled())
            .initiate()
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Ingestion);
        assert!(!config.artifacts.train_data_path.exists());
    }

    #[test]
    fn empty_source_is_rejected() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("stud.csv");
        fs::write(&source, "gender,math_score\n").unwrap();
        let mut config = PipelineConfig::default();
        config.source_data_path = source;
        config.artifacts = crate::config::ArtifactStore::under(dir.path().join("artifacts"));
        let err = DataIngestion::new(DataIngestionConfig::from(&config), PipelineTelemetry::disabled())
            .initiate()
            .unwrap_err();
        assert!(err.report().contains("no rows"));
    }
}
