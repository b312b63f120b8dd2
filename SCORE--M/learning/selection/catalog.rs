use serde::{Deserialize, Serialize};

use crate::models::{params::ParamGrid, ModelKind};

/// A named estimator family with the grid searched for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Display name, also the report key.
    pub name: String,
    /// Estimator family.
    pub kind: ModelKind,
    /// Candidate hyperparameters.
    #[serde(default)]
    pub grid: ParamGrid,
}

impl CatalogEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ModelKind, grid: ParamGrid) -> Self {
        Self {
            name: name.into(),
            kind,
            grid,
        }
    }
}

/// Ordered list of candidate models; declaration order breaks score ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

const ESTIMATOR_COUNTS: [i64; 6] = [8, 16, 32, 64, 128, 256];

impl ModelCatalog {
    /// Catalog from explicit entries.
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// The seven families and grids searched for the student score model.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            CatalogEntry::new(
                "Random Forest",
                ModelKind::RandomForest,
                ParamGrid::new().with("n_estimators", ESTIMATOR_COUNTS),
            ),
            CatalogEntry::new(
                "Decision Tree",
                ModelKind::DecisionTree,
                ParamGrid::new().with(
                    "criterion",
                    ["squared_error", "friedman_mse", "absolute_error", "poisson"],
                ),
            ),
            CatalogEntry::new(
                "Gradient Boosting",
                ModelKind::GradientBoosting,
                ParamGrid::new()
                    .with("learning_rate", [0.1, 0.01, 0.05, 0.001])
                    .with("subsample", [0.6, 0.7, 0.75, 0.8, 0.85, 0.9])
                    .with("n_estimators", ESTIMATOR_COUNTS),
            ),
            CatalogEntry::new(
                "Linear Regression",
                ModelKind::LinearRegression,
                ParamGrid::new(),
            ),
            CatalogEntry::new(
                "XGBRegressor",
                ModelKind::RegularizedBoosting,
                ParamGrid::new()
                    .with("learning_rate", [0.1, 0.01, 0.05, 0.001])
                    .with("n_estimators", ESTIMATOR_COUNTS),
            ),
            CatalogEntry::new(
                "CatBoosting Regressor",
                ModelKind::ObliviousBoosting,
                ParamGrid::new()
                    .with("depth", [6_i64, 8, 10])
                    .with("learning_rate", [0.01, 0.05, 0.1])
                    .with("iterations", [30_i64, 50, 100]),
            ),
            CatalogEntry::new(
                "AdaBoost Regressor",
                ModelKind::AdaBoost,
                ParamGrid::new()
                    .with("learning_rate", [0.1, 0.01, 0.5, 0.001])
                    .with("n_estimators", ESTIMATOR_COUNTS),
            ),
        ])
    }

    /// Appends an entry.
    #[must_use]
    pub fn with_entry(mut self, entry: CatalogEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Keeps only the named entries, preserving declaration order.
    #[must_use]
    pub fn only(&self, names: &[&str]) -> Self {
        Self::new(
            self.entries
                .iter()
                .filter(|entry| names.contains(&entry.name.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
