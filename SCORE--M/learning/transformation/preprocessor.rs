use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{
    encoder::OneHotEncoder,
    imputer::{MedianImputer, MostFrequentImputer},
    scaler::StandardScaler,
    PreprocessError,
};
use crate::{artifact::Artifact, table::Table};

/// Column groups consumed by the preprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Numeric features, in output order.
    pub numeric: Vec<String>,
    /// Categorical features, in output order.
    pub categorical: Vec<String>,
    /// Regression target, appended untransformed.
    pub target: String,
}

impl ColumnSchema {
    /// Schema of the student performance dataset.
    #[must_use]
    pub fn student_scores() -> Self {
        let owned = |names: &[&str]| -> Vec<String> { names.iter().map(ToString::to_string).collect() };
        Self {
            numeric: owned(&["writing_score", "reading_score"]),
            categorical: owned(&[
                "gender",
                "race_ethnicity",
                "parental_level_of_education",
                "lunch",
                "test_preparation_course",
            ]),
            target: "math_score".into(),
        }
    }

    /// Every feature column, numeric first.
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.numeric
            .iter()
            .chain(&self.categorical)
            .map(String::as_str)
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::student_scores()
    }
}

/// Fitted column-wise preprocessing: a numeric and a categorical branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: ColumnSchema,
    numeric_imputer: MedianImputer,
    numeric_scaler: StandardScaler,
    categorical_imputer: MostFrequentImputer,
    encoder: OneHotEncoder,
    categorical_scaler: StandardScaler,
}

impl Artifact for Preprocessor {
    const KIND: &'static str = "preprocessor";
}

impl Preprocessor {
    /// Learns every branch statistic from `table`.
    pub fn fit(schema: ColumnSchema, table: &Table) -> Result<Self, PreprocessError> {
        if table.is_empty() {
            return Err(PreprocessError::EmptyInput);
        }
        let numeric_raw = numeric_columns(&schema, table)?;
        let numeric_imputer = MedianImputer::fit(&schema.numeric, &numeric_raw)?;
        let numeric = to_matrix(table.len(), &numeric_imputer.transform(&numeric_raw)?);
        let numeric_scaler = StandardScaler::fit(&numeric, true)?;

        let categorical_raw = categorical_columns(&schema, table)?;
        let categorical_imputer = MostFrequentImputer::fit(&schema.categorical, &categorical_raw)?;
        let categorical = categorical_imputer.transform(&categorical_raw)?;
        let encoder = OneHotEncoder::fit(&categorical);
        let indicators = encoder.transform(&categorical)?;
        let categorical_scaler = StandardScaler::fit(&indicators, false)?;

        Ok(Self {
            schema,
            numeric_imputer,
            numeric_scaler,
            categorical_imputer,
            encoder,
            categorical_scaler,
        })
    }

    /// Applies the fitted branches; never refits.
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>, PreprocessError> {
        let numeric_raw = numeric_columns(&self.schema, table)?;
        let numeric = to_matrix(table.len(), &self.numeric_imputer.transform(&numeric_raw)?);
        let numeric = self.numeric_scaler.transform(&numeric)?;

        let categorical = self
            .categorical_imputer
            .transform(&categorical_columns(&self.schema, table)?)?;
        let indicators = self.encoder.transform(&categorical)?;
        let indicators = if table.is_empty() {
            Array2::zeros((0, self.encoder.n_features_out()))
        } else {
            self.categorical_scaler.transform(&indicators)?
        };

        Ok(concatenate(Axis(1), &[numeric.view(), indicators.view()])?)
    }

    /// Width of [`Preprocessor::transform`] output.
    #[must_use]
    pub fn n_features_out(&self) -> usize {
        self.schema.numeric.len() + self.encoder.n_features_out()
    }

    /// Output column names (`<column>_<category>` for indicators).
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.schema.numeric.clone();
        for (column, categories) in self.schema.categorical.iter().zip(self.encoder.categories()) {
            names.extend(categories.iter().map(|category| format!("{column}_{category}")));
        }
        names
    }

    /// Schema the preprocessor was fitted with.
    #[must_use]
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Learned numeric medians.
    #[must_use]
    pub fn numeric_medians(&self) -> &[f64] {
        self.numeric_imputer.statistics()
    }
}

fn numeric_columns(
    schema: &ColumnSchema,
    table: &Table,
) -> Result<Vec<Vec<Option<f64>>>, PreprocessError> {
    schema
        .numeric
        .iter()
        .map(|name| table.numeric_column(name).map_err(PreprocessError::from))
        .collect()
}

fn categorical_columns(
    schema: &ColumnSchema,
    table: &Table,
) -> Result<Vec<Vec<Option<String>>>, PreprocessError> {
    schema
        .categorical
        .iter()
        .map(|name| -> Result<Vec<Option<String>>, PreprocessError> {
            let cells = table.text_column(name)?;
            Ok(cells
                .into_iter()
                .map(|cell| cell.map(|value| value.trim().to_string()))
                .collect())
        })
        .collect()
}

fn to_matrix(rows: usize, columns: &[Vec<f64>]) -> Array2<f64> {
    Array2::from_shape_fn((rows, columns.len()), |(row, col)| columns[col][row])
}
