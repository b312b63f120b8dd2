use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// One-hot encoder with per-column sorted vocabularies.
///
/// Categories unseen at fit time encode as all zeros for their column group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    /// Learns the vocabulary of each column. `columns` is column-major.
    #[must_use]
    pub fn fit(columns: &[Vec<String>]) -> Self {
        let categories = columns
            .iter()
            .map(|column| {
                column
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        Self { categories }
    }

    /// Expands the columns into indicator columns, one per learned category.
    pub fn transform(&self, columns: &[Vec<String>]) -> Result<Array2<f64>, PreprocessError> {
        if columns.len() != self.categories.len() {
            return Err(PreprocessError::WidthMismatch {
                expected: self.categories.len(),
                got: columns.len(),
            });
        }
        let rows = columns.first().map_or(0, Vec::len);
        let mut out = Array2::<f64>::zeros((rows, self.n_features_out()));
        let mut offset = 0;
        for (column, vocabulary) in columns.iter().zip(&self.categories) {
            for (row, value) in column.iter().enumerate() {
                if let Ok(position) = vocabulary.binary_search(value) {
                    out[[row, offset + position]] = 1.0;
                }
            }
            offset += vocabulary.len();
        }
        Ok(out)
    }

    /// Total indicator columns produced.
    #[must_use]
    pub fn n_features_out(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Learned vocabularies, in column order.
    #[must_use]
    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn encodes_sorted_vocabulary() {
        let train = vec![
            column(&["male", "female", "male"]),
            column(&["none", "completed", "none"]),
        ];
        let encoder = OneHotEncoder::fit(&train);
        assert_eq!(encoder.n_features_out(), 4);
        assert_eq!(encoder.categories()[0], column(&["female", "male"]));

        let encoded = encoder.transform(&train).unwrap();
        assert_eq!(encoded.row(0).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(encoded.row(1).to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn unseen_categories_encode_as_zeros() {
        let encoder = OneHotEncoder::fit(&[column(&["group A", "group B"])]);
        let encoded = encoder.transform(&[column(&["group E"])]).unwrap();
        assert_eq!(encoded.row(0).to_vec(), vec![0.0, 0.0]);
    }
}
