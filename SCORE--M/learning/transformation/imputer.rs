use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// Fill values learned per numeric column (median of the observed values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    /// Learns one median per column. `columns` is column-major.
    pub fn fit(names: &[String], columns: &[Vec<Option<f64>>]) -> Result<Self, PreprocessError> {
        let medians = names
            .iter()
            .zip(columns)
            .map(|(name, column)| {
                let mut observed: Vec<f64> = column.iter().flatten().copied().collect();
                median(&mut observed).ok_or_else(|| PreprocessError::AllMissing(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { medians })
    }

    /// Replaces missing cells with the learned medians.
    pub fn transform(&self, columns: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>, PreprocessError> {
        check_width(self.medians.len(), columns.len())?;
        Ok(columns
            .iter()
            .zip(&self.medians)
            .map(|(column, fill)| column.iter().map(|cell| cell.unwrap_or(*fill)).collect())
            .collect())
    }

    /// Learned medians, in column order.
    #[must_use]
    pub fn statistics(&self) -> &[f64] {
        &self.medians
    }
}

/// Fill values learned per categorical column (most frequent category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MostFrequentImputer {
    modes: Vec<String>,
}

impl MostFrequentImputer {
    /// Learns one mode per column; ties go to the lexicographically smallest value.
    pub fn fit(names: &[String], columns: &[Vec<Option<String>>]) -> Result<Self, PreprocessError> {
        let modes = names
            .iter()
            .zip(columns)
            .map(|(name, column)| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for value in column.iter().flatten() {
                    *counts.entry(value.as_str()).or_default() += 1;
                }
                let mut best: Option<(&str, usize)> = None;
                for (value, count) in counts {
                    if best.map_or(true, |(_, top)| count > top) {
                        best = Some((value, count));
                    }
                }
                best.map(|(value, _)| value.to_string())
                    .ok_or_else(|| PreprocessError::AllMissing(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { modes })
    }

    /// Replaces missing cells with the learned modes.
    pub fn transform(
        &self,
        columns: &[Vec<Option<String>>],
    ) -> Result<Vec<Vec<String>>, PreprocessError> {
        check_width(self.modes.len(), columns.len())?;
        Ok(columns
            .iter()
            .zip(&self.modes)
            .map(|(column, fill)| {
                column
                    .iter()
                    .map(|cell| cell.clone().unwrap_or_else(|| fill.clone()))
                    .collect()
            })
            .collect())
    }

    /// Learned modes, in column order.
    #[must_use]
    pub fn statistics(&self) -> &[String] {
        &self.modes
    }
}

fn check_width(expected: usize, got: usize) -> Result<(), PreprocessError> {
    if expected == got {
        Ok(())
    } else {
        Err(PreprocessError::WidthMismatch { expected, got })
    }
}

/// Median of the values; the middle pair is averaged for even counts.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
