use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// Per-column standardization with population statistics.
///
/// With `with_mean = false` columns are only divided by their deviation, which keeps
/// indicator columns non-negative and zeros at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    with_mean: bool,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Learns column means and deviations; zero deviations scale by 1.
    pub fn fit(data: &Array2<f64>, with_mean: bool) -> Result<Self, PreprocessError> {
        if data.nrows() == 0 {
            return Err(PreprocessError::EmptyInput);
        }
        let mut means = Vec::with_capacity(data.ncols());
        let mut scales = Vec::with_capacity(data.ncols());
        for column in data.axis_iter(Axis(1)) {
            #[allow(clippy::cast_precision_loss)]
            let n = column.len() as f64;
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std < 10.0 * f64::EPSILON { 1.0 } else { std });
        }
        Ok(Self {
            with_mean,
            means,
            scales,
        })
    }

    /// Applies the learned statistics.
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, PreprocessError> {
        if data.ncols() != self.scales.len() {
            return Err(PreprocessError::WidthMismatch {
                expected: self.scales.len(),
                got: data.ncols(),
            });
        }
        let mut out = data.clone();
        for (idx, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let shift = if self.with_mean { self.means[idx] } else { 0.0 };
            let scale = self.scales[idx];
            column.mapv_inplace(|v| (v - shift) / scale);
        }
        Ok(out)
    }

    /// Learned column means.
    #[must_use]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Learned divisors.
    #[must_use]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}
