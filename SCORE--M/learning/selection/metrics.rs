use ndarray::ArrayView1;

use crate::models::ModelError;

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
    if y_true.len() != y_pred.len() {
        return Err(ModelError::LengthMismatch {
            rows: y_pred.len(),
            targets: y_true.len(),
        });
    }
    let mean = y_true.mean().ok_or(ModelError::EmptyTrainingSet)?;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}
