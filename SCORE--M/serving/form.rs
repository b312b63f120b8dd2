use score_learning::CustomData;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected form submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    /// A score field is not a number.
    #[error("`{field}` must be a number, got `{value}`")]
    InvalidScore {
        /// Form field name.
        field: &'static str,
        /// Submitted text.
        value: String,
    },
}

/// Fields posted by the prediction form. Absent fields arrive empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictForm {
    /// Gender selection.
    pub gender: String,
    /// Race/ethnicity group.
    pub ethnicity: String,
    /// Parental education level.
    pub parental_level_of_education: String,
    /// Lunch type.
    pub lunch: String,
    /// Test preparation course.
    pub test_preparation_course: String,
    /// Reading score as typed.
    pub reading_score: String,
    /// Writing score as typed.
    pub writing_score: String,
}

impl PredictForm {
    /// Builds the record to score. With `swap_scores` the two score fields
    /// are crossed over, matching how the deployed form has always fed them.
    pub fn to_record(&self, swap_scores: bool) -> Result<CustomData, FormError> {
        let reading = parse_score("reading_score", &self.reading_score)?;
        let writing = parse_score("writing_score", &self.writing_score)?;
        let (reading_score, writing_score) = if swap_scores {
            (writing, reading)
        } else {
            (reading, writing)
        };
        Ok(CustomData {
            gender: self.gender.trim().to_string(),
            race_ethnicity: self.ethnicity.trim().to_string(),
            parental_level_of_education: self.parental_level_of_education.trim().to_string(),
            lunch: self.lunch.trim().to_string(),
            test_preparation_course: self.test_preparation_course.trim().to_string(),
            reading_score,
            writing_score,
        })
    }
}

fn parse_score(field: &'static str, raw: &str) -> Result<f64, FormError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FormError::InvalidScore {
            field,
            value: raw.to_string(),
        })
}
