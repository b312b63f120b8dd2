use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Whole number (counts, depths).
    Int(i64),
    /// Real number (rates, fractions).
    Float(f64),
    /// Named option (criteria).
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One concrete hyperparameter assignment, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(IndexMap<String, ParamValue>);

impl ParamSet {
    /// Empty assignment (every parameter at its default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Raw value lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// True when no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates assignments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Rejects names the model does not understand.
    pub fn ensure_known(&self, model: &str, accepted: &[&str]) -> Result<(), ModelError> {
        match self.0.keys().find(|name| !accepted.contains(&name.as_str())) {
            Some(name) => Err(ModelError::UnknownParam {
                model: model.to_string(),
                name: name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Positive real parameter.
    pub fn positive_float(&self, name: &str, default: f64) -> Result<f64, ModelError> {
        let value = match self.get(name) {
            None => return Ok(default),
            #[allow(clippy::cast_precision_loss)]
            Some(ParamValue::Int(value)) => *value as f64,
            Some(ParamValue::Float(value)) => *value,
            Some(other) => return Err(invalid(name, other, "expected a number")),
        };
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(invalid(name, &ParamValue::Float(value), "must be positive"))
        }
    }

    /// Real parameter in `(0, 1]`.
    pub fn fraction(&self, name: &str, default: f64) -> Result<f64, ModelError> {
        let value = self.positive_float(name, default)?;
        if value <= 1.0 {
            Ok(value)
        } else {
            Err(invalid(name, &ParamValue::Float(value), "must be in (0, 1]"))
        }
    }

    /// Positive whole-number parameter.
    pub fn count(&self, name: &str, default: usize) -> Result<usize, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(value)) if *value > 0 => usize::try_from(*value)
                .map_err(|_| invalid(name, &ParamValue::Int(*value), "out of range")),
            Some(other) => Err(invalid(name, other, "expected a positive integer")),
        }
    }

    /// Named option parameter.
    pub fn text<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Text(value)) => Ok(value.as_str()),
            Some(other) => Err(invalid(name, other, "expected a name")),
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

fn invalid(name: &str, value: &ParamValue, reason: &str) -> ModelError {
    ModelError::InvalidParam {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Candidate values per hyperparameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(IndexMap<String, Vec<ParamValue>>);

impl ParamGrid {
    /// Empty grid; expands to the single default assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the candidates for one parameter.
    #[must_use]
    pub fn with<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.0
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of assignments [`ParamGrid::combinations`] yields.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// True when the grid names no parameter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cartesian product over parameter names in sorted order; the last name varies fastest.
    #[must_use]
    pub fn combinations(&self) -> Vec<ParamSet> {
        let mut names: Vec<&String> = self.0.keys().collect();
        names.sort();
        let mut out = vec![ParamSet::new()];
        for name in names {
            let values = &self.0[name];
            out = out
                .into_iter()
                .flat_map(|partial| {
                    values
                        .iter()
                        .map(move |value| partial.clone().with(name.clone(), value.clone()))
                })
                .collect();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_sort_names_and_vary_last_fastest() {
        let grid = ParamGrid::new()
            .with("subsample", [0.6, 0.7])
            .with("learning_rate", [0.1, 0.01, 0.05]);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(grid.candidate_count(), 6);
        assert_eq!(
            combos[0],
            ParamSet::new().with("learning_rate", 0.1).with("subsample", 0.6)
        );
        assert_eq!(
            combos[1],
            ParamSet::new().with("learning_rate", 0.1).with("subsample", 0.7)
        );
        assert_eq!(combos[0].to_string(), "{learning_rate: 0.1, subsample: 0.6}");
    }

    #[test]
    fn empty_grid_yields_default_assignment() {
        let combos = ParamGrid::new().combinations();
        assert_eq!(combos, vec![ParamSet::new()]);
    }

    #[test]
    fn typed_accessors_validate() {
        let params = ParamSet::new()
            .with("n_estimators", 0_i64)
            .with("learning_rate", 0.05)
            .with("criterion", "poisson");
        assert!(params.count("n_estimators", 100).is_err());
        assert_eq!(params.positive_float("learning_rate", 0.1).unwrap(), 0.05);
        assert_eq!(params.text("criterion", "squared_error").unwrap(), "poisson");
        assert_eq!(params.count("max_depth", 3).unwrap(), 3);
        assert!(params.ensure_known("tree", &["criterion"]).is_err());
    }

    #[test]
    fn values_serialize_untagged() {
        let params = ParamSet::new().with("n_estimators", 8_i64).with("learning_rate", 0.1);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"n_estimators":8,"learning_rate":0.1}"#);
        let back: ParamSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
