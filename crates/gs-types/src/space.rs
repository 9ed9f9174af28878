//! Hyperparameter space definitions and concrete trial configurations.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::errors::{GsResult, SpaceError};

/// A single candidate value on an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Convert a JSON scalar; arrays, objects and `null` are rejected.
    pub fn from_json(axis: &str, value: &serde_json::Value) -> Result<Self, SpaceError> {
        use serde_json::Value;

        let unsupported = || SpaceError::UnsupportedValue {
            axis: axis.to_string(),
            value: value.to_string(),
        };

        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float).ok_or_else(unsupported)
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => Err(unsupported()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            // Debug keeps the decimal point, so 1.0 stays distinguishable from 1.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One hyperparameter and its ordered candidate values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HyperparameterAxis {
    /// Axis name, unique within a space (e.g. "batch_size").
    pub name: String,
    /// Candidate values in declaration order.
    pub values: Vec<ParameterValue>,
}

impl HyperparameterAxis {
    pub fn new(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The full search space: axes in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HyperparameterSpace {
    axes: Vec<HyperparameterAxis>,
}

impl HyperparameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_axis<V>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<ParameterValue>,
    {
        self.axes.push(HyperparameterAxis::new(
            name,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn axes(&self) -> &[HyperparameterAxis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&HyperparameterAxis> {
        self.axes.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Every axis must be uniquely named and carry at least one candidate.
    pub fn validate(&self) -> Result<(), SpaceError> {
        let mut seen = HashSet::with_capacity(self.axes.len());
        for axis in &self.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(SpaceError::DuplicateAxis {
                    axis: axis.name.clone(),
                });
            }
            if axis.is_empty() {
                return Err(SpaceError::EmptyAxis {
                    axis: axis.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Number of combinations, or `None` if the product overflows.
    /// An empty space has exactly one (empty) combination.
    pub fn grid_size(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |total, axis| total.checked_mul(axis.len()))
    }

    /// Build a space from a JSON object of `axis -> [candidates]`.
    /// Axis order follows the document.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, SpaceError> {
        let object = value.as_object().ok_or(SpaceError::NotAnObject)?;

        let mut space = Self::new();
        for (name, candidates) in object {
            let candidates = candidates.as_array().ok_or_else(|| SpaceError::NotAnArray {
                axis: name.clone(),
            })?;
            let values = candidates
                .iter()
                .map(|c| ParameterValue::from_json(name, c))
                .collect::<Result<Vec<_>, _>>()?;
            space.axes.push(HyperparameterAxis::new(name.clone(), values));
        }

        space.validate()?;
        Ok(space)
    }

    pub fn from_json_str(json: &str) -> GsResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Ok(Self::from_json_value(&value)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// One concrete assignment: exactly one value per axis, in axis order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialConfig {
    values: Vec<(String, ParameterValue)>,
}

impl TrialConfig {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ParameterValue)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for TrialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return f.write_str("(no parameters)");
        }
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl Serialize for TrialConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
