use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single input value a rule condition is evaluated against: the aggregate
/// risk score or one metric out of an assessment bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetricValue {
    Number(f64),
    Bool(bool),
    Text(String),
    #[default]
    Missing,
}

impl MetricValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    /// Convert a stored JSON metric. Single-element arrays are unwrapped; other
    /// structured values have no scalar meaning and become `Missing`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => MetricValue::Missing,
            Value::Bool(b) => MetricValue::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map(MetricValue::Number)
                .unwrap_or(MetricValue::Missing),
            Value::String(s) => MetricValue::Text(s.clone()),
            Value::Array(items) if items.len() == 1 => MetricValue::from_json(&items[0]),
            Value::Array(_) | Value::Object(_) => MetricValue::Missing,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Bool(b) => Value::Bool(*b),
            MetricValue::Text(s) => Value::String(s.clone()),
            MetricValue::Missing => Value::Null,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map(MetricValue::Number).unwrap_or_default()
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Bool(true) => f.write_str("TRUE"),
            MetricValue::Bool(false) => f.write_str("FALSE"),
            MetricValue::Text(s) => write!(f, "{s:?}"),
            MetricValue::Missing => f.write_str("NA"),
        }
    }
}

/// Every metric computed for one package by the assessment pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentBundle {
    metrics: HashMap<String, MetricValue>,
}

impl AssessmentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.insert(metric.into(), value.into());
    }

    /// Value of `metric`, or `Missing` when the pipeline did not produce it.
    pub fn get(&self, metric: &str) -> MetricValue {
        self.metrics.get(metric).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl FromIterator<(String, MetricValue)> for AssessmentBundle {
    fn from_iter<T: IntoIterator<Item = (String, MetricValue)>>(iter: T) -> Self {
        Self {
            metrics: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDecisionState {
    pub package_name: String,
    pub score: Option<f64>,
    /// `None` means undecided.
    pub decision_id: Option<i64>,
    pub decision: Option<String>,
    pub decision_by: Option<String>,
    pub decision_date: Option<DateTime<Utc>>,
}

impl PackageDecisionState {
    pub fn is_decided(&self) -> bool {
        self.decision_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub name: String,
    pub version: Option<String>,
    pub score: Option<f64>,
}
