//! Scene pre-filters on metadata properties.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A predicate on a scene property. Scenes lacking the property never match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum SceneFilter {
    Lt { property: String, value: f64 },
    Gt { property: String, value: f64 },
    Eq { property: String, value: Value },
    ListContains { property: String, value: Value },
}

impl SceneFilter {
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            SceneFilter::Lt { property, value } => properties
                .get(property)
                .and_then(Value::as_f64)
                .is_some_and(|v| v < *value),
            SceneFilter::Gt { property, value } => properties
                .get(property)
                .and_then(Value::as_f64)
                .is_some_and(|v| v > *value),
            SceneFilter::Eq { property, value } => properties
                .get(property)
                .is_some_and(|v| values_equal(v, value)),
            SceneFilter::ListContains { property, value } => properties
                .get(property)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|v| values_equal(v, value))),
        }
    }
}

pub fn matches_all(filters: &[SceneFilter], properties: &Map<String, Value>) -> bool {
    filters.iter().all(|f| f.matches(properties))
}

// 20 and 20.0 compare equal
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

// -- Tests -------------------------------------------------------------------
