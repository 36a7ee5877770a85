//! Property trees attached to annotation features.
//!
//! A [`PropertyValue`] is a JSON-like tree: a scalar (number, string,
//! boolean), an ordered list, or a string-keyed map. Nulls have no
//! representation; converting from `serde_json::Value` drops them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String-keyed map of property values. Key order carries no meaning.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A node in a feature's property tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(PropertyMap),
}

impl PropertyValue {
    /// Convert from a JSON value, dropping nulls (including nulls nested in
    /// lists and maps). Returns `None` for a top-level null.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(PropertyValue::Bool(b)),
            Value::Number(n) => n.as_f64().map(PropertyValue::Number),
            Value::String(s) => Some(PropertyValue::String(s)),
            Value::Array(items) => Some(PropertyValue::List(
                items.into_iter().filter_map(Self::from_json).collect(),
            )),
            Value::Object(map) => Some(PropertyValue::Map(
                map.into_iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    /// Convert to a JSON value. Non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            PropertyValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// The scalar held by this node, if it is a leaf.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            PropertyValue::Bool(b) => Some(Scalar::Bool(*b)),
            PropertyValue::Number(n) => Some(Scalar::Number(*n)),
            PropertyValue::String(s) => Some(Scalar::String(s.clone())),
            PropertyValue::List(_) | PropertyValue::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            PropertyValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Number(n as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(map: PropertyMap) -> Self {
        PropertyValue::Map(map)
    }
}

impl From<Scalar> for PropertyValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => PropertyValue::Bool(b),
            Scalar::Number(n) => PropertyValue::Number(n),
            Scalar::String(s) => PropertyValue::String(s),
        }
    }
}

/// Convert a JSON object into a property map, dropping nulls.
///
/// Non-object JSON yields an empty map.
pub fn property_map_from_json(value: serde_json::Value) -> PropertyMap {
    match PropertyValue::from_json(value) {
        Some(PropertyValue::Map(map)) => map,
        _ => PropertyMap::new(),
    }
}

/// A leaf of a property tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    /// Numeric value, if this leaf is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Categorical form of the leaf. Strings are used as-is and booleans
    /// become `"true"`/`"false"`; numbers are not categorical.
    pub fn as_category(&self) -> Option<String> {
        match self {
            Scalar::String(s) => Some(s.clone()),
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(_) => None,
        }
    }

    /// Value class used for type-mismatch checks. Numbers are one class;
    /// strings and booleans are both categorical.
    pub fn value_class(&self) -> &'static str {
        match self {
            Scalar::Number(_) => "number",
            Scalar::Bool(_) | Scalar::String(_) => "categorical",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => f.write_str(s),
        }
    }
}
