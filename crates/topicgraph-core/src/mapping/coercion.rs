//! Conversions between stored attribute strings and typed scalar values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// The scalar type a model property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Text,
    Bool,
    Int,
    Float,
    DateTime,
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    Text(String),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Text(_) => ScalarType::Text,
            Self::Bool(_) => ScalarType::Bool,
            Self::Int(_) => ScalarType::Int,
            Self::Float(_) => ScalarType::Float,
            Self::DateTime(_) => ScalarType::DateTime,
        }
    }

    /// The string stored in an attribute collection.
    ///
    /// Booleans are normalised to `1`/`0`.
    pub fn to_attribute_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bool(b) => normalize_bool(*b).to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::DateTime(d) => d.to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::DateTime(d) => serde_json::Value::String(d.to_rfc3339()),
        }
    }

    /// Read a JSON value as the given scalar type.
    pub fn from_json(value: &serde_json::Value, ty: ScalarType) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => coerce(s, ty),
            serde_json::Value::Bool(b) => match ty {
                ScalarType::Bool => Some(Self::Bool(*b)),
                ScalarType::Text => Some(Self::Text(b.to_string())),
                _ => None,
            },
            serde_json::Value::Number(n) => match ty {
                ScalarType::Int => n.as_i64().map(Self::Int),
                ScalarType::Float => n.as_f64().map(Self::Float),
                ScalarType::Text => Some(Self::Text(n.to_string())),
                ScalarType::Bool => n.as_i64().map(|i| Self::Bool(i != 0)),
                ScalarType::DateTime => None,
            },
            _ => None,
        }
    }
}

/// Parse the boolean conventions used in attribute values.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The stored form of a boolean.
pub fn normalize_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Normalise a raw attribute string that is meant to hold a boolean.
///
/// Unrecognised strings are returned unchanged.
pub fn normalize_bool_string(value: &str) -> String {
    parse_bool(value)
        .map(|b| normalize_bool(b).to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(value) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(d.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Convert an attribute string into `ty`. Returns `None` if it doesn't parse.
pub fn coerce(value: &str, ty: ScalarType) -> Option<ScalarValue> {
    match ty {
        ScalarType::Text => Some(ScalarValue::Text(value.to_string())),
        ScalarType::Bool => parse_bool(value).map(ScalarValue::Bool),
        ScalarType::Int => value.trim().parse().ok().map(ScalarValue::Int),
        ScalarType::Float => value.trim().parse().ok().map(ScalarValue::Float),
        ScalarType::DateTime => parse_datetime(value).map(ScalarValue::DateTime),
    }
}

/// Convert an already-typed value into `ty`, if the two are compatible.
pub fn convert(value: &ScalarValue, ty: ScalarType) -> Option<ScalarValue> {
    if value.scalar_type() == ty {
        return Some(value.clone());
    }
    match (value, ty) {
        (ScalarValue::Int(i), ScalarType::Float) => Some(ScalarValue::Float(*i as f64)),
        (_, ScalarType::Text) => Some(ScalarValue::Text(value.to_attribute_string())),
        (ScalarValue::Text(s), _) => coerce(s, ty),
        _ => None,
    }
}
