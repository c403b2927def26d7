use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value as carried by a binlog row event, an init-snapshot
/// row, or a static column-map literal. Mirrors the handful of scalar shapes
/// the MySQL wire protocol hands back for row-based replication; BLOB/GIS
/// fidelity beyond raw bytes is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Natural-ordering comparison used by the filter engine: numeric
    /// variants compare by value regardless of which numeric shape they
    /// arrived in, strings compare lexicographically, NULL and
    /// cross-family comparisons (e.g. a number against a string) are
    /// incomparable.
    pub fn natural_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if self.is_numeric() && other.is_numeric() {
            return self.as_f64()?.partial_cmp(&other.as_f64()?);
        }
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// `eq` semantics for the filter engine: NULL == NULL is true,
    /// everything else falls back to natural comparison.
    pub fn filter_eq(&self, other: &Value) -> bool {
        if self.is_null() && other.is_null() {
            return true;
        }
        if self.is_null() || other.is_null() {
            return false;
        }
        if self.is_numeric() && other.is_numeric() {
            return self.as_f64() == other.as_f64();
        }
        self == other
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_treats_null_as_equal_to_null() {
        assert!(Value::Null.filter_eq(&Value::Null));
    }

    #[test]
    fn eq_against_null_is_false() {
        assert!(!Value::Int(1).filter_eq(&Value::Null));
        assert!(!Value::Null.filter_eq(&Value::Int(1)));
    }

    #[test]
    fn numeric_family_compares_across_shapes() {
        assert_eq!(Value::Int(2).natural_cmp(&Value::UInt(2)), Some(Ordering::Equal));
        assert_eq!(Value::Int(1).natural_cmp(&Value::Float(1.5)), Some(Ordering::Less));
    }

    #[test]
    fn mismatched_types_are_incomparable() {
        assert_eq!(Value::Int(1).natural_cmp(&Value::Text("1".into())), None);
    }

    #[test]
    fn comparisons_against_null_are_incomparable() {
        assert_eq!(Value::Int(1).natural_cmp(&Value::Null), None);
    }
}
