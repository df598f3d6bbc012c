// gridloom-core/src/domain/value.rs

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed cell value.
///
/// Raw payloads arrive as loosely-typed JSON; the Silver transform casts each
/// cell to its declared [`ColumnType`]. `Timestamp` must come before `Text`
/// so that untagged deserialization recovers RFC 3339 strings as timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

/// Declared type of a cleaned column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Timestamp,
    Text,
}

/// A cell-level cast failure. Non-fatal on its own: the transform nulls the
/// cell and counts the failure against the column's budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastError;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Cast this value to the target type.
    ///
    /// `Null` survives any cast. Lossy or nonsensical conversions are
    /// rejected rather than guessed (e.g. `Bool` → `Float`).
    pub fn cast(&self, target: ColumnType) -> Result<Value, CastError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            ColumnType::Float => match self {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        return Ok(Value::Null);
                    }
                    trimmed.parse::<f64>().map(Value::Float).map_err(|_| CastError)
                }
                _ => Err(CastError),
            },
            ColumnType::Int => match self {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
                Value::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        return Ok(Value::Null);
                    }
                    trimmed.parse::<i64>().map(Value::Int).map_err(|_| CastError)
                }
                _ => Err(CastError),
            },
            ColumnType::Bool => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    "" => Ok(Value::Null),
                    _ => Err(CastError),
                },
                _ => Err(CastError),
            },
            ColumnType::Timestamp => match self {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        return Ok(Value::Null);
                    }
                    parse_timestamp(trimmed)
                        .map(Value::Timestamp)
                        .ok_or(CastError)
                }
                _ => Err(CastError),
            },
            ColumnType::Text => Ok(Value::Text(self.to_string())),
        }
    }

    /// Convert a raw JSON scalar into a Value. Nested structures are
    /// serialized verbatim into text; the cast phase decides what survives.
    pub fn from_json(raw: &serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(*ts)),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Parse a timestamp from the formats seen in raw grid payloads:
/// RFC 3339 (with or without offset) and bare `YYYY-MM-DDTHH:MM[:SS]`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Canonical warehouse representation of a UTC timestamp.
///
/// Fixed-width RFC 3339 with second precision: exact string equality works
/// for natural-key lookups and lexicographic order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cast_text_to_float() {
        assert_eq!(
            Value::Text(" 1250.5 ".into()).cast(ColumnType::Float),
            Ok(Value::Float(1250.5))
        );
        assert_eq!(
            Value::Text("".into()).cast(ColumnType::Float),
            Ok(Value::Null)
        );
        assert!(Value::Text("n/a".into()).cast(ColumnType::Float).is_err());
    }

    #[test]
    fn test_cast_preserves_null() {
        assert_eq!(Value::Null.cast(ColumnType::Timestamp), Ok(Value::Null));
    }

    #[test]
    fn test_cast_bool_rejects_float() {
        assert!(Value::Float(0.5).cast(ColumnType::Bool).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        for raw in [
            "2025-01-01T10:00:00Z",
            "2025-01-01T10:00:00+00:00",
            "2025-01-01T10:00:00",
            "2025-01-01T10:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "failed on {raw}");
        }
        assert_eq!(parse_timestamp("not-a-date"), None);
    }

    #[test]
    fn test_format_timestamp_is_lexicographic() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 9, 59, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn test_untagged_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap();
        let json = serde_json::to_string(&Value::Timestamp(ts)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Timestamp(ts));

        let back: Value = serde_json::from_str("null").unwrap();
        assert_eq!(back, Value::Null);
    }
}
