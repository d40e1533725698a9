//! Cell values and column semantic types.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single cell of an in-memory table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value the way it is written into a delimited file.
    ///
    /// Returns `None` for nulls so the caller can apply its own null marker.
    pub fn to_field(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::DateTimeTz(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Logical type of an in-memory column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Float,
    Decimal { precision: u32, scale: u32 },
    Boolean,
    Text,
    Categorical,
    Date,
    DateTime,
    DateTimeTz,
    Duration,
    Binary,
}

impl SemanticType {
    /// Parse a dtype name as produced by common dataframe libraries.
    ///
    /// Unknown names fall back to `Text`, matching how object columns behave.
    pub fn from_dtype(dtype: &str) -> Self {
        let lower = dtype.trim().to_lowercase();
        match lower.as_str() {
            "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64"
            | "int" | "integer" => SemanticType::Integer,
            "float16" | "float32" | "float64" | "float" | "double" => SemanticType::Float,
            "bool" | "boolean" => SemanticType::Boolean,
            "category" => SemanticType::Categorical,
            "object" | "string" | "str" | "text" => SemanticType::Text,
            "date" => SemanticType::Date,
            "bytes" | "binary" => SemanticType::Binary,
            s if s.starts_with("timedelta") => SemanticType::Duration,
            s if s.starts_with("datetime64") && s.contains(',') => SemanticType::DateTimeTz,
            s if s.starts_with("datetime") => SemanticType::DateTime,
            s if s.starts_with("decimal") => parse_decimal(s).unwrap_or(SemanticType::Decimal {
                precision: 18,
                scale: 0,
            }),
            _ => SemanticType::Text,
        }
    }

    /// Infer the semantic type of a single non-null value.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(SemanticType::Boolean),
            Value::Int(_) => Some(SemanticType::Integer),
            Value::Float(_) => Some(SemanticType::Float),
            Value::Decimal(d) => Some(SemanticType::Decimal {
                precision: 38,
                scale: d.scale(),
            }),
            Value::Text(_) => Some(SemanticType::Text),
            Value::Date(_) => Some(SemanticType::Date),
            Value::DateTime(_) => Some(SemanticType::DateTime),
            Value::DateTimeTz(_) => Some(SemanticType::DateTimeTz),
        }
    }

    /// Whether a value may be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (SemanticType::Integer, Value::Int(_)) => true,
            (SemanticType::Float, Value::Float(_) | Value::Int(_)) => true,
            (SemanticType::Decimal { .. }, Value::Decimal(_) | Value::Int(_)) => true,
            (SemanticType::Boolean, Value::Bool(_)) => true,
            (SemanticType::Text | SemanticType::Categorical, Value::Text(_)) => true,
            (SemanticType::Date, Value::Date(_)) => true,
            (SemanticType::DateTime, Value::DateTime(_)) => true,
            (SemanticType::DateTimeTz, Value::DateTimeTz(_)) => true,
            _ => false,
        }
    }
}

fn parse_decimal(s: &str) -> Option<SemanticType> {
    let inner = s.strip_prefix("decimal(")?.strip_suffix(')')?;
    let (p, sc) = inner.split_once(',')?;
    Some(SemanticType::Decimal {
        precision: p.trim().parse().ok()?,
        scale: sc.trim().parse().ok()?,
    })
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Integer => write!(f, "integer"),
            SemanticType::Float => write!(f, "float"),
            SemanticType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            SemanticType::Boolean => write!(f, "boolean"),
            SemanticType::Text => write!(f, "text"),
            SemanticType::Categorical => write!(f, "categorical"),
            SemanticType::Date => write!(f, "date"),
            SemanticType::DateTime => write!(f, "datetime"),
            SemanticType::DateTimeTz => write!(f, "datetime_tz"),
            SemanticType::Duration => write!(f, "duration"),
            SemanticType::Binary => write!(f, "binary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dtype() {
        assert_eq!(SemanticType::from_dtype("int64"), SemanticType::Integer);
        assert_eq!(SemanticType::from_dtype("float32"), SemanticType::Float);
        assert_eq!(SemanticType::from_dtype("bool"), SemanticType::Boolean);
        assert_eq!(SemanticType::from_dtype("object"), SemanticType::Text);
        assert_eq!(SemanticType::from_dtype("category"), SemanticType::Categorical);
        assert_eq!(SemanticType::from_dtype("datetime64[ns]"), SemanticType::DateTime);
        assert_eq!(
            SemanticType::from_dtype("datetime64[ns, UTC]"),
            SemanticType::DateTimeTz
        );
        assert_eq!(SemanticType::from_dtype("timedelta64[ns]"), SemanticType::Duration);
        assert_eq!(
            SemanticType::from_dtype("decimal(12, 2)"),
            SemanticType::Decimal {
                precision: 12,
                scale: 2
            }
        );
    }

    #[test]
    fn test_to_field() {
        assert_eq!(Value::Null.to_field(), None);
        assert_eq!(Value::Bool(true).to_field().as_deref(), Some("true"));
        assert_eq!(Value::Int(-7).to_field().as_deref(), Some("-7"));
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Value::Date(date).to_field().as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn test_accepts() {
        assert!(SemanticType::Float.accepts(&Value::Int(1)));
        assert!(SemanticType::Integer.accepts(&Value::Null));
        assert!(!SemanticType::Integer.accepts(&Value::Text("1".into())));
    }
}
