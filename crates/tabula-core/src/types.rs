use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Base type of a field: a semantic type, or a backend-specific native type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    /// Opaque backend type (e.g. `VARCHAR(254)`), passed through untouched.
    Native(String),
    Boolean,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Text,
    Date,
    Time,
    DateTime,
    DateTimeWithTz,
    Uuid,
    Json,
}

impl BaseType {
    /// True for the native escape hatch.
    pub fn is_native(&self) -> bool {
        matches!(self, BaseType::Native(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            BaseType::Date | BaseType::Time | BaseType::DateTime | BaseType::DateTimeWithTz
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            BaseType::Integer | BaseType::BigInteger | BaseType::Float | BaseType::Decimal
        )
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Native(native) => write!(f, "native({native})"),
            BaseType::Boolean => f.write_str("boolean"),
            BaseType::Integer => f.write_str("integer"),
            BaseType::BigInteger => f.write_str("big_integer"),
            BaseType::Float => f.write_str("float"),
            BaseType::Decimal => f.write_str("decimal"),
            BaseType::Text => f.write_str("text"),
            BaseType::Date => f.write_str("date"),
            BaseType::Time => f.write_str("time"),
            BaseType::DateTime => f.write_str("date_time"),
            BaseType::DateTimeWithTz => f.write_str("date_time_with_tz"),
            BaseType::Uuid => f.write_str("uuid"),
            BaseType::Json => f.write_str("json"),
        }
    }
}

/// Semantic tag describing what a field represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpecialType {
    Pk,
    Fk,
    Category,
    Name,
    Title,
    Description,
    Currency,
    Quantity,
    Score,
    Number,
    Latitude,
    Longitude,
    City,
    State,
    Country,
    ZipCode,
    Email,
    Url,
    ImageUrl,
    CreationTimestamp,
    UnixTimestampSeconds,
    UnixTimestampMilliseconds,
}

/// Visibility classification of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityType {
    Normal,
    DetailsOnly,
    Sensitive,
    Hidden,
    Retired,
}

/// A single cell of a fixture row.
///
/// Resources deserialize untagged: strings that parse as timestamps, dates or
/// times become the temporal variants, everything else stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S")),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Time(value) => write!(f, "{}", value.format("%H:%M:%S")),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
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

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_prefer_temporal_parses() {
        let values: Vec<Value> =
            serde_json::from_str(r#"[null, true, 7, 1.5, "2014-04-07", "toys"]"#)
                .expect("parse values");
        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Bool(true));
        assert_eq!(values[2], Value::Int(7));
        assert_eq!(values[3], Value::Float(1.5));
        assert!(matches!(values[4], Value::Date(_)));
        assert_eq!(values[5], Value::Text("toys".to_string()));
    }

    #[test]
    fn native_base_type_uses_tagged_shape() {
        let native: BaseType =
            serde_json::from_str(r#"{"native": "VARCHAR(254)"}"#).expect("parse native");
        assert_eq!(native, BaseType::Native("VARCHAR(254)".to_string()));
        let integer: BaseType = serde_json::from_str(r#""integer""#).expect("parse integer");
        assert_eq!(integer, BaseType::Integer);
    }
}
