use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::foundset::Foundset;

/// Timestamp layout the Data API uses for dates and timestamps.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Field name to value mapping sent in create, edit and globals requests.
pub type FieldData = BTreeMap<String, FieldValue>;

/// One field value of a [`crate::Record`].
///
/// Values arrive as JSON. Without type conversion strings stay `Text`; with
/// it enabled they are sniffed into `Int`, `Float`, `DateTime` or `Duration`
/// once, when the record is built. Portal fields hold a `Related` foundset.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Json(Value),
    Related(Foundset),
}

impl FieldValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Self::Int(int),
                None => number.as_f64().map_or(Self::Json(Value::Number(number)), Self::Float),
            },
            other => Self::Json(other),
        }
    }

    /// Equality where integers and floats compare by numeric value, so `1` equals `1.0`.
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(int), Self::Float(float)) | (Self::Float(float), Self::Int(int)) => {
                *int as f64 == *float
            }
            _ => self == other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer view; numeric text is parsed, since the Data API often sends ids as strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Self::Duration(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_related(&self) -> Option<&Foundset> {
        match self {
            Self::Related(foundset) => Some(foundset),
            _ => None,
        }
    }

    pub fn is_related(&self) -> bool {
        matches!(self, Self::Related(_))
    }
}

fn format_duration(delta: &TimeDelta) -> String {
    let total = delta.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    format!(
        "{sign}{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::DateTime(value) => write!(f, "{}", value.format(TIMESTAMP_FORMAT)),
            Self::Duration(value) => f.write_str(&format_duration(value)),
            Self::Json(value) => write!(f, "{value}"),
            Self::Related(foundset) => write!(f, "{foundset}"),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::DateTime(_) | Self::Duration(_) => serializer.collect_str(self),
            Self::Json(value) => value.serialize(serializer),
            Self::Related(foundset) => serializer.collect_seq(foundset.iter()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<TimeDelta> for FieldValue {
    fn from(value: TimeDelta) -> Self {
        Self::Duration(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn same_value_int_and_float_expected_numeric_comparison() {
        assert!(FieldValue::Int(1).same_value(&FieldValue::Float(1.0)));
        assert!(FieldValue::Float(2.0).same_value(&FieldValue::Int(2)));
        assert!(!FieldValue::Int(1).same_value(&FieldValue::Float(1.5)));
        assert!(!FieldValue::Int(1).same_value(&FieldValue::from("1")));
    }

    #[test]
    fn from_json_numbers_expected_int_and_float() {
        assert_eq!(FieldValue::from_json(json!(42)), FieldValue::Int(42));
        assert_eq!(FieldValue::from_json(json!(4.5)), FieldValue::Float(4.5));
        assert_eq!(FieldValue::from_json(json!("42")), FieldValue::Text("42".to_string()));
        assert!(FieldValue::from_json(Value::Null).is_null());
    }

    #[test]
    fn as_i64_numeric_text_expected_parsed() {
        assert_eq!(FieldValue::from("17").as_i64(), Some(17));
        assert_eq!(FieldValue::from("no. 17").as_i64(), None);
    }

    #[test]
    fn serialize_datetime_and_duration_expected_data_api_text() {
        let timestamp = NaiveDate::from_ymd_opt(2017, 12, 1)
            .and_then(|date| date.and_hms_opt(20, 45, 30))
            .expect("valid timestamp");
        let duration = TimeDelta::try_seconds(49 * 3600 + 61).expect("valid duration");

        assert_eq!(
            serde_json::to_value(FieldValue::from(timestamp)).expect("serializes"),
            json!("12/01/2017 20:45:30")
        );
        assert_eq!(
            serde_json::to_value(FieldValue::from(duration)).expect("serializes"),
            json!("49:01:01")
        );
    }
}
