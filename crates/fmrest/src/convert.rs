//! Best-effort type sniffing for string field values.
//!
//! Older Data API versions only returned strings. When type conversion is
//! enabled on a server, each string value is tried as integer, float, a
//! date/time/timestamp and finally an `H:M:S` duration before falling back
//! to text. Values that parse as a clock time without a date (anything
//! without a `/`) become durations, since the Data API always writes dates
//! with slashes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::value::FieldValue;

const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Converts a string into its guessed original type.
pub fn convert_string_type(value: &str) -> FieldValue {
    let trimmed = value.trim();

    if let Ok(int) = trimmed.parse::<i64>() {
        return FieldValue::Int(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return FieldValue::Float(float);
    }

    if let Some(parsed) = parse_datetime(trimmed) {
        if !value.contains('/') {
            return clock_duration(parsed.time())
                .map_or_else(|| FieldValue::Text(value.to_string()), FieldValue::Duration);
        }
        return FieldValue::DateTime(parsed);
    }

    // Calendar parsing rejects hours >= 24, so durations like 48:61:01 land here.
    if let Some(duration) = parse_hms_duration(value) {
        return FieldValue::Duration(duration);
    }

    FieldValue::Text(value.to_string())
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    let today = chrono::Local::now().date_naive();
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(value, format) {
            return Some(today.and_time(time));
        }
    }
    None
}

fn clock_duration(time: NaiveTime) -> Option<TimeDelta> {
    let seconds = i64::from(time.hour()) * 3600 + i64::from(time.minute()) * 60 + i64::from(time.second());
    TimeDelta::try_seconds(seconds)
}

fn parse_hms_duration(value: &str) -> Option<TimeDelta> {
    let parts: Vec<&str> = value.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    let hours = hours.trim().parse::<i64>().ok()?;
    let minutes = minutes.trim().parse::<i64>().ok()?;
    let seconds = seconds.trim().parse::<i64>().ok()?;

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    TimeDelta::try_seconds(total)
}
