//! Conversion between stored timestamp representations and absolute instants.
//!
//! Stored documents carry timestamps in several shapes: the store-native
//! `{seconds, nanoseconds}` object (also seen as `{_seconds, _nanoseconds}`
//! once exported), epoch milliseconds, and date strings. All of them are
//! converted to `DateTime<Utc>` before comparing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};

/// Converts a stored timestamp value into an instant.
///
/// Returns `None` for absent, null or unparseable values.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos.min(999_999_999) as u32)
                .single()
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::String(s) => parse_date_string(s),
        _ => None,
    }
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Encodes an instant in the store-native timestamp shape.
pub fn to_store_timestamp(instant: DateTime<Utc>) -> Value {
    json!({
        "seconds": instant.timestamp(),
        "nanoseconds": instant.timestamp_subsec_nanos(),
    })
}

/// Store-native timestamp for the current instant.
pub fn store_now() -> Value {
    to_store_timestamp(Utc::now())
}
