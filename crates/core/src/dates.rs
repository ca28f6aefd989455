//! Date-like detection and canonicalization.
//!
//! Three source encodings are recognized, checked in this order:
//! - timestamp records exposing `_seconds` or `seconds`
//! - millisecond epoch numbers inside a fixed window
//! - ISO-8601 strings of the form `YYYY-MM-DDTHH:MM:SS[.mmm][Z]`
//!
//! Every encoding converges on a single instant in epoch milliseconds.

#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exclusive lower bound of the epoch window (2000-01-01T00:00:00Z).
pub const EPOCH_MS_MIN: f64 = 946_684_800_000.0;
/// Exclusive upper bound of the epoch window (2100-01-01T00:00:00Z).
pub const EPOCH_MS_MAX: f64 = 4_102_444_800_000.0;

// Largest instant a host date can represent, in either direction.
const MAX_ABS_MS: f64 = 8.64e15;

const SECONDS_KEYS: [&str; 2] = ["_seconds", "seconds"];

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]{3})?Z?$").unwrap());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DateEncoding {
    IsoString,
    EpochMillis,
    TimestampRecord,
}

impl DateEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateEncoding::IsoString => "iso-string",
            DateEncoding::EpochMillis => "epoch-millis",
            DateEncoding::TimestampRecord => "timestamp-record",
        }
    }
}

impl std::fmt::Display for DateEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect which date-like encoding `raw` uses, if any. First match wins.
pub fn detect(raw: &Value) -> Option<DateEncoding> {
    if record_seconds(raw).is_some() {
        Some(DateEncoding::TimestampRecord)
    } else if is_epoch_millis(raw) {
        Some(DateEncoding::EpochMillis)
    } else if raw.as_str().map(is_iso_text).unwrap_or(false) {
        Some(DateEncoding::IsoString)
    } else {
        None
    }
}

/// Seconds field of a timestamp record; `_seconds` is consulted before `seconds`.
fn record_seconds(raw: &Value) -> Option<f64> {
    let obj = raw.as_object()?;
    SECONDS_KEYS.iter().find_map(|k| obj.get(*k).and_then(Value::as_f64))
}

fn is_epoch_millis(raw: &Value) -> bool {
    match raw.as_f64() {
        Some(n) => n > EPOCH_MS_MIN && n < EPOCH_MS_MAX,
        None => false,
    }
}

pub fn is_iso_text(s: &str) -> bool {
    ISO_RE.is_match(s)
}

/// Canonical instant of `raw` under `encoding`, in epoch milliseconds.
/// Nanoseconds of timestamp records are discarded.
pub fn instant_ms(raw: &Value, encoding: DateEncoding) -> Option<i64> {
    let ms = match encoding {
        DateEncoding::TimestampRecord => record_seconds(raw)? * 1000.0,
        DateEncoding::EpochMillis => raw.as_f64()?,
        DateEncoding::IsoString => return parse_iso(raw.as_str()?).map(|dt| dt.timestamp_millis()),
    };
    if !ms.is_finite() || ms.abs() > MAX_ABS_MS {
        return None;
    }
    let ms = ms.trunc() as i64;
    Utc.timestamp_millis_opt(ms).single().map(|_| ms)
}

/// Parse an ISO string of the recognized shape. A missing `Z` reads as UTC.
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if !is_iso_text(s) {
        return None;
    }
    let body = s.strip_suffix('Z').unwrap_or(s);
    let naive = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parse edited date text: the ISO shape above, or any RFC 3339 timestamp with an offset.
pub fn parse_date_text(s: &str) -> Option<DateTime<Utc>> {
    parse_iso(s).or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)))
}

/// Format an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_iso(ms: i64) -> Option<String> {
    let dt = Utc.timestamp_millis_opt(ms).single()?;
    let s = dt.to_rfc3339_opts(SecondsFormat::Millis, true);
    // years outside 0000..=9999 render with a sign and no longer fit the pattern
    if is_iso_text(&s) { Some(s) } else { None }
}

/// Encode `ms` back into `encoding`. Timestamp records keep the key style and
/// any extra fields of `original` when it is a record itself.
pub fn encode(encoding: DateEncoding, ms: i64, original: Option<&Value>) -> Option<Value> {
    match encoding {
        DateEncoding::IsoString => format_iso(ms).map(Value::String),
        DateEncoding::EpochMillis => Some(Value::from(ms)),
        DateEncoding::TimestampRecord => {
            let mut obj = original.and_then(Value::as_object).cloned().unwrap_or_default();
            let (sec_key, nano_key) = if obj.contains_key("_seconds") {
                ("_seconds", "_nanoseconds")
            } else {
                ("seconds", "nanoseconds")
            };
            obj.insert(sec_key.to_string(), Value::from(ms.div_euclid(1000)));
            obj.insert(nano_key.to_string(), Value::from(ms.rem_euclid(1000) * 1_000_000));
            Some(Value::Object(obj))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detection_precedence() {
        assert_eq!(detect(&json!({"seconds": 1700000000})), Some(DateEncoding::TimestampRecord));
        assert_eq!(detect(&json!({"_seconds": 1, "_nanoseconds": 5})), Some(DateEncoding::TimestampRecord));
        assert_eq!(detect(&json!({"seconds": "soon"})), None);
        assert_eq!(detect(&json!(1700000000000u64)), Some(DateEncoding::EpochMillis));
        assert_eq!(detect(&json!("2023-11-14T22:13:20Z")), Some(DateEncoding::IsoString));
        assert_eq!(detect(&json!("2023-11-14T22:13:20.123")), Some(DateEncoding::IsoString));
        assert_eq!(detect(&json!("2023-11-14 22:13:20")), None);
        assert_eq!(detect(&json!("2023-11-14T22:13:20.12Z")), None);
        assert_eq!(detect(&json!(null)), None);
    }

    #[test]
    fn epoch_window_is_exclusive() {
        assert_eq!(detect(&json!(946684800000u64)), None);
        assert_eq!(detect(&json!(946684800001u64)), Some(DateEncoding::EpochMillis));
        assert_eq!(detect(&json!(4102444799999u64)), Some(DateEncoding::EpochMillis));
        assert_eq!(detect(&json!(4102444800000u64)), None);
    }

    #[test]
    fn underscore_seconds_wins_over_plain() {
        let raw = json!({"_seconds": 10, "seconds": 20});
        assert_eq!(instant_ms(&raw, DateEncoding::TimestampRecord), Some(10_000));
    }

    #[test]
    fn nanoseconds_are_discarded() {
        let raw = json!({"seconds": 1700000000, "nanoseconds": 999_000_000});
        assert_eq!(instant_ms(&raw, DateEncoding::TimestampRecord), Some(1_700_000_000_000));
    }

    #[test]
    fn offsetless_iso_reads_as_utc() {
        let a = parse_iso("2023-11-14T22:13:20").map(|d| d.timestamp_millis());
        let b = parse_iso("2023-11-14T22:13:20.000Z").map(|d| d.timestamp_millis());
        assert_eq!(a, Some(1_700_000_000_000));
        assert_eq!(a, b);
    }

    #[test]
    fn impossible_calendar_date_has_no_instant() {
        let raw = json!("2023-13-45T10:00:00Z");
        assert_eq!(detect(&raw), Some(DateEncoding::IsoString));
        assert_eq!(instant_ms(&raw, DateEncoding::IsoString), None);
    }

    #[test]
    fn rfc3339_offsets_normalize_to_utc() {
        let dt = parse_date_text("2023-11-14T23:13:20+01:00").unwrap();
        assert_eq!(format_iso(dt.timestamp_millis()).as_deref(), Some("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn encode_keeps_record_style() {
        let original = json!({"_seconds": 1, "_nanoseconds": 0, "tz": "utc"});
        let out = encode(DateEncoding::TimestampRecord, 1_700_000_000_250, Some(&original)).unwrap();
        assert_eq!(out, json!({"_seconds": 1700000000i64, "_nanoseconds": 250_000_000i64, "tz": "utc"}));
        let out = encode(DateEncoding::TimestampRecord, -1, None).unwrap();
        assert_eq!(out, json!({"seconds": -1, "nanoseconds": 999_000_000i64}));
        assert_eq!(encode(DateEncoding::EpochMillis, 5, None), Some(json!(5)));
    }
}
