//! Field value model and the classifier.
//!
//! `FieldValue::from_raw` inspects a raw value through an ordered set of guards
//! (date-like encodings first, then the plain JSON shapes). The result is total:
//! every raw value maps to exactly one kind.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dates::{self, DateEncoding};
use crate::PLACEHOLDER;

/// Strings longer than this (in characters) open the expanded editor.
pub const INLINE_MAX_CHARS: usize = 50;

// Integral floats below this print without a fractional part.
const INTEGRAL_PRINT_LIMIT: f64 = 1e21;
// Integral floats below this are stored back as JSON integers.
const SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    DateLike,
    Array,
    Map,
}

impl ValueKind {
    pub const ALL: [ValueKind; 7] = [
        ValueKind::Null,
        ValueKind::Boolean,
        ValueKind::Number,
        ValueKind::String,
        ValueKind::DateLike,
        ValueKind::Array,
        ValueKind::Map,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::DateLike => "date",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Map)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(ValueKind::Null),
            "bool" | "boolean" => Ok(ValueKind::Boolean),
            "number" | "num" => Ok(ValueKind::Number),
            "string" | "str" | "text" => Ok(ValueKind::String),
            "date" | "datelike" | "timestamp" => Ok(ValueKind::DateLike),
            "array" | "list" => Ok(ValueKind::Array),
            "map" | "object" => Ok(ValueKind::Map),
            other => Err(format!("unknown value kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Keeps the raw value so the original encoding can be written back untouched.
    DateLike { encoding: DateEncoding, raw: Value },
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn from_raw(raw: &Value) -> Self {
        if let Some(encoding) = dates::detect(raw) {
            return FieldValue::DateLike { encoding, raw: raw.clone() };
        }
        match raw {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => FieldValue::String(n.to_string()),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(items) => FieldValue::Array(items.iter().map(FieldValue::from_raw).collect()),
            Value::Object(map) => {
                FieldValue::Map(map.iter().map(|(k, v)| (k.clone(), FieldValue::from_raw(v))).collect())
            }
        }
    }

    pub fn to_raw(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Number(f) => number_to_raw(*f),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::DateLike { raw, .. } => raw.clone(),
            FieldValue::Array(items) => Value::Array(items.iter().map(FieldValue::to_raw).collect()),
            FieldValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_raw())).collect()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Null => ValueKind::Null,
            FieldValue::Boolean(_) => ValueKind::Boolean,
            FieldValue::Number(_) => ValueKind::Number,
            FieldValue::String(_) => ValueKind::String,
            FieldValue::DateLike { .. } => ValueKind::DateLike,
            FieldValue::Array(_) => ValueKind::Array,
            FieldValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn date_encoding(&self) -> Option<DateEncoding> {
        match self {
            FieldValue::DateLike { encoding, .. } => Some(*encoding),
            _ => None,
        }
    }

    pub fn instant_ms(&self) -> Option<i64> {
        match self {
            FieldValue::DateLike { encoding, raw } => dates::instant_ms(raw, *encoding),
            _ => None,
        }
    }

    pub fn needs_expanded_editor(&self) -> bool {
        match self {
            FieldValue::Array(_) | FieldValue::Map(_) => true,
            FieldValue::String(s) => s.contains(|c: char| c == '\n' || c == '\r') || s.chars().count() > INLINE_MAX_CHARS,
            FieldValue::Null | FieldValue::Boolean(_) | FieldValue::Number(_) | FieldValue::DateLike { .. } => false,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Null => PLACEHOLDER.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Number(f) => format_number(*f),
            FieldValue::String(s) => s.clone(),
            FieldValue::DateLike { raw, .. } => match self.instant_ms().and_then(dates::format_iso) {
                Some(iso) => iso,
                None => plain_text(raw),
            },
            FieldValue::Array(_) | FieldValue::Map(_) => self.to_raw().to_string(),
        }
    }

    pub fn edit_text(&self) -> String {
        match self {
            FieldValue::Array(_) | FieldValue::Map(_) => format!("{:#}", self.to_raw()),
            _ => self.display_text(),
        }
    }

    /// Structural equality for arrays and maps, instant equality for dates.
    pub fn semantic_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::DateLike { raw: a, .. }, FieldValue::DateLike { raw: b, .. }) => {
                match (self.instant_ms(), other.instant_ms()) {
                    (Some(x), Some(y)) => x == y,
                    _ => a == b,
                }
            }
            (FieldValue::Array(a), FieldValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantic_eq(y))
            }
            (FieldValue::Map(a), FieldValue::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.semantic_eq(vb))
            }
            _ => self == other,
        }
    }

    pub fn classification(&self) -> Classification {
        Classification {
            kind: self.kind(),
            date_encoding: self.date_encoding(),
            instant_ms: self.instant_ms(),
            needs_expanded_editor: self.needs_expanded_editor(),
            display_text: self.display_text(),
            edit_text: self.edit_text(),
        }
    }
}

/// Read-only view of a field value, recomputed for every render or edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_encoding: Option<DateEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant_ms: Option<i64>,
    pub needs_expanded_editor: bool,
    pub display_text: String,
    pub edit_text: String,
}

pub fn classify(raw: &Value) -> Classification {
    FieldValue::from_raw(raw).classification()
}

/// Kind of `raw` without building the full value tree.
pub fn kind_of(raw: &Value) -> ValueKind {
    if dates::detect(raw).is_some() {
        return ValueKind::DateLike;
    }
    match raw {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(n) if n.as_f64().is_some() => ValueKind::Number,
        Value::Number(_) | Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Map,
    }
}

/// A missing field classifies exactly like an explicit null.
pub fn classify_field(raw: Option<&Value>) -> Classification {
    match raw {
        Some(v) => classify(v),
        None => FieldValue::Null.classification(),
    }
}

pub(crate) fn number_to_raw(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < SAFE_INTEGER {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Locale-independent decimal text; integral values print without `.0`.
pub fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < INTEGRAL_PRINT_LIMIT {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}

fn plain_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_for_plain_shapes() {
        assert_eq!(classify(&json!(null)).kind, ValueKind::Null);
        assert_eq!(classify(&json!(true)).kind, ValueKind::Boolean);
        assert_eq!(classify(&json!(42)).kind, ValueKind::Number);
        assert_eq!(classify(&json!("hi")).kind, ValueKind::String);
        assert_eq!(classify(&json!([1])).kind, ValueKind::Array);
        assert_eq!(classify(&json!({"a": 1})).kind, ValueKind::Map);
    }

    #[test]
    fn number_text_is_plain_decimal() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-3.5), "-3.5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(classify(&json!(12.0)).display_text, "12");
    }

    #[test]
    fn null_and_missing_render_placeholder() {
        assert_eq!(classify(&json!(null)).display_text, PLACEHOLDER);
        assert_eq!(classify_field(None), classify(&json!(null)));
    }

    #[test]
    fn structured_values_render_compact_and_pretty() {
        let c = classify(&json!({"b": [1, 2], "a": "x"}));
        assert_eq!(c.display_text, r#"{"a":"x","b":[1,2]}"#);
        assert_eq!(c.edit_text, "{\n  \"a\": \"x\",\n  \"b\": [\n    1,\n    2\n  ]\n}");
        assert!(c.needs_expanded_editor);
    }

    #[test]
    fn nested_dates_keep_their_raw_encoding() {
        let raw = json!({"at": {"seconds": 1700000000}, "n": 1700000000000u64});
        let fv = FieldValue::from_raw(&raw);
        assert_eq!(fv.to_raw(), raw);
        match &fv {
            FieldValue::Map(m) => {
                assert_eq!(m["at"].date_encoding(), Some(DateEncoding::TimestampRecord));
                assert_eq!(m["n"].date_encoding(), Some(DateEncoding::EpochMillis));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn string_line_breaks_and_length() {
        assert!(FieldValue::String("a\nb".into()).needs_expanded_editor());
        assert!(FieldValue::String("a\r".into()).needs_expanded_editor());
        assert!(!FieldValue::String("x".repeat(50)).needs_expanded_editor());
        assert!(FieldValue::String("x".repeat(51)).needs_expanded_editor());
        // counted in characters, not bytes
        assert!(!FieldValue::String("é".repeat(50)).needs_expanded_editor());
    }

    #[test]
    fn date_without_instant_falls_back_to_raw_text() {
        let c = classify(&json!("2023-13-45T10:00:00Z"));
        assert_eq!(c.kind, ValueKind::DateLike);
        assert_eq!(c.instant_ms, None);
        assert_eq!(c.display_text, "2023-13-45T10:00:00Z");
        assert_eq!(c.edit_text, c.display_text);
    }

    #[test]
    fn kind_of_agrees_with_full_classification() {
        for raw in [json!(null), json!(1), json!(1700000000000u64), json!("x"), json!([{}]), json!({"seconds": 1}), json!({"k": 1})] {
            assert_eq!(kind_of(&raw), classify(&raw).kind, "{}", raw);
        }
    }

    #[test]
    fn kind_names_parse() {
        assert_eq!("Array".parse::<ValueKind>(), Ok(ValueKind::Array));
        assert_eq!("object".parse::<ValueKind>(), Ok(ValueKind::Map));
        assert_eq!("date".parse::<ValueKind>(), Ok(ValueKind::DateLike));
        assert!("blob".parse::<ValueKind>().is_err());
    }
}
