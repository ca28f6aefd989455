//! Parsing edited cell text back into a field value.

#![forbid(unsafe_code)]

use serde_json::Value;

use crate::dates;
use crate::value::{number_to_raw, FieldValue, ValueKind};
use crate::PLACEHOLDER;

/// Rejected edit text. Surfaced to the user as a validation error; the edit is not committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("malformed {kind} input: {reason}")]
    MalformedInput { kind: ValueKind, reason: String },
}

impl EditError {
    fn malformed(kind: ValueKind, reason: impl Into<String>) -> Self {
        EditError::MalformedInput { kind, reason: reason.into() }
    }
}

/// Parse `text` as a value of `kind_hint`.
///
/// The result is the classification of the produced raw value, so a number
/// inside the epoch window comes back date-like and ISO-looking string edits
/// come back as dates.
pub fn parse_edited(kind_hint: ValueKind, text: &str) -> Result<FieldValue, EditError> {
    let raw = match kind_hint {
        ValueKind::Null => infer_untyped(text),
        ValueKind::Boolean => match text.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => return Err(EditError::malformed(kind_hint, format!("expected true or false, got {:?}", other))),
        },
        ValueKind::Number => {
            let trimmed = text.trim();
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => number_to_raw(f),
                _ => return Err(EditError::malformed(kind_hint, format!("not a finite number: {:?}", trimmed))),
            }
        }
        ValueKind::String => Value::String(text.to_string()),
        ValueKind::DateLike => {
            let trimmed = text.trim();
            let iso = dates::parse_date_text(trimmed)
                .and_then(|dt| dates::format_iso(dt.timestamp_millis()))
                .ok_or_else(|| EditError::malformed(kind_hint, format!("not a valid instant: {:?}", trimmed)))?;
            Value::String(iso)
        }
        ValueKind::Array | ValueKind::Map => {
            let v: Value = serde_json::from_str(text).map_err(|e| EditError::malformed(kind_hint, e.to_string()))?;
            let shape_ok = match kind_hint {
                ValueKind::Array => v.is_array(),
                _ => v.is_object(),
            };
            if !shape_ok {
                return Err(EditError::malformed(kind_hint, format!("expected {}, got {}", kind_hint, json_shape(&v))));
            }
            v
        }
    };
    Ok(FieldValue::from_raw(&raw))
}

/// Text typed into a cell that had no value: a JSON literal when it reads as
/// one, otherwise the text itself.
fn infer_untyped(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == PLACEHOLDER {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn json_shape(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
