//! Turning a raw text segment into a typed JSON value.

use serde_json::{Number, Value};
use sigil_core::json::parse_lenient;
use sigil_signature::{Field, FieldKind};

use crate::datetime::{format_date, format_datetime, parse_date, parse_datetime};
use crate::error::{ExtractResult, ValidationError};
use crate::markdown::{extract_block, parse_markdown_list, strip_code_fence};

/// Placeholder texts models use for "no value".
const EMPTY_MARKERS: &[&str] = &["", "null", "NULL", "undefined"];

/// Whether a trimmed segment counts as absent.
#[must_use]
pub fn is_empty_value(raw: &str) -> bool {
    EMPTY_MARKERS.contains(&raw.trim())
}

/// Coerce the raw segment located for `field`.
///
/// Returns `Ok(None)` when the segment is empty and the field is optional
/// or `require` is off. An empty segment on a required field is an error.
pub fn coerce_segment(field: &Field, raw: &str, require: bool) -> ExtractResult<Option<Value>> {
    let trimmed = raw.trim();
    if is_empty_value(trimmed) {
        if field.is_optional || !require {
            return Ok(None);
        }
        return Err(ValidationError::missing(field, trimmed));
    }

    let fail = |message: String| ValidationError::new(field, Some(trimmed), message);

    if field.kind() == FieldKind::Json {
        let value = parse_lenient(extract_block(trimmed))
            .map_err(|e| fail(format!("Invalid JSON: {e}")))?;
        if field.is_array() && !value.is_array() {
            return Err(fail("Invalid array: Expected an array".into()));
        }
        return Ok(Some(value));
    }

    if field.is_array() {
        let items = parse_array(trimmed).map_err(|e| fail(format!("Invalid array: {e}")))?;
        let coerced = items
            .iter()
            .map(|item| coerce_item(field, item))
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)?;
        return Ok(Some(Value::Array(coerced)));
    }

    coerce_text(field, trimmed).map(Some).map_err(fail)
}

fn parse_array(text: &str) -> Result<Vec<Value>, String> {
    let body = extract_block(text);
    match parse_lenient(body) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err("Expected an array".into()),
        Err(json_err) => parse_markdown_list(body)
            .map(|items| items.into_iter().map(Value::String).collect())
            .map_err(|_| json_err.to_string()),
    }
}

fn coerce_item(field: &Field, item: &Value) -> Result<Value, String> {
    match (field.kind(), item) {
        (_, Value::String(s)) => coerce_text(field, s.trim()),
        (FieldKind::String | FieldKind::Code, other) => Ok(Value::String(other.to_string())),
        (FieldKind::Number, Value::Number(_)) | (FieldKind::Boolean, Value::Bool(_)) => {
            Ok(item.clone())
        }
        (kind, other) => Err(format!("Expected {kind} item, got {other}")),
    }
}

/// Convert a scalar text value to the field's element type.
pub fn coerce_text(field: &Field, text: &str) -> Result<Value, String> {
    match field.kind() {
        FieldKind::String | FieldKind::Image | FieldKind::Audio => Ok(Value::String(text.into())),
        FieldKind::Code => Ok(Value::String(strip_code_fence(text).to_string())),
        FieldKind::Number => parse_number(text).ok_or_else(|| "Invalid number".to_string()),
        FieldKind::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("Invalid boolean".into()),
        },
        FieldKind::Json => parse_lenient(text).map_err(|e| format!("Invalid JSON: {e}")),
        FieldKind::Date => parse_date(text).map(|d| Value::String(format_date(d))),
        FieldKind::DateTime => parse_datetime(text).map(|d| Value::String(format_datetime(d))),
        FieldKind::Class => {
            let options = field.options();
            if options.iter().any(|o| o == text) {
                Ok(Value::String(text.into()))
            } else {
                Err(format!(
                    "Invalid class '{text}', expected one of the following: {}",
                    options.join(", ")
                ))
            }
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f: f64 = text.parse().ok()?;
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}
