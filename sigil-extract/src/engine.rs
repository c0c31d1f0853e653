//! One-shot extraction over a complete response.

use sigil_signature::Field;

use crate::error::ExtractResult;
use crate::stream::{StreamExtractor, Values};

/// Extract every output field from a complete response text.
///
/// Missing or malformed required fields are reported as a
/// [`ValidationError`](crate::ValidationError) naming the first offending
/// field in text order. Absent optional fields have no entry.
///
/// # Example
///
/// ```rust
/// use sigil_extract::extract_values;
/// use sigil_signature::{Field, FieldKind};
///
/// let fields = [
///     Field::new("a").kind_of(FieldKind::String),
///     Field::new("b").kind_of(FieldKind::Number),
/// ];
/// let values = extract_values(&fields, "A: hello\nB: 42\n").unwrap();
/// assert_eq!(values["a"], "hello");
/// assert_eq!(values["b"], 42);
/// ```
pub fn extract_values(fields: &[Field], content: &str) -> ExtractResult<Values> {
    let mut extractor = StreamExtractor::new(fields.to_vec());
    extractor.push(content)?;
    extractor.finish()?;
    Ok(extractor.into_values())
}

/// Like [`extract_values`] but without the required-field checks.
///
/// Type errors in located segments are still reported.
pub fn extract_values_lenient(fields: &[Field], content: &str) -> ExtractResult<Values> {
    let mut extractor = StreamExtractor::lenient(fields.to_vec());
    extractor.push(content)?;
    extractor.finish()?;
    Ok(extractor.into_values())
}
