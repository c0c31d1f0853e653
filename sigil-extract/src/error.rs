//! Extraction failures.

use sigil_signature::Field;
use thiserror::Error;

/// A located segment could not be turned into the field's declared type,
/// or a required field was not produced at all.
///
/// The generator answers this error with a corrective message built from
/// [`ValidationError::fixing_instructions`] and retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value for field '{field}': {message}")]
pub struct ValidationError {
    /// Field name.
    pub field: String,
    /// Field title, as used in the output label.
    pub title: String,
    /// Human description of the expected type.
    pub type_description: String,
    /// The offending raw text, if any was located.
    pub raw_value: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl ValidationError {
    /// Create an error for `field`.
    #[must_use]
    pub fn new(field: &Field, raw_value: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field: field.name.clone(),
            title: field.title.clone(),
            type_description: field.type_description(),
            raw_value: raw_value.map(str::to_string),
            message: message.into(),
        }
    }

    /// The field's label never appeared.
    #[must_use]
    pub fn not_found(field: &Field) -> Self {
        Self::new(field, None, "Required field not found")
    }

    /// The label appeared with an empty value.
    #[must_use]
    pub fn missing(field: &Field, raw_value: &str) -> Self {
        Self::new(field, Some(raw_value), "Required field is missing")
    }

    /// Corrective text for the model.
    ///
    /// ```rust
    /// use sigil_extract::ValidationError;
    /// use sigil_signature::{Field, FieldKind};
    ///
    /// let field = Field::new("score").kind_of(FieldKind::Number);
    /// let err = ValidationError::new(&field, Some("high"), "Invalid number");
    /// assert!(err.fixing_instructions().starts_with(
    ///     "The section labeled 'Score' does not match the expected format of 'number'."
    /// ));
    /// ```
    #[must_use]
    pub fn fixing_instructions(&self) -> String {
        format!(
            "The section labeled '{}' does not match the expected format of '{}'. {} Please revise your response to ensure it conforms to the specified format.",
            self.title,
            self.type_description,
            sentence(&self.message)
        )
    }
}

fn sentence(message: &str) -> String {
    let message = message.trim();
    if message.ends_with(['.', '!', '?']) {
        message.to_string()
    } else {
        format!("{message}.")
    }
}

/// Result type for extraction.
pub type ExtractResult<T> = Result<T, ValidationError>;
