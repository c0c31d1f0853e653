//! Signature compile errors.

use thiserror::Error;

/// Errors raised while compiling or mutating a signature.
///
/// These are caller configuration problems and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The DSL text could not be parsed.
    #[error("{message}\nNear position {position}:\n{context}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset of the failure.
        position: usize,
        /// Snippet around the failure with a `^` marker line.
        context: String,
    },

    /// A single field violates a rule.
    #[error("{message} (field '{field}'). {suggestion}")]
    InvalidField {
        /// Offending field name.
        field: String,
        /// What went wrong.
        message: String,
        /// How to fix it.
        suggestion: String,
    },

    /// The signature as a whole is invalid.
    #[error("{message}. {suggestion}")]
    Invalid {
        /// What went wrong.
        message: String,
        /// How to fix it.
        suggestion: String,
    },
}

impl SignatureError {
    /// Create a field error.
    #[must_use]
    pub fn field(
        field: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a signature-level error.
    #[must_use]
    pub fn invalid(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Name of the offending field, if the error is about one field.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Suggested fix, if any.
    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidField { suggestion, .. } | Self::Invalid { suggestion, .. } => {
                Some(suggestion)
            }
            Self::Parse { .. } => None,
        }
    }
}

/// Result alias for signature operations.
pub type SignatureResult<T> = Result<T, SignatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_accessors() {
        let err = SignatureError::field("x", "Field name 'x' is too short", "Use 2+ chars");
        assert_eq!(err.field_name(), Some("x"));
        assert_eq!(err.suggestion(), Some("Use 2+ chars"));
        assert_eq!(
            err.to_string(),
            "Field name 'x' is too short (field 'x'). Use 2+ chars"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = SignatureError::Parse {
            message: "Expected \"->\"".into(),
            position: 4,
            context: "a b\n    ^".into(),
        };
        assert!(err.to_string().starts_with("Expected \"->\"\nNear position 4:"));
        assert_eq!(err.suggestion(), None);
    }
}
