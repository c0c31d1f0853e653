//! Generator error types.
//!
//! Only [`RetryCause`]s are recovered inside the loop; everything in
//! [`GenerateError`] reaches the caller.

use sigil_core::UsageLimitExceeded;
use sigil_extract::ValidationError;
use sigil_functions::FunctionError;
use sigil_models::ModelError;
use sigil_signature::SignatureError;
use thiserror::Error;

use crate::assertion::AssertionError;
use crate::prompt::PromptError;

/// Why an attempt was retried.
#[derive(Debug, Clone, Error)]
pub enum RetryCause {
    /// The output did not match the output fields.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An assertion rejected the extracted values.
    #[error(transparent)]
    Assertion(#[from] AssertionError),

    /// The response stream broke off with a retryable error.
    #[error("Response stream interrupted: {0}")]
    Interrupted(String),
}

impl RetryCause {
    /// Corrective message for the model, if this cause has one.
    ///
    /// An interrupted stream is retried silently.
    #[must_use]
    pub fn correction(&self, output_fields: &[sigil_signature::Field]) -> Option<String> {
        match self {
            Self::Validation(e) => Some(e.fixing_instructions()),
            Self::Assertion(e) => Some(e.correction(output_fields)),
            Self::Interrupted(_) => None,
        }
    }
}

/// Errors returned by [`Generator::forward`](crate::Generator::forward).
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The signature is invalid.
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    /// The prompt could not be rendered from the inputs.
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// The model request failed.
    #[error("Model error: {0}")]
    Model(ModelError),

    /// A function call failed.
    #[error("Function error: {0}")]
    Function(FunctionError),

    /// A field processor failed.
    #[error("Field processor for '{field}' failed: {source}")]
    Processor {
        /// Output field the processor was attached to.
        field: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// The model stopped at its token limit.
    #[error("Max tokens reached before the response was complete")]
    LengthExceeded {
        /// The configured token cap, if any.
        max_tokens: Option<u64>,
    },

    /// The provider blocked the response.
    #[error("Response was blocked by the provider's content filter")]
    ContentFiltered,

    /// The run was cancelled.
    #[error("Generation aborted")]
    Aborted,

    /// Corrective retries in one step ran out.
    #[error("Unable to fix validation error after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Total attempts made in the failing step.
        attempts: usize,
        /// What the last attempt failed with.
        last_error: RetryCause,
    },

    /// Every step was used up by function turns.
    #[error("Max steps reached: {max_steps}")]
    StepsExhausted {
        /// The configured step limit.
        max_steps: usize,
    },

    /// A usage limit was hit.
    #[error(transparent)]
    UsageLimitExceeded(#[from] UsageLimitExceeded),

    /// Another run is using the session.
    #[error("Session '{session}' already has a generation in flight")]
    SessionBusy {
        /// Session id.
        session: String,
    },
}

impl From<ModelError> for GenerateError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Cancelled => Self::Aborted,
            other => Self::Model(other),
        }
    }
}

impl From<FunctionError> for GenerateError {
    fn from(err: FunctionError) -> Self {
        if err.is_aborted() {
            Self::Aborted
        } else {
            Self::Function(err)
        }
    }
}

impl GenerateError {
    /// Create a processor error.
    pub fn processor(field: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Processor {
            field: field.into(),
            source,
        }
    }

    /// Check if the run was cancelled.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// The last retry cause, for [`RetriesExhausted`](Self::RetriesExhausted).
    #[must_use]
    pub fn retry_cause(&self) -> Option<&RetryCause> {
        match self {
            Self::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

/// Result type for generation.
pub type GenerateResult<T> = Result<T, GenerateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_signature::Field;

    #[test]
    fn test_cancellation_maps_to_aborted() {
        assert!(GenerateError::from(ModelError::Cancelled).is_aborted());
        assert!(GenerateError::from(FunctionError::Aborted).is_aborted());
        assert!(matches!(
            GenerateError::from(FunctionError::not_found("nope")),
            GenerateError::Function(FunctionError::NotFound(_))
        ));
    }

    #[test]
    fn test_retries_exhausted_display() {
        let field = Field::new("answer");
        let err = GenerateError::RetriesExhausted {
            attempts: 3,
            last_error: ValidationError::not_found(&field).into(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to fix validation error after 3 attempts: Invalid value for field 'answer': Required field not found"
        );
        assert!(matches!(err.retry_cause(), Some(RetryCause::Validation(_))));
    }

    #[test]
    fn test_interrupted_has_no_correction() {
        let cause = RetryCause::Interrupted("connection reset".into());
        assert_eq!(cause.correction(&[]), None);
    }
}
