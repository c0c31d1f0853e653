//! Function call errors.
//!
//! Every variant is fatal to a generator run: a missing handler or a failing
//! handler is a caller problem, not something the model can repair.

use thiserror::Error;

/// Errors raised while defining, registering or executing functions.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// No handler is registered under the requested name.
    #[error("Function not found: {0}")]
    NotFound(String),

    /// The handler ran and failed.
    #[error("Function '{name}' failed: {message}")]
    ExecutionFailed {
        /// Function name. Empty until the orchestrator attaches it.
        name: String,
        /// Failure message.
        message: String,
    },

    /// Arguments could not be parsed or were rejected by the handler.
    #[error("Invalid arguments for function '{name}': {message}")]
    InvalidArguments {
        /// Function name.
        name: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// The definition itself is malformed.
    #[error("Invalid function definition '{name}': {message}")]
    InvalidDefinition {
        /// Function name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// The run was cancelled before or during the call.
    #[error("Function call aborted")]
    Aborted,

    /// Opaque handler failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FunctionError {
    /// Create an execution failure from inside a handler.
    ///
    /// The orchestrator fills in the function name.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: String::new(),
            message: message.into(),
        }
    }

    /// Create an invalid-arguments error from inside a handler.
    #[must_use]
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: String::new(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Check whether the error came from cancellation.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Attribute a handler error to `function`.
    ///
    /// Opaque errors become [`FunctionError::ExecutionFailed`].
    #[must_use]
    pub fn in_function(self, function: &str) -> Self {
        match self {
            Self::ExecutionFailed { name, message } if name.is_empty() => Self::ExecutionFailed {
                name: function.to_string(),
                message,
            },
            Self::InvalidArguments { name, message } if name.is_empty() => {
                Self::InvalidArguments {
                    name: function.to_string(),
                    message,
                }
            }
            Self::Other(err) => Self::ExecutionFailed {
                name: function.to_string(),
                message: format!("{err:#}"),
            },
            other => other,
        }
    }
}

/// Result type for function operations.
pub type FunctionResult<T> = Result<T, FunctionError>;
