//! Error types shared across sigil crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of usage limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLimitType {
    /// Request tokens limit.
    RequestTokens,
    /// Response tokens limit.
    ResponseTokens,
    /// Total tokens limit.
    TotalTokens,
    /// Number of requests limit.
    Requests,
}

impl fmt::Display for UsageLimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestTokens => write!(f, "request_tokens"),
            Self::ResponseTokens => write!(f, "response_tokens"),
            Self::TotalTokens => write!(f, "total_tokens"),
            Self::Requests => write!(f, "requests"),
        }
    }
}

/// Usage limits exceeded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Usage limit exceeded: {limit_type} is {current} but max is {max}")]
pub struct UsageLimitExceeded {
    /// Type of limit exceeded.
    pub limit_type: UsageLimitType,
    /// Current value.
    pub current: u64,
    /// Maximum allowed value.
    pub max: u64,
}

impl UsageLimitExceeded {
    /// Create a new usage limit error.
    #[must_use]
    pub fn new(limit_type: UsageLimitType, current: u64, max: u64) -> Self {
        Self {
            limit_type,
            current,
            max,
        }
    }
}

/// Errors raised by [`Memory`](crate::memory::Memory) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The tag was never applied in this session.
    #[error("Tag not found: {0}")]
    TagNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_limit_display() {
        let err = UsageLimitExceeded::new(UsageLimitType::TotalTokens, 150, 100);
        assert_eq!(
            err.to_string(),
            "Usage limit exceeded: total_tokens is 150 but max is 100"
        );
    }

    #[test]
    fn test_memory_error_display() {
        assert_eq!(
            MemoryError::TagNotFound("correction".into()).to_string(),
            "Tag not found: correction"
        );
    }
}
