//! Response types returned across the chat boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::function_call::FunctionCall;
use crate::usage::RequestUsage;

/// Reason why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of response.
    Stop,
    /// Maximum tokens reached.
    Length,
    /// Model wants to call functions.
    FunctionCall,
    /// Content was filtered.
    ContentFilter,
    /// An error occurred.
    Error,
}

impl FinishReason {
    /// Check if this indicates the response is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Stop | Self::FunctionCall)
    }

    /// Check if this indicates truncation.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Length)
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::FunctionCall => write!(f, "function_call"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One result entry of a chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Result index (providers may return several samples).
    #[serde(default)]
    pub index: usize,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Native function calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ChatResult {
    /// Create a text result that finished normally.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Self::default()
        }
    }

    /// Create a result carrying function calls.
    #[must_use]
    pub fn function_calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            function_calls: calls,
            finish_reason: Some(FinishReason::FunctionCall),
            ..Self::default()
        }
    }

    /// Set the finish reason.
    #[must_use]
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// A complete chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Result entries.
    pub results: Vec<ChatResult>,
    /// Token usage for this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<RequestUsage>,
    /// Name of the model that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Provider-side response id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// When the response was received.
    pub timestamp: DateTime<Utc>,
}

impl ChatResponse {
    /// Create a response with the given results.
    #[must_use]
    pub fn new(results: Vec<ChatResult>) -> Self {
        Self {
            results,
            usage: None,
            model_name: None,
            remote_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a single-result text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![ChatResult::text(content)])
    }

    /// Set the usage.
    #[must_use]
    pub fn with_usage(mut self, usage: RequestUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// First result, if any.
    #[must_use]
    pub fn first(&self) -> Option<&ChatResult> {
        self.results.first()
    }

    /// Content of the first result, or an empty string.
    #[must_use]
    pub fn first_content(&self) -> &str {
        self.first().map(|r| r.content.as_str()).unwrap_or("")
    }
}
