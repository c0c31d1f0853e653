//! Streaming deltas and their accumulation.

use serde::{Deserialize, Serialize};

use super::function_call::{FunctionCall, FunctionCallArgs};
use super::response::{ChatResponse, ChatResult, FinishReason};
use crate::identifier::generate_function_call_id;
use crate::usage::RequestUsage;

/// Incremental piece of a function call.
///
/// Providers stream function calls as an id and name followed by argument
/// fragments, all keyed by `index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Position of the call within the result.
    pub index: usize,
    /// Call id, usually only on the first fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name, usually only on the first fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument text fragment.
    #[serde(default)]
    pub args_delta: String,
}

/// One event of a streamed chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    /// Result index the delta belongs to.
    #[serde(default)]
    pub index: usize,
    /// Content text fragment.
    #[serde(default)]
    pub content: String,
    /// Function call fragments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCallDelta>,
    /// Set on the final delta of a result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Usage, usually only on the last delta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<RequestUsage>,
    /// Model name reported by the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl ChatDelta {
    /// Create a content delta.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a terminal delta with a finish reason.
    #[must_use]
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }

    /// Attach usage.
    #[must_use]
    pub fn with_usage(mut self, usage: RequestUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    args: String,
}

/// Folds a sequence of [`ChatDelta`]s for result 0 into a [`ChatResponse`].
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    content: String,
    calls: Vec<PendingCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<RequestUsage>,
    model_name: Option<String>,
}

impl DeltaAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta in. Deltas for other result indexes are ignored.
    pub fn push(&mut self, delta: &ChatDelta) {
        if delta.index != 0 {
            return;
        }
        self.content.push_str(&delta.content);
        for fc in &delta.function_calls {
            while self.calls.len() <= fc.index {
                self.calls.push(PendingCall::default());
            }
            let call = &mut self.calls[fc.index];
            if fc.id.is_some() {
                call.id.clone_from(&fc.id);
            }
            if let Some(name) = &fc.name {
                call.name.push_str(name);
            }
            call.args.push_str(&fc.args_delta);
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
        if let Some(usage) = &delta.usage {
            self.usage.get_or_insert_with(RequestUsage::new).merge(usage);
        }
        if delta.model_name.is_some() {
            self.model_name.clone_from(&delta.model_name);
        }
    }

    /// Content received so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Finish reason, once seen.
    #[must_use]
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Build the final response.
    #[must_use]
    pub fn into_response(self) -> ChatResponse {
        let function_calls = self
            .calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| FunctionCall {
                id: c.id.unwrap_or_else(generate_function_call_id),
                name: c.name,
                args: FunctionCallArgs::String(c.args),
            })
            .collect();

        let mut response = ChatResponse::new(vec![ChatResult {
            index: 0,
            content: self.content,
            function_calls,
            finish_reason: self.finish_reason,
        }]);
        response.usage = self.usage;
        response.model_name = self.model_name;
        response
    }
}
