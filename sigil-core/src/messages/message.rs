//! Role-tagged chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::function_call::FunctionCall;

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Instructions for the model.
    System,
    /// Caller input, including corrective feedback.
    User,
    /// Model output.
    Assistant,
    /// Result of a function call.
    Function,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// One part of a multi-modal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 image data.
    Image {
        /// MIME type, e.g. `image/png`.
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    /// Base64 audio data.
    Audio {
        /// Audio container format, e.g. `wav`.
        format: String,
        /// Base64-encoded payload.
        data: String,
    },
}

impl ContentPart {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this is a text part.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// Message content: either plain text or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Multi-modal content.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to text. Media parts are shown as `[IMAGE]` / `[AUDIO]`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.as_str(),
                    ContentPart::Image { .. } => "[IMAGE]",
                    ContentPart::Audio { .. } => "[AUDIO]",
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Check if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.is_empty(),
            Self::Parts(p) => p.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: ChatRole,
    /// Message content.
    pub content: MessageContent,
    /// Function calls requested by the assistant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    /// Id of the call a function-role message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message with the given role and content.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            function_calls: Vec::new(),
            function_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Create a function result message answering the call `function_id`.
    #[must_use]
    pub fn function_result(function_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            function_id: Some(function_id.into()),
            ..Self::new(ChatRole::Function, result.into())
        }
    }

    /// Attach function calls.
    #[must_use]
    pub fn with_function_calls(mut self, calls: Vec<FunctionCall>) -> Self {
        self.function_calls = calls;
        self
    }

    /// Get the content as text.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.to_text()
    }

    /// Whether the assistant requested function calls.
    #[must_use]
    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);

        let f = ChatMessage::function_result("call_1", "{}");
        assert_eq!(f.role, ChatRole::Function);
        assert_eq!(f.function_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_parts_to_text() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("Photo:"),
            ContentPart::Image {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            },
        ]);
        assert_eq!(content.to_text(), "Photo:\n[IMAGE]");
    }

    #[test]
    fn test_role_serde() {
        let value = serde_json::to_value(ChatRole::Function).unwrap();
        assert_eq!(value, json!("function"));
    }

    #[test]
    fn test_content_part_tagging() {
        let value = serde_json::to_value(ContentPart::text("hi")).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hi"}));
    }
}
