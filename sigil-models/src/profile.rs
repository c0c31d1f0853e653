//! What a model can do.

use serde::{Deserialize, Serialize};

/// Model capabilities that change how a generator talks to it.
///
/// The one a generator cares about most is
/// [`supports_functions`](Self::supports_functions): without native function
/// calling, functions are requested through text-mode output fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Structured function calling.
    pub supports_functions: bool,
    /// Several function calls in one turn.
    pub supports_parallel_functions: bool,
    /// Streamed responses.
    pub supports_streaming: bool,
    /// System-role messages.
    pub supports_system_messages: bool,
    /// Image content parts.
    pub supports_images: bool,
    /// Audio content parts.
    pub supports_audio: bool,
    /// Default response token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Context window size in tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            supports_functions: true,
            supports_parallel_functions: true,
            supports_streaming: true,
            supports_system_messages: true,
            supports_images: false,
            supports_audio: false,
            max_tokens: None,
            context_window: None,
        }
    }
}

impl ModelProfile {
    /// Create a profile with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A text-only completion model: no native functions, no media.
    #[must_use]
    pub fn text_only() -> Self {
        Self {
            supports_functions: false,
            supports_parallel_functions: false,
            ..Self::default()
        }
    }

    /// Set native function support.
    #[must_use]
    pub fn with_functions(mut self, supported: bool) -> Self {
        self.supports_functions = supported;
        if !supported {
            self.supports_parallel_functions = false;
        }
        self
    }

    /// Set parallel function support.
    #[must_use]
    pub fn with_parallel_functions(mut self, supported: bool) -> Self {
        self.supports_parallel_functions = supported;
        self
    }

    /// Set streaming support.
    #[must_use]
    pub fn with_streaming(mut self, supported: bool) -> Self {
        self.supports_streaming = supported;
        self
    }

    /// Set system message support.
    #[must_use]
    pub fn with_system_messages(mut self, supported: bool) -> Self {
        self.supports_system_messages = supported;
        self
    }

    /// Set image input support.
    #[must_use]
    pub fn with_images(mut self, supported: bool) -> Self {
        self.supports_images = supported;
        self
    }

    /// Set audio input support.
    #[must_use]
    pub fn with_audio(mut self, supported: bool) -> Self {
        self.supports_audio = supported;
        self
    }

    /// Set the default response token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Set the context window.
    #[must_use]
    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window = Some(tokens);
        self
    }
}
