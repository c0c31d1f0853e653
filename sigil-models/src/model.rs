//! The `Model` trait: send a chat request, get a response or a delta stream.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigil_core::{ChatDelta, ChatMessage, ChatResponse, ModelSettings};
use sigil_functions::FunctionDefinition;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ModelError;
use crate::profile::ModelProfile;

/// How the model may use the offered functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallMode {
    /// The model decides.
    #[default]
    Auto,
    /// The model must not call functions.
    None,
    /// The model must call at least one function.
    Required,
    /// The model must call this function.
    Specific(String),
}

/// Everything about a request besides the messages and settings.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    /// Functions offered to the model.
    pub functions: Arc<Vec<FunctionDefinition>>,
    /// Function call mode. `None` leaves it to the provider.
    pub function_call: Option<FunctionCallMode>,
    /// JSON schema for providers with native structured output.
    pub output_schema: Option<Value>,
}

impl RequestParameters {
    /// Create empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer functions.
    #[must_use]
    pub fn with_functions(mut self, functions: Vec<FunctionDefinition>) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    /// Set the function call mode.
    #[must_use]
    pub fn with_function_call(mut self, mode: FunctionCallMode) -> Self {
        self.function_call = Some(mode);
        self
    }

    /// Attach an output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Check if any functions are offered.
    #[must_use]
    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }
}

/// A stream of response deltas.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, ModelError>> + Send>>;

/// The abstract chat boundary.
///
/// Implementations wrap a provider; sigil ships only the test doubles in
/// [`mock`](crate::mock).
#[async_trait]
pub trait Model: Send + Sync {
    /// Model name, e.g. `gpt-4o`.
    fn name(&self) -> &str;

    /// Provider name, e.g. `openai`.
    fn system(&self) -> &str;

    /// `provider:model`.
    fn identifier(&self) -> String {
        format!("{}:{}", self.system(), self.name())
    }

    /// Capabilities.
    fn profile(&self) -> &ModelProfile;

    /// Send one request and wait for the whole response.
    async fn request(
        &self,
        messages: &[ChatMessage],
        settings: &ModelSettings,
        params: &RequestParameters,
    ) -> Result<ChatResponse, ModelError>;

    /// Send one request and stream the response.
    ///
    /// Models without streaming support return
    /// [`ModelError::NotSupported`].
    async fn request_stream(
        &self,
        _messages: &[ChatMessage],
        _settings: &ModelSettings,
        _params: &RequestParameters,
    ) -> Result<ChatStream, ModelError> {
        Err(ModelError::not_supported("Streaming"))
    }

    /// Check a capability.
    fn supports(&self, capability: ModelCapability) -> bool {
        let profile = self.profile();
        match capability {
            ModelCapability::Functions => profile.supports_functions,
            ModelCapability::ParallelFunctions => profile.supports_parallel_functions,
            ModelCapability::Streaming => profile.supports_streaming,
            ModelCapability::SystemMessages => profile.supports_system_messages,
            ModelCapability::Images => profile.supports_images,
            ModelCapability::Audio => profile.supports_audio,
        }
    }
}

/// Capabilities queried through [`Model::supports`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelCapability {
    /// Native function calling.
    Functions,
    /// Several function calls per turn.
    ParallelFunctions,
    /// Streamed responses.
    Streaming,
    /// System-role messages.
    SystemMessages,
    /// Image input.
    Images,
    /// Audio input.
    Audio,
}

/// Shared model handle.
pub type BoxedModel = Arc<dyn Model>;
