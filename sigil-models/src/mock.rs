//! Test doubles for the chat boundary.
//!
//! - [`MockModel`]: replays a script of responses and errors, recording
//!   every request it receives
//! - [`FunctionModel`]: answers through a closure that sees the messages
//!
//! Both stream by cutting the response they would have returned into
//! fixed-size text chunks followed by a final delta carrying the finish
//! reason, usage and any function calls.
//!
//! ```rust
//! use sigil_core::{ChatMessage, ModelSettings};
//! use sigil_models::{MockModel, Model, RequestParameters};
//!
//! # tokio_test::block_on(async {
//! let model = MockModel::new("test-model")
//!     .with_text_response("Answer: 4")
//!     .with_text_response("Answer: 5");
//!
//! let messages = [ChatMessage::user("2 + 2?")];
//! let response = model
//!     .request(&messages, &ModelSettings::new(), &RequestParameters::new())
//!     .await
//!     .unwrap();
//! assert_eq!(response.first_content(), "Answer: 4");
//! assert_eq!(model.request_count(), 1);
//! # });
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use sigil_core::{
    ChatDelta, ChatMessage, ChatResponse, ChatResult, FunctionCall, FunctionCallDelta,
    ModelSettings, RequestUsage,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::{ChatStream, Model, RequestParameters};
use crate::profile::ModelProfile;

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::debug;

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug { ($($arg:tt)*) => {} }

const DEFAULT_CHUNK_CHARS: usize = 4;

/// Cut a response into the deltas a streaming provider would send.
///
/// Only the first result is streamed.
#[must_use]
pub fn response_deltas(response: &ChatResponse, chunk_chars: usize) -> Vec<ChatDelta> {
    let Some(result) = response.first() else {
        return Vec::new();
    };
    let chunk_chars = chunk_chars.max(1);

    let chars: Vec<char> = result.content.chars().collect();
    let mut deltas: Vec<ChatDelta> = chars
        .chunks(chunk_chars)
        .map(|chunk| ChatDelta::text(chunk.iter().collect::<String>()))
        .collect();

    let function_calls = result
        .function_calls
        .iter()
        .enumerate()
        .map(|(index, call)| FunctionCallDelta {
            index,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            args_delta: call.args.to_json_string(),
        })
        .collect();

    deltas.push(ChatDelta {
        function_calls,
        finish_reason: result.finish_reason,
        usage: response.usage.clone(),
        model_name: response.model_name.clone(),
        ..ChatDelta::default()
    });
    deltas
}

fn into_stream(deltas: Vec<ChatDelta>) -> ChatStream {
    Box::pin(futures::stream::iter(deltas.into_iter().map(Ok)))
}

/// One request as seen by a test double.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Messages sent.
    pub messages: Vec<ChatMessage>,
    /// Settings sent.
    pub settings: ModelSettings,
    /// Parameters sent.
    pub params: RequestParameters,
    /// Whether the streaming entry point was used.
    pub streamed: bool,
}

#[derive(Debug)]
enum Scripted {
    Response(ChatResponse),
    Error(ModelError),
}

/// A model that replays scripted responses in order.
///
/// Running out of script is an [`ModelError::InvalidResponse`], so tests
/// notice unexpected extra calls.
#[derive(Debug, Clone)]
pub struct MockModel {
    name: String,
    system: String,
    profile: ModelProfile,
    chunk_chars: usize,
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockModel {
    /// Create a mock with an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: "mock".to_string(),
            profile: ModelProfile::default(),
            chunk_chars: DEFAULT_CHUNK_CHARS,
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the provider name reported by [`Model::system`].
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Set the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set how many characters each streamed text delta carries.
    #[must_use]
    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: ChatResponse) -> Self {
        self.script.lock().push_back(Scripted::Response(response));
        self
    }

    /// Queue a text response that stops normally.
    #[must_use]
    pub fn with_text_response(self, text: impl Into<String>) -> Self {
        self.with_response(ChatResponse::text(text))
    }

    /// Queue a response carrying only function calls.
    #[must_use]
    pub fn with_function_calls(self, calls: Vec<FunctionCall>) -> Self {
        self.with_response(ChatResponse::new(vec![ChatResult::function_calls(calls)]))
    }

    /// Queue a text response with usage.
    #[must_use]
    pub fn with_text_and_usage(self, text: impl Into<String>, usage: RequestUsage) -> Self {
        self.with_response(ChatResponse::text(text).with_usage(usage))
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: ModelError) -> Self {
        self.script.lock().push_back(Scripted::Error(error));
        self
    }

    /// All requests received so far.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of scripted entries not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn next(
        &self,
        messages: &[ChatMessage],
        settings: &ModelSettings,
        params: &RequestParameters,
        streamed: bool,
    ) -> ModelResult<ChatResponse> {
        self.requests.lock().push(RecordedRequest {
            messages: messages.to_vec(),
            settings: settings.clone(),
            params: params.clone(),
            streamed,
        });
        let next = self.script.lock().pop_front();
        debug!(model = %self.name, streamed, remaining = self.remaining(), "Mock model request");
        match next {
            Some(Scripted::Response(mut response)) => {
                if response.model_name.is_none() {
                    response.model_name = Some(self.name.clone());
                }
                Ok(response)
            }
            Some(Scripted::Error(err)) => Err(err),
            None => Err(ModelError::invalid_response(format!(
                "MockModel '{}' has no scripted responses left",
                self.name
            ))),
        }
    }
}

#[async_trait]
impl Model for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn system(&self) -> &str {
        &self.system
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        settings: &ModelSettings,
        params: &RequestParameters,
    ) -> Result<ChatResponse, ModelError> {
        self.next(messages, settings, params, false)
    }

    async fn request_stream(
        &self,
        messages: &[ChatMessage],
        settings: &ModelSettings,
        params: &RequestParameters,
    ) -> Result<ChatStream, ModelError> {
        if !self.profile.supports_streaming {
            return Err(ModelError::not_supported("Streaming"));
        }
        let response = self.next(messages, settings, params, true)?;
        Ok(into_stream(response_deltas(&response, self.chunk_chars)))
    }
}

/// Closure behind a [`FunctionModel`].
pub type ResponseFn =
    dyn Fn(&[ChatMessage], &RequestParameters) -> ModelResult<ChatResponse> + Send + Sync;

/// A model whose answers are computed from the conversation.
///
/// ```rust
/// use sigil_core::{ChatMessage, ChatResponse, ModelSettings};
/// use sigil_models::{FunctionModel, Model, RequestParameters};
///
/// # tokio_test::block_on(async {
/// let model = FunctionModel::new(|messages, _params| {
///     Ok(ChatResponse::text(format!("Count: {}", messages.len())))
/// });
/// let response = model
///     .request(&[ChatMessage::user("hi")], &ModelSettings::new(), &RequestParameters::new())
///     .await
///     .unwrap();
/// assert_eq!(response.first_content(), "Count: 1");
/// # });
/// ```
#[derive(Clone)]
pub struct FunctionModel {
    name: String,
    system: String,
    profile: ModelProfile,
    chunk_chars: usize,
    function: Arc<ResponseFn>,
    calls: Arc<AtomicUsize>,
}

impl fmt::Debug for FunctionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionModel")
            .field("name", &self.name)
            .field("system", &self.system)
            .field("profile", &self.profile)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl FunctionModel {
    /// Create a model answering through `function`.
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&[ChatMessage], &RequestParameters) -> ModelResult<ChatResponse>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: "function-model".to_string(),
            system: "function".to_string(),
            profile: ModelProfile::default(),
            chunk_chars: DEFAULT_CHUNK_CHARS,
            function: Arc::new(function),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the model name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Set the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set how many characters each streamed text delta carries.
    #[must_use]
    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Number of requests answered so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, messages: &[ChatMessage], params: &RequestParameters) -> ModelResult<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = (self.function)(messages, params)?;
        if response.model_name.is_none() {
            response.model_name = Some(self.name.clone());
        }
        Ok(response)
    }
}

#[async_trait]
impl Model for FunctionModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn system(&self) -> &str {
        &self.system
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        _settings: &ModelSettings,
        params: &RequestParameters,
    ) -> Result<ChatResponse, ModelError> {
        self.answer(messages, params)
    }

    async fn request_stream(
        &self,
        messages: &[ChatMessage],
        _settings: &ModelSettings,
        params: &RequestParameters,
    ) -> Result<ChatStream, ModelError> {
        if !self.profile.supports_streaming {
            return Err(ModelError::not_supported("Streaming"));
        }
        let response = self.answer(messages, params)?;
        Ok(into_stream(response_deltas(&response, self.chunk_chars)))
    }
}
