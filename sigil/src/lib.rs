//! # sigil - Signature-Driven Structured Generation
//!
//! sigil turns a compact field declaration into validated values produced by
//! a chat model. You write a signature such as
//! `"Grade an essay" essay -> grade:class "A, B, C", feedback`, hand it
//! inputs, and get back a map of typed outputs. Malformed answers are
//! corrected and retried, functions the model asks for are run, and partial
//! values can be streamed as the model writes them.
//!
//! ## Quick Start
//!
//! ```rust
//! use sigil::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let generator = Generator::parse("question -> answer, confidence:number").unwrap();
//! let model = MockModel::new("mock-1").with_text_response("Answer: 4\nConfidence: 0.99");
//!
//! let inputs = json!({"question": "2 + 2?"}).as_object().cloned().unwrap();
//! let output = generator
//!     .forward(&model, inputs, &GenerateOptions::new())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(output.get_str("answer"), Some("4"));
//! assert_eq!(output.get("confidence"), Some(&json!(0.99)));
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|--------|
//! | `tracing-integration` | `tracing` instrumentation in every crate | ❌ |
//! | `full` | All features | ❌ |
//!
//! ## Architecture
//!
//! sigil is organized as a workspace of focused crates:
//!
//! - [`sigil_core`] - Chat messages, usage accounting, session memory
//! - [`sigil_signature`] - Signature DSL parser and field model
//! - [`sigil_extract`] - Extraction of labelled values, one-shot or streamed
//! - [`sigil_functions`] - Function registry and call orchestration
//! - [`sigil_models`] - The chat model boundary and test doubles
//! - [`sigil_generate`] - Prompt rendering and the validating retry loop
//!
//! ## Examples
//!
//! ### Functions
//!
//! ```rust
//! use sigil::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let registry = FunctionRegistry::new()
//!     .with(
//!         FunctionDefinition::new("now", "Current time"),
//!         function_fn(|_ctx, _args| async move { Ok(json!("12:00")) }),
//!     )
//!     .unwrap();
//!
//! let model = MockModel::new("mock-1")
//!     .with_function_calls(vec![FunctionCall::new("call_1", "now", json!({}))])
//!     .with_text_response("Answer: noon");
//!
//! let output = Generator::parse("question -> answer")
//!     .unwrap()
//!     .with_functions(registry)
//!     .forward(&model, json!({"question": "Time?"}).as_object().cloned().unwrap(), &GenerateOptions::new())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(output.functions_executed, vec!["now".to_string()]);
//! assert_eq!(output.steps, 2);
//! # });
//! ```
//!
//! ### Streaming
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use sigil::prelude::*;
//!
//! let mut stream = generator.forward_stream(model, inputs, GenerateOptions::new());
//! while let Some(event) = stream.next().await {
//!     if let GenerateEvent::Delta(delta) = event? {
//!         println!("{}: {:?}", delta.field, delta.delta);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Chat messages, usage accounting and session memory.
pub use sigil_core as core;

/// Signature DSL and field model.
pub use sigil_signature as signature;

/// Value extraction.
pub use sigil_extract as extract;

/// Function registry and orchestration.
pub use sigil_functions as functions;

/// Model boundary and test doubles.
pub use sigil_models as models;

/// Prompt rendering and the retry loop.
pub use sigil_generate as generate;

// ============================================================================
// Type Re-exports (Flat)
// ============================================================================

// Core
pub use sigil_core::{
    ChatDelta, ChatMessage, ChatResponse, ChatResult, ChatRole, ContentPart, FinishReason,
    FunctionCall, Memory, MessageContent, ModelSettings, RequestUsage, RunUsage, UsageLedger,
    UsageLimitExceeded, UsageLimits,
};

// Signature
pub use sigil_signature::{Field, FieldKind, FieldType, Signature, SignatureError};

// Extraction
pub use sigil_extract::{extract_values, StreamExtractor, ValidationError, Values};

// Functions
pub use sigil_functions::{
    function_fn, FunctionContext, FunctionDefinition, FunctionError, FunctionHandler,
    FunctionRegistry, SchemaBuilder,
};

// Models
pub use sigil_models::{
    BoxedModel, FunctionCallMode, FunctionModel, MockModel, Model, ModelCapability, ModelError,
    ModelProfile, RequestParameters,
};

// Generation
pub use sigil_generate::{
    apply_delta, Assertion, AssertionError, FieldDelta, FieldProcessor, GenerateDelta,
    GenerateError, GenerateEvent, GenerateOptions, GenerateOutput, GenerateResult,
    GenerateStream, Generator, ProcessField, PromptRenderer, RetryCause, StepInfo,
    StreamingAssertion, TraceEvent,
};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use sigil::prelude::*;
/// ```
pub mod prelude {
    pub use sigil_core::{
        ChatMessage, ChatResponse, FinishReason, FunctionCall, Memory, ModelSettings,
        RequestUsage, UsageLimits,
    };
    pub use sigil_extract::Values;
    pub use sigil_functions::{
        function_fn, FunctionContext, FunctionDefinition, FunctionRegistry, SchemaBuilder,
    };
    pub use sigil_generate::{
        Assertion, FieldDelta, FieldProcessor, GenerateError, GenerateEvent, GenerateOptions,
        GenerateOutput, GenerateResult, Generator, StreamingAssertion,
    };
    pub use sigil_models::{BoxedModel, FunctionModel, MockModel, Model, ModelProfile};
    pub use sigil_signature::{Field, FieldKind, Signature};
}
