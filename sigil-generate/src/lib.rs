//! # sigil-generate
//!
//! Prompt rendering and the validating retry loop.
//!
//! A [`Generator`] pairs a signature with optional functions, assertions,
//! field processors and examples. [`Generator::forward`] renders the
//! prompt, calls the model, extracts the labelled output fields and keeps
//! correcting the model until the values are complete and valid, running
//! any functions it asks for along the way.
//!
//! ## Feature Flags
//!
//! - `tracing-integration`: Enable tracing instrumentation
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use sigil_generate::{Assertion, GenerateOptions, Generator};
//! use sigil_models::MockModel;
//!
//! # tokio_test::block_on(async {
//! let generator = Generator::parse(r#""Grade an essay" essay -> grade:class "A, B, C", feedback"#)
//!     .unwrap()
//!     .with_assertion(Assertion::new(
//!         |v: &sigil_extract::Values| v.get("feedback").and_then(|f| f.as_str()).is_some_and(|f| f.len() > 5),
//!         "Feedback must be a full sentence",
//!     ));
//!
//! let model = MockModel::new("mock-1")
//!     .with_text_response("Grade: B\nFeedback: Ok")
//!     .with_text_response("Grade: B\nFeedback: Clear argument, weak ending.");
//!
//! let inputs = json!({"essay": "..."}).as_object().cloned().unwrap();
//! let output = generator
//!     .forward(&model, inputs, &GenerateOptions::new())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(output.get_str("grade"), Some("B"));
//! assert_eq!(output.retries, 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assertion;
pub mod error;
pub mod generator;
pub mod options;
pub mod output;
pub mod processor;
pub mod prompt;
pub mod stream;

pub use assertion::{check_assertions, check_streaming_assertions, Assertion, AssertionError, StreamingAssertion};
pub use error::{GenerateError, GenerateResult, RetryCause};
pub use generator::{Generator, StepOutcome, CORRECTION_TAG, ERROR_TAG};
pub use options::{
    GenerateOptions, StepCallback, StepInfo, TraceCallback, TraceEvent, DEFAULT_INFRA_RETRY_DELAY,
    DEFAULT_MAX_INFRA_RETRIES, DEFAULT_MAX_RETRIES, DEFAULT_MAX_STEPS,
};
pub use output::GenerateOutput;
pub use processor::{run_processors, FieldProcessor, ProcessField, PROCESSOR_TAG};
pub use prompt::{function_call_fields, PromptError, PromptRenderer, PromptResult};
pub use stream::{apply_delta, FieldDelta, GenerateDelta, GenerateEvent, GenerateStream};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Assertion, FieldProcessor, GenerateError, GenerateEvent, GenerateOptions, GenerateOutput,
        GenerateResult, Generator, StreamingAssertion,
    };
}
