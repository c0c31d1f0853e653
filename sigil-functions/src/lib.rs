//! # sigil-functions
//!
//! Functions a model may call during a generator run.
//!
//! - [`FunctionDefinition`] and [`ObjectJsonSchema`]: what the model is told
//! - [`FunctionHandler`] and [`function_fn`]: what runs
//! - [`FunctionRegistry`]: name-indexed collection of both
//! - [`parse_function_calls`] and [`process_functions`]: recognising calls
//!   in a model turn and writing their results back into memory
//!
//! ## Feature Flags
//!
//! - `tracing-integration`: Enable tracing instrumentation
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use sigil_core::{FunctionCall, Memory};
//! use sigil_functions::{
//!     function_fn, process_functions, FunctionContext, FunctionDefinition, FunctionRegistry,
//!     SchemaBuilder,
//! };
//!
//! # tokio_test::block_on(async {
//! let registry = FunctionRegistry::new()
//!     .with(
//!         FunctionDefinition::new("getWeather", "Current weather for a city")
//!             .with_parameters(SchemaBuilder::new().string("city", "City name", true).build()),
//!         function_fn(|_ctx, args| async move { Ok(json!({"city": args["city"], "temp": 18})) }),
//!     )
//!     .unwrap();
//!
//! let memory = Memory::new();
//! let calls = vec![FunctionCall::new("call_1", "getWeather", json!({"city": "Lyon"}))];
//! let ran = process_functions(&registry, &calls, &memory, None, &FunctionContext::new())
//!     .await
//!     .unwrap();
//!
//! assert!(ran.contains("getweather"));
//! assert_eq!(memory.len(None), 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod definition;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod registry;
pub mod schema;

pub use context::FunctionContext;
pub use definition::{FunctionDefinition, ObjectJsonSchema};
pub use error::{FunctionError, FunctionResult};
pub use handler::{function_fn, FnHandler, FunctionHandler};
pub use orchestrator::{
    parse_function_calls, process_functions, FUNCTION_ARGUMENTS_FIELD, FUNCTION_NAME_FIELD,
};
pub use registry::{Function, FunctionRegistry};
pub use schema::SchemaBuilder;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        function_fn, FunctionContext, FunctionDefinition, FunctionError, FunctionHandler,
        FunctionRegistry, FunctionResult, SchemaBuilder,
    };
}
