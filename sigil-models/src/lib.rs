//! # sigil-models
//!
//! The abstract chat boundary sigil drives.
//!
//! A [`Model`] takes ordered role-tagged messages, [`ModelSettings`] and
//! [`RequestParameters`] (offered functions, function call mode) and returns
//! either a whole [`ChatResponse`] or a [`ChatStream`] of deltas. Provider
//! adapters live outside this workspace; [`MockModel`] and [`FunctionModel`]
//! are the in-process doubles used by tests and examples.
//!
//! ## Feature Flags
//!
//! - `tracing-integration`: Enable tracing instrumentation
//!
//! ## Example
//!
//! ```rust
//! use sigil_models::{Model, MockModel, ModelCapability, ModelProfile};
//!
//! let model = MockModel::new("gpt-test")
//!     .with_system("openai")
//!     .with_profile(ModelProfile::text_only());
//!
//! assert_eq!(model.identifier(), "openai:gpt-test");
//! assert!(!model.supports(ModelCapability::Functions));
//! ```
//!
//! [`ModelSettings`]: sigil_core::ModelSettings
//! [`ChatResponse`]: sigil_core::ChatResponse

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod mock;
pub mod model;
pub mod profile;

pub use error::{ModelError, ModelResult};
pub use mock::{response_deltas, FunctionModel, MockModel, RecordedRequest, ResponseFn};
pub use model::{BoxedModel, ChatStream, FunctionCallMode, Model, ModelCapability, RequestParameters};
pub use profile::ModelProfile;
