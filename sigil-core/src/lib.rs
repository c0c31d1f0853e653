//! # sigil-core
//!
//! Core types shared by every sigil crate.
//!
//! - **Messages**: role-tagged chat messages, function calls, responses and stream deltas
//! - **Memory**: session-scoped, tagged conversation history
//! - **Usage**: token accounting per request, per run and per provider/model pair
//! - **Settings**: model configuration options
//! - **Identifiers**: run, session and function call ids
//!
//! ## Feature Flags
//!
//! - `tracing-integration`: Enable tracing instrumentation
//! - `full`: Enable all optional features
//!
//! ## Example
//!
//! ```rust
//! use sigil_core::{
//!     messages::ChatMessage,
//!     memory::Memory,
//!     usage::{RequestUsage, UsageLedger},
//!     settings::ModelSettings,
//! };
//!
//! let memory = Memory::new();
//! memory.add(ChatMessage::system("You are a helpful assistant."), None);
//! memory.add(ChatMessage::user("Hello!"), None);
//! assert_eq!(memory.history(None).len(), 2);
//!
//! let settings = ModelSettings::new().max_tokens(1000).temperature(0.7);
//! assert_eq!(settings.max_tokens, Some(1000));
//!
//! let mut ledger = UsageLedger::new();
//! ledger.record("openai", "gpt-4o", RequestUsage::with_tokens(100, 50));
//! assert_eq!(ledger.total().total(), 150);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod errors;
pub mod identifier;
pub mod json;
pub mod memory;
pub mod messages;
pub mod settings;
pub mod usage;

// Re-exports for convenience
pub use errors::{MemoryError, UsageLimitExceeded, UsageLimitType};
pub use identifier::{generate_function_call_id, generate_run_id, generate_session_id, now_utc};
pub use memory::{Memory, MemoryEntry, SessionGuard};
pub use messages::{
    ChatDelta, ChatMessage, ChatResponse, ChatResult, ChatRole, ContentPart, DeltaAccumulator,
    FinishReason, FunctionCall, FunctionCallArgs, FunctionCallDelta, MessageContent,
};
pub use settings::ModelSettings;
pub use usage::{ModelKey, RequestUsage, RunUsage, UsageLedger, UsageLimits};

/// Prelude module for common imports.
///
/// ```rust
/// use sigil_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::memory::{Memory, MemoryEntry};
    pub use crate::messages::{
        ChatDelta, ChatMessage, ChatResponse, ChatResult, ChatRole, ContentPart, FinishReason,
        FunctionCall, FunctionCallArgs, MessageContent,
    };
    pub use crate::settings::ModelSettings;
    pub use crate::usage::{ModelKey, RequestUsage, RunUsage, UsageLedger, UsageLimits};
}
