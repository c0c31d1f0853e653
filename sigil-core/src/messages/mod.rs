//! Message types for the abstract chat boundary.
//!
//! - **Request side**: [`ChatMessage`] with a [`ChatRole`] and [`MessageContent`]
//! - **Function calls**: [`FunctionCall`] and its [`FunctionCallArgs`]
//! - **Response side**: [`ChatResponse`], [`ChatResult`] and [`FinishReason`]
//! - **Streaming**: [`ChatDelta`] and [`FunctionCallDelta`]
//!
//! ## Example
//!
//! ```rust
//! use sigil_core::messages::{ChatMessage, ChatResponse, ChatRole, FinishReason};
//!
//! let prompt = vec![
//!     ChatMessage::system("Answer briefly."),
//!     ChatMessage::user("Question: 2 + 2?"),
//! ];
//! assert_eq!(prompt[1].role, ChatRole::User);
//!
//! let response = ChatResponse::text("Answer: 4");
//! assert_eq!(response.first_content(), "Answer: 4");
//! assert_eq!(response.results[0].finish_reason, Some(FinishReason::Stop));
//! ```

mod events;
mod function_call;
mod message;
mod response;

pub use events::{ChatDelta, DeltaAccumulator, FunctionCallDelta};
pub use function_call::{FunctionCall, FunctionCallArgs};
pub use message::{ChatMessage, ChatRole, ContentPart, MessageContent};
pub use response::{ChatResponse, ChatResult, FinishReason};
