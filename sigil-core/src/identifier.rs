//! ID generation utilities.
//!
//! Functions for generating unique identifiers for function calls,
//! generator runs and memory sessions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a unique function call ID.
///
/// Used when a provider (or the text-mode function parser) does not
/// supply one.
///
/// # Example
///
/// ```rust
/// use sigil_core::identifier::generate_function_call_id;
///
/// let id = generate_function_call_id();
/// assert!(id.starts_with("call_"));
/// assert_eq!(id.len(), 37); // "call_" + 32 hex chars
/// ```
#[must_use]
pub fn generate_function_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Generate a unique run ID for one `forward` invocation.
///
/// ```rust
/// use sigil_core::identifier::generate_run_id;
///
/// assert!(generate_run_id().starts_with("run_"));
/// ```
#[must_use]
pub fn generate_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

/// Generate a unique memory session ID.
#[must_use]
pub fn generate_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// Get the current UTC timestamp.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
