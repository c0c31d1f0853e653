//! Context handed to function handlers.

use chrono::{DateTime, Utc};
use sigil_core::identifier::{generate_run_id, now_utc};
use tokio_util::sync::CancellationToken;

/// Run metadata and the cancellation signal for one function call.
///
/// Handlers that make nested model calls should pass [`cancel`](Self::cancel)
/// (or a [`child`](Self::child) context) along so that aborting the outer
/// run also stops the inner one.
///
/// # Example
///
/// ```rust
/// use sigil_functions::FunctionContext;
///
/// let ctx = FunctionContext::new().with_session("sess_1");
/// assert_eq!(ctx.session_id.as_deref(), Some("sess_1"));
/// assert!(!ctx.is_cancelled());
///
/// ctx.cancel.cancel();
/// assert!(ctx.child().is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct FunctionContext {
    /// Memory session the run writes to.
    pub session_id: Option<String>,
    /// Unique id of the generator run.
    pub run_id: String,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// Name of the model driving the run, if known.
    pub model_name: Option<String>,
    /// Cooperative cancellation signal for the whole run.
    pub cancel: CancellationToken,
}

impl FunctionContext {
    /// Create a context with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: None,
            run_id: generate_run_id(),
            start_time: now_utc(),
            model_name: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Use an existing cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A copy whose token is cancelled with this one but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Check whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for FunctionContext {
    fn default() -> Self {
        Self::new()
    }
}
