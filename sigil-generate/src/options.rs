//! Per-call generation options.

use sigil_core::{FinishReason, Memory, ModelSettings, RequestUsage, UsageLimits};
use sigil_models::FunctionCallMode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default corrective retries per step.
pub const DEFAULT_MAX_RETRIES: usize = 5;
/// Default step limit.
pub const DEFAULT_MAX_STEPS: usize = 10;
/// Default retries of failed model requests.
pub const DEFAULT_MAX_INFRA_RETRIES: usize = 2;
/// Default base delay between retried model requests.
pub const DEFAULT_INFRA_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Summary of one finished step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    /// Zero-based step index.
    pub step_index: usize,
    /// Lower-cased names of the functions run in this step.
    pub functions_executed: Vec<String>,
    /// Tokens used by the step's requests.
    pub usage: RequestUsage,
    /// Corrective retries made in this step.
    pub retries: usize,
}

/// Events reported through [`GenerateOptions::on_trace`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A model request is about to be sent.
    Request {
        /// Step index.
        step: usize,
        /// Attempt within the step.
        attempt: usize,
        /// Number of messages in the request.
        messages: usize,
    },
    /// A model response was received.
    Response {
        /// Step index.
        step: usize,
        /// Attempt within the step.
        attempt: usize,
        /// Response text.
        content: String,
        /// Number of function calls in the response.
        function_calls: usize,
        /// Why the model stopped.
        finish_reason: Option<FinishReason>,
    },
    /// A failed model request will be retried.
    InfraRetry {
        /// Retry number, starting at 1.
        retry: usize,
        /// Delay before the retry.
        delay: Duration,
        /// The failure.
        error: String,
    },
    /// A corrective message was sent.
    Correction {
        /// Step index.
        step: usize,
        /// Attempt that failed.
        attempt: usize,
        /// The corrective text.
        message: String,
    },
    /// Functions ran.
    FunctionsExecuted {
        /// Step index.
        step: usize,
        /// Lower-cased function names.
        names: Vec<String>,
    },
}

/// Callback invoked after every step.
pub type StepCallback = Arc<dyn Fn(&StepInfo) + Send + Sync>;

/// Callback invoked for every trace event.
pub type TraceCallback = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Options for one [`forward`](crate::Generator::forward) call.
///
/// # Example
///
/// ```rust
/// use sigil_generate::GenerateOptions;
///
/// let options = GenerateOptions::new()
///     .max_retries(2)
///     .session_id("support-42")
///     .stop_function("finish");
/// assert_eq!(options.max_retries, 2);
/// assert_eq!(options.max_steps, 10);
/// ```
#[derive(Clone)]
pub struct GenerateOptions {
    /// Corrective retries per step; `N` allows `N + 1` requests.
    pub max_retries: usize,
    /// Step limit.
    pub max_steps: usize,
    /// Retries of model requests failing with a retryable error.
    pub max_infra_retries: usize,
    /// Base delay for request retries, doubled on each retry.
    pub infra_retry_delay: Duration,
    /// Stream responses from the model.
    pub stream: bool,
    /// Memory session.
    pub session_id: Option<String>,
    /// Shared memory. A fresh memory is used when unset.
    pub memory: Option<Arc<Memory>>,
    /// Model settings sent with every request.
    pub model_settings: ModelSettings,
    /// Function call mode for the first step.
    pub function_call: Option<FunctionCallMode>,
    /// Functions that end the run once executed (case-insensitive).
    pub stop_functions: Vec<String>,
    /// Usage limits checked after every request.
    pub usage_limits: Option<UsageLimits>,
    /// Cancellation signal.
    pub cancel: Option<CancellationToken>,
    /// Called after every step.
    pub on_step: Option<StepCallback>,
    /// Called for every trace event.
    pub on_trace: Option<TraceCallback>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_steps: DEFAULT_MAX_STEPS,
            max_infra_retries: DEFAULT_MAX_INFRA_RETRIES,
            infra_retry_delay: DEFAULT_INFRA_RETRY_DELAY,
            stream: false,
            session_id: None,
            memory: None,
            model_settings: ModelSettings::default(),
            function_call: None,
            stop_functions: Vec::new(),
            usage_limits: None,
            cancel: None,
            on_step: None,
            on_trace: None,
        }
    }
}

impl GenerateOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set corrective retries per step.
    #[must_use]
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the step limit.
    #[must_use]
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Set request retries.
    #[must_use]
    pub fn max_infra_retries(mut self, retries: usize) -> Self {
        self.max_infra_retries = retries;
        self
    }

    /// Set the base delay between request retries.
    #[must_use]
    pub fn infra_retry_delay(mut self, delay: Duration) -> Self {
        self.infra_retry_delay = delay;
        self
    }

    /// Stream responses from the model.
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the memory session.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Use shared memory.
    #[must_use]
    pub fn memory(mut self, memory: Arc<Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Set model settings.
    #[must_use]
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    /// Set the function call mode.
    #[must_use]
    pub fn function_call(mut self, mode: FunctionCallMode) -> Self {
        self.function_call = Some(mode);
        self
    }

    /// Add a stop function.
    #[must_use]
    pub fn stop_function(mut self, name: impl Into<String>) -> Self {
        self.stop_functions.push(name.into());
        self
    }

    /// Set usage limits.
    #[must_use]
    pub fn usage_limits(mut self, limits: UsageLimits) -> Self {
        self.usage_limits = Some(limits);
        self
    }

    /// Set the cancellation signal.
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the step callback.
    #[must_use]
    pub fn on_step<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepInfo) + Send + Sync + 'static,
    {
        self.on_step = Some(Arc::new(callback));
        self
    }

    /// Set the trace callback.
    #[must_use]
    pub fn on_trace<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        self.on_trace = Some(Arc::new(callback));
        self
    }

    pub(crate) fn is_stop_function(&self, name: &str) -> bool {
        self.stop_functions
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
    }

    pub(crate) fn trace(&self, event: TraceEvent) {
        if let Some(callback) = &self.on_trace {
            callback(&event);
        }
    }

    /// Delay before request retry `retry` (starting at 1).
    pub(crate) fn retry_delay(&self, retry: usize) -> Duration {
        let exponent = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        self.infra_retry_delay.saturating_mul(2u32.saturating_pow(exponent))
    }
}

impl fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("max_retries", &self.max_retries)
            .field("max_steps", &self.max_steps)
            .field("max_infra_retries", &self.max_infra_retries)
            .field("infra_retry_delay", &self.infra_retry_delay)
            .field("stream", &self.stream)
            .field("session_id", &self.session_id)
            .field("model_settings", &self.model_settings)
            .field("function_call", &self.function_call)
            .field("stop_functions", &self.stop_functions)
            .field("usage_limits", &self.usage_limits)
            .field("on_step", &self.on_step.is_some())
            .field("on_trace", &self.on_trace.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = GenerateOptions::default();
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.max_steps, 10);
        assert_eq!(options.max_infra_retries, 2);
        assert_eq!(options.infra_retry_delay, Duration::from_millis(500));
        assert!(!options.stream);
        assert!(options.memory.is_none());
    }

    #[test]
    fn test_stop_functions_ignore_case() {
        let options = GenerateOptions::new().stop_function("Finish");
        assert!(options.is_stop_function("finish"));
        assert!(!options.is_stop_function("finished"));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let options = GenerateOptions::new().infra_retry_delay(Duration::from_millis(100));
        assert_eq!(options.retry_delay(1), Duration::from_millis(100));
        assert_eq!(options.retry_delay(2), Duration::from_millis(200));
        assert_eq!(options.retry_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_callbacks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let options = GenerateOptions::new().on_trace(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        options.trace(TraceEvent::FunctionsExecuted {
            step: 0,
            names: vec!["now".into()],
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(format!("{options:?}").contains("on_trace: true"));
    }
}
