//! The validating retry loop.
//!
//! A [`Generator`] renders the prompt once, then runs steps until the model
//! produces a complete, valid set of output values:
//!
//! - a response that fails extraction, a required field or an assertion is
//!   answered with a corrective message and retried within the same step,
//!   up to `max_retries` times
//! - a response requesting functions runs them, appends the results and
//!   moves to the next step without consuming a retry
//! - retryable transport failures are retried with exponential backoff and
//!   never reach the model as corrections
//!
//! The conversation lives in [`Memory`], so a later call with the same
//! session continues where this one stopped.

use futures::StreamExt;
use serde_json::Value;
use sigil_core::{
    generate_run_id, ChatMessage, ChatResponse, ChatResult, DeltaAccumulator, FinishReason,
    FunctionCall, Memory, ModelSettings, RequestUsage, RunUsage, UsageLedger,
};
use sigil_extract::{extract_values, extract_values_lenient, StreamExtractor, ValidationError, Values};
use sigil_functions::{
    parse_function_calls, process_functions, FunctionContext, FunctionDefinition,
    FunctionHandler, FunctionRegistry, FUNCTION_ARGUMENTS_FIELD, FUNCTION_NAME_FIELD,
};
use sigil_models::{
    BoxedModel, ChatStream, FunctionCallMode, Model, ModelCapability, ModelError,
    RequestParameters,
};
use sigil_signature::{Field, Signature};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::assertion::{
    check_assertions, check_streaming_assertions, settled_text, Assertion, AssertionError,
    StreamingAssertion,
};
use crate::error::{GenerateError, GenerateResult, RetryCause};
use crate::options::{GenerateOptions, StepInfo, TraceEvent};
use crate::output::GenerateOutput;
use crate::processor::{run_processors, FieldProcessor};
use crate::prompt::{function_call_fields, PromptRenderer};
use crate::stream::{DeltaTracker, EventSender, GenerateDelta, GenerateEvent, GenerateStream};

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::{debug, info, warn};

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug { ($($arg:tt)*) => {} }
#[cfg(not(feature = "tracing-integration"))]
macro_rules! info { ($($arg:tt)*) => {} }
#[cfg(not(feature = "tracing-integration"))]
macro_rules! warn { ($($arg:tt)*) => {} }

/// Memory tag on corrective user messages.
pub const CORRECTION_TAG: &str = "correction";
/// Memory tag on assistant turns that were corrected.
pub const ERROR_TAG: &str = "error";

const EVENT_BUFFER: usize = 64;

/// How one attempt ended.
#[derive(Debug)]
pub enum StepOutcome {
    /// Every required output was extracted and checked.
    Done(Values),
    /// A stop function ran; the values are whatever the turn produced.
    Stopped(Values),
    /// Functions ran or a processor reported output; take another step.
    Continue,
    /// Correct the model and retry the step.
    NeedsRetry(RetryCause),
}

/// Turns a [`Signature`] into validated values by talking to a model.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use sigil_generate::{GenerateOptions, Generator};
/// use sigil_models::MockModel;
///
/// # tokio_test::block_on(async {
/// let generator = Generator::parse("question -> answer, confidence:number").unwrap();
/// let model = MockModel::new("mock-1")
///     .with_text_response("Answer: Paris")
///     .with_text_response("Answer: Paris\nConfidence: 0.9");
///
/// let inputs = json!({"question": "Capital of France?"}).as_object().cloned().unwrap();
/// let output = generator
///     .forward(&model, inputs, &GenerateOptions::new())
///     .await
///     .unwrap();
///
/// assert_eq!(output.get_str("answer"), Some("Paris"));
/// assert_eq!(output.retries, 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Generator {
    signature: Signature,
    functions: FunctionRegistry,
    assertions: Vec<Assertion>,
    streaming_assertions: Vec<StreamingAssertion>,
    processors: Vec<FieldProcessor>,
    examples: Vec<Values>,
    demos: Vec<Values>,
    model_settings: ModelSettings,
}

impl Generator {
    /// Create a generator for `signature`.
    #[must_use]
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            functions: FunctionRegistry::new(),
            assertions: Vec::new(),
            streaming_assertions: Vec::new(),
            processors: Vec::new(),
            examples: Vec::new(),
            demos: Vec::new(),
            model_settings: ModelSettings::default(),
        }
    }

    /// Parse a signature and create a generator for it.
    pub fn parse(dsl: &str) -> GenerateResult<Self> {
        Ok(Self::new(Signature::parse(dsl)?))
    }

    /// Use `registry` for function calls.
    #[must_use]
    pub fn with_functions(mut self, registry: FunctionRegistry) -> Self {
        self.functions = registry;
        self
    }

    /// Register one function.
    pub fn with_function(
        mut self,
        definition: FunctionDefinition,
        handler: impl FunctionHandler + 'static,
    ) -> GenerateResult<Self> {
        self.functions.register(definition, handler)?;
        Ok(self)
    }

    /// Add an assertion over the extracted values.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Add an assertion checked while a field streams.
    #[must_use]
    pub fn with_streaming_assertion(mut self, assertion: StreamingAssertion) -> Self {
        self.streaming_assertions.push(assertion);
        self
    }

    /// Add a field processor.
    #[must_use]
    pub fn with_field_processor(mut self, processor: FieldProcessor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Set the worked examples shown in the system prompt.
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<Values>) -> Self {
        self.examples = examples;
        self
    }

    /// Set demonstrations, rendered after the examples.
    #[must_use]
    pub fn with_demos(mut self, demos: Vec<Values>) -> Self {
        self.demos = demos;
        self
    }

    /// Set default model settings. Settings in [`GenerateOptions`] override
    /// them field by field.
    #[must_use]
    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    /// The signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The function registry.
    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Run the generator to completion.
    pub async fn forward(
        &self,
        model: &dyn Model,
        inputs: Values,
        options: &GenerateOptions,
    ) -> GenerateResult<GenerateOutput> {
        self.run(model, &inputs, options, None).await
    }

    /// Run the generator on a background task, streaming partial values.
    ///
    /// Must be called within a Tokio runtime. Dropping the returned stream
    /// cancels the run at its next suspension point.
    pub fn forward_stream(
        &self,
        model: BoxedModel,
        inputs: Values,
        options: GenerateOptions,
    ) -> GenerateStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let generator = self.clone();

        tokio::spawn(async move {
            let result = generator
                .run(model.as_ref(), &inputs, &options, Some(&tx))
                .await;
            // The receiver may already be gone.
            let _ = tx.send(result.map(GenerateEvent::Done)).await;
        });

        GenerateStream::new(rx)
    }

    async fn run(
        &self,
        model: &dyn Model,
        inputs: &Values,
        options: &GenerateOptions,
        events: Option<&EventSender>,
    ) -> GenerateResult<GenerateOutput> {
        self.signature.validate()?;

        let memory = options.memory.clone().unwrap_or_default();
        let session = options.session_id.as_deref();
        let _guard = memory
            .try_lock_session(session)
            .ok_or_else(|| GenerateError::SessionBusy {
                session: session.unwrap_or("default").to_string(),
            })?;

        let native_functions = model.supports(ModelCapability::Functions);
        let definitions = self.functions.definitions();
        let text_functions = !definitions.is_empty() && !native_functions;

        let mut signature = self.signature.clone();
        if text_functions {
            for field in function_call_fields(&definitions) {
                signature = signature.add_output_field(field)?;
            }
        }

        let renderer = PromptRenderer::new(signature.clone())
            .with_functions(definitions.clone())
            .with_examples(self.examples.clone())
            .with_demos(self.demos.clone());
        let system = if memory.is_empty(session) {
            Some(renderer.system_prompt()?)
        } else {
            None
        };
        let user = renderer.render_user(inputs)?;
        if let Some(system) = system {
            memory.add(ChatMessage::system(system), session);
        }
        memory.add(ChatMessage::user(user), session);

        let cancel = options
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let run_id = generate_run_id();
        let mut ctx = FunctionContext::new()
            .with_run_id(&run_id)
            .with_model_name(model.name())
            .with_cancel(cancel.clone());
        if let Some(session) = session {
            ctx = ctx.with_session(session);
        }

        let params = if native_functions && !definitions.is_empty() {
            RequestParameters::new().with_functions(definitions)
        } else {
            RequestParameters::new()
        };

        info!(
            run_id = %run_id,
            model = %model.name(),
            text_functions,
            "Starting generation"
        );

        Run {
            generator: self,
            model,
            options,
            settings: self.model_settings.merge(&options.model_settings),
            memory: memory.as_ref(),
            session,
            events,
            signature,
            ctx,
            cancel,
            params,
            native_functions,
            text_functions,
            run_id,
            ledger: UsageLedger::new(),
            usage: RunUsage::new(),
            retries: 0,
            functions_executed: Vec::new(),
            step_usage: RequestUsage::new(),
            step_functions: Vec::new(),
        }
        .execute()
        .await
    }
}

/// State of one `forward` call.
struct Run<'a> {
    generator: &'a Generator,
    model: &'a dyn Model,
    options: &'a GenerateOptions,
    settings: ModelSettings,
    memory: &'a Memory,
    session: Option<&'a str>,
    events: Option<&'a EventSender>,
    /// The prompt signature, including text-mode function fields.
    signature: Signature,
    ctx: FunctionContext,
    cancel: CancellationToken,
    params: RequestParameters,
    native_functions: bool,
    text_functions: bool,
    run_id: String,
    ledger: UsageLedger,
    usage: RunUsage,
    retries: usize,
    functions_executed: Vec<String>,
    step_usage: RequestUsage,
    step_functions: Vec<String>,
}

impl Run<'_> {
    async fn execute(mut self) -> GenerateResult<GenerateOutput> {
        let max_steps = self.options.max_steps;

        for step in 0..max_steps {
            self.step_usage = RequestUsage::new();
            self.step_functions.clear();
            let mut attempt = 0;

            loop {
                match self.attempt(step, attempt).await? {
                    StepOutcome::Done(values) => {
                        self.clear_corrections();
                        self.report_step(step, attempt);
                        debug!(step, attempt, "Generation complete");
                        return Ok(self.finish(values, step, None));
                    }
                    StepOutcome::Stopped(values) => {
                        self.clear_corrections();
                        self.report_step(step, attempt);
                        info!(step, "Stop function executed");
                        return Ok(self.finish(values, step, None));
                    }
                    StepOutcome::Continue => {
                        self.clear_corrections();
                        self.report_step(step, attempt);
                        break;
                    }
                    StepOutcome::NeedsRetry(cause) => {
                        if attempt >= self.options.max_retries {
                            self.report_step(step, attempt);
                            return match cause {
                                RetryCause::Assertion(err) if err.optional => {
                                    warn!(step, error = %err, "Optional assertion still failing");
                                    let values = err.values.clone();
                                    Ok(self.finish(values, step, Some(err)))
                                }
                                cause => Err(GenerateError::RetriesExhausted {
                                    attempts: attempt + 1,
                                    last_error: cause,
                                }),
                            };
                        }
                        self.correct(step, attempt, &cause);
                        attempt += 1;
                        self.retries += 1;
                    }
                }
            }
        }

        Err(GenerateError::StepsExhausted { max_steps })
    }

    async fn attempt(&mut self, step: usize, attempt: usize) -> GenerateResult<StepOutcome> {
        self.check_cancelled()?;

        let messages = self.memory.history(self.session);
        let params = self.params_for(step);
        debug!(step, attempt, messages = messages.len(), "Sending request");
        self.options.trace(TraceEvent::Request {
            step,
            attempt,
            messages: messages.len(),
        });
        self.emit(GenerateEvent::AttemptStart { step, attempt }).await;

        let streaming = (self.options.stream || self.events.is_some())
            && self.model.supports(ModelCapability::Streaming);
        if streaming {
            self.streamed_attempt(step, attempt, &messages, &params).await
        } else {
            self.whole_attempt(step, attempt, &messages, &params).await
        }
    }

    async fn whole_attempt(
        &mut self,
        step: usize,
        attempt: usize,
        messages: &[ChatMessage],
        params: &RequestParameters,
    ) -> GenerateResult<StepOutcome> {
        let model = self.model;
        let settings = &self.settings;
        let response = self
            .with_infra_retries(|| model.request(messages, settings, params))
            .await?;
        let result = self.accept(step, attempt, &response)?;

        let extracted = self.extract(&result.content);
        if let Ok(values) = &extracted {
            let mut tracker = DeltaTracker::new(step, attempt);
            for field in self.signature.output_fields() {
                if let Some(value) = values.get(&field.name) {
                    if let Err(err) = self.check_settled(field, value, values) {
                        if result.function_calls.is_empty() {
                            return Ok(StepOutcome::NeedsRetry(err.into()));
                        }
                    }
                    if let Some(delta) = tracker.settled(field, value) {
                        self.emit(GenerateEvent::Delta(delta)).await;
                    }
                }
            }
        }

        self.settle(step, &result.function_calls, extracted).await
    }

    async fn streamed_attempt(
        &mut self,
        step: usize,
        attempt: usize,
        messages: &[ChatMessage],
        params: &RequestParameters,
    ) -> GenerateResult<StepOutcome> {
        let model = self.model;
        let settings = &self.settings;
        let mut stream: ChatStream = self
            .with_infra_retries(|| model.request_stream(messages, settings, params))
            .await?;

        let fields = self.signature.output_fields().to_vec();
        let mut extractor = if self.generator.functions.is_empty() {
            StreamExtractor::new(fields)
        } else {
            StreamExtractor::lenient(fields)
        };
        let mut tracker = DeltaTracker::new(step, attempt);
        let mut accumulator = DeltaAccumulator::new();
        let mut failure: Option<RetryCause> = None;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(GenerateError::Aborted),
                next = stream.next() => next,
            };
            let Some(delta) = next else {
                break;
            };
            let delta = match delta {
                Ok(delta) => delta,
                Err(err) if err.is_retryable() => {
                    warn!(step, attempt, error = %err, "Response stream interrupted");
                    return Ok(StepOutcome::NeedsRetry(RetryCause::Interrupted(err.to_string())));
                }
                Err(err) => return Err(err.into()),
            };

            accumulator.push(&delta);
            if delta.index != 0 || delta.content.is_empty() || failure.is_some() {
                continue;
            }
            match self.feed(&mut extractor, &mut tracker, Some(&delta.content)) {
                Ok(deltas) => {
                    for delta in deltas {
                        self.emit(GenerateEvent::Delta(delta)).await;
                    }
                }
                Err(cause) => {
                    debug!(step, attempt, error = %cause, "Extraction failed mid-stream");
                    failure = Some(cause);
                }
            }
        }
        drop(stream);

        let response = accumulator.into_response();
        let result = self.accept(step, attempt, &response)?;

        if failure.is_none() {
            match self.feed(&mut extractor, &mut tracker, None) {
                Ok(deltas) => {
                    for delta in deltas {
                        self.emit(GenerateEvent::Delta(delta)).await;
                    }
                }
                Err(cause) => failure = Some(cause),
            }
        }

        let extracted = match failure {
            None => Ok(extractor.into_values()),
            Some(RetryCause::Validation(err)) => Err(err),
            Some(cause) if result.function_calls.is_empty() => {
                return Ok(StepOutcome::NeedsRetry(cause));
            }
            Some(_) => Ok(Values::new()),
        };

        self.settle(step, &result.function_calls, extracted).await
    }

    /// Feed streamed text to the extractor, or finish it when `text` is
    /// `None`, returning the deltas to deliver.
    fn feed(
        &self,
        extractor: &mut StreamExtractor,
        tracker: &mut DeltaTracker,
        text: Option<&str>,
    ) -> Result<Vec<GenerateDelta>, RetryCause> {
        let settled = match text {
            Some(text) => extractor.push(text)?,
            None => extractor.finish()?,
        };

        let mut deltas = Vec::new();
        for (name, value) in &settled {
            let Some(field) = extractor.fields().iter().find(|f| &f.name == name) else {
                continue;
            };
            self.check_settled(field, value, extractor.values())?;
            deltas.extend(tracker.settled(field, value));
        }

        if let Some((field, stable)) = extractor.stable_partial() {
            check_streaming_assertions(
                &self.generator.streaming_assertions,
                &field.name,
                stable.trim(),
                false,
                extractor.values(),
            )?;
            deltas.extend(tracker.partial(field, stable));
        }

        Ok(deltas)
    }

    fn check_settled(&self, field: &Field, value: &Value, values: &Values) -> Result<(), AssertionError> {
        check_streaming_assertions(
            &self.generator.streaming_assertions,
            &field.name,
            &settled_text(value),
            true,
            values,
        )
    }

    /// Record usage, check the finish reason and store the assistant turn.
    fn accept(
        &mut self,
        step: usize,
        attempt: usize,
        response: &ChatResponse,
    ) -> GenerateResult<ChatResult> {
        self.record_usage(response)?;

        let result = response
            .first()
            .cloned()
            .ok_or_else(|| ModelError::invalid_response("Response contained no results"))?;

        self.options.trace(TraceEvent::Response {
            step,
            attempt,
            content: result.content.clone(),
            function_calls: result.function_calls.len(),
            finish_reason: result.finish_reason,
        });

        match result.finish_reason {
            Some(FinishReason::Length) => {
                return Err(GenerateError::LengthExceeded {
                    max_tokens: self.settings.max_tokens,
                });
            }
            Some(FinishReason::ContentFilter) => return Err(GenerateError::ContentFiltered),
            Some(FinishReason::Error) => {
                return Err(ModelError::api("Model finished with an error").into());
            }
            _ => {}
        }

        self.memory.add(
            ChatMessage::assistant(result.content.clone())
                .with_function_calls(result.function_calls.clone()),
            self.session,
        );
        Ok(result)
    }

    fn extract(&self, content: &str) -> Result<Values, ValidationError> {
        let fields = self.signature.output_fields();
        if self.generator.functions.is_empty() {
            extract_values(fields, content)
        } else {
            extract_values_lenient(fields, content)
        }
    }

    /// Decide what a complete response means for the step.
    async fn settle(
        &mut self,
        step: usize,
        native_calls: &[FunctionCall],
        extracted: Result<Values, ValidationError>,
    ) -> GenerateResult<StepOutcome> {
        let mut values = match extracted {
            Ok(values) => values,
            Err(_) if !native_calls.is_empty() => Values::new(),
            Err(err) => return Ok(StepOutcome::NeedsRetry(err.into())),
        };

        if let Some(calls) = parse_function_calls(native_calls, &mut values, self.native_functions) {
            return self.run_functions(step, &calls, values).await;
        }

        if let Some(field) = self
            .signature
            .output_fields()
            .iter()
            .find(|f| !f.is_optional && !values.contains_key(&f.name))
        {
            return Ok(StepOutcome::NeedsRetry(ValidationError::not_found(field).into()));
        }

        if let Err(err) = check_assertions(&self.generator.assertions, &values) {
            return Ok(StepOutcome::NeedsRetry(err.into()));
        }

        let reported = run_processors(
            &self.generator.processors,
            self.signature.output_fields(),
            &values,
            self.memory,
            self.session,
        )
        .await?;
        if reported {
            debug!(step, "Field processors reported output");
            return Ok(StepOutcome::Continue);
        }

        Ok(StepOutcome::Done(values))
    }

    async fn run_functions(
        &mut self,
        step: usize,
        calls: &[FunctionCall],
        values: Values,
    ) -> GenerateResult<StepOutcome> {
        self.check_cancelled()?;
        process_functions(
            &self.generator.functions,
            calls,
            self.memory,
            self.session,
            &self.ctx,
        )
        .await?;

        let mut names: Vec<String> = Vec::new();
        for call in calls {
            let name = call.name.to_lowercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        for name in &names {
            if !self.functions_executed.contains(name) {
                self.functions_executed.push(name.clone());
            }
            if !self.step_functions.contains(name) {
                self.step_functions.push(name.clone());
            }
        }

        debug!(step, functions = ?names, "Functions executed");
        self.options.trace(TraceEvent::FunctionsExecuted {
            step,
            names: names.clone(),
        });
        let stopped = names.iter().any(|n| self.options.is_stop_function(n));
        self.emit(GenerateEvent::FunctionsExecuted { step, names }).await;

        if stopped {
            return Ok(StepOutcome::Stopped(values));
        }
        Ok(StepOutcome::Continue)
    }

    /// Call the model, retrying retryable failures with backoff.
    async fn with_infra_retries<T, F, Fut>(&self, mut call: F) -> GenerateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut retry = 0;
        loop {
            self.check_cancelled()?;
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(GenerateError::Aborted),
                result = call() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry < self.options.max_infra_retries => {
                    retry += 1;
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.options.retry_delay(retry));
                    warn!(retry, delay_ms = delay.as_millis() as u64, error = %err, "Retrying model request");
                    self.options.trace(TraceEvent::InfraRetry {
                        retry,
                        delay,
                        error: err.to_string(),
                    });
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(GenerateError::Aborted),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn record_usage(&mut self, response: &ChatResponse) -> GenerateResult<()> {
        let model = self.model;
        let usage = response.usage.clone().unwrap_or_default();
        let model_name = response.model_name.as_deref().unwrap_or_else(|| model.name());

        self.ledger.record(model.system(), model_name, usage.clone());
        self.step_usage.merge(&usage);
        self.usage.add_request(usage);

        if let Some(limits) = &self.options.usage_limits {
            limits.check(&self.usage)?;
        }
        Ok(())
    }

    /// Required and specific function call modes only apply to the first step.
    fn params_for(&self, step: usize) -> RequestParameters {
        let mut params = self.params.clone();
        if !self.native_functions || !params.has_functions() {
            return params;
        }
        params.function_call = match &self.options.function_call {
            Some(FunctionCallMode::Required | FunctionCallMode::Specific(_)) if step > 0 => None,
            mode => mode.clone(),
        };
        params
    }

    fn correct(&self, step: usize, attempt: usize, cause: &RetryCause) {
        let Some(message) = cause.correction(self.signature.output_fields()) else {
            debug!(step, attempt, error = %cause, "Retrying without correction");
            return;
        };
        debug!(step, attempt, error = %cause, "Sending correction");
        self.memory.add_tag(ERROR_TAG, self.session);
        self.memory.add(ChatMessage::user(message.clone()), self.session);
        self.memory.add_tag(CORRECTION_TAG, self.session);
        self.options.trace(TraceEvent::Correction {
            step,
            attempt,
            message,
        });
    }

    fn clear_corrections(&self) {
        self.memory.remove_by_tag(CORRECTION_TAG, self.session);
        self.memory.remove_by_tag(ERROR_TAG, self.session);
    }

    fn report_step(&mut self, step: usize, retries: usize) {
        if let Some(callback) = &self.options.on_step {
            callback(&StepInfo {
                step_index: step,
                functions_executed: std::mem::take(&mut self.step_functions),
                usage: std::mem::take(&mut self.step_usage),
                retries,
            });
        }
    }

    fn check_cancelled(&self) -> GenerateResult<()> {
        if self.cancel.is_cancelled() {
            return Err(GenerateError::Aborted);
        }
        Ok(())
    }

    async fn emit(&self, event: GenerateEvent) {
        if let Some(tx) = self.events {
            if tx.send(Ok(event)).await.is_err() {
                debug!("Event receiver dropped, cancelling run");
                self.cancel.cancel();
            }
        }
    }

    fn finish(self, values: Values, step: usize, unmet: Option<AssertionError>) -> GenerateOutput {
        let hidden: Vec<&str> = self
            .signature
            .output_fields()
            .iter()
            .filter(|f| f.is_internal)
            .map(|f| f.name.as_str())
            .collect();
        let text_functions = self.text_functions;
        let values = values
            .into_iter()
            .filter(|(name, _)| {
                !hidden.contains(&name.as_str())
                    && !(text_functions
                        && (name == FUNCTION_NAME_FIELD || name == FUNCTION_ARGUMENTS_FIELD))
            })
            .collect();

        GenerateOutput {
            values,
            usage: self.ledger,
            run_usage: self.usage,
            steps: step + 1,
            retries: self.retries,
            functions_executed: self.functions_executed,
            run_id: self.run_id,
            session_id: self.session.map(str::to_string),
            unmet_assertion: unmet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{apply_delta, FieldDelta};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sigil_core::{ChatRole, UsageLimits};
    use sigil_functions::{function_fn, FunctionError};
    use sigil_models::{FunctionModel, MockModel, ModelProfile};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn inputs(question: &str) -> Values {
        json!({ "question": question }).as_object().cloned().unwrap()
    }

    fn generator() -> Generator {
        Generator::parse("question -> answer, confidence:number").unwrap()
    }

    fn clock() -> FunctionRegistry {
        FunctionRegistry::new()
            .with(
                FunctionDefinition::new("now", "Current time"),
                function_fn(|_ctx, _args| async move { Ok(json!("12:00")) }),
            )
            .unwrap()
            .with(
                FunctionDefinition::new("finish", "End the conversation"),
                function_fn(|_ctx, _args| async move { Ok(json!("bye")) }),
            )
            .unwrap()
    }

    fn call(name: &str) -> FunctionCall {
        FunctionCall::new(format!("call_{name}"), name, json!({}))
    }

    #[tokio::test]
    async fn test_first_response_valid() {
        let model = MockModel::new("mock-1").with_text_response("Answer: Paris\nConfidence: 0.9");
        let output = generator()
            .forward(&model, inputs("Capital of France?"), &GenerateOptions::new())
            .await
            .unwrap();

        assert_eq!(Value::Object(output.values.clone()), json!({"answer": "Paris", "confidence": 0.9}));
        assert_eq!(output.steps, 1);
        assert_eq!(output.retries, 0);
        assert!(output.is_clean());
        assert_eq!(model.request_count(), 1);

        let sent = &model.recorded_requests()[0].messages;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, ChatRole::System);
        assert_eq!(sent[1].text(), "Question: Capital of France?\n");
    }

    #[tokio::test]
    async fn test_retries_exhausted_counts_attempts() {
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: Paris")
            .with_text_response("Answer: Paris")
            .with_text_response("Answer: Paris");
        let err = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new().max_retries(2))
            .await
            .unwrap_err();

        assert_eq!(model.request_count(), 3);
        match err {
            GenerateError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                match last_error {
                    RetryCause::Validation(e) => assert_eq!(e.field, "confidence"),
                    other => panic!("unexpected cause: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_correction_is_sent_then_cleared() {
        let memory = Arc::new(Memory::new());
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: Paris\nConfidence: high")
            .with_text_response("Answer: Paris\nConfidence: 0.8");
        let output = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new().memory(Arc::clone(&memory)))
            .await
            .unwrap();
        assert_eq!(output.retries, 1);

        let second = &model.recorded_requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert!(second[3]
            .text()
            .starts_with("The section labeled 'Confidence' does not match the expected format of 'number'."));

        let history = memory.history(None);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].text(), "Answer: Paris\nConfidence: 0.8");
        assert!(memory
            .entries(None)
            .iter()
            .all(|e| !e.has_tag(CORRECTION_TAG) && !e.has_tag(ERROR_TAG)));
    }

    #[tokio::test]
    async fn test_native_function_turn_uses_no_retry() {
        let model = MockModel::new("mock-1")
            .with_function_calls(vec![call("now")])
            .with_text_response("Answer: noon\nConfidence: 1");
        let output = generator()
            .with_functions(clock())
            .forward(&model, inputs("What time is it?"), &GenerateOptions::new().max_retries(0))
            .await
            .unwrap();

        assert_eq!(output.get_str("answer"), Some("noon"));
        assert_eq!(output.steps, 2);
        assert_eq!(output.retries, 0);
        assert_eq!(output.functions_executed, vec!["now".to_string()]);

        let requests = model.recorded_requests();
        assert_eq!(requests[0].params.functions.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Function);
        assert_eq!(last.text(), "12:00");
    }

    #[tokio::test]
    async fn test_text_mode_function_call() {
        let model = MockModel::new("mock-1")
            .with_profile(ModelProfile::text_only())
            .with_text_response("Function Name: now\nFunction Arguments: {}")
            .with_text_response("Answer: noon\nConfidence: 1");
        let output = generator()
            .with_functions(clock())
            .forward(&model, inputs("What time is it?"), &GenerateOptions::new())
            .await
            .unwrap();

        assert_eq!(output.functions_executed, vec!["now".to_string()]);
        assert!(!output.values.contains_key(FUNCTION_NAME_FIELD));
        assert!(!output.values.contains_key(FUNCTION_ARGUMENTS_FIELD));

        let requests = model.recorded_requests();
        assert!(requests[0].params.functions.is_empty());
        assert!(requests[0].messages[0].text().contains("Function Name"));
    }

    #[tokio::test]
    async fn test_unknown_function_is_fatal() {
        let model = MockModel::new("mock-1").with_function_calls(vec![call("weather")]);
        let err = generator()
            .with_functions(clock())
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Function(FunctionError::NotFound(name)) if name == "weather"));
    }

    #[tokio::test]
    async fn test_stop_function_ends_run() {
        let model = MockModel::new("mock-1").with_function_calls(vec![call("finish")]);
        let output = generator()
            .with_functions(clock())
            .forward(&model, inputs("q"), &GenerateOptions::new().stop_function("Finish"))
            .await
            .unwrap();
        assert_eq!(output.steps, 1);
        assert_eq!(output.functions_executed, vec!["finish".to_string()]);
        assert!(output.values.is_empty());
    }

    #[tokio::test]
    async fn test_steps_exhausted() {
        let model = MockModel::new("mock-1")
            .with_function_calls(vec![call("now")])
            .with_function_calls(vec![call("now")]);
        let err = generator()
            .with_functions(clock())
            .forward(&model, inputs("q"), &GenerateOptions::new().max_steps(2))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::StepsExhausted { max_steps: 2 }));
        assert_eq!(err.to_string(), "Max steps reached: 2");
    }

    #[tokio::test]
    async fn test_length_is_fatal() {
        let model = MockModel::new("mock-1").with_response(ChatResponse::new(vec![
            ChatResult::text("Answer: Par").with_finish_reason(FinishReason::Length),
        ]));
        let options = GenerateOptions::new()
            .model_settings(ModelSettings::new().max_tokens(8));
        let err = generator().forward(&model, inputs("q"), &options).await.unwrap_err();
        assert!(matches!(err, GenerateError::LengthExceeded { max_tokens: Some(8) }));
        assert_eq!(model.request_count(), 1);
    }

    #[tokio::test]
    async fn test_settings_are_layered() {
        let model = MockModel::new("mock-1").with_text_response("Answer: a\nConfidence: 1");
        let options = GenerateOptions::new().model_settings(ModelSettings::new().max_tokens(50));
        generator()
            .with_model_settings(ModelSettings::new().max_tokens(100).temperature(0.2))
            .forward(&model, inputs("q"), &options)
            .await
            .unwrap();

        let sent = &model.recorded_requests()[0].settings;
        assert_eq!(sent.max_tokens, Some(50));
        assert_eq!(sent.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn test_assertion_correction() {
        let generator = generator().with_assertion(Assertion::new(
            |v: &Values| v.get("answer").and_then(Value::as_str) != Some("Lyon"),
            "The answer must be the capital",
        ));
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: Lyon\nConfidence: 0.4")
            .with_text_response("Answer: Paris\nConfidence: 0.9");
        let output = generator
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("Paris"));

        let correction = model.recorded_requests()[1].messages[3].text();
        assert!(correction.contains("Past Answer: \"Lyon\""));
        assert!(correction.ends_with("Instructions: The answer must be the capital"));
    }

    #[tokio::test]
    async fn test_optional_assertion_falls_back() {
        let generator = generator().with_assertion(
            Assertion::new(|_: &Values| false, "Never satisfied").optional(),
        );
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: a\nConfidence: 1")
            .with_text_response("Answer: b\nConfidence: 2");
        let output = generator
            .forward(&model, inputs("q"), &GenerateOptions::new().max_retries(1))
            .await
            .unwrap();

        assert_eq!(output.get_str("answer"), Some("b"));
        assert!(!output.is_clean());
        assert_eq!(output.unmet_assertion.unwrap().message, "Never satisfied");
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let token = CancellationToken::new();
        token.cancel();
        let model = MockModel::new("mock-1").with_text_response("Answer: a\nConfidence: 1");
        let err = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new().cancel(token))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_function() {
        let token = CancellationToken::new();
        let registry = {
            let token = token.clone();
            FunctionRegistry::new()
                .with(
                    FunctionDefinition::new("slow", "Never returns"),
                    function_fn(move |_ctx, _args| {
                        let token = token.clone();
                        async move {
                            token.cancel();
                            std::future::pending::<()>().await;
                            Ok(json!(null))
                        }
                    }),
                )
                .unwrap()
        };
        let model = MockModel::new("mock-1")
            .with_function_calls(vec![call("slow")])
            .with_text_response("Answer: a\nConfidence: 1");

        let err = generator()
            .with_functions(registry)
            .forward(&model, inputs("q"), &GenerateOptions::new().cancel(token))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(model.request_count(), 1);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_mid_stream() {
        let token = CancellationToken::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let generator = {
            let token = token.clone();
            let seen = Arc::clone(&seen);
            generator().with_streaming_assertion(StreamingAssertion::new(
                "answer",
                move |text: &str, _done: bool| {
                    if !text.is_empty() {
                        seen.fetch_add(1, Ordering::SeqCst);
                        token.cancel();
                    }
                    true
                },
                "unused",
            ))
        };
        let model = MockModel::new("mock-1")
            .with_chunk_chars(3)
            .with_text_response("Answer: a rather long answer about Paris\nConfidence: 0.9")
            .with_text_response("Answer: b\nConfidence: 1");

        let err = generator
            .forward(&model, inputs("q"), &GenerateOptions::new().stream(true).cancel(token))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        // Cancelled on the first partial, so the rest of the stream was never read.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(model.request_count(), 1);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_session_busy() {
        let memory = Arc::new(Memory::new());
        let _held = memory.try_lock_session(Some("s1")).unwrap();
        let model = MockModel::new("mock-1");
        let options = GenerateOptions::new().memory(Arc::clone(&memory)).session_id("s1");
        let err = generator().forward(&model, inputs("q"), &options).await.unwrap_err();
        assert!(matches!(err, GenerateError::SessionBusy { session } if session == "s1"));
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn test_session_continues_without_second_system_prompt() {
        let memory = Arc::new(Memory::new());
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: a\nConfidence: 1")
            .with_text_response("Answer: b\nConfidence: 2");
        let options = GenerateOptions::new().memory(Arc::clone(&memory)).session_id("s1");
        let g = generator();
        g.forward(&model, inputs("first"), &options).await.unwrap();
        g.forward(&model, inputs("second"), &options).await.unwrap();

        let roles: Vec<ChatRole> = memory.history(Some("s1")).iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn test_internal_fields_are_stripped() {
        let generator = Generator::parse("question -> reasoning!, answer").unwrap();
        let model = MockModel::new("mock-1").with_text_response("Reasoning: think\nAnswer: 4");
        let output = generator
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(Value::Object(output.values), json!({"answer": "4"}));
    }

    #[tokio::test]
    async fn test_usage_ledger_and_limits() {
        let model = MockModel::new("mock-1")
            .with_system("acme")
            .with_text_and_usage("Answer: a", RequestUsage::with_tokens(10, 5))
            .with_text_and_usage("Answer: a\nConfidence: 1", RequestUsage::with_tokens(12, 6));
        let output = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(output.usage.calls("acme", "mock-1"), 2);
        assert_eq!(output.usage.total().total(), 33);
        assert_eq!(output.run_usage.request_count(), 2);

        let model = MockModel::new("mock-1")
            .with_text_and_usage("Answer: a", RequestUsage::with_tokens(10, 5))
            .with_text_and_usage("Answer: a\nConfidence: 1", RequestUsage::with_tokens(12, 6));
        let options = GenerateOptions::new().usage_limits(UsageLimits::new().max_requests(1));
        let err = generator().forward(&model, inputs("q"), &options).await.unwrap_err();
        assert!(matches!(err, GenerateError::UsageLimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_infra_retry_then_success() {
        let model = MockModel::new("mock-1")
            .with_error(ModelError::connection("reset by peer"))
            .with_text_response("Answer: a\nConfidence: 1");
        let retries = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&retries);
        let options = GenerateOptions::new()
            .infra_retry_delay(Duration::from_millis(1))
            .on_trace(move |event| {
                if matches!(event, TraceEvent::InfraRetry { .. }) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        let output = generator().forward(&model, inputs("q"), &options).await.unwrap();
        assert_eq!(output.retries, 0);
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(model.request_count(), 2);
    }

    #[tokio::test]
    async fn test_infra_retries_run_out() {
        let model = MockModel::new("mock-1")
            .with_error(ModelError::connection("down"))
            .with_error(ModelError::connection("down"));
        let options = GenerateOptions::new()
            .max_infra_retries(1)
            .infra_retry_delay(Duration::from_millis(1));
        let err = generator().forward(&model, inputs("q"), &options).await.unwrap_err();
        assert!(matches!(err, GenerateError::Model(ModelError::Connection(_))));
        assert_eq!(model.request_count(), 2);
    }

    #[tokio::test]
    async fn test_field_processor_continues() {
        let generator = generator().with_field_processor(FieldProcessor::from_fn(
            "answer",
            |value: Value, _| async move {
                Ok((value == json!("draft")).then(|| json!("too vague")))
            },
        ));
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: draft\nConfidence: 1")
            .with_text_response("Answer: final\nConfidence: 1");
        let output = generator
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("final"));
        assert_eq!(output.steps, 2);
        let second = model.recorded_requests()[1].messages.clone();
        assert!(second.last().unwrap().text().contains("\"too vague\""));
    }

    #[tokio::test]
    async fn test_step_callback_and_required_mode() {
        let steps: Arc<Mutex<Vec<StepInfo>>> = Arc::default();
        let sink = Arc::clone(&steps);
        let model = MockModel::new("mock-1")
            .with_function_calls(vec![call("now")])
            .with_text_response("Answer: noon\nConfidence: 1");
        let options = GenerateOptions::new()
            .function_call(FunctionCallMode::Required)
            .on_step(move |info| sink.lock().unwrap().push(info.clone()));
        generator()
            .with_functions(clock())
            .forward(&model, inputs("q"), &options)
            .await
            .unwrap();

        let seen = steps.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].functions_executed, vec!["now".to_string()]);
        assert!(seen[1].functions_executed.is_empty());

        let requests = model.recorded_requests();
        assert_eq!(requests[0].params.function_call, Some(FunctionCallMode::Required));
        assert_eq!(requests[1].params.function_call, None);
    }

    #[tokio::test]
    async fn test_function_model_sees_correction() {
        let model = FunctionModel::new(|messages, _| {
            let reply = if messages.len() > 2 {
                "Answer: fixed\nConfidence: 1"
            } else {
                "Answer: broken"
            };
            Ok(ChatResponse::text(reply))
        });
        let output = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("fixed"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_streamed_forward() {
        let model = MockModel::new("mock-1")
            .with_chunk_chars(3)
            .with_text_response("Answer: Paris\nConfidence: 0.9");
        let output = generator()
            .forward(&model, inputs("q"), &GenerateOptions::new().stream(true))
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("Paris"));
        assert!(model.recorded_requests()[0].streamed);
    }

    #[tokio::test]
    async fn test_streaming_assertion_retries() {
        let generator = generator().with_streaming_assertion(StreamingAssertion::new(
            "answer",
            |text: &str, _done: bool| !text.contains("Lyon"),
            "Do not mention Lyon",
        ));
        let model = MockModel::new("mock-1")
            .with_text_response("Answer: Lyon or Paris\nConfidence: 0.2")
            .with_text_response("Answer: Paris\nConfidence: 0.9");
        let output = generator
            .forward(&model, inputs("q"), &GenerateOptions::new().stream(true))
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("Paris"));
        assert_eq!(output.retries, 1);
    }

    #[tokio::test]
    async fn test_forward_stream_delivers_deltas() {
        let model: BoxedModel = Arc::new(
            MockModel::new("mock-1")
                .with_chunk_chars(2)
                .with_text_response("Answer: Paris is lovely\nConfidence: 0.9"),
        );
        let mut stream = generator().forward_stream(model, inputs("q"), GenerateOptions::new());

        let mut values = Values::new();
        let mut current = (0, 0);
        let mut text_deltas = 0;
        let mut output = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                GenerateEvent::Delta(delta) => {
                    if matches!(delta.delta, FieldDelta::Text(_)) {
                        text_deltas += 1;
                    }
                    apply_delta(&mut values, &mut current, &delta);
                }
                GenerateEvent::Done(out) => output = Some(out),
                _ => {}
            }
        }

        let output = output.unwrap();
        assert!(text_deltas > 1);
        assert_eq!(values, output.values);
        assert_eq!(values["answer"], json!("Paris is lovely"));
    }

    #[tokio::test]
    async fn test_forward_stream_output() {
        let model: BoxedModel = Arc::new(
            MockModel::new("mock-1")
                .with_profile(ModelProfile::default().with_streaming(false))
                .with_text_response("Answer: a\nConfidence: 1"),
        );
        let output = generator()
            .forward_stream(model, inputs("q"), GenerateOptions::new())
            .output()
            .await
            .unwrap();
        assert_eq!(output.get_str("answer"), Some("a"));
    }
}
