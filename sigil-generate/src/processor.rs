//! Per-field post-processing.
//!
//! A field processor runs after a successful extraction on the value of
//! one output field. A non-empty result is shown to the model as a
//! `processor`-tagged user message, and the generator takes another step
//! so the model can use it.

use async_trait::async_trait;
use serde_json::Value;
use sigil_core::{ChatMessage, Memory};
use sigil_extract::Values;
use sigil_signature::{Field, FieldKind};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{GenerateError, GenerateResult};

/// Memory tag on processor output messages.
pub const PROCESSOR_TAG: &str = "processor";

/// Transforms one extracted value.
#[async_trait]
pub trait ProcessField: Send + Sync {
    /// Process `value`. `values` holds every extracted output.
    ///
    /// `Ok(None)` means nothing to report.
    async fn process(&self, value: &Value, values: &Values) -> anyhow::Result<Option<Value>>;
}

/// Adapter turning an async closure into a [`ProcessField`].
pub struct ProcessFn<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ProcessField for ProcessFn<F>
where
    F: Fn(Value, Values) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send,
{
    async fn process(&self, value: &Value, values: &Values) -> anyhow::Result<Option<Value>> {
        (self.func)(value.clone(), values.clone()).await
    }
}

/// A processor bound to an output field.
#[derive(Clone)]
pub struct FieldProcessor {
    field: String,
    processor: Arc<dyn ProcessField>,
}

impl FieldProcessor {
    /// Bind `processor` to `field`.
    pub fn new(field: impl Into<String>, processor: impl ProcessField + 'static) -> Self {
        Self {
            field: field.into(),
            processor: Arc::new(processor),
        }
    }

    /// Bind an async closure to `field`.
    ///
    /// ```rust
    /// use serde_json::{json, Value};
    /// use sigil_generate::FieldProcessor;
    ///
    /// let upper = FieldProcessor::from_fn("answer", |value: Value, _| async move {
    ///     Ok(value.as_str().map(|s| json!(s.to_uppercase())))
    /// });
    /// assert_eq!(upper.field(), "answer");
    /// ```
    pub fn from_fn<F, Fut>(field: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        Self::new(field, ProcessFn { func })
    }

    /// Field this processor watches.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Debug for FieldProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldProcessor")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// Run the processors whose field is present in `values`.
///
/// Returns whether any of them reported output.
pub async fn run_processors(
    processors: &[FieldProcessor],
    output_fields: &[Field],
    values: &Values,
    memory: &Memory,
    session_id: Option<&str>,
) -> GenerateResult<bool> {
    let mut reported = false;

    for processor in processors {
        let Some(value) = values.get(&processor.field) else {
            continue;
        };
        let Some(field) = output_fields.iter().find(|f| f.name == processor.field) else {
            continue;
        };

        let result = processor
            .processor
            .process(value, values)
            .await
            .map_err(|e| GenerateError::processor(&processor.field, e))?;
        let Some(result) = result.filter(|v| !is_empty_result(v)) else {
            continue;
        };

        memory.add(ChatMessage::user(processor_message(field, &result)), session_id);
        memory.add_tag(PROCESSOR_TAG, session_id);
        reported = true;
    }

    Ok(reported)
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => matches!(s.trim(), "" | "null" | "undefined"),
        _ => false,
    }
}

fn processor_message(field: &Field, result: &Value) -> String {
    let json = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    if field.kind() == FieldKind::Code {
        format!(
            "Code in the field \"{}\" was executed. The code execution produced the following output: {json}",
            field.title
        )
    } else {
        format!(
            "The field \"{}\" was processed. The field contents were transformed into the following output: {json}",
            field.title
        )
    }
}
