//! Streaming delivery of partial values.
//!
//! [`Generator::forward_stream`](crate::Generator::forward_stream) runs the
//! generator on a background task and sends [`GenerateEvent`]s through a
//! channel. String fields arrive as text deltas while the model writes them;
//! other fields arrive whole once settled.
//!
//! Deltas carry the step and attempt they belong to. When an attempt is
//! retried, values already delivered for it are void and the consumer
//! should start over from the deltas of the new attempt.

use futures::{Stream, StreamExt};
use serde_json::Value;
use sigil_extract::Values;
use sigil_signature::{Field, FieldKind};
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::{GenerateError, GenerateResult};
use crate::output::GenerateOutput;

/// Change to one output field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDelta {
    /// Text to append to a string field.
    Text(String),
    /// The complete value of a field.
    Value(Value),
}

/// A partial value from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateDelta {
    /// Step index.
    pub step: usize,
    /// Attempt within the step.
    pub attempt: usize,
    /// Field name.
    pub field: String,
    /// The change.
    pub delta: FieldDelta,
}

/// Events of a streamed run.
#[derive(Debug, Clone)]
pub enum GenerateEvent {
    /// A model request is starting.
    AttemptStart {
        /// Step index.
        step: usize,
        /// Attempt within the step.
        attempt: usize,
    },
    /// A field changed.
    Delta(GenerateDelta),
    /// Functions ran; the next step follows.
    FunctionsExecuted {
        /// Step index.
        step: usize,
        /// Lower-cased function names.
        names: Vec<String>,
    },
    /// The run finished.
    Done(GenerateOutput),
}

pub(crate) type EventSender = mpsc::Sender<GenerateResult<GenerateEvent>>;

/// Events of a streamed run, ending with [`GenerateEvent::Done`] or an
/// error.
///
/// Dropping the stream cancels the run.
pub struct GenerateStream {
    rx: mpsc::Receiver<GenerateResult<GenerateEvent>>,
}

impl GenerateStream {
    pub(crate) fn new(rx: mpsc::Receiver<GenerateResult<GenerateEvent>>) -> Self {
        Self { rx }
    }

    /// Drain the stream and return the final output.
    pub async fn output(mut self) -> GenerateResult<GenerateOutput> {
        while let Some(event) = self.next().await {
            if let GenerateEvent::Done(output) = event? {
                return Ok(output);
            }
        }
        Err(GenerateError::Aborted)
    }
}

impl Stream for GenerateStream {
    type Item = GenerateResult<GenerateEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_recv(cx)
    }
}

/// Fold deltas into a snapshot of the values of the latest attempt.
///
/// ```rust
/// use serde_json::json;
/// use sigil_generate::{FieldDelta, GenerateDelta, apply_delta};
/// use sigil_extract::Values;
///
/// let mut values = Values::new();
/// let mut attempt = (0, 0);
/// for text in ["Hel", "lo"] {
///     let delta = GenerateDelta {
///         step: 0,
///         attempt: 0,
///         field: "answer".into(),
///         delta: FieldDelta::Text(text.into()),
///     };
///     apply_delta(&mut values, &mut attempt, &delta);
/// }
/// assert_eq!(values["answer"], json!("Hello"));
/// ```
pub fn apply_delta(values: &mut Values, current: &mut (usize, usize), delta: &GenerateDelta) {
    let version = (delta.step, delta.attempt);
    if version != *current {
        values.clear();
        *current = version;
    }
    match &delta.delta {
        FieldDelta::Text(text) => match values.get_mut(&delta.field) {
            Some(Value::String(existing)) => existing.push_str(text),
            _ => {
                values.insert(delta.field.clone(), Value::String(text.clone()));
            }
        },
        FieldDelta::Value(value) => {
            values.insert(delta.field.clone(), value.clone());
        }
    }
}

/// Tracks what was already delivered for one attempt.
#[derive(Debug, Default)]
pub(crate) struct DeltaTracker {
    step: usize,
    attempt: usize,
    sent_text: HashMap<String, String>,
}

fn streams_as_text(field: &Field) -> bool {
    field.kind() == FieldKind::String && !field.is_array()
}

/// Could still turn into an empty-value marker.
fn may_become_empty(text: &str) -> bool {
    ["null", "NULL", "undefined"]
        .iter()
        .any(|marker| marker.starts_with(text))
}

impl DeltaTracker {
    pub(crate) fn new(step: usize, attempt: usize) -> Self {
        Self {
            step,
            attempt,
            sent_text: HashMap::new(),
        }
    }

    fn delta(&self, field: &str, delta: FieldDelta) -> GenerateDelta {
        GenerateDelta {
            step: self.step,
            attempt: self.attempt,
            field: field.to_string(),
            delta,
        }
    }

    /// Growth of an open string field.
    ///
    /// `stable` must be text that cannot still turn into the next label.
    pub(crate) fn partial(&mut self, field: &Field, stable: &str) -> Option<GenerateDelta> {
        if !streams_as_text(field) {
            return None;
        }
        let text = stable.trim();
        if text.is_empty() || may_become_empty(text) {
            return None;
        }
        let sent = self.sent_text.entry(field.name.clone()).or_default();
        let suffix = text.strip_prefix(sent.as_str())?;
        if suffix.is_empty() {
            return None;
        }
        let suffix = suffix.to_string();
        sent.push_str(&suffix);
        Some(self.delta(&field.name, FieldDelta::Text(suffix)))
    }

    /// Final delta for a settled field.
    pub(crate) fn settled(&mut self, field: &Field, value: &Value) -> Option<GenerateDelta> {
        let sent = self.sent_text.remove(&field.name).unwrap_or_default();
        match value {
            Value::String(s) if streams_as_text(field) => match s.strip_prefix(sent.as_str()) {
                Some("") => None,
                Some(rest) => Some(self.delta(&field.name, FieldDelta::Text(rest.to_string()))),
                None => Some(self.delta(&field.name, FieldDelta::Value(value.clone()))),
            },
            _ => Some(self.delta(&field.name, FieldDelta::Value(value.clone()))),
        }
    }
}
