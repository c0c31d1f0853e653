//! Assertions over extracted values.
//!
//! An [`Assertion`] runs once all output fields are extracted. A
//! [`StreamingAssertion`] watches one field while its text arrives, and
//! once more when the field settles.
//!
//! A failing assertion becomes a correction for the model; an *optional*
//! one that keeps failing is tolerated and the last values are returned.

use serde_json::Value;
use sigil_extract::Values;
use sigil_signature::Field;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A rejected set of values.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Assertion failed: {message}")]
pub struct AssertionError {
    /// Values extracted when the assertion ran.
    pub values: Values,
    /// What the model should change.
    pub message: String,
    /// Whether exhausting retries on this error is tolerated.
    pub optional: bool,
}

impl AssertionError {
    /// Create an assertion error.
    #[must_use]
    pub fn new(values: Values, message: impl Into<String>, optional: bool) -> Self {
        Self {
            values,
            message: message.into(),
            optional,
        }
    }

    /// Corrective text for the model.
    ///
    /// Repeats each extracted output value as `Past Title: <json>` and ends
    /// with `Instructions: message`.
    ///
    /// ```rust
    /// use serde_json::json;
    /// use sigil_generate::AssertionError;
    /// use sigil_signature::Signature;
    ///
    /// let sig = Signature::parse("question -> answer").unwrap();
    /// let values = json!({"answer": "42"}).as_object().cloned().unwrap();
    /// let err = AssertionError::new(values, "Answer in words", false);
    /// assert_eq!(
    ///     err.correction(sig.output_fields()),
    ///     "Past Answer: \"42\"\nInstructions: Answer in words"
    /// );
    /// ```
    #[must_use]
    pub fn correction(&self, output_fields: &[Field]) -> String {
        let mut lines: Vec<String> = output_fields
            .iter()
            .filter_map(|field| {
                let value = self.values.get(&field.name)?;
                let json = serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
                Some(format!("Past {}: {json}", field.title))
            })
            .collect();
        lines.push(format!("Instructions: {}", self.message));
        lines.join("\n")
    }
}

type CheckFn = dyn Fn(&Values) -> bool + Send + Sync;
type StreamCheckFn = dyn Fn(&str, bool) -> bool + Send + Sync;

/// A check over the complete set of extracted values.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use sigil_generate::Assertion;
///
/// let positive = Assertion::new(
///     |values| values.get("score").and_then(|v| v.as_f64()).is_some_and(|s| s > 0.0),
///     "Score must be positive",
/// );
///
/// let ok = json!({"score": 3}).as_object().cloned().unwrap();
/// let bad = json!({"score": -1}).as_object().cloned().unwrap();
/// assert!(positive.check(&ok).is_ok());
/// assert_eq!(positive.check(&bad).unwrap_err().message, "Score must be positive");
/// ```
#[derive(Clone)]
pub struct Assertion {
    check: Arc<CheckFn>,
    message: String,
    optional: bool,
}

impl Assertion {
    /// Create a blocking assertion.
    pub fn new<F>(check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Values) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            message: message.into(),
            optional: false,
        }
    }

    /// Tolerate this assertion when retries run out.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Message sent to the model on failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether failure is tolerated once retries run out.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Run the check.
    pub fn check(&self, values: &Values) -> Result<(), AssertionError> {
        if (self.check)(values) {
            Ok(())
        } else {
            Err(AssertionError::new(
                values.clone(),
                self.message.clone(),
                self.optional,
            ))
        }
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("message", &self.message)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// A check over one output field's text while it streams.
///
/// The closure receives the text so far and whether the field has settled.
#[derive(Clone)]
pub struct StreamingAssertion {
    field: String,
    check: Arc<StreamCheckFn>,
    message: String,
    optional: bool,
}

impl StreamingAssertion {
    /// Create a streaming assertion on `field`.
    pub fn new<F>(field: impl Into<String>, check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            check: Arc::new(check),
            message: message.into(),
            optional: false,
        }
    }

    /// Tolerate this assertion when retries run out.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Field the assertion watches.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Run the check on `text`.
    ///
    /// `values` are the values settled so far; they are carried in the
    /// error for the correction message.
    pub fn check(&self, text: &str, done: bool, values: &Values) -> Result<(), AssertionError> {
        if (self.check)(text, done) {
            Ok(())
        } else {
            Err(AssertionError::new(
                values.clone(),
                self.message.clone(),
                self.optional,
            ))
        }
    }
}

impl fmt::Debug for StreamingAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingAssertion")
            .field("field", &self.field)
            .field("message", &self.message)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// Run every assertion, returning the first failure.
pub fn check_assertions(assertions: &[Assertion], values: &Values) -> Result<(), AssertionError> {
    assertions.iter().try_for_each(|a| a.check(values))
}

/// Run the streaming assertions watching `field`.
pub fn check_streaming_assertions(
    assertions: &[StreamingAssertion],
    field: &str,
    text: &str,
    done: bool,
    values: &Values,
) -> Result<(), AssertionError> {
    assertions
        .iter()
        .filter(|a| a.field == field)
        .try_for_each(|a| a.check(text, done, values))
}

/// Text a streaming assertion sees for a settled value.
pub(crate) fn settled_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sigil_signature::Signature;

    fn values(v: Value) -> Values {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_first_failure_wins() {
        let assertions = vec![
            Assertion::new(|_| true, "never"),
            Assertion::new(|v| v.contains_key("missing"), "first").optional(),
            Assertion::new(|_| false, "second"),
        ];
        let err = check_assertions(&assertions, &values(json!({"a": 1}))).unwrap_err();
        assert_eq!(err.message, "first");
        assert!(err.optional);
        assert_eq!(err.values, values(json!({"a": 1})));
    }

    #[test]
    fn test_correction_lists_values_in_field_order() {
        let sig = Signature::parse("question -> summary, score:number, tags:string[]").unwrap();
        let err = AssertionError::new(
            values(json!({"tags": ["a"], "summary": "short", "score": 2})),
            "Be longer",
            false,
        );
        assert_eq!(
            err.correction(sig.output_fields()),
            "Past Summary: \"short\"\nPast Score: 2\nPast Tags: [\"a\"]\nInstructions: Be longer"
        );
    }

    #[test]
    fn test_streaming_assertions_filter_by_field() {
        let assertions = vec![
            StreamingAssertion::new("answer", |text, _| !text.contains("sorry"), "No apologies"),
            StreamingAssertion::new("other", |_, _| false, "unrelated"),
        ];
        let settled = Values::new();
        assert!(check_streaming_assertions(&assertions, "answer", "fine", false, &settled).is_ok());
        let err =
            check_streaming_assertions(&assertions, "answer", "I am sorry", false, &settled).unwrap_err();
        assert_eq!(err.message, "No apologies");
    }

    #[test]
    fn test_streaming_assertion_sees_done_flag() {
        let assertion = StreamingAssertion::new("answer", |text, done| !done || text.len() > 3, "Too short");
        let settled = Values::new();
        assert!(assertion.check("ab", false, &settled).is_ok());
        assert!(assertion.check("ab", true, &settled).is_err());
    }

    #[test]
    fn test_settled_text() {
        assert_eq!(settled_text(&json!("plain")), "plain");
        assert_eq!(settled_text(&json!([1, 2])), "[1,2]");
    }
}
