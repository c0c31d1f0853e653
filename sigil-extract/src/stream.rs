//! Incremental extraction over a growing text buffer.
//!
//! [`StreamExtractor`] keeps an [`ExtractionState`] cursor so that every
//! [`push`](StreamExtractor::push) only scans the newly arrived suffix (plus
//! a window the length of the longest label, to catch labels split across
//! chunks).
//!
//! A label is `Title:`. From the cursor, the next label is the earliest
//! occurrence of any label belonging to a field after the open one; on
//! equal start offsets the lower field index wins. Fields jumped over are
//! absent. A field's value is *settled* once the next label has been seen,
//! or when [`finish`](StreamExtractor::finish) is called.
//!
//! Titles never contain `:`, so one label can only occur inside another as
//! a suffix sharing the same end offset. Both become visible on the same
//! push, which makes the result independent of how the text is chunked.

use serde_json::{Map, Value};
use sigil_signature::Field;

use crate::coerce::coerce_segment;
use crate::error::{ExtractResult, ValidationError};

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::trace;

#[cfg(not(feature = "tracing-integration"))]
macro_rules! trace { ($($arg:tt)*) => {} }

/// Extracted values keyed by field name, in settle order.
pub type Values = Map<String, Value>;

/// Cursor state carried between pushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionState {
    /// Index of the field whose value is currently arriving.
    pub open: Option<usize>,
    /// Byte offset where the open field's value starts.
    pub value_start: usize,
    /// Byte offset the next label search starts from.
    pub scan_from: usize,
    /// Fields below this index are settled or skipped.
    pub next_field: usize,
}

/// Streaming field extractor.
///
/// # Example
///
/// ```rust
/// use sigil_extract::StreamExtractor;
/// use sigil_signature::Signature;
///
/// let sig = Signature::parse("question -> answer, score:number").unwrap();
/// let mut extractor = StreamExtractor::new(sig.output_fields().to_vec());
///
/// assert!(extractor.push("Answer: forty").unwrap().is_empty());
/// let settled = extractor.push(" two\nScore: 4").unwrap();
/// assert_eq!(settled[0].0, "answer");
///
/// let last = extractor.finish().unwrap();
/// assert_eq!(last[0].1, 4);
/// ```
#[derive(Debug, Clone)]
pub struct StreamExtractor {
    fields: Vec<Field>,
    labels: Vec<String>,
    max_label_len: usize,
    buffer: String,
    state: ExtractionState,
    values: Values,
    require: bool,
    finished: bool,
}

impl StreamExtractor {
    /// Create an extractor that enforces required fields.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        let labels: Vec<String> = fields.iter().map(Field::label).collect();
        let max_label_len = labels.iter().map(String::len).max().unwrap_or(0);
        Self {
            fields,
            labels,
            max_label_len,
            buffer: String::new(),
            state: ExtractionState::default(),
            values: Values::new(),
            require: true,
            finished: false,
        }
    }

    /// Create an extractor that tolerates missing required fields.
    ///
    /// Used for turns where the model may answer with function calls only.
    #[must_use]
    pub fn lenient(fields: Vec<Field>) -> Self {
        Self {
            require: false,
            ..Self::new(fields)
        }
    }

    /// Append text and return the values that became settled.
    pub fn push(&mut self, delta: &str) -> ExtractResult<Vec<(String, Value)>> {
        self.buffer.push_str(delta);
        let mut settled = Vec::new();

        while let Some((index, at)) = self.next_label() {
            if let Some(open) = self.state.open {
                let value = self.coerce(open, self.state.value_start, Some(at))?;
                self.record(open, value, &mut settled);
            }
            self.check_skipped(index)?;

            trace!(field = %self.fields[index].name, offset = at, "Found field label");
            self.state.open = Some(index);
            self.state.value_start = at + self.labels[index].len();
            self.state.scan_from = self.state.value_start;
            self.state.next_field = index + 1;
        }

        // Nothing starting before this point can still complete a label.
        let window_start = self
            .buffer
            .len()
            .saturating_sub(self.max_label_len.saturating_sub(1));
        let window_start = floor_char_boundary(&self.buffer, window_start);
        self.state.scan_from = self.state.scan_from.max(window_start);

        Ok(settled)
    }

    /// Flush the open field and check that every required field appeared.
    ///
    /// Returns the values settled by this call. Calling `finish` twice
    /// returns an empty list the second time.
    pub fn finish(&mut self) -> ExtractResult<Vec<(String, Value)>> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.finished = true;

        let mut settled = Vec::new();
        if let Some(open) = self.state.open {
            let value = self.coerce(open, self.state.value_start, None)?;
            self.record(open, value, &mut settled);
            self.state.open = None;
        }
        self.check_skipped(self.fields.len())?;
        self.state.next_field = self.fields.len();
        Ok(settled)
    }

    /// The open field and its value text received so far.
    #[must_use]
    pub fn partial(&self) -> Option<(&Field, &str)> {
        let open = self.state.open?;
        Some((&self.fields[open], &self.buffer[self.state.value_start..]))
    }

    /// Like [`partial`](Self::partial), but cut before any text that could
    /// still turn out to be the start of the next label.
    #[must_use]
    pub fn stable_partial(&self) -> Option<(&Field, &str)> {
        let open = self.state.open?;
        let end = self.state.scan_from.max(self.state.value_start);
        Some((&self.fields[open], &self.buffer[self.state.value_start..end]))
    }

    /// All settled values.
    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Consume the extractor, returning the settled values.
    #[must_use]
    pub fn into_values(self) -> Values {
        self.values
    }

    /// Current cursor.
    #[must_use]
    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    /// Everything pushed so far.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Fields this extractor looks for.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn next_label(&self) -> Option<(usize, usize)> {
        let from = self.state.scan_from;
        let haystack = self.buffer.get(from..)?;
        let mut best: Option<(usize, usize)> = None;
        for index in self.state.next_field..self.fields.len() {
            if let Some(pos) = haystack.find(self.labels[index].as_str()) {
                if best.map_or(true, |(_, p)| pos < p) {
                    best = Some((index, pos));
                }
            }
        }
        best.map(|(index, pos)| (index, from + pos))
    }

    fn coerce(&self, index: usize, start: usize, end: Option<usize>) -> ExtractResult<Option<Value>> {
        let raw = match end {
            Some(end) => &self.buffer[start..end],
            None => &self.buffer[start..],
        };
        coerce_segment(&self.fields[index], raw, self.require)
    }

    fn record(&mut self, index: usize, value: Option<Value>, settled: &mut Vec<(String, Value)>) {
        if let Some(value) = value {
            let name = self.fields[index].name.clone();
            self.values.insert(name.clone(), value.clone());
            settled.push((name, value));
        }
    }

    fn check_skipped(&self, upto: usize) -> ExtractResult<()> {
        if !self.require {
            return Ok(());
        }
        match self.fields[self.state.next_field..upto]
            .iter()
            .find(|f| !f.is_optional)
        {
            Some(field) => Err(ValidationError::not_found(field)),
            None => Ok(()),
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sigil_signature::Signature;

    fn outputs(dsl: &str) -> Vec<Field> {
        Signature::parse(dsl).unwrap().output_fields().to_vec()
    }

    #[test]
    fn test_settles_on_next_label() {
        let mut x = StreamExtractor::new(outputs("question -> firstPart, secondPart:number"));
        assert!(x.push("First Pa").unwrap().is_empty());
        assert!(x.partial().is_none());
        assert!(x.push("rt: hello").unwrap().is_empty());
        assert_eq!(x.partial().map(|(f, v)| (f.name.as_str(), v)), Some(("firstPart", " hello")));

        let settled = x.push("\nSecond Part: 7").unwrap();
        assert_eq!(settled, vec![("firstPart".to_string(), json!("hello"))]);
        assert_eq!(x.finish().unwrap(), vec![("secondPart".to_string(), json!(7))]);
        assert_eq!(x.values().len(), 2);
        assert!(x.finish().unwrap().is_empty());
    }

    #[test]
    fn test_label_split_across_chunks() {
        let mut x = StreamExtractor::new(outputs("question -> alpha, beta"));
        x.push("Alpha: one\nBe").unwrap();
        let settled = x.push("ta: two").unwrap();
        assert_eq!(settled, vec![("alpha".to_string(), json!("one"))]);
    }

    #[test]
    fn test_skipped_required_field_fails_early() {
        let mut x = StreamExtractor::new(outputs("question -> alpha, beta, gamma"));
        x.push("Alpha: 1\n").unwrap();
        let err = x.push("Gamma: 3").unwrap_err();
        assert_eq!(err.field, "beta");
        assert_eq!(err.message, "Required field not found");
    }

    #[test]
    fn test_lenient_skips_required_checks() {
        let mut x = StreamExtractor::lenient(outputs("question -> alpha, beta"));
        x.push("Beta: only").unwrap();
        x.finish().unwrap();
        assert_eq!(x.into_values(), json!({"beta": "only"}).as_object().cloned().unwrap());
    }

    #[test]
    fn test_cursor_advances() {
        let mut x = StreamExtractor::new(outputs("question -> alpha, beta"));
        x.push("Alpha: a long value without any labels in it").unwrap();
        let state = x.state().clone();
        assert_eq!(state.open, Some(0));
        assert_eq!(state.value_start, "Alpha:".len());
        assert!(state.scan_from > state.value_start);
        assert_eq!(state.scan_from, x.buffer().len() - ("Alpha:".len() - 1));
    }

    #[test]
    fn test_stable_partial_holds_back_label_window() {
        let mut x = StreamExtractor::new(outputs("question -> alpha, beta"));
        x.push("Alpha: hello wor").unwrap();
        assert_eq!(x.stable_partial().map(|(_, v)| v), Some(" hell"));
        x.push("ld\nBe").unwrap();
        assert_eq!(x.stable_partial().map(|(_, v)| v), Some(" hello wor"));
        assert_eq!(x.partial().map(|(_, v)| v), Some(" hello world\nBe"));
    }

    #[test]
    fn test_multibyte_text() {
        let mut x = StreamExtractor::new(outputs("question -> alpha, beta"));
        for c in "Alpha: héllo wörld ✓\nBeta: ünïcode".chars() {
            x.push(&c.to_string()).unwrap();
        }
        x.finish().unwrap();
        assert_eq!(x.values()["alpha"], "héllo wörld ✓");
        assert_eq!(x.values()["beta"], "ünïcode");
    }
}
