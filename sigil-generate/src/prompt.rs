//! Prompt rendering.
//!
//! [`PromptRenderer`] turns a signature, input values, examples and demos
//! into the system and user messages sent to the model. The system text
//! names every output label (`Title:`) the model must emit; the user
//! message carries the input values, with image and audio inputs as
//! separate content parts.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sigil_core::{ChatMessage, ContentPart, MessageContent};
use sigil_extract::datetime::{format_date, format_datetime_for_prompt, parse_date, parse_datetime};
use sigil_extract::Values;
use sigil_functions::{FunctionDefinition, FUNCTION_ARGUMENTS_FIELD, FUNCTION_NAME_FIELD};
use sigil_signature::{Field, FieldKind, Signature};
use thiserror::Error;

const FUNCTION_CALL_INSTRUCTIONS: &str = "## Function Call Instructions
- Complete the task, using the functions defined earlier in this prompt.
- Call functions step-by-step, using the output of one function as input to the next.
- Use the function results to generate the output fields.";

const FORMATTING_RULES: &str = "## Strict Output Formatting Rules
- Output must strictly follow the defined plain-text `field name: value` field format.
- Output field, values must strictly adhere to the specified output field formatting rules.
- Do not add any text before or after the output fields, just the field name and value.
- Do not use code blocks.";

const DEFAULT_AUDIO_FORMAT: &str = "wav";

/// Errors raised while rendering a prompt.
///
/// These are caller input problems and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// A required input value is absent.
    #[error("Value for input field '{field}' is required.")]
    MissingInput {
        /// Field name.
        field: String,
    },

    /// An input value has the wrong type.
    #[error("{message}")]
    InvalidInput {
        /// Field name.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// An image or audio value is malformed.
    #[error("Invalid media value for field '{field}': {message}")]
    InvalidMedia {
        /// Field name.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// An example cannot be rendered.
    #[error("{message}")]
    InvalidExample {
        /// Position of the example.
        index: usize,
        /// What went wrong.
        message: String,
    },
}

/// Result type for prompt rendering.
pub type PromptResult<T> = Result<T, PromptError>;

/// Renders the messages for one signature.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use sigil_generate::PromptRenderer;
/// use sigil_signature::Signature;
///
/// let sig = Signature::parse("question -> answer").unwrap();
/// let renderer = PromptRenderer::new(sig);
///
/// let system = renderer.system_prompt().unwrap();
/// assert!(system.starts_with(
///     "You will be provided with the following fields: `Question`. Your task is to generate new fields: `Answer`."
/// ));
///
/// let inputs = json!({"question": "Why?"}).as_object().cloned().unwrap();
/// assert_eq!(renderer.render_user(&inputs).unwrap().to_text(), "Question: Why?\n");
/// ```
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    signature: Signature,
    functions: Vec<FunctionDefinition>,
    examples: Vec<Values>,
    demos: Vec<Values>,
}

impl PromptRenderer {
    /// Create a renderer for `signature`.
    #[must_use]
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            functions: Vec::new(),
            examples: Vec::new(),
            demos: Vec::new(),
        }
    }

    /// List these functions in the system prompt.
    #[must_use]
    pub fn with_functions(mut self, functions: Vec<FunctionDefinition>) -> Self {
        self.functions = functions;
        self
    }

    /// Render these examples. Each must contain at least one output value.
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<Values>) -> Self {
        self.examples = examples;
        self
    }

    /// Render these demos after the examples.
    #[must_use]
    pub fn with_demos(mut self, demos: Vec<Values>) -> Self {
        self.demos = demos;
        self
    }

    /// The signature being rendered.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// System message followed by the user message.
    pub fn render(&self, inputs: &Values) -> PromptResult<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.system_prompt()?),
            ChatMessage::user(self.render_user(inputs)?),
        ])
    }

    /// Task description, field lists, rules and examples.
    pub fn system_prompt(&self) -> PromptResult<String> {
        let mut text = self.task_text();
        let examples = self.render_examples()?;
        if !examples.is_empty() {
            text.push_str("\n\n## Examples\n");
            text.push_str(&examples);
        }
        Ok(text)
    }

    /// Input values as the user message content.
    ///
    /// Text-only inputs render to plain text; image and audio inputs turn
    /// the content into a list of parts.
    pub fn render_user(&self, inputs: &Values) -> PromptResult<MessageContent> {
        let mut parts: Vec<ContentPart> = Vec::new();

        for field in self.signature.input_fields() {
            let Some(value) = inputs.get(&field.name).filter(|v| !is_empty_input(v)) else {
                if field.is_optional {
                    continue;
                }
                return Err(PromptError::MissingInput {
                    field: field.name.clone(),
                });
            };

            match field.kind() {
                FieldKind::Image => {
                    parts.push(ContentPart::text(format!("{}: ", field.title)));
                    parts.push(image_part(field, value)?);
                }
                FieldKind::Audio => {
                    parts.push(ContentPart::text(format!("{}: ", field.title)));
                    parts.push(audio_part(field, value)?);
                }
                _ => parts.push(ContentPart::text(format!(
                    "{}\n",
                    render_field(field, value)?
                ))),
            }
        }

        Ok(join_parts(parts))
    }

    fn task_text(&self) -> String {
        let mut sections = vec![self.task_line()];

        if !self.functions.is_empty() {
            let rows: Vec<String> = self
                .functions
                .iter()
                .map(|f| format!("- `{}`: {}", f.name, format_description(&f.description)))
                .collect();
            sections.push(format!("## Available Functions\n{}", rows.join("\n")));
        }

        let inputs: Vec<String> = self
            .signature
            .input_fields()
            .iter()
            .map(describe_input)
            .collect();
        sections.push(format!("## Input Fields\n{}", inputs.join("\n")));

        let outputs: Vec<String> = self
            .signature
            .output_fields()
            .iter()
            .map(describe_output)
            .collect();
        sections.push(format!("## Output Fields\n{}", outputs.join("\n")));

        if !self.functions.is_empty() {
            sections.push(FUNCTION_CALL_INSTRUCTIONS.to_string());
        }
        sections.push(FORMATTING_RULES.to_string());

        if let Some(description) = self.signature.description() {
            sections.push(format_description(description));
        }

        sections.join("\n\n")
    }

    fn task_line(&self) -> String {
        let titles = |fields: &[Field]| {
            fields
                .iter()
                .map(|f| format!("`{}`", f.title))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "You will be provided with the following fields: {}. Your task is to generate new fields: {}.",
            titles(self.signature.input_fields()),
            titles(self.signature.output_fields())
        )
    }

    fn render_examples(&self) -> PromptResult<String> {
        let inputs = self.signature.input_fields();
        let outputs = self.signature.output_fields();
        let mut items: Vec<Vec<String>> = Vec::new();

        for (index, example) in self.examples.iter().enumerate() {
            let rendered_outputs = render_text_fields(outputs, example)?;
            if rendered_outputs.is_empty() {
                return Err(PromptError::InvalidExample {
                    index,
                    message: format!(
                        "Output fields are required in examples: index: {index}, data: {}",
                        Value::Object(example.clone())
                    ),
                });
            }
            let mut item = render_text_fields(inputs, example)?;
            item.extend(rendered_outputs);
            items.push(item);
        }

        for demo in &self.demos {
            let mut item = render_text_fields(inputs, demo)?;
            item.extend(render_text_fields(outputs, demo)?);
            if !item.is_empty() {
                items.push(item);
            }
        }

        let mut text = String::new();
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                text.push_str("---\n\n");
            }
            for line in item {
                text.push_str(line);
                text.push('\n');
            }
        }
        Ok(text)
    }
}

/// Optional output fields used to request function calls from models
/// without native function calling.
#[must_use]
pub fn function_call_fields(functions: &[FunctionDefinition]) -> [Field; 2] {
    let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    [
        Field::new(FUNCTION_NAME_FIELD)
            .description(format!(
                "Name of the function to call, one of: {}",
                names.join(", ")
            ))
            .optional(),
        Field::new(FUNCTION_ARGUMENTS_FIELD)
            .kind_of(FieldKind::Json)
            .description("Arguments for the function call as a JSON object")
            .optional(),
    ]
}

/// Trim, capitalise the first letter and end with a period.
///
/// ```rust
/// use sigil_generate::prompt::format_description;
///
/// assert_eq!(format_description("  answer briefly "), "Answer briefly.");
/// assert_eq!(format_description("Done."), "Done.");
/// assert_eq!(format_description("   "), "");
/// ```
#[must_use]
pub fn format_description(description: &str) -> String {
    let trimmed = description.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out: String = first.to_uppercase().chain(chars).collect();
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

fn describe_input(field: &Field) -> String {
    let kind = field.type_description();
    let phrase = if field.is_optional {
        format!("This optional {kind} field may be omitted")
    } else {
        format!("A {kind} field")
    };
    describe_row(field, &phrase)
}

fn describe_output(field: &Field) -> String {
    let kind = field.type_description();
    let phrase = if field.is_optional {
        format!("Only include this {kind} field if its value is available")
    } else {
        format!("This {kind} field must be included")
    };
    describe_row(field, &phrase)
}

fn describe_row(field: &Field, phrase: &str) -> String {
    let description = field
        .description
        .as_deref()
        .map(format_description)
        .unwrap_or_default();
    format!("{}: ({phrase}) {description}", field.title)
        .trim_end()
        .to_string()
}

fn is_empty_input(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `Title: value` lines for the present, non-media fields of `values`.
fn render_text_fields(fields: &[Field], values: &Values) -> PromptResult<Vec<String>> {
    fields
        .iter()
        .filter(|f| !f.kind().is_media())
        .filter_map(|f| {
            let value = values.get(&f.name).filter(|v| !is_empty_input(v))?;
            Some(render_field(f, value))
        })
        .collect()
}

fn render_field(field: &Field, value: &Value) -> PromptResult<String> {
    if field.is_array() && field.kind() != FieldKind::Json {
        let Value::Array(items) = value else {
            return Err(type_mismatch(field, value));
        };
        let rows = items
            .iter()
            .map(|item| render_scalar(field, item).map(|s| format!("- {s}")))
            .collect::<PromptResult<Vec<_>>>()?;
        return Ok(format!("{}: \n{}", field.title, rows.join("\n")));
    }
    Ok(format!("{}: {}", field.title, render_scalar(field, value)?))
}

fn render_scalar(field: &Field, value: &Value) -> PromptResult<String> {
    let invalid = |message: String| PromptError::InvalidInput {
        field: field.name.clone(),
        message,
    };

    match (field.kind(), value) {
        (FieldKind::Json, v) => Ok(pretty(v)),
        (FieldKind::Date, Value::String(s)) => parse_date(s)
            .map(format_date)
            .map_err(|e| invalid(format!("Invalid date for '{}': {e}", field.name))),
        (FieldKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| parse_datetime(s))
            .map(format_datetime_for_prompt)
            .map_err(|e| invalid(format!("Invalid date time for '{}': {e}", field.name))),
        (FieldKind::String | FieldKind::Code | FieldKind::Class, Value::String(s)) => Ok(s.clone()),
        (FieldKind::Number, v @ Value::Number(_)) | (FieldKind::Boolean, v @ Value::Bool(_)) => {
            Ok(v.to_string())
        }
        (_, v) => Err(type_mismatch(field, v)),
    }
}

fn type_mismatch(field: &Field, value: &Value) -> PromptError {
    PromptError::InvalidInput {
        field: field.name.clone(),
        message: format!(
            "Validation failed: Expected '{}' to be a {} instead got {}",
            field.name,
            field.type_description(),
            json_type_name(value)
        ),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn media_string<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn image_part(field: &Field, value: &Value) -> PromptResult<ContentPart> {
    match (media_string(value, "mimeType"), media_string(value, "data")) {
        (Some(mime_type), Some(data)) => Ok(ContentPart::Image {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        }),
        _ => Err(PromptError::InvalidMedia {
            field: field.name.clone(),
            message: "expected an object with 'mimeType' and 'data'".into(),
        }),
    }
}

fn audio_part(field: &Field, value: &Value) -> PromptResult<ContentPart> {
    let Some(data) = media_string(value, "data") else {
        return Err(PromptError::InvalidMedia {
            field: field.name.clone(),
            message: "expected an object with 'data' and an optional 'format'".into(),
        });
    };
    Ok(ContentPart::Audio {
        format: media_string(value, "format")
            .unwrap_or(DEFAULT_AUDIO_FORMAT)
            .to_string(),
        data: data.to_string(),
    })
}

/// Fields are separated by a blank line; media keep their own parts.
fn join_parts(parts: Vec<ContentPart>) -> MessageContent {
    let mut joined: Vec<ContentPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match (joined.last_mut(), part) {
            (Some(ContentPart::Text { text: prev }), ContentPart::Text { text }) => {
                prev.push('\n');
                prev.push_str(&text);
            }
            (_, part) => joined.push(part),
        }
    }

    match joined.as_slice() {
        [] => MessageContent::Text(String::new()),
        [ContentPart::Text { text }] => MessageContent::Text(text.clone()),
        _ => MessageContent::Parts(joined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn values(v: Value) -> Values {
        v.as_object().cloned().unwrap()
    }

    fn renderer(dsl: &str) -> PromptRenderer {
        PromptRenderer::new(Signature::parse(dsl).unwrap())
    }

    #[test]
    fn test_system_prompt_sections() {
        let r = renderer(
            r#""answer questions" question "the user question", context? -> answer, score:number "confidence", notes?"#,
        );
        let expected = "You will be provided with the following fields: `Question`, `Context`. Your task is to generate new fields: `Answer`, `Score`, `Notes`.

## Input Fields
Question: (A string field) The user question.
Context: (This optional string field may be omitted)

## Output Fields
Answer: (This string field must be included)
Score: (This number field must be included) Confidence.
Notes: (Only include this string field if its value is available)

## Strict Output Formatting Rules
- Output must strictly follow the defined plain-text `field name: value` field format.
- Output field, values must strictly adhere to the specified output field formatting rules.
- Do not add any text before or after the output fields, just the field name and value.
- Do not use code blocks.

Answer questions.";
        assert_eq!(r.system_prompt().unwrap(), expected);
    }

    #[test]
    fn test_functions_are_listed() {
        let r = renderer("question -> answer").with_functions(vec![FunctionDefinition::new(
            "get_weather",
            "current weather for a city",
        )]);
        let system = r.system_prompt().unwrap();
        assert!(system.contains("## Available Functions\n- `get_weather`: Current weather for a city."));
        assert!(system.contains("## Function Call Instructions\n- Complete the task"));
        let functions_at = system.find("## Available Functions").unwrap();
        let inputs_at = system.find("## Input Fields").unwrap();
        assert!(functions_at < inputs_at);
    }

    #[test]
    fn test_examples_and_demos() {
        let r = renderer("question -> answer")
            .with_examples(vec![
                values(json!({"question": "1+1?", "answer": "2"})),
                values(json!({"question": "2+2?", "answer": "4"})),
            ])
            .with_demos(vec![values(json!({"question": "3+3?", "answer": "6"}))]);
        let system = r.system_prompt().unwrap();
        let examples = system.split("## Examples\n").nth(1).unwrap();
        assert_eq!(
            examples,
            "Question: 1+1?\nAnswer: 2\n---\n\nQuestion: 2+2?\nAnswer: 4\n---\n\nQuestion: 3+3?\nAnswer: 6\n"
        );
    }

    #[test]
    fn test_example_without_outputs_fails() {
        let r = renderer("question -> answer")
            .with_examples(vec![values(json!({"question": "no answer"}))]);
        let err = r.system_prompt().unwrap_err();
        assert!(matches!(err, PromptError::InvalidExample { index: 0, .. }));
        assert!(err.to_string().starts_with("Output fields are required in examples: index: 0"));
    }

    #[test]
    fn test_user_message_fields() {
        let r = renderer("question, tags:string[], limits:json, count:number, strict:boolean -> answer");
        let content = r
            .render_user(&values(json!({
                "question": "What?",
                "tags": ["a", "b"],
                "limits": {"max": 3},
                "count": 2,
                "strict": false
            })))
            .unwrap();
        assert_eq!(
            content.to_text(),
            "Question: What?\n\nTags: \n- a\n- b\n\nLimits: {\n  \"max\": 3\n}\n\nCount: 2\n\nStrict: false\n"
        );
    }

    #[test]
    fn test_dates_are_normalised() {
        let r = renderer("day:date, at:datetime -> answer");
        let content = r
            .render_user(&values(json!({"day": "2024-03-01", "at": "2024-03-01 10:30 EST"})))
            .unwrap();
        assert_eq!(
            content.to_text(),
            "Day: 2024-03-01\n\nAt: 2024-03-01 15:30:00 UTC\n"
        );
    }

    #[test]
    fn test_missing_inputs() {
        let r = renderer("question, context? -> answer");
        let err = r.render_user(&values(json!({"context": "x"}))).unwrap_err();
        assert_eq!(err, PromptError::MissingInput { field: "question".into() });
        assert_eq!(err.to_string(), "Value for input field 'question' is required.");

        let ok = r.render_user(&values(json!({"question": "q", "context": null}))).unwrap();
        assert_eq!(ok.to_text(), "Question: q\n");
    }

    #[rstest]
    #[case(json!({"count": "two"}), "Validation failed: Expected 'count' to be a number instead got string")]
    #[case(json!({"count": [1]}), "Validation failed: Expected 'count' to be a number instead got array")]
    fn test_type_mismatch(#[case] inputs: Value, #[case] expected: &str) {
        let r = renderer("count:number -> answer");
        let err = r.render_user(&values(inputs)).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_false_is_not_empty() {
        let r = renderer("strict:boolean -> answer");
        assert!(r.render_user(&values(json!({"strict": false}))).is_ok());
    }

    #[test]
    fn test_media_parts() {
        let r = renderer("question, photo:image, clip?:audio -> answer");
        let content = r
            .render_user(&values(json!({
                "question": "What is this?",
                "photo": {"mimeType": "image/png", "data": "iVBOR"},
                "clip": {"data": "UklGR"}
            })))
            .unwrap();
        assert_eq!(
            content,
            MessageContent::Parts(vec![
                ContentPart::text("Question: What is this?\n\nPhoto: "),
                ContentPart::Image {
                    mime_type: "image/png".into(),
                    data: "iVBOR".into()
                },
                ContentPart::text("Clip: "),
                ContentPart::Audio {
                    format: "wav".into(),
                    data: "UklGR".into()
                },
            ])
        );
    }

    #[test]
    fn test_invalid_media() {
        let r = renderer("photo:image -> answer");
        let err = r
            .render_user(&values(json!({"photo": {"data": "iVBOR"}})))
            .unwrap_err();
        assert!(matches!(err, PromptError::InvalidMedia { ref field, .. } if field == "photo"));
    }

    #[test]
    fn test_function_call_fields() {
        let [name, args] = function_call_fields(&[
            FunctionDefinition::new("search", "Search the web"),
            FunctionDefinition::new("now", "Current time"),
        ]);
        assert_eq!(name.title, "Function Name");
        assert!(name.is_optional);
        assert_eq!(
            name.description.as_deref(),
            Some("Name of the function to call, one of: search, now")
        );
        assert_eq!(args.title, "Function Arguments");
        assert_eq!(args.kind(), FieldKind::Json);

        let sig = Signature::parse("question -> answer").unwrap();
        let extended = sig
            .add_output_field(name)
            .and_then(|s| s.add_output_field(args))
            .unwrap();
        let system = PromptRenderer::new(extended).system_prompt().unwrap();
        assert!(system.contains(
            "Function Name: (Only include this string field if its value is available) Name of the function to call, one of: search, now."
        ));
        assert!(system.contains("Function Arguments: (Only include this JSON object field"));
    }
}
