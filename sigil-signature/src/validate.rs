//! Field and signature validation rules.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{SignatureError, SignatureResult};
use crate::field::{Field, FieldKind};

/// How strictly field names are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Format and length checks only.
    #[default]
    Lenient,
    /// Additionally reject overly generic names such as `text` or `result`.
    Strict,
}

/// Which side of the arrow a field sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Input,
    Output,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

const RESERVED_NAMES: &[&str] = &[
    "text", "object", "image", "string", "number", "boolean", "json", "array", "datetime", "date",
    "time", "type", "class", "input", "output", "data", "value", "result", "response", "request",
    "item", "element",
];

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 50;

fn camel_case() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").expect("static pattern"))
}

fn snake_case() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]+(_[a-z0-9]+)*$").expect("static pattern"))
}

/// Check a field name's shape.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    camel_case().is_match(name) || snake_case().is_match(name)
}

pub(crate) fn validate_field(field: &Field, side: Side, mode: ValidationMode) -> SignatureResult<()> {
    let name = field.name.as_str();
    if name.trim().is_empty() {
        return Err(SignatureError::field(
            name,
            "Field name cannot be blank",
            "Every field must have a descriptive name",
        ));
    }
    if !is_valid_name(name) {
        return Err(SignatureError::field(
            name,
            format!("Invalid field name '{name}' - must be camelCase or snake_case"),
            "Use camelCase (e.g., \"userInput\") or snake_case (e.g., \"user_input\")",
        ));
    }

    if mode == ValidationMode::Strict && RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        let examples = match side {
            Side::Input => "userInput, questionText, documentContent, messageText, queryString",
            Side::Output => "responseText, analysisResult, categoryType, summaryText, outputData",
        };
        return Err(SignatureError::field(
            name,
            format!("Field name '{name}' is too generic"),
            format!(
                "Use a more descriptive name. Examples for {} fields: {examples}",
                side.as_str()
            ),
        ));
    }

    let len = name.chars().count();
    if len < MIN_NAME_LEN {
        return Err(SignatureError::field(
            name,
            format!("Field name '{name}' is too short"),
            "Field names must be at least 2 characters long",
        ));
    }
    if len > MAX_NAME_LEN {
        return Err(SignatureError::field(
            name,
            format!("Field name '{name}' is too long ({len} characters)"),
            "Field names should be 50 characters or less",
        ));
    }

    if field.title.contains(':') {
        return Err(SignatureError::field(
            name,
            format!("Field title '{}' contains ':'", field.title),
            "Titles are used as output labels and cannot contain colons",
        ));
    }

    if field.is_internal && side == Side::Input {
        return Err(SignatureError::field(
            name,
            "Internal marker (!) is not allowed on input fields",
            "Internal markers are only allowed on output fields",
        ));
    }

    let Some(ty) = field.field_type.as_ref() else {
        return Ok(());
    };

    if ty.kind.is_media() && side == Side::Output {
        return Err(SignatureError::field(
            name,
            format!("{} type is not supported in output fields", ty.kind),
            format!("{} types can only be used in input fields", ty.kind),
        ));
    }

    if ty.kind == FieldKind::Class {
        if side == Side::Input {
            return Err(SignatureError::field(
                name,
                "Class type is not supported in input fields",
                "Class types are only allowed on output fields. Use \"string\" type for input classifications",
            ));
        }
        if ty.options.is_empty() {
            return Err(SignatureError::field(
                name,
                "Class type requires options",
                "Provide class options. Example: class \"positive, negative, neutral\"",
            ));
        }
        let mut seen = HashSet::new();
        for option in &ty.options {
            let option = option.trim();
            if option.is_empty() {
                return Err(SignatureError::field(
                    name,
                    "Empty class option found",
                    "All class options must be non-empty strings",
                ));
            }
            if option.contains(',') || option.contains('|') {
                return Err(SignatureError::field(
                    name,
                    format!("Invalid class option \"{option}\""),
                    "Class options cannot contain commas (,) or pipes (|) as they are used to separate options",
                ));
            }
            if !seen.insert(option.to_lowercase()) {
                return Err(SignatureError::field(
                    name,
                    "Duplicate class options found",
                    "Each class option must be unique (case-insensitive)",
                ));
            }
        }
    } else if !ty.options.is_empty() {
        return Err(SignatureError::field(
            name,
            format!("Options are only allowed on class fields, not {}", ty.kind),
            "Remove the options or change the type to class",
        ));
    }

    if ty.kind == FieldKind::Code && ty.is_array {
        return Err(SignatureError::field(
            name,
            "Arrays of code are not commonly supported",
            "Consider using a single code field or an array of strings instead",
        ));
    }
    if ty.kind.is_media() && ty.is_array {
        return Err(SignatureError::field(
            name,
            format!("Arrays of {} are not supported", ty.kind),
            format!("Use a single {} field", ty.kind),
        ));
    }

    Ok(())
}

/// Run every rule over complete field lists.
pub(crate) fn validate_fields(
    inputs: &[Field],
    outputs: &[Field],
    mode: ValidationMode,
) -> SignatureResult<()> {
    if inputs.is_empty() {
        return Err(SignatureError::invalid(
            "Signature must have at least one input field",
            "Add an input field. Example: \"userInput:string -> ...\"",
        ));
    }
    if outputs.is_empty() {
        return Err(SignatureError::invalid(
            "Signature must have at least one output field",
            "Add an output field. Example: \"... -> responseText:string\"",
        ));
    }

    let mut input_names = HashSet::new();
    for field in inputs {
        validate_field(field, Side::Input, mode)?;
        if !input_names.insert(field.name.as_str()) {
            return Err(SignatureError::field(
                &field.name,
                format!("Duplicate input field name: \"{}\"", field.name),
                "Each field name must be unique within the signature",
            ));
        }
    }

    let mut output_names = HashSet::new();
    for field in outputs {
        validate_field(field, Side::Output, mode)?;
        if !output_names.insert(field.name.as_str()) {
            return Err(SignatureError::field(
                &field.name,
                format!("Duplicate output field name: \"{}\"", field.name),
                "Each field name must be unique within the signature",
            ));
        }
        if input_names.contains(field.name.as_str()) {
            return Err(SignatureError::field(
                &field.name,
                format!("Field name \"{}\" appears in both inputs and outputs", field.name),
                "Use different names for input and output fields to avoid confusion",
            ));
        }
    }

    if outputs.iter().all(|f| f.is_internal) {
        return Err(SignatureError::invalid(
            "Signature must have at least one non-internal output field",
            "Remove the internal marker (!) from at least one output field",
        ));
    }

    Ok(())
}
