//! Hand-written cursor parser for the signature DSL.
//!
//! ```text
//! signature := [quoted] fields "->" fields
//! fields    := field ("," field)*
//! field     := ident ["?"] ["!"] [":" type ["[]"]] [quoted]
//! type      := string | number | boolean | json | date | datetime
//!            | image | audio | code | class
//! ```
//!
//! A `class` type must be followed by a quoted option list
//! (`"a, b | c"`); a second quoted string is the field description.

use crate::error::{SignatureError, SignatureResult};
use crate::field::{Field, FieldKind, FieldType};

const CONTEXT_WIDTH: usize = 20;

/// Raw parse output before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Leading description, trimmed.
    pub description: Option<String>,
    /// Input fields in declaration order.
    pub inputs: Vec<Field>,
    /// Output fields in declaration order.
    pub outputs: Vec<Field>,
}

/// Parse DSL text without running field validation.
pub fn parse_signature(input: &str) -> SignatureResult<ParsedSignature> {
    let mut parser = Parser { input, pos: 0 };
    parser.parse().map_err(|message| parser.error(message))
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

type Step<T> = Result<T, String>;

impl<'a> Parser<'a> {
    fn parse(&mut self) -> Step<ParsedSignature> {
        self.skip_ws();
        let description = self.quoted()?.map(|d| d.trim().to_string());
        self.skip_ws();
        let inputs = self.field_list("input")?;
        self.skip_ws();

        if self.at_end() {
            return Err(
                "Incomplete signature: Missing output section. Expected \"->\" followed by output fields"
                    .into(),
            );
        }
        self.expect("->")?;
        self.skip_ws();
        if self.at_end() {
            return Err("Incomplete signature: No output fields specified after \"->\"".into());
        }
        let outputs = self.field_list("output")?;
        self.skip_ws();

        if !self.at_end() {
            return Err(format!(
                "Unexpected content \"{}\" after output fields",
                self.peek_word()
            ));
        }

        Ok(ParsedSignature {
            description: description.filter(|d| !d.is_empty()),
            inputs,
            outputs,
        })
    }

    fn field_list(&mut self, section: &str) -> Step<Vec<Field>> {
        self.skip_ws();
        if self.at_end() || self.rest().starts_with("->") {
            return Err(format!("Empty {section} section: Expected at least one field"));
        }

        let mut fields = vec![self.field()?];
        loop {
            self.skip_ws();
            if self.at_end() || self.rest().starts_with("->") {
                break;
            }
            if !self.eat(",") {
                break;
            }
            self.skip_ws();
            if self.at_end() {
                return Err(format!(
                    "Unexpected end of input after comma in {section} section"
                ));
            }
            fields.push(self.field()?);
        }
        Ok(fields)
    }

    fn field(&mut self) -> Step<Field> {
        let name = self.identifier()?;
        let mut field = Field::new(name.clone());
        field.is_optional = self.eat("?");
        field.is_internal = self.eat("!");

        self.skip_ws();
        if self.eat(":") {
            self.skip_ws();
            let word = self.peek_word();
            let kind: FieldKind = word
                .parse()
                .map_err(|e: String| format!("Field \"{name}\": {e}"))?;
            self.pos += word.len();
            let is_array = self.eat("[]");

            let options = if kind == FieldKind::Class {
                self.skip_ws();
                let Some(raw) = self.quoted()? else {
                    return Err(format!(
                        "Field \"{name}\": Expected class names in quotes after \"class\" type. Example: class \"MyClass1, MyClass2\""
                    ));
                };
                let options: Vec<String> = raw
                    .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if options.is_empty() {
                    return Err(format!(
                        "Field \"{name}\": Empty class list provided. At least one class name is required"
                    ));
                }
                options
            } else {
                Vec::new()
            };

            field.field_type = Some(FieldType {
                kind,
                is_array,
                options,
            });
        }

        self.skip_ws();
        if let Some(desc) = self.quoted()? {
            let desc = desc.trim();
            if !desc.is_empty() {
                field.description = Some(desc.to_string());
            }
        }
        Ok(field)
    }

    fn identifier(&mut self) -> Step<String> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                let ok = c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit());
                !ok
            })
            .map_or(rest.len(), |(i, _)| i);

        if len == 0 {
            let bad: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
            let bad = if bad.is_empty() { "empty".to_string() } else { bad };
            return Err(format!(
                "Invalid identifier \"{bad}\". Identifiers must start with a letter or underscore and contain only letters, numbers, or underscores"
            ));
        }
        let ident = rest[..len].to_string();
        self.pos += len;
        Ok(ident)
    }

    fn quoted(&mut self) -> Step<Option<String>> {
        let Some(quote) = self.rest().chars().next().filter(|c| *c == '"' || *c == '\'') else {
            return Ok(None);
        };
        self.pos += 1;
        let start = self.pos;

        let mut content = String::new();
        let mut escaped = false;
        for (i, c) in self.rest().char_indices() {
            if escaped {
                content.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                self.pos += i + c.len_utf8();
                return Ok(Some(content));
            } else {
                content.push(c);
            }
        }

        self.pos = self.input.len();
        Err(format!(
            "Unterminated string starting at position {start}: \"{}...\"",
            &self.input[start..]
        ))
    }

    fn expect(&mut self, token: &str) -> Step<()> {
        if self.eat(token) {
            return Ok(());
        }
        let found: String = self.rest().chars().take(10).collect();
        Err(format!(
            "Expected \"{token}\" but found \"{found}...\" at position {}",
            self.pos
        ))
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> &'a str {
        let rest = &self.input[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let word = &rest[..len];
        if word.is_empty() {
            "empty"
        } else {
            word
        }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, message: String) -> SignatureError {
        let pos = self.pos.min(self.input.len());
        let start = floor_boundary(self.input, pos.saturating_sub(CONTEXT_WIDTH));
        let end = floor_boundary(self.input, (pos + CONTEXT_WIDTH).min(self.input.len()));
        let before = &self.input[start..pos];
        let after = &self.input[pos..end];
        let pointer = " ".repeat(before.chars().count());
        SignatureError::Parse {
            message,
            position: pos,
            context: format!("{before}{after}\n{pointer}^"),
        }
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_err(input: &str) -> (String, usize) {
        match parse_signature(input).unwrap_err() {
            SignatureError::Parse {
                message, position, ..
            } => (message, position),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_parse_basic() {
        let sig = parse_signature("question -> answer").unwrap();
        assert_eq!(sig.description, None);
        assert_eq!(sig.inputs[0].name, "question");
        assert_eq!(sig.inputs[0].title, "Question");
        assert_eq!(sig.outputs[0].name, "answer");
        assert!(sig.outputs[0].field_type.is_none());
    }

    #[test]
    fn test_parse_full_syntax() {
        let sig = parse_signature(
            r#""Classify and score" userText:string "The text", context?:json ->
               category:class "positive, negative | neutral" "Overall mood",
               score:number[], notes?!:string"#,
        )
        .unwrap();

        assert_eq!(sig.description.as_deref(), Some("Classify and score"));
        assert_eq!(sig.inputs.len(), 2);
        assert_eq!(sig.inputs[0].description.as_deref(), Some("The text"));
        assert!(sig.inputs[1].is_optional);
        assert_eq!(sig.inputs[1].kind(), FieldKind::Json);

        let category = &sig.outputs[0];
        assert_eq!(category.options(), ["positive", "negative", "neutral"]);
        assert_eq!(category.description.as_deref(), Some("Overall mood"));
        assert!(sig.outputs[1].is_array());
        assert!(sig.outputs[2].is_optional);
        assert!(sig.outputs[2].is_internal);
    }

    #[test]
    fn test_parse_escaped_quotes() {
        let sig = parse_signature(r#"q "say \"hi\"" -> a:string 'it\'s'"#).unwrap();
        assert_eq!(sig.inputs[0].description.as_deref(), Some("say \"hi\""));
        assert_eq!(sig.outputs[0].description.as_deref(), Some("it's"));
    }

    #[test]
    fn test_datetime_is_not_date() {
        let sig = parse_signature("q -> when:datetime, day:date").unwrap();
        assert_eq!(sig.outputs[0].kind(), FieldKind::DateTime);
        assert_eq!(sig.outputs[1].kind(), FieldKind::Date);
    }

    #[test]
    fn test_missing_arrow() {
        let (msg, _) = parse_err("question");
        assert!(msg.starts_with("Incomplete signature: Missing output section"));

        let (msg, pos) = parse_err("question answer");
        assert_eq!(msg, "Expected \"->\" but found \"answer...\" at position 9");
        assert_eq!(pos, 9);
    }

    #[test]
    fn test_empty_sections() {
        let (msg, _) = parse_err("-> answer");
        assert_eq!(msg, "Empty input section: Expected at least one field");
        let (msg, _) = parse_err("question -> ");
        assert!(msg.contains("No output fields"));
    }

    #[test]
    fn test_invalid_type() {
        let (msg, _) = parse_err("q -> a:float");
        assert!(msg.starts_with("Field \"a\": Invalid type \"float\". Expected one of:"));
    }

    #[test]
    fn test_class_requires_options() {
        let (msg, _) = parse_err("q -> a:class");
        assert!(msg.contains("Expected class names in quotes"));
    }

    #[test]
    fn test_invalid_identifier_and_unterminated() {
        let (msg, _) = parse_err("q -> 1abc");
        assert!(msg.starts_with("Invalid identifier \"1abc\""));

        let (msg, _) = parse_err("q \"open -> a");
        assert!(msg.starts_with("Unterminated string starting at position 3"));
    }

    #[test]
    fn test_trailing_comma() {
        let (msg, _) = parse_err("q -> a,");
        assert_eq!(msg, "Unexpected end of input after comma in output section");
    }

    #[test]
    fn test_error_context_pointer() {
        let err = parse_signature("question answer").unwrap_err();
        let SignatureError::Parse { context, .. } = err else {
            panic!("expected parse error");
        };
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines[0], "question answer");
        assert_eq!(lines[1], "         ^");
    }
}
