//! Validated, hash-cached signature snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{SignatureError, SignatureResult};
use crate::field::{Field, FieldKind, FieldType};
use crate::parser::parse_signature;
use crate::validate::{validate_fields, ValidationMode};

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::debug;

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug { ($($arg:tt)*) => {} }

/// Structured form of a signature, as accepted by
/// [`Signature::from_descriptor`] and produced by [`Signature::to_descriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureDescriptor {
    /// Content hash; ignored on input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Task description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input fields in order.
    #[serde(default)]
    pub input_fields: Vec<Field>,
    /// Output fields in order.
    #[serde(default)]
    pub output_fields: Vec<Field>,
}

/// A compiled input/output contract.
///
/// A `Signature` is an immutable snapshot: every mutator validates the
/// would-be result and returns a new snapshot, leaving `self` untouched on
/// failure. The canonical rendering and content hash are computed once per
/// snapshot.
///
/// # Example
///
/// ```rust
/// use sigil_signature::{Field, FieldKind, Signature};
///
/// let sig: Signature = "question:string -> answer:string".parse().unwrap();
/// let extended = sig
///     .add_output_field(Field::new("confidence").kind_of(FieldKind::Number))
///     .unwrap();
///
/// assert_eq!(sig.output_fields().len(), 1);
/// assert_eq!(extended.output_fields().len(), 2);
/// assert_ne!(sig.hash(), extended.hash());
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    description: Option<String>,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
    mode: ValidationMode,
    hash: String,
    rendered: String,
    validated_at: OnceLock<String>,
}

impl Signature {
    /// Compile DSL text in lenient mode.
    pub fn parse(dsl: &str) -> SignatureResult<Self> {
        Self::parse_with_mode(dsl, ValidationMode::Lenient)
    }

    /// Compile DSL text with the given validation mode.
    pub fn parse_with_mode(dsl: &str, mode: ValidationMode) -> SignatureResult<Self> {
        let parsed = parse_signature(dsl)?;
        Self::build(parsed.description, parsed.inputs, parsed.outputs, mode)
    }

    /// Build from explicit field lists.
    pub fn from_fields(
        description: Option<String>,
        inputs: Vec<Field>,
        outputs: Vec<Field>,
    ) -> SignatureResult<Self> {
        Self::build(description, inputs, outputs, ValidationMode::Lenient)
    }

    /// Build from a structured descriptor.
    pub fn from_descriptor(descriptor: SignatureDescriptor) -> SignatureResult<Self> {
        Self::build(
            descriptor.description,
            descriptor.input_fields,
            descriptor.output_fields,
            ValidationMode::Lenient,
        )
    }

    fn build(
        description: Option<String>,
        inputs: Vec<Field>,
        outputs: Vec<Field>,
        mode: ValidationMode,
    ) -> SignatureResult<Self> {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let inputs: Vec<Field> = inputs.into_iter().map(Field::normalize).collect();
        let outputs: Vec<Field> = outputs.into_iter().map(Field::normalize).collect();

        validate_fields(&inputs, &outputs, mode)?;

        let hash = compute_hash(description.as_deref(), &inputs, &outputs);
        let rendered = render_signature(description.as_deref(), &inputs, &outputs);
        debug!(hash = %hash, signature = %rendered, "Compiled signature");

        let validated_at = OnceLock::new();
        let _ = validated_at.set(hash.clone());

        Ok(Self {
            description,
            inputs,
            outputs,
            mode,
            hash,
            rendered,
            validated_at,
        })
    }

    fn rebuild(
        &self,
        description: Option<String>,
        inputs: Vec<Field>,
        outputs: Vec<Field>,
    ) -> SignatureResult<Self> {
        Self::build(description, inputs, outputs, self.mode)
    }

    /// New snapshot with one more input field.
    pub fn add_input_field(&self, field: Field) -> SignatureResult<Self> {
        let mut inputs = self.inputs.clone();
        inputs.push(field);
        self.rebuild(self.description.clone(), inputs, self.outputs.clone())
    }

    /// New snapshot with one more output field.
    pub fn add_output_field(&self, field: Field) -> SignatureResult<Self> {
        let mut outputs = self.outputs.clone();
        outputs.push(field);
        self.rebuild(self.description.clone(), self.inputs.clone(), outputs)
    }

    /// New snapshot with the input list replaced.
    pub fn set_input_fields(&self, fields: Vec<Field>) -> SignatureResult<Self> {
        self.rebuild(self.description.clone(), fields, self.outputs.clone())
    }

    /// New snapshot with the output list replaced.
    pub fn set_output_fields(&self, fields: Vec<Field>) -> SignatureResult<Self> {
        self.rebuild(self.description.clone(), self.inputs.clone(), fields)
    }

    /// New snapshot with a different description.
    pub fn set_description(&self, description: impl Into<String>) -> SignatureResult<Self> {
        self.rebuild(
            Some(description.into()),
            self.inputs.clone(),
            self.outputs.clone(),
        )
    }

    /// New snapshot validated under a different mode.
    pub fn with_mode(&self, mode: ValidationMode) -> SignatureResult<Self> {
        Self::build(
            self.description.clone(),
            self.inputs.clone(),
            self.outputs.clone(),
            mode,
        )
    }

    /// Re-check every rule unless this exact content was already validated.
    pub fn validate(&self) -> SignatureResult<()> {
        if self.validated_at.get() == Some(&self.hash) {
            return Ok(());
        }
        validate_fields(&self.inputs, &self.outputs, self.mode)?;
        let _ = self.validated_at.set(self.hash.clone());
        Ok(())
    }

    /// SHA-256 hex digest of description and fields.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Task description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Input fields in order.
    #[must_use]
    pub fn input_fields(&self) -> &[Field] {
        &self.inputs
    }

    /// Output fields in order.
    #[must_use]
    pub fn output_fields(&self) -> &[Field] {
        &self.outputs
    }

    /// Validation mode this snapshot was checked under.
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Look up a field on either side by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|f| f.name == name)
    }

    /// Structured form including the hash as `id`.
    #[must_use]
    pub fn to_descriptor(&self) -> SignatureDescriptor {
        SignatureDescriptor {
            id: Some(self.hash.clone()),
            description: self.description.clone(),
            input_fields: self.inputs.clone(),
            output_fields: self.outputs.clone(),
        }
    }

    /// JSON schema describing the output object.
    ///
    /// Internal fields are excluded.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in self.outputs.iter().filter(|f| !f.is_internal) {
            let mut schema = field_schema(field.field_type.as_ref());
            if let (Some(desc), Value::Object(map)) = (&field.description, &mut schema) {
                map.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(field.name.clone(), schema);
            if !field.is_optional {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });
        if let (Some(desc), Value::Object(map)) = (&self.description, &mut schema) {
            map.insert("description".into(), Value::String(desc.clone()));
        }
        schema
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Signature {}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<SignatureDescriptor> for Signature {
    type Error = SignatureError;

    fn try_from(value: SignatureDescriptor) -> Result<Self, Self::Error> {
        Self::from_descriptor(value)
    }
}

fn field_schema(ty: Option<&FieldType>) -> Value {
    let Some(ty) = ty else {
        return json!({ "type": "string" });
    };
    let item = match ty.kind {
        FieldKind::String | FieldKind::Code => json!({ "type": "string" }),
        FieldKind::Number => json!({ "type": "number" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::Json => json!({ "type": "object" }),
        FieldKind::Date => json!({ "type": "string", "format": "date" }),
        FieldKind::DateTime => json!({ "type": "string", "format": "date-time" }),
        FieldKind::Class => json!({ "type": "string", "enum": ty.options }),
        FieldKind::Image | FieldKind::Audio => json!({ "type": "object" }),
    };
    if ty.is_array {
        json!({ "type": "array", "items": item })
    } else {
        item
    }
}

fn compute_hash(description: Option<&str>, inputs: &[Field], outputs: &[Field]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(description.unwrap_or_default().as_bytes());
    hasher.update(serde_json::to_vec(inputs).unwrap_or_default());
    hasher.update(serde_json::to_vec(outputs).unwrap_or_default());
    hex::encode(hasher.finalize())
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_field(field: &Field) -> String {
    let mut out = field.name.clone();
    if field.is_optional {
        out.push('?');
    }
    if field.is_internal {
        out.push('!');
    }
    if let Some(ty) = &field.field_type {
        out.push(':');
        out.push_str(ty.kind.as_str());
        if ty.is_array {
            out.push_str("[]");
        }
        if ty.kind == FieldKind::Class {
            out.push(' ');
            out.push_str(&quote(&ty.options.join(" | ")));
        }
    }
    if let Some(desc) = &field.description {
        out.push(' ');
        out.push_str(&quote(desc));
    }
    out
}

fn render_signature(description: Option<&str>, inputs: &[Field], outputs: &[Field]) -> String {
    let render = |fields: &[Field]| {
        fields
            .iter()
            .map(render_field)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let prefix = description.map(|d| format!("{} ", quote(d))).unwrap_or_default();
    format!("{prefix}{} -> {}", render(inputs), render(outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn structure(sig: &Signature) -> (Option<String>, Vec<Field>, Vec<Field>) {
        (
            sig.description().map(str::to_string),
            sig.input_fields().to_vec(),
            sig.output_fields().to_vec(),
        )
    }

    #[rstest]
    #[case("question -> answer")]
    #[case("userQuestion:string \"what the user asked\" -> answerText:string, score?:number")]
    #[case("\"Summarize \\\"carefully\\\"\" document:string -> summary:string, keyPoints:string[]")]
    #[case("review:string -> mood:class \"positive | negative\" \"overall tone\", notes?!:json")]
    #[case("photo:image, clip?:audio -> caption:string, takenOn:date, seenAt?:datetime, fix:code")]
    fn test_round_trip(#[case] dsl: &str) {
        let sig = Signature::parse(dsl).unwrap();
        let again = Signature::parse(&sig.to_string()).unwrap();
        assert_eq!(structure(&sig), structure(&again));
        assert_eq!(sig.hash(), again.hash());
        assert_eq!(sig.to_string(), again.to_string());
    }

    #[test]
    fn test_rendering() {
        let sig = Signature::parse(
            "'Rate it' userText:string 'the text' -> rating:class \"good, bad\" 'verdict', tags?:string[]",
        )
        .unwrap();
        assert_eq!(
            sig.to_string(),
            "\"Rate it\" userText:string \"the text\" -> rating:class \"good | bad\" \"verdict\", tags?:string[]"
        );
    }

    #[test]
    fn test_hash_is_stable() {
        let sig = Signature::parse("question -> answer").unwrap();
        let h1 = sig.hash().to_string();
        assert_eq!(sig.hash(), h1);
        assert_eq!(sig.clone().hash(), h1);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_hash_changes_on_mutation() {
        let sig = Signature::parse("question -> answer").unwrap();
        let added = sig.add_input_field(Field::new("context")).unwrap();
        let replaced = sig
            .set_output_fields(vec![Field::new("reply").kind_of(FieldKind::Json)])
            .unwrap();
        let described = sig.set_description("Answer briefly").unwrap();

        assert_ne!(sig.hash(), added.hash());
        assert_ne!(sig.hash(), replaced.hash());
        assert_ne!(sig.hash(), described.hash());
        assert_eq!(described.to_string(), "\"Answer briefly\" question -> answer");
    }

    #[test]
    fn test_failed_mutation_leaves_original() {
        let sig = Signature::parse("question -> answer").unwrap();
        let before = sig.hash().to_string();

        let err = sig.add_output_field(Field::new("question")).unwrap_err();
        assert_eq!(err.field_name(), Some("question"));
        assert_eq!(sig.hash(), before);
        assert_eq!(sig.output_fields().len(), 1);
        assert!(sig.validate().is_ok());
    }

    #[test]
    fn test_strict_mode_rejects_generic_names() {
        assert!(Signature::parse("text -> result").is_ok());
        let err = Signature::parse_with_mode("text -> result", ValidationMode::Strict).unwrap_err();
        assert_eq!(err.field_name(), Some("text"));

        let lenient = Signature::parse("userText -> result").unwrap();
        assert!(lenient.with_mode(ValidationMode::Strict).is_err());
    }

    #[test]
    fn test_validation_errors_from_dsl() {
        let err = Signature::parse("q -> a").unwrap_err();
        assert!(err.to_string().contains("too short"));

        let err = Signature::parse("question:class \"a, b\" -> answer").unwrap_err();
        assert!(err.to_string().starts_with("Class type is not supported in input fields"));

        let err = Signature::parse("question -> picture:image").unwrap_err();
        assert!(err.to_string().starts_with("image type is not supported in output fields"));
    }

    #[test]
    fn test_descriptor_round_trip() {
        let sig = Signature::parse("\"Translate\" sourceText -> translatedText").unwrap();
        let descriptor = sig.to_descriptor();
        assert_eq!(descriptor.id.as_deref(), Some(sig.hash()));

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["inputFields"][0]["name"], "sourceText");
        assert_eq!(json["inputFields"][0]["title"], "Source Text");

        let back: SignatureDescriptor = serde_json::from_value(json).unwrap();
        let rebuilt = Signature::try_from(back).unwrap();
        assert_eq!(rebuilt, sig);
    }

    #[test]
    fn test_descriptor_from_json_without_titles() {
        let descriptor: SignatureDescriptor = serde_json::from_str(
            r#"{
                "inputFields": [{"name": "userQuery"}],
                "outputFields": [{"name": "reply", "type": {"name": "string"}, "isOptional": true}]
            }"#,
        )
        .unwrap();
        let sig = Signature::from_descriptor(descriptor).unwrap();
        assert_eq!(sig.input_fields()[0].title, "User Query");
        assert!(sig.output_fields()[0].is_optional);
    }

    #[test]
    fn test_field_lookup() {
        let sig = Signature::parse("question -> answer:number").unwrap();
        assert_eq!(sig.field("answer").map(Field::kind), Some(FieldKind::Number));
        assert!(sig.field("missing").is_none());
    }

    #[test]
    fn test_json_schema() {
        let sig = Signature::parse(
            "question -> answer:string \"the answer\", score?:number, labels:class[] \"x, y\", scratch!:string",
        )
        .unwrap();
        let schema = sig.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["answer"]["description"], "the answer");
        assert_eq!(schema["properties"]["score"]["type"], "number");
        assert_eq!(schema["properties"]["labels"]["items"]["enum"], json!(["x", "y"]));
        assert!(schema["properties"].get("scratch").is_none());
        assert_eq!(schema["required"], json!(["answer", "labels"]));
    }
}
