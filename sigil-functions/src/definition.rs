//! Function definitions as sent to the model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{FunctionError, FunctionResult};

/// JSON Schema of a function's parameter object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectJsonSchema {
    /// Always `"object"` for a valid parameter schema.
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Property schemas in declaration order.
    #[serde(default)]
    pub properties: IndexMap<String, Value>,

    /// Required property names.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,

    /// Schema description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether properties beyond `properties` are accepted.
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,

    /// Any other schema keywords.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ObjectJsonSchema {
    /// Create an empty object schema.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: IndexMap::new(),
            required: Vec::new(),
            description: None,
            additional_properties: None,
            extra: HashMap::new(),
        }
    }

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.add_property(name, schema, required);
        self
    }

    /// Add a property in place.
    pub fn add_property(&mut self, name: &str, schema: Value, required: bool) {
        self.properties.insert(name.to_string(), schema);
        if required && !self.is_required(name) {
            self.required.push(name.to_string());
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Allow or forbid extra properties.
    #[must_use]
    pub fn with_additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    /// Check if a property is required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Get a property schema.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Check if the schema declares no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Check the structural rules models rely on.
    ///
    /// The root must be an object, every required name must be declared,
    /// and every property schema must be an object with a `type` or a
    /// combinator (`anyOf`, `oneOf`, `allOf`, `enum`, `$ref`).
    pub fn check(&self) -> Result<(), String> {
        if self.schema_type != "object" {
            return Err(format!(
                "parameters must be of type \"object\", got \"{}\"",
                self.schema_type
            ));
        }
        if let Some(missing) = self.required.iter().find(|r| !self.properties.contains_key(*r)) {
            return Err(format!("required property \"{missing}\" is not defined"));
        }
        for (name, schema) in &self.properties {
            check_property(name, schema)?;
        }
        Ok(())
    }
}

const SCHEMA_KEYWORDS: &[&str] = &["type", "anyOf", "oneOf", "allOf", "enum", "$ref"];

fn check_property(path: &str, schema: &Value) -> Result<(), String> {
    let Some(obj) = schema.as_object() else {
        return Err(format!("property \"{path}\" must be a schema object"));
    };
    if !SCHEMA_KEYWORDS.iter().any(|k| obj.contains_key(*k)) {
        return Err(format!("property \"{path}\" has no type"));
    }
    if obj.get("type").and_then(Value::as_str) == Some("array") && !obj.contains_key("items") {
        return Err(format!("array property \"{path}\" must define items"));
    }
    if let Some(nested) = obj.get("properties").and_then(Value::as_object) {
        for (name, schema) in nested {
            check_property(&format!("{path}.{name}"), schema)?;
        }
    }
    Ok(())
}

impl Default for ObjectJsonSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Value> for ObjectJsonSchema {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

/// A callable function as described to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,

    /// What the function does. Shown in the prompt.
    pub description: String,

    /// Parameter schema.
    #[serde(default)]
    pub parameters: ObjectJsonSchema,
}

impl FunctionDefinition {
    /// Create a definition taking no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ObjectJsonSchema::new(),
        }
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ObjectJsonSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Check the name, description and parameter schema.
    pub fn validate(&self) -> FunctionResult<()> {
        let invalid = |message: String| FunctionError::InvalidDefinition {
            name: self.name.clone(),
            message,
        };
        if !is_valid_function_name(&self.name) {
            return Err(invalid(
                "name must start with a letter or underscore and contain only letters, digits, '_' or '-'"
                    .into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(invalid("description must not be empty".into()));
        }
        self.parameters.check().map_err(invalid)
    }
}

fn is_valid_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_schema_serialization() {
        let schema = ObjectJsonSchema::new()
            .with_property("q", json!({"type": "string"}), true)
            .with_property("limit", json!({"type": "integer"}), false)
            .with_additional_properties(false);
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "properties": {"q": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["q"],
                "additionalProperties": false
            })
        );
    }

    #[test]
    fn test_add_property_does_not_duplicate_required() {
        let mut schema = ObjectJsonSchema::new();
        schema.add_property("q", json!({"type": "string"}), true);
        schema.add_property("q", json!({"type": "string"}), true);
        assert_eq!(schema.required, vec!["q"]);
    }

    #[test]
    fn test_valid_definition() {
        let def = FunctionDefinition::new("get_weather", "Current weather").with_parameters(
            ObjectJsonSchema::new().with_property("city", json!({"type": "string"}), true),
        );
        assert!(def.validate().is_ok());
        assert!(FunctionDefinition::new("now", "Current time").validate().is_ok());
    }

    #[rstest]
    #[case("1bad", "Does things", json!({"type": "object"}), "name must start")]
    #[case("fine", "  ", json!({"type": "object"}), "description must not be empty")]
    #[case("fine", "ok", json!({"type": "string"}), "must be of type \"object\"")]
    #[case("fine", "ok", json!({"type": "object", "required": ["x"]}), "\"x\" is not defined")]
    #[case("fine", "ok", json!({"type": "object", "properties": {"x": {}}}), "\"x\" has no type")]
    #[case(
        "fine",
        "ok",
        json!({"type": "object", "properties": {"x": {"type": "array"}}}),
        "must define items"
    )]
    #[case(
        "fine",
        "ok",
        json!({"type": "object", "properties": {"o": {"type": "object", "properties": {"y": 3}}}}),
        "\"o.y\" must be a schema object"
    )]
    fn test_invalid_definitions(
        #[case] name: &str,
        #[case] description: &str,
        #[case] parameters: Value,
        #[case] expected: &str,
    ) {
        let def = FunctionDefinition::new(name, description)
            .with_parameters(ObjectJsonSchema::try_from(parameters).unwrap());
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
    }
}
