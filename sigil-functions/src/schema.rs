//! Fluent construction of parameter schemas.

use serde_json::{json, Value};

use crate::definition::ObjectJsonSchema;

/// Builder for [`ObjectJsonSchema`].
///
/// # Example
///
/// ```rust
/// use sigil_functions::SchemaBuilder;
///
/// let schema = SchemaBuilder::new()
///     .string("city", "City name", true)
///     .enum_values("unit", "Temperature unit", &["c", "f"], false)
///     .build();
///
/// assert!(schema.is_required("city"));
/// assert!(!schema.is_required("unit"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    schema: ObjectJsonSchema,
}

impl SchemaBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn typed(self, name: &str, ty: &str, desc: &str, required: bool) -> Self {
        self.raw(name, json!({"type": ty, "description": desc}), required)
    }

    /// Add a string property.
    #[must_use]
    pub fn string(self, name: &str, desc: &str, required: bool) -> Self {
        self.typed(name, "string", desc, required)
    }

    /// Add an integer property.
    #[must_use]
    pub fn integer(self, name: &str, desc: &str, required: bool) -> Self {
        self.typed(name, "integer", desc, required)
    }

    /// Add a number property.
    #[must_use]
    pub fn number(self, name: &str, desc: &str, required: bool) -> Self {
        self.typed(name, "number", desc, required)
    }

    /// Add a boolean property.
    #[must_use]
    pub fn boolean(self, name: &str, desc: &str, required: bool) -> Self {
        self.typed(name, "boolean", desc, required)
    }

    /// Add an array property with the given item schema.
    #[must_use]
    pub fn array(self, name: &str, desc: &str, items: Value, required: bool) -> Self {
        self.raw(
            name,
            json!({"type": "array", "description": desc, "items": items}),
            required,
        )
    }

    /// Add a string property restricted to `values`.
    #[must_use]
    pub fn enum_values(self, name: &str, desc: &str, values: &[&str], required: bool) -> Self {
        self.raw(
            name,
            json!({"type": "string", "description": desc, "enum": values}),
            required,
        )
    }

    /// Add a property with an arbitrary schema.
    #[must_use]
    pub fn raw(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.schema.add_property(name, schema, required);
        self
    }

    /// Set the schema description.
    #[must_use]
    pub fn description(mut self, desc: &str) -> Self {
        self.schema.description = Some(desc.to_string());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ObjectJsonSchema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_output() {
        let schema = SchemaBuilder::new()
            .string("q", "Query", true)
            .integer("limit", "Max results", false)
            .array("tags", "Tags", json!({"type": "string"}), false)
            .description("Search input")
            .build();

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "q": {"type": "string", "description": "Query"},
                    "limit": {"type": "integer", "description": "Max results"},
                    "tags": {"type": "array", "description": "Tags", "items": {"type": "string"}}
                },
                "required": ["q"],
                "description": "Search input"
            })
        );
        assert!(schema.check().is_ok());
    }

    #[test]
    fn test_enum_values() {
        let schema = SchemaBuilder::new()
            .enum_values("unit", "Unit", &["c", "f"], true)
            .build();
        assert_eq!(schema.property("unit").unwrap()["enum"], json!(["c", "f"]));
    }
}
