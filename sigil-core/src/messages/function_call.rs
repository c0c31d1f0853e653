//! Function calls requested by a model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json::parse_lenient;

/// Function call arguments, either parsed JSON or the raw string the
/// provider sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallArgs {
    /// Parsed JSON arguments.
    Json(Value),
    /// Raw string arguments (streaming or text-mode calls).
    String(String),
}

impl FunctionCallArgs {
    /// Parse into a JSON value.
    ///
    /// An empty string means "no arguments" and yields an empty object.
    /// Malformed JSON is repaired where possible.
    pub fn parse(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Json(v) => Ok(v.clone()),
            Self::String(s) if s.trim().is_empty() => Ok(Value::Object(Default::default())),
            Self::String(s) => parse_lenient(s),
        }
    }

    /// Render as a JSON string.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

impl Default for FunctionCallArgs {
    fn default() -> Self {
        Self::Json(Value::Object(Default::default()))
    }
}

impl From<Value> for FunctionCallArgs {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<String> for FunctionCallArgs {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for FunctionCallArgs {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A function call `{ id, name, args }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call id used to pair the call with its result.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Call arguments.
    #[serde(default)]
    pub args: FunctionCallArgs,
}

impl FunctionCall {
    /// Create a new function call.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        args: impl Into<FunctionCallArgs>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_args() {
        let args = FunctionCallArgs::from(json!({"q": "rust"}));
        assert_eq!(args.parse().unwrap(), json!({"q": "rust"}));
    }

    #[test]
    fn test_parse_string_args() {
        let args = FunctionCallArgs::from(r#"{"q": "rust"}"#);
        assert_eq!(args.parse().unwrap(), json!({"q": "rust"}));
    }

    #[test]
    fn test_parse_empty_string_args() {
        let args = FunctionCallArgs::from("");
        assert_eq!(args.parse().unwrap(), json!({}));
    }

    #[test]
    fn test_parse_repairs_args() {
        let args = FunctionCallArgs::from("{q: 'rust',}");
        assert_eq!(args.parse().unwrap(), json!({"q": "rust"}));
    }

    #[test]
    fn test_function_call_serde() {
        let call = FunctionCall::new("call_1", "search", json!({"q": "x"}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"id": "call_1", "name": "search", "args": {"q": "x"}})
        );
    }
}
