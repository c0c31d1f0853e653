//! Field model: names, titles, type tags and flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text.
    String,
    /// Integer or floating point number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Arbitrary JSON document.
    Json,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Date and time with a timezone.
    #[serde(rename = "datetime")]
    DateTime,
    /// Image (input only).
    Image,
    /// Audio (input only).
    Audio,
    /// Source code.
    Code,
    /// One of a fixed set of options (output only).
    Class,
}

impl FieldKind {
    /// Every kind, in DSL keyword order.
    pub const ALL: [FieldKind; 10] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Json,
        Self::Image,
        Self::Audio,
        Self::DateTime,
        Self::Date,
        Self::Code,
        Self::Class,
    ];

    /// DSL keyword of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Code => "code",
            Self::Class => "class",
        }
    }

    /// Whether values of this kind may only appear in inputs.
    #[must_use]
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Audio)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(FieldKind::as_str).collect();
                format!("Invalid type \"{s}\". Expected one of: {}", names.join(", "))
            })
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    /// Base type tag.
    #[serde(rename = "name")]
    pub kind: FieldKind,
    /// Whether the field holds a list of `kind` values.
    #[serde(default, rename = "isArray")]
    pub is_array: bool,
    /// Allowed values for `class` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldType {
    /// Create a scalar type.
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            is_array: false,
            options: Vec::new(),
        }
    }

    /// Create a class type with options.
    #[must_use]
    pub fn class<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: FieldKind::Class,
            is_array: false,
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Make this an array type.
    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Human description used in prompts and corrective feedback.
    ///
    /// ```rust
    /// use sigil_signature::{FieldKind, FieldType};
    ///
    /// assert_eq!(FieldType::new(FieldKind::Number).array().describe(), "json array of number items");
    /// ```
    #[must_use]
    pub fn describe(&self) -> String {
        let base = match self.kind {
            FieldKind::String => "string".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Date => "date (\"YYYY-MM-DD\" format)".to_string(),
            FieldKind::DateTime => "date time (\"YYYY-MM-DD HH:mm Timezone\" format)".to_string(),
            FieldKind::Json => "JSON object".to_string(),
            FieldKind::Class => format!(
                "classification class (allowed classes: {})",
                self.options.join(", ")
            ),
            FieldKind::Code => "code".to_string(),
            FieldKind::Image => "image".to_string(),
            FieldKind::Audio => "audio".to_string(),
        };
        if self.is_array {
            format!("json array of {base} items")
        } else {
            base
        }
    }
}

/// One named, typed slot of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Identifier, camelCase or snake_case.
    pub name: String,
    /// Label used in prompts and extraction; derived from `name` when empty.
    #[serde(default)]
    pub title: String,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared type; `None` means string.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// May be absent from model output / caller input.
    #[serde(default)]
    pub is_optional: bool,
    /// Output-only scratch field removed from results.
    #[serde(default)]
    pub is_internal: bool,
}

impl Field {
    /// Create a string field with a derived title.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: to_title(&name),
            name,
            description: None,
            field_type: None,
            is_optional: false,
            is_internal: false,
        }
    }

    /// Set the type.
    #[must_use]
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Set a scalar type by kind.
    #[must_use]
    pub fn kind_of(self, kind: FieldKind) -> Self {
        self.with_type(FieldType::new(kind))
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Mark as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Mark as internal.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// Effective type tag (string when undeclared).
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.field_type.as_ref().map_or(FieldKind::String, |t| t.kind)
    }

    /// Whether the field holds a list.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.field_type.as_ref().is_some_and(|t| t.is_array)
    }

    /// Class options, empty for non-class fields.
    #[must_use]
    pub fn options(&self) -> &[String] {
        self.field_type.as_ref().map_or(&[], |t| t.options.as_slice())
    }

    /// Type description for prompts and error messages.
    #[must_use]
    pub fn type_description(&self) -> String {
        self.field_type
            .as_ref()
            .map_or_else(|| "string".to_string(), FieldType::describe)
    }

    /// Label the model is asked to emit, `Title:`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:", self.title)
    }

    /// Fill in a derived title if none was given.
    pub(crate) fn normalize(mut self) -> Self {
        if self.title.trim().is_empty() {
            self.title = to_title(&self.name);
        }
        self
    }
}

/// Derive a human title from a field name.
///
/// Underscores become spaces, a space is inserted before each capital
/// letter and each run of digits, and the first letter is upper-cased.
///
/// ```rust
/// use sigil_signature::to_title;
///
/// assert_eq!(to_title("userInput"), "User Input");
/// assert_eq!(to_title("item_count2"), "Item count 2");
/// ```
#[must_use]
pub fn to_title(name: &str) -> String {
    let mut spaced = String::with_capacity(name.len() + 4);
    let mut prev_digit = false;
    for c in name.chars() {
        if c == '_' {
            spaced.push(' ');
            prev_digit = false;
            continue;
        }
        let digit = c.is_ascii_digit();
        if c.is_ascii_uppercase() || (digit && !prev_digit) {
            spaced.push(' ');
        }
        spaced.push(c);
        prev_digit = digit;
    }

    let trimmed = spaced.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
