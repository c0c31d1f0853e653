//! Markdown helpers: fenced blocks and bullet lists.

use regex::Regex;
use std::sync::OnceLock;

fn fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([A-Za-z]+)?\s*([\s\S]*?)\s*```").expect("static pattern"))
}

/// Body of the first fenced code block, or the input unchanged.
///
/// ```rust
/// use sigil_extract::markdown::extract_block;
///
/// assert_eq!(extract_block("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(extract_block("plain"), "plain");
/// ```
#[must_use]
pub fn extract_block(input: &str) -> &str {
    fence()
        .captures(input)
        .and_then(|c| c.get(2))
        .map_or(input, |m| m.as_str())
}

/// Strip a fence that wraps the whole value, keeping inner text as-is.
#[must_use]
pub fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        extract_block(trimmed)
    } else {
        input
    }
}

fn list_item(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        return line[digits..].strip_prefix(". ");
    }
    None
}

/// Parse a bullet or numbered list into its items.
///
/// A single leading header line ending in `:` is skipped. Any other line
/// that is not a list item is an error.
///
/// ```rust
/// use sigil_extract::markdown::parse_markdown_list;
///
/// let items = parse_markdown_list("Items:\n- one\n- two").unwrap();
/// assert_eq!(items, vec!["one", "two"]);
/// ```
pub fn parse_markdown_list(content: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    for (i, line) in content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
    {
        match list_item(line) {
            Some(item) => items.push(item.trim().to_string()),
            None if i == 0 && line.ends_with(':') => {}
            None if items.is_empty() && i == 0 => {
                return Err("Could not parse markdown list: no list items found".into())
            }
            None => {
                return Err("Could not parse markdown list: mixed content detected".into())
            }
        }
    }
    if items.is_empty() {
        return Err("Could not parse markdown list: no list items found".into());
    }
    Ok(items)
}
