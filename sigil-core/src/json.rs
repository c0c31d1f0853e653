//! Lenient JSON parsing for model output.
//!
//! Models frequently emit JSON5-style text that a strict parser rejects.
//! [`parse_lenient`] tries a strict parse first and then normalizes the
//! JSON5 syntax models actually produce:
//!
//! - single-quoted strings, including `\'` escapes
//! - unquoted identifier keys (`{name: 1}`)
//! - trailing commas in objects and arrays
//! - `//` line comments and `/* */` block comments
//!
//! Not supported: hexadecimal numbers, leading or trailing decimal points
//! (`.5`, `5.`), explicit `+` signs, `Infinity` and `NaN`. Input using
//! them is rejected. Truncated input is never completed, so `[1, 2` is an
//! error rather than a two-element array.

use serde_json::Value;

/// Parse JSON, accepting common JSON5 syntax when a strict parse fails.
///
/// Returns the error of the strict parse if the normalized text still
/// does not parse.
///
/// # Example
///
/// ```rust
/// use sigil_core::json::parse_lenient;
///
/// let value = parse_lenient("{name: 'sigil', tags: ['a', 'b',],}").unwrap();
/// assert_eq!(value["name"], "sigil");
/// assert_eq!(value["tags"][1], "b");
///
/// assert!(parse_lenient("[1, 2").is_err());
/// ```
pub fn parse_lenient(s: &str) -> Result<Value, serde_json::Error> {
    let s = s.trim();
    let strict_err = match serde_json::from_str::<Value>(s) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    let normalized = remove_trailing_commas(&normalize_json5(s));
    serde_json::from_str(&normalized).map_err(|_| strict_err)
}

/// Rewrite JSON5 strings, keys and comments as strict JSON.
///
/// Trailing commas are left in place for [`remove_trailing_commas`].
fn normalize_json5(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(s.len() + 16);
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '"' | '\'' => i = copy_string(&chars, i, &mut out),
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < len && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                // Unterminated comments swallow the rest; the parse then fails.
                i = (i + 2).min(len);
            }
            _ if is_ident_start(c) => {
                let start = i;
                while i < len && is_ident_char(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < len && chars[j].is_whitespace() {
                    j += 1;
                }
                if j < len && chars[j] == ':' {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Copy the string starting at `start` as a double-quoted JSON string.
///
/// Returns the index after the closing quote. An unterminated string is
/// copied without a closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' => match chars.get(i) {
                // `\'` is a JSON5 escape with no JSON counterpart.
                Some('\'') => {
                    out.push('\'');
                    i += 1;
                }
                // Line continuation.
                Some('\n') => i += 1,
                Some(&escaped) => {
                    out.push('\\');
                    out.push(escaped);
                    i += 1;
                }
                None => out.push('\\'),
            },
            _ if c == quote => {
                out.push('"');
                return i;
            }
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    i
}

/// Remove trailing commas before `}` or `]`.
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            result.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(c);
    }
    result
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

#[inline]
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
