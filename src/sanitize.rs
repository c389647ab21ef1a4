//! Best-effort escaping for values that must be spliced into literal SQL text.
//!
//! This is not a substitute for bound parameters. Use it only where a value has
//! to appear inside the statement text itself.

use serde_json::Value as JsonValue;

/// Escape a string: NUL, backspace, tab, SUB (0x1A), newline and carriage
/// return become `\0 \b \t \z \n \r`; quotes and apostrophes are doubled; a
/// backslash becomes `\\` and a percent sign `\%`.
#[must_use]
pub fn sanitize_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for c in input.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\u{08}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\u{1a}' => out.push_str("\\z"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\"\""),
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            other => out.push(other),
        }
    }
    out
}

/// Escape every string inside `value`, recursing through arrays. Any other
/// value comes back unchanged.
#[must_use]
pub fn sanitize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(sanitize_str(&s)),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sanitize).collect()),
        other => other,
    }
}
