//! Position-Based Repair Loop
//!
//! Last rung of the recovery ladder. Parses, reads the error position reported
//! by `serde_json`, applies one fix at that position and parses again. Stops
//! when the document parses, when the attempt bound is reached, when an error
//! has no matching rule, or when a fix leaves the text unchanged.

use serde_json::Value;
use tracing::debug;

/// A single fix derived from a parser error
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fix {
    Insert(usize, &'static str),
    Remove(usize),
    Truncate(usize),
    Append(&'static str),
    Replace(usize, usize, String),
}

/// Run the loop; `None` when the document could not be repaired
pub fn repair(input: &str, max_attempts: usize) -> Option<Value> {
    let mut text = input.to_string();

    for attempt in 0..max_attempts {
        let err = match serde_json::from_str::<Value>(&text) {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Positional repair succeeded after {} fixes", attempt);
                }
                return Some(value);
            }
            Err(e) => e,
        };

        let offset = byte_offset(&text, err.line(), err.column());
        let fix = match rule_for(&text, &err.to_string(), offset) {
            Some(fix) => fix,
            None => {
                debug!("No positional rule for: {}", err);
                return None;
            }
        };

        let next = apply(&text, fix);
        if next == text {
            return None;
        }
        text = next;
    }

    debug!("Positional repair exceeded {} attempts", max_attempts);
    None
}

/// Byte offset of the character the parser stopped at.
/// `serde_json` columns are 1-based byte columns.
fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>();
    let mut pos = (line_start + column.saturating_sub(1)).min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn rule_for(text: &str, message: &str, pos: usize) -> Option<Fix> {
    if message.starts_with("EOF while parsing a string") {
        return Some(Fix::Append("\""));
    }
    if message.starts_with("EOF while parsing a list") {
        return Some(close_with(text, "]"));
    }
    if message.starts_with("EOF while parsing an object") {
        return Some(close_with(text, "}"));
    }
    if message.starts_with("EOF while parsing a value") {
        let trimmed = text.trim_end();
        return if trimmed.ends_with(':') {
            Some(Fix::Append(" null"))
        } else if trimmed.ends_with(',') {
            Some(Fix::Truncate(trimmed.len() - 1))
        } else {
            None
        };
    }
    if message.starts_with("expected `,` or `}`") || message.starts_with("expected `,` or `]`")
    {
        return missing_comma_or_stray_quote(text, pos);
    }
    if message.starts_with("key must be a string") {
        return quote_bare_key(text, pos);
    }
    if message.starts_with("control character") {
        return escape_control(text, pos);
    }
    if message.starts_with("trailing comma") {
        return prev_non_ws(text, pos)
            .filter(|&(_, c)| c == ',')
            .map(|(i, _)| Fix::Remove(i));
    }
    if message.starts_with("invalid escape") {
        return text[..pos.min(text.len())]
            .rfind('\\')
            .map(|i| Fix::Insert(i, "\\"));
    }
    if message.starts_with("trailing characters") {
        return Some(Fix::Truncate(pos));
    }
    None
}

/// At EOF, close the innermost structure after dropping a dangling comma
fn close_with(text: &str, closer: &'static str) -> Fix {
    let trimmed = text.trim_end();
    if trimmed.ends_with(',') {
        Fix::Truncate(trimmed.len() - 1)
    } else if trimmed.ends_with(':') {
        Fix::Append(" null")
    } else {
        Fix::Append(closer)
    }
}

/// Parser wanted a separator. Either the separator is missing between two
/// values, or a string ended early on an unescaped quote.
fn missing_comma_or_stray_quote(text: &str, pos: usize) -> Option<Fix> {
    let current = text[pos..].chars().next()?;
    let prev = prev_non_ws(text, pos);

    if current == '"' || current == '{' || current == '[' {
        let at = prev.map(|(i, c)| i + c.len_utf8()).unwrap_or(pos);
        return Some(Fix::Insert(at, ","));
    }
    if let Some((i, '"')) = prev {
        return Some(Fix::Insert(i, "\\"));
    }
    if current.is_ascii_digit() || current == '-' || matches!(current, 't' | 'f' | 'n') {
        let at = prev.map(|(i, c)| i + c.len_utf8()).unwrap_or(pos);
        return Some(Fix::Insert(at, ","));
    }
    None
}

fn quote_bare_key(text: &str, pos: usize) -> Option<Fix> {
    let rest = &text[pos..];
    let lead = rest.len() - rest.trim_start().len();
    let start = pos + lead;
    let ident_len = text[start..]
        .char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map(|(i, _)| i)
        .unwrap_or(text.len() - start);
    if ident_len == 0 {
        return None;
    }
    let ident = &text[start..start + ident_len];
    Some(Fix::Replace(start, start + ident_len, format!("\"{}\"", ident)))
}

fn escape_control(text: &str, pos: usize) -> Option<Fix> {
    let from = pos.saturating_sub(1);
    let found = text[from..]
        .char_indices()
        .find(|(_, c)| c.is_control())
        .map(|(i, c)| (from + i, c))
        .or_else(|| text[..from].char_indices().rev().find(|(_, c)| c.is_control()))?;
    let (i, c) = found;
    let escaped = match c {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        other => format!("\\u{:04x}", other as u32),
    };
    Some(Fix::Replace(i, i + c.len_utf8(), escaped))
}

fn prev_non_ws(text: &str, pos: usize) -> Option<(usize, char)> {
    text[..pos.min(text.len())]
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_whitespace())
}

fn apply(text: &str, fix: Fix) -> String {
    match fix {
        Fix::Insert(at, s) => {
            let mut out = String::with_capacity(text.len() + s.len());
            out.push_str(&text[..at]);
            out.push_str(s);
            out.push_str(&text[at..]);
            out
        }
        Fix::Remove(at) => {
            let mut out = text.to_string();
            out.remove(at);
            out
        }
        Fix::Truncate(at) => text[..at].to_string(),
        Fix::Append(s) => format!("{}{}", text.trim_end(), s),
        Fix::Replace(start, end, s) => format!("{}{}{}", &text[..start], s, &text[end..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inserts_missing_comma() {
        let value = repair(r#"{"a": 1 "b": 2}"#, 50).unwrap();
        assert_eq!(value, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_inserts_missing_comma_between_objects() {
        let value = repair(r#"[{"a": 1} {"a": 2}]"#, 50).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn test_escapes_unescaped_quote() {
        let value = repair(r#"{"line": "she said "run" twice", "n": 1}"#, 50).unwrap();
        assert_eq!(value["line"], "she said \"run\" twice");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_quotes_bare_key() {
        let value = repair(r#"{"a": 1, b: 2}"#, 50).unwrap();
        assert_eq!(value, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_closes_unterminated_structures() {
        let value = repair(r#"{"a": [1, 2, {"b": "open"#, 50).unwrap();
        assert_eq!(value, json!({"a": [1, 2, {"b": "open"}]}));
    }

    #[test]
    fn test_escapes_control_character() {
        let value = repair("{\"a\": \"x\ty\"}", 50).unwrap();
        assert_eq!(value["a"], "x\ty");
    }

    #[test]
    fn test_drops_trailing_characters() {
        let value = repair(r#"{"a": 1} trailing words"#, 50).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_respects_attempt_bound() {
        assert!(repair(r#"{"a": [1, 2, {"b": "open"#, 2).is_none());
    }

    #[test]
    fn test_unknown_error_aborts() {
        assert!(repair(r#"{"a": @}"#, 50).is_none());
    }

    #[test]
    fn test_byte_offset_multiline() {
        let text = "{\n  \"a\": 1\n  \"b\": 2\n}";
        let err = serde_json::from_str::<Value>(text).unwrap_err();
        let pos = byte_offset(text, err.line(), err.column());
        assert_eq!(&text[pos..pos + 1], "\"");
    }
}
