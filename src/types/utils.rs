//! Shared utility functions for type serialization and text handling.
//!
//! ## JSON Extraction Helpers
//!
//! Provides ergonomic helpers for extracting values from `serde_json::Value`:
//! - `json_string`, `json_string_or` - Extract strings
//! - `json_string_array` - Extract string arrays
//! - `json_u32` - Extract small unsigned numbers, tolerating numeric strings
//!
//! ## Text Helpers
//!
//! - `count_words`, `truncate_words` - Word-level measurement
//! - `tail_chars` - Char-boundary-safe suffix of prose

use serde::Serialize;
use std::fmt::Display;

// =============================================================================
// JSON Value Extraction Helpers
// =============================================================================

/// Extract string from JSON value by key.
#[inline]
pub fn json_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(String::from)
}

/// Extract string with default value.
#[inline]
pub fn json_string_or(value: &serde_json::Value, key: &str, default: &str) -> String {
    json_string(value, key).unwrap_or_else(|| default.to_string())
}

/// Extract string array from JSON value by key.
#[inline]
pub fn json_string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract an unsigned number. Models often emit `"7"` instead of `7`.
pub fn json_u32(value: &serde_json::Value, key: &str) -> Option<u32> {
    let v = value.get(key)?;
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).ok();
    }
    if let Some(f) = v.as_f64() {
        return (f >= 0.0 && f <= u32::MAX as f64).then_some(f.round() as u32);
    }
    v.as_str()?.trim().parse().ok()
}

// =============================================================================
// Text Utilities
// =============================================================================

/// Count whitespace-separated words.
#[inline]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep at most `max` words, joined by single spaces.
pub fn truncate_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return text.trim().to_string();
    }
    words[..max].join(" ")
}

/// Last `max_chars` characters of `text`, never splitting a UTF-8 sequence.
///
/// A cut that lands inside a word moves forward to the next word; leading
/// whitespace is dropped. A tail with no word boundary is kept whole.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let Some((idx, _)) = text.char_indices().nth(count - max_chars) else {
        return text;
    };
    let tail = &text[idx..];
    let mid_word = text[..idx].chars().next_back().is_some_and(|c| !c.is_whitespace())
        && tail.chars().next().is_some_and(|c| !c.is_whitespace());
    let tail = match tail.find(char::is_whitespace) {
        Some(space) if mid_word => &tail[space..],
        _ => tail,
    };
    tail.trim_start()
}

// =============================================================================
// Type Parsing
// =============================================================================

/// Trait for parsing strings into enum types with a default fallback.
/// Used for deserializing database values where invalid strings should fall back gracefully.
pub trait ParseWithDefault: Sized {
    /// The name of this type for logging purposes.
    fn type_name() -> &'static str;

    /// The default value to use when parsing fails.
    fn default_value() -> Self;

    /// Try to parse the string, returning None if invalid.
    fn try_parse(s: &str) -> Option<Self>;

    /// Parse a string into this type, returning a default value if parsing fails.
    /// Logs a warning for invalid values to help detect data corruption.
    fn parse_or_default(s: &str) -> Self {
        match Self::try_parse(s) {
            Some(v) => v,
            None => {
                tracing::warn!("Invalid {} value '{}', using default", Self::type_name(), s);
                Self::default_value()
            }
        }
    }
}

/// Serialize an enum to its serde string representation (without quotes).
pub fn enum_to_str<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

/// Discard an error after logging it at warn level.
pub fn log_filter_warn<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_helpers() {
        let v = json!({"name": "Ada", "tags": ["a", 1, "b"], "n": "7", "m": 3.0});
        assert_eq!(json_string(&v, "name").as_deref(), Some("Ada"));
        assert_eq!(json_string_or(&v, "missing", "x"), "x");
        assert_eq!(json_string_array(&v, "tags"), vec!["a", "b"]);
        assert_eq!(json_u32(&v, "n"), Some(7));
        assert_eq!(json_u32(&v, "m"), Some(3));
        assert_eq!(json_u32(&v, "name"), None);
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("one two three four", 2), "one two");
        assert_eq!(truncate_words("  one two ", 5), "one two");
        assert_eq!(count_words("one  two\nthree"), 3);
    }

    #[test]
    fn test_tail_chars_respects_utf8() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("short", 100), "short");
    }

    #[test]
    fn test_tail_chars_starts_on_a_word() {
        let text = "She stepped off the boat and waited.";
        assert_eq!(tail_chars(text, 12), "and waited.");
        assert_eq!(tail_chars(text, 14), "and waited.");
        assert_eq!(tail_chars(text, 11), "and waited.");
        assert_eq!(tail_chars("unbreakable", 4), "able");
    }

    #[test]
    fn test_enum_to_str() {
        #[derive(Serialize)]
        #[serde(rename_all = "snake_case")]
        enum Sample {
            SceneWriter,
        }
        assert_eq!(enum_to_str(&Sample::SceneWriter), "scene_writer");
    }
}
