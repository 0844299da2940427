//! JSON Recovery Ladder
//!
//! Converts model text that is supposed to be JSON into a `serde_json::Value`.
//! Strategies are tried in a fixed order and the first success wins:
//!
//! 1. `AnchoredRegion` - the object enclosing an anchor key (e.g. `"outline"`)
//! 2. `OuterBounds` - first `{` to last `}` (or `[` to `]`)
//! 3. `BalancedScan` - string-aware depth scan, cut where depth returns to zero
//! 4. `StructuralRepair` - single quotes, bare keys, raw newlines/tabs in strings
//! 5. `TruncationClose` - cut after the last complete array element, close the rest
//! 6. `PositionalRepair` - parser-error-driven fix loop (see `position_repair`)
//!
//! Every candidate goes through the same cleaning pass: code fences, BOM,
//! trailing commas and stray control characters are removed.
//!
//! Each strategy returns a `Result`; nothing here panics or unwinds.

use serde_json::Value;
use tracing::{debug, warn};

use super::position_repair;
use crate::constants::recovery;
use crate::types::{NovelError, Result};

// =============================================================================
// Strategies
// =============================================================================

/// One rung of the recovery ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    AnchoredRegion,
    OuterBounds,
    BalancedScan,
    StructuralRepair,
    TruncationClose,
    PositionalRepair,
}

impl RepairStrategy {
    /// Ladder order
    pub const LADDER: [RepairStrategy; 6] = [
        RepairStrategy::AnchoredRegion,
        RepairStrategy::OuterBounds,
        RepairStrategy::BalancedScan,
        RepairStrategy::StructuralRepair,
        RepairStrategy::TruncationClose,
        RepairStrategy::PositionalRepair,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::AnchoredRegion => "anchored_region",
            Self::OuterBounds => "outer_bounds",
            Self::BalancedScan => "balanced_scan",
            Self::StructuralRepair => "structural_repair",
            Self::TruncationClose => "truncation_close",
            Self::PositionalRepair => "positional_repair",
        }
    }
}

impl std::fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful recovery
#[derive(Debug, Clone)]
pub struct Recovered {
    pub value: Value,
    pub strategy: RepairStrategy,
}

impl Recovered {
    /// Whether anything beyond extraction and cleaning was needed
    pub fn was_repaired(&self) -> bool {
        matches!(
            self.strategy,
            RepairStrategy::StructuralRepair
                | RepairStrategy::TruncationClose
                | RepairStrategy::PositionalRepair
        )
    }
}

// =============================================================================
// JsonRepairer
// =============================================================================

/// Runs the recovery ladder over raw model text
#[derive(Debug, Clone)]
pub struct JsonRepairer {
    anchor: Option<String>,
    max_position_repairs: usize,
}

impl Default for JsonRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRepairer {
    pub fn new() -> Self {
        Self {
            anchor: None,
            max_position_repairs: recovery::MAX_POSITION_REPAIRS,
        }
    }

    /// Key whose enclosing object is the preferred extraction region
    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn with_max_position_repairs(mut self, max: usize) -> Self {
        self.max_position_repairs = max;
        self
    }

    /// Try every strategy in order until one parses
    pub fn recover(&self, raw: &str) -> Result<Recovered> {
        let text = preprocess(raw);
        if text.is_empty() {
            return Err(NovelError::Recovery("empty model output".to_string()));
        }

        for strategy in RepairStrategy::LADDER {
            match self.attempt(strategy, &text) {
                Some(value) => {
                    if strategy == RepairStrategy::LADDER[0] {
                        debug!("JSON parsed via {}", strategy);
                    } else {
                        warn!("JSON recovered via {}", strategy);
                    }
                    return Ok(Recovered { value, strategy });
                }
                None => debug!("Recovery strategy {} failed", strategy),
            }
        }

        Err(NovelError::Recovery(format!(
            "all {} strategies failed. Content preview: {}...",
            RepairStrategy::LADDER.len(),
            text.chars()
                .take(recovery::ERROR_PREVIEW_CHARS)
                .collect::<String>()
        )))
    }

    /// Run a single strategy
    pub fn attempt(&self, strategy: RepairStrategy, text: &str) -> Option<Value> {
        match strategy {
            RepairStrategy::AnchoredRegion => {
                let region = match &self.anchor {
                    Some(anchor) => anchored_region(text, anchor)?,
                    None => text,
                };
                parse_clean(region)
            }
            RepairStrategy::OuterBounds => parse_clean(outer_bounds(text)?),
            RepairStrategy::BalancedScan => balanced_candidates(text)
                .into_iter()
                .find_map(parse_clean),
            RepairStrategy::StructuralRepair => parse_clean(&structural_repair(
                outer_bounds(text).unwrap_or(text),
            )),
            RepairStrategy::TruncationClose => {
                let repaired = structural_repair(from_first_opener(text)?);
                close_truncated(&repaired)
                    .into_iter()
                    .find_map(|candidate| parse_clean(&candidate))
            }
            RepairStrategy::PositionalRepair => {
                let repaired = clean(&structural_repair(from_first_opener(text)?));
                position_repair::repair(&repaired, self.max_position_repairs)
            }
        }
    }
}

// =============================================================================
// Cleaning
// =============================================================================

fn preprocess(raw: &str) -> String {
    let s = raw.trim().trim_start_matches('\u{feff}');
    strip_code_fences(s).trim().to_string()
}

/// Drop markdown fence lines wherever they appear
pub(crate) fn strip_code_fences(s: &str) -> String {
    if !s.contains("```") {
        return s.to_string();
    }
    s.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trailing commas and control characters, outside of string escaping
pub(crate) fn clean(s: &str) -> String {
    fix_trailing_commas(&remove_control_chars(s))
}

fn parse_clean(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(&clean(candidate)).ok()
}

/// Remove control characters other than newline, carriage return and tab
fn remove_control_chars(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Fix trailing commas before `]` or `}`, ignoring commas inside strings
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            result.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                result.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some(']') | Some('}')) {
                    result.push(ch);
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

// =============================================================================
// Extraction
// =============================================================================

/// The object that encloses `"anchor"`, through the last `}`
fn anchored_region<'a>(text: &'a str, anchor: &str) -> Option<&'a str> {
    let key = format!("\"{}\"", anchor);
    let key_pos = text.find(&key)?;

    let mut depth = 0usize;
    let mut start = None;
    for (i, ch) in text[..key_pos].char_indices().rev() {
        match ch {
            '}' => depth += 1,
            '{' if depth == 0 => {
                start = Some(i);
                break;
            }
            '{' => depth -= 1,
            _ => {}
        }
    }

    let start = start?;
    let end = text.rfind('}')?;
    (end > key_pos).then(|| &text[start..=end])
}

/// First opener to the last matching closer kind
fn outer_bounds(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn from_first_opener(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    Some(&text[start..])
}

/// Balanced regions starting at each opener, in order of appearance
fn balanced_candidates(text: &str) -> Vec<&str> {
    const MAX_CANDIDATES: usize = 16;

    let mut out = Vec::new();
    let mut search_from = 0;
    while out.len() < MAX_CANDIDATES {
        let Some(offset) = text[search_from..].find(['{', '[']) else {
            break;
        };
        let start = search_from + offset;
        match balanced_end(&text[start..]) {
            Some(len) => {
                out.push(&text[start..start + len]);
                search_from = start + 1;
            }
            None => break,
        }
    }
    out
}

/// Byte length of the balanced structure at the start of `s`
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + ch.len_utf8());
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

// =============================================================================
// Structural Repair
// =============================================================================

/// Single-quoted strings to double-quoted, bare keys quoted, raw
/// newlines/tabs inside strings escaped, Python literals mapped to JSON.
pub(crate) fn structural_repair(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' => {
                i = copy_string(&chars, i, '"', &mut out);
            }
            '\'' if opens_value(&chars, i) => {
                i = copy_string(&chars, i, '\'', &mut out);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let next = chars[i..].iter().find(|c| !c.is_whitespace());
                if next == Some(&':') && after_key_boundary(&chars, start) {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(match word.as_str() {
                        "True" => "true",
                        "False" => "false",
                        "None" => "null",
                        other => other,
                    });
                }
                continue;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

/// A quote at `i` begins a value or key when preceded by a structural char
fn opens_value(chars: &[char], i: usize) -> bool {
    matches!(
        chars[..i].iter().rev().find(|c| !c.is_whitespace()),
        None | Some('{') | Some('[') | Some(',') | Some(':')
    )
}

fn after_key_boundary(chars: &[char], start: usize) -> bool {
    matches!(
        chars[..start].iter().rev().find(|c| !c.is_whitespace()),
        Some('{') | Some(',')
    )
}

/// Copy a string literal opened by `quote` at `start` as a double-quoted JSON
/// string. Returns the index after the closing quote.
fn copy_string(chars: &[char], start: usize, quote: char, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\\' if i + 1 < chars.len() => {
                let next = chars[i + 1];
                if quote == '\'' && next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
                i += 2;
                continue;
            }
            c if c == quote && (quote == '"' || closes_single(chars, i)) => {
                out.push('"');
                return i + 1;
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
        i += 1;
    }
    // Unterminated: leave open for the truncation strategies
    i
}

/// A single quote closes its string when followed by a structural char
fn closes_single(chars: &[char], i: usize) -> bool {
    matches!(
        chars[i + 1..].iter().find(|c| !c.is_whitespace()),
        None | Some(',') | Some('}') | Some(']') | Some(':')
    )
}

// =============================================================================
// Truncation Close
// =============================================================================

/// Candidates for a truncated document: cut after the last complete array
/// element, then the whole text with dangling tokens trimmed. Both get the
/// open structures closed.
fn close_truncated(s: &str) -> Vec<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut last_element: Option<(usize, Vec<char>)> = None;

    for (i, ch) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
                if ch == '}' && stack.last() == Some(&']') {
                    last_element = Some((i + 1, stack.clone()));
                }
            }
            _ => {}
        }
    }

    let mut candidates = Vec::with_capacity(2);

    if let Some((cut, open)) = last_element
        && (cut < s.trim_end().len() || !open.is_empty())
    {
        let mut c = s[..cut].to_string();
        c.extend(open.iter().rev());
        candidates.push(c);
    }

    let mut whole = s.trim_end().to_string();
    if in_string {
        whole.push('"');
    }
    let trimmed = whole.trim_end_matches([',', ' ', '\n', '\r', '\t']).to_string();
    let mut whole = if trimmed.ends_with(':') {
        format!("{} null", trimmed)
    } else {
        trimmed
    };
    whole.extend(stack.iter().rev());
    candidates.push(whole);

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outline_value() -> Value {
        json!({
            "title": "The Salt Road",
            "outline": [
                {"number": 1, "title": "Arrival", "summary": "Mara reaches the coast."},
                {"number": 2, "title": "Ledger", "summary": "She finds the ledger."},
                {"number": 3, "title": "Storm", "summary": "The storm breaks."}
            ]
        })
    }

    #[test]
    fn test_valid_json_first_rung() {
        let raw = serde_json::to_string(&outline_value()).unwrap();
        let rec = JsonRepairer::new().with_anchor("outline").recover(&raw).unwrap();
        assert_eq!(rec.value, outline_value());
        assert_eq!(rec.strategy, RepairStrategy::AnchoredRegion);
        assert!(!rec.was_repaired());
    }

    #[test]
    fn test_fenced_json_equals_plain() {
        let plain = serde_json::to_string_pretty(&outline_value()).unwrap();
        let fenced = format!("Here is the outline:\n```json\n{}\n```\nEnjoy!", plain);
        let rec = JsonRepairer::new().with_anchor("outline").recover(&fenced).unwrap();
        assert_eq!(rec.value, outline_value());
    }

    #[test]
    fn test_literal_newline_in_string() {
        let raw = "{\"title\": \"The Salt Road\", \"outline\": [\
            {\"number\": 1, \"title\": \"Arrival\", \"summary\": \"Mara reaches\nthe coast.\"}]}";
        let rec = JsonRepairer::new().with_anchor("outline").recover(raw).unwrap();
        assert_eq!(rec.strategy, RepairStrategy::StructuralRepair);
        assert_eq!(
            rec.value["outline"][0]["summary"],
            "Mara reaches\nthe coast."
        );
    }

    #[test]
    fn test_truncated_after_complete_entry() {
        let raw = r#"{"title": "The Salt Road", "outline": [
            {"number": 1, "title": "Arrival", "summary": "Mara reaches the coast."},
            {"number": 2, "title": "Ledger", "summary": "She finds the ledger."},
            {"number": 3, "title": "Sto"#;
        let rec = JsonRepairer::new().recover(raw).unwrap();
        assert_eq!(rec.strategy, RepairStrategy::TruncationClose);
        let outline = rec.value["outline"].as_array().unwrap();
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[1]["title"], "Ledger");
    }

    #[test]
    fn test_trailing_commas_inside_strings_untouched() {
        let raw = r#"{"a": "x,]", "b": [1, 2,],}"#;
        let rec = JsonRepairer::new().recover(raw).unwrap();
        assert_eq!(rec.value, json!({"a": "x,]", "b": [1, 2]}));
    }

    #[test]
    fn test_anchor_skips_preceding_object() {
        let raw = r#"{"thinking": "plan first"} then {"outline": [{"number": 1}]}"#;
        let rec = JsonRepairer::new().with_anchor("outline").recover(raw).unwrap();
        assert_eq!(rec.strategy, RepairStrategy::AnchoredRegion);
        assert_eq!(rec.value, json!({"outline": [{"number": 1}]}));
    }

    #[test]
    fn test_balanced_scan_with_trailing_prose() {
        let raw = r#"Result: {"a": {"b": "}"}} and then {"c": 1}"#;
        let rec = JsonRepairer::new().recover(raw).unwrap();
        assert_eq!(rec.strategy, RepairStrategy::BalancedScan);
        assert_eq!(rec.value, json!({"a": {"b": "}"}}));
    }

    #[test]
    fn test_single_quotes_and_bare_keys() {
        let raw = "{name: 'Mara', role: 'protagonist', alive: True, rival: None}";
        let rec = JsonRepairer::new().recover(raw).unwrap();
        assert_eq!(rec.strategy, RepairStrategy::StructuralRepair);
        assert_eq!(
            rec.value,
            json!({"name": "Mara", "role": "protagonist", "alive": true, "rival": null})
        );
    }

    #[test]
    fn test_single_quote_apostrophe_kept() {
        let raw = "{'line': 'Mara's ledger', 'n': 1}";
        let rec = JsonRepairer::new().recover(raw).unwrap();
        assert_eq!(rec.value["line"], "Mara's ledger");
    }

    #[test]
    fn test_unrecoverable_reports_failure() {
        let err = JsonRepairer::new().recover("no json here at all").unwrap_err();
        assert!(matches!(err, NovelError::Recovery(_)));
        assert!(err.is_recoverable());
        assert!(matches!(
            JsonRepairer::new().recover("   "),
            Err(NovelError::Recovery(_))
        ));
    }

    #[test]
    fn test_close_truncated_open_string() {
        let candidates = close_truncated(r#"{"a": "unterminated"#);
        let last = candidates.last().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(last).unwrap(),
            json!({"a": "unterminated"})
        );
    }

    #[test]
    fn test_close_truncated_dangling_key() {
        let candidates = close_truncated(r#"{"a": 1, "b":"#);
        let last = candidates.last().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(last).unwrap(),
            json!({"a": 1, "b": null})
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                any::<bool>().prop_map(Value::Bool),
                any::<i32>().prop_map(|n| json!(n)),
                "[a-zA-Z0-9 ,.:{}\\[\\]'\"\\\\]{0,20}".prop_map(Value::String),
            ]
        }

        fn document() -> impl Strategy<Value = Value> {
            leaf()
                .prop_recursive(3, 24, 4, |inner| {
                    prop_oneof![
                        prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                        prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                            .prop_map(|m| Value::Object(m.into_iter().collect())),
                    ]
                })
                .prop_map(|v| json!({"payload": v}))
        }

        proptest! {
            #[test]
            fn valid_json_round_trips(doc in document()) {
                let raw = serde_json::to_string(&doc).unwrap();
                let rec = JsonRepairer::new().recover(&raw).unwrap();
                prop_assert_eq!(rec.value, doc);
            }

            #[test]
            fn fenced_equals_unfenced(doc in document()) {
                let raw = serde_json::to_string_pretty(&doc).unwrap();
                let fenced = format!("```json\n{}\n```", raw);
                let plain = JsonRepairer::new().recover(&raw).unwrap();
                let wrapped = JsonRepairer::new().recover(&fenced).unwrap();
                prop_assert_eq!(plain.value, wrapped.value);
            }
        }
    }
}
