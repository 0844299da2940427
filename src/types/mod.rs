pub mod error;
pub mod utils;

pub use error::{
    ErrorCategory, ErrorClassifier, LlmError, NovelError, Result, ResultExt, ValidationError,
    ValidationErrorKind,
};
pub use utils::{
    ParseWithDefault, count_words, enum_to_str, json_string, json_string_array, json_string_or,
    json_u32, log_filter_warn, tail_chars, truncate_words,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for project IDs
///
/// Prevents accidental mixing of project IDs with other string types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for display
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Token usage counters accumulated across model calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub thinking: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, thinking: u64) -> Self {
        Self {
            input,
            output,
            thinking,
        }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output + self.thinking
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.thinking += other.thinking;
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(mut self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage::add(&mut self, &rhs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_short() {
        let id = ProjectId::new("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(ProjectId::new("abc").short(), "abc");
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut usage = TokenUsage::new(10, 20, 0);
        usage.add(&TokenUsage::new(1, 2, 3));
        assert_eq!(usage, TokenUsage::new(11, 22, 3));
        assert_eq!(usage.total(), 36);
        assert_eq!((usage + TokenUsage::new(1, 1, 1)).total(), 39);
    }
}
