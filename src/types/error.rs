//! Unified Error Type System
//!
//! Centralized error types for the whole pipeline.
//! Provides error classification for the one-retry stage policy.
//!
//! ## Error Categories
//!
//! - **Transient**: Temporary issues that may resolve (retry)
//! - **RateLimit**: API rate limiting (wait and retry)
//! - **TokenLimit**: Context too large (fail the stage)
//! - **Auth**: Authentication failures (fail fast)
//! - **Network**: Connectivity issues (retry)
//! - **ParseError**: Model output could not be recovered (retry once)

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Context/token limit exceeded
    TokenLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues
    Network,
    /// Provider unavailable
    Unavailable,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Parsing model response failed
    ParseError,
    /// Temporary server issues
    Transient,
    /// Unknown error - conservative retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is retryable with identical inputs
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::Network
                | Self::Transient
                | Self::ParseError
                | Self::Unavailable
                | Self::Unknown
        )
    }

    /// Recommended wait before the retry
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(30),
            Self::Network => Duration::from_secs(5),
            Self::Transient => Duration::from_secs(2),
            Self::ParseError => Duration::from_secs(1),
            _ => Duration::from_millis(500),
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// LLM error with category, context, and retry hints
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.category.recommended_delay())
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Classifies provider failures into categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30));
        }

        if lower.contains("token")
            && (lower.contains("limit") || lower.contains("exceed") || lower.contains("maximum"))
            || lower.contains("context length")
            || lower.contains("context too long")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider)
                .retry_after(Duration::from_secs(5));
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("500")
            || lower.contains("internal error")
        {
            return LlmError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if lower.contains("400") || lower.contains("bad request") {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        if lower.contains("overloaded") || lower.contains("temporary") {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider)
                .retry_after(Duration::from_secs(2));
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30)),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
                    .retry_after(Duration::from_secs(5))
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Semantic validation failure of a recovered model output
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: Option<String>,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)?;
        } else {
            write!(f, "Validation failed: {}", self.message)?;
        }
        if let (Some(expected), Some(actual)) = (&self.expected, &self.actual) {
            write!(f, " (expected {}, got {})", expected, actual)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_comparison(
        mut self,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ValidationErrorKind::MissingField, "required field is missing")
            .with_field(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field missing
    MissingField,
    /// Field present with the wrong shape
    Format,
    /// Count or value out of range
    Range,
    /// Cross-field consistency failure
    Consistency,
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum NovelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Stage failure with the chapter it happened in
    #[error("{stage} failed{}: {message}", in_chapter(chapter))]
    Stage {
        stage: String,
        chapter: Option<u32>,
        message: String,
        recoverable: bool,
    },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Every strategy of the structured-output ladder failed
    #[error("Unrecoverable model output: {0}")]
    Recovery(String),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("Cannot {action} a project whose status is {status}")]
    InvalidTransition { status: String, action: String },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run 'novelsmith init' first")]
    NotInitialized,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for NovelError {
    fn from(err: LlmError) -> Self {
        NovelError::Llm(err)
    }
}

impl From<ValidationError> for NovelError {
    fn from(err: ValidationError) -> Self {
        NovelError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, NovelError>;

fn in_chapter(chapter: &Option<u32>) -> String {
    chapter.map(|c| format!(" in chapter {}", c)).unwrap_or_default()
}

impl NovelError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn stage(
        stage: impl Into<String>,
        chapter: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        Self::Stage {
            stage: stage.into(),
            chapter,
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn invalid_transition(status: impl std::fmt::Display, action: &str) -> Self {
        Self::InvalidTransition {
            status: status.to_string(),
            action: action.to_string(),
        }
    }

    /// Whether a stage that failed with this error may be retried with the same inputs
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            Self::LlmApi(msg) => ErrorClassifier::classify(msg, "unknown").is_retryable(),
            Self::Stage { recoverable, .. } => *recoverable,
            Self::Timeout { .. } | Self::Recovery(_) | Self::Validation(_) => true,
            _ => false,
        }
    }

    /// Suggested pause before the retry
    pub fn retry_delay(&self) -> Duration {
        match self {
            Self::Llm(e) => e.recommended_delay(),
            Self::Timeout { .. } => ErrorCategory::Network.recommended_delay(),
            Self::Recovery(_) | Self::Validation(_) => {
                ErrorCategory::ParseError.recommended_delay()
            }
            _ => Duration::from_millis(500),
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| NovelError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| NovelError::Storage(format!("{}: {}", f().into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::ParseError.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::BadRequest.is_retryable());
        assert!(!ErrorCategory::TokenLimit.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        assert_eq!(
            ErrorClassifier::classify_http_status(429, "slow down", "t").category,
            ErrorCategory::RateLimit
        );
        assert_eq!(
            ErrorClassifier::classify_http_status(401, "no", "t").category,
            ErrorCategory::Auth
        );
        assert_eq!(
            ErrorClassifier::classify_http_status(503, "busy", "t").category,
            ErrorCategory::Transient
        );
    }

    #[test]
    fn test_recoverable_errors() {
        let timeout = NovelError::timeout("scene", Duration::from_secs(1));
        assert!(timeout.is_recoverable());
        assert!(NovelError::Recovery("bad".into()).is_recoverable());
        assert!(
            NovelError::Validation(ValidationError::missing_field("outline")).is_recoverable()
        );
        assert!(!NovelError::Config("bad".into()).is_recoverable());
        assert!(!NovelError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_stage_error_display() {
        let err = NovelError::stage("scene_writer", Some(3), "empty text");
        assert_eq!(
            err.to_string(),
            "scene_writer failed in chapter 3: empty text"
        );
        let err = NovelError::stage("outline", None, "no json");
        assert_eq!(err.to_string(), "outline failed: no json");
    }

    #[test]
    fn test_validation_display() {
        let err = ValidationError::new(ValidationErrorKind::Range, "chapter count mismatch")
            .with_field("outline")
            .with_comparison("12", "9");
        assert_eq!(
            err.to_string(),
            "Validation failed for 'outline': chapter count mismatch (expected 12, got 9)"
        );
    }
}
