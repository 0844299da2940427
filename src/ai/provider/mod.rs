//! LLM Provider Abstraction
//!
//! Defines the `LlmProvider` trait: one system prompt plus one user prompt in,
//! generated text plus token usage out. Stage agents never see a provider's
//! wire format beyond this shape.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible chat-completions endpoint
//! - `ollama`: Locally-running Ollama server

#[cfg(test)]
pub mod mock;
mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError, TokenUsage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::timeout::TimeoutConfig;
use crate::config::LlmConfig;
use crate::types::{NovelError, Result};

// =============================================================================
// Request
// =============================================================================

/// Per-call generation options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking_enabled: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 8192,
            thinking_enabled: false,
        }
    }
}

/// A single model call
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Model identifier; `None` uses the provider's configured model
    pub model: Option<String>,
    pub options: GenerationOptions,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// Complete LLM response including text, usage metrics and timing
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text, unparsed
    pub text: String,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with text only (usage unknown)
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
    /// API processing time in milliseconds (from provider response)
    pub api_ms: Option<u64>,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
            api_ms: None,
        }
    }

    pub fn with_api_time(duration: std::time::Duration, api_ms: Option<u64>) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
            api_ms,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Shared LLM provider type for concurrent access across projects.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output. Each
/// provider converts the key to `SecretString` internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai", "ollama"
    pub provider: String,
    /// Default model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: crate::constants::network::DEFAULT_TIMEOUT_SECS,
            api_key: None,
            api_base: None,
        }
    }
}

impl ProviderConfig {
    /// Whole-call and connect budgets for this provider's HTTP client
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::from_secs(self.timeout_secs)
    }
}

impl From<&LlmConfig> for ProviderConfig {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            provider: llm.provider.clone(),
            model: Some(llm.model.clone()),
            timeout_secs: llm.timeout_secs,
            api_key: llm.api_key.clone(),
            api_base: llm.api_base.clone(),
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// LLM Provider trait: one request, one text response with usage
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Issue a single model call
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Default model name
    fn model(&self) -> &str;

    /// Check if the provider is available
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(NovelError::Config(format!(
            "Unknown provider: {}. Supported: openai, ollama",
            config.provider
        ))),
    }
}

pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    let timeouts = config.timeouts();
    reqwest::Client::builder()
        .timeout(timeouts.llm_request)
        .connect_timeout(timeouts.connection)
        .build()
        .map_err(|e| NovelError::LlmApi(format!("Failed to create HTTP client: {}", e)))
}

/// Map a failed HTTP exchange to a classified error
pub(crate) fn http_error(provider: &str, status: u16, body: &str) -> NovelError {
    NovelError::Llm(ErrorClassifier::classify_http_status(
        status,
        &format!("HTTP {}: {}", status, body),
        provider,
    ))
}

/// Map a transport failure to a classified error
pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> NovelError {
    let category = if err.is_timeout() || err.is_connect() {
        ErrorCategory::Network
    } else {
        ErrorClassifier::classify(&err.to_string(), provider).category
    };
    NovelError::Llm(LlmError::with_provider(
        category,
        format!("request failed: {}", err),
        provider,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-very-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_timeouts_follow_config() {
        let config = ProviderConfig {
            timeout_secs: 45,
            ..Default::default()
        };
        let timeouts = config.timeouts();
        assert_eq!(timeouts.llm_request.as_secs(), 45);
        assert_eq!(
            timeouts.connection.as_secs(),
            crate::constants::network::CONNECTION_TIMEOUT_SECS
        );
        assert!(http_client(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let config = ProviderConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(NovelError::Config(_))
        ));
    }

    #[test]
    fn test_http_error_classification() {
        match http_error("openai", 429, "slow down") {
            NovelError::Llm(e) => assert_eq!(e.category, ErrorCategory::RateLimit),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!http_error("openai", 401, "bad key").is_recoverable());
    }

    #[test]
    fn test_request_builder() {
        let req = LlmRequest::new("sys", "user")
            .with_model("m")
            .with_options(GenerationOptions {
                temperature: 0.2,
                max_output_tokens: 100,
                thinking_enabled: true,
            });
        assert_eq!(req.model.as_deref(), Some("m"));
        assert!(req.options.thinking_enabled);
    }
}
