//! OpenAI-compatible Provider
//!
//! LLM provider using the Chat Completions API. Works against OpenAI and any
//! endpoint that speaks the same protocol (set `llm.api_base`).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    LlmProvider, LlmRequest, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming,
    TokenUsage, http_client, http_error, transport_error,
};
use crate::types::{NovelError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const PROVIDER: &str = "openai";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                NovelError::Config(
                    "API key not found. Set NOVELSMITH_LLM__API_KEY or OPENAI_API_KEY".to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            client,
        })
    }

    fn build_request(&self, request: &LlmRequest) -> ChatCompletionRequest {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.system_prompt.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.user_prompt.clone(),
        });

        ChatCompletionRequest {
            model,
            messages,
            temperature: request.options.temperature,
            max_tokens: Some(request.options.max_output_tokens),
            reasoning_effort: request
                .options
                .thinking_enabled
                .then(|| "medium".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request(request);
        info!(
            "Generating with OpenAI (model: {}, temperature: {})",
            body.model, body.temperature
        );

        let start_time = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        debug!("Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(http_error(PROVIDER, status, &text));
        }

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| NovelError::LlmApi(format!("Failed to parse OpenAI response: {}", e)))?;

        let usage = response_body
            .usage
            .map(|u| {
                let thinking = u
                    .completion_tokens_details
                    .and_then(|d| d.reasoning_tokens)
                    .unwrap_or(0);
                TokenUsage::new(
                    u.prompt_tokens,
                    u.completion_tokens.saturating_sub(thinking),
                    thinking,
                )
            })
            .unwrap_or_default();

        let text = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NovelError::LlmApi("No content in OpenAI response".to_string()))?;

        Ok(LlmResponse {
            text,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: body.model,
                provider: PROVIDER.to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("OpenAI API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!("OpenAI API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("OpenAI API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::GenerationOptions;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://localhost:9999/v1/".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_build_request_uses_override_model() {
        let p = provider();
        assert_eq!(p.api_base, "http://localhost:9999/v1");
        let req = LlmRequest::new("system", "user").with_model("other-model");
        let body = p.build_request(&req);
        assert_eq!(body.model, "other-model");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert!(body.reasoning_effort.is_none());
    }

    #[test]
    fn test_build_request_thinking() {
        let p = provider();
        let req = LlmRequest::new("", "user").with_options(GenerationOptions {
            thinking_enabled: true,
            ..Default::default()
        });
        let body = p.build_request(&req);
        assert_eq!(body.model, DEFAULT_MODEL);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.reasoning_effort.as_deref(), Some("medium"));
    }

    #[test]
    fn test_usage_parsing_splits_reasoning() {
        let raw = r#"{"choices":[{"message":{"content":"hi"}}],
            "usage":{"prompt_tokens":10,"completion_tokens":30,
            "completion_tokens_details":{"reasoning_tokens":12}}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let u = parsed.usage.unwrap();
        assert_eq!(u.completion_tokens, 30);
        assert_eq!(
            u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
            Some(12)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", provider());
        assert!(!debug.contains("sk-test"));
    }
}
