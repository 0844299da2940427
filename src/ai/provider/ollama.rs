//! Ollama Local LLM Provider
//!
//! LLM provider for locally-running Ollama models via `/api/chat`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    LlmProvider, LlmRequest, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming,
    TokenUsage, http_client, http_error, transport_error,
};
use crate::types::{ErrorCategory, LlmError, NovelError, Result};

const DEFAULT_API_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3:latest";
const PROVIDER: &str = "ollama";

/// Ollama Local LLM Provider
pub struct OllamaProvider {
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let api_base = Self::validate_endpoint(&api_base)?;

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_base,
            model,
            client,
        })
    }

    /// Validate endpoint URL (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            NovelError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(NovelError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, request: &LlmRequest) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: request.system_prompt.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: request.user_prompt.clone(),
        });

        OllamaChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            stream: false,
            think: request.options.thinking_enabled.then_some(true),
            options: OllamaOptions {
                temperature: request.options.temperature,
                num_predict: request.options.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request(request);
        info!(
            "Generating with Ollama (model: {}, temperature: {})",
            body.model, body.options.temperature
        );

        let start_time = Instant::now();
        let url = format!("{}/api/chat", self.api_base);

        debug!("Sending request to Ollama API");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    NovelError::Llm(LlmError::with_provider(
                        ErrorCategory::Network,
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? \
                             Start with: ollama serve",
                            self.api_base
                        ),
                        PROVIDER,
                    ))
                } else {
                    transport_error(PROVIDER, &e)
                }
            })?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(http_error(PROVIDER, status, &text));
        }

        let response_body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| NovelError::LlmApi(format!("Failed to parse Ollama response: {}", e)))?;

        let usage = TokenUsage::new(
            response_body.prompt_eval_count.unwrap_or(0),
            response_body.eval_count.unwrap_or(0),
            0,
        );
        let api_ms = response_body.total_duration.map(|ns| ns / 1_000_000);

        Ok(LlmResponse {
            text: response_body.message.content,
            usage,
            timing: ResponseTiming::with_api_time(elapsed, api_ms),
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
        let url = format!("{}/api/tags", self.api_base);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(tags) = resp.json::<OllamaTagsResponse>().await {
                    let model_available = tags.models.iter().any(|m| {
                        m.name == self.model
                            || m.name.starts_with(&self.model.replace(":latest", ""))
                    });

                    if model_available {
                        info!("Ollama is available with model: {}", self.model);
                        Ok(true)
                    } else {
                        warn!(
                            "Ollama is running but model '{}' not found. Pull with: ollama pull {}",
                            self.model, self.model
                        );
                        Ok(false)
                    }
                } else {
                    info!("Ollama is available");
                    Ok(true)
                }
            }
            Ok(resp) => {
                warn!("Ollama API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };

        let provider = OllamaProvider::new(config).unwrap();
        assert_eq!(provider.api_base, DEFAULT_API_BASE);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = ProviderConfig {
            provider: "ollama".to_string(),
            api_base: Some("file:///etc/passwd".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OllamaProvider::new(config),
            Err(NovelError::Config(_))
        ));
    }

    #[test]
    fn test_build_request_maps_options() {
        let provider = OllamaProvider::new(ProviderConfig::default()).unwrap();
        let req = LlmRequest::new("sys", "write");
        let body = provider.build_request(&req);
        assert_eq!(body.model, DEFAULT_MODEL);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.options.num_predict, req.options.max_output_tokens);
        assert!(body.think.is_none());
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"message":{"role":"assistant","content":"Once"},
            "prompt_eval_count":5,"eval_count":7,"total_duration":2000000}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "Once");
        assert_eq!(parsed.eval_count, Some(7));
    }
}
