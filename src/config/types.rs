//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/novelsmith/) and project (.novelsmith/) level configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{NovelError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Per-stage overrides keyed by stage name (e.g. `scene_writer`)
    pub stages: BTreeMap<String, StageOverride>,

    /// Pipeline tuning
    pub pipeline: PipelineConfig,

    /// Storage settings
    pub storage: StorageConfig,

    /// Prompt template settings
    pub prompts: PromptsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            stages: BTreeMap::new(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `NovelError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(NovelError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(NovelError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (stage, o) in &self.stages {
            if let Some(t) = o.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(NovelError::Config(format!(
                    "stages.{}.temperature must be between 0.0 and 2.0, got {}",
                    stage, t
                )));
            }
        }

        let p = &self.pipeline;
        if p.pacing_interval == 0 {
            return Err(NovelError::Config(
                "pipeline.pacing_interval must be greater than 0".to_string(),
            ));
        }
        if p.rewrite_threshold > p.approve_threshold {
            return Err(NovelError::Config(format!(
                "pipeline.rewrite_threshold ({}) must not exceed approve_threshold ({})",
                p.rewrite_threshold, p.approve_threshold
            )));
        }
        if p.approve_threshold > 10 {
            return Err(NovelError::Config(
                "pipeline.approve_threshold must be at most 10".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&p.completion_min_ratio) {
            return Err(NovelError::Config(format!(
                "pipeline.completion_min_ratio must be between 0.0 and 1.0, got {}",
                p.completion_min_ratio
            )));
        }
        if p.max_repair_attempts == 0 {
            return Err(NovelError::Config(
                "pipeline.max_repair_attempts must be greater than 0".to_string(),
            ));
        }
        if p.summary_max_words == 0 {
            return Err(NovelError::Config(
                "pipeline.summary_max_words must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective model for a stage
    pub fn model_for(&self, stage: &str) -> &str {
        self.stages
            .get(stage)
            .and_then(|o| o.model.as_deref())
            .unwrap_or(&self.llm.model)
    }

    /// Effective temperature for a stage
    pub fn temperature_for(&self, stage: &str) -> f32 {
        self.stages
            .get(stage)
            .and_then(|o| o.temperature)
            .unwrap_or(self.llm.temperature)
    }

    /// Effective output token limit for a stage
    pub fn max_output_tokens_for(&self, stage: &str) -> u32 {
        self.stages
            .get(stage)
            .and_then(|o| o.max_output_tokens)
            .unwrap_or(self.llm.max_output_tokens)
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (`openai` or `ollama`)
    pub provider: String,

    /// Model name
    pub model: String,

    /// Base URL override
    pub api_base: Option<String>,

    /// API key; read from config or environment, never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Default sampling temperature
    pub temperature: f32,

    /// Default output token limit
    pub max_output_tokens: u32,

    /// Request extended reasoning where the provider supports it
    pub thinking_enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_base: None,
            api_key: None,
            timeout_secs: crate::constants::network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.8,
            max_output_tokens: 8192,
            thinking_enabled: false,
        }
    }
}

/// Optional per-stage overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Completed chapters between pacing reviews
    pub pacing_interval: u32,

    /// Automatic retries of a failed stage call
    pub stage_retries: u32,

    /// Scores strictly above this approve a chapter
    pub approve_threshold: u8,

    /// Scores strictly below this force a rewrite
    pub rewrite_threshold: u8,

    /// Full-chapter rewrites allowed per chapter
    pub max_rewrites: u32,

    /// Minimum share of outline entries required before a completion call
    pub completion_min_ratio: f64,

    /// Bound for the position-based repair loop
    pub max_repair_attempts: usize,

    /// Scene word floor below which truncation is suspected
    pub scene_min_words: usize,

    /// Word cap for chapter summaries
    pub summary_max_words: usize,

    /// Characters of the previous scene handed to the writer
    pub scene_tail_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pacing_interval: 5,
            stage_retries: 1,
            approve_threshold: 8,
            rewrite_threshold: 5,
            max_rewrites: 1,
            completion_min_ratio: 0.25,
            max_repair_attempts: crate::constants::recovery::MAX_POSITION_REPAIRS,
            scene_min_words: 300,
            summary_max_words: 200,
            scene_tail_chars: 1500,
        }
    }
}

// =============================================================================
// Storage & Prompts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".novelsmith/novelsmith.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory holding `<stage>.md` system prompt overrides
    pub directory: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.pacing_interval, 5);
        assert_eq!(config.pipeline.approve_threshold, 8);
        assert_eq!(config.pipeline.rewrite_threshold, 5);
    }

    #[test]
    fn test_invalid_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 3.0;
        assert!(matches!(config.validate(), Err(NovelError::Config(_))));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = Config::default();
        config.pipeline.rewrite_threshold = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stage_overrides() {
        let mut config = Config::default();
        config.stages.insert(
            "scene_writer".to_string(),
            StageOverride {
                model: Some("writer-model".to_string()),
                temperature: Some(1.1),
                max_output_tokens: None,
            },
        );
        assert_eq!(config.model_for("scene_writer"), "writer-model");
        assert_eq!(config.model_for("editor"), config.llm.model);
        assert_eq!(config.temperature_for("scene_writer"), 1.1);
        assert_eq!(
            config.max_output_tokens_for("scene_writer"),
            config.llm.max_output_tokens
        );
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("sk-secret"));
    }
}
