//! Stage Agents
//!
//! Each agent borrows its typed input, issues one model call through the
//! shared runner and returns a typed result. Agents never touch storage.

pub mod auditor;
pub mod editor;
pub mod helpers;
pub mod outline;
pub mod pacing;
pub mod scene_planner;
pub mod scene_writer;
pub mod summarizer;

pub use auditor::AuditorAgent;
pub use editor::{EditorAgent, verdict};
pub use helpers::{StageCall, StageOutput, run_stage_call};
pub use outline::OutlineAgent;
pub use pacing::PacingAgent;
pub use scene_planner::ScenePlannerAgent;
pub use scene_writer::{SceneDraft, SceneWriterAgent};
pub use summarizer::SummarizerAgent;

use std::sync::Arc;
use std::time::Duration;

use super::prompts::PromptLibrary;
use super::types::Stage;
use crate::ai::{SharedProvider, StructuredOutput, TimeoutConfig};
use crate::config::{Config, PipelineConfig};
use crate::constants::retry::MAX_DELAY_SECS;
use crate::types::Result;

/// Everything an agent needs besides its own input
#[derive(Clone)]
pub struct AgentContext {
    pub provider: SharedProvider,
    pub config: Arc<Config>,
    pub recovery: StructuredOutput,
    pub timeouts: TimeoutConfig,
    pub prompts: Arc<PromptLibrary>,
    /// Upper bound on the pause before a retry
    pub max_retry_delay: Duration,
}

impl AgentContext {
    pub fn new(provider: SharedProvider, config: Arc<Config>) -> Self {
        Self {
            recovery: StructuredOutput::new(config.pipeline.max_repair_attempts),
            timeouts: TimeoutConfig::from_secs(config.llm.timeout_secs),
            provider,
            config,
            prompts: Arc::new(PromptLibrary::builtin()),
            max_retry_delay: Duration::from_secs(MAX_DELAY_SECS),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.config.pipeline
    }
}

/// Trait for stage agents
#[async_trait::async_trait]
pub trait StageAgent: Send + Sync {
    type Output: Send;

    fn stage(&self) -> Stage;

    /// Run the stage, including its retry budget
    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<Self::Output>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ai::provider::mock::MockProvider;

    pub fn context(provider: Arc<MockProvider>) -> AgentContext {
        AgentContext::new(provider, Arc::new(Config::default()))
            .with_max_retry_delay(Duration::ZERO)
    }
}
