//! Stage Agent Runner
//!
//! Shared execution pattern for every stage:
//! 1. Build request -> 2. Call model under timeout -> 3. Recover/parse ->
//! 4. Retry recoverable failures within the stage budget -> 5. Escalate
//!
//! Failed attempts never leak partial results; the caller only sees a typed
//! value or a non-recoverable `NovelError::Stage`.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use super::AgentContext;
use crate::ai::{GenerationOptions, LlmRequest, with_timeout};
use crate::constants::retry::MAX_JITTER_MS;
use crate::novel::types::Stage;
use crate::types::{NovelError, Result, TokenUsage};

/// Typed stage result with the tokens it cost
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub value: T,
    pub usage: TokenUsage,
    /// Model calls made, retries included
    pub attempts: u32,
}

impl<T> StageOutput<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutput<U> {
        StageOutput {
            value: f(self.value),
            usage: self.usage,
            attempts: self.attempts,
        }
    }
}

/// One stage call, defined by the agent
#[allow(clippy::type_complexity)]
pub struct StageCall<'a, T> {
    pub stage: Stage,
    pub chapter: Option<u32>,
    pub user_prompt: String,
    /// Raw model text to typed value; errors decide retry via `is_recoverable`
    pub parse: Box<dyn Fn(&str) -> Result<T> + Send + Sync + 'a>,
    /// Debug summary of an accepted value
    pub describe: Box<dyn Fn(&T) -> String + Send + Sync + 'a>,
}

fn request_for(ctx: &AgentContext, stage: Stage, user_prompt: &str) -> LlmRequest {
    let config = &ctx.config;
    LlmRequest::new(ctx.prompts.system(stage), user_prompt)
        .with_model(config.model_for(stage.name()))
        .with_options(GenerationOptions {
            temperature: config.temperature_for(stage.name()),
            max_output_tokens: config.max_output_tokens_for(stage.name()),
            thinking_enabled: config.llm.thinking_enabled,
        })
}

fn backoff(ctx: &AgentContext, err: &NovelError) -> Duration {
    if ctx.max_retry_delay.is_zero() {
        return Duration::ZERO;
    }
    let jitter = Duration::from_millis(rand::rng().random_range(0..=MAX_JITTER_MS));
    (err.retry_delay() + jitter).min(ctx.max_retry_delay)
}

/// Run a stage call with its retry budget
pub async fn run_stage_call<T: Send>(
    ctx: &AgentContext,
    call: StageCall<'_, T>,
) -> Result<StageOutput<T>> {
    let retries = ctx.pipeline().stage_retries;
    let request = request_for(ctx, call.stage, &call.user_prompt);
    let mut usage = TokenUsage::default();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(
            "{}: attempt {} (chapter {:?}, prompt {} chars)",
            call.stage.label(),
            attempt,
            call.chapter,
            call.user_prompt.len()
        );

        let outcome = match with_timeout(
            ctx.timeouts.llm_request,
            ctx.provider.generate(&request),
            call.stage.name(),
        )
        .await
        {
            Ok(response) => {
                usage.add(&response.usage);
                (call.parse)(&response.text)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                debug!("{}: {}", call.stage.label(), (call.describe)(&value));
                return Ok(StageOutput {
                    value,
                    usage,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_recoverable() && attempt <= retries => {
                let delay = backoff(ctx, &e);
                warn!(
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    call.stage.label(),
                    attempt,
                    delay,
                    e
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                error!(
                    "{} failed after {} attempt(s): {}",
                    call.stage.label(),
                    attempt,
                    e
                );
                return Err(NovelError::stage(call.stage.label(), call.chapter, e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::ai::provider::mock::MockProvider;
    use std::sync::Arc;

    fn number_call<'a>() -> StageCall<'a, u32> {
        StageCall {
            stage: Stage::Summarizer,
            chapter: Some(3),
            user_prompt: "count".to_string(),
            parse: Box::new(|raw| {
                raw.trim()
                    .parse::<u32>()
                    .map_err(|e| NovelError::Recovery(e.to_string()))
            }),
            describe: Box::new(|n| format!("got {}", n)),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = Arc::new(MockProvider::scripted(vec![Ok("7".into())]));
        let ctx = context(provider.clone());
        let out = run_stage_call(&ctx, number_call()).await.unwrap();
        assert_eq!(out.value, 7);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.usage.total(), 30);
    }

    #[tokio::test]
    async fn test_one_retry_with_identical_request() {
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok("not a number".into()),
            Ok("42".into()),
        ]));
        let ctx = context(provider.clone());
        let out = run_stage_call(&ctx, number_call()).await.unwrap();
        assert_eq!(out.value, 42);
        assert_eq!(out.attempts, 2);
        assert_eq!(out.usage.total(), 60);

        let requests = provider.requests();
        assert_eq!(requests[0].user_prompt, requests[1].user_prompt);
        assert_eq!(requests[0].system_prompt, requests[1].system_prompt);
    }

    #[tokio::test]
    async fn test_second_failure_escalates() {
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok("x".into()),
            Ok("y".into()),
            Ok("1".into()),
        ]));
        let ctx = context(provider.clone());
        let err = run_stage_call(&ctx, number_call()).await.unwrap_err();
        assert!(matches!(
            err,
            NovelError::Stage { chapter: Some(3), recoverable: false, .. }
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_recoverable_error_is_not_retried() {
        let provider = Arc::new(MockProvider::scripted(vec![
            Err(NovelError::Config("bad key".into())),
            Ok("1".into()),
        ]));
        let ctx = context(provider.clone());
        assert!(run_stage_call(&ctx, number_call()).await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_uses_stage_overrides() {
        let provider = Arc::new(MockProvider::scripted(vec![Ok("1".into())]));
        let mut config = crate::config::Config::default();
        config.stages.insert(
            "summarizer".into(),
            crate::config::StageOverride {
                model: Some("small-model".into()),
                temperature: Some(0.1),
                max_output_tokens: None,
            },
        );
        let ctx = AgentContext::new(provider.clone(), Arc::new(config))
            .with_max_retry_delay(Duration::ZERO);
        run_stage_call(&ctx, number_call()).await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.model.as_deref(), Some("small-model"));
        assert!((request.options.temperature - 0.1).abs() < f32::EPSILON);
        assert!(request.system_prompt.contains("Summarizer"));
    }
}
