//! Pacing Director
//!
//! Periodic review of recent chapters and plot threads. The directive it
//! returns is injected into planning and writing until the next review.
//! Forgotten threads are reported, never enforced.

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::novel::types::{PacingReport, Stage, chapter_label};
use crate::novel::world_bible::PlotThread;
use crate::types::{Result, ValidationError, ValidationErrorKind};

const PACING_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("directive"),
    required: &["directive", "tension_level"],
    arrays: &[],
};

const PACING_SCHEMA: &str = r#"{
  "assessment": "",
  "forgotten_threads": [""],
  "tension_level": 5,
  "directive": "one concrete instruction for the next chapters",
  "thread_updates": [{"name": "", "status": "active|resolved|ignored"}]
}"#;

pub struct PacingAgent<'a> {
    pub after_chapter: u32,
    /// (chapter number, summary) for the review window, in order
    pub summaries: &'a [(u32, String)],
    pub threads: &'a [PlotThread],
    pub completed: usize,
    pub total: usize,
}

impl PacingAgent<'_> {
    fn build_prompt(&self) -> String {
        let summaries: Vec<String> = self
            .summaries
            .iter()
            .map(|(n, s)| format!("{}: {}", chapter_label(*n), s))
            .collect();
        let threads: Vec<String> = self
            .threads
            .iter()
            .map(|t| {
                format!(
                    "- {} [{}] goal: {} (last touched in chapter {})",
                    t.name,
                    t.status.as_str(),
                    t.goal,
                    t.last_updated_chapter
                )
            })
            .collect();
        let percent = if self.total == 0 {
            0
        } else {
            self.completed * 100 / self.total
        };

        PromptBuilder::new()
            .context_item(
                "Progress",
                format!("{} of {} chapters ({}%)", self.completed, self.total, percent),
            )
            .section("Recent Chapters", summaries.join("\n"))
            .section("Plot Threads", threads.join("\n"))
            .json_output(PACING_SCHEMA)
            .build()
    }
}

#[async_trait::async_trait]
impl StageAgent for PacingAgent<'_> {
    type Output = PacingReport;

    fn stage(&self) -> Stage {
        Stage::Pacing
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<PacingReport>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::Pacing,
                chapter: Some(self.after_chapter),
                user_prompt: self.build_prompt(),
                parse: Box::new(|raw| {
                    let report: PacingReport = ctx.recovery.parse(raw, &PACING_SPEC)?;
                    if report.directive.trim().is_empty() {
                        return Err(ValidationError::new(
                            ValidationErrorKind::Format,
                            "empty directive",
                        )
                        .with_field("directive")
                        .into());
                    }
                    Ok(report)
                }),
                describe: Box::new(|r: &PacingReport| {
                    format!(
                        "tension {}, {} forgotten threads, {} updates",
                        r.tension_level,
                        r.forgotten_threads.len(),
                        r.thread_updates.len()
                    )
                }),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::ai::provider::mock::MockProvider;
    use crate::novel::world_bible::ThreadStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pacing_report_and_prompt() {
        let raw = r#"{"assessment": "sagging middle", "forgotten_threads": "The Debt",
            "tension": "4", "directive": "Bring the debt collector back",
            "thread_updates": [{"thread": "The Debt", "status": "Active"}]}"#;
        let provider = Arc::new(MockProvider::scripted(vec![Ok(raw.into())]));
        let ctx = context(provider.clone());
        let summaries = vec![(4, "Mara sails north".to_string()), (5, "Storm".to_string())];
        let threads = vec![PlotThread {
            name: "The Debt".into(),
            goal: "repay".into(),
            status: ThreadStatus::Active,
            last_updated_chapter: 1,
        }];

        let out = PacingAgent {
            after_chapter: 5,
            summaries: &summaries,
            threads: &threads,
            completed: 5,
            total: 10,
        }
        .run(&ctx)
        .await
        .unwrap();

        assert_eq!(out.value.tension_level, 4);
        assert_eq!(out.value.forgotten_threads, vec!["The Debt".to_string()]);
        assert_eq!(out.value.directive, "Bring the debt collector back");

        let prompt = &provider.requests()[0].user_prompt;
        assert!(prompt.contains("5 of 10 chapters (50%)"));
        assert!(prompt.contains("Mara sails north"));
        assert!(prompt.contains("The Debt [active]"));
    }
}
