//! Summarizer
//!
//! Dense fact summary of a finished chapter. This summary is the only form in
//! which the chapter reaches later prompts.

use tracing::debug;

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::novel::types::{ChapterSummary, Stage, chapter_label};
use crate::types::{Result, count_words, truncate_words};

const SUMMARY_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("summary"),
    required: &["summary"],
    arrays: &[],
};

pub struct SummarizerAgent<'a> {
    pub chapter: u32,
    pub text: &'a str,
}

impl<'a> SummarizerAgent<'a> {
    pub fn new(chapter: u32, text: &'a str) -> Self {
        Self { chapter, text }
    }

    fn build_prompt(&self, max_words: usize) -> String {
        PromptBuilder::new()
            .context_item("Chapter", chapter_label(self.chapter))
            .section("Chapter Text", self.text)
            .focus(
                "facts later chapters depend on",
                vec![
                    "Events and their consequences",
                    "Changes in character state, objects changing hands, relationship changes",
                    "Revelations",
                    "Where the chapter ends",
                ],
            )
            .json_output(&format!(
                r#"{{"summary": "at most {} words", "ending_location": ""}}"#,
                max_words
            ))
            .build()
    }

    fn parse(&self, raw: &str, ctx: &AgentContext) -> Result<ChapterSummary> {
        let max_words = ctx.pipeline().summary_max_words;
        let mut summary = match ctx.recovery.parse::<ChapterSummary>(raw, &SUMMARY_SPEC) {
            Ok(s) => s,
            // plain prose is an acceptable summary
            Err(e) if !raw.contains('{') && !raw.trim().is_empty() => {
                debug!("Summary is plain text: {}", e);
                ChapterSummary {
                    summary: raw.trim().to_string(),
                    ending_location: String::new(),
                }
            }
            Err(e) => return Err(e),
        };
        if count_words(&summary.summary) > max_words {
            summary.summary = truncate_words(&summary.summary, max_words);
        }
        Ok(summary)
    }
}

#[async_trait::async_trait]
impl StageAgent for SummarizerAgent<'_> {
    type Output = ChapterSummary;

    fn stage(&self) -> Stage {
        Stage::Summarizer
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<ChapterSummary>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::Summarizer,
                chapter: Some(self.chapter),
                user_prompt: self.build_prompt(ctx.pipeline().summary_max_words),
                parse: Box::new(|raw| self.parse(raw, ctx)),
                describe: Box::new(|s: &ChapterSummary| {
                    format!("{} words", count_words(&s.summary))
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
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_is_capped() {
        let long = "fact ".repeat(500);
        let raw = format!(
            r#"{{"resumen": "{}", "ending_location": "the pier"}}"#,
            long.trim()
        );
        let provider = Arc::new(MockProvider::scripted(vec![Ok(raw)]));
        let ctx = context(provider.clone());

        let out = SummarizerAgent::new(3, "text").run(&ctx).await.unwrap();
        assert_eq!(count_words(&out.value.summary), 200);
        assert_eq!(out.value.ending_location, "the pier");
    }

    #[tokio::test]
    async fn test_plain_text_summary_accepted() {
        let provider = Arc::new(MockProvider::scripted(vec![Ok(
            "Mara hides the ledger and ends at the lighthouse.".into(),
        )]));
        let ctx = context(provider.clone());
        let out = SummarizerAgent::new(1, "text").run(&ctx).await.unwrap();
        assert!(out.value.summary.starts_with("Mara hides"));
    }
}
