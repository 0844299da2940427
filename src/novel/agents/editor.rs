//! Style Editor
//!
//! Scores logic and style and proposes exact-text patches. The verdict is
//! derived from the scores alone; the model's own approval flag is advisory.

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::novel::types::{
    ChapterOutline, ChapterPlan, EditorReport, EditorVerdict, Stage, chapter_label,
};
use crate::novel::world_bible::WorldBible;
use crate::types::Result;

const EDITOR_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("logic_score"),
    required: &["logic_score", "style_score"],
    arrays: &[],
};

const EDITOR_SCHEMA: &str = r#"{
  "logic_score": 7,
  "style_score": 7,
  "approved": false,
  "patches": [{"original": "exact unique text of at least 20 characters",
               "replacement": "", "reason": ""}],
  "notes": ""
}"#;

pub struct EditorAgent<'a> {
    pub chapter: &'a ChapterOutline,
    pub text: &'a str,
    pub plan: Option<&'a ChapterPlan>,
    pub bible: &'a WorldBible,
    pub style_notes: Option<&'a str>,
}

impl<'a> EditorAgent<'a> {
    pub fn new(chapter: &'a ChapterOutline, text: &'a str, bible: &'a WorldBible) -> Self {
        Self {
            chapter,
            text,
            plan: None,
            bible,
            style_notes: None,
        }
    }

    pub fn with_plan(mut self, plan: Option<&'a ChapterPlan>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_style_notes(mut self, notes: Option<&'a str>) -> Self {
        self.style_notes = notes;
        self
    }

    fn plan_block(&self) -> String {
        let Some(plan) = self.plan else {
            return String::new();
        };
        plan.scenes
            .iter()
            .map(|s| format!("{}. {} ({})", s.number, s.plot_beat, s.emotional_beat))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn build_prompt(&self, ctx: &AgentContext) -> String {
        let p = ctx.pipeline();
        PromptBuilder::new()
            .context_item(
                "Chapter",
                format!(
                    "{} \"{}\"",
                    chapter_label(self.chapter.number),
                    self.chapter.title
                ),
            )
            .section("Scene Plan", self.plan_block())
            .section("World Bible", self.bible.to_prompt_block())
            .optional_section("Style Notes", self.style_notes)
            .section("Chapter Text", self.text)
            .section(
                "Scoring",
                format!(
                    "Scores above {} on both axes approve the chapter. Scores from {} to {} need \
                     patches. Scores below {} mean the chapter will be rewritten.",
                    p.approve_threshold,
                    p.rewrite_threshold,
                    p.approve_threshold,
                    p.rewrite_threshold
                ),
            )
            .json_output(EDITOR_SCHEMA)
            .build()
    }
}

/// Verdict under the configured thresholds
pub fn verdict(report: &EditorReport, ctx: &AgentContext) -> EditorVerdict {
    let p = ctx.pipeline();
    EditorVerdict::from_scores(
        report.logic_score,
        report.style_score,
        p.approve_threshold,
        p.rewrite_threshold,
    )
}

#[async_trait::async_trait]
impl StageAgent for EditorAgent<'_> {
    type Output = EditorReport;

    fn stage(&self) -> Stage {
        Stage::Editor
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<EditorReport>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::Editor,
                chapter: Some(self.chapter.number),
                user_prompt: self.build_prompt(ctx),
                parse: Box::new(|raw| ctx.recovery.parse::<EditorReport>(raw, &EDITOR_SPEC)),
                describe: Box::new(|r: &EditorReport| {
                    format!(
                        "logic {}, style {}, {} patches",
                        r.logic_score,
                        r.style_score,
                        r.patches.len()
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
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_editor_scores_and_verdict() {
        let raw = r#"{"logic": "6/10", "style": 9, "approved": true,
            "edits": [{"find": "the harbor was very very quiet",
                       "replace": "the harbor was silent", "reason": "redundancy"}]}"#;
        let provider = Arc::new(MockProvider::scripted(vec![Ok(raw.into())]));
        let ctx = context(provider.clone());
        let outline: ChapterOutline =
            serde_json::from_value(json!({"number": 5, "title": "Ebb"})).unwrap();
        let bible = WorldBible::default();

        let out = EditorAgent::new(&outline, "text", &bible).run(&ctx).await.unwrap();
        assert_eq!(out.value.logic_score, 6);
        assert_eq!(out.value.style_score, 9);
        assert_eq!(out.value.patches.len(), 1);
        assert_eq!(
            out.value.patches[0].original,
            "the harbor was very very quiet"
        );
        // the model's approval flag does not override the scores
        assert_eq!(verdict(&out.value, &ctx), EditorVerdict::Patch);
    }

    #[tokio::test]
    async fn test_missing_scores_are_retried() {
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(r#"{"notes": "fine"}"#.into()),
            Ok(r#"{"logic_score": 9, "style_score": 10}"#.into()),
        ]));
        let ctx = context(provider.clone());
        let outline: ChapterOutline = serde_json::from_value(json!({"number": 1})).unwrap();
        let bible = WorldBible::default();

        let out = EditorAgent::new(&outline, "text", &bible).run(&ctx).await.unwrap();
        assert_eq!(verdict(&out.value, &ctx), EditorVerdict::Approve);
        assert_eq!(out.attempts, 2);
    }
}
