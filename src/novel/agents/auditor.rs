//! Consistency Auditor
//!
//! Checks an assembled chapter against the world bible and prior chapters.

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::novel::types::{AuditReport, ChapterOutline, Stage, chapter_label};
use crate::novel::world_bible::WorldBible;
use crate::types::Result;

const AUDIT_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("issues"),
    required: &["issues"],
    arrays: &["issues"],
};

const AUDIT_SCHEMA: &str = r#"{
  "issues": [{"type": "plot_hole|contradiction|information_gap|world_bible_violation|missing_setup",
              "severity": "critical|major|minor", "description": "",
              "original": "exact text from the chapter", "replacement": "corrected text"}],
  "approved": true
}"#;

pub struct AuditorAgent<'a> {
    pub chapter: &'a ChapterOutline,
    pub text: &'a str,
    pub bible: &'a WorldBible,
    pub prior_context: &'a str,
}

impl<'a> AuditorAgent<'a> {
    pub fn new(
        chapter: &'a ChapterOutline,
        text: &'a str,
        bible: &'a WorldBible,
        prior_context: &'a str,
    ) -> Self {
        Self {
            chapter,
            text,
            bible,
            prior_context,
        }
    }

    fn build_prompt(&self) -> String {
        PromptBuilder::new()
            .context_item("Chapter", chapter_label(self.chapter.number))
            .context_item("Planned summary", &self.chapter.summary)
            .section("World Bible", self.bible.to_prompt_block())
            .section("Prior Chapters", self.prior_context)
            .section("Chapter Text", self.text)
            .json_output(AUDIT_SCHEMA)
            .build()
    }
}

#[async_trait::async_trait]
impl StageAgent for AuditorAgent<'_> {
    type Output = AuditReport;

    fn stage(&self) -> Stage {
        Stage::Auditor
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<AuditReport>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::Auditor,
                chapter: Some(self.chapter.number),
                user_prompt: self.build_prompt(),
                parse: Box::new(|raw| ctx.recovery.parse::<AuditReport>(raw, &AUDIT_SPEC)),
                describe: Box::new(|r: &AuditReport| {
                    format!(
                        "{} issues, {}",
                        r.issues.len(),
                        if r.requires_correction() { "requires correction" } else { "approved" }
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
    use crate::novel::types::{IssueKind, Severity};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_audit_report_parsed_leniently() {
        let raw = r#"Here is my audit:
{"problems": [{"type": "Continuity Error", "severity": "Major",
  "description": "Mara's eyes change colour",
  "original_text": "her green eyes narrowed", "replacement": "her grey eyes narrowed"}],
 "approved": "no"}"#;
        let provider = Arc::new(MockProvider::scripted(vec![Ok(raw.into())]));
        let ctx = context(provider.clone());
        let outline: ChapterOutline = serde_json::from_value(json!({"number": 4})).unwrap();
        let bible = WorldBible::default();

        let out = AuditorAgent::new(&outline, "text", &bible, "")
            .run(&ctx)
            .await
            .unwrap();
        let issue = &out.value.issues[0];
        assert_eq!(issue.kind, IssueKind::Contradiction);
        assert_eq!(issue.severity, Severity::Major);
        assert_eq!(issue.original.as_deref(), Some("her green eyes narrowed"));
        assert!(out.value.requires_correction());
    }
}
