//! Scene Planner
//!
//! Splits one outlined chapter into three or four ordered scenes. Receives the
//! pacing directive and the pattern tracker's constraints as extra context.

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::constants::agents::{MAX_SCENES, MIN_SCENES};
use crate::novel::patterns::PatternAnalysis;
use crate::novel::types::{ChapterOutline, ChapterPlan, Project, Stage, chapter_label};
use crate::novel::world_bible::WorldBible;
use crate::types::{Result, ValidationError, ValidationErrorKind};

const PLAN_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("scenes"),
    required: &["scenes"],
    arrays: &["scenes"],
};

const PLAN_SCHEMA: &str = r#"{
  "scenes": [{"number": 1, "characters": [""], "setting": "", "plot_beat": "",
              "emotional_beat": "", "sensory_notes": "", "ending_hook": "", "target_words": 1200}],
  "closing_hook": ""
}"#;

pub struct ScenePlannerAgent<'a> {
    pub project: &'a Project,
    pub chapter: &'a ChapterOutline,
    pub bible: &'a WorldBible,
    pub previous_summary: Option<&'a str>,
    /// Neighbouring outline entries, in order
    pub previous_outline: Option<&'a ChapterOutline>,
    pub next_outline: Option<&'a ChapterOutline>,
    pub pacing_directive: Option<&'a str>,
    pub patterns: Option<&'a PatternAnalysis>,
}

impl<'a> ScenePlannerAgent<'a> {
    pub fn new(project: &'a Project, chapter: &'a ChapterOutline, bible: &'a WorldBible) -> Self {
        Self {
            project,
            chapter,
            bible,
            previous_summary: None,
            previous_outline: None,
            next_outline: None,
            pacing_directive: None,
            patterns: None,
        }
    }

    pub fn with_previous_summary(mut self, summary: Option<&'a str>) -> Self {
        self.previous_summary = summary.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_neighbours(
        mut self,
        previous: Option<&'a ChapterOutline>,
        next: Option<&'a ChapterOutline>,
    ) -> Self {
        self.previous_outline = previous;
        self.next_outline = next;
        self
    }

    pub fn with_pacing_directive(mut self, directive: Option<&'a str>) -> Self {
        self.pacing_directive = directive.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_patterns(mut self, analysis: &'a PatternAnalysis) -> Self {
        self.patterns = Some(analysis);
        self
    }

    fn outline_line(c: &ChapterOutline) -> String {
        format!("{} \"{}\": {}", chapter_label(c.number), c.title, c.summary)
    }

    fn build_prompt(&self) -> String {
        let c = self.chapter;
        let patterns = self.patterns.map(|p| p.to_prompt_block()).unwrap_or_default();

        PromptBuilder::new()
            .context_item("Genre", &self.project.genre)
            .context_item("Tone", &self.project.tone)
            .context_item("Chapter", chapter_label(c.number))
            .context_item("Title", &c.title)
            .context_item("Key event", &c.key_event)
            .context_item("Emotional arc", &c.emotional_arc)
            .context_item("Location", &c.location)
            .context_item("Time", &c.temporal_notes)
            .section("Chapter Summary", &c.summary)
            .section("World Bible", self.bible.to_prompt_block())
            .optional_section("Previous Chapter Ended With", self.previous_summary)
            .optional_section(
                "Previous Chapter Outline",
                self.previous_outline.map(Self::outline_line).as_deref(),
            )
            .optional_section(
                "Next Chapter Outline",
                self.next_outline.map(Self::outline_line).as_deref(),
            )
            .optional_section("Pacing Directive", self.pacing_directive)
            .section("Consistency Constraints", patterns)
            .section(
                "Task",
                format!(
                    "Plan {} to {} scenes. The first scene connects to the previous chapter; \
                     the last scene carries the strongest hook.",
                    MIN_SCENES, MAX_SCENES
                ),
            )
            .json_output(PLAN_SCHEMA)
            .build()
    }

    fn parse(&self, raw: &str, ctx: &AgentContext) -> Result<ChapterPlan> {
        let mut plan: ChapterPlan = ctx.recovery.parse(raw, &PLAN_SPEC)?;
        let count = plan.scenes.len();
        if !(MIN_SCENES..=MAX_SCENES).contains(&count) {
            return Err(ValidationError::new(
                ValidationErrorKind::Range,
                format!("expected {}-{} scenes", MIN_SCENES, MAX_SCENES),
            )
            .with_field("scenes")
            .with_comparison(
                format!("{}..={}", MIN_SCENES, MAX_SCENES),
                count.to_string(),
            )
            .into());
        }
        // Model numbering is unreliable; order is what counts
        for (i, scene) in plan.scenes.iter_mut().enumerate() {
            scene.number = i as u32 + 1;
        }
        if plan.closing_hook.trim().is_empty()
            && let Some(last) = plan.scenes.last()
        {
            plan.closing_hook = last.ending_hook.clone();
        }
        Ok(plan)
    }
}

#[async_trait::async_trait]
impl StageAgent for ScenePlannerAgent<'_> {
    type Output = ChapterPlan;

    fn stage(&self) -> Stage {
        Stage::ScenePlanner
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<ChapterPlan>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::ScenePlanner,
                chapter: Some(self.chapter.number),
                user_prompt: self.build_prompt(),
                parse: Box::new(|raw| self.parse(raw, ctx)),
                describe: Box::new(|plan: &ChapterPlan| format!("{} scenes", plan.scenes.len())),
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
    use crate::novel::types::NewProject;
    use serde_json::json;
    use std::sync::Arc;

    fn fixtures() -> (Project, ChapterOutline, WorldBible) {
        let project = Project::from_request(NewProject {
            title: "Salt Road".into(),
            premise: "A smuggler inherits a ledger".into(),
            genre: "mystery".into(),
            tone: "tense".into(),
            chapter_count: 3,
            has_prologue: false,
            has_epilogue: false,
            has_author_note: false,
            style_notes: None,
        });
        let outline = serde_json::from_value(json!({
            "number": 2, "title": "Low Tide", "summary": "Mara meets the fence"
        }))
        .unwrap();
        (project, outline, WorldBible::default())
    }

    fn scenes(n: usize) -> String {
        let list: Vec<_> = (0..n)
            .map(|i| {
                json!({
                    "number": 7 + i,
                    "plot_beat": format!("beat {}", i),
                    "ending_hook": format!("hook {}", i),
                })
            })
            .collect();
        json!({"scenes": list}).to_string()
    }

    #[tokio::test]
    async fn test_plan_renumbered_and_hook_defaulted() {
        let (project, outline, bible) = fixtures();
        let provider = Arc::new(MockProvider::scripted(vec![Ok(scenes(3))]));
        let ctx = context(provider.clone());

        let out = ScenePlannerAgent::new(&project, &outline, &bible)
            .with_pacing_directive(Some("Raise the stakes around the ledger"))
            .run(&ctx)
            .await
            .unwrap();
        let numbers: Vec<u32> = out.value.scenes.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(out.value.closing_hook, "hook 2");

        let prompt = &provider.requests()[0].user_prompt;
        assert!(prompt.contains("Raise the stakes around the ledger"));
        assert!(prompt.contains("Low Tide"));
    }

    #[tokio::test]
    async fn test_wrong_scene_count_is_retried() {
        let (project, outline, bible) = fixtures();
        let provider = Arc::new(MockProvider::scripted(vec![Ok(scenes(6)), Ok(scenes(4))]));
        let ctx = context(provider.clone());

        let out = ScenePlannerAgent::new(&project, &outline, &bible)
            .run(&ctx)
            .await
            .unwrap();
        assert_eq!(out.value.scenes.len(), 4);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn test_pattern_constraints_reach_prompt() {
        let (project, outline, bible) = fixtures();
        let provider = Arc::new(MockProvider::scripted(vec![Ok(scenes(3))]));
        let ctx = context(provider.clone());
        let analysis = PatternAnalysis {
            warnings: vec!["Do not open with weather again".into()],
            ..Default::default()
        };

        ScenePlannerAgent::new(&project, &outline, &bible)
            .with_patterns(&analysis)
            .run(&ctx)
            .await
            .unwrap();
        let prompt = &provider.requests()[0].user_prompt;
        assert!(prompt.contains("Do not open with weather again"));
    }
}
