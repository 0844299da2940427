//! Scene Writer
//!
//! Prose for exactly one planned scene. The writer flags, but never retries,
//! output that looks truncated.

use tracing::warn;

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::PromptBuilder;
use crate::novel::types::{ChapterOutline, Project, ScenePlan, Stage, chapter_label};
use crate::novel::world_bible::WorldBible;
use crate::types::{Result, ValidationError, ValidationErrorKind, count_words};

/// Accepted scene prose
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDraft {
    pub text: String,
    pub word_count: usize,
    pub suspected_truncation: bool,
}

const TERMINAL: &[char] = &['.', '!', '?', '"', '\'', '”', '’', '…', '»', ')', '*', '—'];

/// Below the word floor, or ending mid-sentence
pub fn looks_truncated(text: &str, min_words: usize) -> bool {
    let trimmed = text.trim_end();
    count_words(trimmed) < min_words || !trimmed.ends_with(TERMINAL)
}

/// Strip fences and stray headings models like to add around prose
fn clean_prose(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        text = text.trim_end().strip_suffix("```").unwrap_or(text);
    }
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines[start..].join("\n").trim().to_string()
}

pub struct SceneWriterAgent<'a> {
    pub project: &'a Project,
    pub chapter: &'a ChapterOutline,
    pub scene: &'a ScenePlan,
    pub total_scenes: usize,
    pub bible: &'a WorldBible,
    /// Tail of the immediately preceding scene
    pub previous_tail: Option<&'a str>,
    /// Summaries of every prior chapter
    pub rolling_summary: &'a str,
    pub vocabulary: Option<&'a str>,
    pub pacing_directive: Option<&'a str>,
    /// Editor feedback when rewriting a rejected chapter
    pub revision_notes: Option<&'a str>,
}

impl<'a> SceneWriterAgent<'a> {
    pub fn new(
        project: &'a Project,
        chapter: &'a ChapterOutline,
        scene: &'a ScenePlan,
        total_scenes: usize,
        bible: &'a WorldBible,
    ) -> Self {
        Self {
            project,
            chapter,
            scene,
            total_scenes,
            bible,
            previous_tail: None,
            rolling_summary: "",
            vocabulary: None,
            pacing_directive: None,
            revision_notes: None,
        }
    }

    pub fn with_previous_tail(mut self, tail: Option<&'a str>) -> Self {
        self.previous_tail = tail.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_rolling_summary(mut self, summary: &'a str) -> Self {
        self.rolling_summary = summary;
        self
    }

    pub fn with_vocabulary(mut self, block: Option<&'a str>) -> Self {
        self.vocabulary = block.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn with_pacing_directive(mut self, directive: Option<&'a str>) -> Self {
        self.pacing_directive = directive.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_revision_notes(mut self, notes: Option<&'a str>) -> Self {
        self.revision_notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    fn build_prompt(&self) -> String {
        let s = self.scene;
        let is_last = s.number as usize >= self.total_scenes;
        let mut restrictions = vec![
            "Do NOT write beyond this scene's ending hook".to_string(),
            "Do NOT contradict any immutable character attribute".to_string(),
        ];
        if !is_last {
            restrictions.push("Do NOT end the chapter; another scene follows".to_string());
        }

        PromptBuilder::new()
            .context_item("Genre", &self.project.genre)
            .context_item("Tone", &self.project.tone)
            .context_item(
                "Chapter",
                format!(
                    "{} \"{}\"",
                    chapter_label(self.chapter.number),
                    self.chapter.title
                ),
            )
            .context_item("Scene", format!("{} of {}", s.number, self.total_scenes))
            .context_item("Characters", s.characters.join(", "))
            .context_item("Setting", &s.setting)
            .context_item("Plot beat", &s.plot_beat)
            .context_item("Emotional beat", &s.emotional_beat)
            .context_item("Sensory notes", &s.sensory_notes)
            .context_item("Ending hook", &s.ending_hook)
            .context_item("Target length", format!("about {} words", s.target_words))
            .section("World Bible", self.bible.to_prompt_block())
            .section("Story So Far", self.rolling_summary)
            .optional_section("Preceding Text", self.previous_tail)
            .optional_section("Pacing Directive", self.pacing_directive)
            .optional_section("Vocabulary", self.vocabulary)
            .optional_section("Revision Notes", self.revision_notes)
            .optional_section("Style Notes", self.project.style_notes.as_deref())
            .avoid(restrictions)
            .prose_output("Respond with the scene prose only: no title, no notes, no markdown.")
            .build()
    }

    fn parse(&self, raw: &str, ctx: &AgentContext) -> Result<SceneDraft> {
        let text = clean_prose(raw);
        if text.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Format, "empty scene text")
                .with_field("scene")
                .into());
        }
        let word_count = count_words(&text);
        let suspected_truncation = looks_truncated(&text, ctx.pipeline().scene_min_words);
        if suspected_truncation {
            warn!(
                "Scene {} of {} looks truncated ({} words)",
                self.scene.number,
                chapter_label(self.chapter.number),
                word_count
            );
        }
        Ok(SceneDraft {
            text,
            word_count,
            suspected_truncation,
        })
    }
}

#[async_trait::async_trait]
impl StageAgent for SceneWriterAgent<'_> {
    type Output = SceneDraft;

    fn stage(&self) -> Stage {
        Stage::SceneWriter
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<SceneDraft>> {
        run_stage_call(
            ctx,
            StageCall {
                stage: Stage::SceneWriter,
                chapter: Some(self.chapter.number),
                user_prompt: self.build_prompt(),
                parse: Box::new(|raw| self.parse(raw, ctx)),
                describe: Box::new(|d: &SceneDraft| format!("{} words", d.word_count)),
            },
        )
        .await
    }
}
