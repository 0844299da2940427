//! Chapter Runner
//!
//! Drives one chapter from its last committed step to `Summarized`:
//!
//! ```text
//! Pending ─► Planned ─► Written ─► Audited ─► Edited ─► Summarized
//!  planner    writer     auditor    editor     summarizer
//!                                  (rewrite loops back here)
//! ```
//!
//! Every stage result is committed with its step marker and token usage in a
//! single transaction. A stop request noticed after a call discards the result,
//! so a resumed run repeats that call and nothing else.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::agents::{
    AgentContext, AuditorAgent, EditorAgent, ScenePlannerAgent, SceneDraft, SceneWriterAgent,
    StageAgent, StageOutput, SummarizerAgent, verdict,
};
use super::patch::apply_patches;
use super::patterns::{PatternRecord, PatternTracker};
use super::progress::ProgressReporter;
use super::registry::StopSignal;
use super::types::{
    Chapter, ChapterOutline, ChapterPlan, ChapterStatus, ChapterStep, EditorReport, EditorVerdict,
    Project, SceneRecord, ScenePlan, Severity, Stage, assemble_chapter, chapter_label,
    is_regular_chapter,
};
use super::vocabulary::VocabularyTracker;
use super::world_bible::WorldBible;
use crate::storage::project_store::{self as store, EditCommit, ProjectStore};
use crate::storage::Database;
use crate::types::{NovelError, ProjectId, Result, TokenUsage, enum_to_str, tail_chars};

/// Poll the persisted control request into the signal, then honour it
pub(crate) fn check_stop(db: &Database, id: &ProjectId, signal: &StopSignal) -> Result<()> {
    if let Some(request) = ProjectStore::new(db).control_request(id)? {
        signal.request(request);
    }
    match signal.requested() {
        Some(request) => {
            info!("Stop requested ({}) for project {}", request.as_str(), id.short());
            Err(NovelError::Cancelled)
        }
        None => Ok(()),
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Cross-chapter memory of a run, rebuilt from storage on resume
pub(crate) struct RunState {
    pub project: Project,
    pub bible: WorldBible,
    pub outline: Vec<ChapterOutline>,
    pub summaries: BTreeMap<u32, String>,
    /// Closing text of each finished chapter
    pub tails: BTreeMap<u32, String>,
    pub patterns: PatternTracker,
    pub vocabulary: VocabularyTracker,
    pub completed: usize,
    pub completed_regular: usize,
    tail_len: usize,
}

impl RunState {
    pub fn rebuild(
        project: Project,
        bible: WorldBible,
        chapters: &[Chapter],
        tail_len: usize,
    ) -> Self {
        let mut state = Self {
            project,
            bible,
            outline: chapters.iter().map(|c| c.outline.clone()).collect(),
            summaries: BTreeMap::new(),
            tails: BTreeMap::new(),
            patterns: PatternTracker::new(),
            vocabulary: VocabularyTracker::new(),
            completed: 0,
            completed_regular: 0,
            tail_len,
        };
        for chapter in chapters.iter().filter(|c| c.step == ChapterStep::Summarized) {
            state.record_completed(chapter);
        }
        state
    }

    pub fn record_completed(&mut self, chapter: &Chapter) {
        let n = chapter.number;
        let content = chapter.content.as_deref().unwrap_or_default();
        if let Some(summary) = &chapter.summary {
            self.summaries.insert(n, summary.clone());
        }
        self.tails.insert(n, tail_chars(content, self.tail_len).to_string());
        self.patterns
            .record(PatternRecord::from_chapter(n, chapter.plan.as_ref(), content));
        self.vocabulary.record(n, content);
        self.completed += 1;
        if is_regular_chapter(n) {
            self.completed_regular += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.outline.len()
    }

    pub fn previous_summary(&self, n: u32) -> Option<&str> {
        self.summaries.range(..n).next_back().map(|(_, s)| s.as_str())
    }

    pub fn previous_tail(&self, n: u32) -> Option<&str> {
        self.tails.range(..n).next_back().map(|(_, s)| s.as_str())
    }

    /// Every prior summary, one line per chapter
    pub fn rolling_summary(&self, n: u32) -> String {
        self.summaries
            .range(..n)
            .map(|(c, s)| format!("{}: {}", chapter_label(*c), s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn neighbours(&self, n: u32) -> (Option<&ChapterOutline>, Option<&ChapterOutline>) {
        match self.outline.iter().position(|o| o.number == n) {
            Some(i) => (
                i.checked_sub(1).and_then(|p| self.outline.get(p)),
                self.outline.get(i + 1),
            ),
            None => (None, None),
        }
    }

    /// Most recent summaries for a pacing review, oldest first
    pub fn recent_summaries(&self, window: usize) -> Vec<(u32, String)> {
        let skip = self.summaries.len().saturating_sub(window);
        self.summaries
            .iter()
            .skip(skip)
            .map(|(n, s)| (*n, s.clone()))
            .collect()
    }

    pub fn last_completed(&self) -> Option<u32> {
        self.summaries.keys().next_back().copied()
    }
}

// =============================================================================
// Chapter Runner
// =============================================================================

pub(crate) struct ChapterRunner<'a> {
    pub db: &'a Database,
    pub agents: &'a AgentContext,
    pub signal: &'a StopSignal,
    pub progress: &'a ProgressReporter,
    pub state: &'a mut RunState,
}

impl ChapterRunner<'_> {
    /// Run the chapter from whatever step it last committed
    pub async fn run(&mut self, mut chapter: Chapter) -> Result<()> {
        if chapter.step != ChapterStep::Pending {
            info!("Resuming {} at step {}", chapter.label(), chapter.step.as_str());
        }
        loop {
            match chapter.step {
                ChapterStep::Pending => self.plan(&mut chapter).await?,
                ChapterStep::Planned => self.write(&mut chapter).await?,
                ChapterStep::Written => self.audit(&mut chapter).await?,
                ChapterStep::Audited => self.edit(&mut chapter).await?,
                ChapterStep::Edited => self.summarize(&mut chapter).await?,
                ChapterStep::Summarized => return Ok(()),
            }
        }
    }

    fn stop(&self) -> Result<()> {
        check_stop(self.db, &self.state.project.id, self.signal)
    }

    /// Commit a stage result together with its usage
    fn commit<F>(&mut self, usage: &TokenUsage, f: F) -> Result<()>
    where
        F: FnOnce(&rusqlite::Connection, &ProjectId) -> Result<()>,
    {
        self.stop()?;
        let id = self.state.project.id.clone();
        self.db.transaction(|conn| {
            f(conn, &id)?;
            store::add_usage(conn, &id, usage)
        })?;
        self.state.project.usage.add(usage);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    async fn plan(&mut self, chapter: &mut Chapter) -> Result<()> {
        let n = chapter.number;
        self.stop()?;
        let id = self.state.project.id.clone();
        self.db
            .transaction(|conn| store::set_chapter_status(conn, &id, n, ChapterStatus::Planning))?;
        self.progress.stage_started(Stage::ScenePlanner, Some(n), None);

        let analysis = self.state.patterns.analyze_for_chapter(n);
        let (previous, next) = self.state.neighbours(n);
        let out = ScenePlannerAgent::new(&self.state.project, &chapter.outline, &self.state.bible)
            .with_previous_summary(self.state.previous_summary(n))
            .with_neighbours(previous, next)
            .with_pacing_directive(self.state.project.pacing_directive.as_deref())
            .with_patterns(&analysis)
            .run(self.agents)
            .await?;

        self.commit(&out.usage, |conn, id| store::save_plan(conn, id, n, &out.value))?;
        self.progress.stage_completed(
            Stage::ScenePlanner,
            Some(n),
            format!("{} scenes", out.value.scenes.len()),
        );
        chapter.plan = Some(out.value);
        chapter.step = ChapterStep::Planned;
        chapter.status = ChapterStatus::Writing;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    fn require_plan(chapter: &Chapter) -> Result<ChapterPlan> {
        chapter
            .plan
            .clone()
            .filter(|p| !p.scenes.is_empty())
            .ok_or_else(|| {
                NovelError::stage(
                    Stage::SceneWriter.label(),
                    Some(chapter.number),
                    "no scene plan",
                )
            })
    }

    async fn write_scene(
        &self,
        chapter: &Chapter,
        scene: &ScenePlan,
        total: usize,
        previous_tail: Option<&str>,
        rolling_summary: &str,
        revision_notes: Option<&str>,
    ) -> Result<StageOutput<SceneDraft>> {
        let vocabulary = self.state.vocabulary.report().to_prompt_block();
        self.progress
            .stage_started(Stage::SceneWriter, Some(chapter.number), Some(scene.number));
        SceneWriterAgent::new(
            &self.state.project,
            &chapter.outline,
            scene,
            total,
            &self.state.bible,
        )
        .with_previous_tail(previous_tail)
        .with_rolling_summary(rolling_summary)
        .with_vocabulary(Some(&vocabulary))
        .with_pacing_directive(self.state.project.pacing_directive.as_deref())
        .with_revision_notes(revision_notes)
        .run(self.agents)
        .await
    }

    /// Write scenes strictly in order, each committed as it lands
    async fn write(&mut self, chapter: &mut Chapter) -> Result<()> {
        let n = chapter.number;
        let plan = Self::require_plan(chapter)?;
        let total = plan.scenes.len();
        let tail_len = self.agents.pipeline().scene_tail_chars;

        let mut scenes = ProjectStore::new(self.db).load_scenes(&self.state.project.id, n)?;
        scenes.retain(|s| plan.scenes.iter().any(|p| p.number == s.number));
        if !scenes.is_empty() {
            debug!(
                "{}: {} of {} scenes already written",
                chapter.label(),
                scenes.len(),
                total
            );
        }
        let rolling = self.state.rolling_summary(n);

        for scene in &plan.scenes {
            if scenes.iter().any(|s| s.number == scene.number) {
                continue;
            }
            self.stop()?;
            let tail = match scenes.last() {
                Some(prev) => Some(tail_chars(&prev.text, tail_len).to_string()),
                None => self.state.previous_tail(n).map(str::to_string),
            };
            let out = self
                .write_scene(chapter, scene, total, tail.as_deref(), &rolling, None)
                .await?;
            let record = SceneRecord {
                chapter: n,
                number: scene.number,
                text: out.value.text,
                word_count: out.value.word_count,
                suspected_truncation: out.value.suspected_truncation,
            };
            self.commit(&out.usage, |conn, id| store::save_scene(conn, id, &record))?;
            self.progress
                .scene_completed(n, scene.number, total as u32, record.word_count);
            scenes.push(record);
        }

        let content = assemble_chapter(&scenes);
        self.commit(&TokenUsage::default(), |conn, id| {
            store::save_written(conn, id, n, &content)
        })?;
        self.progress.stage_completed(
            Stage::SceneWriter,
            Some(n),
            format!("{} words", crate::types::count_words(&content)),
        );
        chapter.content = Some(content);
        chapter.step = ChapterStep::Written;
        chapter.status = ChapterStatus::Editing;
        Ok(())
    }

    /// Regenerate every scene with the editor's notes; nothing is committed here
    async fn rewrite_scenes(
        &self,
        chapter: &Chapter,
        notes: &str,
    ) -> Result<(Vec<SceneRecord>, TokenUsage)> {
        let n = chapter.number;
        let plan = Self::require_plan(chapter)?;
        let total = plan.scenes.len();
        let tail_len = self.agents.pipeline().scene_tail_chars;
        let rolling = self.state.rolling_summary(n);
        let mut scenes: Vec<SceneRecord> = Vec::with_capacity(total);
        let mut usage = TokenUsage::default();

        for scene in &plan.scenes {
            self.stop()?;
            let tail = match scenes.last() {
                Some(prev) => Some(tail_chars(&prev.text, tail_len).to_string()),
                None => self.state.previous_tail(n).map(str::to_string),
            };
            let out = self
                .write_scene(
                    chapter,
                    scene,
                    total,
                    tail.as_deref(),
                    &rolling,
                    Some(notes),
                )
                .await?;
            usage.add(&out.usage);
            scenes.push(SceneRecord {
                chapter: n,
                number: scene.number,
                word_count: out.value.word_count,
                suspected_truncation: out.value.suspected_truncation,
                text: out.value.text,
            });
        }
        Ok((scenes, usage))
    }

    fn content_of(&self, chapter: &Chapter) -> Result<String> {
        match &chapter.content {
            Some(c) if !c.trim().is_empty() => Ok(c.clone()),
            _ => {
                let scenes = ProjectStore::new(self.db)
                    .load_scenes(&self.state.project.id, chapter.number)?;
                if scenes.is_empty() {
                    return Err(NovelError::stage(
                        Stage::SceneWriter.label(),
                        Some(chapter.number),
                        "chapter has no text",
                    ));
                }
                Ok(assemble_chapter(&scenes))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Audit
    // -------------------------------------------------------------------------

    /// Consistency audit with surgical fixes; unfixable findings become notes
    async fn audit(&mut self, chapter: &mut Chapter) -> Result<()> {
        let n = chapter.number;
        let content = self.content_of(chapter)?;
        self.stop()?;
        self.progress.stage_started(Stage::Auditor, Some(n), None);

        let prior = self.state.rolling_summary(n);
        let out = AuditorAgent::new(&chapter.outline, &content, &self.state.bible, &prior)
            .run(self.agents)
            .await?;
        let report = out.value;

        let patches: Vec<_> = report.issues.iter().filter_map(|i| i.as_patch()).collect();
        let outcome = apply_patches(&content, &patches);
        let mut notes = chapter.notes.clone();
        notes.extend(outcome.rejection_notes());
        for issue in report
            .issues
            .iter()
            .filter(|i| i.as_patch().is_none() && i.severity != Severity::Minor)
        {
            notes.push(format!(
                "unresolved {} ({}): {}",
                enum_to_str(&issue.kind),
                enum_to_str(&issue.severity),
                issue.description
            ));
        }
        if report.requires_correction() {
            warn!(
                "{}: audit found {} issue(s), {} fixed in place",
                chapter.label(),
                report.issues.len(),
                outcome.applied
            );
        }

        self.commit(&out.usage, |conn, id| {
            store::save_audit(conn, id, n, &report, &outcome.text, &notes)
        })?;
        self.progress.stage_completed(
            Stage::Auditor,
            Some(n),
            format!("{} issues, {} fixed", report.issues.len(), outcome.applied),
        );
        chapter.content = Some(outcome.text);
        chapter.audit = Some(report);
        chapter.notes = notes;
        chapter.step = ChapterStep::Audited;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    async fn run_editor(&self, chapter: &Chapter, text: &str) -> Result<StageOutput<EditorReport>> {
        self.stop()?;
        self.progress.stage_started(Stage::Editor, Some(chapter.number), None);
        EditorAgent::new(&chapter.outline, text, &self.state.bible)
            .with_plan(chapter.plan.as_ref())
            .with_style_notes(self.state.project.style_notes.as_deref())
            .run(self.agents)
            .await
    }

    /// Approve, patch and re-check once, or rewrite within the rewrite budget
    async fn edit(&mut self, chapter: &mut Chapter) -> Result<()> {
        let n = chapter.number;
        let max_rewrites = self.agents.pipeline().max_rewrites;
        let mut content = self.content_of(chapter)?;
        let mut notes = chapter.notes.clone();
        let mut usage = TokenUsage::default();

        loop {
            let first = self.run_editor(chapter, &content).await?;
            usage.add(&first.usage);

            let (text, report, approved) = match verdict(&first.value, self.agents) {
                EditorVerdict::Approve => (content, first.value, true),
                EditorVerdict::Patch => {
                    let outcome = apply_patches(&content, &first.value.patches);
                    notes.extend(outcome.rejection_notes());
                    debug!(
                        "{}: {} editor patches applied",
                        chapter.label(),
                        outcome.applied
                    );
                    let second = self.run_editor(chapter, &outcome.text).await?;
                    usage.add(&second.usage);
                    let approved = verdict(&second.value, self.agents) == EditorVerdict::Approve;
                    (outcome.text, second.value, approved)
                }
                EditorVerdict::Rewrite if chapter.rewrites < max_rewrites => {
                    let rewrites = chapter.rewrites + 1;
                    info!(
                        "{}: rewriting (logic {}, style {}), attempt {}/{}",
                        chapter.label(),
                        first.value.logic_score,
                        first.value.style_score,
                        rewrites,
                        max_rewrites
                    );
                    chapter.status = ChapterStatus::Revision;
                    let (scenes, rewrite_usage) =
                        self.rewrite_scenes(chapter, &first.value.notes).await?;
                    usage.add(&rewrite_usage);
                    self.commit(&usage, |conn, id| {
                        store::save_rewrite(conn, id, n, &scenes, rewrites)
                    })?;
                    usage = TokenUsage::default();
                    content = assemble_chapter(&scenes);
                    chapter.content = Some(content.clone());
                    chapter.rewrites = rewrites;
                    continue;
                }
                EditorVerdict::Rewrite => {
                    warn!(
                        "{}: rewrite budget exhausted, keeping current text",
                        chapter.label()
                    );
                    notes.push(format!(
                        "needs rewrite: logic {}, style {} after {} rewrite(s)",
                        first.value.logic_score, first.value.style_score, chapter.rewrites
                    ));
                    (content, first.value, false)
                }
            };

            let commit = EditCommit {
                content: &text,
                logic_score: report.logic_score,
                style_score: report.style_score,
                approved,
                notes: &notes,
            };
            self.commit(&usage, |conn, id| store::save_edit(conn, id, n, &commit))?;
            self.progress.stage_completed(
                Stage::Editor,
                Some(n),
                format!(
                    "logic {}, style {}, {}",
                    report.logic_score,
                    report.style_score,
                    if approved { "approved" } else { "not approved" }
                ),
            );
            chapter.word_count = crate::types::count_words(&text);
            chapter.content = Some(text);
            chapter.logic_score = Some(report.logic_score);
            chapter.style_score = Some(report.style_score);
            chapter.approved = approved;
            chapter.notes = notes;
            chapter.step = ChapterStep::Edited;
            chapter.status = ChapterStatus::Editing;
            return Ok(());
        }
    }

    // -------------------------------------------------------------------------
    // Summary
    // -------------------------------------------------------------------------

    async fn summarize(&mut self, chapter: &mut Chapter) -> Result<()> {
        let n = chapter.number;
        let content = self.content_of(chapter)?;
        self.stop()?;
        self.progress.stage_started(Stage::Summarizer, Some(n), None);

        let out = SummarizerAgent::new(n, &content).run(self.agents).await?;
        let status = if chapter.approved {
            ChapterStatus::Approved
        } else {
            ChapterStatus::Completed
        };
        let summary = out.value.summary;
        self.commit(&out.usage, |conn, id| {
            store::save_summary(conn, id, n, &summary, status)
        })?;

        chapter.summary = Some(summary);
        chapter.status = status;
        chapter.step = ChapterStep::Summarized;
        chapter.word_count = crate::types::count_words(&content);
        chapter.content = Some(content);
        self.state.record_completed(chapter);

        self.progress.stage_completed(
            Stage::Summarizer,
            Some(n),
            format!("{} summarized", chapter.label()),
        );
        self.progress
            .chapter_completed(n, chapter.word_count, chapter.approved);
        info!(
            "{} complete: {} words, {}",
            chapter.label(),
            chapter.word_count,
            if chapter.approved { "approved" } else { "not approved" }
        );
        Ok(())
    }
}
