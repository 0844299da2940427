//! Novel Generation Pipeline
//!
//! Drives a project through the stage sequence:
//!
//! ```text
//! Outline ─► for each chapter in numeric order:
//!              plan ─► write scenes 1..N ─► audit ─► edit ─► summarize
//!            every N completed chapters: pacing review
//! ```
//!
//! ## Durability
//!
//! Each stage result is committed atomically with its checkpoint step, so a
//! run interrupted anywhere resumes at the first uncommitted stage. A stage
//! that fails after its retry budget leaves the project in `error` with the
//! last committed state intact.
//!
//! ## Concurrency
//!
//! Chapters and scenes of one project run strictly in sequence. Different
//! projects may run concurrently; they share only the database and the
//! in-process [`ProjectRegistry`].

pub mod agents;
mod chapter;
pub mod patch;
pub mod patterns;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod types;
pub mod vocabulary;
pub mod world_bible;

pub use agents::{AgentContext, StageAgent};
pub use patch::{Patch, PatchOutcome, apply_patch, apply_patches};
pub use patterns::{PatternAnalysis, PatternRecord, PatternTracker};
pub use progress::{ProgressEvent, ProgressReporter, ProgressSnapshot};
pub use prompts::PromptLibrary;
pub use registry::{ProjectRegistry, StopSignal};
pub use types::{
    Chapter, ChapterStatus, ChapterStep, ControlRequest, NewProject, Project, ProjectStatus, Stage,
};
pub use vocabulary::{VocabularyReport, VocabularyTracker};
pub use world_bible::{PlotThread, WorldBible};

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use self::agents::{OutlineAgent, PacingAgent};
use self::chapter::{ChapterRunner, RunState, check_stop};
use crate::ai::SharedProvider;
use crate::config::Config;
use crate::constants::agents::PACING_WINDOW;
use crate::storage::project_store::{self as store, ProjectStore};
use crate::storage::{Database, SharedDatabase};
use crate::types::{NovelError, ProjectId, Result};

/// Project plus chapter rows, for status display
#[derive(Debug, Clone)]
pub struct ProjectOverview {
    pub project: Project,
    pub chapters: Vec<Chapter>,
    /// Generating in this process right now
    pub running: bool,
}

impl ProjectOverview {
    pub fn completed(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| c.step == ChapterStep::Summarized)
            .count()
    }

    pub fn total_words(&self) -> usize {
        self.chapters.iter().map(|c| c.word_count).sum()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Project lifecycle operations that need no model
#[derive(Clone)]
pub struct ProjectManager {
    db: SharedDatabase,
    registry: ProjectRegistry,
}

impl ProjectManager {
    pub fn new(db: SharedDatabase) -> Self {
        Self {
            db,
            registry: ProjectRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: ProjectRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    fn store(&self) -> ProjectStore<'_> {
        ProjectStore::new(&self.db)
    }

    /// Persist a new project in status `idle`
    pub fn create_project(&self, request: NewProject) -> Result<Project> {
        request.validate()?;
        let project = Project::from_request(request);
        self.db
            .transaction(|conn| store::insert_project(conn, &project))?;
        info!(
            "Created project {} \"{}\" ({} chapters)",
            project.id.short(),
            project.title,
            project.total_chapters()
        );
        Ok(project)
    }

    /// Resolve a full id or unique prefix
    pub fn find_project(&self, id_or_prefix: &str) -> Result<Project> {
        self.store().find_project(id_or_prefix)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store().list_projects()
    }

    pub fn status(&self, id: &ProjectId) -> Result<ProjectOverview> {
        let store = self.store();
        Ok(ProjectOverview {
            project: store.load_project(id)?,
            chapters: store.load_chapters(id)?,
            running: self.registry.is_running(id),
        })
    }

    /// Ask a running project to stop after its current stage
    #[instrument(skip(self), fields(project = %id.short()))]
    pub fn pause(&self, id: &ProjectId) -> Result<()> {
        let project = self.store().load_project(id)?;
        if project.status != ProjectStatus::Generating {
            return Err(NovelError::invalid_transition(project.status, "pause"));
        }
        self.request_stop(id, ControlRequest::Pause)
    }

    /// Stop a running project, or cancel a paused, failed or abandoned one outright
    #[instrument(skip(self), fields(project = %id.short()))]
    pub fn cancel(&self, id: &ProjectId) -> Result<()> {
        let project = self.store().load_project(id)?;
        let running_here = self.registry.is_running(id);
        match project.status {
            ProjectStatus::Generating if running_here => {
                self.request_stop(id, ControlRequest::Cancel)
            }
            ProjectStatus::Generating => {
                // the request still stops a run that is alive in another process
                self.db.transaction(|conn| {
                    store::transition_status(
                        conn,
                        id,
                        |s| s == ProjectStatus::Generating,
                        ProjectStatus::Cancelled,
                        "cancel",
                    )?;
                    store::set_control_request(conn, id, Some(ControlRequest::Cancel))
                })?;
                warn!("Cancelled project {} with no run in this process", id.short());
                Ok(())
            }
            ProjectStatus::Paused | ProjectStatus::Error => {
                self.db.transaction(|conn| {
                    store::transition_status(
                        conn,
                        id,
                        |s| matches!(s, ProjectStatus::Paused | ProjectStatus::Error),
                        ProjectStatus::Cancelled,
                        "cancel",
                    )
                })?;
                info!("Cancelled project {}", id.short());
                Ok(())
            }
            status => Err(NovelError::invalid_transition(status, "cancel")),
        }
    }

    #[instrument(skip(self), fields(project = %id.short()))]
    pub fn archive(&self, id: &ProjectId) -> Result<()> {
        self.db.transaction(|conn| {
            store::transition_status(
                conn,
                id,
                |s| s.can_archive(),
                ProjectStatus::Archived,
                "archive",
            )
        })?;
        info!("Archived project {}", id.short());
        Ok(())
    }

    /// Persist the request for other processes, then signal this one
    fn request_stop(&self, id: &ProjectId, request: ControlRequest) -> Result<()> {
        self.store().set_control_request(id, Some(request))?;
        let local = self.registry.signal(id, request);
        info!(
            "Requested {} for project {}{}",
            request.as_str(),
            id.short(),
            if local { "" } else { " (running elsewhere)" }
        );
        Ok(())
    }
}

/// Runs generation for projects held by a [`ProjectManager`]
pub struct NovelPipeline {
    projects: ProjectManager,
    agents: AgentContext,
}

impl NovelPipeline {
    /// Build a pipeline; system prompts load from `config.prompts.directory`
    pub fn new(db: SharedDatabase, provider: SharedProvider, config: Arc<Config>) -> Result<Self> {
        let prompts = PromptLibrary::load(config.prompts.directory.as_deref())?;
        Ok(Self {
            projects: ProjectManager::new(db),
            agents: AgentContext::new(provider, config).with_prompts(prompts),
        })
    }

    pub fn with_agent_context(mut self, agents: AgentContext) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_projects(mut self, projects: ProjectManager) -> Self {
        self.projects = projects;
        self
    }

    pub fn projects(&self) -> &ProjectManager {
        &self.projects
    }

    fn db(&self) -> &Database {
        &self.projects.db
    }

    fn store(&self) -> ProjectStore<'_> {
        ProjectStore::new(self.db())
    }

    /// Run an idle project from the start
    #[instrument(skip(self, progress), fields(project = %id.short()))]
    pub async fn start_generation(
        &self,
        id: &ProjectId,
        progress: &ProgressReporter,
    ) -> Result<Project> {
        self.run(id, |s| s.can_start(), "start", progress).await
    }

    /// Re-enter a paused, cancelled or failed project at its first uncommitted stage
    ///
    /// A project left `generating` by a process that died is taken over: the
    /// run claims the registry first, so `generating` here means no live run
    /// in this process.
    #[instrument(skip(self, progress), fields(project = %id.short()))]
    pub async fn resume(&self, id: &ProjectId, progress: &ProgressReporter) -> Result<Project> {
        self.run(
            id,
            |s| s.can_resume() || s.is_abandoned(false),
            "resume",
            progress,
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Run
    // -------------------------------------------------------------------------

    async fn run(
        &self,
        id: &ProjectId,
        allowed: impl Fn(ProjectStatus) -> bool,
        action: &str,
        progress: &ProgressReporter,
    ) -> Result<Project> {
        let guard = self.projects.registry.register(id)?;
        let previous = self.db().transaction(|conn| {
            store::transition_status(conn, id, &allowed, ProjectStatus::Generating, action)
        })?;
        if previous.status == ProjectStatus::Generating {
            warn!(
                "Taking over project {} left generating by a run that did not finish",
                id.short()
            );
        }
        info!(
            "Generation {} for \"{}\" (was {})",
            if action == "start" { "started" } else { "resumed" },
            previous.title,
            previous.status
        );

        let outcome = self.drive(id, guard.signal(), progress).await;
        let (status, reason) = match &outcome {
            Ok(()) => (ProjectStatus::Completed, None),
            Err(NovelError::Cancelled) => (
                guard
                    .signal()
                    .requested()
                    .map(|r| r.resulting_status())
                    .unwrap_or(ProjectStatus::Cancelled),
                None,
            ),
            Err(e) => {
                error!("Generation failed: {}", e);
                let (stage, chapter, recoverable) = match e {
                    NovelError::Stage {
                        stage,
                        chapter,
                        recoverable,
                        ..
                    } => (
                        Stage::ALL.into_iter().find(|s| s.label() == stage.as_str()),
                        *chapter,
                        *recoverable,
                    ),
                    _ => (None, None, false),
                };
                progress.error(stage, chapter, &e.to_string(), recoverable);
                (ProjectStatus::Error, Some(e.to_string()))
            }
        };

        self.db()
            .transaction(|conn| store::set_status(conn, id, status, reason.as_deref()))?;
        progress.finish(status.as_str());
        drop(guard);
        info!("Project {} is now {}", id.short(), status);
        self.store().load_project(id)
    }

    async fn drive(
        &self,
        id: &ProjectId,
        signal: &StopSignal,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let store = self.store();
        let bible = match store.load_world_bible(id)? {
            Some((bible, _)) => bible,
            None => {
                self.run_outline(id, signal, progress).await?;
                store
                    .load_world_bible(id)?
                    .map(|(bible, _)| bible)
                    .ok_or_else(|| NovelError::NotFound(format!("world bible of project {}", id)))?
            }
        };

        let project = store.load_project(id)?;
        let chapters = store.load_chapters(id)?;
        if chapters.is_empty() {
            return Err(NovelError::stage(
                Stage::Outline.label(),
                None,
                "project has no chapters",
            ));
        }
        let mut state = RunState::rebuild(
            project,
            bible,
            &chapters,
            self.agents.pipeline().scene_tail_chars,
        );
        progress.begin(state.completed, state.total());

        let pending: Vec<Chapter> = chapters
            .into_iter()
            .filter(|c| c.step != ChapterStep::Summarized)
            .collect();
        // a review may have been due when the previous run stopped
        self.review_pacing(&mut state, signal, progress, !pending.is_empty())
            .await?;

        let count = pending.len();
        for (i, chapter) in pending.into_iter().enumerate() {
            ChapterRunner {
                db: self.db(),
                agents: &self.agents,
                signal,
                progress,
                state: &mut state,
            }
            .run(chapter)
            .await?;
            self.review_pacing(&mut state, signal, progress, i + 1 < count)
                .await?;
        }
        Ok(())
    }

    async fn run_outline(
        &self,
        id: &ProjectId,
        signal: &StopSignal,
        progress: &ProgressReporter,
    ) -> Result<()> {
        check_stop(self.db(), id, signal)?;
        let project = self.store().load_project(id)?;
        progress.stage_started(Stage::Outline, None, None);

        let out = OutlineAgent::new(&project).run(&self.agents).await?;
        for warning in &out.value.warnings {
            warn!("Outline: {}", warning);
        }

        check_stop(self.db(), id, signal)?;
        self.db().transaction(|conn| {
            store::save_outline(conn, id, &out.value)?;
            store::add_usage(conn, id, &out.usage)
        })?;
        progress.stage_completed(
            Stage::Outline,
            None,
            format!(
                "{} chapters, {} warnings{}",
                out.value.outline.len(),
                out.value.warnings.len(),
                if out.value.gap_filled { ", gaps filled" } else { "" }
            ),
        );
        Ok(())
    }

    /// Run the pacing review when one is due and chapters remain
    async fn review_pacing(
        &self,
        state: &mut RunState,
        signal: &StopSignal,
        progress: &ProgressReporter,
        chapters_remain: bool,
    ) -> Result<()> {
        let interval = self.agents.pipeline().pacing_interval as usize;
        if interval == 0 || !chapters_remain {
            return Ok(());
        }
        let due = (state.completed_regular / interval) as u32;
        if due <= state.project.pacing_reviews_done {
            return Ok(());
        }
        let Some(after) = state.last_completed() else {
            return Ok(());
        };

        check_stop(self.db(), &state.project.id, signal)?;
        progress.stage_started(Stage::Pacing, Some(after), None);
        let summaries = state.recent_summaries(PACING_WINDOW);
        let out = PacingAgent {
            after_chapter: after,
            summaries: &summaries,
            threads: &state.bible.plot_threads,
            completed: state.completed,
            total: state.total(),
        }
        .run(&self.agents)
        .await?;
        let report = out.value;
        if !report.forgotten_threads.is_empty() {
            warn!("Forgotten threads: {}", report.forgotten_threads.join(", "));
        }

        let mut threads = state.bible.plot_threads.clone();
        let changed = report.apply_to(&mut threads, after);
        check_stop(self.db(), &state.project.id, signal)?;
        let id = state.project.id.clone();
        self.db().transaction(|conn| {
            store::save_pacing(conn, &id, after, &report, &threads, due)?;
            store::add_usage(conn, &id, &out.usage)
        })?;

        info!(
            "Pacing review after {}: tension {}, {} thread(s) updated",
            types::chapter_label(after),
            report.tension_level,
            changed
        );
        state.bible.plot_threads = threads;
        state.project.pacing_reviews_done = due;
        state.project.pacing_directive = Some(report.directive.clone());
        state.project.usage.add(&out.usage);
        progress.stage_completed(Stage::Pacing, Some(after), report.directive.clone());
        progress.pacing_completed(after, report.tension_level, &report.directive);
        Ok(())
    }
}
