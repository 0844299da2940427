//! Progress Events
//!
//! Discriminated stream of pipeline events. Payloads are advisory; nothing in
//! the pipeline depends on anyone listening.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::broadcast;

use super::types::Stage;
use crate::constants::progress::CHANNEL_CAPACITY;
use crate::types::ProjectId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
        chapter: Option<u32>,
        scene: Option<u32>,
    },
    StageCompleted {
        stage: Stage,
        chapter: Option<u32>,
        message: String,
    },
    SceneCompleted {
        chapter: u32,
        scene: u32,
        total_scenes: u32,
        word_count: usize,
    },
    ChapterCompleted {
        chapter: u32,
        word_count: usize,
        approved: bool,
        completed: usize,
        total: usize,
    },
    PacingReviewCompleted {
        after_chapter: u32,
        tension_level: u8,
        directive: String,
    },
    Error {
        stage: Option<Stage>,
        chapter: Option<u32>,
        message: String,
        recoverable: bool,
    },
    Finished {
        status: String,
        elapsed_secs: u64,
    },
}

/// Snapshot for status rendering
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub stage: Option<Stage>,
    pub chapter: Option<u32>,
    pub chapters_completed: usize,
    pub chapters_total: usize,
    pub is_running: bool,
}

/// Broadcasts progress for one project run
#[derive(Clone)]
pub struct ProgressReporter {
    project_id: ProjectId,
    sender: broadcast::Sender<ProgressEvent>,
    state: Arc<RwLock<ProgressSnapshot>>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(project_id: ProjectId) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            project_id,
            sender,
            state: Arc::new(RwLock::new(ProgressSnapshot::default())),
            started: Instant::now(),
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[inline]
    fn emit(&self, event: ProgressEvent) {
        // No receivers is normal when no UI is attached
        let _ = self.sender.send(event);
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        f(&mut self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()));
    }

    pub fn begin(&self, chapters_completed: usize, chapters_total: usize) {
        self.update(|s| {
            s.is_running = true;
            s.chapters_completed = chapters_completed;
            s.chapters_total = chapters_total;
        });
    }

    pub fn stage_started(&self, stage: Stage, chapter: Option<u32>, scene: Option<u32>) {
        self.update(|s| {
            s.stage = Some(stage);
            s.chapter = chapter;
        });
        self.emit(ProgressEvent::StageStarted {
            stage,
            chapter,
            scene,
        });
    }

    pub fn stage_completed(&self, stage: Stage, chapter: Option<u32>, message: impl Into<String>) {
        self.emit(ProgressEvent::StageCompleted {
            stage,
            chapter,
            message: message.into(),
        });
    }

    pub fn scene_completed(&self, chapter: u32, scene: u32, total_scenes: u32, word_count: usize) {
        self.emit(ProgressEvent::SceneCompleted {
            chapter,
            scene,
            total_scenes,
            word_count,
        });
    }

    pub fn chapter_completed(&self, chapter: u32, word_count: usize, approved: bool) {
        let mut counts = (0, 0);
        self.update(|s| {
            s.chapters_completed += 1;
            counts = (s.chapters_completed, s.chapters_total);
        });
        self.emit(ProgressEvent::ChapterCompleted {
            chapter,
            word_count,
            approved,
            completed: counts.0,
            total: counts.1,
        });
    }

    pub fn pacing_completed(&self, after_chapter: u32, tension_level: u8, directive: &str) {
        self.emit(ProgressEvent::PacingReviewCompleted {
            after_chapter,
            tension_level,
            directive: directive.to_string(),
        });
    }

    pub fn error(
        &self,
        stage: Option<Stage>,
        chapter: Option<u32>,
        message: &str,
        recoverable: bool,
    ) {
        self.emit(ProgressEvent::Error {
            stage,
            chapter,
            message: message.to_string(),
            recoverable,
        });
    }

    pub fn finish(&self, status: &str) {
        self.update(|s| s.is_running = false);
        self.emit(ProgressEvent::Finished {
            status: status.to_string(),
            elapsed_secs: self.started.elapsed().as_secs(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscriber_in_order() {
        let reporter = ProgressReporter::new(ProjectId::new("p1"));
        let mut rx = reporter.subscribe();

        reporter.begin(0, 2);
        reporter.stage_started(Stage::SceneWriter, Some(1), Some(1));
        reporter.scene_completed(1, 1, 3, 900);
        reporter.chapter_completed(1, 2700, true);

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::StageStarted { stage: Stage::SceneWriter, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::SceneCompleted { scene: 1, .. }
        ));
        match rx.recv().await.unwrap() {
            ProgressEvent::ChapterCompleted { completed, total, .. } => {
                assert_eq!((completed, total), (1, 2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let reporter = ProgressReporter::new(ProjectId::new("p1"));
        reporter.begin(0, 1);
        reporter.finish("completed");
        assert!(!reporter.snapshot().is_running);
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let json = serde_json::to_value(ProgressEvent::StageCompleted {
            stage: Stage::Editor,
            chapter: Some(2),
            message: "approved".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "stage_completed");
        assert_eq!(json["stage"], "editor");
    }
}
