//! Console Progress Rendering
//!
//! Turns the pipeline's progress events into one console line each.

use console::style;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::novel::types::chapter_label;
use crate::novel::ProgressEvent;

/// Prints progress events as they arrive
pub struct ConsoleRenderer {
    events: broadcast::Receiver<ProgressEvent>,
    show_scenes: bool,
}

impl ConsoleRenderer {
    pub fn new(events: broadcast::Receiver<ProgressEvent>) -> Self {
        Self {
            events,
            show_scenes: true,
        }
    }

    pub fn with_scenes(mut self, show: bool) -> Self {
        self.show_scenes = show;
        self
    }

    /// Start rendering until the run finishes or the channel closes
    pub fn start_render_loop(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.events.recv().await {
                    Ok(event) => {
                        let done = matches!(event, ProgressEvent::Finished { .. });
                        if let Some(line) = render_event(&event, self.show_scenes) {
                            println!("{}", line);
                        }
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Progress renderer skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn where_(chapter: Option<u32>) -> String {
    chapter.map(|c| format!(" [{}]", chapter_label(c))).unwrap_or_default()
}

/// One line for an event, or `None` for events not worth printing
pub fn render_event(event: &ProgressEvent, show_scenes: bool) -> Option<String> {
    let line = match event {
        ProgressEvent::StageStarted { stage, chapter, scene } => {
            let scene = scene.map(|s| format!(" scene {}", s)).unwrap_or_default();
            format!("{} {}{}{}", style("→").dim(), stage.label(), where_(*chapter), scene)
        }
        ProgressEvent::StageCompleted { stage, chapter, message } => format!(
            "{} {}{}: {}",
            style("✓").green(),
            stage.label(),
            where_(*chapter),
            message
        ),
        ProgressEvent::SceneCompleted {
            chapter,
            scene,
            total_scenes,
            word_count,
        } => {
            if !show_scenes {
                return None;
            }
            format!(
                "  {} scene {}/{} ({} words)",
                chapter_label(*chapter),
                scene,
                total_scenes,
                word_count
            )
        }
        ProgressEvent::ChapterCompleted {
            chapter,
            word_count,
            approved,
            completed,
            total,
        } => format!(
            "{} {} {} done, {} words{}",
            render_progress_bar(*completed, *total, 30),
            style(format!("{}/{}", completed, total)).bold(),
            chapter_label(*chapter),
            word_count,
            if *approved { "" } else { " (not approved)" }
        ),
        ProgressEvent::PacingReviewCompleted {
            after_chapter,
            tension_level,
            directive,
        } => format!(
            "{} Pacing after {}: tension {}/10, {}",
            style("◆").cyan(),
            chapter_label(*after_chapter),
            tension_level,
            directive
        ),
        ProgressEvent::Error {
            stage,
            chapter,
            message,
            ..
        } => format!(
            "{} {}{}: {}",
            style("✗").red(),
            stage.map(|s| s.label()).unwrap_or("pipeline"),
            where_(*chapter),
            message
        ),
        ProgressEvent::Finished { status, elapsed_secs } => format!(
            "{} Finished: {} in {}",
            style("■").bold(),
            status,
            format_duration(*elapsed_secs)
        ),
    };
    Some(line)
}

/// Render a simple progress bar
pub fn render_progress_bar(completed: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return format!("[{}]", " ".repeat(width));
    }

    let progress = (completed as f32 / total as f32).min(1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format duration as human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::Stage;

    #[test]
    fn test_progress_bar_render() {
        assert_eq!(render_progress_bar(0, 10, 10), "[░░░░░░░░░░]");
        assert_eq!(render_progress_bar(5, 10, 10), "[█████░░░░░]");
        assert_eq!(render_progress_bar(10, 10, 10), "[██████████]");
        assert_eq!(render_progress_bar(3, 0, 4), "[    ]");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3700), "1h 1m");
    }

    #[test]
    fn test_render_events() {
        console::set_colors_enabled(false);
        let started = ProgressEvent::StageStarted {
            stage: Stage::SceneWriter,
            chapter: Some(0),
            scene: Some(2),
        };
        assert_eq!(
            render_event(&started, true).unwrap(),
            "→ Scene Writer [Prologue] scene 2"
        );

        let scene = ProgressEvent::SceneCompleted {
            chapter: 3,
            scene: 1,
            total_scenes: 4,
            word_count: 900,
        };
        assert!(render_event(&scene, false).is_none());
        let line = render_event(&scene, true).unwrap();
        assert!(line.contains("scene 1/4 (900 words)"));

        let error = ProgressEvent::Error {
            stage: None,
            chapter: None,
            message: "boom".into(),
            recoverable: false,
        };
        assert_eq!(render_event(&error, true).unwrap(), "✗ pipeline: boom");

        let done = ProgressEvent::ChapterCompleted {
            chapter: 998,
            word_count: 3000,
            approved: false,
            completed: 14,
            total: 14,
        };
        let line = render_event(&done, true).unwrap();
        assert!(line.contains("14/14 Epilogue done"));
        assert!(line.contains("3000 words (not approved)"));
    }
}
