//! Generate and Resume Commands
//!
//! Runs the pipeline in the foreground with live progress. Ctrl-C asks the
//! run to pause after its current stage; the command returns once that
//! stage is committed.

use tracing::{info, warn};

use crate::cli::progress::ConsoleRenderer;
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::novel::{ProgressReporter, Project, ProjectStatus};
use crate::types::Result;

pub async fn run(
    ctx: &CommandContext,
    project: &str,
    resume: bool,
    show_scenes: bool,
) -> Result<Project> {
    let pipeline = ctx.pipeline()?;
    let project = pipeline.projects().find_project(project)?;
    let out = Output::new();

    out.header(&format!(
        "{} \"{}\" ({} chapters)",
        if resume { "Resuming" } else { "Generating" },
        project.title,
        project.total_chapters()
    ));

    let progress = ProgressReporter::new(project.id.clone());
    let renderer = ConsoleRenderer::new(progress.subscribe())
        .with_scenes(show_scenes)
        .start_render_loop();

    let result = {
        let generation = async {
            if resume {
                pipeline.resume(&project.id, &progress).await
            } else {
                pipeline.start_generation(&project.id, &progress).await
            }
        };
        tokio::pin!(generation);

        tokio::select! {
            result = &mut generation => result,
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => {
                        out.warning("Interrupt received; pausing after the current stage");
                        if let Err(e) = pipeline.projects().pause(&project.id) {
                            warn!("Pause request failed: {}", e);
                        }
                    }
                    Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
                }
                generation.await
            }
        }
    };

    // closing the channel ends the render loop even if the run never started
    drop(progress);
    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped abnormally: {}", e);
    }

    let finished = result?;
    println!();
    match finished.status {
        ProjectStatus::Completed => out.success(&format!("\"{}\" is complete", finished.title)),
        ProjectStatus::Paused => out.info(&format!(
            "Paused. Run 'novelsmith resume {}' to continue.",
            finished.id.short()
        )),
        ProjectStatus::Cancelled => out.warning("Cancelled"),
        ProjectStatus::Error => out.error(&format!(
            "Stopped with an error: {}. Run 'novelsmith resume {}' to retry.",
            finished.error_reason.as_deref().unwrap_or("unknown"),
            finished.id.short()
        )),
        status => info!("Run ended with status {}", status),
    }
    Ok(finished)
}
