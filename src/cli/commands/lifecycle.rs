//! Pause, Cancel and Archive Commands
//!
//! Pause and cancel persist a request that the running process picks up
//! between stages, so they work from a second terminal.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::novel::ProjectStatus;
use crate::types::Result;

pub fn pause(ctx: &CommandContext, project: &str) -> Result<()> {
    let project = ctx.project(project)?;
    ctx.projects().pause(&project.id)?;
    Output::new().success(&format!(
        "Pause requested for \"{}\"; it stops after the current stage",
        project.title
    ));
    Ok(())
}

pub fn cancel(ctx: &CommandContext, project: &str) -> Result<()> {
    let project = ctx.project(project)?;
    ctx.projects().cancel(&project.id)?;
    let out = Output::new();
    if project.status == ProjectStatus::Generating {
        out.success(&format!(
            "Cancel requested for \"{}\"; it stops after the current stage",
            project.title
        ));
    } else {
        out.success(&format!("Cancelled \"{}\"", project.title));
    }
    Ok(())
}

pub fn archive(ctx: &CommandContext, project: &str) -> Result<()> {
    let project = ctx.project(project)?;
    ctx.projects().archive(&project.id)?;
    Output::new().success(&format!("Archived \"{}\"", project.title));
    Ok(())
}
