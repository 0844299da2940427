//! New Command
//!
//! Create a project from a premise.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::novel::{NewProject, Project};
use crate::types::Result;

pub fn run(ctx: &CommandContext, request: NewProject) -> Result<Project> {
    let project = ctx.projects().create_project(request)?;

    let out = Output::new();
    out.success(&format!("Created project \"{}\"", project.title));
    out.field("Id", &project.id);
    out.field("Chapters", project.total_chapters());
    out.field("Status", project.status);
    println!();
    println!("Run 'novelsmith generate {}' to start.", project.id.short());
    Ok(project)
}
