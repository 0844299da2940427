//! Status Command
//!
//! List projects, or show one project's chapters, scores and usage.

use console::style;
use serde_json::json;

use crate::cli::progress::render_progress_bar;
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::novel::{Chapter, ProjectOverview};
use crate::types::Result;

pub fn run(
    ctx: &CommandContext,
    project: Option<&str>,
    format: &str,
    detailed: bool,
) -> Result<()> {
    let json_output = format == "json";
    let projects = ctx.projects();

    let Some(id_or_prefix) = project else {
        let list = projects.list_projects()?;
        if json_output {
            let rows: Vec<_> = list
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "title": p.title,
                        "status": p.status,
                        "chapters": p.total_chapters(),
                        "updated_at": p.updated_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        let out = Output::new();
        out.header("Projects");
        if list.is_empty() {
            println!("No projects yet. Run 'novelsmith new' to create one.");
        }
        for p in &list {
            println!(
                "  {}  {:<11} {:>3} ch  {}",
                style(p.id.short()).cyan(),
                p.status,
                p.total_chapters(),
                p.title
            );
        }
        return Ok(());
    };

    let found = projects.find_project(id_or_prefix)?;
    let overview = projects.status(&found.id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&overview_json(&overview, detailed))?);
        return Ok(());
    }

    print_overview(&overview, detailed);
    Ok(())
}

fn overview_json(overview: &ProjectOverview, detailed: bool) -> serde_json::Value {
    let p = &overview.project;
    let chapters: Vec<_> = overview
        .chapters
        .iter()
        .map(|c| {
            let mut row = json!({
                "number": c.number,
                "label": c.label(),
                "title": c.outline.title,
                "status": c.status.as_str(),
                "step": c.step.as_str(),
                "words": c.word_count,
                "logic_score": c.logic_score,
                "style_score": c.style_score,
                "approved": c.approved,
                "rewrites": c.rewrites,
            });
            if detailed {
                row["notes"] = json!(c.notes);
                row["summary"] = json!(c.summary);
            }
            row
        })
        .collect();

    json!({
        "id": p.id,
        "title": p.title,
        "status": p.status,
        "error_reason": p.error_reason,
        "control_request": p.control_request,
        "completed": overview.completed(),
        "total": overview.chapters.len(),
        "words": overview.total_words(),
        "pacing_directive": p.pacing_directive,
        "pacing_reviews": p.pacing_reviews_done,
        "outline_warnings": p.outline_warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        "usage": p.usage,
        "chapters": chapters,
    })
}

fn print_overview(overview: &ProjectOverview, detailed: bool) {
    let p = &overview.project;
    let out = Output::new();

    out.header(&p.title);
    out.field("Id", &p.id);
    out.field(
        "Status",
        if overview.running {
            format!("{} (running here)", p.status)
        } else {
            p.status.to_string()
        },
    );
    if let Some(reason) = &p.error_reason {
        out.field("Error", style(reason).red());
    }
    if let Some(request) = p.control_request {
        out.field("Pending request", request.as_str());
    }
    out.field(
        "Progress",
        format!(
            "{} {}/{}",
            render_progress_bar(overview.completed(), overview.chapters.len(), 30),
            overview.completed(),
            overview.chapters.len()
        ),
    );
    out.field("Words", overview.total_words());
    out.field(
        "Tokens",
        format!(
            "{} in / {} out / {} thinking",
            p.usage.input, p.usage.output, p.usage.thinking
        ),
    );
    if let Some(directive) = &p.pacing_directive {
        out.field("Pacing", directive);
    }

    if !overview.chapters.is_empty() {
        out.section("Chapters");
        for chapter in &overview.chapters {
            println!("  {}", chapter_line(chapter));
            if detailed {
                for note in &chapter.notes {
                    println!("      {} {}", style("!").yellow(), note);
                }
            }
        }
    }

    if !p.outline_warnings.is_empty() {
        out.section("Outline warnings");
        for warning in &p.outline_warnings {
            out.warning(&warning.to_string());
        }
    }
}

fn chapter_line(c: &Chapter) -> String {
    let scores = match (c.logic_score, c.style_score) {
        (Some(logic), Some(style)) => format!("logic {:>2} style {:>2}", logic, style),
        _ => String::new(),
    };
    format!(
        "{:<14} {:<10} {:<11} {:>6} words  {}{}",
        c.label(),
        c.status.as_str(),
        c.step.as_str(),
        c.word_count,
        scores,
        if c.rewrites > 0 {
            format!(
                "  ({} rewrite{})",
                c.rewrites,
                if c.rewrites == 1 { "" } else { "s" }
            )
        } else {
            String::new()
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::types::ChapterOutline;
    use crate::novel::{ChapterStatus, ChapterStep, NewProject, Project};

    fn overview() -> ProjectOverview {
        let project = Project::from_request(NewProject {
            title: "Salt Road".into(),
            premise: "p".into(),
            genre: "mystery".into(),
            tone: "tense".into(),
            chapter_count: 2,
            has_prologue: true,
            has_epilogue: false,
            has_author_note: false,
            style_notes: None,
        });
        let outline: ChapterOutline =
            serde_json::from_value(json!({"number": 0, "title": "Fog"})).unwrap();
        let mut done = Chapter::from_outline(project.id.clone(), outline);
        done.step = ChapterStep::Summarized;
        done.status = ChapterStatus::Approved;
        done.word_count = 1200;
        done.logic_score = Some(9);
        done.style_score = Some(8);
        done.approved = true;
        done.rewrites = 1;
        done.notes = vec!["unresolved timeline (major): the tide".into()];
        ProjectOverview {
            project,
            chapters: vec![done],
            running: false,
        }
    }

    #[test]
    fn test_chapter_line() {
        let overview = overview();
        let line = chapter_line(&overview.chapters[0]);
        assert!(line.starts_with("Prologue"));
        assert!(line.contains("approved"));
        assert!(line.contains("logic  9 style  8"));
        assert!(line.contains("(1 rewrite)"));
    }

    #[test]
    fn test_overview_json() {
        let overview = overview();
        let value = overview_json(&overview, false);
        assert_eq!(value["completed"], 1);
        assert_eq!(value["words"], 1200);
        assert_eq!(value["chapters"][0]["label"], "Prologue");
        assert!(value["chapters"][0].get("notes").is_none());

        let detailed = overview_json(&overview, true);
        assert_eq!(
            detailed["chapters"][0]["notes"][0],
            "unresolved timeline (major): the tide"
        );
    }
}
