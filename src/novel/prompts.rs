//! Stage System Prompts
//!
//! Built-in system prompts per stage. A prompts directory may override any of
//! them with `<dir>/<stage>.md`. User prompts are assembled by the agents.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use super::types::Stage;
use crate::ai::PromptBuilder;
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct PromptLibrary {
    system: HashMap<Stage, String>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let system = Stage::ALL
            .iter()
            .map(|stage| (*stage, builtin_system_prompt(*stage)))
            .collect();
        Self { system }
    }

    /// Built-ins overlaid with `<dir>/<stage>.md` where present
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut library = Self::builtin();
        let Some(dir) = dir else {
            return Ok(library);
        };
        if !dir.is_dir() {
            debug!("Prompt directory {} not found, using built-ins", dir.display());
            return Ok(library);
        }
        for stage in Stage::ALL {
            let path = dir.join(format!("{}.md", stage.name()));
            if path.is_file() {
                let text = std::fs::read_to_string(&path)?;
                if !text.trim().is_empty() {
                    info!(
                        "Using prompt override for {} from {}",
                        stage.label(),
                        path.display()
                    );
                    library.system.insert(stage, text);
                }
            }
        }
        Ok(library)
    }

    pub fn system(&self, stage: Stage) -> &str {
        self.system.get(&stage).map(String::as_str).unwrap_or_default()
    }
}

fn builtin_system_prompt(stage: Stage) -> String {
    let task = "a long-form fiction manuscript";
    match stage {
        Stage::Outline => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Create the world bible: characters with immutable physical traits, locations, \
                 world rules, established objects, a dated timeline and plot threads",
                "Outline every requested chapter with title, summary, key event, emotional arc, \
                 act, location and temporal notes",
                "Balance the three acts at roughly 25/50/25 of the chapters",
                "Reference every plot thread in at least two chapter summaries and name the \
                 protagonist and antagonist in at least three",
            ])
            .focus(
                "the structured plan, never prose",
                vec![
                    "Number chapters exactly as requested",
                    "Keep every summary to one paragraph",
                ],
            )
            .build(),
        Stage::ScenePlanner => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Break one chapter into three or four scenes",
                "Connect the first scene to the end of the previous chapter",
                "Give the last scene the strongest hook",
                "Vary scene structure against the constraints you are given",
            ])
            .focus(
                "scene plans, never prose",
                vec!["Stay within the chapter outline", "Respect every world bible fact"],
            )
            .build(),
        Stage::SceneWriter => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Write the prose for exactly one scene from its plan",
                "Continue seamlessly from the preceding text",
                "Honor every established fact about characters and the world",
            ])
            .focus(
                "the prose of this one scene",
                vec![
                    "Do NOT start the next scene",
                    "Do NOT end the chapter or add headings",
                    "Do NOT summarize what happened",
                ],
            )
            .build(),
        Stage::Auditor => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Find plot holes, contradictions, information gaps, world bible violations and \
                 missing setups",
                "Rate each issue critical, major or minor",
                "Quote the exact original text and give an exact replacement when a local fix \
                 exists",
            ])
            .focus(
                "factual consistency, never style",
                vec!["Quote original text verbatim", "Approve when nothing major is wrong"],
            )
            .build(),
        Stage::Editor => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Score narrative logic from 1 to 10",
                "Score prose style from 1 to 10",
                "Propose exact-text patches for the weakest passages",
            ])
            .focus(
                "scores and exact patches",
                vec![
                    "Each patch quotes at least 20 characters that occur exactly once in the \
                     chapter",
                    "Do NOT rewrite the whole chapter",
                ],
            )
            .build(),
        Stage::Summarizer => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Record events, state changes, object transfers, relationship changes and \
                 revelations",
                "Record where the chapter ends",
            ])
            .focus(
                "dense facts",
                vec![
                    "No atmosphere or decorative dialogue",
                    "At most 200 words",
                ],
            )
            .build(),
        Stage::Pacing => PromptBuilder::new()
            .role(stage.label(), task)
            .objectives(vec![
                "Assess momentum over the recent chapters",
                "List plot threads that have been forgotten",
                "Rate the current tension from 1 to 10",
                "Give one concrete directive for the next chapters",
                "Propose thread status changes",
            ])
            .build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prompts_carry_stage_label() {
        let library = PromptLibrary::builtin();
        for stage in Stage::ALL {
            assert!(library.system(stage).contains(stage.label()), "{}", stage);
        }
        let writer = library.system(Stage::SceneWriter);
        assert!(!writer.contains(Stage::ScenePlanner.label()));
    }

    #[test]
    fn test_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("summarizer.md"), "Summarize tersely.").unwrap();
        std::fs::write(dir.path().join("editor.md"), "   ").unwrap();

        let library = PromptLibrary::load(Some(dir.path())).unwrap();
        assert_eq!(library.system(Stage::Summarizer), "Summarize tersely.");
        let editor = library.system(Stage::Editor);
        assert!(editor.contains(Stage::Editor.label()));
    }

    #[test]
    fn test_missing_directory_falls_back() {
        let library = PromptLibrary::load(Some(Path::new("/nonexistent/prompts"))).unwrap();
        assert!(library.system(Stage::Outline).contains("Outline Architect"));
    }
}
