//! Outline Architect
//!
//! One bulk call produces the world bible, the chapter outline and the
//! three-act structure. A short outline is completed by a second, targeted
//! call for the missing chapter numbers only. Coherence findings are
//! attached as warnings and never fail the stage.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{info, warn};

use super::{AgentContext, StageAgent, StageCall, StageOutput, run_stage_call};
use crate::ai::{OutputSpec, PromptBuilder};
use crate::constants::agents::{ACT_RATIO_TOLERANCE, MIN_ARC_APPEARANCES, MIN_THREAD_REFERENCES};
use crate::novel::types::{
    ChapterOutline, OutlineResult, OutlineWarning, Project, Stage, ThreeActStructure,
    chapter_label, is_regular_chapter,
};
use crate::novel::world_bible::WorldBible;
use crate::types::{NovelError, Result, ValidationError, ValidationErrorKind, log_filter_warn};

const OUTLINE_SPEC: OutputSpec<'static> = OutputSpec {
    anchor: Some("outline"),
    required: &["outline"],
    arrays: &["outline"],
};

const OUTLINE_SCHEMA: &str = r#"{
  "world_bible": {
    "characters": [{"name": "", "role": "protagonist|antagonist|supporting", "description": "",
                    "immutable": {"eyes": "", "height": ""}, "resources": [], "skills": []}],
    "locations": [""],
    "world_rules": [""],
    "objects": [""],
    "timeline": [{"when": "", "event": ""}],
    "plot_threads": [{"name": "", "goal": ""}]
  },
  "three_act_structure": {"act_one": "", "act_two": "", "act_three": ""},
  "outline": [{"number": 1, "title": "", "summary": "", "key_event": "", "emotional_arc": "",
               "act": 1, "location": "", "temporal_notes": ""}]
}"#;

const COMPLETION_SCHEMA: &str = r#"{
  "outline": [{"number": 0, "title": "", "summary": "", "key_event": "", "emotional_arc": "",
               "act": 1, "location": "", "temporal_notes": ""}]
}"#;

/// Parsed first response, possibly short of chapters
#[derive(Debug, Clone)]
struct OutlineDraft {
    world_bible: WorldBible,
    structure: ThreeActStructure,
    chapters: BTreeMap<u32, ChapterOutline>,
}

pub struct OutlineAgent<'a> {
    project: &'a Project,
}

impl<'a> OutlineAgent<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    fn expected(&self) -> Vec<u32> {
        self.project.expected_chapter_numbers()
    }

    fn build_prompt(&self) -> String {
        let p = self.project;
        let numbers: Vec<String> = self.expected().iter().map(|n| n.to_string()).collect();
        let mut specials = Vec::new();
        if p.has_prologue {
            specials.push("prologue as chapter 0");
        }
        if p.has_epilogue {
            specials.push("epilogue as chapter 998");
        }
        if p.has_author_note {
            specials.push("author's note as chapter 999");
        }

        PromptBuilder::new()
            .context_item("Title", &p.title)
            .context_item("Genre", &p.genre)
            .context_item("Tone", &p.tone)
            .context_item("Regular chapters", p.chapter_count.to_string())
            .context_item("Special chapters", specials.join(", "))
            .section("Premise", &p.premise)
            .optional_section("Style Notes", p.style_notes.as_deref())
            .section(
                "Task",
                format!(
                    "Outline exactly these chapter numbers, each once: {}",
                    numbers.join(", ")
                ),
            )
            .json_output(OUTLINE_SCHEMA)
            .build()
    }

    fn parse_draft(&self, raw: &str, ctx: &AgentContext) -> Result<OutlineDraft> {
        let value = ctx.recovery.process(raw, &OUTLINE_SPEC)?.value;
        let expected: BTreeSet<u32> = self.expected().into_iter().collect();

        let world_bible = match value.get("world_bible") {
            Some(b) => serde_json::from_value(b.clone()).map_err(|e| {
                ValidationError::new(ValidationErrorKind::Format, e.to_string())
                    .with_field("world_bible")
            })?,
            // characters etc. at top level
            None => serde_json::from_value(value.clone()).unwrap_or_default(),
        };
        let structure = value
            .get("three_act_structure")
            .or_else(|| value.get("structure"))
            .and_then(|s| log_filter_warn(serde_json::from_value(s.clone()), "three-act structure"))
            .unwrap_or_default();
        let chapters = collect_chapters(&value, &expected);

        let ratio = chapters.len() as f64 / expected.len().max(1) as f64;
        if ratio < ctx.pipeline().completion_min_ratio {
            return Err(ValidationError::new(
                ValidationErrorKind::Range,
                "outline too short to complete",
            )
            .with_field("outline")
            .with_comparison(expected.len().to_string(), chapters.len().to_string())
            .into());
        }

        Ok(OutlineDraft {
            world_bible,
            structure,
            chapters,
        })
    }

    fn build_completion_prompt(&self, draft: &OutlineDraft, missing: &[u32]) -> String {
        let existing: Vec<String> = draft
            .chapters
            .values()
            .map(|c| format!("{}. {}: {}", chapter_label(c.number), c.title, c.summary))
            .collect();
        let missing_list: Vec<String> = missing.iter().map(|n| n.to_string()).collect();

        PromptBuilder::new()
            .context_item("Title", &self.project.title)
            .section("Premise", &self.project.premise)
            .section("World Bible", draft.world_bible.to_prompt_block())
            .section("Existing Chapters", existing.join("\n"))
            .section(
                "Task",
                format!(
                    "The outline is missing chapters {}. Write ONLY those chapters, \
                     consistent with the existing ones.",
                    missing_list.join(", ")
                ),
            )
            .json_output(COMPLETION_SCHEMA)
            .build()
    }

    fn missing(&self, chapters: &BTreeMap<u32, ChapterOutline>) -> Vec<u32> {
        self.expected()
            .into_iter()
            .filter(|n| !chapters.contains_key(n))
            .collect()
    }
}

#[async_trait::async_trait]
impl StageAgent for OutlineAgent<'_> {
    type Output = OutlineResult;

    fn stage(&self) -> Stage {
        Stage::Outline
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StageOutput<OutlineResult>> {
        let first = run_stage_call(
            ctx,
            StageCall {
                stage: Stage::Outline,
                chapter: None,
                user_prompt: self.build_prompt(),
                parse: Box::new(|raw| self.parse_draft(raw, ctx)),
                describe: Box::new(|d: &OutlineDraft| {
                    format!(
                        "{} chapters, {} characters, {} threads",
                        d.chapters.len(),
                        d.world_bible.characters.len(),
                        d.world_bible.plot_threads.len()
                    )
                }),
            },
        )
        .await?;

        let mut usage = first.usage;
        let mut attempts = first.attempts;
        let mut draft = first.value;
        let mut gap_filled = false;

        let missing = self.missing(&draft.chapters);
        if !missing.is_empty() {
            info!(
                "Outline missing {} of {} chapters, requesting completion",
                missing.len(),
                self.expected().len()
            );
            let wanted: BTreeSet<u32> = missing.iter().copied().collect();
            let completion = run_stage_call(
                ctx,
                StageCall {
                    stage: Stage::Outline,
                    chapter: None,
                    user_prompt: self.build_completion_prompt(&draft, &missing),
                    parse: Box::new(|raw| {
                        let value = ctx.recovery.process(raw, &OUTLINE_SPEC)?.value;
                        let found = collect_chapters(&value, &wanted);
                        if found.is_empty() {
                            return Err(ValidationError::missing_field("outline").into());
                        }
                        Ok(found)
                    }),
                    describe: Box::new(|found: &BTreeMap<u32, ChapterOutline>| {
                        format!("{} missing chapters supplied", found.len())
                    }),
                },
            )
            .await?;
            usage.add(&completion.usage);
            attempts += completion.attempts;
            draft.chapters.extend(completion.value);
            gap_filled = true;

            let still_missing = self.missing(&draft.chapters);
            if !still_missing.is_empty() {
                return Err(NovelError::stage(
                    Stage::Outline.label(),
                    None,
                    format!(
                        "outline still missing chapters {:?} after completion",
                        still_missing
                    ),
                ));
            }
        }

        let outline: Vec<ChapterOutline> = draft.chapters.into_values().collect();
        let warnings = check_coherence(&outline, &draft.world_bible);
        for w in &warnings {
            warn!("Outline warning: {}", w);
        }

        Ok(StageOutput {
            value: OutlineResult {
                world_bible: draft.world_bible,
                outline,
                structure: draft.structure,
                warnings,
                gap_filled,
            },
            usage,
            attempts,
        })
    }
}

/// Expected chapters from the `outline` array, first occurrence wins
fn collect_chapters(value: &Value, expected: &BTreeSet<u32>) -> BTreeMap<u32, ChapterOutline> {
    let mut chapters = BTreeMap::new();
    let Some(entries) = value.get("outline").and_then(Value::as_array) else {
        return chapters;
    };
    for entry in entries {
        let Some(chapter) = log_filter_warn(
            serde_json::from_value::<ChapterOutline>(entry.clone()),
            "Skipping malformed outline entry",
        ) else {
            continue;
        };
        if !expected.contains(&chapter.number) {
            warn!("Dropping unexpected outline chapter {}", chapter.number);
            continue;
        }
        chapters.entry(chapter.number).or_insert(chapter);
    }
    chapters
}

// =============================================================================
// Coherence Checks
// =============================================================================

fn keywords(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .filter(|w| !matches!(w.as_str(), "that" | "with" | "from" | "their" | "the"))
        .collect()
}

/// A name is mentioned when the full name, or at least half its keywords, appear
fn mentions(text: &str, name: &str) -> bool {
    let text = text.to_lowercase();
    let name_lc = name.trim().to_lowercase();
    if name_lc.is_empty() {
        return false;
    }
    if text.contains(&name_lc) {
        return true;
    }
    let words = keywords(&name_lc);
    if words.is_empty() {
        return false;
    }
    let hits = words.iter().filter(|w| text.contains(w.as_str())).count();
    hits * 2 >= words.len()
}

fn summary_text(c: &ChapterOutline) -> String {
    format!("{} {} {}", c.title, c.summary, c.key_event)
}

fn check_coherence(outline: &[ChapterOutline], bible: &WorldBible) -> Vec<OutlineWarning> {
    let mut warnings = Vec::new();
    let texts: Vec<String> = outline.iter().map(summary_text).collect();
    let count_mentions = |name: &str| texts.iter().filter(|t| mentions(t, name)).count();

    for thread in &bible.plot_threads {
        let references = count_mentions(&thread.name);
        if references < MIN_THREAD_REFERENCES {
            warnings.push(OutlineWarning::OrphanedSubplot {
                thread: thread.name.clone(),
                references,
            });
        }
    }

    let regular: Vec<&ChapterOutline> = outline
        .iter()
        .filter(|c| is_regular_chapter(c.number))
        .collect();
    let mut acts = [0usize; 3];
    for c in &regular {
        if let Some(act @ 1..=3) = c.act {
            acts[act as usize - 1] += 1;
        }
    }
    let assigned: usize = acts.iter().sum();
    if assigned > 0 {
        let pct = acts.map(|n| ((n as f64 / assigned as f64) * 100.0).round() as u32);
        let target = [25.0, 50.0, 25.0];
        let off = pct
            .iter()
            .zip(target)
            .any(|(p, t)| (*p as f64 - t).abs() > ACT_RATIO_TOLERANCE);
        if off {
            warnings.push(OutlineWarning::UnbalancedStructure { act_percentages: pct });
        }
    }

    let needed = MIN_ARC_APPEARANCES.min(regular.len());
    for lead in [bible.protagonist(), bible.antagonist()].into_iter().flatten() {
        let appearances = count_mentions(&lead.name);
        if appearances < needed {
            warnings.push(OutlineWarning::IncompleteArc {
                character: lead.name.clone(),
                appearances,
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::ai::provider::mock::MockProvider;
    use crate::novel::types::NewProject;
    use serde_json::json;
    use std::sync::Arc;

    fn project(count: u32, prologue: bool, epilogue: bool) -> Project {
        Project::from_request(NewProject {
            title: "Salt Road".into(),
            premise: "A smuggler inherits a ledger that names every corrupt harbor official".into(),
            genre: "mystery".into(),
            tone: "tense".into(),
            chapter_count: count,
            has_prologue: prologue,
            has_epilogue: epilogue,
            has_author_note: false,
            style_notes: None,
        })
    }

    fn entry(n: u32) -> Value {
        let act = if n <= 3 { 1 } else if n <= 9 { 2 } else { 3 };
        json!({
            "number": n,
            "title": format!("Chapter {}", n),
            "summary": format!("Mara follows the ledger while Voss closes in ({})", n),
            "act": act,
        })
    }

    fn response(numbers: impl IntoIterator<Item = u32>) -> String {
        json!({
            "world_bible": {
                "characters": [
                    {"name": "Mara", "role": "protagonist", "immutable": {"eyes": "grey"}},
                    {"name": "Voss", "role": "antagonist"}
                ],
                "plot_threads": [{"name": "The Ledger", "goal": "decode it"}]
            },
            "three_act_structure": {
                "act_one": "inheritance", "act_two": "hunt", "act_three": "exposure"
            },
            "outline": numbers.into_iter().map(entry).collect::<Vec<_>>()
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_full_outline_with_special_chapters() {
        let p = project(12, true, true);
        let mut numbers: Vec<u32> = (1..=12).collect();
        numbers.extend([0, 998]);
        let provider = Arc::new(MockProvider::scripted(vec![Ok(format!(
            "```json\n{}\n```",
            response(numbers)
        ))]));
        let ctx = context(provider.clone());

        let out = OutlineAgent::new(&p).run(&ctx).await.unwrap();
        let got: Vec<u32> = out.value.outline.iter().map(|c| c.number).collect();
        let mut want: Vec<u32> = vec![0];
        want.extend(1..=12);
        want.push(998);
        assert_eq!(got, want);
        assert_eq!(
            out.value.outline.iter().filter(|c| is_regular_chapter(c.number)).count(),
            12
        );
        assert!(!out.value.gap_filled);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gap_filling_requests_only_missing() {
        let p = project(8, false, false);
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(response([1, 2, 3, 3, 5, 6, 42])),
            Ok(json!({"outline": [entry(4), entry(7), entry(8), entry(2)]}).to_string()),
        ]));
        let ctx = context(provider.clone());

        let out = OutlineAgent::new(&p).run(&ctx).await.unwrap();
        let got: Vec<u32> = out.value.outline.iter().map(|c| c.number).collect();
        assert_eq!(got, (1..=8).collect::<Vec<_>>());
        assert!(out.value.gap_filled);
        assert_eq!(out.attempts, 2);

        let completion = &provider.requests()[1].user_prompt;
        assert!(completion.contains("missing chapters 4, 7, 8"));
    }

    #[tokio::test]
    async fn test_truncated_outline_recovered_then_completed() {
        let p = project(8, false, false);
        let entries: Vec<String> = (1..=5).map(|n| entry(n).to_string()).collect();
        // output cut off partway through chapter 6
        let truncated = format!(
            r#"{{"world_bible": {{"characters": [{{"name": "Mara", "role": "protagonist"}}],
                "plot_threads": [{{"name": "The Ledger", "goal": "decode it"}}]}},
              "three_act_structure": {{"act_one": "inheritance", "act_two": "hunt",
                                      "act_three": "exposure"}},
              "outline": [{}, {{"number": 6, "title": "The Cust"#,
            entries.join(",\n")
        );
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(truncated),
            Ok(json!({"outline": [entry(6), entry(7), entry(8)]}).to_string()),
        ]));
        let ctx = context(provider.clone());

        let out = OutlineAgent::new(&p).run(&ctx).await.unwrap();
        let got: Vec<u32> = out.value.outline.iter().map(|c| c.number).collect();
        assert_eq!(got, (1..=8).collect::<Vec<_>>());
        assert!(out.value.gap_filled);
        assert_eq!(out.value.world_bible.characters.len(), 1);
        assert_eq!(provider.call_count(), 2);

        let completion = &provider.requests()[1].user_prompt;
        assert!(completion.contains("missing chapters 6, 7, 8"));
        assert!(completion.contains("Chapter 5"));
    }

    #[tokio::test]
    async fn test_too_short_outline_retries_then_fails() {
        let p = project(12, false, false);
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(response([1])),
            Ok(response([1, 2])),
        ]));
        let ctx = context(provider.clone());
        let err = OutlineAgent::new(&p).run(&ctx).await.unwrap_err();
        assert!(matches!(err, NovelError::Stage { .. }));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unfilled_gap_is_hard_failure() {
        let p = project(4, false, false);
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(response([1, 2, 3])),
            Ok(json!({"outline": [entry(3)]}).to_string()),
            Ok(json!({"outline": [entry(2)]}).to_string()),
        ]));
        let ctx = context(provider.clone());
        assert!(OutlineAgent::new(&p).run(&ctx).await.is_err());
    }

    #[test]
    fn test_coherence_warnings() {
        let bible: WorldBible = serde_json::from_value(json!({
            "characters": [
                {"name": "Mara Quell", "role": "protagonist"},
                {"name": "Voss", "role": "antagonist"}
            ],
            "plot_threads": [
                {"name": "The Ledger"},
                {"name": "Lighthouse Keeper's Debt"}
            ]
        }))
        .unwrap();
        let outline: Vec<ChapterOutline> = (1..=4)
            .map(|n| {
                serde_json::from_value(json!({
                    "number": n,
                    "summary": "Mara reads the ledger by candlelight",
                    "act": if n == 1 { 1 } else { 2 },
                }))
                .unwrap()
            })
            .collect();

        let warnings = check_coherence(&outline, &bible);
        assert!(warnings.contains(&OutlineWarning::OrphanedSubplot {
            thread: "Lighthouse Keeper's Debt".into(),
            references: 0
        }));
        assert!(!warnings.iter().any(|w| matches!(
            w,
            OutlineWarning::OrphanedSubplot { thread, .. } if thread == "The Ledger"
        )));
        assert!(warnings.contains(&OutlineWarning::IncompleteArc {
            character: "Voss".into(),
            appearances: 0
        }));
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, OutlineWarning::UnbalancedStructure { .. }))
        );
    }

    #[test]
    fn test_mentions_by_keywords() {
        assert!(mentions("Mara Quell boards the ship", "Mara Quell"));
        assert!(mentions("quell hides the key", "Mara Quell"));
        assert!(!mentions("the harbor sleeps", "Mara Quell"));
    }
}
