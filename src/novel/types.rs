//! Novel Pipeline Types
//!
//! Projects, chapters, scenes and the typed results of each stage.
//!
//! ## Sections
//!
//! - Stage identity (`Stage`)
//! - Project lifecycle (`ProjectStatus`, `ControlRequest`, `Project`, `NewProject`)
//! - Chapter state (`ChapterStep`, `ChapterStatus`, `Chapter`, `SceneRecord`)
//! - Stage results (outline, scene plan, audit, editor, summary, pacing)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::world_bible::{PlotThread, ThreadStatus, WorldBible};
use crate::constants::{agents, chapters};
use crate::novel::patch::Patch;
use crate::types::{NovelError, ParseWithDefault, ProjectId, Result, TokenUsage};

// =============================================================================
// Stages
// =============================================================================

/// The seven stage agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Outline,
    ScenePlanner,
    SceneWriter,
    Auditor,
    Editor,
    Summarizer,
    Pacing,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Outline,
        Stage::ScenePlanner,
        Stage::SceneWriter,
        Stage::Auditor,
        Stage::Editor,
        Stage::Summarizer,
        Stage::Pacing,
    ];

    /// Key used for config overrides and prompt files
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Outline => "outline",
            Stage::ScenePlanner => "scene_planner",
            Stage::SceneWriter => "scene_writer",
            Stage::Auditor => "auditor",
            Stage::Editor => "editor",
            Stage::Summarizer => "summarizer",
            Stage::Pacing => "pacing",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Outline => "Outline Architect",
            Stage::ScenePlanner => "Scene Planner",
            Stage::SceneWriter => "Scene Writer",
            Stage::Auditor => "Consistency Auditor",
            Stage::Editor => "Style Editor",
            Stage::Summarizer => "Summarizer",
            Stage::Pacing => "Pacing Director",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Project Lifecycle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Idle,
    Generating,
    Paused,
    Cancelled,
    Error,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Paused | Self::Cancelled | Self::Error)
    }

    /// `generating` with no live run here: the process that owned it died
    pub fn is_abandoned(&self, running_here: bool) -> bool {
        matches!(self, Self::Generating) && !running_here
    }

    pub fn can_archive(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Idle)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParseWithDefault for ProjectStatus {
    fn type_name() -> &'static str {
        "ProjectStatus"
    }

    fn default_value() -> Self {
        Self::Error
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "generating" => Some(Self::Generating),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            "error" => Some(Self::Error),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Cooperative stop request persisted on the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    Pause,
    Cancel,
}

impl ControlRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pause" => Some(Self::Pause),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Status a stopped run ends in
    pub fn resulting_status(&self) -> ProjectStatus {
        match self {
            Self::Pause => ProjectStatus::Paused,
            Self::Cancel => ProjectStatus::Cancelled,
        }
    }
}

/// Request to create a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub premise: String,
    pub genre: String,
    pub tone: String,
    pub chapter_count: u32,
    pub has_prologue: bool,
    pub has_epilogue: bool,
    pub has_author_note: bool,
    pub style_notes: Option<String>,
}

impl NewProject {
    pub fn validate(&self) -> Result<()> {
        if self.premise.trim().is_empty() {
            return Err(NovelError::Config("premise must not be empty".to_string()));
        }
        if self.chapter_count == 0 || self.chapter_count > chapters::MAX_REGULAR {
            return Err(NovelError::Config(format!(
                "chapter count must be between 1 and {}, got {}",
                chapters::MAX_REGULAR,
                self.chapter_count
            )));
        }
        Ok(())
    }
}

/// A manuscript in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub premise: String,
    pub genre: String,
    pub tone: String,
    pub chapter_count: u32,
    pub has_prologue: bool,
    pub has_epilogue: bool,
    pub has_author_note: bool,
    pub style_notes: Option<String>,
    pub status: ProjectStatus,
    pub error_reason: Option<String>,
    pub control_request: Option<ControlRequest>,
    /// Latest pacing directive, injected into scene planning
    pub pacing_directive: Option<String>,
    pub pacing_reviews_done: u32,
    /// Advisory findings from the outline stage
    pub outline_warnings: Vec<OutlineWarning>,
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_request(request: NewProject) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::generate(),
            title: request.title,
            premise: request.premise,
            genre: request.genre,
            tone: request.tone,
            chapter_count: request.chapter_count,
            has_prologue: request.has_prologue,
            has_epilogue: request.has_epilogue,
            has_author_note: request.has_author_note,
            style_notes: request.style_notes,
            status: ProjectStatus::Idle,
            error_reason: None,
            control_request: None,
            pacing_directive: None,
            pacing_reviews_done: 0,
            outline_warnings: Vec::new(),
            usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Every chapter number the outline must contain, ascending
    pub fn expected_chapter_numbers(&self) -> Vec<u32> {
        let mut numbers = Vec::with_capacity(self.chapter_count as usize + 3);
        if self.has_prologue {
            numbers.push(chapters::PROLOGUE);
        }
        numbers.extend(1..=self.chapter_count);
        if self.has_epilogue {
            numbers.push(chapters::EPILOGUE);
        }
        if self.has_author_note {
            numbers.push(chapters::AUTHOR_NOTE);
        }
        numbers
    }

    pub fn total_chapters(&self) -> usize {
        self.expected_chapter_numbers().len()
    }
}

/// Display label for a chapter number
pub fn chapter_label(number: u32) -> String {
    match number {
        chapters::PROLOGUE => "Prologue".to_string(),
        chapters::EPILOGUE => "Epilogue".to_string(),
        chapters::AUTHOR_NOTE => "Author's Note".to_string(),
        n => format!("Chapter {}", n),
    }
}

pub fn is_regular_chapter(number: u32) -> bool {
    !matches!(
        number,
        chapters::PROLOGUE | chapters::EPILOGUE | chapters::AUTHOR_NOTE
    )
}

// =============================================================================
// Chapter State
// =============================================================================

/// Durable checkpoint: the last step whose output is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStep {
    #[default]
    Pending = 0,
    Planned = 1,
    Written = 2,
    Audited = 3,
    Edited = 4,
    Summarized = 5,
}

impl ChapterStep {
    pub const COUNT: u8 = 6;

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Planned),
            2 => Some(Self::Written),
            3 => Some(Self::Audited),
            4 => Some(Self::Edited),
            5 => Some(Self::Summarized),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::Written => "written",
            Self::Audited => "audited",
            Self::Edited => "edited",
            Self::Summarized => "summarized",
        }
    }

    /// Stage that produces the next step
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Stage::ScenePlanner),
            Self::Planned => Some(Stage::SceneWriter),
            Self::Written => Some(Stage::Auditor),
            Self::Audited => Some(Stage::Editor),
            Self::Edited => Some(Stage::Summarizer),
            Self::Summarized => None,
        }
    }
}

impl ParseWithDefault for ChapterStep {
    fn type_name() -> &'static str {
        "ChapterStep"
    }

    fn default_value() -> Self {
        Self::Pending
    }

    fn try_parse(s: &str) -> Option<Self> {
        (0..Self::COUNT)
            .filter_map(Self::from_u8)
            .find(|step| step.as_str() == s)
    }
}

/// Chapter lifecycle as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    #[default]
    Pending,
    Planning,
    Writing,
    Editing,
    Revision,
    Completed,
    Approved,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Writing => "writing",
            Self::Editing => "editing",
            Self::Revision => "revision",
            Self::Completed => "completed",
            Self::Approved => "approved",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Approved)
    }
}

impl ParseWithDefault for ChapterStatus {
    fn type_name() -> &'static str {
        "ChapterStatus"
    }

    fn default_value() -> Self {
        Self::Pending
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "planning" => Some(Self::Planning),
            "writing" => Some(Self::Writing),
            "editing" => Some(Self::Editing),
            "revision" => Some(Self::Revision),
            "completed" => Some(Self::Completed),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// A generated chapter and its committed progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub project_id: ProjectId,
    pub number: u32,
    pub outline: ChapterOutline,
    pub step: ChapterStep,
    pub status: ChapterStatus,
    pub plan: Option<ChapterPlan>,
    /// Assembled chapter text, present from the `Written` step on
    pub content: Option<String>,
    pub audit: Option<AuditReport>,
    pub summary: Option<String>,
    pub logic_score: Option<u8>,
    pub style_score: Option<u8>,
    pub approved: bool,
    pub rewrites: u32,
    /// Corrections that could not be applied, kept for the author
    pub notes: Vec<String>,
    pub word_count: usize,
}

impl Chapter {
    pub fn from_outline(project_id: ProjectId, outline: ChapterOutline) -> Self {
        Self {
            project_id,
            number: outline.number,
            outline,
            step: ChapterStep::Pending,
            status: ChapterStatus::Pending,
            plan: None,
            content: None,
            audit: None,
            summary: None,
            logic_score: None,
            style_score: None,
            approved: false,
            rewrites: 0,
            notes: Vec::new(),
            word_count: 0,
        }
    }

    pub fn label(&self) -> String {
        chapter_label(self.number)
    }

    /// Quality score: mean of logic and style
    pub fn quality_score(&self) -> Option<f32> {
        match (self.logic_score, self.style_score) {
            (Some(l), Some(s)) => Some((l as f32 + s as f32) / 2.0),
            _ => None,
        }
    }
}

/// One committed scene
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneRecord {
    pub chapter: u32,
    pub number: u32,
    pub text: String,
    pub word_count: usize,
    pub suspected_truncation: bool,
}

/// Join scene texts into chapter content
pub fn assemble_chapter(scenes: &[SceneRecord]) -> String {
    scenes
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// Lenient Deserialization
// =============================================================================

/// Models emit numbers as strings and strings as numbers; accept both.
pub(crate) mod lenient {
    use super::*;
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        })
    }

    pub fn string_vec<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::String(s) if s.trim().is_empty() => Vec::new(),
            Value::String(s) => s
                .split([',', ';'])
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    Value::Object(map) => map
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(String::from)
                        .or_else(|| Some(Value::Object(map).to_string())),
                    other => Some(other.to_string()),
                })
                .collect(),
            other => vec![other.to_string()],
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
        let v = Value::deserialize(d)?;
        parse_number(&v).ok_or_else(|| serde::de::Error::custom(format!("not a number: {}", v)))
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<u32>, D::Error> {
        Ok(parse_number(&Value::deserialize(d)?))
    }

    /// Score on a 1..=10 scale
    pub fn score<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u8, D::Error> {
        let v = Value::deserialize(d)?;
        let raw = match &v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s
                .split('/')
                .next()
                .and_then(|p| p.trim().parse::<f64>().ok()),
            _ => None,
        }
        .ok_or_else(|| serde::de::Error::custom(format!("not a score: {}", v)))?;
        Ok(raw.round().clamp(1.0, 10.0) as u8)
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::String(s) => matches!(
                s.trim().to_lowercase().as_str(),
                "true" | "yes" | "approved" | "approve"
            ),
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        })
    }

    fn parse_number(v: &Value) -> Option<u32> {
        match v {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u32)),
            Value::String(s) => {
                let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            }
            _ => None,
        }
    }
}

// =============================================================================
// Outline
// =============================================================================

/// One planned chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOutline {
    #[serde(deserialize_with = "lenient::number")]
    pub number: u32,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub key_event: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub emotional_arc: String,
    /// Narrative act, 1..=3
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub act: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub temporal_notes: String,
}

/// Three-act structure descriptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeActStructure {
    #[serde(default, alias = "act1", alias = "act_i", deserialize_with = "lenient::string")]
    pub act_one: String,
    #[serde(default, alias = "act2", alias = "act_ii", deserialize_with = "lenient::string")]
    pub act_two: String,
    #[serde(default, alias = "act3", alias = "act_iii", deserialize_with = "lenient::string")]
    pub act_three: String,
}

/// Advisory finding attached to an accepted outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutlineWarning {
    OrphanedSubplot { thread: String, references: usize },
    UnbalancedStructure { act_percentages: [u32; 3] },
    IncompleteArc { character: String, appearances: usize },
}

impl std::fmt::Display for OutlineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanedSubplot { thread, references } => write!(
                f,
                "orphaned subplot: '{}' referenced in {} chapter summaries",
                thread, references
            ),
            Self::UnbalancedStructure { act_percentages: [a, b, c] } => write!(
                f,
                "unbalanced structure: acts are {}/{}/{} (target 25/50/25)",
                a, b, c
            ),
            Self::IncompleteArc {
                character,
                appearances,
            } => write!(
                f,
                "incomplete arc: '{}' appears in {} chapter summaries",
                character, appearances
            ),
        }
    }
}

/// Accepted Outline Architect output
#[derive(Debug, Clone)]
pub struct OutlineResult {
    pub world_bible: WorldBible,
    /// Ascending by chapter number, exactly the expected numbers
    pub outline: Vec<ChapterOutline>,
    pub structure: ThreeActStructure,
    pub warnings: Vec<OutlineWarning>,
    /// Whether a completion call filled gaps
    pub gap_filled: bool,
}

// =============================================================================
// Scene Plans
// =============================================================================

/// One planned scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlan {
    #[serde(default, deserialize_with = "lenient::number")]
    pub number: u32,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub characters: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub setting: String,
    #[serde(default, alias = "beat", deserialize_with = "lenient::string")]
    pub plot_beat: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub emotional_beat: String,
    #[serde(default, alias = "sensory", deserialize_with = "lenient::string")]
    pub sensory_notes: String,
    #[serde(default, alias = "hook", deserialize_with = "lenient::string")]
    pub ending_hook: String,
    #[serde(
        default = "default_scene_words",
        alias = "word_count",
        deserialize_with = "lenient::number"
    )]
    pub target_words: u32,
}

fn default_scene_words() -> u32 {
    agents::DEFAULT_SCENE_WORDS
}

impl ScenePlan {
    /// Free text describing the scene's action, used for classification
    pub fn action_text(&self) -> String {
        format!("{} {} {}", self.plot_beat, self.emotional_beat, self.ending_hook)
    }
}

/// Scene Planner output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub scenes: Vec<ScenePlan>,
    #[serde(default, alias = "chapter_hook", deserialize_with = "lenient::string")]
    pub closing_hook: String,
}

// =============================================================================
// Audit
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PlotHole,
    Contradiction,
    InformationGap,
    WorldBibleViolation,
    MissingSetup,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Minor,
    Major,
    Critical,
}

/// One issue raised by the Consistency Auditor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditIssue {
    #[serde(alias = "type", deserialize_with = "issue_kind")]
    pub kind: IssueKind,
    #[serde(default, deserialize_with = "severity")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    /// Exact text to replace
    #[serde(default)]
    pub original: Option<String>,
    /// Suggested correction
    #[serde(default)]
    pub replacement: Option<String>,
}

impl AuditIssue {
    /// The issue as a patch, when it carries an exact correction
    pub fn as_patch(&self) -> Option<Patch> {
        match (&self.original, &self.replacement) {
            (Some(original), Some(replacement)) if !original.is_empty() => Some(Patch {
                original: original.clone(),
                replacement: replacement.clone(),
                reason: self.description.clone(),
            }),
            _ => None,
        }
    }
}

fn issue_kind<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<IssueKind, D::Error> {
    let raw = lenient::string(d)?;
    let key = raw.trim().to_lowercase().replace([' ', '-'], "_");
    Ok(match key.as_str() {
        "plot_hole" => IssueKind::PlotHole,
        "contradiction" | "continuity_error" => IssueKind::Contradiction,
        "information_gap" | "info_gap" => IssueKind::InformationGap,
        "world_bible_violation" | "bible_violation" => IssueKind::WorldBibleViolation,
        "missing_setup" => IssueKind::MissingSetup,
        _ => IssueKind::Other,
    })
}

fn severity<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Severity, D::Error> {
    let raw = lenient::string(d)?;
    Ok(match raw.trim().to_lowercase().as_str() {
        "critical" | "critica" | "crítica" | "high" => Severity::Critical,
        "major" | "mayor" | "medium" => Severity::Major,
        _ => Severity::Minor,
    })
}

/// Consistency Auditor output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    #[serde(default)]
    pub issues: Vec<AuditIssue>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub approved: bool,
}

impl AuditReport {
    pub fn requires_correction(&self) -> bool {
        !self.approved || self.issues.iter().any(|i| i.severity >= Severity::Major)
    }
}

// =============================================================================
// Editor
// =============================================================================

/// Style Editor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorReport {
    #[serde(deserialize_with = "lenient::score")]
    pub logic_score: u8,
    #[serde(deserialize_with = "lenient::score")]
    pub style_score: u8,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub approved: bool,
    #[serde(default)]
    pub patches: Vec<Patch>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub notes: String,
}

/// Editor decision, a pure function of the two scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorVerdict {
    Approve,
    Patch,
    Rewrite,
}

impl EditorVerdict {
    /// Both scores strictly above `approve_above` approve; either strictly
    /// below `rewrite_below` rewrites; anything else patches.
    pub fn from_scores(logic: u8, style: u8, approve_above: u8, rewrite_below: u8) -> Self {
        if logic < rewrite_below || style < rewrite_below {
            Self::Rewrite
        } else if logic > approve_above && style > approve_above {
            Self::Approve
        } else {
            Self::Patch
        }
    }
}

// =============================================================================
// Summary & Pacing
// =============================================================================

/// Summarizer output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    #[serde(deserialize_with = "lenient::string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ending_location: String,
}

/// Thread status change proposed by the Pacing Director
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    #[serde(alias = "thread", deserialize_with = "lenient::string")]
    pub name: String,
    pub status: ThreadStatus,
}

/// Pacing Director output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingReport {
    #[serde(default, alias = "pacing", deserialize_with = "lenient::string")]
    pub assessment: String,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub forgotten_threads: Vec<String>,
    #[serde(deserialize_with = "lenient::score")]
    pub tension_level: u8,
    #[serde(deserialize_with = "lenient::string")]
    pub directive: String,
    #[serde(default)]
    pub thread_updates: Vec<ThreadUpdate>,
}

impl PacingReport {
    /// Apply status updates to known threads; unknown names are ignored
    pub fn apply_to(&self, threads: &mut [PlotThread], chapter: u32) -> usize {
        let mut changed = 0;
        for update in &self.thread_updates {
            if let Some(t) = threads
                .iter_mut()
                .find(|t| t.name.eq_ignore_ascii_case(update.name.trim()))
                && t.status != update.status
            {
                t.status = update.status;
                t.last_updated_chapter = chapter;
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(count: u32) -> NewProject {
        NewProject {
            title: "The Salt Road".to_string(),
            premise: "A smuggler inherits a ledger".to_string(),
            genre: "mystery".to_string(),
            tone: "tense".to_string(),
            chapter_count: count,
            has_prologue: true,
            has_epilogue: true,
            has_author_note: false,
            style_notes: None,
        }
    }

    #[test]
    fn test_expected_chapter_numbers() {
        let project = Project::from_request(request(3));
        assert_eq!(project.expected_chapter_numbers(), vec![0, 1, 2, 3, 998]);
        assert_eq!(project.total_chapters(), 5);
    }

    #[test]
    fn test_new_project_validation() {
        assert!(request(12).validate().is_ok());
        assert!(request(0).validate().is_err());
        let mut r = request(3);
        r.premise = "  ".to_string();
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_status_guards() {
        assert!(ProjectStatus::Idle.can_start());
        assert!(!ProjectStatus::Paused.can_start());
        for s in [ProjectStatus::Paused, ProjectStatus::Cancelled, ProjectStatus::Error] {
            assert!(s.can_resume());
        }
        assert!(!ProjectStatus::Generating.can_resume());
        assert!(!ProjectStatus::Completed.can_resume());
        assert!(ProjectStatus::Completed.can_archive());
        assert!(!ProjectStatus::Generating.can_archive());
    }

    #[test]
    fn test_editor_verdict_policy() {
        let v = |l, s| EditorVerdict::from_scores(l, s, 8, 5);
        assert_eq!(v(9, 9), EditorVerdict::Approve);
        assert_eq!(v(6, 9), EditorVerdict::Patch);
        assert_eq!(v(3, 9), EditorVerdict::Rewrite);
        assert_eq!(v(8, 8), EditorVerdict::Patch);
        assert_eq!(v(5, 10), EditorVerdict::Patch);
        assert_eq!(v(10, 4), EditorVerdict::Rewrite);
        assert_eq!(v(9, 8), EditorVerdict::Patch);
    }

    #[test]
    fn test_chapter_step_order_and_parse() {
        assert!(ChapterStep::Edited > ChapterStep::Audited);
        assert_eq!(ChapterStep::parse_or_default("edited"), ChapterStep::Edited);
        assert_eq!(ChapterStep::parse_or_default("bogus"), ChapterStep::Pending);
        assert_eq!(ChapterStep::Edited.next_stage(), Some(Stage::Summarizer));
        assert_eq!(ChapterStep::Summarized.next_stage(), None);
        for i in 0..ChapterStep::COUNT {
            assert_eq!(ChapterStep::from_u8(i).unwrap().as_u8(), i);
        }
    }

    #[test]
    fn test_lenient_outline_entry() {
        let entry: ChapterOutline = serde_json::from_value(serde_json::json!({
            "number": "Chapter 4",
            "title": "The Ledger",
            "act": 2.0,
            "summary": ["Mara opens the ledger", "finds a name"]
        }))
        .unwrap();
        assert_eq!(entry.number, 4);
        assert_eq!(entry.act, Some(2));
        assert_eq!(entry.summary, "Mara opens the ledger; finds a name");
        assert_eq!(entry.key_event, "");
    }

    #[test]
    fn test_lenient_editor_report() {
        let report: EditorReport = serde_json::from_value(serde_json::json!({
            "logic_score": "7/10",
            "style_score": 11,
            "approved": "no"
        }))
        .unwrap();
        assert_eq!(report.logic_score, 7);
        assert_eq!(report.style_score, 10);
        assert!(!report.approved);
        assert!(report.patches.is_empty());
    }

    #[test]
    fn test_audit_issue_kinds() {
        let issue: AuditIssue = serde_json::from_value(serde_json::json!({
            "type": "Plot Hole",
            "severity": "CRITICAL",
            "description": "the key vanishes",
            "original": "She had no key.",
            "replacement": "She had the brass key."
        }))
        .unwrap();
        assert_eq!(issue.kind, IssueKind::PlotHole);
        assert_eq!(issue.severity, Severity::Critical);
        assert!(issue.as_patch().is_some());
    }

    #[test]
    fn test_scene_plan_defaults() {
        let plan: ScenePlan = serde_json::from_value(serde_json::json!({
            "number": 1,
            "characters": "Mara, Tomas",
            "setting": "the docks"
        }))
        .unwrap();
        assert_eq!(plan.characters, vec!["Mara", "Tomas"]);
        assert_eq!(plan.target_words, agents::DEFAULT_SCENE_WORDS);
    }

    #[test]
    fn test_chapter_labels() {
        assert_eq!(chapter_label(0), "Prologue");
        assert_eq!(chapter_label(7), "Chapter 7");
        assert_eq!(chapter_label(998), "Epilogue");
        assert!(!is_regular_chapter(999));
        assert!(is_regular_chapter(1));
    }
}
