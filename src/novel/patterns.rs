//! Pattern Tracker
//!
//! Per-project history of structural choices, used to steer the Scene Planner
//! away from repeating itself. Advisory only: nothing here rejects output.
//!
//! ## Classification
//! Ordered keyword registries, compiled once into case-insensitive regexes.
//! The first matching rule wins.
//!
//! ## Analysis
//! For chapter `n`, only chapters before `n` are considered:
//! - a scene type or info method used in at least `max(3, ceil(30% of prior
//!   chapters))` chapters is overused
//! - the same opening, closing or full scene-type sequence in the last two
//!   chapters goes on the avoid-list
//! - the anonymous tip is prohibited once used
//! - weather, travel and phone-call tropes are flagged at two uses within the
//!   last five chapters

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::types::ChapterPlan;
use crate::constants::patterns as limits;

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Action,
    Dialogue,
    Investigation,
    Discovery,
    Confrontation,
    Interrogation,
    Infiltration,
    Reflection,
    Transition,
    Revelation,
    Planning,
    Suspense,
    Climax,
    Aftermath,
    Romantic,
    Setup,
    Payoff,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoMethod {
    Deduction,
    Interrogation,
    Surveillance,
    DocumentSearch,
    DigitalForensics,
    PhysicalEvidence,
    Informant,
    Overheard,
    AnonymousTip,
    Confession,
    Accident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningStyle {
    Dialogue,
    TimeSkip,
    Weather,
    Action,
    Reflection,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingStyle {
    Question,
    Dialogue,
    Cliffhanger,
    Revelation,
    Reflection,
    Quiet,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trope {
    Weather,
    Travel,
    PhoneCall,
}

macro_rules! display_snake {
    ($($t:ty),*) => {$(
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&crate::types::enum_to_str(self).replace('_', " "))
            }
        }
    )*};
}

display_snake!(SceneType, InfoMethod, OpeningStyle, ClosingStyle, Trope);

// =============================================================================
// Rule Registries
// =============================================================================

/// Keyword stems; each is matched at a word start and may be extended.
/// A trailing `!` marks a whole word that may not be extended.
const SCENE_RULES: &[(SceneType, &[&str])] = &[
    (SceneType::Climax, &["climax", "final battle", "showdown", "decisive", "all comes to a head"]),
    (SceneType::Escape, &["escape", "flee", "fled", "get away", "breaks free", "slip out"]),
    (
        SceneType::Infiltration,
        &["infiltrat", "sneak", "break into", "breaks into", "undercover", "disguise"],
    ),
    (SceneType::Interrogation, &["interrogat", "question", "grill", "cross-examin"]),
    (
        SceneType::Confrontation,
        &["confront", "argue", "argument", "clash", "face off", "faces off", "accuse"],
    ),
    (SceneType::Revelation, &["reveal", "revelation", "truth", "unmask", "confess"]),
    (SceneType::Discovery, &["discover", "find", "finds", "found", "uncover", "stumble"]),
    (SceneType::Investigation, &["investigat", "search", "examin", "inspect", "clue", "evidence"]),
    (SceneType::Romantic, &["kiss", "romance", "romantic", "intimate", "love", "longing"]),
    (
        SceneType::Planning,
        &["plan!", "plans", "planned", "planning", "scheme", "strategi", "prepare", "plot their"],
    ),
    (SceneType::Suspense, &["stalk", "follow", "lurk", "waiting", "dread", "tension build"]),
    (
        SceneType::Aftermath,
        &["aftermath", "afterward", "mourn", "recover", "wake up", "wakes", "funeral"],
    ),
    (SceneType::Payoff, &["payoff", "pays off", "finally use", "comes back", "callback"]),
    (SceneType::Setup, &["introduc", "establish", "set up", "sets up", "foreshadow", "plant"]),
    (SceneType::Action, &["fight", "chase", "attack", "battle", "ambush", "shoot", "run", "explo"]),
    (
        SceneType::Reflection,
        &["reflect", "remember", "memory", "memories", "alone with", "wonder", "ponder"],
    ),
    (SceneType::Dialogue, &["talk", "conversation", "discuss", "dialogue", "tells", "chat"]),
    (SceneType::Transition, &["travel", "journey", "arrive", "depart", "return", "move to"]),
];

const INFO_RULES: &[(InfoMethod, &[&str])] = &[
    (
        InfoMethod::AnonymousTip,
        &["anonymous", "unsigned note", "unknown caller", "tip-off", "tip off"],
    ),
    (InfoMethod::Confession, &["confess", "admits", "admitted", "comes clean"]),
    (InfoMethod::Interrogation, &["interrogat", "under questioning", "grill"]),
    (InfoMethod::Informant, &["informant", "snitch", "contact tells", "source tells", "insider"]),
    (InfoMethod::Overheard, &["overhear", "eavesdrop", "listens in"]),
    (InfoMethod::Surveillance, &["surveil", "stakeout", "watches from", "tail", "camera footage"]),
    (
        InfoMethod::DigitalForensics,
        &["hack", "email", "phone records", "metadata", "database", "server", "laptop"],
    ),
    (
        InfoMethod::DocumentSearch,
        &["ledger", "document", "letter", "archive", "record", "diary", "files"],
    ),
    (
        InfoMethod::PhysicalEvidence,
        &["fingerprint", "blood", "footprint", "bullet", "residue", "autopsy"],
    ),
    (InfoMethod::Deduction, &["deduc", "realiz", "pieces together", "figures out", "infer"]),
    (
        InfoMethod::Accident,
        &["by accident", "accidentally", "by chance", "stumbles upon", "coincidence"],
    ),
];

const OPENING_RULES: &[(OpeningStyle, &[&str])] = &[
    (
        OpeningStyle::TimeSkip,
        &[
            "hours later",
            "days later",
            "weeks later",
            "the next morning",
            "the following",
            "by the time",
        ],
    ),
    (OpeningStyle::Weather, &["rain", "storm", "thunder", "fog", "snow", "wind", "drizzle"]),
    (
        OpeningStyle::Action,
        &["ran", "slammed", "grabbed", "shot", "exploded", "lunged", "sprinted", "crashed"],
    ),
    (
        OpeningStyle::Reflection,
        &["remembered", "thought", "wondered", "couldn't stop", "could not stop", "memory"],
    ),
];

const CLOSING_RULES: &[(ClosingStyle, &[&str])] = &[
    (
        ClosingStyle::Cliffhanger,
        &["suddenly", "gunshot", "scream", "footsteps", "went dark", "the door opened"],
    ),
    (
        ClosingStyle::Revelation,
        &["realized", "the truth", "understood", "it had been", "was him", "was her"],
    ),
    (ClosingStyle::Reflection, &["thought", "wondered", "remembered", "regret"]),
    (
        ClosingStyle::Quiet,
        &["slept", "sleep", "closed her eyes", "closed his eyes", "silence", "quiet"],
    ),
];

const TROPE_RULES: &[(Trope, &[&str])] = &[
    (
        Trope::Weather,
        &["rain", "storm", "thunder", "downpour", "drizzle", "snowfall", "fog rolled"],
    ),
    (
        Trope::Travel,
        &["drove", "driving", "train", "flight", "highway", "road trip", "the journey"],
    ),
    (
        Trope::PhoneCall,
        &[
            "phone rang",
            "phone buzzed",
            "called her",
            "called him",
            "dialed",
            "on the phone",
            "the call",
        ],
    ),
];

type Registry<T> = Vec<(T, Regex)>;

fn compile<T: Copy + std::fmt::Debug>(rules: &[(T, &[&str])]) -> Registry<T> {
    rules
        .iter()
        .filter_map(|(value, keywords)| {
            let alternation = keywords
                .iter()
                .map(|k| match k.strip_suffix('!') {
                    Some(word) => format!(r"{}\b", regex::escape(word)),
                    None => regex::escape(k),
                })
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)\b(?:{})", alternation);
            match Regex::new(&pattern) {
                Ok(re) => Some((*value, re)),
                Err(e) => {
                    warn!("Skipping pattern rule {:?}: {}", value, e);
                    None
                }
            }
        })
        .collect()
}

static SCENE_REGISTRY: LazyLock<Registry<SceneType>> = LazyLock::new(|| compile(SCENE_RULES));
static INFO_REGISTRY: LazyLock<Registry<InfoMethod>> = LazyLock::new(|| compile(INFO_RULES));
static OPENING_REGISTRY: LazyLock<Registry<OpeningStyle>> =
    LazyLock::new(|| compile(OPENING_RULES));
static CLOSING_REGISTRY: LazyLock<Registry<ClosingStyle>> =
    LazyLock::new(|| compile(CLOSING_RULES));
static TROPE_REGISTRY: LazyLock<Registry<Trope>> = LazyLock::new(|| compile(TROPE_RULES));

fn first_match<T: Copy>(registry: &Registry<T>, text: &str) -> Option<T> {
    registry
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(value, _)| *value)
}

// =============================================================================
// Classification
// =============================================================================

/// Classify a scene from text describing its action
pub fn classify_scene_type(plan_text: &str) -> SceneType {
    first_match(&SCENE_REGISTRY, plan_text).unwrap_or(SceneType::Transition)
}

/// Information-acquisition method, if the text describes one
pub fn classify_info_method(plan_text: &str) -> Option<InfoMethod> {
    first_match(&INFO_REGISTRY, plan_text)
}

const STYLE_WINDOW_CHARS: usize = 300;

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' | '\u{2014}')
}

pub fn classify_opening(text: &str) -> OpeningStyle {
    let text = text.trim_start();
    if text.starts_with(is_quote) {
        return OpeningStyle::Dialogue;
    }
    let head: String = text.chars().take(STYLE_WINDOW_CHARS).collect();
    first_match(&OPENING_REGISTRY, &head).unwrap_or(OpeningStyle::Description)
}

pub fn classify_closing(text: &str) -> ClosingStyle {
    let text = text.trim_end();
    if text.ends_with('?') {
        return ClosingStyle::Question;
    }
    if text.ends_with("...") || text.ends_with('\u{2026}') || text.ends_with('\u{2014}') {
        return ClosingStyle::Cliffhanger;
    }
    if text.ends_with(is_quote) {
        return ClosingStyle::Dialogue;
    }
    let tail = crate::types::tail_chars(text, STYLE_WINDOW_CHARS);
    first_match(&CLOSING_REGISTRY, tail).unwrap_or(ClosingStyle::Description)
}

fn has_trope(trope: Trope, text: &str) -> bool {
    TROPE_REGISTRY
        .iter()
        .any(|(t, re)| *t == trope && re.is_match(text))
}

// =============================================================================
// Pattern Record
// =============================================================================

/// Structural fingerprint of one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub chapter: u32,
    pub scene_types: Vec<SceneType>,
    pub opening: OpeningStyle,
    pub closing: ClosingStyle,
    pub info_methods: Vec<InfoMethod>,
    pub weather: bool,
    pub travel: bool,
    pub phone_call: bool,
    pub anonymous_tip: bool,
}

impl PatternRecord {
    /// Fingerprint a chapter from its plan and text. Falls back to the text
    /// alone when no plan survives.
    pub fn from_chapter(chapter: u32, plan: Option<&ChapterPlan>, text: &str) -> Self {
        let scene_texts: Vec<String> = match plan {
            Some(p) if !p.scenes.is_empty() => p.scenes.iter().map(|s| s.action_text()).collect(),
            _ => vec![text.to_string()],
        };

        let scene_types = scene_texts.iter().map(|t| classify_scene_type(t)).collect();
        let mut info_methods: Vec<InfoMethod> = scene_texts
            .iter()
            .filter_map(|t| classify_info_method(t))
            .collect();
        info_methods.sort();
        info_methods.dedup();

        Self {
            chapter,
            scene_types,
            opening: classify_opening(text),
            closing: classify_closing(text),
            anonymous_tip: info_methods.contains(&InfoMethod::AnonymousTip),
            info_methods,
            weather: has_trope(Trope::Weather, text),
            travel: has_trope(Trope::Travel, text),
            phone_call: has_trope(Trope::PhoneCall, text),
        }
    }

    fn has(&self, trope: Trope) -> bool {
        match trope {
            Trope::Weather => self.weather,
            Trope::Travel => self.travel,
            Trope::PhoneCall => self.phone_call,
        }
    }
}

// =============================================================================
// Analysis
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternAnalysis {
    pub chapter: u32,
    pub prior_chapters: usize,
    /// Prior chapters using each scene type
    pub scene_type_counts: BTreeMap<SceneType, usize>,
    pub info_method_counts: BTreeMap<InfoMethod, usize>,
    pub overused_scene_types: Vec<SceneType>,
    pub overused_info_methods: Vec<InfoMethod>,
    pub avoid_sequences: Vec<Vec<SceneType>>,
    pub avoid_openings: Vec<OpeningStyle>,
    pub avoid_closings: Vec<ClosingStyle>,
    pub anonymous_tip_prohibited: bool,
    pub flagged_tropes: Vec<Trope>,
    pub warnings: Vec<String>,
}

impl PatternAnalysis {
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Constraint block for the Scene Planner prompt
    pub fn to_prompt_block(&self) -> String {
        if self.warnings.is_empty() {
            return String::new();
        }
        let mut out = String::from("Structural patterns to avoid in this chapter:\n");
        for w in &self.warnings {
            out.push_str("- ");
            out.push_str(w);
            out.push('\n');
        }
        out
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Project-scoped history of pattern records
#[derive(Debug, Clone, Default)]
pub struct PatternTracker {
    records: BTreeMap<u32, PatternRecord>,
}

impl PatternTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: PatternRecord) {
        debug!(
            "Pattern record for chapter {}: {:?}",
            record.chapter, record.scene_types
        );
        self.records.insert(record.chapter, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn analyze_for_chapter(&self, chapter: u32) -> PatternAnalysis {
        let prior: Vec<&PatternRecord> = self.records.range(..chapter).map(|(_, r)| r).collect();
        let mut analysis = PatternAnalysis {
            chapter,
            prior_chapters: prior.len(),
            ..Default::default()
        };
        if prior.is_empty() {
            return analysis;
        }

        for record in &prior {
            let mut types = record.scene_types.clone();
            types.sort();
            types.dedup();
            for t in types {
                *analysis.scene_type_counts.entry(t).or_default() += 1;
            }
            for m in &record.info_methods {
                *analysis.info_method_counts.entry(*m).or_default() += 1;
            }
        }

        let threshold = limits::OVERUSE_MIN_COUNT
            .max((prior.len() as f64 * limits::OVERUSE_RATIO).ceil() as usize);
        for (t, n) in &analysis.scene_type_counts {
            if *n >= threshold {
                analysis.overused_scene_types.push(*t);
                analysis.warnings.push(format!(
                    "'{}' scenes are overused ({} of {} chapters)",
                    t,
                    n,
                    prior.len()
                ));
            }
        }
        for (m, n) in &analysis.info_method_counts {
            if *n >= threshold && *m != InfoMethod::AnonymousTip {
                analysis.overused_info_methods.push(*m);
                analysis.warnings.push(format!(
                    "information via '{}' is overused ({} chapters); find another way",
                    m, n
                ));
            }
        }

        if let [.., previous, last] = prior.as_slice() {
            if !last.scene_types.is_empty() && previous.scene_types == last.scene_types {
                analysis.avoid_sequences.push(last.scene_types.clone());
                analysis.warnings.push(format!(
                    "the last two chapters used the same scene sequence ({}); do not repeat it",
                    join(&last.scene_types)
                ));
            }
            if previous.opening == last.opening {
                analysis.avoid_openings.push(last.opening);
                analysis.warnings.push(format!(
                    "the last two chapters opened with {}; open differently",
                    last.opening
                ));
            }
            if previous.closing == last.closing {
                analysis.avoid_closings.push(last.closing);
                analysis.warnings.push(format!(
                    "the last two chapters closed with {}; close differently",
                    last.closing
                ));
            }
        }

        let tips = prior.iter().filter(|r| r.anonymous_tip).count();
        if tips >= limits::ANONYMOUS_TIP_LIMIT {
            analysis.anonymous_tip_prohibited = true;
            analysis
                .warnings
                .push("anonymous tips are prohibited; they have already been used".to_string());
        }

        let window_start = prior.len().saturating_sub(limits::TROPE_WINDOW);
        let window = &prior[window_start..];
        for trope in [Trope::Weather, Trope::Travel, Trope::PhoneCall] {
            let n = window.iter().filter(|r| r.has(trope)).count();
            if n >= limits::TROPE_LIMIT {
                analysis.flagged_tropes.push(trope);
                analysis.warnings.push(format!(
                    "{} appeared in {} of the last {} chapters; leave it out",
                    trope,
                    n,
                    window.len()
                ));
            }
        }

        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::types::ScenePlan;

    fn record(chapter: u32, types: &[SceneType]) -> PatternRecord {
        PatternRecord {
            chapter,
            scene_types: types.to_vec(),
            opening: OpeningStyle::Description,
            closing: ClosingStyle::Description,
            info_methods: Vec::new(),
            weather: false,
            travel: false,
            phone_call: false,
            anonymous_tip: false,
        }
    }

    fn scene(beat: &str) -> ScenePlan {
        serde_json::from_value(serde_json::json!({"number": 1, "plot_beat": beat})).unwrap()
    }

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(SCENE_REGISTRY.len(), SCENE_RULES.len());
        assert_eq!(INFO_REGISTRY.len(), INFO_RULES.len());
        assert_eq!(OPENING_REGISTRY.len(), OPENING_RULES.len());
        assert_eq!(CLOSING_REGISTRY.len(), CLOSING_RULES.len());
        assert_eq!(TROPE_REGISTRY.len(), TROPE_RULES.len());
    }

    #[test]
    fn test_scene_classification_first_match_wins() {
        assert_eq!(
            classify_scene_type("Mara interrogates the dock master"),
            SceneType::Interrogation
        );
        assert_eq!(
            classify_scene_type("They flee across the rooftops"),
            SceneType::Escape
        );
        // confrontation outranks dialogue
        assert_eq!(
            classify_scene_type("She confronts him during their talk"),
            SceneType::Confrontation
        );
        assert_eq!(
            classify_scene_type("Quiet morning at the harbor"),
            SceneType::Transition
        );
    }

    #[test]
    fn test_whole_word_stems_are_not_extended() {
        assert_eq!(
            classify_scene_type("They go over the plan at dawn"),
            SceneType::Planning
        );
        assert_eq!(
            classify_scene_type("The crew spent the night planning"),
            SceneType::Planning
        );
        assert_eq!(
            classify_scene_type("She plants the forged key in his coat"),
            SceneType::Setup
        );
        assert_ne!(
            classify_scene_type("A red planet hangs over the harbor"),
            SceneType::Planning
        );
    }

    #[test]
    fn test_info_method_classification() {
        assert_eq!(
            classify_info_method("An anonymous letter arrives"),
            Some(InfoMethod::AnonymousTip)
        );
        assert_eq!(
            classify_info_method("She reads the old ledger"),
            Some(InfoMethod::DocumentSearch)
        );
        assert_eq!(classify_info_method("They share a meal"), None);
    }

    #[test]
    fn test_opening_and_closing_styles() {
        assert_eq!(
            classify_opening("\"Get down,\" she hissed."),
            OpeningStyle::Dialogue
        );
        assert_eq!(
            classify_opening("Three days later the ship returned."),
            OpeningStyle::TimeSkip
        );
        assert_eq!(
            classify_opening("The harbor was grey."),
            OpeningStyle::Description
        );
        assert_eq!(classify_closing("Who had sent it?"), ClosingStyle::Question);
        assert_eq!(
            classify_closing("And then the lights went out..."),
            ClosingStyle::Cliffhanger
        );
        assert_eq!(
            classify_closing("She finally understood what he meant."),
            ClosingStyle::Revelation
        );
    }

    #[test]
    fn test_identical_sequences_enter_avoid_list() {
        let seq = [SceneType::Dialogue, SceneType::Investigation, SceneType::Revelation];
        let mut tracker = PatternTracker::new();
        tracker.record(record(1, &seq));
        tracker.record(record(2, &seq));

        let analysis = tracker.analyze_for_chapter(3);
        assert_eq!(analysis.avoid_sequences, vec![seq.to_vec()]);
        assert!(analysis.to_prompt_block().contains("same scene sequence"));
    }

    #[test]
    fn test_different_sequences_not_flagged() {
        let mut tracker = PatternTracker::new();
        tracker.record(record(1, &[SceneType::Dialogue, SceneType::Action]));
        tracker.record(record(2, &[SceneType::Action, SceneType::Dialogue]));
        assert!(tracker.analyze_for_chapter(3).avoid_sequences.is_empty());
    }

    #[test]
    fn test_only_prior_chapters_count() {
        let seq = [SceneType::Action];
        let mut tracker = PatternTracker::new();
        tracker.record(record(1, &seq));
        tracker.record(record(2, &seq));
        tracker.record(record(3, &[SceneType::Dialogue]));
        // chapter 3 itself is excluded
        assert_eq!(tracker.analyze_for_chapter(3).avoid_sequences.len(), 1);
        assert!(tracker.analyze_for_chapter(4).avoid_sequences.is_empty());
    }

    #[test]
    fn test_overuse_threshold() {
        let mut tracker = PatternTracker::new();
        for ch in 1..=2 {
            tracker.record(record(ch, &[SceneType::Action]));
        }
        let analysis = tracker.analyze_for_chapter(3);
        assert!(analysis.overused_scene_types.is_empty());

        tracker.record(record(3, &[SceneType::Action]));
        let analysis = tracker.analyze_for_chapter(4);
        assert_eq!(analysis.overused_scene_types, vec![SceneType::Action]);
        assert_eq!(analysis.scene_type_counts[&SceneType::Action], 3);

        // with 20 prior chapters the bar rises to 6
        let mut big = PatternTracker::new();
        for ch in 1..=20 {
            let t = if ch <= 5 { SceneType::Escape } else { SceneType::Setup };
            big.record(record(ch, &[t]));
        }
        let analysis = big.analyze_for_chapter(21);
        assert!(!analysis.overused_scene_types.contains(&SceneType::Escape));
        assert!(analysis.overused_scene_types.contains(&SceneType::Setup));
    }

    #[test]
    fn test_anonymous_tip_prohibited_after_one_use() {
        let mut tracker = PatternTracker::new();
        let mut r = record(1, &[SceneType::Discovery]);
        r.anonymous_tip = true;
        r.info_methods = vec![InfoMethod::AnonymousTip];
        tracker.record(r);
        assert!(tracker.analyze_for_chapter(2).anonymous_tip_prohibited);
    }

    #[test]
    fn test_tropes_in_window() {
        let mut tracker = PatternTracker::new();
        for ch in 1..=7 {
            let mut r = record(ch, &[SceneType::Setup]);
            r.weather = ch <= 2;
            r.phone_call = ch >= 6;
            tracker.record(r);
        }
        let analysis = tracker.analyze_for_chapter(8);
        assert_eq!(analysis.flagged_tropes, vec![Trope::PhoneCall]);
    }

    #[test]
    fn test_record_from_plan() {
        let plan = ChapterPlan {
            scenes: vec![
                scene("Mara searches the office for clues"),
                scene("An anonymous caller warns her"),
                scene("She confronts Ruiz"),
            ],
            closing_hook: String::new(),
        };
        let text = "Rain hammered the window. ... She drove to the docks.";
        let r = PatternRecord::from_chapter(4, Some(&plan), text);
        assert_eq!(r.scene_types[0], SceneType::Investigation);
        assert_eq!(r.scene_types[2], SceneType::Confrontation);
        assert!(r.anonymous_tip);
        assert!(r.weather);
        assert!(r.travel);
        assert_eq!(r.opening, OpeningStyle::Weather);
    }
}
