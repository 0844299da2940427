//! World Bible
//!
//! Canonical fact store produced once by the Outline Architect. Later stages
//! read it; only audited correction flows may replace it, and a replacement
//! must never contradict an immutable character attribute.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::lenient;
use crate::types::{Result, ValidationError, ValidationErrorKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldBible {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default, deserialize_with = "named_entries")]
    pub locations: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub world_rules: Vec<String>,
    /// Established objects that must pay off later
    #[serde(default, deserialize_with = "named_entries")]
    pub objects: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub plot_threads: Vec<PlotThread>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    /// Physical and identity attributes that may never change
    #[serde(
        default,
        alias = "physical_traits",
        alias = "immutable_attributes",
        deserialize_with = "attribute_map"
    )]
    pub immutable: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub resources: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default, alias = "date", deserialize_with = "lenient::string")]
    pub when: String,
    #[serde(default, alias = "description", deserialize_with = "lenient::string")]
    pub event: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Active,
    Resolved,
    Ignored,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "resolved" | "closed" | "complete" | "completed" | "resuelta" => Self::Resolved,
            "ignored" | "dropped" | "abandoned" | "forgotten" => Self::Ignored,
            _ => Self::Active,
        }
    }
}

impl<'de> Deserialize<'de> for ThreadStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Ok(Self::parse(&lenient::string(d)?))
    }
}

/// A narrative through-line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotThread {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, alias = "description", deserialize_with = "lenient::string")]
    pub goal: String,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub last_updated_chapter: u32,
}

/// Locations and objects arrive as strings or as `{name, description}` objects
fn named_entries<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    lenient::string_vec(d)
}

fn attribute_map<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some((k, v))
            })
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Value::String(s) => Some(match s.split_once(':') {
                    Some((k, v)) => (k.trim().to_lowercase(), v.trim().to_string()),
                    None => (format!("trait_{}", i + 1), s),
                }),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => {
            BTreeMap::from([("description".to_string(), s)])
        }
        _ => BTreeMap::new(),
    })
}

impl WorldBible {
    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn protagonist(&self) -> Option<&Character> {
        self.by_role(&["protagonist", "protagonista", "main", "hero", "heroine"])
    }

    pub fn antagonist(&self) -> Option<&Character> {
        self.by_role(&["antagonist", "antagonista", "villain"])
    }

    fn by_role(&self, needles: &[&str]) -> Option<&Character> {
        self.characters.iter().find(|c| {
            let role = c.role.to_lowercase();
            needles.iter().any(|n| role.contains(n))
        })
    }

    /// Reject a replacement that contradicts an immutable attribute of `previous`
    pub fn ensure_continuity(&self, previous: &WorldBible) -> Result<()> {
        for old in &previous.characters {
            let Some(new) = self.character(&old.name) else {
                continue;
            };
            for (attr, old_value) in &old.immutable {
                if let Some(new_value) = new.immutable.get(attr)
                    && !new_value.trim().eq_ignore_ascii_case(old_value.trim())
                {
                    return Err(ValidationError::new(
                        ValidationErrorKind::Consistency,
                        format!(
                            "immutable attribute '{}' of {} changed",
                            attr, old.name
                        ),
                    )
                    .with_field(format!("characters.{}.{}", old.name, attr))
                    .with_comparison(old_value.clone(), new_value.clone())
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Compact text rendering for prompts
    pub fn to_prompt_block(&self) -> String {
        let mut out = String::new();
        if !self.characters.is_empty() {
            out.push_str("CHARACTERS:\n");
            for c in &self.characters {
                out.push_str(&format!("- {} ({})", c.name, c.role));
                if !c.description.is_empty() {
                    out.push_str(&format!(": {}", c.description));
                }
                out.push('\n');
                if !c.immutable.is_empty() {
                    let attrs: Vec<String> = c
                        .immutable
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect();
                    out.push_str(&format!("  immutable: {}\n", attrs.join(", ")));
                }
                if !c.skills.is_empty() {
                    out.push_str(&format!("  skills: {}\n", c.skills.join(", ")));
                }
                if !c.resources.is_empty() {
                    out.push_str(&format!("  resources: {}\n", c.resources.join(", ")));
                }
            }
        }
        push_list(&mut out, "LOCATIONS", &self.locations);
        push_list(&mut out, "WORLD RULES", &self.world_rules);
        push_list(&mut out, "ESTABLISHED OBJECTS", &self.objects);
        if !self.timeline.is_empty() {
            out.push_str("TIMELINE:\n");
            for e in &self.timeline {
                out.push_str(&format!("- {}: {}\n", e.when, e.event));
            }
        }
        if !self.plot_threads.is_empty() {
            out.push_str("PLOT THREADS:\n");
            for t in &self.plot_threads {
                out.push_str(&format!(
                    "- {} [{}] {}\n",
                    t.name,
                    t.status.as_str(),
                    t.goal
                ));
            }
        }
        out
    }
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(title);
    out.push_str(":\n");
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NovelError;
    use serde_json::json;

    fn bible() -> WorldBible {
        serde_json::from_value(json!({
            "characters": [
                {"name": "Mara Voss", "role": "protagonist",
                 "physical_traits": {"eyes": "grey", "height": "tall"}},
                {"name": "Castellan Ruiz", "role": "antagonist"}
            ],
            "locations": [{"name": "Salt Harbor", "description": "fog"}, "The Ledger House"],
            "plot_threads": [{"name": "The Ledger", "goal": "decode it", "status": "Active"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_lenient_shapes() {
        let b = bible();
        assert_eq!(b.locations, vec!["Salt Harbor", "The Ledger House"]);
        assert_eq!(b.characters[0].immutable["eyes"], "grey");
        assert_eq!(b.plot_threads[0].status, ThreadStatus::Active);
        assert_eq!(b.protagonist().unwrap().name, "Mara Voss");
        assert_eq!(b.antagonist().unwrap().name, "Castellan Ruiz");
    }

    #[test]
    fn test_continuity_accepts_same_facts() {
        let old = bible();
        let mut new = bible();
        new.characters[0].immutable.insert("eyes".into(), "Grey".into());
        new.characters[0].description = "older now".into();
        assert!(new.ensure_continuity(&old).is_ok());
    }

    #[test]
    fn test_continuity_rejects_changed_attribute() {
        let old = bible();
        let mut new = bible();
        new.characters[0].immutable.insert("eyes".into(), "brown".into());
        let err = new.ensure_continuity(&old).unwrap_err();
        assert!(matches!(
            err,
            NovelError::Validation(ref v) if v.kind == ValidationErrorKind::Consistency
        ));
    }

    #[test]
    fn test_prompt_block_lists_threads() {
        let block = bible().to_prompt_block();
        assert!(block.contains("PLOT THREADS:"));
        assert!(block.contains("The Ledger [active]"));
        assert!(block.contains("eyes=grey"));
    }
}
