//! Exact-Match Patch Engine
//!
//! A patch replaces one exact, unique snippet of chapter text. Anything else
//! is rejected whole: no fuzzy matching, no partial application.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::lenient;
use crate::constants::agents::MIN_PATCH_SNIPPET_CHARS;

/// Find-exact-text / replace-text correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(deserialize_with = "lenient::string")]
    pub original: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub replacement: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchRejection {
    /// Snippet shorter than the minimum length
    TooShort,
    NotFound,
    /// Snippet occurs more than once
    Ambiguous(usize),
}

impl std::fmt::Display for PatchRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(
                f,
                "snippet shorter than {} characters",
                MIN_PATCH_SNIPPET_CHARS
            ),
            Self::NotFound => f.write_str("snippet not found verbatim"),
            Self::Ambiguous(n) => write!(f, "snippet occurs {} times", n),
        }
    }
}

/// Apply one patch, returning the new text
pub fn apply_patch(text: &str, patch: &Patch) -> Result<String, PatchRejection> {
    if patch.original.chars().count() < MIN_PATCH_SNIPPET_CHARS {
        return Err(PatchRejection::TooShort);
    }
    match occurrences(text, &patch.original).as_slice() {
        [] => Err(PatchRejection::NotFound),
        [start] => {
            let end = start + patch.original.len();
            Ok(format!("{}{}{}", &text[..*start], patch.replacement, &text[end..]))
        }
        all => Err(PatchRejection::Ambiguous(all.len())),
    }
}

/// Byte offsets of every occurrence, overlapping ones included
fn occurrences(text: &str, needle: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .filter(|&i| text[i..].starts_with(needle))
        .collect()
}

/// Result of applying a batch of patches in order
#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    pub text: String,
    pub applied: usize,
    pub rejected: Vec<(Patch, PatchRejection)>,
}

impl PatchOutcome {
    /// Human-readable notes for rejected patches
    pub fn rejection_notes(&self) -> Vec<String> {
        self.rejected
            .iter()
            .map(|(p, why)| {
                let preview: String = p.original.chars().take(60).collect();
                if p.reason.is_empty() {
                    format!("unapplied correction ({}): \"{}\"", why, preview)
                } else {
                    format!(
                        "unapplied correction ({}): {} [\"{}\"]",
                        why,
                        p.reason,
                        preview
                    )
                }
            })
            .collect()
    }
}

/// Apply patches sequentially; each sees the output of the previous one
pub fn apply_patches(text: &str, patches: &[Patch]) -> PatchOutcome {
    let mut outcome = PatchOutcome {
        text: text.to_string(),
        ..Default::default()
    };
    for patch in patches {
        match apply_patch(&outcome.text, patch) {
            Ok(next) => {
                outcome.text = next;
                outcome.applied += 1;
            }
            Err(why) => {
                debug!("Rejected patch: {}", why);
                outcome.rejected.push((patch.clone(), why));
            }
        }
    }
    if !outcome.rejected.is_empty() {
        warn!(
            "{} of {} patches rejected",
            outcome.rejected.len(),
            patches.len()
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Mara closed the ledger with a snap. The harbor bell rang twice. \
                        She counted the coins again, slowly.";

    fn patch(original: &str, replacement: &str) -> Patch {
        Patch {
            original: original.to_string(),
            replacement: replacement.to_string(),
            reason: String::new(),
        }
    }

    #[test]
    fn test_unique_snippet_applies() {
        let p = patch("The harbor bell rang twice.", "The harbor bell rang once.");
        let out = apply_patch(TEXT, &p).unwrap();
        assert!(out.contains("rang once."));
        assert!(!out.contains("rang twice."));
    }

    #[test]
    fn test_missing_snippet_rejected_without_change() {
        let p = patch("The harbor bell rang three times.", "x");
        assert_eq!(apply_patch(TEXT, &p), Err(PatchRejection::NotFound));
    }

    #[test]
    fn test_near_match_is_not_applied() {
        // differs only by case
        let p = patch("the harbor bell rang twice.", "The bell was silent.");
        assert_eq!(apply_patch(TEXT, &p), Err(PatchRejection::NotFound));
    }

    #[test]
    fn test_ambiguous_snippet_rejected() {
        let text = "He said the word again. He said the word again.";
        let p = patch("He said the word again.", "He whispered it.");
        assert_eq!(apply_patch(text, &p), Err(PatchRejection::Ambiguous(2)));
    }

    #[test]
    fn test_overlapping_occurrences_are_ambiguous() {
        let text = "He laughed: ha ha ha ha ha ha ha ha ha ha. Nobody joined in.";
        let p = patch("ha ha ha ha ha ha ha ha ha", "ha");
        assert_eq!(apply_patch(text, &p), Err(PatchRejection::Ambiguous(2)));
    }

    #[test]
    fn test_multibyte_text_around_snippet() {
        let text = "Café doors swung open… the rain kept falling on the square.";
        let out = apply_patch(text, &patch("the rain kept falling", "the rain stopped")).unwrap();
        assert_eq!(
            out,
            "Café doors swung open… the rain stopped on the square."
        );
    }

    #[test]
    fn test_short_snippet_rejected() {
        assert_eq!(
            apply_patch(TEXT, &patch("ledger", "book")),
            Err(PatchRejection::TooShort)
        );
    }

    #[test]
    fn test_batch_keeps_going_after_rejection() {
        let patches = vec![
            patch("not present anywhere in text", "x"),
            patch("She counted the coins again, slowly.", "She pocketed the coins."),
        ];
        let outcome = apply_patches(TEXT, &patches);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.text.ends_with("She pocketed the coins."));
        assert_eq!(outcome.rejection_notes().len(), 1);
    }
}
