//! Vocabulary Tracker
//!
//! Rolling lexical history over the last few chapters of one project. Feeds
//! the Scene Writer a list of words and phrases to stop leaning on.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::constants::vocabulary as limits;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "always", "another", "around",
    "because", "been", "before", "being", "below", "between", "both", "could", "didn't", "does",
    "doing", "don't", "down", "each", "even", "every", "from", "further", "have", "having",
    "he'd", "he's", "held", "here", "hers", "herself", "himself", "into", "it's", "just",
    "like", "little", "made", "make", "many", "more", "most", "much", "must", "never", "once",
    "only", "other", "ours", "ourselves", "over", "said", "same", "she'd", "she's", "should",
    "some", "still", "such", "than", "that", "that's", "their", "theirs", "them", "themselves",
    "then", "there", "there's", "these", "they", "they'd", "they're", "this", "those",
    "through", "under", "until", "upon", "very", "wasn't", "were", "what", "when", "where",
    "which", "while", "will", "with", "would", "your", "yours", "yourself", "back", "know",
    "thing", "things", "something", "nothing", "anything", "going", "come", "came", "went",
    "want", "wanted", "look", "looked", "across", "without", "already", "though", "away",
];

#[derive(Debug, Clone)]
struct ChapterLexicon {
    chapter: u32,
    words: HashMap<String, usize>,
    trigrams: HashSet<String>,
}

/// Overuse report for the next chapter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VocabularyReport {
    /// (word, uses within the window), most used first
    pub overused_words: Vec<(String, usize)>,
    /// Three-word phrases repeated in consecutive chapters
    pub repeated_phrases: Vec<String>,
}

impl VocabularyReport {
    pub fn is_empty(&self) -> bool {
        self.overused_words.is_empty() && self.repeated_phrases.is_empty()
    }

    /// Constraint block for the Scene Writer prompt
    pub fn to_prompt_block(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        if !self.overused_words.is_empty() {
            let words: Vec<&str> = self.overused_words.iter().map(|(w, _)| w.as_str()).collect();
            out.push_str(&format!(
                "Words used too often in recent chapters (find alternatives): {}\n",
                words.join(", ")
            ));
        }
        if !self.repeated_phrases.is_empty() {
            out.push_str(&format!(
                "Phrases repeated across recent chapters (do not reuse): {}\n",
                self.repeated_phrases
                    .iter()
                    .map(|p| format!("\"{}\"", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        out
    }
}

/// Project-scoped rolling window of chapter vocabularies
#[derive(Debug, Clone, Default)]
pub struct VocabularyTracker {
    window: VecDeque<ChapterLexicon>,
}

impl VocabularyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chapter, evicting the oldest beyond the window
    pub fn record(&mut self, chapter: u32, text: &str) {
        self.window.retain(|c| c.chapter != chapter);
        let tokens = tokenize(text);

        let mut words = HashMap::new();
        for t in tokens.iter().filter(|t| is_content_word(t)) {
            *words.entry(t.clone()).or_insert(0) += 1;
        }
        let trigrams = tokens
            .windows(3)
            .filter(|w| w.iter().filter(|t| is_content_word(t)).count() >= 2)
            .map(|w| w.join(" "))
            .collect();

        self.window.push_back(ChapterLexicon {
            chapter,
            words,
            trigrams,
        });
        self.window.make_contiguous().sort_by_key(|c| c.chapter);
        while self.window.len() > limits::WINDOW_CHAPTERS {
            self.window.pop_front();
        }
    }

    pub fn report(&self) -> VocabularyReport {
        let mut totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for lexicon in &self.window {
            for (w, n) in &lexicon.words {
                let entry = totals.entry(w.as_str()).or_default();
                entry.0 += n;
                entry.1 += 1;
            }
        }
        let mut overused_words: Vec<(String, usize)> = totals
            .into_iter()
            .filter(|(_, (uses, chapters))| *uses >= limits::OVERUSE_THRESHOLD && *chapters >= 2)
            .map(|(w, (uses, _))| (w.to_string(), uses))
            .collect();
        overused_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        overused_words.truncate(limits::MAX_REPORTED);

        let mut repeated: Vec<String> = self
            .window
            .iter()
            .zip(self.window.iter().skip(1))
            .flat_map(|(a, b)| a.trigrams.intersection(&b.trigrams).cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        repeated.sort();
        repeated.truncate(limits::MAX_REPORTED);

        VocabularyReport {
            overused_words,
            repeated_phrases: repeated,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '\u{2019}').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_content_word(token: &str) -> bool {
    token.chars().count() >= limits::MIN_WORD_LEN
        && !token.chars().all(|c| c.is_ascii_digit())
        && !STOPWORDS.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overused_word_needs_two_chapters() {
        let mut tracker = VocabularyTracker::new();
        tracker.record(1, &"crimson ".repeat(20));
        assert!(tracker.report().overused_words.is_empty());

        tracker.record(2, "a crimson sky");
        let report = tracker.report();
        assert_eq!(report.overused_words, vec![("crimson".to_string(), 21)]);
        assert!(report.to_prompt_block().contains("crimson"));
    }

    #[test]
    fn test_stopwords_and_short_words_ignored() {
        let mut tracker = VocabularyTracker::new();
        for ch in 1..=3 {
            tracker.record(ch, &"that were the and ".repeat(10));
        }
        assert!(tracker.report().overused_words.is_empty());
    }

    #[test]
    fn test_repeated_phrase_across_consecutive_chapters() {
        let mut tracker = VocabularyTracker::new();
        tracker.record(1, "Her breath caught sharply as the door opened.");
        tracker.record(2, "Later, her breath caught sharply again.");
        let report = tracker.report();
        let phrase = "breath caught sharply".to_string();
        assert!(report.repeated_phrases.contains(&phrase));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut tracker = VocabularyTracker::new();
        tracker.record(1, "lantern lantern lantern");
        for ch in 2..=4 {
            tracker.record(ch, "harbor fog");
        }
        assert_eq!(tracker.window.len(), limits::WINDOW_CHAPTERS);
        assert!(tracker.window.iter().all(|c| c.chapter != 1));
    }

    #[test]
    fn test_tokenize_handles_apostrophes() {
        assert_eq!(tokenize("Mara's 'ledger'"), vec!["mara's", "ledger"]);
    }
}
