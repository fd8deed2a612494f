//! Trigger keyword matching and severity classification

use std::collections::BTreeSet;

use regex::Regex;

use crate::alerts::Severity;

/// Words that mark a record as criminal
const CRIMINAL_WORDS: &[&str] = &[
    "arrest",
    "arrests",
    "arrested",
    "conviction",
    "convictions",
    "convicted",
    "sentence",
    "sentenced",
    "criminal",
    "indictment",
    "indictments",
    "indicted",
    "felony",
    "felonies",
    "warrant",
    "warrants",
];

/// Words that mark a record as resolved or benign
const BENIGN_WORDS: &[&str] = &[
    "dismissed",
    "resolved",
    "closed",
    "acquitted",
    "satisfied",
    "expunged",
];

/// Compiled trigger keywords for one monitor.
///
/// Matching is case-insensitive on word prefixes. Underscores read as spaces
/// and the last word is reduced to its stem, so `court_cases` matches
/// "court case", `arrest` matches "arrested" and `conviction` matches
/// "convicted".
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<(String, Regex)>,
}

impl TriggerSet {
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a String>) -> Self {
        let triggers = keywords
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .filter_map(|keyword| {
                let Some(pattern) = trigger_pattern(keyword) else {
                    tracing::warn!(keyword = %keyword, "Skipping trigger too short to match on");
                    return None;
                };
                match Regex::new(&pattern) {
                    Ok(re) => Some((keyword.clone(), re)),
                    Err(e) => {
                        tracing::warn!(keyword = %keyword, error = %e, "Skipping unusable trigger");
                        None
                    }
                }
            })
            .collect();

        Self { triggers }
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Keywords found in `text`
    pub fn matched(&self, text: &str) -> Vec<String> {
        self.triggers
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }

    /// Whether a record with this text should raise an alert.
    /// An empty set accepts everything.
    pub fn accepts(&self, text: &str) -> bool {
        self.is_empty() || self.triggers.iter().any(|(_, re)| re.is_match(text))
    }
}

/// Fewest letters or digits a trigger stem may have
const MIN_STEM_CHARS: usize = 2;

/// Inflection endings dropped from a trigger's last word, longest first
const SUFFIXES: &[&str] = &["ies", "ions", "ion", "ings", "ing", "ed", "s", "y"];

/// Regex for one trigger; `None` when nothing meaningful is left to match
fn trigger_pattern(keyword: &str) -> Option<String> {
    let normalized = keyword.trim().to_lowercase().replace('_', " ");
    let mut words: Vec<&str> = normalized.split_whitespace().collect();
    let last = words.pop()?;
    words.push(stem(last));

    let letters: usize = words
        .iter()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).count())
        .sum();
    if letters < MIN_STEM_CHARS {
        return None;
    }

    let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Some(format!(r"(?i)\b{}\w*", escaped.join(r"\s+")))
}

/// Strip one inflection ending, keeping at least three characters
fn stem(word: &str) -> &str {
    for suffix in SUFFIXES {
        if let Some(stem) = word.strip_suffix(suffix) {
            // "witness", "business"
            if *suffix == "s" && stem.ends_with('s') {
                continue;
            }
            if stem.chars().count() >= 3 {
                return stem;
            }
        }
    }
    word
}

/// Lowercase words of `text`
fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Severity of a court record from its text.
///
/// Criminal wording wins over resolution wording.
pub fn classify_severity(text: &str) -> Severity {
    let words = words(text);

    if CRIMINAL_WORDS.iter().any(|w| words.contains(*w)) {
        Severity::Critical
    } else if BENIGN_WORDS.iter().any(|w| words.contains(*w)) {
        Severity::Info
    } else {
        Severity::Warning
    }
}

/// Severity of a record that matched `matched` triggers.
///
/// A criminal trigger escalates any match to critical; otherwise the record
/// text decides.
pub fn record_severity(text: &str, matched: &[String]) -> Severity {
    let trigger_text = matched.join(" ").replace('_', " ");
    if classify_severity(&trigger_text) == Severity::Critical {
        Severity::Critical
    } else {
        classify_severity(text)
    }
}
