//! Deterministic condition-string heuristics.

use std::sync::LazyLock;

use regex::Regex;

static THRESHOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").expect("valid regex")
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|'([^']+)'|“([^”]+)”"#).expect("valid regex"));

/// First number in the condition, thousands separators allowed.
pub fn extract_threshold(condition: &str) -> Option<f64> {
    let m = THRESHOLD.find(condition)?;
    m.as_str().replace(',', "").parse().ok()
}

/// Quoted phrase in the condition, else its last word without punctuation.
pub fn extract_target_phrase(condition: &str) -> Option<String> {
    if let Some(caps) = QUOTED.captures(condition) {
        let phrase = caps.iter().skip(1).flatten().next()?.as_str().trim();
        if !phrase.is_empty() {
            return Some(phrase.to_string());
        }
    }
    condition
        .split_whitespace()
        .last()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
}

/// Whole-word, case-sensitive match of `word` in `text`.
pub fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}
