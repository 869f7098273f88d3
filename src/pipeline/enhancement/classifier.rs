//! Segment scraped content and score each segment for noise vs. relevance.
//!
//! Pure and infallible: any input yields a (possibly empty) segment list.

use std::sync::LazyLock;

use regex::Regex;

use super::markup::strip_markup;
use super::types::{ContentSegment, NoiseType, RelevanceClass, SegmentMetadata};

/// Noise added per matched occurrence of a category pattern.
const NOISE_WEIGHT_PER_MATCH: f64 = 0.2;
/// Maximum contribution of a single category.
const NOISE_CATEGORY_CAP: f64 = 0.4;
/// Fixed penalty for fragments (too short / too few real words).
const FRAGMENT_PENALTY: f64 = 0.4;
const NOISE_THRESHOLD: f64 = 0.5;

const RELEVANCE_BASE: f64 = 0.5;
const NUMERIC_SIGNAL_BONUS: f64 = 0.2;
const TEMPORAL_SIGNAL_BONUS: f64 = 0.15;
const KEY_VALUE_BONUS: f64 = 0.1;
const SHORT_CONTENT_PENALTY: f64 = 0.2;
const HIGHLY_RELEVANT_MIN: f64 = 0.8;
const MODERATELY_RELEVANT_MIN: f64 = 0.6;

/// Blank lines, runs of periods, and closes of block-level elements.
static SEGMENT_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\n[ \t]*\n|\.{3,}|…|</(?:p|div|section|article|li|h[1-6]|tr|table|ul|ol|header|footer|nav|aside)\s*>|<br\s*/?>",
    )
    .expect("valid regex")
});

static ADVERTISEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:advertisement|sponsored|promoted|ad choices|buy now|shop now|limited time offer|special offer|click here)\b")
        .expect("valid regex")
});
static NAVIGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:home|menu|skip to (?:main )?content|next page|previous page|back to top|breadcrumbs?|sitemap|main navigation)\b")
        .expect("valid regex")
});
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:cookies?|privacy policy|terms of (?:service|use)|all rights reserved|copyright|subscribe|newsletter|sign up|log ?in)\b|©")
        .expect("valid regex")
});
static SOCIAL_SHARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:share (?:on|this)|tweet|follow us|like us on|facebook|twitter|linkedin|instagram|pinterest|whatsapp)\b")
        .expect("valid regex")
});

static NUMERIC_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£¥]\s?\d|\d(?:[\d,]*\.?\d+)?\s?%|\d\s?(?:USD|EUR|GBP|JPY)\b")
        .expect("valid regex")
});
static TEMPORAL_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:today|yesterday|tomorrow|tonight|\d+\s+(?:minutes?|hours?|days?|weeks?|months?|years?)\s+ago|(?:last|this|next)\s+(?:week|month|year)|as of|updated)\b")
        .expect("valid regex")
});
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\p{L}[\p{L}\d ()/-]{0,40}:\s*\S").expect("valid regex")
});
static DATE_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b|(?i:\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}\b)")
        .expect("valid regex")
});
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("valid regex"));

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Split raw content on paragraph/block boundaries, strip markup from each
/// piece and drop the empty ones.
pub fn split_segments(content: &str) -> Vec<String> {
    SEGMENT_BOUNDARY
        .split(content)
        .map(strip_markup)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Segment and classify content. Segment ids are `seg_{position}`.
pub fn classify_content(content: &str, selector: Option<&str>) -> Vec<ContentSegment> {
    let segments: Vec<ContentSegment> = split_segments(content)
        .into_iter()
        .enumerate()
        .map(|(position, text)| classify_segment(text, position, selector))
        .collect();

    tracing::debug!(
        segments = segments.len(),
        noise = segments.iter().filter(|s| s.is_noise()).count(),
        "Content classified"
    );
    segments
}

pub fn classify_segment(text: String, position: usize, selector: Option<&str>) -> ContentSegment {
    let word_count = text.split_whitespace().count();
    let (noise_score, noise_types) = noise_score(&text);
    let removal_confidence = noise_score.min(1.0);
    let is_noise = noise_score > NOISE_THRESHOLD;

    let relevance = if is_noise {
        RelevanceClass::Noise
    } else {
        relevance_class(relevance_score(&text))
    };

    let confidence = match relevance.base_confidence() {
        Some(base) => {
            let bonus = if text.chars().count() > 50 && word_count > 5 { 0.1 } else { 0.0 };
            (base + bonus).clamp(0.0, 1.0)
        }
        None => (1.0 - removal_confidence).clamp(0.0, 1.0),
    };

    let metadata = SegmentMetadata {
        word_count,
        has_numbers: DIGIT.is_match(&text),
        has_dates: DATE_SIGNAL.is_match(&text) || TEMPORAL_SIGNAL.is_match(&text),
        selector: selector.map(str::to_string),
        position,
    };

    ContentSegment {
        id: format!("seg_{position}"),
        text,
        relevance,
        confidence,
        metadata,
        noise_types,
        removal_confidence,
    }
}

/// Summed category noise plus the fragment penalty, with the categories that fired.
pub fn noise_score(text: &str) -> (f64, Vec<NoiseType>) {
    let categories: [(&Regex, NoiseType); 4] = [
        (&ADVERTISEMENT, NoiseType::Advertisement),
        (&NAVIGATION, NoiseType::Navigation),
        (&BOILERPLATE, NoiseType::Boilerplate),
        (&SOCIAL_SHARE, NoiseType::SocialShare),
    ];

    let mut score = 0.0;
    let mut types = Vec::new();
    for (pattern, noise_type) in categories {
        let hits = pattern.find_iter(text).count();
        if hits > 0 {
            score += (hits as f64 * NOISE_WEIGHT_PER_MATCH).min(NOISE_CATEGORY_CAP);
            types.push(noise_type);
        }
    }

    if is_fragment(text) {
        score += FRAGMENT_PENALTY;
        types.push(NoiseType::Fragment);
    }

    (score, types)
}

fn is_fragment(text: &str) -> bool {
    let long_words = text
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .count();
    text.chars().count() < 10 || long_words < 3
}

/// Relevance score in [0,1], rounded to 2 decimals.
pub fn relevance_score(text: &str) -> f64 {
    let mut score = RELEVANCE_BASE;
    if NUMERIC_SIGNAL.is_match(text) {
        score += NUMERIC_SIGNAL_BONUS;
    }
    if TEMPORAL_SIGNAL.is_match(text) {
        score += TEMPORAL_SIGNAL_BONUS;
    }
    if KEY_VALUE.is_match(text) {
        score += KEY_VALUE_BONUS;
    }
    if text.chars().count() < 20 {
        score -= SHORT_CONTENT_PENALTY;
    }
    round2(score.clamp(0.0, 1.0))
}

pub fn relevance_class(score: f64) -> RelevanceClass {
    if score >= HIGHLY_RELEVANT_MIN {
        RelevanceClass::HighlyRelevant
    } else if score >= MODERATELY_RELEVANT_MIN {
        RelevanceClass::ModeratelyRelevant
    } else {
        RelevanceClass::LowRelevance
    }
}
