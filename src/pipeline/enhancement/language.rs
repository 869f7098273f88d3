//! Lightweight language detection for cleaned content.
//!
//! Keyword frequency plus a diacritic bonus. Deterministic, no model call.

const ENGLISH_INDICATORS: &[&str] = &[
    "the ", "and ", "was ", "for ", "are ", "but ", "not ", "you ", "with ", "this ",
    "that ", "have ", "from ", "will ", "they ", "been ", "price", "today", "shares",
];

const FRENCH_INDICATORS: &[&str] = &[
    "le ", "la ", "les ", "une ", "des ", "du ", "est ", "et ", "pour ", "dans ",
    "avec ", "sur ", "qui ", "que ", "mais ", "aujourd'hui", "prix", "d'", "l'", "qu'",
];

const SPANISH_INDICATORS: &[&str] = &[
    "el ", "los ", "las ", "una ", "del ", "es ", "y ", "para ", "con ", "por ",
    "que ", "pero ", "como ", "hoy", "precio", "está", "según",
];

const GERMAN_INDICATORS: &[&str] = &[
    "der ", "die ", "das ", "und ", "ist ", "nicht ", "mit ", "für ", "auf ", "ein ",
    "eine ", "von ", "zu ", "heute", "preis", "über",
];

/// Too little text to call.
const MIN_DETECTABLE_LEN: usize = 20;

/// Detect the primary language: `en`, `fr`, `es`, `de`, or `unknown`.
/// Earlier languages in that list win ties.
pub fn detect_language(text: &str) -> &'static str {
    if text.trim().chars().count() < MIN_DETECTABLE_LEN {
        return "unknown";
    }

    let lower = text.to_lowercase();
    let scores = [
        ("en", count_indicators(&lower, ENGLISH_INDICATORS)),
        ("fr", count_indicators(&lower, FRENCH_INDICATORS) + diacritic_bonus(&lower, "éèêçàâœ")),
        ("es", count_indicators(&lower, SPANISH_INDICATORS) + diacritic_bonus(&lower, "ñáíóú¿¡")),
        ("de", count_indicators(&lower, GERMAN_INDICATORS) + diacritic_bonus(&lower, "äöüß")),
    ];

    let mut best = ("unknown", 0u32);
    for (code, score) in scores {
        if score > best.1 {
            best = (code, score);
        }
    }
    best.0
}

fn count_indicators(lower_text: &str, indicators: &[&str]) -> u32 {
    indicators
        .iter()
        .map(|indicator| lower_text.matches(indicator).count() as u32)
        .sum()
}

/// Every 2 language-specific characters count as one indicator.
fn diacritic_bonus(lower_text: &str, chars: &str) -> u32 {
    lower_text.chars().filter(|c| chars.contains(*c)).count() as u32 / 2
}
