//! Heuristic content quality scoring.
//!
//! `score` is a pure function of (text, persona): identical input always
//! yields identical output, which is what makes generation results safely
//! cacheable by content hash. Every helper is total; degenerate input takes
//! the neutral 0.5 path instead of dividing by zero, so scoring can never
//! be the reason a generation request fails.

use serde::{Deserialize, Serialize};

use crate::core::persona::{tone_keywords, Persona};

const READABILITY_WEIGHT: f32 = 0.3;
// Engagement carries the most weight: it is the primary product goal.
const ENGAGEMENT_WEIGHT: f32 = 0.4;
const BRAND_WEIGHT: f32 = 0.3;

/// Below this a dimension emits a canned issue and suggestion.
const ISSUE_THRESHOLD: f32 = 0.6;

/// Per-signal engagement increment and the length-band bonus.
const SIGNAL_BONUS: f32 = 0.08;
const LENGTH_BONUS: f32 = 0.1;

/// Character band around a typical social post length.
const LENGTH_BAND: std::ops::RangeInclusive<usize> = 60..=280;

/// Cap on the theme-coverage bonus, and the per-match tone bonus with cap.
const THEME_BONUS_CAP: f32 = 0.3;
const TONE_BONUS: f32 = 0.05;
const TONE_BONUS_CAP: f32 = 0.2;

const EMOTION_WORDS: [&str; 10] = [
    "love", "amazing", "excited", "incredible", "proud", "beautiful", "unforgettable", "thrilled",
    "heart", "dream",
];

const URGENCY_WORDS: [&str; 9] = [
    "now", "today", "tonight", "new", "soon", "limited", "first", "finally", "just dropped",
];

/// The result of scoring one piece of text against one persona. Ephemeral;
/// persisted only as a snapshot inside generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall: f32,
    pub readability: f32,
    pub engagement: f32,
    pub brand_consistency: f32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn score(text: &str, persona: &Persona) -> QualityMetrics {
    let readability = readability_score(text);
    let engagement = engagement_score(text);
    let brand_consistency = brand_consistency_score(text, persona);

    let overall = (READABILITY_WEIGHT * readability
        + ENGAGEMENT_WEIGHT * engagement
        + BRAND_WEIGHT * brand_consistency)
        .clamp(0.0, 1.0);

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    if readability < ISSUE_THRESHOLD {
        issues.push("Text may be hard to read".to_string());
        suggestions.push("Use shorter sentences and simpler words".to_string());
    }
    if engagement < ISSUE_THRESHOLD {
        issues.push("Content lacks engagement hooks".to_string());
        suggestions.push("Add a question, a call to action, or address the reader directly".to_string());
    }
    if brand_consistency < ISSUE_THRESHOLD {
        issues.push("Content does not reflect the persona's voice".to_string());
        suggestions.push("Work the persona's themes and tone into the text".to_string());
    }

    QualityMetrics {
        overall,
        readability,
        engagement,
        brand_consistency,
        issues,
        suggestions,
    }
}

/// Normalized Flesch reading ease. Zero sentences or words yields a
/// neutral 0.5 instead of a division by zero.
fn readability_score(text: &str) -> f32 {
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let words: Vec<&str> = text.split_whitespace().collect();

    if sentences == 0 || words.is_empty() {
        return 0.5;
    }

    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
    let words_per_sentence = words.len() as f32 / sentences as f32;
    let syllables_per_word = syllables as f32 / words.len() as f32;

    let ease = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;
    (ease / 100.0).clamp(0.0, 1.0)
}

/// Vowel-group heuristic with a trailing-silent-e adjustment.
fn count_syllables(word: &str) -> usize {
    let letters: String = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();

    let mut count = 0;
    let mut previous_was_vowel = false;
    for c in letters.chars() {
        let is_vowel = "aeiouy".contains(c);
        if is_vowel && !previous_was_vowel {
            count += 1;
        }
        previous_was_vowel = is_vowel;
    }

    if letters.ends_with('e') && count > 1 {
        count -= 1;
    }

    count.max(1)
}

/// Fixed increment per matched engagement signal, plus a length-band
/// bonus, clamped to 1.0.
fn engagement_score(text: &str) -> f32 {
    let mut score = 0.5;
    let lower = text.to_lowercase();

    if text.contains('!') || text.contains('?') {
        score += SIGNAL_BONUS;
    }
    if lower
        .split_whitespace()
        .any(|w| matches!(strip_word(w), "you" | "your" | "yours" | "you're" | "you'll"))
    {
        score += SIGNAL_BONUS;
    }
    if EMOTION_WORDS.iter().any(|w| lower.contains(w)) {
        score += SIGNAL_BONUS;
    }
    if URGENCY_WORDS.iter().any(|w| lower.contains(w)) {
        score += SIGNAL_BONUS;
    }
    if has_prefixed_token(text, '@') {
        score += SIGNAL_BONUS;
    }
    if has_prefixed_token(text, '#') {
        score += SIGNAL_BONUS;
    }
    if LENGTH_BAND.contains(&text.chars().count()) {
        score += LENGTH_BONUS;
    }

    score.min(1.0)
}

fn strip_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
}

/// A mention/hashtag-style token: the marker immediately followed by an
/// alphanumeric character.
fn has_prefixed_token(text: &str, marker: char) -> bool {
    text.split_whitespace().any(|w| {
        let mut chars = w.chars();
        chars.next() == Some(marker) && chars.next().map_or(false, |c| c.is_ascii_alphanumeric())
    })
}

/// Theme coverage plus tone-register matches, both capped, on a 0.5 base.
fn brand_consistency_score(text: &str, persona: &Persona) -> f32 {
    let mut score = 0.5;
    let lower = text.to_lowercase();

    if !persona.themes.is_empty() {
        let matched = persona
            .themes
            .iter()
            .filter(|theme| lower.contains(&theme.to_lowercase()))
            .count();
        score += THEME_BONUS_CAP * matched as f32 / persona.themes.len() as f32;
    }

    let tone_hits = tone_keywords(&persona.tone)
        .iter()
        .filter(|keyword| lower.contains(*keyword))
        .count();
    score += (TONE_BONUS * tone_hits as f32).min(TONE_BONUS_CAP);

    score.min(1.0)
}
