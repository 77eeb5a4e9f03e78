//! Persona derivation from questionnaire answers.
//!
//! Only free text is interpreted; other answer types are stored as
//! submitted and folded into the voice traits untouched. Resubmission
//! updates the existing active persona in place rather than creating a
//! second one.

use serde::{Deserialize, Serialize};

use crate::core::persona::{tone_keywords, AnswerType, Persona};

/// Question keys the derivation understands directly. Everything else
/// lands in the persona's voice traits.
const KEY_ARTIST_NAME: &str = "artist_name";
const KEY_TARGET_AUDIENCE: &str = "target_audience";
const THEME_KEYS: [&str; 3] = ["themes", "influences", "musical_style"];

const TONE_LABELS: [&str; 5] = ["casual", "professional", "edgy", "friendly", "energetic"];
const DEFAULT_TONE: &str = "friendly";
const MAX_THEMES: usize = 8;

/// One answer as submitted through the questionnaire surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub key: String,
    pub question: String,
    pub answer: String,
    #[serde(default, rename = "type")]
    pub answer_type: AnswerType,
}

/// Derive (or refresh) an artist's persona from their answers.
pub fn derive_persona(
    artist_id: &str,
    existing: Option<&Persona>,
    answers: &[SubmittedAnswer],
) -> Persona {
    let mut persona = existing
        .cloned()
        .unwrap_or_else(|| Persona::new(artist_id, artist_id));
    persona.active = true;
    persona.updated_at = chrono::Utc::now();

    for answer in answers {
        if answer.answer.trim().is_empty() {
            continue;
        }
        match answer.key.as_str() {
            KEY_ARTIST_NAME => persona.name = answer.answer.trim().to_string(),
            KEY_TARGET_AUDIENCE => persona.target_audience = answer.answer.trim().to_string(),
            key if THEME_KEYS.contains(&key) => {
                merge_themes(&mut persona.themes, &answer.answer);
            }
            key => {
                persona
                    .voice_traits
                    .insert(key.to_string(), answer.answer.trim().to_string());
            }
        }
    }

    if let Some(tone) = infer_tone(answers) {
        persona.tone = tone;
    } else if existing.is_none() {
        persona.tone = DEFAULT_TONE.to_string();
    }

    persona
}

/// Pick the tone whose register words appear most often across the
/// free-text answers. None when nothing matches, so an existing tone is
/// kept rather than reset.
fn infer_tone(answers: &[SubmittedAnswer]) -> Option<String> {
    let free_text: String = answers
        .iter()
        .filter(|a| a.answer_type == AnswerType::Text)
        .map(|a| a.answer.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let mut best: Option<(&str, usize)> = None;
    for label in TONE_LABELS {
        let hits = tone_keywords(label)
            .iter()
            .filter(|keyword| free_text.contains(*keyword))
            .count();
        // strictly greater keeps the earlier label on ties
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((label, hits));
        }
    }
    // An answer naming the tone outright wins over keyword counting.
    for label in TONE_LABELS {
        if free_text.contains(label) {
            return Some(label.to_string());
        }
    }

    best.map(|(label, _)| label.to_string())
}

/// Split a comma/newline-separated answer into theme keywords and merge
/// them in, deduplicating case-insensitively and keeping order.
fn merge_themes(themes: &mut Vec<String>, answer: &str) {
    for raw in answer.split([',', '\n', ';']) {
        let theme = raw.trim().to_lowercase();
        if theme.is_empty() {
            continue;
        }
        if themes.len() >= MAX_THEMES {
            break;
        }
        if !themes.iter().any(|t| t.eq_ignore_ascii_case(&theme)) {
            themes.push(theme);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(key: &str, text: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            key: key.to_string(),
            question: format!("About {}", key),
            answer: text.to_string(),
            answer_type: AnswerType::Text,
        }
    }

    #[test]
    fn test_derives_name_audience_and_themes() {
        let persona = derive_persona(
            "artist-1",
            None,
            &[
                answer("artist_name", "Nova"),
                answer("target_audience", "late-night listeners"),
                answer("themes", "Synthwave, Night Drives, neon"),
            ],
        );

        assert_eq!(persona.name, "Nova");
        assert_eq!(persona.target_audience, "late-night listeners");
        assert_eq!(persona.themes, vec!["synthwave", "night drives", "neon"]);
        assert!(persona.active);
    }

    #[test]
    fn test_tone_named_outright_wins() {
        let persona = derive_persona(
            "artist-1",
            None,
            &[answer("personality", "I keep things casual and fun")],
        );
        assert_eq!(persona.tone, "casual");
    }

    #[test]
    fn test_tone_defaults_when_nothing_matches() {
        let persona = derive_persona("artist-1", None, &[answer("goals", "play bigger rooms")]);
        assert_eq!(persona.tone, DEFAULT_TONE);
    }

    #[test]
    fn test_resubmission_updates_existing_persona_in_place() {
        let first = derive_persona(
            "artist-1",
            None,
            &[answer("artist_name", "Nova"), answer("themes", "synthwave")],
        );
        let second = derive_persona(
            "artist-1",
            Some(&first),
            &[answer("themes", "neon"), answer("target_audience", "drivers")],
        );

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Nova");
        assert_eq!(second.themes, vec!["synthwave", "neon"]);
        assert_eq!(second.target_audience, "drivers");
    }

    #[test]
    fn test_existing_tone_kept_when_answers_are_neutral() {
        let mut existing = Persona::new("artist-1", "Nova");
        existing.tone = "edgy".to_string();
        let updated = derive_persona("artist-1", Some(&existing), &[answer("goals", "tour more")]);
        assert_eq!(updated.tone, "edgy");
    }

    #[test]
    fn test_unrecognized_keys_become_voice_traits() {
        let persona = derive_persona("artist-1", None, &[answer("genre", "darkwave")]);
        assert_eq!(persona.voice_traits.get("genre").map(String::as_str), Some("darkwave"));
    }

    #[test]
    fn test_theme_list_is_capped_and_deduplicated() {
        let many = (0..12).map(|i| format!("theme-{}", i)).collect::<Vec<_>>().join(",");
        let persona = derive_persona(
            "artist-1",
            None,
            &[answer("themes", &many), answer("influences", "Theme-1")],
        );
        assert_eq!(persona.themes.len(), MAX_THEMES);
        assert_eq!(
            persona.themes.iter().filter(|t| t.as_str() == "theme-1").count(),
            1
        );
    }
}
