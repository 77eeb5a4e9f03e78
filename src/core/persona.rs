use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An artist's voice profile, derived from their questionnaire answers.
///
/// At most one persona per artist is active at a time; the store enforces
/// this on upsert. Personas are mutated in place by later submissions,
/// never duplicated and never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub artist_id: String,
    pub name: String,
    /// Open set of register labels: casual, professional, edgy, friendly,
    /// energetic, ...
    pub tone: String,
    pub target_audience: String,
    /// Ordered theme keywords, most prominent first.
    pub themes: Vec<String>,
    pub voice_traits: HashMap<String, String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    pub fn new(artist_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Persona {
            id: Uuid::new_v4().to_string(),
            artist_id: artist_id.into(),
            name: name.into(),
            tone: "friendly".to_string(),
            target_audience: "music fans".to_string(),
            themes: Vec::new(),
            voice_traits: HashMap::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Declared type of a questionnaire answer. Only free text is interpreted
/// by persona derivation; the rest is stored as submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    #[default]
    Text,
    MultipleChoice,
    Scale,
    Boolean,
}

impl std::fmt::Display for AnswerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerType::Text => write!(f, "text"),
            AnswerType::MultipleChoice => write!(f, "multiple_choice"),
            AnswerType::Scale => write!(f, "scale"),
            AnswerType::Boolean => write!(f, "boolean"),
        }
    }
}

impl std::str::FromStr for AnswerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(AnswerType::Text),
            "multiple_choice" => Ok(AnswerType::MultipleChoice),
            "scale" => Ok(AnswerType::Scale),
            "boolean" => Ok(AnswerType::Boolean),
            _ => Err(format!("Unknown answer type: {}", s)),
        }
    }
}

/// One questionnaire answer, keyed by (persona_id, question_key).
/// Re-submitting the same key overwrites the previous answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub persona_id: String,
    pub question_key: String,
    pub question: String,
    pub answer: String,
    pub answer_type: AnswerType,
    pub updated_at: DateTime<Utc>,
}

/// The denormalized result of the persona accessor: the active persona
/// joined with all of its questionnaire responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaWithResponses {
    pub persona: Persona,
    pub responses: Vec<QuestionnaireResponse>,
}

/// Register words associated with a tone label. Used both for brand
/// consistency scoring and for template suggestion affinity. The word lists
/// are tuning knobs, not contracts.
pub fn tone_keywords(tone: &str) -> &'static [&'static str] {
    match tone.to_lowercase().as_str() {
        "casual" => &["hey", "gonna", "vibe", "chill", "fun", "stuff"],
        "professional" => &["announce", "present", "release", "official", "premiere"],
        "edgy" => &["raw", "bold", "wild", "loud", "unfiltered", "dark"],
        "friendly" => &["love", "thanks", "together", "share", "welcome", "friends"],
        "energetic" => &["hype", "fire", "pumped", "drop", "blast", "live"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_persona_defaults() {
        let persona = Persona::new("artist-1", "Nova");
        assert!(persona.active);
        assert_eq!(persona.tone, "friendly");
        assert!(!persona.id.is_empty());
        assert!(persona.themes.is_empty());
    }

    #[test]
    fn test_answer_type_round_trip() {
        for raw in ["text", "multiple_choice", "scale", "boolean"] {
            let parsed: AnswerType = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        assert!("essay".parse::<AnswerType>().is_err());
    }

    #[test]
    fn test_tone_keywords_unknown_tone_is_empty() {
        assert!(tone_keywords("baroque").is_empty());
        assert!(!tone_keywords("Casual").is_empty());
    }
}
