use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::QualityMetrics;

/// Review state of a generated variation. Starts at draft and is only ever
/// moved by an explicit review command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Draft,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Draft => write!(f, "draft"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ApprovalStatus::Draft),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// Caller-facing parameters of one generation request. Hashed (together
/// with the backend identity) into the cache fingerprint, so every field
/// that changes the output must live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub content_type: String,
    #[serde(default)]
    pub context: Option<String>,
    pub max_length: u32,
    pub variation_count: u32,
    #[serde(default)]
    pub template: Option<String>,
}

/// One stored variation from a generation request, with the quality
/// snapshot taken at generation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: String,
    pub persona_id: String,
    pub content_type: String,
    pub body: String,
    pub quality: QualityMetrics,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub variation_index: u32,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl GeneratedContent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persona_id: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
        quality: QualityMetrics,
        provider: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        variation_index: u32,
    ) -> Self {
        GeneratedContent {
            id: Uuid::new_v4().to_string(),
            persona_id: persona_id.into(),
            content_type: content_type.into(),
            body: body.into(),
            quality,
            provider: provider.into(),
            model: model.into(),
            temperature,
            variation_index,
            status: ApprovalStatus::Draft,
            created_at: Utc::now(),
        }
    }
}

/// Per-variation persistence outcome. A failed save keeps the generated
/// text so the caller still sees it and can retry; it is never silently
/// dropped and never fails the sibling saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { id: String },
    Failed { error: String },
}

/// A scored, ranked variation as returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredVariation {
    pub content: GeneratedContent,
    pub save: SaveOutcome,
}
