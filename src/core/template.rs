use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::error::{ContentError, Result};
use super::persona::{tone_keywords, Persona};

/// Variable names a persona can fill in directly. Templates declaring one
/// of these rank higher in suggestions because they need less manual input.
pub const PERSONA_FIELDS: [&str; 4] = ["artist_name", "genre", "audience", "tone"];

/// How many suggestions to return at most.
const SUGGESTION_LIMIT: usize = 5;

/// Affinity bonus for declaring a persona-reusable variable.
const PERSONA_FIELD_BONUS: f32 = 0.2;

/// Per-match bonus for tone keywords found in the body, and its cap.
const TONE_MATCH_BONUS: f32 = 0.1;
const TONE_BONUS_CAP: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Text => write!(f, "text"),
            VariableType::Number => write!(f, "number"),
            VariableType::Date => write!(f, "date"),
            VariableType::Boolean => write!(f, "boolean"),
            VariableType::Select => write!(f, "select"),
        }
    }
}

impl std::str::FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(VariableType::Text),
            "number" => Ok(VariableType::Number),
            "date" => Ok(VariableType::Date),
            "boolean" => Ok(VariableType::Boolean),
            "select" => Ok(VariableType::Select),
            _ => Err(format!("Unknown variable type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Allowed values; must be non-empty for select variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// A named text template whose body contains `{{name}}` placeholders.
///
/// Invariant, checked at registration: the set of placeholder names in the
/// body equals the set of declared variable names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTemplate {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub body: String,
    pub variables: Vec<TemplateVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A template definition as submitted for registration, before it has an
/// identity or timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    pub content_type: String,
    pub body: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TemplateDefinition {
    pub fn into_template(self) -> ContentTemplate {
        let now = Utc::now();
        ContentTemplate {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            content_type: self.content_type,
            body: self.body,
            variables: self.variables,
            description: self.description,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Extract placeholder names from `{{name}}` tokens, in order of first
/// appearance.
pub fn placeholders(body: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() && seen.insert(name.to_string()) {
                    names.push(name.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    names
}

impl ContentTemplate {
    /// Check the registration invariants, accumulating every problem rather
    /// than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("template name must not be empty".to_string());
        }
        if self.content_type.trim().is_empty() {
            problems.push("content type must not be empty".to_string());
        }
        if self.body.trim().is_empty() {
            problems.push("template body must not be empty".to_string());
        }

        for variable in &self.variables {
            if variable.name.trim().is_empty() {
                problems.push("variable with empty name".to_string());
                continue;
            }
            if variable.var_type == VariableType::Select
                && variable.options.as_ref().map_or(true, |o| o.is_empty())
            {
                problems.push(format!(
                    "select variable '{}' needs a non-empty options list",
                    variable.name
                ));
            }
        }

        let declared: HashSet<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        let used = placeholders(&self.body);
        let used_set: HashSet<&str> = used.iter().map(|s| s.as_str()).collect();

        for name in &used {
            if !declared.contains(name.as_str()) {
                problems.push(format!("placeholder '{{{{{}}}}}' is not declared", name));
            }
        }
        for variable in &self.variables {
            if !variable.name.trim().is_empty() && !used_set.contains(variable.name.as_str()) {
                problems.push(format!(
                    "variable '{}' is never referenced in the body",
                    variable.name
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ContentError::Validation(problems))
        }
    }

    /// Substitute variable values into the body.
    ///
    /// Every required variable absent from `values` is reported in one
    /// MissingVariables error. Absent optional variables fall back to their
    /// declared default. Anything still unresolved afterwards is replaced
    /// with the empty string and logged, not surfaced to the caller.
    pub fn substitute(&self, values: &HashMap<String, String>) -> Result<String> {
        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|v| v.required && !values.contains_key(&v.name))
            .map(|v| v.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ContentError::MissingVariables(missing));
        }

        let mut resolved: HashMap<&str, String> = HashMap::new();
        for variable in &self.variables {
            let value = values
                .get(&variable.name)
                .cloned()
                .or_else(|| variable.default.clone());
            if let Some(value) = value {
                resolved.insert(variable.name.as_str(), value);
            }
        }

        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = after[..end].trim();
                    match resolved.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            warn!(template = %self.name, placeholder = name, "unresolved placeholder replaced with empty string");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);

        Ok(normalize_whitespace(&out))
    }
}

/// Collapse runs of whitespace to a single space, keep paragraph breaks
/// (two or more newlines) as exactly one blank line, and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.extend(line.split_whitespace());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs.join("\n\n")
}

/// Rank an already type-filtered template list for a persona.
///
/// Without a persona the list is returned in its given (default) order.
/// Otherwise each template gets an affinity score and the list is sorted
/// descending, ties keeping the original order, truncated to the top 5.
pub fn rank_for_persona(
    templates: Vec<ContentTemplate>,
    persona: Option<&Persona>,
) -> Vec<ContentTemplate> {
    let persona = match persona {
        Some(p) => p,
        None => return templates.into_iter().take(SUGGESTION_LIMIT).collect(),
    };

    let mut scored: Vec<(f32, ContentTemplate)> = templates
        .into_iter()
        .map(|t| (affinity(&t, persona), t))
        .collect();
    // sort_by is stable, so equal scores keep their original order
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(SUGGESTION_LIMIT)
        .map(|(_, t)| t)
        .collect()
}

fn affinity(template: &ContentTemplate, persona: &Persona) -> f32 {
    let mut score = 1.0;

    if template
        .variables
        .iter()
        .any(|v| PERSONA_FIELDS.contains(&v.name.as_str()))
    {
        score += PERSONA_FIELD_BONUS;
    }

    let body = template.body.to_lowercase();
    let tone_hits = tone_keywords(&persona.tone)
        .iter()
        .filter(|keyword| body.contains(*keyword))
        .count();
    score += (TONE_MATCH_BONUS * tone_hits as f32).min(TONE_BONUS_CAP);

    score
}
