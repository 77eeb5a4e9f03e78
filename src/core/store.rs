use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::content::{ApprovalStatus, GeneratedContent};
use super::error::{ContentError, Result};
use super::persona::{AnswerType, Persona, PersonaWithResponses, QuestionnaireResponse};
use super::template::ContentTemplate;

/// SQLite-backed storage for personas, questionnaire responses, templates
/// and generated content.
pub struct ProfileStore {
    conn: Connection,
}

impl ProfileStore {
    /// Open (and if needed bootstrap) the store at the given database path.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS personas (
                id TEXT PRIMARY KEY,
                artist_id TEXT NOT NULL,
                name TEXT NOT NULL,
                tone TEXT NOT NULL,
                target_audience TEXT NOT NULL,
                themes TEXT NOT NULL,
                voice_traits TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active_persona
                ON personas(artist_id) WHERE active = 1;

            CREATE TABLE IF NOT EXISTS questionnaire_responses (
                persona_id TEXT NOT NULL,
                question_key TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                answer_type TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (persona_id, question_key)
            );

            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                content_type TEXT NOT NULL,
                body TEXT NOT NULL,
                variables TEXT NOT NULL,
                description TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_templates_type ON templates(content_type);

            CREATE TABLE IF NOT EXISTS generated_content (
                id TEXT PRIMARY KEY,
                persona_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                body TEXT NOT NULL,
                quality TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                temperature REAL NOT NULL,
                variation_index INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_content_persona ON generated_content(persona_id);",
        )?;

        Ok(Self { conn })
    }

    /// Insert or update a persona. When the persona is active, any other
    /// persona of the same artist is deactivated first, keeping the
    /// one-active-persona-per-artist invariant.
    pub fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        if persona.active {
            self.conn.execute(
                "UPDATE personas SET active = 0, updated_at = ?1
                 WHERE artist_id = ?2 AND id != ?3 AND active = 1",
                params![Utc::now().to_rfc3339(), &persona.artist_id, &persona.id],
            )?;
        }

        self.conn.execute(
            "INSERT INTO personas
                (id, artist_id, name, tone, target_audience, themes, voice_traits,
                 active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tone = excluded.tone,
                target_audience = excluded.target_audience,
                themes = excluded.themes,
                voice_traits = excluded.voice_traits,
                active = excluded.active,
                updated_at = excluded.updated_at",
            params![
                &persona.id,
                &persona.artist_id,
                &persona.name,
                &persona.tone,
                &persona.target_audience,
                serde_json::to_string(&persona.themes)?,
                serde_json::to_string(&persona.voice_traits)?,
                persona.active,
                persona.created_at.to_rfc3339(),
                persona.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// The artist's active persona with all its questionnaire responses.
    /// Absent is `Ok(None)`; only storage failures are errors. Two separate
    /// queries, so no joined row can ever fabricate a persona out of NULLs.
    pub fn active_persona(&self, artist_id: &str) -> Result<Option<PersonaWithResponses>> {
        let persona = self
            .conn
            .query_row(
                "SELECT id, artist_id, name, tone, target_audience, themes, voice_traits,
                        active, created_at, updated_at
                 FROM personas WHERE artist_id = ?1 AND active = 1",
                params![artist_id],
                persona_from_row,
            )
            .optional()?;

        let persona = match persona {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut stmt = self.conn.prepare(
            "SELECT persona_id, question_key, question, answer, answer_type, updated_at
             FROM questionnaire_responses WHERE persona_id = ?1
             ORDER BY question_key",
        )?;
        let responses = stmt
            .query_map(params![&persona.id], response_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(PersonaWithResponses { persona, responses }))
    }

    /// Upsert one questionnaire answer. Re-submitting a question key
    /// overwrites the previous answer instead of duplicating it.
    pub fn upsert_response(&self, response: &QuestionnaireResponse) -> Result<()> {
        self.conn.execute(
            "INSERT INTO questionnaire_responses
                (persona_id, question_key, question, answer, answer_type, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(persona_id, question_key) DO UPDATE SET
                question = excluded.question,
                answer = excluded.answer,
                answer_type = excluded.answer_type,
                updated_at = excluded.updated_at",
            params![
                &response.persona_id,
                &response.question_key,
                &response.question,
                &response.answer,
                response.answer_type.to_string(),
                response.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Validate and register a template. Registering an existing name
    /// overwrites its body and variables, keeping the original id.
    pub fn register_template(&self, template: &ContentTemplate) -> Result<ContentTemplate> {
        template.validate()?;

        self.conn.execute(
            "INSERT INTO templates
                (id, name, content_type, body, variables, description, active,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                content_type = excluded.content_type,
                body = excluded.body,
                variables = excluded.variables,
                description = excluded.description,
                active = 1,
                updated_at = excluded.updated_at",
            params![
                &template.id,
                &template.name,
                &template.content_type,
                &template.body,
                serde_json::to_string(&template.variables)?,
                &template.description,
                template.created_at.to_rfc3339(),
                template.updated_at.to_rfc3339(),
            ],
        )?;

        self.template_by_name(&template.name)?
            .ok_or_else(|| ContentError::Storage(format!("template '{}' missing after upsert", template.name)))
    }

    pub fn template_by_name(&self, name: &str) -> Result<Option<ContentTemplate>> {
        let template = self
            .conn
            .query_row(
                "SELECT id, name, content_type, body, variables, description, active,
                        created_at, updated_at
                 FROM templates WHERE name = ?1 AND active = 1",
                params![name],
                template_from_row,
            )
            .optional()?;
        Ok(template)
    }

    /// Active templates, optionally filtered by content type, ordered by
    /// name so the listing is stable.
    pub fn list_templates(&self, content_type: Option<&str>) -> Result<Vec<ContentTemplate>> {
        let templates = match content_type {
            Some(content_type) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, name, content_type, body, variables, description, active,
                            created_at, updated_at
                     FROM templates WHERE active = 1 AND content_type = ?1
                     ORDER BY name",
                )?;
                let rows = stmt.query_map(params![content_type], template_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, name, content_type, body, variables, description, active,
                            created_at, updated_at
                     FROM templates WHERE active = 1
                     ORDER BY name",
                )?;
                let rows = stmt.query_map([], template_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(templates)
    }

    /// Soft-delete: the template is deactivated, not erased.
    pub fn deactivate_template(&self, name: &str) -> Result<()> {
        let rows_affected = self.conn.execute(
            "UPDATE templates SET active = 0, updated_at = ?1 WHERE name = ?2 AND active = 1",
            params![Utc::now().to_rfc3339(), name],
        )?;

        if rows_affected == 0 {
            return Err(ContentError::NotFound(format!("template '{}'", name)));
        }
        Ok(())
    }

    /// Persist one generated variation and return its id.
    pub fn save_content(&self, content: &GeneratedContent) -> Result<String> {
        self.conn.execute(
            "INSERT INTO generated_content
                (id, persona_id, content_type, body, quality, provider, model,
                 temperature, variation_index, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &content.id,
                &content.persona_id,
                &content.content_type,
                &content.body,
                serde_json::to_string(&content.quality)?,
                &content.provider,
                &content.model,
                content.temperature,
                content.variation_index,
                content.status.to_string(),
                content.created_at.to_rfc3339(),
            ],
        )?;
        Ok(content.id.clone())
    }

    /// Stored variations for a persona, newest first.
    pub fn list_content(&self, persona_id: &str) -> Result<Vec<GeneratedContent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, persona_id, content_type, body, quality, provider, model,
                    temperature, variation_index, status, created_at
             FROM generated_content WHERE persona_id = ?1
             ORDER BY created_at DESC, variation_index ASC",
        )?;
        let content = stmt
            .query_map(params![persona_id], content_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(content)
    }

    /// Test hook for breaking storage out from under the caller.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.conn.execute_batch(sql).unwrap();
    }

    /// Explicit review transition; the only way a status ever changes.
    pub fn update_content_status(&self, id: &str, status: ApprovalStatus) -> Result<()> {
        let rows_affected = self.conn.execute(
            "UPDATE generated_content SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;

        if rows_affected == 0 {
            return Err(ContentError::NotFound(format!("generated content '{}'", id)));
        }
        Ok(())
    }
}

fn parse_timestamp(index: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_json<T: serde::de::DeserializeOwned>(index: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_label<T>(index: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn persona_from_row(row: &Row<'_>) -> rusqlite::Result<Persona> {
    Ok(Persona {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        name: row.get(2)?,
        tone: row.get(3)?,
        target_audience: row.get(4)?,
        themes: parse_json(5, row.get(5)?)?,
        voice_traits: parse_json(6, row.get(6)?)?,
        active: row.get(7)?,
        created_at: parse_timestamp(8, row.get(8)?)?,
        updated_at: parse_timestamp(9, row.get(9)?)?,
    })
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<QuestionnaireResponse> {
    Ok(QuestionnaireResponse {
        persona_id: row.get(0)?,
        question_key: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        answer_type: parse_label::<AnswerType>(4, row.get(4)?)?,
        updated_at: parse_timestamp(5, row.get(5)?)?,
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<ContentTemplate> {
    Ok(ContentTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        variables: parse_json(4, row.get(4)?)?,
        description: row.get(5)?,
        active: row.get(6)?,
        created_at: parse_timestamp(7, row.get(7)?)?,
        updated_at: parse_timestamp(8, row.get(8)?)?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedContent> {
    Ok(GeneratedContent {
        id: row.get(0)?,
        persona_id: row.get(1)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        quality: parse_json(4, row.get(4)?)?,
        provider: row.get(5)?,
        model: row.get(6)?,
        temperature: row.get(7)?,
        variation_index: row.get(8)?,
        status: parse_label::<ApprovalStatus>(9, row.get(9)?)?,
        created_at: parse_timestamp(10, row.get(10)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::{TemplateDefinition, TemplateVariable, VariableType};
    use crate::scoring::QualityMetrics;

    fn create_test_store() -> ProfileStore {
        ProfileStore::new(":memory:".into()).unwrap()
    }

    fn test_persona(artist_id: &str, name: &str) -> Persona {
        let mut persona = Persona::new(artist_id, name);
        persona.tone = "casual".to_string();
        persona.themes = vec!["synthwave".to_string()];
        persona
    }

    fn test_template(name: &str) -> ContentTemplate {
        TemplateDefinition {
            name: name.to_string(),
            content_type: "social_post".to_string(),
            body: "Catch {{artist_name}} live!".to_string(),
            variables: vec![TemplateVariable {
                name: "artist_name".to_string(),
                var_type: VariableType::Text,
                required: true,
                default: None,
                options: None,
            }],
            description: None,
        }
        .into_template()
    }

    fn neutral_metrics() -> QualityMetrics {
        QualityMetrics {
            overall: 0.5,
            readability: 0.5,
            engagement: 0.5,
            brand_consistency: 0.5,
            issues: vec![],
            suggestions: vec![],
        }
    }

    fn test_content(persona_id: &str, index: u32) -> GeneratedContent {
        GeneratedContent::new(
            persona_id,
            "social_post",
            format!("variation {}", index),
            neutral_metrics(),
            "ollama",
            "qwen2.5",
            0.7 + 0.1 * index as f32,
            index,
        )
    }

    #[test]
    fn test_upsert_and_fetch_active_persona() {
        let store = create_test_store();
        let persona = test_persona("artist-1", "Nova");
        store.upsert_persona(&persona).unwrap();

        let found = store.active_persona("artist-1").unwrap().unwrap();
        assert_eq!(found.persona.id, persona.id);
        assert_eq!(found.persona.themes, vec!["synthwave"]);
        assert!(found.responses.is_empty());
    }

    #[test]
    fn test_absent_persona_is_none_not_error() {
        let store = create_test_store();
        assert!(store.active_persona("nobody").unwrap().is_none());
    }

    #[test]
    fn test_new_active_persona_deactivates_previous() {
        let store = create_test_store();
        let first = test_persona("artist-1", "Nova");
        let second = test_persona("artist-1", "Nova Reborn");

        store.upsert_persona(&first).unwrap();
        store.upsert_persona(&second).unwrap();

        let active = store.active_persona("artist-1").unwrap().unwrap();
        assert_eq!(active.persona.id, second.id);
        assert_eq!(active.persona.name, "Nova Reborn");
    }

    #[test]
    fn test_response_resubmission_overwrites() {
        let store = create_test_store();
        let persona = test_persona("artist-1", "Nova");
        store.upsert_persona(&persona).unwrap();

        let mut response = QuestionnaireResponse {
            persona_id: persona.id.clone(),
            question_key: "target_audience".to_string(),
            question: "Who listens to you?".to_string(),
            answer: "night owls".to_string(),
            answer_type: AnswerType::Text,
            updated_at: Utc::now(),
        };
        store.upsert_response(&response).unwrap();

        response.answer = "city drivers".to_string();
        store.upsert_response(&response).unwrap();

        let found = store.active_persona("artist-1").unwrap().unwrap();
        assert_eq!(found.responses.len(), 1);
        assert_eq!(found.responses[0].answer, "city drivers");
    }

    #[test]
    fn test_register_template_same_name_is_upsert() {
        let store = create_test_store();
        let first = store.register_template(&test_template("launch")).unwrap();

        let mut replacement = test_template("launch");
        replacement.body = "See {{artist_name}} tonight!".to_string();
        let second = store.register_template(&replacement).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.body, "See {{artist_name}} tonight!");
        assert_eq!(store.list_templates(None).unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_template() {
        let store = create_test_store();
        let mut broken = test_template("broken");
        broken.body = "no placeholders here".to_string();
        match store.register_template(&broken) {
            Err(ContentError::Validation(problems)) => assert!(!problems.is_empty()),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.template_by_name("broken").unwrap().is_none());
    }

    #[test]
    fn test_list_templates_filters_by_type_and_orders_by_name() {
        let store = create_test_store();
        let mut bio = test_template("zz-bio");
        bio.content_type = "bio".to_string();
        store.register_template(&bio).unwrap();
        store.register_template(&test_template("b-post")).unwrap();
        store.register_template(&test_template("a-post")).unwrap();

        let posts = store.list_templates(Some("social_post")).unwrap();
        let names: Vec<&str> = posts.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a-post", "b-post"]);

        assert_eq!(store.list_templates(None).unwrap().len(), 3);
    }

    #[test]
    fn test_deactivated_template_disappears_from_listing() {
        let store = create_test_store();
        store.register_template(&test_template("old")).unwrap();
        store.deactivate_template("old").unwrap();

        assert!(store.template_by_name("old").unwrap().is_none());
        assert!(store.list_templates(None).unwrap().is_empty());
        assert!(matches!(
            store.deactivate_template("old"),
            Err(ContentError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_list_and_review_content() {
        let store = create_test_store();
        let persona = test_persona("artist-1", "Nova");
        store.upsert_persona(&persona).unwrap();

        let first = test_content(&persona.id, 0);
        let second = test_content(&persona.id, 1);
        store.save_content(&first).unwrap();
        store.save_content(&second).unwrap();

        let listed = store.list_content(&persona.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.status == ApprovalStatus::Draft));

        store
            .update_content_status(&first.id, ApprovalStatus::Approved)
            .unwrap();
        let listed = store.list_content(&persona.id).unwrap();
        let approved = listed.iter().find(|c| c.id == first.id).unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);

        assert!(matches!(
            store.update_content_status("missing", ApprovalStatus::Rejected),
            Err(ContentError::NotFound(_))
        ));
    }
}
