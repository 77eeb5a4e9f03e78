//! The generation orchestrator: persona-conditioned prompt, N scored
//! variations, stable ranking, per-item persistence.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::ai_provider::TextBackend;
use crate::cache::{request_fingerprint, RateLimiter, TtlCache};
use crate::core::content::{GeneratedContent, GenerationRequest, SaveOutcome, ScoredVariation};
use crate::core::error::{ContentError, Result};
use crate::core::persona::PersonaWithResponses;
use crate::core::store::ProfileStore;
use crate::scoring;

/// Hard cap on requested variations.
pub const MAX_VARIATIONS: u32 = 5;
pub const DEFAULT_VARIATIONS: u32 = 3;
pub const DEFAULT_MAX_LENGTH: u32 = 150;

/// Each successive variation runs slightly hotter, which diversifies the
/// outputs without a separate diversity mechanism.
const BASE_TEMPERATURE: f32 = 0.7;
const TEMPERATURE_STEP: f32 = 0.1;

pub struct ContentGenerator<B: TextBackend> {
    backend: B,
    cache: TtlCache<Vec<ScoredVariation>>,
    limiter: RateLimiter,
}

impl<B: TextBackend> ContentGenerator<B> {
    pub fn new(backend: B, cache: TtlCache<Vec<ScoredVariation>>, limiter: RateLimiter) -> Self {
        ContentGenerator {
            backend,
            cache,
            limiter,
        }
    }

    /// Produce, score, rank and persist up to `variation_count` variations
    /// for the persona.
    ///
    /// A backend failure fails the whole request. An empty reply only drops
    /// that variation; all replies empty yields an empty list, which the
    /// caller reports as "no content generated" rather than an error. Save
    /// failures are isolated per variation and carried on the outcome.
    pub async fn generate(
        &self,
        store: &ProfileStore,
        persona: &PersonaWithResponses,
        request: &GenerationRequest,
    ) -> Result<Vec<ScoredVariation>> {
        let variation_count = request.variation_count.clamp(1, MAX_VARIATIONS);
        let (provider, model) = self.backend.identity();

        let fingerprint =
            request_fingerprint(&(&provider, &model, &persona.persona.id, request))?;
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "generation cache hit");
            return Ok(cached);
        }

        let prompt = build_prompt(store, persona, request)?;

        let mut contents: Vec<GeneratedContent> = Vec::new();
        for index in 0..variation_count {
            let temperature = BASE_TEMPERATURE + TEMPERATURE_STEP * index as f32;

            self.limiter.acquire().await;
            let text = self
                .backend
                .generate(&prompt, request.max_length, temperature)
                .await?;

            let text = text.trim();
            if text.is_empty() {
                warn!(variation = index, "backend returned empty text, dropping variation");
                continue;
            }

            let quality = scoring::score(text, &persona.persona);
            contents.push(GeneratedContent::new(
                &persona.persona.id,
                &request.content_type,
                text,
                quality,
                &provider,
                &model,
                temperature,
                index,
            ));
        }

        // Rank by overall score, descending. The sort is stable, so equal
        // scores keep their generation order.
        contents.sort_by(|a, b| {
            b.quality
                .overall
                .partial_cmp(&a.quality.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut variations = Vec::with_capacity(contents.len());
        for content in contents {
            let save = match store.save_content(&content) {
                Ok(id) => SaveOutcome::Saved { id },
                Err(e) => {
                    warn!(content_id = %content.id, error = %e, "failed to persist variation");
                    SaveOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            variations.push(ScoredVariation { content, save });
        }

        self.cache.insert(fingerprint, variations.clone());
        Ok(variations)
    }
}

/// One persona-conditioned prompt shared by every variation: tone, audience
/// and themes, a content-type lead-in, the caller's context (or a generic
/// fallback), and optionally a substituted template as a draft to work from.
fn build_prompt(
    store: &ProfileStore,
    persona: &PersonaWithResponses,
    request: &GenerationRequest,
) -> Result<String> {
    let p = &persona.persona;

    let mut prompt = format!(
        "You are the social media voice of {}, an artist with a {} tone.\n",
        p.name, p.tone
    );
    prompt.push_str(&format!("Their audience: {}.\n", p.target_audience));
    if !p.themes.is_empty() {
        prompt.push_str(&format!("Recurring themes: {}.\n", p.themes.join(", ")));
    }

    let lead_in = match request.content_type.as_str() {
        "social_post" => "Write a short social media post",
        "announcement" => "Write an announcement post",
        "bio" => "Write a profile bio",
        "caption" => "Write a photo caption",
        other => {
            debug!(content_type = other, "no dedicated lead-in for content type");
            "Write a piece of social media copy"
        }
    };
    let subject = request
        .context
        .as_deref()
        .unwrap_or("their latest work");
    prompt.push_str(&format!("{} about {}.\n", lead_in, subject));

    if let Some(template_name) = &request.template {
        let template = store
            .template_by_name(template_name)?
            .ok_or_else(|| ContentError::NotFound(format!("template '{}'", template_name)))?;

        let mut values: HashMap<String, String> = HashMap::new();
        values.insert("artist_name".to_string(), p.name.clone());
        values.insert("tone".to_string(), p.tone.clone());
        values.insert("audience".to_string(), p.target_audience.clone());
        if let Some(genre) = p.voice_traits.get("genre") {
            values.insert("genre".to_string(), genre.clone());
        }
        if let Some(context) = &request.context {
            values.insert("context".to_string(), context.clone());
        }

        let draft = template.substitute(&values)?;
        prompt.push_str(&format!("Use this draft as the starting point:\n{}\n", draft));
    }

    prompt.push_str(&format!(
        "Keep it under {} words and stay in character.",
        request.max_length
    ));

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Duration;

    use crate::core::persona::Persona;

    /// Scripted backend: pops replies in order, counts every call.
    struct StubBackend {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubBackend {
        fn with_replies(replies: &[&str]) -> Self {
            StubBackend {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            StubBackend {
                replies: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextBackend for &StubBackend {
        fn generate(
            &self,
            _prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> impl std::future::Future<Output = Result<String>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = if self.fail {
                Err(ContentError::Backend("provider unreachable".to_string()))
            } else {
                Ok(self.replies.lock().unwrap().pop().unwrap_or_default())
            };
            async move { next }
        }

        fn identity(&self) -> (String, String) {
            ("stub".to_string(), "scripted".to_string())
        }
    }

    fn generator(backend: &StubBackend) -> ContentGenerator<&StubBackend> {
        ContentGenerator::new(
            backend,
            TtlCache::new(Duration::from_secs(3600)),
            RateLimiter::new(100, Duration::from_secs(60)),
        )
    }

    fn seeded_store() -> (ProfileStore, PersonaWithResponses) {
        let store = ProfileStore::new(":memory:".into()).unwrap();
        let mut persona = Persona::new("artist-1", "Nova");
        persona.tone = "casual".to_string();
        persona.themes = vec!["synthwave".to_string()];
        store.upsert_persona(&persona).unwrap();
        let persona = store.active_persona("artist-1").unwrap().unwrap();
        (store, persona)
    }

    fn request(variations: u32) -> GenerationRequest {
        GenerationRequest {
            content_type: "social_post".to_string(),
            context: Some("the new single".to_string()),
            max_length: DEFAULT_MAX_LENGTH,
            variation_count: variations,
            template: None,
        }
    }

    #[tokio::test]
    async fn test_three_replies_yield_three_ranked_results() {
        let backend = StubBackend::with_replies(&[
            "A plain statement about music.",
            "You have to hear this! New synthwave single out now! #synthwave",
            "Another plain statement.",
        ]);
        let (store, persona) = seeded_store();

        let results = generator(&backend)
            .generate(&store, &persona, &request(3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].content.quality.overall >= pair[1].content.quality.overall);
        }
        // The hook-heavy on-theme reply must outrank the plain ones.
        assert!(results[0].content.body.contains("synthwave"));
        assert!(results
            .iter()
            .all(|v| matches!(v.save, SaveOutcome::Saved { .. })));
    }

    #[tokio::test]
    async fn test_all_empty_replies_is_empty_result_not_error() {
        let backend = StubBackend::with_replies(&["", "   ", ""]);
        let (store, persona) = seeded_store();

        let results = generator(&backend)
            .generate(&store, &persona, &request(3))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_partially_empty_replies_shrink_the_result() {
        let backend = StubBackend::with_replies(&["first take", "", "third take"]);
        let (store, persona) = seeded_store();

        let results = generator(&backend)
            .generate(&store, &persona, &request(3))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_fails_the_whole_request() {
        let backend = StubBackend::failing();
        let (store, persona) = seeded_store();

        let result = generator(&backend)
            .generate(&store, &persona, &request(3))
            .await;
        assert!(matches!(result, Err(ContentError::Backend(_))));
    }

    #[tokio::test]
    async fn test_identical_requests_hit_backend_once() {
        let backend = StubBackend::with_replies(&["take one", "take two", "take three"]);
        let (store, persona) = seeded_store();
        let generator = generator(&backend);

        let first = generator
            .generate(&store, &persona, &request(3))
            .await
            .unwrap();
        let second = generator
            .generate(&store, &persona, &request(3))
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 3);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].content.id, second[0].content.id);
        // Only the first pass persisted anything.
        assert_eq!(store.list_content(&persona.persona.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_variation_count_is_capped() {
        let backend = StubBackend::with_replies(&["a", "b", "c", "d", "e", "f", "g"]);
        let (store, persona) = seeded_store();

        let results = generator(&backend)
            .generate(&store, &persona, &request(50))
            .await
            .unwrap();
        assert_eq!(results.len(), MAX_VARIATIONS as usize);
        assert_eq!(backend.call_count(), MAX_VARIATIONS as usize);
    }

    #[tokio::test]
    async fn test_save_failures_are_isolated_per_variation() {
        let backend = StubBackend::with_replies(&["first take", "second take"]);
        let (store, persona) = seeded_store();
        // Break persistence only; generation and scoring must still succeed.
        store_drop_content_table(&store);

        let results = generator(&backend)
            .generate(&store, &persona, &request(2))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|v| matches!(v.save, SaveOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_missing_template_is_not_found() {
        let backend = StubBackend::with_replies(&["text"]);
        let (store, persona) = seeded_store();
        let mut req = request(1);
        req.template = Some("ghost".to_string());

        let result = generator(&backend).generate(&store, &persona, &req).await;
        assert!(matches!(result, Err(ContentError::NotFound(_))));
    }

    fn store_drop_content_table(store: &ProfileStore) {
        store.execute_raw("DROP TABLE generated_content");
    }
}
