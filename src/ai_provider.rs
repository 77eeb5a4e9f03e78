use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{ContentError, Result};

/// The two interchangeable text-generation providers. Choosing one is an
/// orthogonal strategy selection; the orchestrator never falls back from
/// one to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(ContentError::Config(format!("Unknown provider: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// The seam between the orchestrator and whatever produces text. Both real
/// providers sit behind one client; tests substitute a scripted stub.
pub trait TextBackend {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Provider and model labels recorded on each generated variation.
    fn identity(&self) -> (String, String);
}

pub struct ProviderClient {
    config: BackendConfig,
    http_client: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ContentError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ProviderClient {
            config,
            http_client,
        })
    }

    async fn generate_openai(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ContentError::Config("OpenAI API key required".to_string()))?;

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .http_client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ContentError::Backend(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ContentError::Backend(format!(
                "OpenAI API error: {}",
                error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ContentError::Backend(format!("OpenAI response unreadable: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ContentError::Backend("Invalid OpenAI response format".to_string()))?
            .to_string();

        Ok(content)
    }

    async fn generate_ollama(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let default_url = "http://localhost:11434".to_string();
        let base_url = self.config.base_url.as_ref().unwrap_or(&default_url);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ContentError::Backend(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ContentError::Backend(format!(
                "Ollama API error: {}",
                error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ContentError::Backend(format!("Ollama response unreadable: {}", e)))?;

        let content = response_json["message"]["content"]
            .as_str()
            .ok_or_else(|| ContentError::Backend("Invalid Ollama response format".to_string()))?
            .to_string();

        Ok(content)
    }
}

impl TextBackend for ProviderClient {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> impl Future<Output = Result<String>> + Send {
        async move {
            match self.config.provider {
                ProviderKind::OpenAi => self.generate_openai(prompt, max_tokens, temperature).await,
                ProviderKind::Ollama => self.generate_ollama(prompt, max_tokens, temperature).await,
            }
        }
    }

    fn identity(&self) -> (String, String) {
        (self.config.provider.to_string(), self.config.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        let openai: ProviderKind = "openai".parse().unwrap();
        assert_eq!(openai.to_string(), "openai");
        let alias: ProviderKind = "GPT".parse().unwrap();
        assert_eq!(alias, ProviderKind::OpenAi);
        let ollama: ProviderKind = "ollama".parse().unwrap();
        assert_eq!(ollama.to_string(), "ollama");
        assert!("mystery".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_openai_without_key_fails_before_any_request() {
        let client = ProviderClient::new(BackendConfig {
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
        })
        .unwrap();

        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(client.generate("hello", 50, 0.7));
        assert!(matches!(result, Err(ContentError::Config(_))));
    }
}
