use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai_provider::{BackendConfig, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub default_provider: String,
    pub providers: HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Cached generation results live this long.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Outbound backend calls allowed per rolling 60-second window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_requests_per_minute() -> u32 {
    30
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            cache_ttl_secs: default_cache_ttl(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("artigen")
        });

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let config_str =
                std::fs::read_to_string(&config_path).context("Failed to read config.json")?;
            let mut config: Config =
                serde_json::from_str(&config_str).context("Failed to parse config.json")?;
            config.data_dir = data_dir;
            config.fill_api_keys_from_env();
            return Ok(config);
        }

        let config = Self::default_config(data_dir);
        let json_str =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config")?;
        std::fs::write(&config_path, json_str).context("Failed to write default config.json")?;

        Ok(config)
    }

    fn default_config(data_dir: PathBuf) -> Self {
        let mut providers = HashMap::new();

        providers.insert(
            "ollama".to_string(),
            ProviderSettings {
                default_model: "qwen2.5".to_string(),
                host: Some("http://localhost:11434".to_string()),
                api_key: None,
            },
        );

        providers.insert(
            "openai".to_string(),
            ProviderSettings {
                default_model: "gpt-4o-mini".to_string(),
                host: None,
                api_key: std::env::var("OPENAI_API_KEY").ok(),
            },
        );

        Config {
            data_dir,
            default_provider: "ollama".to_string(),
            providers,
            generation: GenerationSettings::default(),
        }
    }

    fn fill_api_keys_from_env(&mut self) {
        if let Some(openai) = self.providers.get_mut("openai") {
            if openai.api_key.as_ref().map_or(true, |key| key.is_empty()) {
                openai.api_key = std::env::var("OPENAI_API_KEY").ok();
            }
        }
    }

    /// Resolve a backend selection against the configured providers.
    pub fn backend_config(
        &self,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<BackendConfig> {
        let provider_name = provider.as_deref().unwrap_or(&self.default_provider);
        let settings = self
            .providers
            .get(provider_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {}", provider_name))?;

        let kind: ProviderKind = provider_name.parse()?;
        let model = model.unwrap_or_else(|| settings.default_model.clone());

        Ok(BackendConfig {
            provider: kind,
            model,
            api_key: settings.api_key.clone(),
            base_url: settings.host.clone(),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("artigen.db")
    }
}
