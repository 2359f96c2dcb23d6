use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocqaError, Result};

/// Top-level configuration for docqa.
///
/// Loaded from `~/.docqa/config.toml` by default, then overlaid with the
/// recognised environment variables (see [`DocqaConfig::apply_env_overrides`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocqaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl DocqaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocqaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DocqaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Unset or empty keys leave
    /// the current value untouched.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let es = &mut self.elasticsearch;
        if let Some(v) = get("ES_INDEX") {
            es.index = v;
        }
        if let Some(v) = get("ES_INDEX_CHAT_HISTORY") {
            es.chat_history_index = v;
        }
        if let Some(v) = get("ELSER_MODEL") {
            es.elser_model = v;
        }
        if let Some(v) = get("ELASTICSEARCH_URL") {
            es.url = v;
        }
        if let Some(v) = get("ELASTIC_CLOUD_ID") {
            es.cloud_id = Some(v);
        }
        if let Some(v) = get("ELASTICSEARCH_USER") {
            es.username = Some(v);
        }
        if let Some(v) = get("ELASTICSEARCH_PASSWORD") {
            es.password = Some(v);
        }
        if let Some(v) = get("ELASTIC_API_KEY") {
            es.api_key = Some(v);
        }

        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("CHAT_MODEL") {
            self.llm.model = v;
        }

        if let Some(v) = get("DOCQA_HISTORY_BACKEND") {
            self.history.backend = v.parse()?;
        }

        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Extra origins allowed by CORS in addition to the server's own address.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            cors_origins: vec![],
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Elasticsearch connection and index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    /// Elastic Cloud deployment id. Takes precedence over `url` when set.
    pub cloud_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Base64 API key. Takes precedence over basic auth when set.
    pub api_key: Option<String>,
    /// Index holding the document passages.
    pub index: String,
    /// Index holding chat history.
    pub chat_history_index: String,
    /// ELSER model id used for sparse-vector retrieval.
    pub elser_model: String,
    /// Number of passages the document store returns per query.
    pub top_k: usize,
    /// Maximum messages loaded per session.
    pub history_size: usize,
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            cloud_id: None,
            username: None,
            password: None,
            api_key: None,
            index: "workplace-app-docs".to_string(),
            chat_history_index: "workplace-app-docs-chat-history".to_string(),
            elser_model: ".elser_model_2".to_string(),
            top_k: 4,
            history_size: 1000,
            timeout_secs: 30,
        }
    }
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

/// Which chat history store the application wires in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    #[default]
    Elasticsearch,
    Sqlite,
    Memory,
}

impl std::str::FromStr for HistoryBackend {
    type Err = DocqaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" | "es" => Ok(HistoryBackend::Elasticsearch),
            "sqlite" => Ok(HistoryBackend::Sqlite),
            "memory" => Ok(HistoryBackend::Memory),
            other => Err(DocqaError::Config(format!(
                "unknown history backend '{}': expected elasticsearch, sqlite or memory",
                other
            ))),
        }
    }
}

/// Chat history store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    /// SQLite database file, used when `backend = "sqlite"`.
    pub sqlite_path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Elasticsearch,
            sqlite_path: "~/.docqa/history.db".to_string(),
        }
    }
}

/// Prompt template settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Directory of `*.txt` templates overriding the built-in ones.
    pub template_dir: Option<String>,
}
