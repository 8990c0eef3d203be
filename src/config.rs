use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Runtime configuration, read from a TOML file. Secrets never live here, see [`Secrets`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: String,
    pub log_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible endpoint
    pub api_base: String,
    /// Candidate models, tried in this order
    pub models: Vec<String>,
    pub quiz_content_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_base: String,
    pub max_results: u32,
    pub depth: SearchDepth,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "sqlite://database/dappled.db".to_string(),
            log_dir: None,
            server: ServerConfig::default(),
            generation: GenerationConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            quiz_content_limit: 15000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.tavily.com".to_string(),
            max_results: 7,
            depth: SearchDepth::Advanced,
        }
    }
}

impl Config {
    /// Load the config file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

/// API keys and shared secrets, taken from the environment (and `.env`).
#[derive(Clone)]
pub struct Secrets {
    pub generation_api_key: String,
    pub search_api_key: String,
    pub webhook_secret: String,
}

impl Secrets {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            generation_api_key: dotenvy::var("GENERATION_API_KEY")
                .context("GENERATION_API_KEY must be set")?,
            search_api_key: dotenvy::var("SEARCH_API_KEY").context("SEARCH_API_KEY must be set")?,
            webhook_secret: dotenvy::var("WEBHOOK_SECRET").context("WEBHOOK_SECRET must be set")?,
        })
    }
}
