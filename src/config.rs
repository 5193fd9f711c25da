//! TOML configuration.
//!
//! Every section has serde defaults, so an empty file (or no file at all,
//! via [`Config::minimal`]) yields a working configuration. The model API
//! key never lives in the file: [`ApiKey::from_env`] reads it from the
//! environment variable named by `model.api_key_env`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Number of corpus characters embedded in the prompt.
    #[serde(default = "default_cutoff_chars")]
    pub cutoff_chars: usize,
    /// Must contain `{data}` and `{question}`.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cutoff_chars: default_cutoff_chars(),
            prompt_template: default_prompt_template(),
        }
    }
}

fn default_cutoff_chars() -> usize {
    20_000
}

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Data:\n{data}\n\nQuestion: {question}\n\nAnswer concisely, based on the data.";

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            api_key_env: default_api_key_env(),
            endpoint: default_model_endpoint(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

fn default_model_provider() -> String {
    "gemini".to_string()
}
fn default_model_name() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_model_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_drive_endpoint")]
    pub endpoint: String,
    /// Persistent mirror directory, wiped before every sync. When unset a
    /// fresh temporary directory is used per sync.
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,
    #[serde(default = "default_drive_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_drive_endpoint(),
            mirror_dir: None,
            timeout_secs: default_drive_timeout_secs(),
        }
    }
}

fn default_drive_endpoint() -> String {
    "https://www.googleapis.com".to_string()
}
fn default_drive_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.cutoff_chars == 0 {
            bail!("query.cutoff_chars must be > 0");
        }
        for placeholder in ["{data}", "{question}"] {
            if !self.query.prompt_template.contains(placeholder) {
                bail!("query.prompt_template must contain {}", placeholder);
            }
        }

        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        match self.model.provider.as_str() {
            "gemini" => {}
            other => bail!("Unknown model provider: '{}'. Must be gemini.", other),
        }
        if let Some(t) = self.model.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("model.temperature must be in [0.0, 2.0]");
            }
        }
        if self.model.max_output_tokens == Some(0) {
            bail!("model.max_output_tokens must be > 0");
        }
        if self.model.api_key_env.trim().is_empty() {
            bail!("model.api_key_env must not be empty");
        }

        Ok(())
    }
}

/// Load and validate a config file. A missing file yields [`Config::minimal`].
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// An API credential read from the environment.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read the key from `var`. Blank values count as missing.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self(v.trim().to_string())),
            _ => bail!(
                "Missing {}. Set it in the environment (e.g. `export {}=...`) before starting.",
                var,
                var
            ),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
