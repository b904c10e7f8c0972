//! Configuration loading, validation, and management for agentexec.
//!
//! Loads configuration from `~/.agentexec/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.agentexec/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model endpoint defaults
    #[serde(default)]
    pub llm: LlmConfig,

    /// Execution limits
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Remote tool server timeouts
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Google OAuth client
    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// File tool confinement
    #[serde(default)]
    pub files: FilesConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on one reasoning-loop run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Step budget when the caller does not pass one
    #[serde(default = "default_max_steps")]
    pub default_max_steps: u32,

    /// Caller-supplied budgets are clamped to this
    #[serde(default = "default_max_steps_ceiling")]
    pub max_steps_ceiling: u32,

    /// Completed executions replayed as conversation history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}

fn default_timeout_secs() -> u64 {
    300
}
fn default_max_steps() -> u32 {
    25
}
fn default_max_steps_ceiling() -> u32 {
    50
}
fn default_history_limit() -> usize {
    20
}
fn default_retrieval_top_k() -> usize {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            default_max_steps: default_max_steps(),
            max_steps_ceiling: default_max_steps_ceiling(),
            history_limit: default_history_limit(),
            retrieval_top_k: default_retrieval_top_k(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
}

fn default_request_timeout() -> f64 {
    30.0
}
fn default_connect_timeout() -> f64 {
    300.0
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_revoke_url")]
    pub revoke_url: String,
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}
fn default_revoke_url() -> String {
    "https://oauth2.googleapis.com/revoke".into()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            token_url: default_token_url(),
            revoke_url: default_revoke_url(),
        }
    }
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://agentexec.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "console"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "json".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// When set, file tools may only touch paths under this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentexec/config.toml),
    /// then apply environment overrides.
    ///
    /// API key lookup order when the file has none:
    /// - `AGENTEXEC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = env("AGENTEXEC_API_KEY").or_else(|| env("OPENAI_API_KEY"));
        }
        if let Some(model) = env("AGENTEXEC_MODEL") {
            self.llm.default_model = model;
        }
        if let Some(url) = env("AGENTEXEC_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(url) = env("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(id) = env("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(id);
        }
        if let Some(secret) = env("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(secret);
        }
        if let Some(uri) = env("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = Some(uri);
        }
        if let Some(level) = env("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(format) = env("LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }
        match env("AGENT_EXECUTION_TIMEOUT").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) => self.execution.timeout_secs = secs,
            Some(Err(e)) => tracing::warn!("Ignoring AGENT_EXECUTION_TIMEOUT: {e}"),
            None => {}
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentexec")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.default_temperature) {
            return Err(ConfigError::ValidationError(
                "llm.default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.execution.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution.timeout_secs must be > 0".into(),
            ));
        }

        if self.execution.default_max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "execution.default_max_steps must be >= 1".into(),
            ));
        }

        if self.execution.default_max_steps > self.execution.max_steps_ceiling {
            return Err(ConfigError::ValidationError(
                "execution.default_max_steps must not exceed execution.max_steps_ceiling".into(),
            ));
        }

        if self.remote.request_timeout_secs <= 0.0 || self.remote.connect_timeout_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "remote timeouts must be > 0".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "console") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"json\" or \"console\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
