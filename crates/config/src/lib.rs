//! Configuration loading, validation, and management for Ritualcraft.
//!
//! Loads configuration from `~/.ritualcraft/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ritualcraft_normalizer::ResponseSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ritualcraft/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when a prompt template does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Model call settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Prompt template storage
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Per-user session state
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Custom tool definitions; a custom tool replaces the built-in of the
    /// same name
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("providers", &self.providers)
            .field("gateway", &self.gateway)
            .field("completion", &self.completion)
            .field("templates", &self.templates)
            .field("sessions", &self.sessions)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Requests per minute per client; 0 disables rate limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Bearer token → user id. Empty means every caller is `anonymous`.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    256 * 1024
}
fn default_rate_limit() -> u32 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit_per_minute: default_rate_limit(),
            tokens: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Upper bound on a single model call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// `memory` or `sqlite`
    #[serde(default = "default_templates_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.ritualcraft/templates.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// TOML file of templates loaded at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

fn default_templates_backend() -> String {
    "memory".into()
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            backend: default_templates_backend(),
            path: None,
            seed_file: None,
        }
    }
}

impl TemplatesConfig {
    /// The SQLite file to use, falling back to the config directory.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("templates.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_ttl_minutes() -> u64 {
    60
}

/// Longest session lifetime accepted from config: 30 days.
pub const MAX_SESSION_TTL_MINUTES: u64 = 30 * 24 * 60;

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// A tool declared in config.
///
/// ```toml
/// [[tools]]
/// name = "risk_radar"
/// description = "Lists the top delivery risks"
/// instructions = ["Rank risks by likelihood."]
///
/// [[tools.schema.fields]]
/// name = "risks"
/// label = "Risks"
/// kind = "text_list"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub schema: ResponseSchema,

    /// Extra system instructions sent after the format instruction
    #[serde(default)]
    pub instructions: Vec<String>,

    /// Field whose value is saved to the caller's session under the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stores: Option<String>,

    /// Session slot injected into the caller's fields under the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loads: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.ritualcraft/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `RITUALCRAFT_API_KEY` (highest priority), `OPENAI_API_KEY`,
    ///   `OPENROUTER_API_KEY` when no key is configured
    /// - `RITUALCRAFT_PROVIDER`, `RITUALCRAFT_MODEL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("RITUALCRAFT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("RITUALCRAFT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("RITUALCRAFT_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ritualcraft")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "completion.timeout_secs must be > 0".into(),
            ));
        }

        if !matches!(self.templates.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "templates.backend must be 'memory' or 'sqlite', got '{}'",
                self.templates.backend
            )));
        }

        if self.sessions.ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.ttl_minutes must be > 0".into(),
            ));
        }
        if self.sessions.ttl_minutes > MAX_SESSION_TTL_MINUTES {
            return Err(ConfigError::ValidationError(format!(
                "sessions.ttl_minutes must be at most {MAX_SESSION_TTL_MINUTES}"
            )));
        }

        if self.gateway.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_body_bytes must be > 0".into(),
            ));
        }

        for (i, tool) in self.tools.iter().enumerate() {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("tools[{i}] has no name")));
            }
            if self.tools[..i].iter().any(|t| t.name == tool.name) {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' is declared twice",
                    tool.name
                )));
            }
            tool.schema.validate().map_err(|e| {
                ConfigError::ValidationError(format!("tool '{}': {e}", tool.name))
            })?;
            if let Some(field) = &tool.stores {
                if tool.schema.field(field).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "tool '{}' stores unknown field '{field}'",
                        tool.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            providers: HashMap::new(),
            gateway: GatewayConfig::default(),
            completion: CompletionConfig::default(),
            templates: TemplatesConfig::default(),
            sessions: SessionsConfig::default(),
            tools: vec![],
        }
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
