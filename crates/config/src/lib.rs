//! Configuration loading, validation, and management for DandiClaw.
//!
//! Loads configuration from `~/.dandiclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.dandiclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model, unless the selected archive names its own
    #[serde(default = "default_model")]
    pub model: String,

    /// Which entry of `archives` is in use
    #[serde(default = "default_archive")]
    pub archive: String,

    /// Completion gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Archive instances, keyed by name
    #[serde(default = "default_archives")]
    pub archives: BTreeMap<String, ArchiveConfig>,

    /// Price overrides in USD per 1M tokens, keyed by model
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingOverride>,

    /// Metadata validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

fn default_model() -> String {
    "openai/gpt-4o".into()
}
fn default_archive() -> String {
    "dandi".into()
}

fn default_archives() -> BTreeMap<String, ArchiveConfig> {
    let mut archives = BTreeMap::new();
    archives.insert(
        "dandi".into(),
        ArchiveConfig {
            api_url: "https://api.dandiarchive.org/api".into(),
            web_url: "https://dandiarchive.org".into(),
            schema_url: default_schema_url(),
            api_key: None,
            model: None,
        },
    );
    archives.insert(
        "dandi-sandbox".into(),
        ArchiveConfig {
            api_url: "https://api.sandbox.dandiarchive.org/api".into(),
            web_url: "https://sandbox.dandiarchive.org".into(),
            schema_url: default_schema_url(),
            api_key: None,
            model: None,
        },
    );
    archives
}

fn default_schema_url() -> String {
    "https://raw.githubusercontent.com/dandi/schema/master/releases/0.6.4/dandiset.json".into()
}

/// Redact a secret for Debug output.
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
            .field("model", &self.model)
            .field("archive", &self.archive)
            .field("gateway", &self.gateway)
            .field("agent", &self.agent)
            .field("archives", &self.archives)
            .field("pricing", &self.pricing)
            .field("validation", &self.validation)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Completion endpoint (POST, server-sent events)
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Application name reported to the gateway
    #[serde(default = "default_app")]
    pub app: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8787/v1/completion".into()
}
fn default_app() -> String {
    "dandiclaw".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            app: default_app(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Completions per user message before giving up
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_turns() -> usize {
    25
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            temperature: default_temperature(),
        }
    }
}

/// One archive instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub api_url: String,

    /// Web UI base; review links are built on top of it
    pub web_url: String,

    /// JSON schema of the dandiset metadata
    #[serde(default = "default_schema_url")]
    pub schema_url: String,

    /// Archive API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model preference for this archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl std::fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("api_url", &self.api_url)
            .field("web_url", &self.web_url)
            .field("schema_url", &self.schema_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingOverride {
    pub input_per_m: f64,
    pub output_per_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Top-level fields that must be present and non-empty
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
}

fn default_required_fields() -> Vec<String> {
    ["name", "description", "contributor", "license"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_fields: default_required_fields(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_file(&Self::config_path())
    }

    /// [`AppConfig::load`] with an explicit file in place of the default.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply `DANDICLAW_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("DANDICLAW_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("DANDICLAW_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("DANDICLAW_GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(archive) = lookup("DANDICLAW_ARCHIVE") {
            self.archive = archive;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".dandiclaw")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.timeout_secs must be > 0".into(),
            ));
        }

        if !self.gateway.url.starts_with("http://") && !self.gateway.url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "gateway.url must be an http(s) URL, got '{}'",
                self.gateway.url
            )));
        }

        if !self.archives.contains_key(&self.archive) {
            return Err(ConfigError::ValidationError(format!(
                "archive '{}' is not defined (known: {})",
                self.archive,
                self.archives.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(())
    }

    /// The archive instance in use.
    pub fn active_archive(&self) -> Option<&ArchiveConfig> {
        self.archives.get(&self.archive)
    }

    /// The model to use: the archive's preference, else the global default.
    pub fn effective_model(&self) -> &str {
        self.active_archive()
            .and_then(|a| a.model.as_deref())
            .unwrap_or(&self.model)
    }

    /// The gateway key: the archive's own key, else the global one.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.active_archive()
            .and_then(|a| a.api_key.as_deref())
            .or(self.api_key.as_deref())
    }

    /// Check if a gateway API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.effective_api_key().is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Write the default configuration to `path`, creating parent directories.
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        if path.exists() {
            return Err(ConfigError::WriteError {
                path: path.to_path_buf(),
                reason: "file already exists".into(),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, Self::default_toml()).map_err(write_err)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            archive: default_archive(),
            gateway: GatewayConfig::default(),
            agent: AgentSettings::default(),
            archives: default_archives(),
            pricing: BTreeMap::new(),
            validation: ValidationConfig::default(),
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_turns, 25);
        assert_eq!(config.agent.max_retries, 3);
        assert!(config.active_archive().is_some());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.archives.len(), config.archives.len());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_archive_rejected() {
        let config = AppConfig {
            archive: "nowhere".into(),
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.archive, "dandi");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "anthropic/claude-sonnet-4"

[agent]
max_turns = 10

[pricing."gateway/house-model"]
input_per_m = 0.5
output_per_m = 1.5
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "anthropic/claude-sonnet-4");
        assert_eq!(config.agent.max_turns, 10);
        assert_eq!(config.agent.base_delay_ms, 1000);
        assert_eq!(config.gateway.app, "dandiclaw");
        assert!(config.archives.contains_key("dandi"));
        assert_eq!(config.pricing["gateway/house-model"].output_per_m, 1.5);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DANDICLAW_API_KEY", "sk-test"),
            ("DANDICLAW_MODEL", "openai/gpt-4.1"),
            ("DANDICLAW_ARCHIVE", "dandi-sandbox"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "openai/gpt-4.1");
        assert_eq!(config.archive, "dandi-sandbox");
        assert_eq!(config.gateway.url, default_gateway_url());
    }

    #[test]
    fn archive_model_preference_wins() {
        let mut config = AppConfig::default();
        if let Some(archive) = config.archives.get_mut("dandi") {
            archive.model = Some("google/gemini-2.5-pro".into());
        }
        assert_eq!(config.effective_model(), "google/gemini-2.5-pro");
    }

    #[test]
    fn archive_key_wins_over_global() {
        let mut config = AppConfig {
            api_key: Some("global".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.effective_api_key(), Some("global"));
        if let Some(archive) = config.archives.get_mut("dandi") {
            archive.api_key = Some("per-archive".into());
        }
        assert_eq!(config.effective_api_key(), Some("per-archive"));
        config.archive = "dandi-sandbox".into();
        assert_eq!(config.effective_api_key(), Some("global"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        if let Some(archive) = config.archives.get_mut("dandi") {
            archive.api_key = Some("archive-token".into());
        }
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("archive-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn write_default_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        AppConfig::write_default(&path).unwrap();
        assert!(AppConfig::load_from(&path).is_ok());
        assert!(matches!(
            AppConfig::write_default(&path),
            Err(ConfigError::WriteError { .. })
        ));
    }
}
