//! TOML Configuration File Support
//!
//! Centralized configuration for the relay, loaded from
//! `~/.config/relay/relay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:3000"
//! keepalive_secs = 15
//!
//! [relay]
//! subscriber_queue_capacity = 256
//! history_limit = 100
//! system_prompt = "You are a helpful assistant."
//!
//! [generation]
//! backend = "openai"
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4-turbo-preview"
//! request_timeout_secs = 120
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `RELAY_BIND_ADDR` | `server.bind_addr` |
//! | `RELAY_KEEPALIVE_SECS` | `server.keepalive_secs` |
//! | `RELAY_QUEUE_CAPACITY` | `relay.subscriber_queue_capacity` |
//! | `RELAY_HISTORY_LIMIT` | `relay.history_limit` |
//! | `RELAY_SYSTEM_PROMPT` | `relay.system_prompt` |
//! | `RELAY_BACKEND` | `generation.backend` |
//! | `RELAY_MODEL` | `generation.model` |
//! | `RELAY_REQUEST_TIMEOUT_SECS` | `generation.request_timeout_secs` |
//! | `OPENAI_BASE_URL` | `generation.base_url` |
//! | `OPENAI_API_KEY` | `generation.api_key` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendKind, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::orchestrator::{DEFAULT_HISTORY_LIMIT, DEFAULT_SYSTEM_PROMPT};
use crate::subscriber::DEFAULT_QUEUE_CAPACITY;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the highest-priority configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address, `host:port`
    pub bind_addr: Option<String>,

    /// Interval between keep-alive comments on event streams
    pub keepalive_secs: Option<u64>,
}

/// Relay section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Frames buffered per subscriber before old tokens are evicted
    pub subscriber_queue_capacity: Option<usize>,

    /// Stored messages included as generation context
    pub history_limit: Option<usize>,

    /// Preamble sent ahead of the conversation
    pub system_prompt: Option<String>,
}

/// Generation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationToml {
    /// `openai` or `echo`
    pub backend: Option<BackendKind>,

    /// API root of an OpenAI-compatible server
    pub base_url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Bearer token
    pub api_key: Option<String>,

    /// Upstream request timeout
    pub request_timeout_secs: Option<u64>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// `[server]`
    pub server: ServerToml,
    /// `[relay]`
    pub relay: RelayToml,
    /// `[generation]`
    pub generation: GenerationToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// HTTP server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen address, `host:port`
    pub bind_addr: String,
    /// Keep-alive comment interval in seconds
    pub keepalive_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            keepalive_secs: 15,
        }
    }
}

/// Broadcast and orchestration settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    /// Frames buffered per subscriber
    pub subscriber_queue_capacity: usize,
    /// Stored messages included as generation context
    pub history_limit: usize,
    /// Preamble sent ahead of the conversation
    pub system_prompt: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Generation backend settings
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Which backend to drive
    pub backend: BackendKind,
    /// API root
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,
}

impl GenerationSettings {
    /// Upstream request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Fully resolved relay configuration
#[derive(Clone, Debug, Default)]
pub struct RelayConfigFile {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Broadcast and orchestration settings
    pub relay: RelaySettings,
    /// Generation backend settings
    pub generation: GenerationSettings,
    /// File the configuration was read from, if any
    pub config_file_path: Option<PathBuf>,
    /// Where the highest-priority value came from
    source: ConfigSource,
}

impl RelayConfigFile {
    /// Defaults only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the highest-priority value came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_addr.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "bind_addr '{}' is not a socket address: {e}",
                self.server.bind_addr
            ))
        })
    }

    /// Keep-alive comment interval
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.server.keepalive_secs.max(1))
    }

    /// Check values that have no safe interpretation
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.relay.subscriber_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "subscriber_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.relay.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "history_limit must be at least 1".to_string(),
            ));
        }
        if self.generation.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file location
///
/// `$XDG_CONFIG_HOME/relay/relay.toml`, or `None` if there is no config dir.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relay").join("relay.toml"))
}

/// File to load: `explicit` when given, the default location otherwise
#[must_use]
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(default_config_path)
}

/// Load configuration from the default path and the process environment
pub fn load_config() -> Result<RelayConfigFile, ConfigError> {
    load_config_from_path(resolve_config_path(None))
}

/// Load configuration from `path` and the process environment
///
/// A missing file is not an error; defaults are used instead.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration from `path`, reading environment values via `env`
pub fn load_config_with_env<F>(
    path: Option<PathBuf>,
    env: F,
) -> Result<RelayConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = RelayConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

fn apply_toml_config(config: &mut RelayConfigFile, toml: &ConfigToml) {
    if let Some(ref addr) = toml.server.bind_addr {
        config.server.bind_addr.clone_from(addr);
    }
    if let Some(secs) = toml.server.keepalive_secs {
        config.server.keepalive_secs = secs;
    }

    if let Some(capacity) = toml.relay.subscriber_queue_capacity {
        config.relay.subscriber_queue_capacity = capacity;
    }
    if let Some(limit) = toml.relay.history_limit {
        config.relay.history_limit = limit;
    }
    if let Some(ref prompt) = toml.relay.system_prompt {
        config.relay.system_prompt.clone_from(prompt);
    }

    if let Some(backend) = toml.generation.backend {
        config.generation.backend = backend;
    }
    if let Some(ref url) = toml.generation.base_url {
        config.generation.base_url.clone_from(url);
    }
    if let Some(ref model) = toml.generation.model {
        config.generation.model.clone_from(model);
    }
    if let Some(ref key) = toml.generation.api_key {
        config.generation.api_key = Some(key.clone());
    }
    if let Some(secs) = toml.generation.request_timeout_secs {
        config.generation.request_timeout_secs = secs;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{key}='{value}': {e}")))
}

fn apply_env_config<F>(config: &mut RelayConfigFile, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(addr) = env("RELAY_BIND_ADDR") {
        config.server.bind_addr = addr;
        applied = true;
    }
    if let Some(value) = env("RELAY_KEEPALIVE_SECS") {
        config.server.keepalive_secs = parse_env("RELAY_KEEPALIVE_SECS", &value)?;
        applied = true;
    }
    if let Some(value) = env("RELAY_QUEUE_CAPACITY") {
        config.relay.subscriber_queue_capacity = parse_env("RELAY_QUEUE_CAPACITY", &value)?;
        applied = true;
    }
    if let Some(value) = env("RELAY_HISTORY_LIMIT") {
        config.relay.history_limit = parse_env("RELAY_HISTORY_LIMIT", &value)?;
        applied = true;
    }
    if let Some(prompt) = env("RELAY_SYSTEM_PROMPT") {
        config.relay.system_prompt = prompt;
        applied = true;
    }
    if let Some(value) = env("RELAY_BACKEND") {
        config.generation.backend = parse_env("RELAY_BACKEND", &value)?;
        applied = true;
    }
    if let Some(model) = env("RELAY_MODEL") {
        config.generation.model = model;
        applied = true;
    }
    if let Some(value) = env("RELAY_REQUEST_TIMEOUT_SECS") {
        config.generation.request_timeout_secs = parse_env("RELAY_REQUEST_TIMEOUT_SECS", &value)?;
        applied = true;
    }
    if let Some(url) = env("OPENAI_BASE_URL") {
        config.generation.base_url = url;
        applied = true;
    }
    if let Some(key) = env("OPENAI_API_KEY") {
        config.generation.api_key = Some(key);
        applied = true;
    }

    if applied {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub bind_addr: Option<String>,

    /// Backend override
    pub backend: Option<BackendKind>,

    /// Model override
    pub model: Option<String>,

    /// Queue capacity override
    pub subscriber_queue_capacity: Option<usize>,
}

impl ConfigOverrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the listen address
    #[must_use]
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// Override the backend
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Override the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the per-subscriber queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = Some(capacity);
        self
    }

    /// Apply overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut RelayConfigFile) {
        let mut applied = false;

        if let Some(ref addr) = self.bind_addr {
            config.server.bind_addr.clone_from(addr);
            applied = true;
        }
        if let Some(backend) = self.backend {
            config.generation.backend = backend;
            applied = true;
        }
        if let Some(ref model) = self.model {
            config.generation.model.clone_from(model);
            applied = true;
        }
        if let Some(capacity) = self.subscriber_queue_capacity {
            config.relay.subscriber_queue_capacity = capacity;
            applied = true;
        }

        if applied {
            config.source = ConfigSource::Cli;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfigFile::default();
        assert_eq!(config.source(), ConfigSource::Default);
        assert_eq!(config.relay.subscriber_queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.relay.history_limit, 100);
        assert_eq!(config.generation.backend, BackendKind::OpenAi);
        assert_eq!(config.generation.model, "gpt-4-turbo-preview");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("relay/relay.toml"));
        }
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let explicit = PathBuf::from("/etc/relay/custom.toml");
        assert_eq!(resolve_config_path(Some(explicit.clone())), Some(explicit));
        assert_eq!(resolve_config_path(None), default_config_path());
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
            [server]
            bind_addr = "0.0.0.0:8080"
            keepalive_secs = 5

            [relay]
            subscriber_queue_capacity = 32
            history_limit = 20
            system_prompt = "Be brief."

            [generation]
            backend = "echo"
            model = "local-model"
            base_url = "http://localhost:11434/v1"
            request_timeout_secs = 30
            "#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(5));
        assert_eq!(config.relay.subscriber_queue_capacity, 32);
        assert_eq!(config.relay.history_limit, 20);
        assert_eq!(config.relay.system_prompt, "Be brief.");
        assert_eq!(config.generation.backend, BackendKind::Echo);
        assert_eq!(config.generation.model, "local-model");
        assert_eq!(config.generation.base_url, "http://localhost:11434/v1");
        assert_eq!(config.generation.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = write_toml("[relay]\nhistory_limit = 10\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.relay.history_limit, 10);
        assert_eq!(config.server, ServerSettings::default());
    }

    #[test]
    fn test_missing_file_graceful() {
        let config =
            load_config_with_env(Some(PathBuf::from("/nonexistent/relay.toml")), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[relay\nhistory_limit = ");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_backend_in_toml_is_error() {
        let file = write_toml("[generation]\nbackend = \"ollama\"\n");
        assert!(load_config_with_env(Some(file.path().to_path_buf()), no_env).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[relay]\nhistory_limit = 10\n[generation]\nmodel = \"from-file\"\n");
        let env = env_from(&[
            ("RELAY_HISTORY_LIMIT", "42"),
            ("RELAY_BACKEND", "echo"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.source(), ConfigSource::Env);
        assert_eq!(config.relay.history_limit, 42);
        assert_eq!(config.generation.backend, BackendKind::Echo);
        assert_eq!(config.generation.model, "from-file");
        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_env_value_is_error() {
        let env = env_from(&[("RELAY_QUEUE_CAPACITY", "lots")]);
        let err = load_config_with_env(None, env).unwrap_err();
        assert!(err.to_string().contains("RELAY_QUEUE_CAPACITY"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[("RELAY_BIND_ADDR", "127.0.0.1:4000"), ("RELAY_MODEL", "env-model")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_bind_addr("127.0.0.1:5000")
            .with_model("cli-model")
            .apply(&mut config);

        assert_eq!(config.source(), ConfigSource::Cli);
        assert_eq!(config.server.bind_addr, "127.0.0.1:5000");
        assert_eq!(config.generation.model, "cli-model");
    }

    #[test]
    fn test_empty_overrides_no_change() {
        let mut config = RelayConfigFile::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RelayConfigFile::default();
        config.relay.subscriber_queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfigFile::default();
        config.server.bind_addr = "not an address".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = RelayConfigFile::default();
        config.relay.history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = RelayConfigFile::default();
        config.generation.api_key = Some("sk-secret".to_string());
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
