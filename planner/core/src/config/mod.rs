//! TOML Configuration File Support
//!
//! Centralized configuration for the gateway, with an optional TOML file at
//! `~/.config/career-planner/gateway.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Environment Variables
//!
//! - `OLLAMA_HOST`: backend base URL (`http://localhost:11434`)
//! - `OLLAMA_MODEL`: model identifier (`deepseek-r1:7b`)
//! - `HOST` / `PORT`: bind address (`127.0.0.1:9000`)
//! - `PLANNER_BACKEND_TIMEOUT`: backend connect/read timeout in seconds (120)
//! - `PLANNER_STATIC_DIR`: directory holding `index.html` and assets (`static`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 9000
//! static_dir = "/srv/planner/static"
//!
//! [backend]
//! base_url = "http://gpu-box:11434"
//! model = "qwen2.5:14b"
//! timeout_secs = 300
//!
//! [reasoning]
//! start_marker = "<think>"
//! end_marker = "</think>"
//! line_prefix = "思考"
//!
//! [prompt]
//! system = "You are a career coach. Answer in English."
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::DEFAULT_SYSTEM_PROMPT;
use crate::reasoning::ReasoningMarkers;

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

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
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
    /// Bind host
    pub host: Option<String>,

    /// Bind port
    pub port: Option<u16>,

    /// Directory with the home page and static assets
    pub static_dir: Option<PathBuf>,
}

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Base URL of the Ollama server
    pub base_url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Connect/read timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Reasoning section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningToml {
    /// Opening marker of a reasoning span
    pub start_marker: Option<String>,

    /// Closing marker of a reasoning span
    pub end_marker: Option<String>,

    /// Line-prefix token
    pub line_prefix: Option<String>,
}

/// Prompt section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptToml {
    /// Replacement system instruction
    pub system: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Backend configuration section
    pub backend: BackendToml,

    /// Reasoning marker section
    pub reasoning: ReasoningToml,

    /// Prompt section
    pub prompt: PromptToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved backend settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Connect/read timeout
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "deepseek-r1:7b".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Centralized configuration for the gateway
///
/// Use [`load_config_from_path`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Directory with the home page and static assets
    pub static_dir: PathBuf,

    /// Backend connection
    pub backend: BackendSettings,

    /// Reasoning markers
    pub markers: ReasoningMarkers,

    /// System instruction sent with every plan request
    pub system_prompt: String,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            static_dir: PathBuf::from("static"),
            backend: BackendSettings::default(),
            markers: ReasoningMarkers::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl GatewayConfig {
    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// `host:port` to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check values that would make the gateway unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend model must not be empty".to_string(),
            ));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend base_url must not be empty".to_string(),
            ));
        }
        if self.backend.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "backend timeout must be greater than zero".to_string(),
            ));
        }
        if !self.markers.is_valid() {
            return Err(ConfigError::ValidationError(
                "reasoning markers must be non-empty single-line strings".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/career-planner/gateway.toml` or
/// `~/.config/career-planner/gateway.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("career-planner").join("gateway.toml"))
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment values through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, ConfigError> {
    // Start with defaults
    let mut config = GatewayConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: GatewayToml = toml::from_str(&toml_content)?;
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

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut GatewayConfig, toml: &GatewayToml) {
    // Server settings
    if let Some(ref host) = toml.server.host {
        config.host.clone_from(host);
    }
    if let Some(port) = toml.server.port {
        config.port = port;
    }
    if let Some(ref dir) = toml.server.static_dir {
        config.static_dir.clone_from(dir);
    }

    // Backend settings
    if let Some(ref url) = toml.backend.base_url {
        config.backend.base_url.clone_from(url);
    }
    if let Some(ref model) = toml.backend.model {
        config.backend.model.clone_from(model);
    }
    if let Some(secs) = toml.backend.timeout_secs {
        config.backend.timeout = Duration::from_secs(secs);
    }

    // Reasoning markers
    if let Some(ref start) = toml.reasoning.start_marker {
        config.markers.start.clone_from(start);
    }
    if let Some(ref end) = toml.reasoning.end_marker {
        config.markers.end.clone_from(end);
    }
    if let Some(ref prefix) = toml.reasoning.line_prefix {
        config.markers.line_prefix.clone_from(prefix);
    }

    // Prompt
    if let Some(ref system) = toml.prompt.system {
        config.system_prompt.clone_from(system);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut GatewayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("OLLAMA_HOST").filter(|v| !v.is_empty()) {
        config.backend.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("OLLAMA_MODEL").filter(|v| !v.is_empty()) {
        config.backend.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(host) = env("HOST").filter(|v| !v.is_empty()) {
        config.host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("PORT") {
        match port.parse::<u16>() {
            Ok(port) => {
                config.port = port;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid PORT"),
        }
    }
    if let Some(timeout) = env("PLANNER_BACKEND_TIMEOUT") {
        match timeout.parse::<u64>() {
            Ok(secs) => {
                config.backend.timeout = Duration::from_secs(secs);
                config.source = ConfigSource::Env;
            }
            Err(e) => {
                tracing::warn!(value = %timeout, error = %e, "Ignoring invalid PLANNER_BACKEND_TIMEOUT");
            }
        }
    }
    if let Some(dir) = env("PLANNER_STATIC_DIR").filter(|v| !v.is_empty()) {
        config.static_dir = PathBuf::from(dir);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Command-line overrides, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind host override
    pub host: Option<String>,

    /// Bind port override
    pub port: Option<u16>,

    /// Backend URL override
    pub backend_url: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Static directory override
    pub static_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.backend_url.is_none()
            && self.model.is_none()
            && self.static_dir.is_none()
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override makes the
    /// configuration invalid.
    pub fn apply(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        config.source = ConfigSource::Cli;

        if let Some(ref host) = self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref url) = self.backend_url {
            config.backend.base_url.clone_from(url);
        }
        if let Some(ref model) = self.model {
            config.backend.model.clone_from(model);
        }
        if let Some(ref dir) = self.static_dir {
            config.static_dir.clone_from(dir);
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
