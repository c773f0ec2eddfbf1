//! Configuration management for ember
//!
//! Configuration is read from an optional `ember.toml` file, then patched
//! with environment overrides. Every section and field has a default, so an
//! empty or missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ember.toml";

/// Errors that can occur during configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error while reading the config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for ember
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Model backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tool sandbox settings
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub agent: AgentConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address to bind (e.g. "0.0.0.0:8765")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8765".to_string()
}

fn default_body_limit_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Tool sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Directory all file tools are confined to (defaults to the working directory)
    #[serde(default)]
    pub project_root: Option<PathBuf>,

    /// Shell command timeout in seconds; 0 disables the timeout
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
}

fn default_shell_timeout_secs() -> u64 {
    60
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            shell_timeout_secs: default_shell_timeout_secs(),
        }
    }
}

impl SandboxConfig {
    /// Shell timeout as a duration, `None` when disabled
    pub fn shell_timeout(&self) -> Option<Duration> {
        (self.shell_timeout_secs > 0).then(|| Duration::from_secs(self.shell_timeout_secs))
    }

    /// The configured project root, or the current directory
    pub fn resolved_project_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.project_root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Maximum model calls per request; 0 means unbounded
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_max_rounds() -> u32 {
    16
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

impl AgentConfig {
    /// Round limit, `None` when unbounded
    pub fn round_limit(&self) -> Option<u32> {
        (self.max_rounds > 0).then_some(self.max_rounds)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: the default configuration is returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `PORT`, `OLLAMA_HOST` and `EMBER_PROJECT_ROOT` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply environment-style overrides from an arbitrary lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            self.server.bind_address = replace_port(&self.server.bind_address, port.trim());
        }

        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            let host = host.trim();
            self.backend.base_url = if host.starts_with("http://") || host.starts_with("https://") {
                host.to_string()
            } else {
                format!("http://{}", host)
            };
        }

        if let Some(root) = lookup("EMBER_PROJECT_ROOT").filter(|r| !r.trim().is_empty()) {
            self.sandbox.project_root = Some(PathBuf::from(root));
        }
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.default_model must not be empty".to_string()));
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url must not be empty".to_string()));
        }

        if let Some(root) = &self.sandbox.project_root {
            if !root.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "sandbox.project_root is not a directory: {}",
                    root.display()
                )));
            }
        }

        Ok(())
    }
}

/// Swap the port of a `host:port` address, keeping the host
fn replace_port(address: &str, port: &str) -> String {
    match address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", address, port),
    }
}
