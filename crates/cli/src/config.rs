//! Configuration loading from toolgate.toml.

use host::{ProviderConfig, ProviderKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default wall-clock budget for one tool invocation.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model backend selection.
    #[serde(default)]
    pub provider: ProviderSection,

    /// HTTP listener settings.
    #[serde(default)]
    pub http: HttpSection,

    /// Tool servers to launch at startup.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,

    /// Seconds one tool invocation may take before it is abandoned.
    pub tool_timeout_secs: Option<u64>,
}

/// `[provider]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(default = "default_kind")]
    pub kind: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Overrides the backend's built-in endpoint.
    pub base_url: Option<String>,

    /// Credential for hosted backends. Prefer the environment over
    /// writing this into the file.
    pub api_key: Option<String>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    pub request_timeout_secs: Option<u64>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: None,
        }
    }
}

fn default_kind() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_model() -> String {
    "llama3.2".to_string()
}

/// `[http]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// One `[[servers]]` entry: a tool server launched over stdio.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Provider settings in the form the host crate consumes.
    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(self.provider.kind, self.provider.model.clone());
        config.base_url = self.provider.base_url.clone();
        config.api_key = self.provider.api_key.clone();
        config.temperature = self.provider.temperature;
        config.max_tokens = self.provider.max_tokens;
        if let Some(secs) = self.provider.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Launch configurations for the declared tool servers.
    pub fn server_configs(&self) -> Vec<mcp::ServerConfig> {
        self.servers
            .iter()
            .map(|s| mcp::ServerConfig {
                name: s.name.clone(),
                command: s.command.clone(),
                args: s.args.clone(),
                env: s.env.clone(),
            })
            .collect()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
