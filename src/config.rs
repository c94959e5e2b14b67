//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use crate::agent::AgentProfile;
use crate::Result;
use crate::error::Error;

/// Environment variable consulted when `api_key` is empty
pub const API_KEY_ENV: &str = "BOARDROOM_API_KEY";

/// Environment variable consulted when `graph.access_token` is empty
pub const GRAPH_TOKEN_ENV: &str = "BOARDROOM_GRAPH_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding rooms and messages
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// LLM provider ("openai" or "azure")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the LLM provider
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the chat completions API (Azure: the resource endpoint)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name (Azure: the deployment name)
    #[serde(default = "default_model")]
    pub model: String,

    /// Azure OpenAI API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Maximum model rounds per turn before the fallback reply
    #[serde(default = "default_tool_call_limit")]
    pub tool_call_limit: usize,

    /// Role whose messages trigger routing
    #[serde(default = "default_principal_role")]
    pub principal_role: String,

    /// Room created at startup when missing
    #[serde(default = "default_room_id")]
    pub default_room_id: i64,

    /// Post each agent's greeting into the default room at startup
    #[serde(default = "default_true")]
    pub greet_on_startup: bool,

    /// Microsoft Graph settings for the calendar and email tools
    #[serde(default)]
    pub graph: GraphConfig,

    /// Agents taking part in the meeting room
    #[serde(default = "AgentProfile::builtin")]
    pub agents: Vec<AgentProfile>,
}

/// Microsoft Graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_url")]
    pub base_url: String,

    /// Bearer token issued out of band
    #[serde(default)]
    pub access_token: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_url(),
            access_token: String::new(),
        }
    }
}

fn default_database() -> PathBuf {
    config_dir().join("boardroom.db")
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2023-07-01-preview".to_string()
}

fn default_tool_call_limit() -> usize {
    3
}

fn default_principal_role() -> String {
    "CEO".to_string()
}

fn default_room_id() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            bind: default_bind(),
            provider: default_provider(),
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            api_version: default_api_version(),
            tool_call_limit: default_tool_call_limit(),
            principal_role: default_principal_role(),
            default_room_id: default_room_id(),
            greet_on_startup: true,
            graph: GraphConfig::default(),
            agents: AgentProfile::builtin(),
        }
    }
}

impl Config {
    /// Fill empty secrets from the environment.
    pub fn apply_env(&mut self) {
        if self.api_key.is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.api_key = key;
            }
        }
        if self.graph.access_token.is_empty() {
            if let Ok(token) = std::env::var(GRAPH_TOKEN_ENV) {
                self.graph.access_token = token;
            }
        }
    }

    /// Reject configurations the meeting room cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tool_call_limit == 0 {
            return Err(Error::Config("tool_call_limit must be at least 1".to_string()));
        }
        if self.principal_role.trim().is_empty() {
            return Err(Error::Config("principal_role cannot be empty".to_string()));
        }
        if self.agents.is_empty() {
            return Err(Error::Config("at least one agent must be configured".to_string()));
        }

        let mut roles = HashSet::new();
        for profile in &self.agents {
            if profile.role == self.principal_role {
                return Err(Error::Config(format!(
                    "agent '{}' cannot take the principal role '{}'",
                    profile.name, profile.role
                )));
            }
            if !roles.insert(profile.role.as_str()) {
                return Err(Error::Config(format!("duplicate agent role: {}", profile.role)));
            }
        }
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".boardroom")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'boardroom init' first.",
            path
        )));
    }

    load_from(&path)
}

/// Load configuration from an explicit file
pub fn load_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = serde_json::from_str(&content)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default config file unless one already exists
pub fn init(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save(&Config::default(), path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tool_call_limit, 3);
        assert_eq!(config.principal_role, "CEO");
        assert_eq!(config.default_room_id, 1);
        assert_eq!(config.agents.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"model": "gpt-35-turbo-16k"}"#).unwrap();
        assert_eq!(parsed.model, "gpt-35-turbo-16k");
        assert_eq!(parsed.provider, "openai");
        assert_eq!(parsed.agents[0].role, "CEO Assistant");
    }

    #[test]
    fn test_validate_rejects_duplicate_roles() {
        let mut config = Config::default();
        let dup = config.agents[0].clone();
        config.agents.push(dup);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = Config {
            tool_call_limit: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_init_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert!(init(&path).unwrap());
        assert!(!init(&path).unwrap());

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.bind, default_bind());
    }
}
