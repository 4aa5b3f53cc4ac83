//! # Configuration Management Module
//!
//! Configuration for the gateway is a single TOML file with one section per
//! concern:
//!
//! - [`ServerConfig`] - message size, session lifetime and capacity, dispatch deadline
//! - [`SecurityConfig`] - node allow/deny lists, rate limiting, plugin state budget
//! - [`PluginsConfig`] - per-plugin enable flags and settings
//! - [`LoggingConfig`] - log level and optional log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Max message size: {}", config.server.max_message_size);
//!     Ok(())
//! }
//! ```
//!
//! ## File Format
//!
//! ```toml
//! [server]
//! max_message_size = 200
//! session_timeout_minutes = 60
//! max_sessions = 0
//!
//! [security]
//! node_denylist = ["!deadbeef"]
//! rate_limit_enabled = true
//! rate_limit_messages = 10
//! rate_limit_window_seconds = 60
//!
//! [plugins.gopher]
//! root_directory = "./gopher_content"
//! ```
//!
//! Every section and key is optional; missing values fall back to [`Config::default`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::gateway::chunker::MIN_MAX_SIZE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub plugins: PluginsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Per-message byte limit of the radio link. Leaves room for protocol overhead.
    pub max_message_size: usize,
    pub session_timeout_minutes: u64,
    pub session_cleanup_interval_minutes: u64,
    /// Maximum concurrent sessions (0 = unlimited).
    pub max_sessions: usize,
    /// Deadline for a single plugin call before it is treated as failed.
    pub plugin_timeout_seconds: u64,
    /// Pause between consecutive chunks of one reply.
    pub chunk_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 200,
            session_timeout_minutes: 60,
            session_cleanup_interval_minutes: 5,
            max_sessions: 0,
            plugin_timeout_seconds: 30,
            chunk_delay_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes.saturating_mul(60))
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_minutes.saturating_mul(60))
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_seconds)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Empty = allow all, unless `require_allowlist` is set.
    pub node_allowlist: Vec<String>,
    /// Always wins over the allowlist.
    pub node_denylist: Vec<String>,
    pub require_allowlist: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit_messages: usize,
    pub rate_limit_window_seconds: u64,
    /// Serialized plugin state budget per session (0 = unlimited).
    pub max_plugin_state_bytes: usize,
    /// Fixed reply for denied nodes. Denied nodes are silently dropped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_reply: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            node_allowlist: Vec::new(),
            node_denylist: Vec::new(),
            require_allowlist: false,
            rate_limit_enabled: false,
            rate_limit_messages: 10,
            rate_limit_window_seconds: 60,
            max_plugin_state_bytes: 10 * 1024,
            denied_reply: None,
        }
    }
}

impl SecurityConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub gopher: GopherConfig,
    pub llm: LlmConfig,
    pub weather: WeatherConfig,
    pub wikipedia: WikipediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GopherConfig {
    pub enabled: bool,
    pub root_directory: String,
    /// Characters of a file shown before truncation.
    pub max_file_chars: usize,
}

impl Default for GopherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_directory: "./gopher_content".to_string(),
            max_file_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub ollama_url: String,
    pub model: String,
    pub max_response_length: usize,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            max_response_length: 400,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaConfig {
    pub enabled: bool,
    /// Wikipedia language edition, e.g. "en", "de".
    pub language: String,
    pub max_summary_length: usize,
    pub timeout_seconds: u64,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en".to_string(),
            max_summary_length: 400,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Receives records logged on the `security` target (denied nodes, rate limits).
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("meshgate.log".to_string()),
            security_file: Some("meshgate-security.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the dispatch engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_message_size < MIN_MAX_SIZE {
            return Err(anyhow!(
                "server.max_message_size must be at least {}, got {}",
                MIN_MAX_SIZE,
                self.server.max_message_size
            ));
        }
        if self.server.session_timeout_minutes == 0 {
            return Err(anyhow!("server.session_timeout_minutes must be > 0"));
        }
        if self.server.session_cleanup_interval_minutes == 0 {
            return Err(anyhow!("server.session_cleanup_interval_minutes must be > 0"));
        }
        if self.server.plugin_timeout_seconds == 0 {
            return Err(anyhow!("server.plugin_timeout_seconds must be > 0"));
        }
        if self.security.rate_limit_enabled {
            if self.security.rate_limit_messages == 0 {
                return Err(anyhow!("security.rate_limit_messages must be > 0"));
            }
            if self.security.rate_limit_window_seconds == 0 {
                return Err(anyhow!("security.rate_limit_window_seconds must be > 0"));
            }
        }
        if self.security.require_allowlist && self.security.node_allowlist.is_empty() {
            log::warn!("security.require_allowlist is set with an empty allowlist; every node will be denied");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.max_message_size, 200);
        assert_eq!(config.server.max_sessions, 0);
        assert!(!config.security.rate_limit_enabled);
        assert!(config.security.denied_reply.is_none());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_text = r#"
            [server]
            max_message_size = 120

            [security]
            node_denylist = ["!bad"]
            rate_limit_enabled = true
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.server.max_message_size, 120);
        assert_eq!(config.server.session_timeout_minutes, 60);
        assert_eq!(config.security.node_denylist, vec!["!bad".to_string()]);
        assert_eq!(config.security.rate_limit_messages, 10);
        assert!(config.plugins.gopher.enabled);
        assert_eq!(config.plugins.wikipedia.language, "en");
    }

    #[test]
    fn validate_rejects_tiny_message_size() {
        let mut config = Config::default();
        config.server.max_message_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_rate_budget_when_enabled() {
        let mut config = Config::default();
        config.security.rate_limit_enabled = true;
        config.security.rate_limit_messages = 0;
        assert!(config.validate().is_err());

        config.security.rate_limit_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_helpers_convert_units() {
        let config = Config::default();
        assert_eq!(config.server.session_timeout(), Duration::from_secs(3600));
        assert_eq!(config.server.session_cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.security.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.server.chunk_delay(), Duration::from_millis(500));
    }

    #[test]
    fn huge_minute_values_saturate() {
        let config: Config = toml::from_str(&format!(
            "[server]\nsession_timeout_minutes = {max}\nsession_cleanup_interval_minutes = {max}\n",
            max = i64::MAX
        ))
        .unwrap();
        assert_eq!(config.server.session_timeout(), Duration::from_secs(u64::MAX));
        assert_eq!(config.server.session_cleanup_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn default_round_trips_through_toml() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(serialized.contains("[server]"));
        assert!(!serialized.contains("denied_reply"));
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.max_message_size, 200);
    }
}
