//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/vigil/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/vigil/` (~/.config/vigil/)
//! - State/Logs/Session: `$XDG_STATE_HOME/vigil/` (~/.local/state/vigil/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Analysis backend endpoints and connection policy
    #[serde(default)]
    pub server: ServerConfig,

    /// View engine defaults
    #[serde(default)]
    pub view: ViewConfig,

    /// Known analysis modules (id -> display name)
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            view: ViewConfig::default(),
            tools: default_tools(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Analysis backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the event stream (`ws://` or `wss://`)
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base URL of the command API (`http://` or `https://`)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Session id the backend scopes runs to
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Delay before a reconnect attempt after an unexpected close
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient command failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
            project_id: default_project_id(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ServerConfig {
    /// Full URL of the analysis event stream
    pub fn stream_url(&self) -> String {
        format!("{}/api/ws/analysis", self.ws_url.trim_end_matches('/'))
    }

    /// Reconnect delay as a [`Duration`]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "server.ws_url must start with ws:// or wss:// (got {})",
                self.ws_url
            )));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.api_url must start with http:// or https:// (got {})",
                self.api_url
            )));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(Error::Config(
                "server.reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("server.project_id must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_project_id() -> String {
    "default_session".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

/// View engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    /// Number of buckets in the findings trend histogram
    #[serde(default = "default_trend_buckets")]
    pub trend_buckets: usize,

    /// Number of lines kept in each module's display ring
    #[serde(default = "default_recent_lines")]
    pub recent_lines: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            trend_buckets: default_trend_buckets(),
            recent_lines: default_recent_lines(),
        }
    }
}

fn default_trend_buckets() -> usize {
    20
}

fn default_recent_lines() -> usize {
    10
}

/// A known analysis module
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Module id as sent by the backend (e.g. `B_Ruff`)
    pub id: String,
    /// Display name (e.g. `Ruff`)
    pub title: String,
}

impl ToolConfig {
    fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new("F_TypeScript", "TypeScript"),
        ToolConfig::new("F_ESLint", "ESLint"),
        ToolConfig::new("B_Ruff", "Ruff"),
        ToolConfig::new("B_Pyright", "Pyright"),
        ToolConfig::new("B_Lizard", "Lizard"),
    ]
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Extra `target=level` filter directives, e.g. `vigil_core::transport=debug`
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            directives: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.server.validate()?;
        Ok(config)
    }

    /// Module id -> display name map built from the `[[tools]]` list
    pub fn tool_names(&self) -> HashMap<String, String> {
        self.tools
            .iter()
            .map(|t| (t.id.clone(), t.title.clone()))
            .collect()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/vigil/config.toml` (~/.config/vigil/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("vigil").join("config.toml")
    }

    /// Returns the state directory path (for logs and the restorable session)
    ///
    /// `$XDG_STATE_HOME/vigil/` (~/.local/state/vigil/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("vigil")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/vigil/vigil.log` (~/.local/state/vigil/vigil.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("vigil.log")
    }

    /// Returns the restorable session file path
    ///
    /// `$XDG_STATE_HOME/vigil/session.json`
    pub fn session_path() -> PathBuf {
        Self::state_dir().join("session.json")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
