//! Configuration management
//!
//! Store location, server binding, and polling intervals. Every field has a
//! default so a missing or partial `config.toml` still loads.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Watcher/server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Feedback agent settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Browser viewer settings
    #[serde(default)]
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the context documents
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Feedback log entries kept (oldest dropped first)
    #[serde(default = "default_max_feedback_entries")]
    pub max_feedback_entries: usize,
    /// Items kept per insight / performance list
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,
    /// Recent completions kept in the session context
    #[serde(default = "default_max_recent_completions")]
    pub max_recent_completions: usize,
    /// Processed identity queries kept in the queue
    #[serde(default = "default_max_processed_queries")]
    pub max_processed_queries: usize,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".context")
}

fn default_max_feedback_entries() -> usize {
    50
}

fn default_max_insights() -> usize {
    10
}

fn default_max_recent_completions() -> usize {
    5
}

fn default_max_processed_queries() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_feedback_entries: default_max_feedback_entries(),
            max_insights: default_max_insights(),
            max_recent_completions: default_max_recent_completions(),
            max_processed_queries: default_max_processed_queries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (local only by default)
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Milliseconds between document modification checks
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,
    /// Extra static files served under /static
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<PathBuf>,
    /// Open the viewer in the default browser once listening
    #[serde(default)]
    pub open_browser: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_watch_interval() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            watch_interval_ms: default_watch_interval(),
            asset_dir: None,
            open_browser: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Milliseconds between queue polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Milliseconds between browser polls of /api/state
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Apply command line overrides on top of file values
    pub fn with_overrides(mut self, base_dir: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(dir) = base_dir {
            self.store.base_dir = dir;
        }
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "context-keeper", "context-keeper")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration ({})", config_path().map(|p| p.display().to_string()).unwrap_or_else(|_| "unknown".into()));
    println!("  store.base_dir:               {}", config.store.base_dir.display());
    println!("  store.max_feedback_entries:   {}", config.store.max_feedback_entries);
    println!("  store.max_insights:           {}", config.store.max_insights);
    println!("  store.max_recent_completions: {}", config.store.max_recent_completions);
    println!("  store.max_processed_queries:  {}", config.store.max_processed_queries);
    println!("  server.host:                  {}", config.server.host);
    println!("  server.port:                  {}", config.server.port);
    println!("  server.watch_interval_ms:     {}", config.server.watch_interval_ms);
    println!("  server.open_browser:          {}", config.server.open_browser);
    println!("  agent.poll_interval_ms:       {}", config.agent.poll_interval_ms);
    println!("  viewer.poll_interval_ms:      {}", config.viewer.poll_interval_ms);
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.store.base_dir, PathBuf::from(".context"));
        assert_eq!(config.agent.poll_interval_ms, 2000);
        assert_eq!(config.store.max_feedback_entries, 50);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[server]\nport = 4100\n").unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.viewer.poll_interval_ms, 2000);
        assert!(!config.server.open_browser);
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::default()
            .with_overrides(Some(PathBuf::from("/tmp/ctx")), None, Some(9999));
        assert_eq!(config.store.base_dir, PathBuf::from("/tmp/ctx"));
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let missing = Config::load_from(&path).unwrap();
        assert_eq!(missing.server.port, 3000);

        let mut config = Config::default();
        config.agent.poll_interval_ms = 500;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.agent.poll_interval_ms, 500);
    }

    #[test]
    fn test_default_toml_parses() {
        let text = default_config_toml();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, 3000);
    }
}
