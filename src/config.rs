//! Configuration Management
//!
//! Handles persistent configuration storage for hyperbucket.

use crate::api::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public Bitbucket Cloud API
pub const DEFAULT_SERVER: &str = "https://api.bitbucket.org";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Base URI link templates are rooted at
    #[serde(default)]
    pub server_base_uri: Option<String>,
    /// Account name used when a finder needs an owner
    #[serde(default)]
    pub username: Option<String>,
    /// Sent as the `From` header
    #[serde(default)]
    pub email: Option<String>,
    /// Default log level for the CLI
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hyperbucket").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path; missing or corrupt files yield the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective server (CLI > config > BITBUCKET_URL > public API)
    pub fn effective_server(&self) -> String {
        self.server_base_uri
            .clone()
            .or_else(|| std::env::var("BITBUCKET_URL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    /// Get effective username (CLI > config > BITBUCKET_USERNAME)
    pub fn effective_username(&self) -> Option<String> {
        self.username
            .clone()
            .or_else(|| std::env::var("BITBUCKET_USERNAME").ok())
            .filter(|s| !s.is_empty())
    }

    /// Set the server base URI. An empty value clears it. Call [`save`](Self::save) to persist.
    pub fn set_server(&mut self, server_base_uri: &str) {
        let server = server_base_uri.trim().trim_end_matches('/');
        self.server_base_uri = (!server.is_empty()).then(|| server.to_string());
    }

    /// Set the username. An empty value clears it.
    pub fn set_username(&mut self, username: &str) {
        let username = username.trim();
        self.username = (!username.is_empty()).then(|| username.to_string());
    }
}
