//! Configuration management for Coastal services.
//!
//! Configuration lives in a single JSON file at `~/.coastal/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `COASTAL_HOST` → server.host
//! - `COASTAL_PORT` → server.port
//! - `COASTAL_ADMIN_PASSWORD` → admin.password
//! - `GROQ_API_KEY` → secrets.groq_api_key
//! - `GROQ_MODEL` → provider.model

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".coastal"),
        |dirs| dirs.home_dir().join(".coastal"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number. Default: 4520.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4520
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier passed to the completion API.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the provider base URL (testing, self-hosted gateways).
    /// Default is the public Groq endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_model() -> String {
    "llama-3.1-8b-instant".into()
}

/// API keys and other credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Groq API key. Without it the chatbot serves a fixed offline response.
    #[serde(default)]
    pub groq_api_key: Option<String>,
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Storage configuration for conversation history and the interaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Conversation history file.
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Admin interaction log file.
    #[serde(default = "default_interaction_log_file")]
    pub interaction_log_file: PathBuf,

    /// Use in-memory stores instead of files (serverless/read-only deploys).
    #[serde(default)]
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_file: default_history_file(),
            interaction_log_file: default_interaction_log_file(),
            ephemeral: false,
        }
    }
}

fn default_history_file() -> PathBuf {
    PathBuf::from("data/conversation_history.json")
}

fn default_interaction_log_file() -> PathBuf {
    PathBuf::from("logs/admin_log.json")
}

// ============================================================================
// Admin Configuration
// ============================================================================

/// Admin endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Password checked against the `X-Admin-Password` header.
    #[serde(default = "default_admin_password")]
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: default_admin_password(),
        }
    }
}

fn default_admin_password() -> String {
    "admin123".into()
}

// ============================================================================
// City Configuration
// ============================================================================

/// Coordinates of the covered city, used for weather and traffic context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CityConfig {
    #[serde(default = "default_city_lat")]
    pub lat: f64,
    #[serde(default = "default_city_lng")]
    pub lng: f64,
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            lat: default_city_lat(),
            lng: default_city_lng(),
        }
    }
}

// Corpus Christi, TX
fn default_city_lat() -> f64 {
    27.8006
}

fn default_city_lng() -> f64 {
    -97.3964
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for Coastal services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub city: CityConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, applying env overrides.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path, applying env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("COASTAL_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("COASTAL_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(password) = std::env::var("COASTAL_ADMIN_PASSWORD") {
            self.admin.password = password;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.is_empty() {
                self.secrets.groq_api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("GROQ_MODEL") {
            self.provider.model = model;
        }
    }

    /// Persist the configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("serializing config")?;
        fs::write(&path, raw).with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4520);
        assert_eq!(config.provider.model, "llama-3.1-8b-instant");
        assert!(config.secrets.groq_api_key.is_none());
        assert!(!config.storage.ephemeral);
    }

    #[test]
    fn test_city_defaults_to_corpus_christi() {
        let city = CityConfig::default();
        assert!((city.lat - 27.8006).abs() < f64::EPSILON);
        assert!((city.lng + 97.3964).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{ "server": { "port": 9000 } }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.admin.password, "admin123");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.server.port, 4520);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "admin": { "password": "hunter2" } }"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.admin.password, "hunter2");
    }
}
