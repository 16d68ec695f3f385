//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// HTTP server bind address
    pub server_host: String,
    /// HTTP server port number
    pub server_port: u16,
    /// Chat gateway base URL
    pub gateway_url: String,
    /// Bot handles whose events are accepted (exact match, '@' stripped)
    pub allowed_bots: Vec<String>,
    /// Directory where downloaded payloads are persisted
    pub download_dir: PathBuf,
    /// Deadline for format-menu requests, in seconds
    pub menu_timeout_seconds: u64,
    /// Deadline for payload requests, in seconds
    pub payload_timeout_seconds: u64,
    /// Liveness probe interval, in seconds
    pub probe_interval_seconds: u64,
    /// Fixed delay before a reconnect attempt, in seconds
    pub reconnect_backoff_seconds: u64,
    /// Persisted files older than this are swept, in seconds
    pub retention_seconds: u64,
    /// How long a completed progress record stays pollable, in seconds
    pub progress_linger_seconds: u64,
    /// Parallel workers for chunked media download
    pub transfer_workers: usize,
    /// Logging verbosity level
    pub log_level: LogLevel,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            gateway_url: "http://127.0.0.1:9000".to_string(),
            allowed_bots: vec!["fetchbot".to_string()],
            download_dir: PathBuf::from("downloads"),
            menu_timeout_seconds: 30,
            payload_timeout_seconds: 120,
            probe_interval_seconds: 30,
            reconnect_backoff_seconds: 5,
            retention_seconds: 3600, // one hour
            progress_linger_seconds: 60,
            transfer_workers: 4,
            log_level: LogLevel::Info,
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("botfetch").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server_port < 1024 {
            errors.push(
                "server_port must be at least 1024 (privileged ports not allowed)".to_string(),
            );
        }

        if url::Url::parse(&self.gateway_url).is_err() {
            errors.push("gateway_url must be a valid URL".to_string());
        }

        if self.allowed_bots.is_empty() {
            errors.push("allowed_bots must name at least one bot handle".to_string());
        }

        if self.menu_timeout_seconds == 0 || self.menu_timeout_seconds > 600 {
            errors.push("menu_timeout_seconds must be between 1 and 600".to_string());
        }

        if self.payload_timeout_seconds == 0 || self.payload_timeout_seconds > 3600 {
            errors.push("payload_timeout_seconds must be between 1 and 3600".to_string());
        }

        if self.transfer_workers == 0 || self.transfer_workers > 32 {
            errors.push("transfer_workers must be between 1 and 32".to_string());
        }

        if self.retention_seconds < 60 {
            errors.push("retention_seconds must be at least 60".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
