//! Configuration module
//!
//! Handles loading and saving veil configuration from TOML files.

use crate::platform::LAST_SERVER_KEY;
use crate::vpn::broadcast::DEFAULT_SUBSCRIBER_BUFFER;
use crate::vpn::stats::DEFAULT_STATS_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod toml_config;

/// Complete configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeilConfig {
    /// Server directory settings
    pub directory: DirectoryConfig,

    /// Shared container settings
    #[serde(default)]
    pub container: ContainerConfig,

    /// Supervisor tuning
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

impl VeilConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        self.directory.validate()?;
        self.container.validate()?;
        self.supervisor.validate()?;
        Ok(())
    }
}

/// Server directory connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory API base URL (HTTP/HTTPS)
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        match url::Url::parse(&self.base_url) {
            Ok(url) => match url.scheme() {
                "http" | "https" => {}
                scheme => {
                    return Err(SettingsValidationError::InvalidBaseUrl(format!(
                        "URL scheme must be http or https, got: {}",
                        scheme
                    )))
                }
            },
            Err(e) => {
                return Err(SettingsValidationError::InvalidBaseUrl(format!(
                    "Failed to parse URL: {}",
                    e
                )))
            }
        }

        if self.timeout_secs < 1 || self.timeout_secs > 300 {
            return Err(SettingsValidationError::InvalidTimeout(self.timeout_secs));
        }
        Ok(())
    }
}

/// Shared container and provider-extension identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Root directory holding the group containers; defaults to the
    /// user's data directory
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Shared group name
    #[serde(default = "default_app_group")]
    pub app_group: String,

    /// Identifier of the tunnel provider extension
    #[serde(default = "default_extension_id")]
    pub extension_id: String,
}

fn default_app_group() -> String {
    "group.dev.veil.shared".to_string()
}

fn default_extension_id() -> String {
    "dev.veil.tunnel".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            root: None,
            app_group: default_app_group(),
            extension_id: default_extension_id(),
        }
    }
}

impl ContainerConfig {
    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.app_group.trim().is_empty() || self.app_group.contains('/') {
            return Err(SettingsValidationError::InvalidIdentifier {
                field: "app_group",
                value: self.app_group.clone(),
            });
        }
        if self.extension_id.trim().is_empty() {
            return Err(SettingsValidationError::InvalidIdentifier {
                field: "extension_id",
                value: self.extension_id.clone(),
            });
        }
        Ok(())
    }
}

/// Supervisor tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Statistics sampling period in milliseconds
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Per-subscriber status queue depth before a subscriber is dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Shared store key of the last-connected-server record
    #[serde(default = "default_last_server_key")]
    pub last_server_key: String,
}

fn default_stats_interval_ms() -> u64 {
    DEFAULT_STATS_INTERVAL.as_millis() as u64
}
fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}
fn default_last_server_key() -> String {
    LAST_SERVER_KEY.to_string()
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_stats_interval_ms(),
            subscriber_buffer: default_subscriber_buffer(),
            last_server_key: default_last_server_key(),
        }
    }
}

impl SupervisorSettings {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.stats_interval_ms < 50 || self.stats_interval_ms > 60_000 {
            return Err(SettingsValidationError::InvalidStatsInterval(
                self.stats_interval_ms,
            ));
        }
        if self.subscriber_buffer < 1 || self.subscriber_buffer > 4096 {
            return Err(SettingsValidationError::InvalidSubscriberBuffer(
                self.subscriber_buffer,
            ));
        }
        if self.last_server_key.trim().is_empty() {
            return Err(SettingsValidationError::InvalidIdentifier {
                field: "last_server_key",
                value: self.last_server_key.clone(),
            });
        }
        Ok(())
    }
}

/// Validation errors for configuration sections
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsValidationError {
    #[error("base_url must be a valid HTTP/HTTPS URL: {0}")]
    InvalidBaseUrl(String),

    #[error("timeout_secs must be between 1 and 300, got: {0}")]
    InvalidTimeout(u64),

    #[error("stats_interval_ms must be between 50 and 60000, got: {0}")]
    InvalidStatsInterval(u64),

    #[error("subscriber_buffer must be between 1 and 4096, got: {0}")]
    InvalidSubscriberBuffer(usize),

    #[error("{field} is not a valid identifier: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },
}
