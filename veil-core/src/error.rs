//! Error types for the veil VPN supervisor
//!
//! This module defines all error types used throughout the application,
//! providing consistent error handling and user-friendly error messages.

use thiserror::Error;

/// Main error type for the veil application
#[derive(Error, Debug)]
pub enum VeilError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors related to VPN lifecycle operations
    #[error("VPN error: {0}")]
    Vpn(#[from] VpnError),

    /// Errors raised while reading OS-level tunnel state
    #[error("System VPN error: {0}")]
    System(#[from] SystemError),

    /// A server id that the directory does not list
    #[error("Unknown server: {id}")]
    UnknownServer { id: String },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// VPN lifecycle errors surfaced by the supervisor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VpnError {
    #[error("VPN configuration not found")]
    ConfigurationNotFound,

    #[error("Unsupported protocol: {id}")]
    UnsupportedProtocol { id: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Disconnection failed: {reason}")]
    DisconnectionFailed { reason: String },

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("VPN supervisor is no longer running")]
    SupervisorStopped,
}

impl VpnError {
    /// Raw failure text suitable for a `Failed` status
    pub fn reason(&self) -> String {
        match self {
            VpnError::ConnectionFailed { reason } | VpnError::DisconnectionFailed { reason } => {
                reason.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Server directory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Directory request failed: {message}")]
    Transport { message: String },

    #[error("Directory responded with status {code}")]
    Status { code: u16 },

    #[error("Failed to decode directory response: {message}")]
    Decode { message: String },

    #[error("Invalid directory URL: {message}")]
    InvalidUrl { message: String },
}

/// Errors raised by a protocol provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Failed(String),

    #[error("{tool} was not found in PATH")]
    ToolMissing { tool: String },

    #[error("{command} exited with status {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io {
            message: e.to_string(),
        }
    }
}

/// Errors reading the OS-level VPN configuration store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("Permission denied reading VPN configuration: {message}")]
    PermissionDenied { message: String },

    #[error("Failed to read VPN configuration: {message}")]
    ReadFailed { message: String },
}

impl From<std::io::Error> for SystemError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => SystemError::PermissionDenied {
                message: e.to_string(),
            },
            _ => SystemError::ReadFailed {
                message: e.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, VeilError>;
