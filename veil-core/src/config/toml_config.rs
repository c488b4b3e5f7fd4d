//! TOML configuration file I/O
//!
//! Handles loading and saving veil configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::VeilConfig;
use crate::error::{ConfigError, VeilError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve the invoking user's home directory
///
/// Tunnel tools usually need root, so when running under sudo the original
/// user's home is used.
fn home_dir() -> Result<PathBuf, VeilError> {
    if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        let home = std::env::var("SUDO_HOME").unwrap_or_else(|_| format!("/home/{}", sudo_user));
        return Ok(PathBuf::from(home));
    }

    std::env::var("HOME").map(PathBuf::from).map_err(|_| {
        VeilError::Config(ConfigError::IoError {
            message: "HOME environment variable not set".to_string(),
        })
    })
}

/// Get the default configuration directory
///
/// Returns ~/.config/veil, or VEIL_CONFIG_DIR if set
pub fn get_config_dir() -> Result<PathBuf, VeilError> {
    if let Ok(config_dir) = std::env::var("VEIL_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }
    Ok(home_dir()?.join(".config").join("veil"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, VeilError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the default root of the shared containers
///
/// Returns ~/.local/share/veil, or VEIL_STATE_DIR if set
pub fn get_container_root() -> Result<PathBuf, VeilError> {
    if let Ok(state_dir) = std::env::var("VEIL_STATE_DIR") {
        return Ok(PathBuf::from(state_dir));
    }
    Ok(home_dir()?.join(".local").join("share").join("veil"))
}

/// Load configuration from the default TOML file
pub fn load_config() -> Result<VeilConfig, VeilError> {
    let config_path = get_config_path()?;
    load_config_from_path(&config_path)
}

/// Load configuration from a specific TOML file
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<VeilConfig, VeilError> {
    let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => VeilError::Config(ConfigError::LoadFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        }),
        _ => VeilError::Config(ConfigError::IoError {
            message: format!("Failed to read config file: {}", e),
        }),
    })?;

    let config: VeilConfig = toml::from_str(&contents)?;

    config.validate().map_err(|e| {
        VeilError::Config(ConfigError::ValidationError {
            message: e.to_string(),
        })
    })?;

    debug!(
        base_url = %config.directory.base_url,
        app_group = %config.container.app_group,
        extension = %config.container.extension_id,
        stats_interval_ms = config.supervisor.stats_interval_ms,
        "Loaded configuration"
    );
    Ok(config)
}

/// Save configuration to a specific TOML file
pub fn save_config_to_path<P: AsRef<Path>>(config: &VeilConfig, path: P) -> Result<(), VeilError> {
    config.validate().map_err(|e| {
        VeilError::Config(ConfigError::ValidationError {
            message: e.to_string(),
        })
    })?;

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VeilError::Config(ConfigError::IoError {
                message: format!("Failed to create config directory: {}", e),
            })
        })?;
    }

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string).map_err(|e| {
        VeilError::Config(ConfigError::IoError {
            message: format!("Failed to write config file: {}", e),
        })
    })?;

    info!("Saved configuration to {:?}", path.as_ref());
    Ok(())
}
