//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

pub mod output;
pub mod servers;
pub mod vpn;

use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use veil_core::config::toml_config::{get_container_root, load_config, load_config_from_path};
use veil_core::config::VeilConfig;
use veil_core::directory::HttpDirectory;
use veil_core::error::{VeilError, VpnError};
use veil_core::platform::{FileSharedStore, SharedContainer, TunnelRegistry};
use veil_core::types::Configuration;
use veil_core::vpn::{StandardProviderFactory, Supervisor};

/// Loaded configuration plus a supervisor reconciled against the tunnel
/// registry
pub struct Session {
    pub config: VeilConfig,
    pub supervisor: Supervisor,
}

impl Session {
    /// Load the configuration and start the supervisor
    pub async fn open(config_path: Option<&Path>) -> Result<Self, VeilError> {
        let config = match config_path {
            Some(path) => load_config_from_path(path)?,
            None => load_config()?,
        };

        let root = match &config.container.root {
            Some(root) => root.clone(),
            None => get_container_root()?,
        };
        debug!(root = %root.display(), group = %config.container.app_group, "Using shared container");
        let container = SharedContainer::new(root, config.container.app_group.clone());

        let directory = HttpDirectory::new(&config.directory.base_url, config.directory.timeout())
            .map_err(VpnError::from)?;
        let factory =
            StandardProviderFactory::new(container.clone(), config.container.extension_id.clone());

        let supervisor = Supervisor::builder(Arc::new(directory), Arc::new(factory))
            .system(Arc::new(TunnelRegistry::new(&container)))
            .shared_store(Arc::new(FileSharedStore::new(&container)))
            .container(config.container.clone())
            .settings(config.supervisor.clone())
            .start()
            .await;

        Ok(Self { config, supervisor })
    }

    /// Provider configuration for this installation
    pub fn provider_configuration(&self) -> Configuration {
        Configuration::openvpn(
            self.config.container.app_group.clone(),
            self.config.container.extension_id.clone(),
        )
    }
}
