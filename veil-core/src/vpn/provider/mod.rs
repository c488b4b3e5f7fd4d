//! Protocol providers and their factory
//!
//! A provider establishes and tears down one tunnel for one transport
//! protocol. The factory maps a protocol plus caller configuration to a
//! provider instance, validating the configuration without doing any I/O.

use crate::error::{ProviderError, VpnError};
use crate::platform::{NetInterfaces, SharedContainer, SystemProfile, SystemStatus, TunnelRegistry};
use crate::types::{Configuration, Protocol, ServerConfiguration};
use crate::vpn::stats::DataCount;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod ikev2;
pub mod openvpn;
mod process;
pub mod wireguard;

pub use ikev2::Ikev2Provider;
pub use openvpn::OpenVpnProvider;
pub use wireguard::WireGuardProvider;

/// Tunnel establishment for one transport protocol
#[async_trait]
pub trait ProtocolProvider: Send + Sync {
    /// Protocol this provider speaks
    fn protocol(&self) -> Protocol;

    /// Prepare local state (tools, directories) before connecting
    async fn load_configuration(&self) -> Result<(), ProviderError>;

    /// Bring the tunnel up with the resolved server configuration
    async fn connect(&self, configuration: &ServerConfiguration) -> Result<(), ProviderError>;

    /// Tear the tunnel down
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Current byte counters, if the provider can report them
    fn data_count(&self) -> Option<DataCount>;
}

/// Maps a protocol and configuration to a provider instance
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        protocol: Protocol,
        configuration: &Configuration,
    ) -> Result<Arc<dyn ProtocolProvider>, VpnError>;

    /// Same as [`ProviderFactory::create`] for a raw wire identifier
    fn create_by_id(
        &self,
        protocol_id: &str,
        configuration: &Configuration,
    ) -> Result<Arc<dyn ProtocolProvider>, VpnError> {
        self.create(Protocol::from_id(protocol_id)?, configuration)
    }
}

/// State shared by the process-backed providers
#[derive(Debug, Clone)]
pub(crate) struct TunnelContext {
    pub(crate) extension_id: String,
    pub(crate) container: SharedContainer,
    pub(crate) interfaces: NetInterfaces,
}

impl TunnelContext {
    /// Record the tunnel's state in the group's registry
    ///
    /// Bookkeeping only: a failed write never fails the tunnel operation.
    pub(crate) fn record(&self, status: SystemStatus, interface: Option<&str>) {
        let mut profile = SystemProfile::new(self.extension_id.clone(), status);
        if status == SystemStatus::Connected {
            profile.connected_at = Some(Utc::now());
        }
        profile.interface = interface.map(str::to_string);

        if let Err(e) = TunnelRegistry::new(&self.container).record(profile) {
            warn!(extension = %self.extension_id, error = %e, "Failed to record tunnel state");
        }
    }
}

/// Factory for the bundled process-backed providers
#[derive(Debug, Clone)]
pub struct StandardProviderFactory {
    container: SharedContainer,
    extension_id: String,
    interfaces: NetInterfaces,
}

impl StandardProviderFactory {
    /// `container` and `extension_id` are used by protocols that do not take
    /// them from the caller's configuration.
    pub fn new(container: SharedContainer, extension_id: impl Into<String>) -> Self {
        Self {
            container,
            extension_id: extension_id.into(),
            interfaces: NetInterfaces::default(),
        }
    }

    /// Read interface counters from a different sysfs tree
    pub fn with_interfaces(mut self, interfaces: NetInterfaces) -> Self {
        self.interfaces = interfaces;
        self
    }

    fn default_context(&self) -> TunnelContext {
        TunnelContext {
            extension_id: self.extension_id.clone(),
            container: self.container.clone(),
            interfaces: self.interfaces.clone(),
        }
    }
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ProviderFactory for StandardProviderFactory {
    fn create(
        &self,
        protocol: Protocol,
        configuration: &Configuration,
    ) -> Result<Arc<dyn ProtocolProvider>, VpnError> {
        debug!(%protocol, "Creating protocol provider");

        let provider: Arc<dyn ProtocolProvider> = match protocol {
            Protocol::OpenVpn => {
                let (Some(app_group), Some(bundle_identifier)) = (
                    required(&configuration.app_group),
                    required(&configuration.bundle_identifier),
                ) else {
                    warn!("OpenVPN requires app_group and bundle_identifier in configuration");
                    return Err(VpnError::ConfigurationNotFound);
                };
                Arc::new(OpenVpnProvider::new(TunnelContext {
                    extension_id: bundle_identifier.to_string(),
                    container: SharedContainer::new(self.container.root(), app_group),
                    interfaces: self.interfaces.clone(),
                }))
            }
            Protocol::Ikev2 => Arc::new(Ikev2Provider::new(self.default_context())),
            Protocol::WireGuard => Arc::new(WireGuardProvider::new(self.default_context())),
        };
        Ok(provider)
    }
}
