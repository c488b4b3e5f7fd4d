//! WireGuard provider backed by `wg-quick`

use super::process::{locate, run, write_private};
use super::{ProtocolProvider, TunnelContext};
use crate::error::ProviderError;
use crate::platform::SystemStatus;
use crate::types::{Protocol, ServerConfiguration};
use crate::vpn::stats::DataCount;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

const TOOL: &str = "wg-quick";
// wg-quick names the interface after the config file stem.
const INTERFACE: &str = "veilwg0";
const STATE_DIR: &str = "wireguard";

#[derive(Debug)]
pub struct WireGuardProvider {
    context: TunnelContext,
}

impl WireGuardProvider {
    pub(crate) fn new(context: TunnelContext) -> Self {
        Self { context }
    }

    fn config_path(&self) -> PathBuf {
        self.context
            .container
            .group_dir()
            .join(STATE_DIR)
            .join(format!("{}.conf", INTERFACE))
    }
}

#[async_trait]
impl ProtocolProvider for WireGuardProvider {
    fn protocol(&self) -> Protocol {
        Protocol::WireGuard
    }

    async fn load_configuration(&self) -> Result<(), ProviderError> {
        locate(TOOL)?;
        self.context.container.ensure_dir(STATE_DIR)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(server = %configuration.server_id))]
    async fn connect(&self, configuration: &ServerConfiguration) -> Result<(), ProviderError> {
        let tool = locate(TOOL)?;
        self.context.container.ensure_dir(STATE_DIR)?;

        let config_path = self.config_path();
        write_private(&config_path, &configuration.profile)?;
        let config_arg = config_path.display().to_string();

        self.context.record(SystemStatus::Connecting, Some(INTERFACE));
        if let Err(e) = run(&tool, &["up", config_arg.as_str()]).await {
            self.context.record(SystemStatus::Disconnected, None);
            return Err(e);
        }

        info!(interface = INTERFACE, "WireGuard interface up");
        self.context.record(SystemStatus::Connected, Some(INTERFACE));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        let tool = locate(TOOL)?;
        let config_arg = self.config_path().display().to_string();

        self.context.record(SystemStatus::Disconnecting, Some(INTERFACE));
        let result = run(&tool, &["down", config_arg.as_str()]).await.map(|_| ());
        self.context.record(SystemStatus::Disconnected, None);
        result
    }

    fn data_count(&self) -> Option<DataCount> {
        self.context.interfaces.counters(INTERFACE)
    }
}
