//! IKEv2 provider backed by strongSwan's `swanctl`
//!
//! IKEv2 uses policy-based routing without a dedicated interface, so this
//! provider reports no byte counters.

use super::process::{locate, run, write_private};
use super::{ProtocolProvider, TunnelContext};
use crate::error::ProviderError;
use crate::platform::SystemStatus;
use crate::types::{Protocol, ServerConfiguration};
use crate::vpn::stats::DataCount;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

const TOOL: &str = "swanctl";
/// Connection and child SA name expected in the resolved profile
const CONNECTION: &str = "veil";
const STATE_DIR: &str = "ikev2";

#[derive(Debug)]
pub struct Ikev2Provider {
    context: TunnelContext,
}

impl Ikev2Provider {
    pub(crate) fn new(context: TunnelContext) -> Self {
        Self { context }
    }

    fn config_path(&self) -> PathBuf {
        self.context
            .container
            .group_dir()
            .join(STATE_DIR)
            .join("swanctl.conf")
    }
}

#[async_trait]
impl ProtocolProvider for Ikev2Provider {
    fn protocol(&self) -> Protocol {
        Protocol::Ikev2
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

        self.context.record(SystemStatus::Connecting, None);
        let established = async {
            run(&tool, &["--load-conns", "--file", config_arg.as_str()]).await?;
            run(&tool, &["--initiate", "--child", CONNECTION]).await
        }
        .await;
        if let Err(e) = established {
            self.context.record(SystemStatus::Disconnected, None);
            return Err(e);
        }

        info!(connection = CONNECTION, "IKEv2 security association established");
        self.context.record(SystemStatus::Connected, None);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        let tool = locate(TOOL)?;

        self.context.record(SystemStatus::Disconnecting, None);
        let result = run(&tool, &["--terminate", "--ike", CONNECTION])
            .await
            .map(|_| ());
        self.context.record(SystemStatus::Disconnected, None);
        result
    }

    fn data_count(&self) -> Option<DataCount> {
        None
    }
}
