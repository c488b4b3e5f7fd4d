//! OpenVPN provider backed by the `openvpn` daemon

use super::process::{self, locate, run, write_private};
use super::{ProtocolProvider, TunnelContext};
use crate::error::ProviderError;
use crate::platform::SystemStatus;
use crate::types::{Protocol, ServerConfiguration};
use crate::vpn::stats::DataCount;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

const TOOL: &str = "openvpn";
const INTERFACE: &str = "veiltun0";
const STATE_DIR: &str = "openvpn";

/// Runs `openvpn --daemon` with the resolved profile
#[derive(Debug)]
pub struct OpenVpnProvider {
    context: TunnelContext,
    binary: Mutex<Option<PathBuf>>,
}

impl OpenVpnProvider {
    pub(crate) fn new(context: TunnelContext) -> Self {
        Self {
            context,
            binary: Mutex::new(None),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.context.container.group_dir().join(STATE_DIR)
    }

    fn pid_file(&self) -> PathBuf {
        self.state_dir().join("openvpn.pid")
    }

    fn binary(&self) -> Result<PathBuf, ProviderError> {
        let mut cached = self.binary.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = cached.as_ref() {
            return Ok(path.clone());
        }
        let path = locate(TOOL)?;
        *cached = Some(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl ProtocolProvider for OpenVpnProvider {
    fn protocol(&self) -> Protocol {
        Protocol::OpenVpn
    }

    async fn load_configuration(&self) -> Result<(), ProviderError> {
        self.binary()?;
        self.context.container.ensure_dir(STATE_DIR)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(server = %configuration.server_id))]
    async fn connect(&self, configuration: &ServerConfiguration) -> Result<(), ProviderError> {
        let binary = self.binary()?;
        let dir = self.context.container.ensure_dir(STATE_DIR)?;

        let profile = dir.join("profile.ovpn");
        write_private(&profile, &configuration.profile)?;

        let profile_arg = profile.display().to_string();
        let pid_arg = self.pid_file().display().to_string();
        let auth_path = dir.join("auth.txt");
        let auth_arg = auth_path.display().to_string();
        let mut args = vec![
            "--config",
            profile_arg.as_str(),
            "--dev",
            INTERFACE,
            "--dev-type",
            "tun",
            "--writepid",
            pid_arg.as_str(),
            "--daemon",
            self.context.extension_id.as_str(),
        ];

        if let Some(credentials) = configuration.credentials() {
            write_private(&auth_path, &credentials)?;
            args.extend(["--auth-user-pass", auth_arg.as_str()]);
        }

        self.context.record(SystemStatus::Connecting, Some(INTERFACE));
        if let Err(e) = run(&binary, &args).await {
            self.context.record(SystemStatus::Disconnected, None);
            return Err(e);
        }

        info!(interface = INTERFACE, "OpenVPN daemon started");
        self.context.record(SystemStatus::Connected, Some(INTERFACE));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        let pid_file = self.pid_file();
        let contents = tokio::fs::read_to_string(&pid_file)
            .await
            .map_err(|_| ProviderError::Failed("OpenVPN is not running".to_string()))?;
        let pid: i32 = contents.trim().parse().map_err(|_| {
            ProviderError::Failed(format!("Invalid PID file {}", pid_file.display()))
        })?;

        self.context.record(SystemStatus::Disconnecting, Some(INTERFACE));
        debug!(pid, "Terminating OpenVPN daemon");
        let result = process::terminate_process(pid).await;

        let _ = tokio::fs::remove_file(&pid_file).await;
        let _ = tokio::fs::remove_file(self.state_dir().join("auth.txt")).await;
        self.context.record(SystemStatus::Disconnected, None);
        result
    }

    fn data_count(&self) -> Option<DataCount> {
        self.context.interfaces.counters(INTERFACE)
    }
}
