//! VPN connection state management
//!
//! Defines the state machine for the tunnel lifecycle and the outward-facing
//! status that wraps it.

use crate::types::{Protocol, Server};

/// Lifecycle state of the single supervised tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected, ready to connect
    Disconnected,

    /// Attempting to establish a tunnel to a server
    Connecting { server: Server, protocol: Protocol },

    /// Tunnel established
    Connected { server: Server, protocol: Protocol },

    /// Tearing the tunnel down
    Disconnecting,

    /// Replacing the current tunnel with a new one
    Reconnecting { server: Server, protocol: Protocol },

    /// The last attempt failed
    Failed {
        error: String,
        last_server: Option<Server>,
    },
}

impl ConnectionStatus {
    /// Display title derived from the state's data
    pub fn title(&self) -> String {
        match self {
            ConnectionStatus::Disconnected => "Disconnected".to_string(),
            ConnectionStatus::Connecting { server, .. } => {
                format!("Connecting to {}...", server.name)
            }
            ConnectionStatus::Connected { server, .. } => format!("Connected to {}", server.name),
            ConnectionStatus::Disconnecting => "Disconnecting...".to_string(),
            ConnectionStatus::Reconnecting { server, .. } => {
                format!("Reconnecting to {}...", server.name)
            }
            ConnectionStatus::Failed {
                last_server: Some(server),
                ..
            } => format!("Failed: {}", server.name),
            ConnectionStatus::Failed { .. } => "Connection Failed".to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting { .. } | ConnectionStatus::Reconnecting { .. }
        )
    }

    /// Server this state refers to, including the last server of a failure
    pub fn current_server(&self) -> Option<&Server> {
        match self {
            ConnectionStatus::Connecting { server, .. }
            | ConnectionStatus::Connected { server, .. }
            | ConnectionStatus::Reconnecting { server, .. } => Some(server),
            ConnectionStatus::Failed { last_server, .. } => last_server.as_ref(),
            ConnectionStatus::Disconnected | ConnectionStatus::Disconnecting => None,
        }
    }

    pub fn current_protocol(&self) -> Option<Protocol> {
        match self {
            ConnectionStatus::Connecting { protocol, .. }
            | ConnectionStatus::Connected { protocol, .. }
            | ConnectionStatus::Reconnecting { protocol, .. } => Some(*protocol),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title())
    }
}

/// Overall client status, wrapping directory loading around the tunnel state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Initial state
    #[default]
    Idle,

    /// Loading the server list from the directory
    LoadingServers,

    /// Tunnel lifecycle state
    Connection(ConnectionStatus),
}

impl Status {
    pub fn title(&self) -> String {
        match self {
            Status::Idle => "Ready".to_string(),
            Status::LoadingServers => "Loading Servers...".to_string(),
            Status::Connection(status) => status.title(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status()
            .is_some_and(ConnectionStatus::is_connected)
    }

    pub fn is_connecting(&self) -> bool {
        self.connection_status()
            .is_some_and(ConnectionStatus::is_connecting)
    }

    pub fn connection_status(&self) -> Option<&ConnectionStatus> {
        match self {
            Status::Connection(status) => Some(status),
            _ => None,
        }
    }

    pub fn current_server(&self) -> Option<&Server> {
        self.connection_status()
            .and_then(ConnectionStatus::current_server)
    }

    pub fn current_protocol(&self) -> Option<Protocol> {
        self.connection_status()
            .and_then(ConnectionStatus::current_protocol)
    }
}

impl From<ConnectionStatus> for Status {
    fn from(status: ConnectionStatus) -> Self {
        Status::Connection(status)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title())
    }
}
