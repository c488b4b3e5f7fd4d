//! OS-level tunnel state and the app-scoped shared store
//!
//! The supervisor reads these at startup to recover state for a tunnel that
//! outlived the process which started it.

use crate::error::SystemError;
use crate::types::{Protocol, Server};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod container;
pub mod interface;

pub use container::{FileSharedStore, SharedContainer, TunnelRegistry};
pub use interface::NetInterfaces;

/// Default key of the persisted last-connected-server record
pub const LAST_SERVER_KEY: &str = "lastConnectedServer";

/// Live status the OS reports for a configured tunnel profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Connected,
    Connecting,
    Reasserting,
    Disconnecting,
    Disconnected,
    Invalid,
    #[serde(other)]
    Unknown,
}

impl SystemStatus {
    /// Whether the tunnel is (or is becoming) up
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SystemStatus::Connected | SystemStatus::Connecting | SystemStatus::Reasserting
        )
    }
}

/// A tunnel profile known to the OS
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProfile {
    /// Identifier of the provider extension owning the profile
    pub extension_id: String,
    pub status: SystemStatus,
    /// When the OS reports the tunnel came up
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    /// Network interface backing the tunnel, when it has one
    #[serde(default)]
    pub interface: Option<String>,
}

impl SystemProfile {
    pub fn new(extension_id: impl Into<String>, status: SystemStatus) -> Self {
        Self {
            extension_id: extension_id.into(),
            status,
            connected_at: None,
            interface: None,
        }
    }
}

/// OS VPN configuration store
#[async_trait]
pub trait SystemVpnStore: Send + Sync {
    /// Profiles owned by the given provider extension
    async fn profiles(&self, extension_id: &str) -> Result<Vec<SystemProfile>, SystemError>;
}

/// App/extension-shared key/value store
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]) -> std::io::Result<()>;
}

/// Persisted record of the last server a tunnel was established to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastServerRecord {
    pub server_id: String,
    pub server_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub quality: Option<u32>,
    pub protocol: String,
}

impl LastServerRecord {
    pub fn new(server: &Server, protocol: Protocol) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            country: server.country.clone(),
            quality: server.quality,
            protocol: protocol.id().to_string(),
        }
    }

    /// Decode a stored record; anything unreadable counts as no record
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        // Plain string/number fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// The server and protocol this record describes
    pub fn resolve(&self) -> Option<(Server, Protocol)> {
        let protocol = Protocol::from_id(&self.protocol).ok()?;
        let server = Server {
            id: self.server_id.clone(),
            name: self.server_name.clone(),
            country: self.country.clone(),
            city: None,
            quality: self.quality,
            protocols: vec![protocol.id().to_string()],
        };
        Some((server, protocol))
    }

    /// Load and resolve the record stored under `key`
    pub fn load(store: &dyn SharedStore, key: &str) -> Option<(Server, Protocol)> {
        store
            .get(key)
            .and_then(|bytes| Self::decode(&bytes))
            .and_then(|record| record.resolve())
    }
}
