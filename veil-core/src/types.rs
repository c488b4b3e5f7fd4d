//! Shared value types
//!
//! Servers, protocols and configurations are immutable values sourced from
//! the directory or the caller and freely shared between components.

use crate::error::VpnError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A VPN server as listed by the directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Directory identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// ISO country code
    #[serde(default)]
    pub country: String,
    /// Optional city name
    #[serde(default)]
    pub city: Option<String>,
    /// Quality score reported by the directory (higher is better)
    #[serde(default)]
    pub quality: Option<u32>,
    /// Wire identifiers of the protocols this server accepts
    #[serde(default)]
    pub protocols: Vec<String>,
}

impl Server {
    /// Check whether the server advertises the given protocol
    pub fn supports(&self, protocol: Protocol) -> bool {
        self.protocols
            .iter()
            .any(|id| id.eq_ignore_ascii_case(protocol.id()))
    }
}

/// Transport protocol used for a tunnel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    OpenVpn,
    Ikev2,
    WireGuard,
}

impl Protocol {
    /// All supported protocols
    pub const ALL: [Protocol; 3] = [Protocol::OpenVpn, Protocol::Ikev2, Protocol::WireGuard];

    /// Canonical wire identifier
    pub fn id(&self) -> &'static str {
        match self {
            Protocol::OpenVpn => "OPENVPN",
            Protocol::Ikev2 => "IKEV2",
            Protocol::WireGuard => "WIREGUARD",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::OpenVpn => "OpenVPN",
            Protocol::Ikev2 => "IKEv2",
            Protocol::WireGuard => "WireGuard",
        }
    }

    /// Resolve a wire identifier, case-insensitively
    pub fn from_id(id: &str) -> Result<Self, VpnError> {
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(id.trim()))
            .ok_or_else(|| VpnError::UnsupportedProtocol { id: id.to_string() })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s)
    }
}

impl TryFrom<String> for Protocol {
    type Error = VpnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_id(&value)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.id().to_string()
    }
}

/// Caller-supplied provider parameters
///
/// OpenVPN needs both fields; IKEv2 and WireGuard ignore them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Shared container group the provider stores its state in
    pub app_group: Option<String>,
    /// Identifier of the tunnel provider extension
    pub bundle_identifier: Option<String>,
}

impl Configuration {
    /// Create a configuration from optional parts
    pub fn new(app_group: Option<String>, bundle_identifier: Option<String>) -> Self {
        Self {
            app_group,
            bundle_identifier,
        }
    }

    /// Configuration required for OpenVPN
    pub fn openvpn(app_group: impl Into<String>, bundle_identifier: impl Into<String>) -> Self {
        Self::new(Some(app_group.into()), Some(bundle_identifier.into()))
    }
}

/// Resolved per-server connection parameters returned by the directory
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfiguration {
    /// Server the configuration belongs to
    pub server_id: String,
    /// Protocol wire identifier
    pub protocol: String,
    /// Endpoint host name or address
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Protocol-specific profile text (ovpn file, wg-quick file, swanctl conf)
    pub profile: String,
    /// Optional username for credential-based protocols
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password, never logged
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl ServerConfiguration {
    /// Credentials as a `user\npass` auth file body, when both are present
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => {
                Some(format!("{}\n{}\n", user, password.expose_secret()))
            }
            _ => None,
        }
    }
}

/// The (server, protocol) pair currently active
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub server: Server,
    pub protocol: Protocol,
}
