//! File-backed shared container
//!
//! A per-group directory shared by the CLI and the tunnel providers. It holds
//! the key/value store and the tunnel registry that stands in for the OS VPN
//! configuration store on this platform.

use crate::error::SystemError;
use crate::platform::{NetInterfaces, SharedStore, SystemProfile, SystemStatus, SystemVpnStore};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DEFAULTS_DIR: &str = "defaults";
const TUNNELS_FILE: &str = "tunnels.json";

/// App-group scoped directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedContainer {
    root: PathBuf,
    group: String,
}

impl SharedContainer {
    pub fn new(root: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            group: group.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by this group
    pub fn group_dir(&self) -> PathBuf {
        self.root.join(&self.group)
    }

    /// A named subdirectory of the group, created on demand
    pub fn ensure_dir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.group_dir().join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Write `contents` via a temporary sibling so readers never see a torn file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// One file per key under `<group>/defaults`
#[derive(Debug, Clone)]
pub struct FileSharedStore {
    dir: PathBuf,
}

impl FileSharedStore {
    pub fn new(container: &SharedContainer) -> Self {
        Self {
            dir: container.group_dir().join(DEFAULTS_DIR),
        }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !key.starts_with('.');
        valid.then(|| self.dir.join(key))
    }
}

impl SharedStore for FileSharedStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read shared store entry");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.path_for(key).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid key: {}", key))
        })?;
        write_atomic(&path, value)
    }
}

/// Registry of tunnel profiles recorded by the providers
#[derive(Debug, Clone)]
pub struct TunnelRegistry {
    path: PathBuf,
    interfaces: NetInterfaces,
}

impl TunnelRegistry {
    pub fn new(container: &SharedContainer) -> Self {
        Self {
            path: container.group_dir().join(TUNNELS_FILE),
            interfaces: NetInterfaces::default(),
        }
    }

    /// Check interface liveness against a different sysfs tree
    pub fn with_interfaces(mut self, interfaces: NetInterfaces) -> Self {
        self.interfaces = interfaces;
        self
    }

    fn load(&self) -> Result<Vec<SystemProfile>, SystemError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| SystemError::ReadFailed {
            message: format!("{}: {}", self.path.display(), e),
        })
    }

    /// Insert or replace the profile for `profile.extension_id`
    pub fn record(&self, profile: SystemProfile) -> Result<(), SystemError> {
        let mut profiles = match self.load() {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable tunnel registry");
                Vec::new()
            }
        };
        debug!(
            extension = %profile.extension_id,
            status = ?profile.status,
            "Recording tunnel profile"
        );
        profiles.retain(|p| p.extension_id != profile.extension_id);
        profiles.push(profile);

        let bytes = serde_json::to_vec_pretty(&profiles).map_err(|e| SystemError::ReadFailed {
            message: e.to_string(),
        })?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

#[async_trait]
impl SystemVpnStore for TunnelRegistry {
    async fn profiles(&self, extension_id: &str) -> Result<Vec<SystemProfile>, SystemError> {
        let profiles = self
            .load()?
            .into_iter()
            .filter(|p| p.extension_id == extension_id)
            .map(|mut profile| {
                let vanished = profile.status.is_active()
                    && profile
                        .interface
                        .as_deref()
                        .is_some_and(|name| !self.interfaces.exists(name));
                if vanished {
                    debug!(
                        extension = %profile.extension_id,
                        "Recorded tunnel interface is gone, treating as disconnected"
                    );
                    profile.status = SystemStatus::Disconnected;
                    profile.connected_at = None;
                }
                profile
            })
            .collect();
        Ok(profiles)
    }
}
