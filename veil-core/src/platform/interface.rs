//! Network interface lookups via sysfs

use crate::vpn::stats::DataCount;
use std::path::{Path, PathBuf};

const SYSFS_NET: &str = "/sys/class/net";

/// Reads interface presence and byte counters from a sysfs tree
#[derive(Debug, Clone)]
pub struct NetInterfaces {
    root: PathBuf,
}

impl NetInterfaces {
    /// Use an alternative sysfs root (tests, containers)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_dir()
    }

    /// Transmit/receive byte counters, when the interface exposes them
    pub fn counters(&self, name: &str) -> Option<DataCount> {
        let stats = self.root.join(name).join("statistics");
        Some(DataCount {
            sent: read_counter(&stats.join("tx_bytes"))?,
            received: read_counter(&stats.join("rx_bytes"))?,
        })
    }
}

impl Default for NetInterfaces {
    fn default() -> Self {
        Self::with_root(SYSFS_NET)
    }
}

// Blocking read; sysfs counters are in-memory and sampled from a sync callback.
fn read_counter(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
