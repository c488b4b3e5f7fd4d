//! Core library for the veil VPN client
//!
//! This crate provides the connection supervisor and its collaborators:
//! server directory access, protocol providers, and the shared state used to
//! recover a tunnel started by an earlier process.

pub mod error;
pub mod types;

pub mod config;
pub mod directory;
pub mod platform;
pub mod vpn;

use tracing_subscriber::filter::LevelFilter;

/// Initialize logging infrastructure
///
/// Logs to the systemd journal when running under systemd, otherwise to
/// stderr with pretty formatting.
pub fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(level)
                .try_init()?;
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
        .with(level)
        .try_init()?;

    Ok(())
}
