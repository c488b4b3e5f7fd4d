//! VPN connection management commands

use super::{output, Session};
use chrono::Utc;
use colored::Colorize;
use std::path::Path;
use tracing::{debug, info};
use veil_core::error::{VeilError, VpnError};
use veil_core::types::{Protocol, Server};
use veil_core::vpn::Supervisor;

/// Find a server by directory id
async fn find_server(supervisor: &Supervisor, server_id: &str) -> Result<Server, VeilError> {
    supervisor
        .list_servers()
        .await?
        .into_iter()
        .find(|server| server.id == server_id)
        .ok_or_else(|| VeilError::UnknownServer {
            id: server_id.to_string(),
        })
}

/// Requested protocol, or the first one the server advertises
fn pick_protocol(server: &Server, requested: Option<Protocol>) -> Result<Protocol, VeilError> {
    match requested {
        Some(protocol) if server.supports(protocol) => Ok(protocol),
        Some(protocol) => Err(VpnError::UnsupportedProtocol {
            id: format!("{} (not offered by {})", protocol.id(), server.id),
        }
        .into()),
        None => server
            .protocols
            .iter()
            .find_map(|id| Protocol::from_id(id).ok())
            .ok_or_else(|| {
                VpnError::UnsupportedProtocol {
                    id: server.protocols.join(","),
                }
                .into()
            }),
    }
}

/// Run the connect command
pub async fn run_connect(
    config: Option<&Path>,
    server_id: &str,
    protocol: Option<Protocol>,
) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    let server = find_server(&session.supervisor, server_id).await?;
    let protocol = pick_protocol(&server, protocol)?;

    info!(server = %server.id, %protocol, "Connecting");
    println!("Connecting to {} over {}...", server.name.bold(), protocol);
    session
        .supervisor
        .connect(server, protocol, session.provider_configuration())
        .await?;

    println!("{}", output::status_line(&session.supervisor.current_status()));
    Ok(())
}

/// Run the disconnect command
pub async fn run_disconnect(config: Option<&Path>) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    debug!(status = %session.supervisor.current_status(), "Disconnecting");

    match session.supervisor.disconnect().await {
        Ok(()) => {
            println!("{}", output::status_line(&session.supervisor.current_status()));
            Ok(())
        }
        Err(VpnError::ConfigurationNotFound) => {
            println!("{}", "No active VPN connection".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Run the reconnect command
pub async fn run_reconnect(
    config: Option<&Path>,
    server_id: Option<&str>,
    protocol: Option<Protocol>,
) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    let supervisor = &session.supervisor;

    // A pending or failed tunnel has no connection info yet; fall back to
    // the server named by its status.
    let status = supervisor.current_status();
    let current = supervisor
        .current_server()
        .or_else(|| status.current_server().cloned());
    let server = match (server_id, current) {
        (Some(id), _) => find_server(supervisor, id).await?,
        (None, Some(current)) => current,
        (None, None) => return Err(VpnError::ConfigurationNotFound.into()),
    };
    let protocol = match protocol
        .or_else(|| supervisor.current_protocol())
        .or_else(|| status.current_protocol())
    {
        Some(protocol) => protocol,
        None => pick_protocol(&server, None)?,
    };

    println!("Reconnecting to {} over {}...", server.name.bold(), protocol);
    supervisor
        .reconnect(server, protocol, session.provider_configuration())
        .await?;

    println!("{}", output::status_line(&supervisor.current_status()));
    Ok(())
}

/// Run the status command
pub async fn run_status(config: Option<&Path>, watch: bool) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    let supervisor = &session.supervisor;

    println!("{}", output::status_line(&supervisor.current_status()));
    if let Some(info) = supervisor.connection_info() {
        println!("  Server:   {} ({})", info.server.name, info.server.id);
        println!("  Protocol: {}", info.protocol);
    }
    if let Some(since) = supervisor.connected_since() {
        let uptime = (Utc::now() - since).to_std().unwrap_or_default();
        println!(
            "  Since:    {} ({})",
            since.format("%Y-%m-%d %H:%M:%S UTC"),
            output::format_duration(uptime)
        );
    }

    if !watch {
        return Ok(());
    }

    let mut statuses = supervisor.status_stream();
    let mut stats = supervisor.connection_stats_stream();
    // The subscription replays the status printed above.
    let _ = statuses.recv().await;

    loop {
        tokio::select! {
            Some(status) = statuses.recv() => {
                println!("{}", output::status_line(&status));
            }
            Some(sample) = stats.recv() => {
                println!("{}", output::stats_line(&sample, sample.uptime(Utc::now())));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Run the stats command
pub async fn run_stats(config: Option<&Path>, samples: usize) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    if !session.supervisor.is_connected() {
        println!("{}", output::status_line(&session.supervisor.current_status()));
        return Ok(());
    }

    let mut stats = session.supervisor.connection_stats_stream();
    for _ in 0..samples {
        tokio::select! {
            sample = stats.recv() => match sample {
                Some(sample) => println!("{}", output::stats_line(&sample, sample.uptime(Utc::now()))),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    stats.cancel();
    Ok(())
}
