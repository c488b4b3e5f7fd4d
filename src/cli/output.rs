//! Terminal rendering helpers

use colored::{ColoredString, Colorize};
use std::time::Duration;
use veil_core::types::Server;
use veil_core::vpn::{ConnectionStats, ConnectionStatus, Status};

/// Status title colored by lifecycle phase
pub fn status_line(status: &Status) -> ColoredString {
    let title = status.title();
    match status {
        Status::Connection(ConnectionStatus::Connected { .. }) => title.green().bold(),
        Status::Connection(ConnectionStatus::Failed { .. }) => title.red().bold(),
        Status::Connection(ConnectionStatus::Connecting { .. })
        | Status::Connection(ConnectionStatus::Reconnecting { .. })
        | Status::Connection(ConnectionStatus::Disconnecting)
        | Status::LoadingServers => title.yellow(),
        Status::Connection(ConnectionStatus::Disconnected) | Status::Idle => title.dimmed(),
    }
}

/// One row of the server listing
pub fn server_line(server: &Server, active: bool) -> String {
    let marker = if active { "*".green().bold() } else { " ".normal() };
    let location = match &server.city {
        Some(city) => format!("{}, {}", city, server.country),
        None => server.country.clone(),
    };
    let quality = server
        .quality
        .map(|q| q.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {:<16} {:<24} {:<20} {:>3}  {}",
        marker,
        server.id.bold(),
        server.name,
        location,
        quality,
        server.protocols.join(",").dimmed()
    )
}

/// One traffic sample
pub fn stats_line(stats: &ConnectionStats, uptime: Duration) -> String {
    format!(
        "{} {}  {} {}  {} {}",
        "up".cyan(),
        format_duration(uptime),
        "sent".cyan(),
        format_bytes(stats.bytes_sent),
        "received".cyan(),
        format_bytes(stats.bytes_received)
    )
}

/// Human-readable byte count using binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `HH:MM:SS`, with a day prefix past 24 hours
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let clock = format!("{:02}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}
