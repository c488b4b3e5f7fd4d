//! veil - VPN connection supervisor CLI
//!
//! Lists servers from the configured directory and drives a single tunnel
//! over OpenVPN, IKEv2 or WireGuard.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use veil_core::error::{VeilError, VpnError};
use veil_core::init_logging;
use veil_core::types::Protocol;

mod cli;

#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "Supervise a VPN tunnel over OpenVPN, IKEv2 or WireGuard")]
struct Cli {
    /// Configuration file (defaults to ~/.config/veil/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List servers offered by the directory
    Servers,
    /// Connect to a server
    Connect {
        /// Directory identifier of the server
        server_id: String,
        /// Protocol wire identifier (OPENVPN, IKEV2, WIREGUARD)
        #[arg(short, long)]
        protocol: Option<Protocol>,
    },
    /// Disconnect the active tunnel
    Disconnect,
    /// Replace the active tunnel, by default with one to the same server
    Reconnect {
        /// Directory identifier of the server
        server_id: Option<String>,
        /// Protocol wire identifier (OPENVPN, IKEV2, WIREGUARD)
        #[arg(short, long)]
        protocol: Option<Protocol>,
    },
    /// Show connection status
    Status {
        /// Keep printing status changes and traffic until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Print traffic statistics samples
    Stats {
        /// Number of samples to print
        #[arg(short = 'n', long, default_value_t = 5)]
        samples: usize,
    },
}

fn exit_code(error: &VeilError) -> i32 {
    match error {
        // Configuration errors (exit code 2)
        VeilError::Config(_) | VeilError::Toml(_) | VeilError::TomlSerialize(_) => 2,
        VeilError::Vpn(VpnError::ConfigurationNotFound)
        | VeilError::Vpn(VpnError::UnsupportedProtocol { .. }) => 2,
        VeilError::Vpn(VpnError::Api(veil_core::error::ApiError::InvalidUrl { .. })) => 2,
        // Runtime errors (exit code 1)
        VeilError::Vpn(_) | VeilError::System(_) | VeilError::UnknownServer { .. } => 1,
        VeilError::Io(_) => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::level_filters::LevelFilter::DEBUG
    } else {
        tracing::level_filters::LevelFilter::WARN
    };
    if let Err(e) = init_logging(level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Servers => cli::servers::run_servers(config).await,
        Commands::Connect {
            server_id,
            protocol,
        } => cli::vpn::run_connect(config, &server_id, protocol).await,
        Commands::Disconnect => cli::vpn::run_disconnect(config).await,
        Commands::Reconnect {
            server_id,
            protocol,
        } => cli::vpn::run_reconnect(config, server_id.as_deref(), protocol).await,
        Commands::Status { watch } => cli::vpn::run_status(config, watch).await,
        Commands::Stats { samples } => cli::vpn::run_stats(config, samples).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", colored::Colorize::red("error:"), e);
            std::process::exit(exit_code(&e));
        }
    }
}
