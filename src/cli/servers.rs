//! Server listing command

use super::{output, Session};
use std::path::Path;
use veil_core::error::VeilError;

/// Run the servers command
pub async fn run_servers(config: Option<&Path>) -> Result<(), VeilError> {
    let session = Session::open(config).await?;
    let mut servers = session.supervisor.list_servers().await?;

    // Best first, unrated last
    servers.sort_by(|a, b| b.quality.cmp(&a.quality).then_with(|| a.name.cmp(&b.name)));

    if servers.is_empty() {
        println!("No servers available");
        return Ok(());
    }

    let current = session.supervisor.current_server();
    for server in &servers {
        let active = current.as_ref().is_some_and(|c| c.id == server.id);
        println!("{}", output::server_line(server, active));
    }
    Ok(())
}
