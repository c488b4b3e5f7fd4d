//! Server directory access
//!
//! The directory lists available servers and resolves per-server connection
//! parameters for a protocol.

use crate::error::ApiError;
use crate::types::{Server, ServerConfiguration};
use async_trait::async_trait;

pub mod http;

pub use http::HttpDirectory;

/// Remote server directory
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// All servers currently offered
    async fn servers(&self) -> Result<Vec<Server>, ApiError>;

    /// Resolved connection parameters for a server and protocol wire identifier
    async fn configuration(
        &self,
        server_id: &str,
        protocol_id: &str,
    ) -> Result<ServerConfiguration, ApiError>;
}
