//! Startup reconciliation with OS-level tunnel state
//!
//! A tunnel may have been brought up by an earlier process. At startup the
//! supervisor derives its initial state from the OS profile status and the
//! persisted last-server record, without touching the network or the tunnel.

use crate::platform::{LastServerRecord, SharedStore, SystemStatus, SystemVpnStore};
use crate::types::{Configuration, ConnectionInfo, Protocol};
use crate::vpn::provider::{ProtocolProvider, ProviderFactory};
use crate::vpn::state::{ConnectionStatus, Status};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity used to find the tunnel profile and its persisted record
#[derive(Debug, Clone)]
pub struct ReconcileContext<'a> {
    pub extension_id: &'a str,
    pub app_group: &'a str,
    pub last_server_key: &'a str,
}

/// State recovered at startup
pub struct Reconciliation {
    pub status: Status,
    pub provider: Option<Arc<dyn ProtocolProvider>>,
    pub info: Option<ConnectionInfo>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Reconciliation {
    fn status_only(status: Status) -> Self {
        Self {
            status,
            provider: None,
            info: None,
            started_at: None,
        }
    }

    fn disconnected() -> Self {
        Self::status_only(Status::Connection(ConnectionStatus::Disconnected))
    }
}

impl std::fmt::Debug for Reconciliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciliation")
            .field("status", &self.status)
            .field("provider", &self.provider.as_ref().map(|p| p.protocol()))
            .field("info", &self.info)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Derive the initial supervisor state
///
/// Never fails: an unreadable OS store yields `Idle`, a missing profile or
/// record yields `Disconnected`.
#[tracing::instrument(skip_all, fields(extension = context.extension_id))]
pub async fn reconcile(
    system: &dyn SystemVpnStore,
    store: Option<&dyn SharedStore>,
    factory: &dyn ProviderFactory,
    context: &ReconcileContext<'_>,
) -> Reconciliation {
    let profiles = match system.profiles(context.extension_id).await {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!(error = %e, "Could not read system VPN configuration, starting idle");
            return Reconciliation::status_only(Status::Idle);
        }
    };

    let Some(profile) = profiles.into_iter().next() else {
        debug!("No tunnel profile installed");
        return Reconciliation::disconnected();
    };

    let record = store.and_then(|store| LastServerRecord::load(store, context.last_server_key));
    debug!(status = ?profile.status, has_record = record.is_some(), "Reconciling tunnel profile");

    let outcome = match (profile.status, record) {
        (SystemStatus::Connected, Some((server, protocol))) => {
            match reattach(factory, context, protocol) {
                Some(provider) => Reconciliation {
                    status: Status::Connection(ConnectionStatus::Connected {
                        server: server.clone(),
                        protocol,
                    }),
                    provider: Some(provider),
                    info: Some(ConnectionInfo { server, protocol }),
                    started_at: Some(profile.connected_at.unwrap_or_else(Utc::now)),
                },
                None => Reconciliation::disconnected(),
            }
        }
        (SystemStatus::Connecting, Some((server, protocol))) => pending(
            reattach(factory, context, protocol),
            ConnectionStatus::Connecting { server, protocol },
        ),
        (SystemStatus::Reasserting, Some((server, protocol))) => pending(
            reattach(factory, context, protocol),
            ConnectionStatus::Reconnecting { server, protocol },
        ),
        (SystemStatus::Disconnecting, _) => {
            Reconciliation::status_only(Status::Connection(ConnectionStatus::Disconnecting))
        }
        _ => Reconciliation::disconnected(),
    };

    info!(status = %outcome.status, "Recovered tunnel state");
    outcome
}

/// Provider for a tunnel that is already (or becoming) up
fn reattach(
    factory: &dyn ProviderFactory,
    context: &ReconcileContext<'_>,
    protocol: Protocol,
) -> Option<Arc<dyn ProtocolProvider>> {
    let configuration = Configuration::new(
        Some(context.app_group.to_string()),
        Some(context.extension_id.to_string()),
    );
    factory
        .create(protocol, &configuration)
        .map_err(|e| warn!(%protocol, error = %e, "Cannot reattach provider for running tunnel"))
        .ok()
}

/// A tunnel still coming up: provider attached, no connection info yet
fn pending(provider: Option<Arc<dyn ProtocolProvider>>, status: ConnectionStatus) -> Reconciliation {
    match provider {
        Some(provider) => Reconciliation {
            status: Status::Connection(status),
            provider: Some(provider),
            info: None,
            started_at: None,
        },
        None => Reconciliation::disconnected(),
    }
}
