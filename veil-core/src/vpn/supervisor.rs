//! Connection supervisor
//!
//! Owns the connection state machine. Every mutating operation is sent as a
//! command to a single worker task, so operations run one at a time in
//! submission order and the worker never holds a lock across provider or
//! directory I/O. Readers take a short read lock on the state snapshot.
//!
//! Dropping a caller's future does not abort an operation that was already
//! queued: the worker finishes it and the reply is discarded.

use crate::config::{ContainerConfig, SupervisorSettings};
use crate::directory::DirectoryClient;
use crate::error::VpnError;
use crate::platform::{LastServerRecord, SharedStore, SystemVpnStore};
use crate::types::{Configuration, ConnectionInfo, Protocol, Server};
use crate::vpn::broadcast::{StatusBroadcaster, StatusSubscription};
use crate::vpn::provider::{ProtocolProvider, ProviderFactory};
use crate::vpn::reconcile::{reconcile, ReconcileContext};
use crate::vpn::state::{ConnectionStatus, Status};
use crate::vpn::stats::{spawn_poller, ConnectionStats, StatsSubscription};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T, VpnError>>;

enum Command {
    Reconcile {
        reply: oneshot::Sender<()>,
    },
    ListServers {
        reply: Reply<Vec<Server>>,
    },
    Connect {
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Reconnect {
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
        reply: Reply<()>,
    },
}

/// Mutable supervisor state, written only by the worker
#[derive(Default)]
struct State {
    status: Status,
    provider: Option<Arc<dyn ProtocolProvider>>,
    info: Option<ConnectionInfo>,
    started_at: Option<DateTime<Utc>>,
}

impl State {
    fn detach(&mut self) -> Option<Arc<dyn ProtocolProvider>> {
        self.info = None;
        self.started_at = None;
        self.provider.take()
    }
}

struct Shared {
    state: RwLock<State>,
    broadcaster: StatusBroadcaster,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` and publish the resulting status
    ///
    /// Publication happens under the write lock so subscribers observe
    /// statuses in commit order and readers never see a status that has not
    /// been broadcast.
    fn commit<R>(&self, change: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = change(&mut state);
        debug!(status = %state.status, "Status committed");
        self.broadcaster.publish(state.status.clone());
        result
    }

    /// Apply `change` without publishing
    fn update<R>(&self, change: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut state)
    }

    fn sample(&self) -> Option<ConnectionStats> {
        let (provider, started_at) = {
            let state = self.read();
            match (&state.provider, state.started_at, &state.status) {
                (
                    Some(provider),
                    Some(started_at),
                    Status::Connection(ConnectionStatus::Connected { .. }),
                ) => (provider.clone(), started_at),
                _ => return None,
            }
        };
        Some(ConnectionStats::new(provider.data_count(), started_at))
    }
}

/// Builder for [`Supervisor`]
pub struct SupervisorBuilder {
    directory: Arc<dyn DirectoryClient>,
    factory: Arc<dyn ProviderFactory>,
    system: Option<Arc<dyn SystemVpnStore>>,
    store: Option<Arc<dyn SharedStore>>,
    container: ContainerConfig,
    settings: SupervisorSettings,
}

impl SupervisorBuilder {
    pub fn new(directory: Arc<dyn DirectoryClient>, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            directory,
            factory,
            system: None,
            store: None,
            container: ContainerConfig::default(),
            settings: SupervisorSettings::default(),
        }
    }

    /// OS status source consulted once at startup
    ///
    /// Without one, reconciliation is skipped and the supervisor starts `Idle`.
    pub fn system(mut self, system: Arc<dyn SystemVpnStore>) -> Self {
        self.system = Some(system);
        self
    }

    /// Shared key/value store holding the last-connected-server record
    pub fn shared_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// App group and provider-extension identity
    pub fn container(mut self, container: ContainerConfig) -> Self {
        self.container = container;
        self
    }

    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Spawn the worker and wait for startup reconciliation
    ///
    /// Must be called from within a tokio runtime. The returned supervisor
    /// already reports the reconciled status.
    pub async fn start(self) -> Supervisor {
        let shared = Arc::new(Shared {
            state: RwLock::new(State::default()),
            broadcaster: StatusBroadcaster::new(Status::Idle, self.settings.subscriber_buffer),
        });
        let (commands, receiver) = mpsc::unbounded_channel();

        let stats_interval = self.settings.stats_interval();
        let worker = Worker {
            shared: shared.clone(),
            directory: self.directory,
            factory: self.factory,
            system: self.system,
            store: self.store,
            container: self.container,
            settings: self.settings,
        };
        tokio::spawn(worker.run(receiver));

        let supervisor = Supervisor {
            commands,
            shared,
            stats_interval,
        };

        let (reply, done) = oneshot::channel();
        if supervisor.commands.send(Command::Reconcile { reply }).is_ok() {
            let _ = done.await;
        }
        supervisor
    }
}

/// Handle to the connection supervisor
///
/// Cheap to clone; all clones drive the same worker. The worker exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    stats_interval: Duration,
}

impl Supervisor {
    pub fn builder(
        directory: Arc<dyn DirectoryClient>,
        factory: Arc<dyn ProviderFactory>,
    ) -> SupervisorBuilder {
        SupervisorBuilder::new(directory, factory)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, VpnError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| VpnError::SupervisorStopped)?;
        response.await.map_err(|_| VpnError::SupervisorStopped)?
    }

    /// Fetch the server list from the directory
    pub async fn list_servers(&self) -> Result<Vec<Server>, VpnError> {
        self.request(|reply| Command::ListServers { reply }).await
    }

    /// Establish a tunnel to `server` over `protocol`
    pub async fn connect(
        &self,
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
    ) -> Result<(), VpnError> {
        self.request(|reply| Command::Connect {
            server,
            protocol,
            configuration,
            reply,
        })
        .await
    }

    /// Tear down the attached tunnel
    ///
    /// Always ends `Disconnected` once a provider was attached; a provider
    /// failure is still returned as `DisconnectionFailed`.
    pub async fn disconnect(&self) -> Result<(), VpnError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Replace the current tunnel with one to `server` over `protocol`
    pub async fn reconnect(
        &self,
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
    ) -> Result<(), VpnError> {
        self.request(|reply| Command::Reconnect {
            server,
            protocol,
            configuration,
            reply,
        })
        .await
    }

    /// Subscribe to status updates, starting with the current status
    pub fn status_stream(&self) -> StatusSubscription {
        self.shared.broadcaster.subscribe()
    }

    /// Sample traffic counters every stats interval while connected
    ///
    /// Must be called from within a tokio runtime.
    pub fn connection_stats_stream(&self) -> StatsSubscription {
        let shared = self.shared.clone();
        spawn_poller(self.stats_interval, move || shared.sample())
    }

    pub fn current_status(&self) -> Status {
        self.shared.read().status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read().status.is_connected()
    }

    /// Server of the established tunnel
    pub fn current_server(&self) -> Option<Server> {
        self.shared.read().info.as_ref().map(|info| info.server.clone())
    }

    /// Protocol of the established tunnel
    pub fn current_protocol(&self) -> Option<Protocol> {
        self.shared.read().info.as_ref().map(|info| info.protocol)
    }

    /// Server and protocol of the established tunnel, if any
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared.read().info.clone()
    }

    /// When the current tunnel entered `Connected`
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.shared.read().started_at
    }
}

struct Worker {
    shared: Arc<Shared>,
    directory: Arc<dyn DirectoryClient>,
    factory: Arc<dyn ProviderFactory>,
    system: Option<Arc<dyn SystemVpnStore>>,
    store: Option<Arc<dyn SharedStore>>,
    container: ContainerConfig,
    settings: SupervisorSettings,
}

impl Worker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Supervisor worker started");
        while let Some(command) = commands.recv().await {
            match command {
                Command::Reconcile { reply } => {
                    self.reconcile().await;
                    let _ = reply.send(());
                }
                Command::ListServers { reply } => {
                    let _ = reply.send(self.list_servers().await);
                }
                Command::Connect {
                    server,
                    protocol,
                    configuration,
                    reply,
                } => {
                    let _ = reply.send(self.connect(server, protocol, configuration).await);
                }
                Command::Disconnect { reply } => {
                    let _ = reply.send(self.disconnect().await);
                }
                Command::Reconnect {
                    server,
                    protocol,
                    configuration,
                    reply,
                } => {
                    let _ = reply.send(self.reconnect(server, protocol, configuration).await);
                }
            }
        }
        debug!("Supervisor worker stopped");
    }

    async fn reconcile(&self) {
        let Some(system) = &self.system else {
            debug!("No system status source configured, skipping reconciliation");
            return;
        };

        let context = ReconcileContext {
            extension_id: &self.container.extension_id,
            app_group: &self.container.app_group,
            last_server_key: &self.settings.last_server_key,
        };
        let outcome = reconcile(
            system.as_ref(),
            self.store.as_deref(),
            self.factory.as_ref(),
            &context,
        )
        .await;

        self.shared.commit(|state| {
            state.status = outcome.status;
            state.provider = outcome.provider;
            state.info = outcome.info;
            state.started_at = outcome.started_at;
        });
    }

    #[tracing::instrument(skip(self))]
    async fn list_servers(&self) -> Result<Vec<Server>, VpnError> {
        let previous = {
            let state = self.shared.read();
            state.provider.is_none().then(|| state.status.clone())
        };

        // A tunnel is attached: leave its status visible while loading.
        let Some(previous) = previous else {
            return Ok(self.directory.servers().await?);
        };

        self.shared.commit(|state| state.status = Status::LoadingServers);
        match self.directory.servers().await {
            Ok(servers) => {
                info!(count = servers.len(), "Loaded servers");
                self.shared.commit(|state| {
                    state.status = match previous {
                        Status::Connection(connection) => Status::Connection(connection),
                        _ => Status::Idle,
                    }
                });
                Ok(servers)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load servers");
                self.shared.commit(|state| state.status = Status::Idle);
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(skip(self, server, configuration), fields(server = %server.id))]
    async fn connect(
        &self,
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
    ) -> Result<(), VpnError> {
        info!(name = %server.name, "Connecting");
        let previous = self.shared.commit(|state| {
            state.status = Status::Connection(ConnectionStatus::Connecting {
                server: server.clone(),
                protocol,
            });
            state.detach()
        });
        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        let outcome = self.establish(&server, protocol, &configuration).await;
        self.settle(outcome, server, protocol)
    }

    #[tracing::instrument(skip(self, server, configuration), fields(server = %server.id))]
    async fn reconnect(
        &self,
        server: Server,
        protocol: Protocol,
        configuration: Configuration,
    ) -> Result<(), VpnError> {
        info!(name = %server.name, "Reconnecting");
        let previous = self.shared.commit(|state| {
            state.status = Status::Connection(ConnectionStatus::Reconnecting {
                server: server.clone(),
                protocol,
            });
            state.detach()
        });
        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        let outcome = self.establish(&server, protocol, &configuration).await;
        self.settle(outcome, server, protocol)
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self) -> Result<(), VpnError> {
        let provider = self.shared.read().provider.clone();
        let Some(provider) = provider else {
            warn!("Disconnect requested with no tunnel attached");
            return Err(VpnError::ConfigurationNotFound);
        };

        info!(protocol = %provider.protocol(), "Disconnecting");
        self.shared.commit(|state| {
            state.status = Status::Connection(ConnectionStatus::Disconnecting);
            state.info = None;
            state.started_at = None;
        });

        let result = provider.disconnect().await;

        self.shared.commit(|state| {
            state.detach();
            state.status = Status::Connection(ConnectionStatus::Disconnected);
        });

        match result {
            Ok(()) => {
                info!("Disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Provider failed to disconnect cleanly");
                Err(VpnError::DisconnectionFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Best-effort teardown of a provider being replaced
    async fn retire(&self, provider: Arc<dyn ProtocolProvider>) {
        debug!(protocol = %provider.protocol(), "Tearing down previous tunnel");
        if let Err(e) = provider.disconnect().await {
            warn!(error = %e, "Ignoring failure while tearing down previous tunnel");
        }
    }

    /// Resolve, build, load and connect
    ///
    /// The provider is attached as soon as it is built so a tunnel that is
    /// still coming up can be reported and torn down.
    async fn establish(
        &self,
        server: &Server,
        protocol: Protocol,
        configuration: &Configuration,
    ) -> Result<(), VpnError> {
        let resolved = self
            .directory
            .configuration(&server.id, protocol.id())
            .await?;

        let provider = self.factory.create(protocol, configuration)?;
        self.shared
            .update(|state| state.provider = Some(provider.clone()));

        provider
            .load_configuration()
            .await
            .map_err(|e| VpnError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        provider
            .connect(&resolved)
            .await
            .map_err(|e| VpnError::ConnectionFailed {
                reason: e.to_string(),
            })
    }

    fn settle(
        &self,
        outcome: Result<(), VpnError>,
        server: Server,
        protocol: Protocol,
    ) -> Result<(), VpnError> {
        match outcome {
            Ok(()) => {
                self.remember(&server, protocol);
                self.shared.commit(|state| {
                    state.info = Some(ConnectionInfo {
                        server: server.clone(),
                        protocol,
                    });
                    state.started_at = Some(Utc::now());
                    state.status =
                        Status::Connection(ConnectionStatus::Connected { server, protocol });
                });
                info!("Connected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                self.shared.commit(|state| {
                    state.detach();
                    state.status = Status::Connection(ConnectionStatus::Failed {
                        error: e.reason(),
                        last_server: Some(server),
                    });
                });
                Err(e)
            }
        }
    }

    /// Persist the last-connected-server record for later reconciliation
    fn remember(&self, server: &Server, protocol: Protocol) {
        let Some(store) = &self.store else {
            return;
        };
        let record = LastServerRecord::new(server, protocol);
        if let Err(e) = store.set(&self.settings.last_server_key, &record.encode()) {
            warn!(error = %e, "Failed to persist last connected server");
        }
    }
}
