//! VPN connection module
//!
//! Connection state machine, status fan-out, statistics sampling, startup
//! reconciliation and the protocol providers driven by the supervisor.

pub mod broadcast;
pub mod provider;
pub mod reconcile;
pub mod state;
pub mod stats;
pub mod supervisor;

// Public re-exports
pub use broadcast::{StatusBroadcaster, StatusSubscription};
pub use provider::{ProtocolProvider, ProviderFactory, StandardProviderFactory};
pub use state::{ConnectionStatus, Status};
pub use stats::{ConnectionStats, DataCount, StatsSubscription};
pub use supervisor::{Supervisor, SupervisorBuilder};
