//! Shared test doubles for the supervisor integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use veil_core::directory::DirectoryClient;
use veil_core::error::{ApiError, ProviderError, SystemError, VpnError};
use veil_core::platform::{SharedStore, SystemProfile, SystemVpnStore};
use veil_core::types::{Configuration, Protocol, Server, ServerConfiguration};
use veil_core::vpn::{DataCount, ProtocolProvider, ProviderFactory, Status, StatusSubscription};

pub fn server(id: &str) -> Server {
    Server {
        id: id.to_string(),
        name: format!("Server {}", id),
        country: "DE".to_string(),
        city: Some("Frankfurt".to_string()),
        quality: Some(80),
        protocols: Protocol::ALL.iter().map(|p| p.id().to_string()).collect(),
    }
}

pub fn resolved(server_id: &str, protocol: Protocol) -> ServerConfiguration {
    ServerConfiguration {
        server_id: server_id.to_string(),
        protocol: protocol.id().to_string(),
        endpoint: Some("vpn.example.com".to_string()),
        profile: "profile".to_string(),
        username: None,
        password: None,
    }
}

/// Drain everything already delivered to a subscription
pub fn drain(subscription: &mut StatusSubscription) -> Vec<Status> {
    let mut seen = Vec::new();
    while let Some(status) = subscription.try_recv() {
        seen.push(status);
    }
    seen
}

/// In-memory directory with call counters
pub struct MockDirectory {
    servers: Mutex<Result<Vec<Server>, ApiError>>,
    configuration_error: Mutex<Option<ApiError>>,
    delay: Duration,
    pub server_calls: AtomicUsize,
    pub configuration_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new(servers: Vec<Server>) -> Self {
        Self {
            servers: Mutex::new(Ok(servers)),
            configuration_error: Mutex::new(None),
            delay: Duration::ZERO,
            server_calls: AtomicUsize::new(0),
            configuration_calls: AtomicUsize::new(0),
        }
    }

    /// Make every call wait before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_servers(&self, error: ApiError) {
        *self.servers.lock().unwrap() = Err(error);
    }

    pub fn fail_configuration(&self, error: ApiError) {
        *self.configuration_error.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.server_calls.load(Ordering::SeqCst) + self.configuration_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn servers(&self) -> Result<Vec<Server>, ApiError> {
        self.server_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.servers.lock().unwrap().clone()
    }

    async fn configuration(
        &self,
        server_id: &str,
        protocol_id: &str,
    ) -> Result<ServerConfiguration, ApiError> {
        self.configuration_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.configuration_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(resolved(server_id, Protocol::from_id(protocol_id).unwrap()))
    }
}

/// How the next provider built by [`MockFactory`] behaves
#[derive(Debug, Clone, Default)]
pub struct ProviderBehavior {
    pub load_error: Option<String>,
    pub connect_error: Option<String>,
    pub disconnect_error: Option<String>,
    pub counts: Option<DataCount>,
}

pub struct MockProvider {
    protocol: Protocol,
    behavior: ProviderBehavior,
    pub loads: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockProvider {
    pub fn new(protocol: Protocol, behavior: ProviderBehavior) -> Self {
        Self {
            protocol,
            behavior,
            loads: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

fn outcome(error: &Option<String>) -> Result<(), ProviderError> {
    match error {
        Some(message) => Err(ProviderError::Failed(message.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl ProtocolProvider for MockProvider {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn load_configuration(&self) -> Result<(), ProviderError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        outcome(&self.behavior.load_error)
    }

    async fn connect(&self, _configuration: &ServerConfiguration) -> Result<(), ProviderError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        outcome(&self.behavior.connect_error)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        outcome(&self.behavior.disconnect_error)
    }

    fn data_count(&self) -> Option<DataCount> {
        self.behavior.counts
    }
}

/// Factory handing out [`MockProvider`]s and remembering each one
#[derive(Default)]
pub struct MockFactory {
    behavior: Mutex<ProviderBehavior>,
    reject: Mutex<bool>,
    created: Mutex<Vec<Arc<MockProvider>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: ProviderBehavior) -> Self {
        let factory = Self::default();
        factory.set_behavior(behavior);
        factory
    }

    /// Behavior of providers created from now on
    pub fn set_behavior(&self, behavior: ProviderBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Make every `create` fail with `ConfigurationNotFound`
    pub fn reject_all(&self) {
        *self.reject.lock().unwrap() = true;
    }

    pub fn created(&self) -> Vec<Arc<MockProvider>> {
        self.created.lock().unwrap().clone()
    }
}

impl ProviderFactory for MockFactory {
    fn create(
        &self,
        protocol: Protocol,
        _configuration: &Configuration,
    ) -> Result<Arc<dyn ProtocolProvider>, VpnError> {
        if *self.reject.lock().unwrap() {
            return Err(VpnError::ConfigurationNotFound);
        }
        let provider = Arc::new(MockProvider::new(
            protocol,
            self.behavior.lock().unwrap().clone(),
        ));
        self.created.lock().unwrap().push(provider.clone());
        Ok(provider)
    }
}

/// OS status source returning a fixed answer
pub struct MockSystem {
    result: Result<Vec<SystemProfile>, SystemError>,
    pub calls: AtomicUsize,
}

impl MockSystem {
    pub fn with_profile(profile: SystemProfile) -> Self {
        Self {
            result: Ok(vec![profile]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            result: Ok(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: SystemError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SystemVpnStore for MockSystem {
    async fn profiles(&self, extension_id: &str) -> Result<Vec<SystemProfile>, SystemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(|profiles| {
            profiles
                .into_iter()
                .filter(|p| p.extension_id == extension_id)
                .collect()
        })
    }
}

/// Shared key/value store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &[u8]) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        self.insert(key, value);
        Ok(())
    }
}
