//! Multi-subscriber status fan-out
//!
//! Every subscriber receives the current status first, then every later
//! publication in commit order. Each subscriber owns a bounded queue; a
//! subscriber whose queue is full when a value is published is dropped
//! rather than allowed to stall the publisher.

use crate::vpn::state::Status;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug)]
struct Registry {
    next_id: u64,
    current: Status,
    subscribers: BTreeMap<u64, mpsc::Sender<Status>>,
}

/// Fan-out of status values to independently-lifetimed subscribers
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    registry: Arc<Mutex<Registry>>,
    buffer: usize,
}

impl StatusBroadcaster {
    /// Create a broadcaster seeded with `initial`
    ///
    /// `buffer` is clamped to at least 1 so the initial delivery always fits.
    pub fn new(initial: Status, buffer: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                current: initial,
                subscribers: BTreeMap::new(),
            })),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Register a new subscriber
    ///
    /// The current status is queued before the subscriber becomes visible to
    /// `publish`, so no publication can slip in between.
    pub fn subscribe(&self) -> StatusSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut registry = self.lock();

        let id = registry.next_id;
        registry.next_id += 1;

        // A fresh channel has room for at least one value.
        let _ = sender.try_send(registry.current.clone());
        registry.subscribers.insert(id, sender);
        debug!(subscriber = id, "Status subscriber registered");

        StatusSubscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `status` to every registered subscriber in registration order
    ///
    /// Returns once the value is queued for all live subscribers.
    pub fn publish(&self, status: Status) {
        let mut registry = self.lock();
        registry.current = status.clone();

        registry
            .subscribers
            .retain(|id, sender| match sender.try_send(status.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, "Status subscriber is not keeping up, disconnecting it");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "Status subscriber gone");
                    false
                }
            });
    }
}

/// A live status subscription
///
/// Dropping or cancelling the subscription unregisters it.
#[derive(Debug)]
pub struct StatusSubscription {
    id: u64,
    receiver: mpsc::Receiver<Status>,
    registry: Weak<Mutex<Registry>>,
}

impl StatusSubscription {
    /// Wait for the next status
    ///
    /// Returns `None` once the subscription is cancelled, the subscriber was
    /// dropped for backpressure, or the broadcaster is gone, after all
    /// already-queued values have been drained.
    pub async fn recv(&mut self) -> Option<Status> {
        self.receiver.recv().await
    }

    /// Take the next queued status without waiting
    pub fn try_recv(&mut self) -> Option<Status> {
        self.receiver.try_recv().ok()
    }

    /// Unregister and close the subscription; idempotent
    pub fn cancel(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if registry.subscribers.remove(&self.id).is_some() {
                debug!(subscriber = self.id, "Status subscriber unregistered");
            }
        }
        self.registry = Weak::new();
        self.receiver.close();
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
