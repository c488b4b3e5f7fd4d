//! Traffic statistics sampling
//!
//! A poller samples the active provider's byte counters on a fixed period
//! while the tunnel is connected and streams the samples to one subscriber.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default sampling period
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest sampling period; zero is clamped up to this
pub const MIN_STATS_INTERVAL: Duration = Duration::from_millis(1);

const SAMPLE_BUFFER: usize = 16;

/// Byte counters reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataCount {
    pub sent: u64,
    pub received: u64,
}

/// One traffic sample for the connected tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionStats {
    /// Build a sample; missing counters read as zero
    pub fn new(count: Option<DataCount>, connected_at: DateTime<Utc>) -> Self {
        let count = count.unwrap_or_default();
        Self {
            bytes_sent: count.sent,
            bytes_received: count.received,
            connected_at,
        }
    }

    /// Time elapsed since the tunnel came up
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.connected_at).to_std().unwrap_or_default()
    }
}

/// A live statistics subscription
///
/// Dropping it stops the sampling task at its next wake-up.
#[derive(Debug)]
pub struct StatsSubscription {
    receiver: mpsc::Receiver<ConnectionStats>,
}

impl StatsSubscription {
    /// Wait for the next sample
    pub async fn recv(&mut self) -> Option<ConnectionStats> {
        self.receiver.recv().await
    }

    /// Stop sampling; idempotent
    pub fn cancel(&mut self) {
        self.receiver.close();
    }
}

/// Spawn a sampling loop
///
/// `sample` is called once per tick and returns `None` whenever there is
/// nothing to report (not connected); such ticks emit nothing.
pub fn spawn_poller<F>(period: Duration, sample: F) -> StatsSubscription
where
    F: Fn() -> Option<ConnectionStats> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(SAMPLE_BUFFER);
    let period = period.max(MIN_STATS_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sender.closed() => break,
                _ = ticker.tick() => {
                    let Some(stats) = sample() else {
                        trace!("Not connected, skipping stats sample");
                        continue;
                    };
                    match sender.try_send(stats) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Stats subscriber is behind, dropping sample");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
        debug!("Stats poller stopped");
    });

    StatsSubscription { receiver }
}
