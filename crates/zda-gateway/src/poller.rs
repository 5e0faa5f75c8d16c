//! Periodic attribute poller
//!
//! A single scheduler loop invoking per-device probes whose period has
//! elapsed. Probes run serialized to bound outgoing network load; a
//! probe that overruns its period delays later runs rather than
//! coalescing them.

use crate::device::DeviceIdentifier;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) type ProbeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Probe = Arc<dyn Fn(CancellationToken) -> ProbeFuture + Send + Sync>;

struct PollerEntry {
    key: DeviceIdentifier,
    period: Duration,
    last_run: Instant,
    probe: Probe,
}

pub(crate) struct Poller {
    entries: Mutex<Vec<PollerEntry>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
        }
    }

    /// Register a probe for a device, replacing any existing one
    pub fn register<F>(&self, key: DeviceIdentifier, period: Duration, probe: F)
    where
        F: Fn(CancellationToken) -> ProbeFuture + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|entry| entry.key != key);
        entries.push(PollerEntry {
            key,
            period,
            last_run: Instant::now(),
            probe: Arc::new(probe),
        });
    }

    /// Drop the probe registered for a device
    pub fn deregister(&self, key: &DeviceIdentifier) {
        self.entries.lock().unwrap().retain(|entry| entry.key != *key);
    }

    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let poller = self.clone();
        let handle = tokio::spawn(async move {
            poller.run(cancel).await;
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Await loop termination after the token has been cancelled
    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            let due: Vec<(DeviceIdentifier, Probe)> = {
                let mut entries = self.entries.lock().unwrap();
                let now = Instant::now();
                entries
                    .iter_mut()
                    .filter(|entry| entry.last_run + entry.period <= now)
                    .map(|entry| {
                        entry.last_run = now;
                        (entry.key, entry.probe.clone())
                    })
                    .collect()
            };

            for (key, probe) in due {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::debug!("polling device {key}");
                probe(cancel.child_token()).await;
            }
        }
    }
}
