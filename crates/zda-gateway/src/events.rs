//! Externally-visible DA events and the egress queue sender

use crate::device::{Capability, Device};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the egress queue read by the host
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// Events delivered to the DA host via `read_event`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DeviceDiscoveryAllowed { device: Device, duration: Duration },
    DeviceDiscoveryDenied { device: Device },
    DeviceAdded { device: Device },
    DeviceRemoved { device: Device },
    EnumerationComplete { device: Device },
    CapabilityAdded { device: Device, capability: Capability },
    CapabilityRemoved { device: Device, capability: Capability },
    OnOffUpdate { device: Device, state: bool },
}

/// Non-blocking sender onto the bounded egress queue
///
/// Overflow drops the event with a warning: the host owns consumption,
/// and the provider handler must never block on it.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("could not send event, queue full: {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event queue closed, host gone");
            }
        }
    }
}
