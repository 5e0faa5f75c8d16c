//! Device enumeration capability
//!
//! Walks a joined node's descriptors: node description, active
//! endpoints, then one simple descriptor per endpoint. Endpoint
//! groupings that share a device id become separate logical devices.

use crate::bus::{Callbacks, InternalEvent};
use crate::device::Device;
use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::node::{Node, NodeDevice};
use crate::provider::{EndpointDescription, Provider};
use crate::retry::{retry, DEFAULT_NETWORK_RETRIES, DEFAULT_NETWORK_TIMEOUT};
use crate::store::NodeStore;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

pub struct EnumerateDevice {
    provider: Arc<dyn Provider>,
    store: Arc<NodeStore>,
    events: EventSender,
    callbacks: Weak<Callbacks>,
    cancel: CancellationToken,
}

impl EnumerateDevice {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        store: Arc<NodeStore>,
        events: EventSender,
        callbacks: Weak<Callbacks>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            store,
            events,
            callbacks,
            cancel,
        }
    }

    /// Kick off enumeration of a freshly joined node in the background
    pub(crate) fn start_enumeration(self: &Arc<Self>, node: Arc<Node>) {
        let enumerate = self.clone();
        let ctx = self.cancel.child_token();
        tokio::spawn(async move {
            match enumerate.enumerate_node(&ctx, node.clone()).await {
                Ok(()) => {}
                Err(GatewayError::ContextExpired) => {
                    tracing::debug!("enumeration of {} cancelled", node.ieee_address);
                }
                Err(err) => {
                    tracing::warn!("enumeration of {} failed: {err}", node.ieee_address);
                }
            }
        });
    }

    /// Re-enumerate the node owning `device` on request
    pub async fn enumerate(
        &self,
        ctx: &CancellationToken,
        device: &Device,
    ) -> Result<(), GatewayError> {
        if self.store.get_device(&device.identifier).is_none() {
            return Err(GatewayError::DeviceNotOnGateway);
        }
        let node = self
            .store
            .get_node(&device.identifier.ieee_address)
            .ok_or(GatewayError::DeviceNotOnGateway)?;
        self.enumerate_node(ctx, node).await
    }

    async fn enumerate_node(
        &self,
        ctx: &CancellationToken,
        node: Arc<Node>,
    ) -> Result<(), GatewayError> {
        let ieee = node.ieee_address;

        let description = retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
            let provider = self.provider.clone();
            async move {
                provider
                    .query_node_description(&attempt, ieee)
                    .await
                    .map_err(GatewayError::from)
            }
        })
        .await?;
        tracing::debug!(
            "node {ieee}: type {:?}, manufacturer {:#06x}",
            description.logical_type,
            description.manufacturer_code
        );

        let endpoints = retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
            let provider = self.provider.clone();
            async move {
                provider
                    .query_node_endpoints(&attempt, ieee)
                    .await
                    .map_err(GatewayError::from)
            }
        })
        .await?;

        let mut descriptions = HashMap::new();
        for endpoint in endpoints {
            let description =
                retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
                    let provider = self.provider.clone();
                    async move {
                        provider
                            .query_node_endpoint_description(&attempt, ieee, endpoint)
                            .await
                            .map_err(GatewayError::from)
                    }
                })
                .await?;
            descriptions.insert(endpoint, description);
        }

        tracing::info!("node {ieee}: enumerated {} endpoints", descriptions.len());
        node.replace_endpoint_descriptions(descriptions.clone());

        let (added, removed) = self.regroup_devices(&node, &descriptions);

        if let Some(callbacks) = self.callbacks.upgrade() {
            for device in &added {
                callbacks
                    .call(ctx, InternalEvent::DeviceAdded {
                        device: device.clone(),
                    })
                    .await?;
            }
            for device in &removed {
                callbacks
                    .call(ctx, InternalEvent::DeviceRemoved {
                        device: device.clone(),
                    })
                    .await?;
            }

            callbacks
                .call(ctx, InternalEvent::NodeEnumeration { node: node.clone() })
                .await?;
        }

        for device in node.devices() {
            self.events.send(Event::EnumerationComplete {
                device: device.snapshot(),
            });
        }

        Ok(())
    }

    /// Assign endpoints to devices: one device per distinct device id,
    /// in endpoint order. Existing devices are reused positionally; the
    /// remainder is created or removed to match.
    fn regroup_devices(
        &self,
        node: &Arc<Node>,
        descriptions: &HashMap<u8, EndpointDescription>,
    ) -> (Vec<Arc<NodeDevice>>, Vec<Arc<NodeDevice>>) {
        let mut ordered: Vec<&EndpointDescription> = descriptions.values().collect();
        ordered.sort_by_key(|description| description.endpoint);

        let mut groups: Vec<(u16, Vec<u8>)> = Vec::new();
        for description in ordered {
            match groups
                .iter_mut()
                .find(|(device_id, _)| *device_id == description.device_id)
            {
                Some((_, endpoints)) => endpoints.push(description.endpoint),
                None => groups.push((description.device_id, vec![description.endpoint])),
            }
        }

        if groups.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let existing = node.devices();
        let mut added = Vec::new();

        for (index, (_, endpoints)) in groups.iter().enumerate() {
            match existing.get(index) {
                Some(device) => device.set_endpoints(endpoints.clone()),
                None => {
                    let identifier = node.next_device_identifier();
                    let device = self.store.add_device(identifier, node);
                    device.set_endpoints(endpoints.clone());
                    added.push(device);
                }
            }
        }

        let mut removed = Vec::new();
        for device in existing.iter().skip(groups.len()) {
            if let Some(device) = self.store.remove_device(&device.identifier) {
                removed.push(device);
            }
        }

        (added, removed)
    }
}
