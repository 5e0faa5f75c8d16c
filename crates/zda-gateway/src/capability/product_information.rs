//! Product information capability
//!
//! After enumeration, devices exposing the Basic cluster get their
//! manufacturer and model strings read and cached. A failed attribute
//! leaves its field cleared; the capability is attached either way so
//! hosts can distinguish "never probed" from "probed, unknown".

use crate::bus::{Callbacks, InternalEvent};
use crate::device::{present, Capability, Device, ProductInformation};
use crate::error::GatewayError;
use crate::node::{Node, NodeDevice};
use crate::communicator::Communicator;
use crate::retry::{retry, DEFAULT_NETWORK_RETRIES, DEFAULT_NETWORK_TIMEOUT};
use crate::store::NodeStore;
use crate::gateway::GATEWAY_ENDPOINT;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use zcl_protocol::cluster::{basic_attrs, id};
use zcl_protocol::AttributeRecord;

pub struct HasProductInformation {
    store: Arc<NodeStore>,
    communicator: Arc<Communicator>,
    callbacks: Weak<Callbacks>,
}

impl HasProductInformation {
    pub(crate) fn new(
        store: Arc<NodeStore>,
        communicator: Arc<Communicator>,
        callbacks: Weak<Callbacks>,
    ) -> Self {
        Self {
            store,
            communicator,
            callbacks,
        }
    }

    /// NodeEnumeration subscriber: populate product info per device
    pub(crate) async fn node_enumeration(
        &self,
        ctx: &CancellationToken,
        node: Arc<Node>,
    ) -> Result<(), GatewayError> {
        for device in node.devices() {
            let endpoint = device.endpoints().into_iter().find(|endpoint| {
                node.endpoint_description(*endpoint)
                    .is_some_and(|description| description.has_in_cluster(id::BASIC))
            });

            let Some(endpoint) = endpoint else {
                continue;
            };

            let read = retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
                let communicator = self.communicator.clone();
                let node = node.clone();
                async move {
                    let sequence = node.next_transaction_sequence();
                    communicator
                        .read_attributes(
                            &attempt,
                            node.ieee_address,
                            node.supports_aps_ack(),
                            id::BASIC,
                            None,
                            GATEWAY_ENDPOINT,
                            endpoint,
                            sequence,
                            &[basic_attrs::MANUFACTURER_NAME, basic_attrs::MODEL_IDENTIFIER],
                        )
                        .await
                }
            })
            .await;

            match read {
                Ok(records) => apply_records(&device, &records),
                Err(err) => tracing::warn!(
                    "failed to read product information for {}: {err}",
                    device.identifier
                ),
            }

            if device.add_capability(Capability::HasProductInformation) {
                if let Some(callbacks) = self.callbacks.upgrade() {
                    callbacks
                        .call(ctx, InternalEvent::DeviceCapabilityAdded {
                            device: device.clone(),
                            capability: Capability::HasProductInformation,
                        })
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Cached product information for a device
    pub async fn product_information(
        &self,
        _ctx: &CancellationToken,
        device: &Device,
    ) -> Result<ProductInformation, GatewayError> {
        let internal = self
            .store
            .get_device(&device.identifier)
            .ok_or(GatewayError::DeviceNotOnGateway)?;

        if !internal.has_capability(Capability::HasProductInformation) {
            return Err(GatewayError::DoesNotHaveCapability);
        }

        Ok(internal.product_information())
    }
}

fn apply_records(device: &Arc<NodeDevice>, records: &[AttributeRecord]) {
    device.update_product_information(|info| {
        for record in records {
            match record.identifier {
                basic_attrs::MANUFACTURER_NAME => {
                    apply_string(record, &mut info.manufacturer, &mut info.present, present::MANUFACTURER);
                }
                basic_attrs::MODEL_IDENTIFIER => {
                    apply_string(record, &mut info.name, &mut info.present, present::NAME);
                }
                _ => {}
            }
        }
    });
}

fn apply_string(record: &AttributeRecord, field: &mut String, bits: &mut u8, bit: u8) {
    let value = record
        .value
        .as_ref()
        .and_then(|value| value.as_str())
        .filter(|_| record.status == 0);

    match value {
        Some(text) => {
            *field = text.to_string();
            *bits |= bit;
        }
        None => {
            field.clear();
            *bits &= !bit;
        }
    }
}
