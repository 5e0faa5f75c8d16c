//! On/Off capability
//!
//! Binds the On/Off cluster of capable devices to the controller,
//! configures reporting, mirrors reports into a per-device state cache
//! and polls as a fallback for nodes that stop reporting.

use crate::bus::{Callbacks, InternalEvent};
use crate::communicator::Communicator;
use crate::device::{Capability, Device};
use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::gateway::GATEWAY_ENDPOINT;
use crate::node::{Node, NodeDevice};
use crate::poller::Poller;
use crate::provider::{IeeeAddress, Provider};
use crate::retry::{retry, DEFAULT_NETWORK_RETRIES, DEFAULT_NETWORK_TIMEOUT};
use crate::store::NodeStore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zcl_protocol::cluster::{id, on_off_attrs};
use zcl_protocol::commands::{global, ReportAttributes, ReportingConfiguration};
use zcl_protocol::{AttributeDataType, AttributeValue, Frame, OnOffCommand};

const REPORT_MINIMUM_INTERVAL: u16 = 1;
const REPORT_MAXIMUM_INTERVAL: u16 = 60;
const POLL_PERIOD: Duration = Duration::from_secs(REPORT_MAXIMUM_INTERVAL as u64);

pub struct OnOff {
    provider: Arc<dyn Provider>,
    store: Arc<NodeStore>,
    communicator: Arc<Communicator>,
    poller: Arc<Poller>,
    events: EventSender,
    callbacks: Weak<Callbacks>,
}

impl OnOff {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        store: Arc<NodeStore>,
        communicator: Arc<Communicator>,
        poller: Arc<Poller>,
        events: EventSender,
        callbacks: Weak<Callbacks>,
    ) -> Self {
        Self {
            provider,
            store,
            communicator,
            poller,
            events,
            callbacks,
        }
    }

    /// Subscribe to incoming attribute reports on the On/Off cluster
    pub(crate) fn init(&self) {
        let store = self.store.clone();
        let events = self.events.clone();
        self.communicator
            .subscribe(id::ON_OFF, global::REPORT_ATTRIBUTES, move |source, endpoint, frame| {
                let store = store.clone();
                let events = events.clone();
                Box::pin(async move {
                    handle_report(&store, &events, source, endpoint, &frame)
                })
            });
    }

    /// NodeEnumeration subscriber: wire up each On/Off capable device
    pub(crate) async fn node_enumeration(
        &self,
        ctx: &CancellationToken,
        node: Arc<Node>,
    ) -> Result<(), GatewayError> {
        for device in node.devices() {
            let endpoint = on_off_endpoint(&node, &device);

            let Some(endpoint) = endpoint else {
                if device.remove_capability(Capability::OnOff) {
                    self.poller.deregister(&device.identifier);
                    if let Some(callbacks) = self.callbacks.upgrade() {
                        callbacks
                            .call(ctx, InternalEvent::DeviceCapabilityRemoved {
                                device: device.clone(),
                                capability: Capability::OnOff,
                            })
                            .await?;
                    }
                }
                continue;
            };

            if let Err(err) = self.bind_and_configure(ctx, &node, endpoint).await {
                tracing::warn!(
                    "on/off reporting setup for {} failed, polling only: {err}",
                    device.identifier
                );
            }

            self.register_poll(&node, &device, endpoint);

            if device.add_capability(Capability::OnOff) {
                if let Some(callbacks) = self.callbacks.upgrade() {
                    callbacks
                        .call(ctx, InternalEvent::DeviceCapabilityAdded {
                            device: device.clone(),
                            capability: Capability::OnOff,
                        })
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// NodeLeave subscriber: release per-device poller entries
    pub(crate) async fn node_leave(
        &self,
        _ctx: &CancellationToken,
        node: Arc<Node>,
    ) -> Result<(), GatewayError> {
        for device in node.devices() {
            self.poller.deregister(&device.identifier);
        }
        Ok(())
    }

    /// DeviceRemoved subscriber: a device dropped by re-enumeration
    /// releases its poller entry just like a node leave does
    pub(crate) async fn device_removed(
        &self,
        _ctx: &CancellationToken,
        device: Arc<NodeDevice>,
    ) -> Result<(), GatewayError> {
        self.poller.deregister(&device.identifier);
        Ok(())
    }

    async fn bind_and_configure(
        &self,
        ctx: &CancellationToken,
        node: &Arc<Node>,
        endpoint: u8,
    ) -> Result<(), GatewayError> {
        let ieee = node.ieee_address;

        retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
            let provider = self.provider.clone();
            async move {
                provider
                    .bind_node_to_controller(&attempt, ieee, endpoint, GATEWAY_ENDPOINT, id::ON_OFF)
                    .await
                    .map_err(GatewayError::from)
            }
        })
        .await?;

        retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
            let communicator = self.communicator.clone();
            let node = node.clone();
            async move {
                let sequence = node.next_transaction_sequence();
                communicator
                    .configure_reporting(
                        &attempt,
                        node.ieee_address,
                        node.supports_aps_ack(),
                        id::ON_OFF,
                        None,
                        GATEWAY_ENDPOINT,
                        endpoint,
                        sequence,
                        ReportingConfiguration {
                            attribute_id: on_off_attrs::ON_OFF,
                            data_type: AttributeDataType::Boolean,
                            minimum_interval: REPORT_MINIMUM_INTERVAL,
                            maximum_interval: REPORT_MAXIMUM_INTERVAL,
                            reportable_change: Some(AttributeValue::Boolean(true)),
                        },
                    )
                    .await
            }
        })
        .await
    }

    /// Fallback probe: read the attribute when reports go quiet
    fn register_poll(&self, node: &Arc<Node>, device: &Arc<NodeDevice>, endpoint: u8) {
        let communicator = self.communicator.clone();
        let events = self.events.clone();
        let node = node.clone();
        let device = device.clone();

        self.poller.register(device.identifier, POLL_PERIOD, move |ctx| {
            let communicator = communicator.clone();
            let events = events.clone();
            let node = node.clone();
            let device = device.clone();
            Box::pin(async move {
                let quiet = device
                    .last_on_off_report()
                    .map_or(true, |at| at.elapsed() >= POLL_PERIOD);
                if !quiet {
                    return;
                }

                let read = retry(&ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
                    let communicator = communicator.clone();
                    let node = node.clone();
                    async move {
                        let sequence = node.next_transaction_sequence();
                        communicator
                            .read_attributes(
                                &attempt,
                                node.ieee_address,
                                node.supports_aps_ack(),
                                id::ON_OFF,
                                None,
                                GATEWAY_ENDPOINT,
                                endpoint,
                                sequence,
                                &[on_off_attrs::ON_OFF],
                            )
                            .await
                    }
                })
                .await;

                match read {
                    Ok(records) => {
                        let state = records.iter().find_map(|record| {
                            (record.identifier == on_off_attrs::ON_OFF && record.status == 0)
                                .then(|| record.value.as_ref().and_then(|v| v.as_bool()))
                                .flatten()
                        });
                        if let Some(state) = state {
                            if device.record_on_off_state(state) {
                                events.send(Event::OnOffUpdate {
                                    device: device.snapshot(),
                                    state,
                                });
                            }
                        }
                    }
                    Err(GatewayError::ContextExpired) => {}
                    Err(err) => {
                        tracing::debug!("on/off poll of {} failed: {err}", device.identifier);
                    }
                }
            })
        });
    }

    /// Turn a device on
    pub async fn on(&self, ctx: &CancellationToken, device: &Device) -> Result<(), GatewayError> {
        self.send_on_off(ctx, device, OnOffCommand::On).await
    }

    /// Turn a device off
    pub async fn off(&self, ctx: &CancellationToken, device: &Device) -> Result<(), GatewayError> {
        self.send_on_off(ctx, device, OnOffCommand::Off).await
    }

    /// Cached on/off state
    pub async fn state(
        &self,
        _ctx: &CancellationToken,
        device: &Device,
    ) -> Result<bool, GatewayError> {
        let internal = self
            .store
            .get_device(&device.identifier)
            .ok_or(GatewayError::DeviceNotOnGateway)?;
        if !internal.has_capability(Capability::OnOff) {
            return Err(GatewayError::DoesNotHaveCapability);
        }
        Ok(internal.on_off_state())
    }

    async fn send_on_off(
        &self,
        ctx: &CancellationToken,
        device: &Device,
        command: OnOffCommand,
    ) -> Result<(), GatewayError> {
        let internal = self
            .store
            .get_device(&device.identifier)
            .ok_or(GatewayError::DeviceNotOnGateway)?;
        if !internal.has_capability(Capability::OnOff) {
            return Err(GatewayError::DoesNotHaveCapability);
        }
        let node = self
            .store
            .get_node(&device.identifier.ieee_address)
            .ok_or(GatewayError::DeviceNotOnGateway)?;
        let endpoint =
            on_off_endpoint(&node, &internal).ok_or(GatewayError::DoesNotHaveCapability)?;

        retry(ctx, DEFAULT_NETWORK_TIMEOUT, DEFAULT_NETWORK_RETRIES, |attempt| {
            let communicator = self.communicator.clone();
            let node = node.clone();
            async move {
                let sequence = node.next_transaction_sequence();
                communicator
                    .send_command(
                        &attempt,
                        node.ieee_address,
                        node.supports_aps_ack(),
                        id::ON_OFF,
                        None,
                        GATEWAY_ENDPOINT,
                        endpoint,
                        sequence,
                        command as u8,
                        Vec::new(),
                    )
                    .await
            }
        })
        .await
    }
}

fn on_off_endpoint(node: &Arc<Node>, device: &Arc<NodeDevice>) -> Option<u8> {
    device.endpoints().into_iter().find(|endpoint| {
        node.endpoint_description(*endpoint)
            .is_some_and(|description| description.has_in_cluster(id::ON_OFF))
    })
}

fn handle_report(
    store: &Arc<NodeStore>,
    events: &EventSender,
    source: IeeeAddress,
    endpoint: u8,
    frame: &Frame,
) -> Result<(), GatewayError> {
    let report = ReportAttributes::parse(&frame.payload)?;
    let state = report.reports.iter().find_map(|report| {
        (report.identifier == on_off_attrs::ON_OFF)
            .then(|| report.value.as_bool())
            .flatten()
    });

    let Some(state) = state else {
        return Ok(());
    };
    let Some(node) = store.get_node(&source) else {
        tracing::debug!("on/off report from unknown node {source}");
        return Ok(());
    };
    let device = node
        .devices()
        .into_iter()
        .find(|device| device.endpoints().contains(&endpoint));
    let Some(device) = device else {
        return Ok(());
    };

    if device.record_on_off_state(state) {
        events.send(Event::OnOffUpdate {
            device: device.snapshot(),
            state,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EVENT_QUEUE_CAPACITY;
    use crate::provider::ApplicationMessage;
    use crate::testutil::{endpoint_description, pump_events, MockProvider};
    use tokio::sync::mpsc;
    use zcl_protocol::Direction;

    fn ieee(last: u8) -> IeeeAddress {
        IeeeAddress([0xBB, 0, 0, 0, 0, 0, 0, last])
    }

    struct Harness {
        on_off: Arc<OnOff>,
        store: Arc<NodeStore>,
        communicator: Arc<Communicator>,
        provider: Arc<MockProvider>,
        poller: Arc<Poller>,
        callbacks: Arc<Callbacks>,
        rx: mpsc::Receiver<Event>,
    }

    fn harness() -> Harness {
        let provider = Arc::new(MockProvider::new(ieee(0xC0)));
        let store = Arc::new(NodeStore::new());
        let communicator = Arc::new(Communicator::new(provider.clone()));
        let poller = Arc::new(Poller::new());
        let callbacks = Arc::new(Callbacks::new());
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let on_off = Arc::new(OnOff::new(
            provider.clone(),
            store.clone(),
            communicator.clone(),
            poller.clone(),
            EventSender::new(tx),
            Arc::downgrade(&callbacks),
        ));
        Harness {
            on_off,
            store,
            communicator,
            provider,
            poller,
            callbacks,
            rx,
        }
    }

    fn on_off_node(h: &Harness, last: u8) -> (Arc<Node>, Arc<NodeDevice>) {
        let node = h.store.add_node(ieee(last));
        let device = h.store.add_device(node.next_device_identifier(), &node);
        device.set_endpoints(vec![0x01]);
        let mut descriptions = std::collections::HashMap::new();
        descriptions.insert(0x01, endpoint_description(0x01, 0x0100, vec![0x0006]));
        node.replace_endpoint_descriptions(descriptions);
        (node, device)
    }

    #[tokio::test]
    async fn test_report_updates_state_and_emits_event() {
        let mut h = harness();
        h.on_off.init();
        let (_node, device) = on_off_node(&h, 1);
        device.add_capability(Capability::OnOff);

        let report = Frame::global(
            Direction::ServerToClient,
            None,
            9,
            global::REPORT_ATTRIBUTES,
            ReportAttributes {
                reports: vec![zcl_protocol::commands::AttributeReport {
                    identifier: on_off_attrs::ON_OFF,
                    value: AttributeValue::Boolean(true),
                }],
            }
            .serialize(),
        );
        let message = ApplicationMessage {
            profile_id: zcl_protocol::cluster::profile::HOME_AUTOMATION,
            cluster_id: id::ON_OFF,
            source_endpoint: 0x01,
            destination_endpoint: GATEWAY_ENDPOINT,
            data: report.serialize(),
        };
        h.communicator.process_incoming_message(ieee(1), message).await;

        assert!(device.on_off_state());
        assert!(matches!(
            h.rx.try_recv().unwrap(),
            Event::OnOffUpdate { state: true, .. }
        ));

        // Unchanged value does not emit again
        let report = Frame::global(
            Direction::ServerToClient,
            None,
            10,
            global::REPORT_ATTRIBUTES,
            vec![0x00, 0x00, 0x10, 0x01],
        );
        let message = ApplicationMessage {
            profile_id: zcl_protocol::cluster::profile::HOME_AUTOMATION,
            cluster_id: id::ON_OFF,
            source_endpoint: 0x01,
            destination_endpoint: GATEWAY_ENDPOINT,
            data: report.serialize(),
        };
        h.communicator.process_incoming_message(ieee(1), message).await;
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_node_enumeration_binds_and_attaches() {
        let h = harness();
        let (node, device) = on_off_node(&h, 2);
        let pump = pump_events(h.provider.clone(), h.communicator.clone());

        let added = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = added.clone();
        h.callbacks.add_capability_added(move |_, _, capability| {
            seen.lock().unwrap().push(capability);
            Box::pin(async { Ok(()) })
        });

        let ctx = CancellationToken::new();
        h.on_off.node_enumeration(&ctx, node).await.unwrap();

        assert!(device.has_capability(Capability::OnOff));
        let binds = h.provider.bind_calls();
        assert_eq!(binds, vec![(ieee(2), 0x01, GATEWAY_ENDPOINT, id::ON_OFF)]);
        assert_eq!(*added.lock().unwrap(), vec![Capability::OnOff]);
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_removed_releases_poll_probe() {
        let h = harness();
        let (node, device) = on_off_node(&h, 6);
        h.on_off.register_poll(&node, &device, 0x01);

        let cancel = CancellationToken::new();
        h.poller.start(cancel.clone());

        // First poll fires once the period elapses; no canned response is
        // configured, so each attempt shows up as outgoing traffic
        tokio::time::sleep(Duration::from_secs(75)).await;
        let polled = h.provider.sent_messages().len();
        assert!(polled > 0, "probe never polled");

        let ctx = CancellationToken::new();
        h.on_off.device_removed(&ctx, device.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(
            h.provider.sent_messages().len(),
            polled,
            "removed device's probe kept polling"
        );

        cancel.cancel();
        h.poller.stop().await;
    }

    #[tokio::test]
    async fn test_on_sends_cluster_command() {
        let h = harness();
        let (_node, device) = on_off_node(&h, 3);
        device.add_capability(Capability::OnOff);

        let ctx = CancellationToken::new();
        h.on_off.on(&ctx, &device.snapshot()).await.unwrap();

        let sent = h.provider.sent_messages();
        let (destination, _ack, message) = sent.last().unwrap().clone();
        assert_eq!(destination, ieee(3));
        assert_eq!(message.cluster_id, id::ON_OFF);
        let frame = Frame::deserialize(&message.data).unwrap();
        assert_eq!(frame.frame_type, zcl_protocol::FrameType::ClusterSpecific);
        assert_eq!(frame.command_id, OnOffCommand::On as u8);

        h.on_off.off(&ctx, &device.snapshot()).await.unwrap();
        let sent = h.provider.sent_messages();
        let (_, _, message) = sent.last().unwrap().clone();
        let frame = Frame::deserialize(&message.data).unwrap();
        assert_eq!(frame.command_id, OnOffCommand::Off as u8);
    }

    #[tokio::test]
    async fn test_operations_validate_device() {
        let h = harness();
        let ctx = CancellationToken::new();

        let unknown = Device {
            identifier: crate::device::DeviceIdentifier {
                ieee_address: ieee(99),
                sub_identifier: 0,
            },
            capabilities: vec![],
        };
        assert!(matches!(
            h.on_off.on(&ctx, &unknown).await,
            Err(GatewayError::DeviceNotOnGateway)
        ));

        let (_node, device) = on_off_node(&h, 4);
        // Registered but capability never attached
        assert!(matches!(
            h.on_off.state(&ctx, &device.snapshot()).await,
            Err(GatewayError::DoesNotHaveCapability)
        ));
    }

    #[tokio::test]
    async fn test_node_leave_releases_poller_entries() {
        let h = harness();
        let (node, device) = on_off_node(&h, 5);
        h.on_off.register_poll(&node, &device, 0x01);

        let ctx = CancellationToken::new();
        h.on_off.node_leave(&ctx, node).await.unwrap();
        // Deregistration is observable through the poller not firing;
        // at minimum the call must not error and must be idempotent.
        h.poller.deregister(&device.identifier);
    }
}
