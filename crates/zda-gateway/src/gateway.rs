//! The ZDA gateway
//!
//! Owns the node/device store, the internal callback bus, the ZCL
//! communicator, the poller and the capability implementations, and
//! runs the provider handler loop that drives them all.

use crate::bus::{Callbacks, InternalEvent};
use crate::capability::{
    CapabilityRef, DeviceDiscovery, EnumerateDevice, HasProductInformation, OnOff,
};
use crate::communicator::Communicator;
use crate::device::{Capability, Device, DeviceIdentifier};
use crate::error::GatewayError;
use crate::events::{Event, EventSender, EVENT_QUEUE_CAPACITY};
use crate::node::NodeDevice;
use crate::poller::Poller;
use crate::provider::{Provider, ProviderError, ProviderEvent};
use crate::store::NodeStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zcl_protocol::cluster::profile;

/// The home-automation endpoint registered for the gateway itself
pub const GATEWAY_ENDPOINT: u8 = 0x01;

/// Tick bounding how long shutdown waits on a quiet provider
const PROVIDER_READ_TICK: Duration = Duration::from_millis(250);

pub struct ZigbeeGateway {
    provider: Arc<dyn Provider>,
    store: Arc<NodeStore>,
    communicator: Arc<Communicator>,
    callbacks: Arc<Callbacks>,
    poller: Arc<Poller>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<Event>>,
    self_device: Arc<NodeDevice>,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    device_discovery: Arc<DeviceDiscovery>,
    enumerate_device: Arc<EnumerateDevice>,
    has_product_information: Arc<HasProductInformation>,
    on_off: Arc<OnOff>,
}

impl ZigbeeGateway {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let events = EventSender::new(tx);

        let store = Arc::new(NodeStore::new());
        let communicator = Arc::new(Communicator::new(provider.clone()));
        let callbacks = Arc::new(Callbacks::new());
        let poller = Arc::new(Poller::new());

        let adapter = provider.adapter_node();
        let self_identifier = DeviceIdentifier {
            ieee_address: adapter.ieee_address,
            sub_identifier: 0,
        };
        let self_device = Arc::new(NodeDevice::new(self_identifier));
        self_device.add_capability(Capability::DeviceDiscovery);

        let device_discovery = Arc::new(DeviceDiscovery::new(
            provider.clone(),
            events.clone(),
            self_identifier,
            self_device.snapshot(),
            cancel.clone(),
        ));
        let enumerate_device = Arc::new(EnumerateDevice::new(
            provider.clone(),
            store.clone(),
            events.clone(),
            Arc::downgrade(&callbacks),
            cancel.clone(),
        ));
        let has_product_information = Arc::new(HasProductInformation::new(
            store.clone(),
            communicator.clone(),
            Arc::downgrade(&callbacks),
        ));
        let on_off = Arc::new(OnOff::new(
            provider.clone(),
            store.clone(),
            communicator.clone(),
            poller.clone(),
            events.clone(),
            Arc::downgrade(&callbacks),
        ));

        // Device and capability lifecycle reaches the host through the
        // egress queue; the bus is the single source for those events
        let egress = events.clone();
        callbacks.add_device_added(move |_, device| {
            let events = egress.clone();
            Box::pin(async move {
                events.send(Event::DeviceAdded {
                    device: device.snapshot(),
                });
                Ok(())
            })
        });

        let egress = events.clone();
        callbacks.add_device_removed(move |_, device| {
            let events = egress.clone();
            Box::pin(async move {
                events.send(Event::DeviceRemoved {
                    device: device.snapshot(),
                });
                Ok(())
            })
        });

        let egress = events.clone();
        callbacks.add_capability_added(move |_, device, capability| {
            let events = egress.clone();
            Box::pin(async move {
                events.send(Event::CapabilityAdded {
                    device: device.snapshot(),
                    capability,
                });
                Ok(())
            })
        });

        let egress = events.clone();
        callbacks.add_capability_removed(move |_, device, capability| {
            let events = egress.clone();
            Box::pin(async move {
                events.send(Event::CapabilityRemoved {
                    device: device.snapshot(),
                    capability,
                });
                Ok(())
            })
        });

        // Joined nodes get end-to-end acks on application traffic
        callbacks.add_node_join(|_, node| {
            Box::pin(async move {
                node.set_supports_aps_ack(true);
                Ok(())
            })
        });

        let enumeration = enumerate_device.clone();
        callbacks.add_node_join(move |_, node| {
            let enumeration = enumeration.clone();
            Box::pin(async move {
                enumeration.start_enumeration(node);
                Ok(())
            })
        });

        let product = has_product_information.clone();
        callbacks.add_node_enumeration(move |ctx, node| {
            let product = product.clone();
            Box::pin(async move { product.node_enumeration(&ctx, node).await })
        });

        let switching = on_off.clone();
        callbacks.add_node_enumeration(move |ctx, node| {
            let switching = switching.clone();
            Box::pin(async move { switching.node_enumeration(&ctx, node).await })
        });

        let switching = on_off.clone();
        callbacks.add_node_leave(move |ctx, node| {
            let switching = switching.clone();
            Box::pin(async move { switching.node_leave(&ctx, node).await })
        });

        let switching = on_off.clone();
        callbacks.add_device_removed(move |ctx, device| {
            let switching = switching.clone();
            Box::pin(async move { switching.device_removed(&ctx, device).await })
        });

        on_off.init();

        Self {
            provider,
            store,
            communicator,
            callbacks,
            poller,
            events_rx: tokio::sync::Mutex::new(rx),
            self_device,
            cancel,
            tasks: std::sync::Mutex::new(Vec::new()),
            device_discovery,
            enumerate_device,
            has_product_information,
            on_off,
        }
    }

    /// Register the gateway endpoint and spawn the background tasks
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.provider
            .register_adapter_endpoint(
                &self.cancel,
                GATEWAY_ENDPOINT,
                profile::HOME_AUTOMATION,
                1,
                1,
                Vec::new(),
                Vec::new(),
            )
            .await?;

        self.poller.start(self.cancel.child_token());

        let handle = tokio::spawn(provider_handler(
            self.provider.clone(),
            self.store.clone(),
            self.communicator.clone(),
            self.callbacks.clone(),
            self.cancel.child_token(),
        ));
        self.tasks.lock().unwrap().push(handle);

        tracing::info!("gateway started, self device {}", self.self_device.identifier);
        Ok(())
    }

    /// Cancel and join all background tasks
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.poller.stop().await;
        self.device_discovery.shutdown().await;
        tracing::info!("gateway stopped");
    }

    /// Await the next externally-visible event
    pub async fn read_event(&self, ctx: &CancellationToken) -> Result<Event, GatewayError> {
        let mut rx = self.events_rx.lock().await;
        tokio::select! {
            () = ctx.cancelled() => Err(GatewayError::ContextExpired),
            event = rx.recv() => event.ok_or(GatewayError::ContextExpired),
        }
    }

    /// Look up a capability implementation by flag
    pub fn capability(&self, capability: Capability) -> Option<CapabilityRef> {
        match capability {
            Capability::DeviceDiscovery => Some(CapabilityRef::DeviceDiscovery(
                self.device_discovery.clone(),
            )),
            Capability::EnumerateDevice => Some(CapabilityRef::EnumerateDevice(
                self.enumerate_device.clone(),
            )),
            Capability::HasProductInformation => Some(CapabilityRef::HasProductInformation(
                self.has_product_information.clone(),
            )),
            Capability::OnOff => Some(CapabilityRef::OnOff(self.on_off.clone())),
        }
    }

    pub fn device_discovery(&self) -> Arc<DeviceDiscovery> {
        self.device_discovery.clone()
    }

    pub fn enumerate_device(&self) -> Arc<EnumerateDevice> {
        self.enumerate_device.clone()
    }

    pub fn has_product_information(&self) -> Arc<HasProductInformation> {
        self.has_product_information.clone()
    }

    pub fn on_off(&self) -> Arc<OnOff> {
        self.on_off.clone()
    }

    /// The sentinel device representing the gateway itself
    pub fn self_device(&self) -> Device {
        self.self_device.snapshot()
    }

    /// Snapshot of the self device plus every node's devices
    pub fn devices(&self) -> Vec<Device> {
        let mut devices = vec![self.self_device.snapshot()];
        devices.extend(self.store.devices().iter().map(|device| device.snapshot()));
        devices
    }
}

async fn provider_handler(
    provider: Arc<dyn Provider>,
    store: Arc<NodeStore>,
    communicator: Arc<Communicator>,
    callbacks: Arc<Callbacks>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let read = tokio::time::timeout(PROVIDER_READ_TICK, provider.read_event(&cancel)).await;
        let event = match read {
            Err(_) => continue,
            Ok(Err(ProviderError::ContextExpired)) => continue,
            Ok(Err(err)) => {
                tracing::error!("could not listen for event from zigbee provider: {err}");
                return;
            }
            Ok(Ok(event)) => event,
        };

        match event {
            ProviderEvent::NodeJoin { ieee_address } => {
                let node = store.add_node(ieee_address);
                if !node.devices().is_empty() {
                    continue;
                }

                tracing::info!("node {ieee_address} joined");
                let identifier = node.next_device_identifier();
                let device = store.add_device(identifier, &node);

                if let Err(err) = callbacks
                    .call(&cancel, InternalEvent::DeviceAdded { device })
                    .await
                {
                    tracing::warn!("device added callbacks failed: {err}");
                }
                if let Err(err) = callbacks
                    .call(&cancel, InternalEvent::NodeJoin { node })
                    .await
                {
                    tracing::warn!("node join callbacks failed: {err}");
                }
            }
            ProviderEvent::NodeLeave { ieee_address } => {
                let Some(node) = store.get_node(&ieee_address) else {
                    continue;
                };

                tracing::info!("node {ieee_address} left");
                if let Err(err) = callbacks
                    .call(&cancel, InternalEvent::NodeLeave { node: node.clone() })
                    .await
                {
                    tracing::warn!("node leave callbacks failed: {err}");
                }

                for device in node.devices() {
                    if let Some(device) = store.remove_device(&device.identifier) {
                        if let Err(err) = callbacks
                            .call(&cancel, InternalEvent::DeviceRemoved { device })
                            .await
                        {
                            tracing::warn!("device removed callbacks failed: {err}");
                        }
                    }
                }
                store.remove_node(&ieee_address);
            }
            ProviderEvent::NodeIncomingMessage {
                ieee_address,
                message,
            } => {
                communicator.process_incoming_message(ieee_address, message).await;
            }
        }
    }
}
