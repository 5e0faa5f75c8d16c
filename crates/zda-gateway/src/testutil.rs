//! Shared test doubles
//!
//! A scriptable in-memory provider: tests push network events in,
//! inspect outgoing traffic, and configure canned ZCL answers that the
//! mock plays back through its own event stream.

use crate::communicator::Communicator;
use crate::provider::{
    AdapterNode, ApplicationMessage, EndpointDescription, IeeeAddress, LogicalType,
    NodeDescription, Provider, ProviderError, ProviderEvent,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zcl_protocol::commands::{global, ReadAttributes, ReadAttributesResponse};
use zcl_protocol::{AttributeRecord, Direction, Frame, FrameType};

pub(crate) struct MockProvider {
    adapter: AdapterNode,
    event_tx: mpsc::UnboundedSender<ProviderEvent>,
    event_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ProviderEvent>>,
    permit_join_calls: AtomicUsize,
    deny_join_calls: AtomicUsize,
    fail_permit_join: AtomicBool,
    fail_deny_join: AtomicBool,
    sent: Mutex<Vec<(IeeeAddress, bool, ApplicationMessage)>>,
    binds: Mutex<Vec<(IeeeAddress, u8, u8, u16)>>,
    registered_endpoints: Mutex<Vec<u8>>,
    node_endpoints: Mutex<HashMap<IeeeAddress, Vec<u8>>>,
    endpoint_descriptions: Mutex<HashMap<(IeeeAddress, u8), EndpointDescription>>,
    read_responses: Mutex<HashMap<u16, Vec<AttributeRecord>>>,
}

impl MockProvider {
    pub fn new(adapter_ieee: IeeeAddress) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            adapter: AdapterNode {
                ieee_address: adapter_ieee,
                network_address: 0x0000,
            },
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            permit_join_calls: AtomicUsize::new(0),
            deny_join_calls: AtomicUsize::new(0),
            fail_permit_join: AtomicBool::new(false),
            fail_deny_join: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            binds: Mutex::new(Vec::new()),
            registered_endpoints: Mutex::new(Vec::new()),
            node_endpoints: Mutex::new(HashMap::new()),
            endpoint_descriptions: Mutex::new(HashMap::new()),
            read_responses: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_event(&self, event: ProviderEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn push_node_join(&self, ieee_address: IeeeAddress) {
        self.push_event(ProviderEvent::NodeJoin { ieee_address });
    }

    pub fn push_node_leave(&self, ieee_address: IeeeAddress) {
        self.push_event(ProviderEvent::NodeLeave { ieee_address });
    }

    pub fn set_node_endpoints(&self, ieee_address: IeeeAddress, endpoints: Vec<u8>) {
        self.node_endpoints.lock().unwrap().insert(ieee_address, endpoints);
    }

    pub fn set_endpoint_description(
        &self,
        ieee_address: IeeeAddress,
        description: EndpointDescription,
    ) {
        self.endpoint_descriptions
            .lock()
            .unwrap()
            .insert((ieee_address, description.endpoint), description);
    }

    /// Answer Read Attributes on `cluster_id` from these records;
    /// requested attributes with no record get an unsupported status.
    pub fn set_read_attribute_response(&self, cluster_id: u16, records: Vec<AttributeRecord>) {
        self.read_responses.lock().unwrap().insert(cluster_id, records);
    }

    pub fn fail_permit_join(&self) {
        self.fail_permit_join.store(true, Ordering::SeqCst);
    }

    pub fn fail_deny_join(&self) {
        self.fail_deny_join.store(true, Ordering::SeqCst);
    }

    pub fn permit_join_calls(&self) -> usize {
        self.permit_join_calls.load(Ordering::SeqCst)
    }

    pub fn deny_join_calls(&self) -> usize {
        self.deny_join_calls.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<(IeeeAddress, bool, ApplicationMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bind_calls(&self) -> Vec<(IeeeAddress, u8, u8, u16)> {
        self.binds.lock().unwrap().clone()
    }

    fn push_incoming(&self, from: IeeeAddress, request: &ApplicationMessage, frame: Frame) {
        self.push_event(ProviderEvent::NodeIncomingMessage {
            ieee_address: from,
            message: ApplicationMessage {
                profile_id: request.profile_id,
                cluster_id: request.cluster_id,
                source_endpoint: request.destination_endpoint,
                destination_endpoint: request.source_endpoint,
                data: frame.serialize(),
            },
        });
    }

    fn answer(&self, destination: IeeeAddress, message: &ApplicationMessage) {
        let Ok(frame) = Frame::deserialize(&message.data) else {
            return;
        };
        if frame.frame_type != FrameType::Global {
            return;
        }

        match frame.command_id {
            global::READ_ATTRIBUTES => {
                let configured = self
                    .read_responses
                    .lock()
                    .unwrap()
                    .get(&message.cluster_id)
                    .cloned();
                let Some(configured) = configured else {
                    return;
                };
                let requested = match ReadAttributes::parse(&frame.payload) {
                    Ok(requested) => requested,
                    Err(_) => return,
                };
                let records = requested
                    .attribute_ids
                    .iter()
                    .map(|id| {
                        configured
                            .iter()
                            .find(|record| record.identifier == *id)
                            .cloned()
                            .unwrap_or(AttributeRecord {
                                identifier: *id,
                                status: 0x86,
                                value: None,
                            })
                    })
                    .collect();
                let response = Frame::global(
                    Direction::ServerToClient,
                    None,
                    frame.transaction_sequence,
                    global::READ_ATTRIBUTES_RESPONSE,
                    ReadAttributesResponse { records }.serialize(),
                );
                self.push_incoming(destination, message, response);
            }
            global::CONFIGURE_REPORTING => {
                let response = Frame::global(
                    Direction::ServerToClient,
                    None,
                    frame.transaction_sequence,
                    global::CONFIGURE_REPORTING_RESPONSE,
                    vec![0x00],
                );
                self.push_incoming(destination, message, response);
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn adapter_node(&self) -> AdapterNode {
        self.adapter
    }

    async fn register_adapter_endpoint(
        &self,
        _ctx: &CancellationToken,
        endpoint: u8,
        _profile_id: u16,
        _device_version: u8,
        _device_id: u16,
        _in_clusters: Vec<u16>,
        _out_clusters: Vec<u16>,
    ) -> Result<(), ProviderError> {
        self.registered_endpoints.lock().unwrap().push(endpoint);
        Ok(())
    }

    async fn permit_join(
        &self,
        _ctx: &CancellationToken,
        _allow: bool,
    ) -> Result<(), ProviderError> {
        if self.fail_permit_join.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("permit join failure".to_string()));
        }
        self.permit_join_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deny_join(&self, _ctx: &CancellationToken) -> Result<(), ProviderError> {
        if self.fail_deny_join.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("deny join failure".to_string()));
        }
        self.deny_join_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_event(&self, ctx: &CancellationToken) -> Result<ProviderEvent, ProviderError> {
        let mut rx = self.event_rx.lock().await;
        tokio::select! {
            () = ctx.cancelled() => Err(ProviderError::ContextExpired),
            event = rx.recv() => event.ok_or(ProviderError::ContextExpired),
        }
    }

    async fn send_application_message(
        &self,
        _ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        message: ApplicationMessage,
    ) -> Result<(), ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination, require_ack, message.clone()));
        self.answer(destination, &message);
        Ok(())
    }

    async fn bind_node_to_controller(
        &self,
        _ctx: &CancellationToken,
        node: IeeeAddress,
        source_endpoint: u8,
        destination_endpoint: u8,
        cluster_id: u16,
    ) -> Result<(), ProviderError> {
        self.binds
            .lock()
            .unwrap()
            .push((node, source_endpoint, destination_endpoint, cluster_id));
        Ok(())
    }

    async fn query_node_description(
        &self,
        _ctx: &CancellationToken,
        _node: IeeeAddress,
    ) -> Result<NodeDescription, ProviderError> {
        Ok(NodeDescription {
            logical_type: LogicalType::EndDevice,
            manufacturer_code: 0x1234,
        })
    }

    async fn query_node_endpoints(
        &self,
        _ctx: &CancellationToken,
        node: IeeeAddress,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(self
            .node_endpoints
            .lock()
            .unwrap()
            .get(&node)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_node_endpoint_description(
        &self,
        _ctx: &CancellationToken,
        node: IeeeAddress,
        endpoint: u8,
    ) -> Result<EndpointDescription, ProviderError> {
        self.endpoint_descriptions
            .lock()
            .unwrap()
            .get(&(node, endpoint))
            .cloned()
            .ok_or_else(|| ProviderError::Network(format!("no descriptor for endpoint {endpoint}")))
    }
}

/// Build a home-automation endpoint description
pub(crate) fn endpoint_description(
    endpoint: u8,
    device_id: u16,
    in_clusters: Vec<u16>,
) -> EndpointDescription {
    EndpointDescription {
        endpoint,
        profile_id: zcl_protocol::cluster::profile::HOME_AUTOMATION,
        device_id,
        device_version: 1,
        in_clusters,
        out_clusters: Vec::new(),
    }
}

/// Feed the mock's event stream into a communicator, like the provider
/// handler loop does in the full gateway.
pub(crate) fn pump_events(
    provider: Arc<MockProvider>,
    communicator: Arc<Communicator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctx = CancellationToken::new();
        while let Ok(event) = provider.read_event(&ctx).await {
            if let ProviderEvent::NodeIncomingMessage {
                ieee_address,
                message,
            } = event
            {
                communicator.process_incoming_message(ieee_address, message).await;
            }
        }
    })
}

/// Poll `predicate` until it holds or `deadline` passes
pub(crate) async fn wait_until<F>(deadline: Duration, predicate: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
