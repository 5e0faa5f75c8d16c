//! Zigbee provider interface
//!
//! The provider is the radio-level collaborator: it speaks node
//! join/leave, ZDO queries and raw APS application messages. The gateway
//! never touches the PHY itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 64-bit IEEE (EUI-64) address of a Zigbee node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IeeeAddress(pub [u8; 8]);

impl std::fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // IEEE addresses are displayed most-significant byte first
        let text = self
            .0
            .iter()
            .rev()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        write!(f, "{text}")
    }
}

impl std::fmt::Debug for IeeeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IeeeAddress({self})")
    }
}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The supplied context was cancelled or its deadline passed
    #[error("Context expired")]
    ContextExpired,

    /// Radio or network failure; callers may retry
    #[error("Network failure: {0}")]
    Network(String),
}

/// The coordinator node the provider drives
#[derive(Debug, Clone, Copy)]
pub struct AdapterNode {
    pub ieee_address: IeeeAddress,
    pub network_address: u16,
}

/// A node's simple descriptor for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
}

impl EndpointDescription {
    /// Check whether the endpoint serves a cluster
    #[must_use]
    pub fn has_in_cluster(&self, cluster_id: u16) -> bool {
        self.in_clusters.contains(&cluster_id)
    }
}

/// Network role from the node descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Coordinator,
    Router,
    EndDevice,
}

/// A node descriptor
#[derive(Debug, Clone)]
pub struct NodeDescription {
    pub logical_type: LogicalType,
    pub manufacturer_code: u16,
}

/// An application-layer message carried over APS
#[derive(Debug, Clone)]
pub struct ApplicationMessage {
    pub profile_id: u16,
    pub cluster_id: u16,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    pub data: Vec<u8>,
}

/// Events surfaced by the provider's event stream
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    NodeJoin {
        ieee_address: IeeeAddress,
    },
    NodeLeave {
        ieee_address: IeeeAddress,
    },
    NodeIncomingMessage {
        ieee_address: IeeeAddress,
        message: ApplicationMessage,
    },
}

/// Radio-level Zigbee driver
#[async_trait]
pub trait Provider: Send + Sync {
    /// The coordinator's own node
    fn adapter_node(&self) -> AdapterNode;

    /// Register an application endpoint on the coordinator
    async fn register_adapter_endpoint(
        &self,
        ctx: &CancellationToken,
        endpoint: u8,
        profile_id: u16,
        device_version: u8,
        device_id: u16,
        in_clusters: Vec<u16>,
        out_clusters: Vec<u16>,
    ) -> Result<(), ProviderError>;

    /// Open or close the network for joining
    async fn permit_join(&self, ctx: &CancellationToken, allow: bool) -> Result<(), ProviderError>;

    /// Close the network for joining
    async fn deny_join(&self, ctx: &CancellationToken) -> Result<(), ProviderError>;

    /// Await the next network event; `ContextExpired` on cancellation
    async fn read_event(&self, ctx: &CancellationToken) -> Result<ProviderEvent, ProviderError>;

    /// Send an application message to a node
    async fn send_application_message(
        &self,
        ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        message: ApplicationMessage,
    ) -> Result<(), ProviderError>;

    /// Bind a node's cluster to the coordinator
    async fn bind_node_to_controller(
        &self,
        ctx: &CancellationToken,
        node: IeeeAddress,
        source_endpoint: u8,
        destination_endpoint: u8,
        cluster_id: u16,
    ) -> Result<(), ProviderError>;

    /// Query a node's node descriptor
    async fn query_node_description(
        &self,
        ctx: &CancellationToken,
        node: IeeeAddress,
    ) -> Result<NodeDescription, ProviderError>;

    /// Query a node's active endpoints
    async fn query_node_endpoints(
        &self,
        ctx: &CancellationToken,
        node: IeeeAddress,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Query the simple descriptor for one endpoint
    async fn query_node_endpoint_description(
        &self,
        ctx: &CancellationToken,
        node: IeeeAddress,
        endpoint: u8,
    ) -> Result<EndpointDescription, ProviderError>;
}
