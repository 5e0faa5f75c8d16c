//! Node and device registries
//!
//! Keyed maps over the live nodes and their devices. Map access goes
//! through the store; inner state goes through the per-node and
//! per-device locks, acquired strictly store-then-node-then-device.

use crate::device::DeviceIdentifier;
use crate::node::{Node, NodeDevice};
use crate::provider::IeeeAddress;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of nodes (by IEEE address) and devices (by identifier)
pub(crate) struct NodeStore {
    nodes: DashMap<IeeeAddress, Arc<Node>>,
    devices: DashMap<DeviceIdentifier, Arc<NodeDevice>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            devices: DashMap::new(),
        }
    }

    pub fn get_node(&self, ieee_address: &IeeeAddress) -> Option<Arc<Node>> {
        self.nodes.get(ieee_address).map(|entry| entry.value().clone())
    }

    /// Fetch or create the node for `ieee_address`
    pub fn add_node(&self, ieee_address: IeeeAddress) -> Arc<Node> {
        self.nodes
            .entry(ieee_address)
            .or_insert_with(|| Arc::new(Node::new(ieee_address)))
            .value()
            .clone()
    }

    pub fn remove_node(&self, ieee_address: &IeeeAddress) -> Option<Arc<Node>> {
        self.nodes.remove(ieee_address).map(|(_, node)| node)
    }

    pub fn get_device(&self, identifier: &DeviceIdentifier) -> Option<Arc<NodeDevice>> {
        self.devices.get(identifier).map(|entry| entry.value().clone())
    }

    /// Create a device under `node` and register its identifier
    pub fn add_device(&self, identifier: DeviceIdentifier, node: &Arc<Node>) -> Arc<NodeDevice> {
        let device = Arc::new(NodeDevice::new(identifier));
        self.devices.insert(identifier, device.clone());
        node.state.write().unwrap().devices.push(device.clone());
        device
    }

    /// Unregister a device from the global map and its owning node
    pub fn remove_device(&self, identifier: &DeviceIdentifier) -> Option<Arc<NodeDevice>> {
        let removed = self.devices.remove(identifier).map(|(_, device)| device);
        if removed.is_some() {
            if let Some(node) = self.get_node(&identifier.ieee_address) {
                node.state
                    .write()
                    .unwrap()
                    .devices
                    .retain(|device| device.identifier != *identifier);
            }
        }
        removed
    }

    /// Snapshot of all registered devices
    pub fn devices(&self) -> Vec<Arc<NodeDevice>> {
        self.devices.iter().map(|entry| entry.value().clone()).collect()
    }
}
