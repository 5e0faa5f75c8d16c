//! Internal node and device state
//!
//! One `Node` per physical Zigbee device, owning one or more
//! `NodeDevice`s. Inner state sits behind per-node and per-device locks;
//! locks are never held across await points.

use crate::device::{Capability, Device, DeviceIdentifier, ProductInformation};
use crate::provider::{EndpointDescription, IeeeAddress};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// A physical node on the network
pub struct Node {
    pub ieee_address: IeeeAddress,
    pub(crate) state: RwLock<NodeState>,
}

pub(crate) struct NodeState {
    pub supports_aps_ack: bool,
    pub endpoint_descriptions: HashMap<u8, EndpointDescription>,
    pub next_transaction_sequence: u8,
    pub next_sub_identifier: u8,
    pub devices: Vec<Arc<NodeDevice>>,
}

impl Node {
    pub(crate) fn new(ieee_address: IeeeAddress) -> Self {
        Self {
            ieee_address,
            state: RwLock::new(NodeState {
                supports_aps_ack: false,
                endpoint_descriptions: HashMap::new(),
                next_transaction_sequence: 0,
                next_sub_identifier: 0,
                devices: Vec::new(),
            }),
        }
    }

    /// Allocate the next outgoing ZCL transaction sequence (wrapping)
    pub fn next_transaction_sequence(&self) -> u8 {
        let mut state = self.state.write().unwrap();
        let sequence = state.next_transaction_sequence;
        state.next_transaction_sequence = sequence.wrapping_add(1);
        sequence
    }

    /// Allocate the identifier for the next device under this node
    pub fn next_device_identifier(&self) -> DeviceIdentifier {
        let mut state = self.state.write().unwrap();
        let sub_identifier = state.next_sub_identifier;
        state.next_sub_identifier += 1;
        DeviceIdentifier {
            ieee_address: self.ieee_address,
            sub_identifier,
        }
    }

    pub fn supports_aps_ack(&self) -> bool {
        self.state.read().unwrap().supports_aps_ack
    }

    pub fn set_supports_aps_ack(&self, supported: bool) {
        self.state.write().unwrap().supports_aps_ack = supported;
    }

    /// Snapshot of this node's devices
    pub fn devices(&self) -> Vec<Arc<NodeDevice>> {
        self.state.read().unwrap().devices.clone()
    }

    pub fn endpoint_description(&self, endpoint: u8) -> Option<EndpointDescription> {
        self.state
            .read()
            .unwrap()
            .endpoint_descriptions
            .get(&endpoint)
            .cloned()
    }

    pub fn replace_endpoint_descriptions(&self, descriptions: HashMap<u8, EndpointDescription>) {
        self.state.write().unwrap().endpoint_descriptions = descriptions;
    }
}

/// One logical capability-bearing device under a node
pub struct NodeDevice {
    pub identifier: DeviceIdentifier,
    state: Mutex<NodeDeviceState>,
}

struct NodeDeviceState {
    endpoints: Vec<u8>,
    capabilities: Vec<Capability>,
    product_information: ProductInformation,
    on_off_state: bool,
    last_on_off_report: Option<Instant>,
}

impl NodeDevice {
    pub(crate) fn new(identifier: DeviceIdentifier) -> Self {
        Self {
            identifier,
            state: Mutex::new(NodeDeviceState {
                endpoints: Vec::new(),
                capabilities: Vec::new(),
                product_information: ProductInformation::default(),
                on_off_state: false,
                last_on_off_report: None,
            }),
        }
    }

    /// Value snapshot exposed to the DA host
    pub fn snapshot(&self) -> Device {
        let state = self.state.lock().unwrap();
        Device {
            identifier: self.identifier,
            capabilities: state.capabilities.clone(),
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.state.lock().unwrap().capabilities.contains(&capability)
    }

    /// Attach a capability; returns false when already present
    pub fn add_capability(&self, capability: Capability) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.capabilities.contains(&capability) {
            false
        } else {
            state.capabilities.push(capability);
            true
        }
    }

    pub fn remove_capability(&self, capability: Capability) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.capabilities.len();
        state.capabilities.retain(|c| *c != capability);
        state.capabilities.len() != before
    }

    pub fn endpoints(&self) -> Vec<u8> {
        self.state.lock().unwrap().endpoints.clone()
    }

    pub fn set_endpoints(&self, endpoints: Vec<u8>) {
        self.state.lock().unwrap().endpoints = endpoints;
    }

    pub fn product_information(&self) -> ProductInformation {
        self.state.lock().unwrap().product_information.clone()
    }

    pub fn update_product_information<F>(&self, update: F)
    where
        F: FnOnce(&mut ProductInformation),
    {
        update(&mut self.state.lock().unwrap().product_information);
    }

    pub fn on_off_state(&self) -> bool {
        self.state.lock().unwrap().on_off_state
    }

    /// Record an observed on/off value; returns true when it changed
    pub fn record_on_off_state(&self, on: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        state.last_on_off_report = Some(Instant::now());
        let changed = state.on_off_state != on;
        state.on_off_state = on;
        changed
    }

    pub fn last_on_off_report(&self) -> Option<Instant> {
        self.state.lock().unwrap().last_on_off_report
    }
}
