//! Zigbee device abstraction gateway
//!
//! This crate sits between a radio-level Zigbee provider and a generic
//! device-automation host. It discovers nodes, decomposes them into
//! capability-bearing devices, negotiates clusters, and fans network
//! events out to the capabilities that act on them.

mod bus;
mod communicator;
mod node;
mod poller;
mod retry;
mod store;

pub mod capability;
pub mod device;
pub mod error;
pub mod events;
pub mod gateway;
pub mod provider;

pub use capability::{
    CapabilityRef, DeviceDiscovery, DiscoveryStatus, EnumerateDevice, HasProductInformation, OnOff,
};
pub use device::{Capability, Device, DeviceIdentifier, ProductInformation};
pub use error::GatewayError;
pub use events::Event;
pub use gateway::{ZigbeeGateway, GATEWAY_ENDPOINT};
pub use provider::{
    AdapterNode, ApplicationMessage, EndpointDescription, IeeeAddress, Provider, ProviderError,
    ProviderEvent,
};

#[cfg(test)]
pub(crate) mod testutil;
