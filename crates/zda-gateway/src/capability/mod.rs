//! Capability implementations
//!
//! Each capability is a typed behavior attached to devices as observed
//! clusters warrant. The gateway hands out typed references; there is
//! no downcasting.

pub mod device_discovery;
pub mod enumerate_device;
pub mod on_off;
pub mod product_information;

pub use device_discovery::{DeviceDiscovery, DiscoveryStatus};
pub use enumerate_device::EnumerateDevice;
pub use on_off::OnOff;
pub use product_information::HasProductInformation;

use std::sync::Arc;

/// Typed handle to a capability implementation
pub enum CapabilityRef {
    DeviceDiscovery(Arc<DeviceDiscovery>),
    EnumerateDevice(Arc<EnumerateDevice>),
    HasProductInformation(Arc<HasProductInformation>),
    OnOff(Arc<OnOff>),
}
