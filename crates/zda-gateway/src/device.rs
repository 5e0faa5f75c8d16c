//! Public device representation
//!
//! Devices handed to the DA host are value-only snapshots. All queries
//! that depend on gateway state go through the gateway or a capability,
//! passing the snapshot back in.

use crate::provider::IeeeAddress;
use serde::{Deserialize, Serialize};

/// Capability flags a device may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DeviceDiscovery,
    EnumerateDevice,
    HasProductInformation,
    OnOff,
}

/// Stable identifier of one logical device
///
/// A node exposes one or more devices; the sub-identifier distinguishes
/// them under the node's IEEE address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    pub ieee_address: IeeeAddress,
    pub sub_identifier: u8,
}

impl std::fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ieee_address, self.sub_identifier)
    }
}

/// A device snapshot as exposed to the DA host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub identifier: DeviceIdentifier,
    pub capabilities: Vec<Capability>,
}

impl Device {
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Product information present-bits
pub mod present {
    pub const MANUFACTURER: u8 = 0x01;
    pub const NAME: u8 = 0x02;
}

/// Product information read from a node's Basic cluster
///
/// Fields are meaningful only when their bit is set in `present`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInformation {
    pub manufacturer: String,
    pub name: String,
    pub present: u8,
}

impl ProductInformation {
    #[must_use]
    pub fn has_manufacturer(&self) -> bool {
        self.present & present::MANUFACTURER != 0
    }

    #[must_use]
    pub fn has_name(&self) -> bool {
        self.present & present::NAME != 0
    }
}
