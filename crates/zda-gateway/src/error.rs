//! Gateway error taxonomy

use crate::provider::ProviderError;
use thiserror::Error;

/// Errors surfaced by gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Cancellation or timeout; never logged as an error
    #[error("Context expired")]
    ContextExpired,

    /// Discovery operations only accept the gateway's own device
    #[error("Device is not the gateway self device")]
    NotSelfDevice,

    /// Operation on a device this gateway does not own
    #[error("Device does not belong to this gateway")]
    DeviceNotOnGateway,

    /// Operation requiring a capability the device lacks
    #[error("Device does not have the requested capability")]
    DoesNotHaveCapability,

    /// Recoverable provider failure; retried under the retry contract
    #[error("Provider error: {0}")]
    Provider(String),

    /// Malformed ZCL traffic
    #[error("Codec error: {0}")]
    Codec(#[from] zcl_protocol::ZclError),

    /// A node rejected a ZCL request
    #[error("Node rejected request with status {0:#04X}")]
    CommandRejected(u8),
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ContextExpired => GatewayError::ContextExpired,
            ProviderError::Network(message) => GatewayError::Provider(message),
        }
    }
}
