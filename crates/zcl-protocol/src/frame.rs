//! ZCL frame header codec

use crate::attribute::ZclError;

/// Minimum frame size: frame control(1) + sequence(1) + command(1)
pub const MIN_FRAME_SIZE: usize = 3;

/// ZCL frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Global = 0x00,
    ClusterSpecific = 0x01,
}

/// ZCL frame direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    ClientToServer = 0x00,
    ServerToClient = 0x01,
}

/// A ZCL frame as carried in an APS payload
///
/// Frame format:
/// ```text
/// [Frame Control: 1 byte]
///   bits 0-1: frame type (global / cluster specific)
///   bit 2:    manufacturer specific
///   bit 3:    direction
///   bit 4:    disable default response
/// [Manufacturer Code: 2 bytes LE] (only when manufacturer specific)
/// [Transaction Sequence: 1 byte]
/// [Command ID: 1 byte]
/// [Payload: variable]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub direction: Direction,
    pub manufacturer: Option<u16>,
    pub disable_default_response: bool,
    pub transaction_sequence: u8,
    pub command_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a global (profile-wide) command frame
    #[must_use]
    pub fn global(
        direction: Direction,
        manufacturer: Option<u16>,
        transaction_sequence: u8,
        command_id: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            frame_type: FrameType::Global,
            direction,
            manufacturer,
            disable_default_response: false,
            transaction_sequence,
            command_id,
            payload,
        }
    }

    /// Build a cluster-local command frame
    #[must_use]
    pub fn cluster_specific(
        direction: Direction,
        manufacturer: Option<u16>,
        transaction_sequence: u8,
        command_id: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            frame_type: FrameType::ClusterSpecific,
            direction,
            manufacturer,
            disable_default_response: false,
            transaction_sequence,
            command_id,
            payload,
        }
    }

    /// Serialize frame to bytes (ready to be carried as an APS payload)
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut control = self.frame_type as u8;
        if self.manufacturer.is_some() {
            control |= 0x04;
        }
        control |= (self.direction as u8) << 3;
        if self.disable_default_response {
            control |= 0x10;
        }

        let mut data = Vec::with_capacity(5 + self.payload.len());
        data.push(control);
        if let Some(code) = self.manufacturer {
            data.extend_from_slice(&code.to_le_bytes());
        }
        data.push(self.transaction_sequence);
        data.push(self.command_id);
        data.extend_from_slice(&self.payload);
        data
    }

    /// Deserialize frame from an APS payload
    pub fn deserialize(data: &[u8]) -> Result<Self, ZclError> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(ZclError::FrameTooShort(data.len()));
        }

        let control = data[0];
        let frame_type = match control & 0x03 {
            0x00 => FrameType::Global,
            0x01 => FrameType::ClusterSpecific,
            other => {
                return Err(ZclError::InvalidFrame(format!(
                    "unknown frame type bits: {other:#04x}"
                )))
            }
        };
        let manufacturer_specific = (control & 0x04) != 0;
        let direction = if (control & 0x08) != 0 {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        };
        let disable_default_response = (control & 0x10) != 0;

        let mut idx = 1;
        let manufacturer = if manufacturer_specific {
            if data.len() < idx + 2 {
                return Err(ZclError::FrameTooShort(data.len()));
            }
            let code = u16::from_le_bytes([data[idx], data[idx + 1]]);
            idx += 2;
            Some(code)
        } else {
            None
        };

        if data.len() < idx + 2 {
            return Err(ZclError::FrameTooShort(data.len()));
        }
        let transaction_sequence = data[idx];
        let command_id = data[idx + 1];
        let payload = data[idx + 2..].to_vec();

        Ok(Self {
            frame_type,
            direction,
            manufacturer,
            disable_default_response,
            transaction_sequence,
            command_id,
            payload,
        })
    }
}
