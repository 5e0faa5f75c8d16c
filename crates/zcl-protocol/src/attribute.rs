//! ZCL attribute data types, values and records

use thiserror::Error;

/// Codec errors
#[derive(Error, Debug)]
pub enum ZclError {
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unsupported data type: {0:#04X}")]
    UnsupportedDataType(u8),

    #[error("Truncated attribute value")]
    TruncatedValue,

    #[error("Unexpected command: {0:#04X}")]
    UnexpectedCommand(u8),
}

/// ZCL attribute data type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeDataType {
    NoData = 0x00,
    Data8 = 0x08,
    Boolean = 0x10,
    Bitmap8 = 0x18,
    Bitmap16 = 0x19,
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint32 = 0x23,
    Int8 = 0x28,
    Int16 = 0x29,
    Int32 = 0x2B,
    Enum8 = 0x30,
    Enum16 = 0x31,
    CharString = 0x42,
}

impl TryFrom<u8> for AttributeDataType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(AttributeDataType::NoData),
            0x08 => Ok(AttributeDataType::Data8),
            0x10 => Ok(AttributeDataType::Boolean),
            0x18 => Ok(AttributeDataType::Bitmap8),
            0x19 => Ok(AttributeDataType::Bitmap16),
            0x20 => Ok(AttributeDataType::Uint8),
            0x21 => Ok(AttributeDataType::Uint16),
            0x23 => Ok(AttributeDataType::Uint32),
            0x28 => Ok(AttributeDataType::Int8),
            0x29 => Ok(AttributeDataType::Int16),
            0x2B => Ok(AttributeDataType::Int32),
            0x30 => Ok(AttributeDataType::Enum8),
            0x31 => Ok(AttributeDataType::Enum16),
            0x42 => Ok(AttributeDataType::CharString),
            _ => Err(value),
        }
    }
}

/// A decoded attribute value, tagged by its wire data type
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    None,
    Data8(u8),
    Boolean(bool),
    Bitmap8(u8),
    Bitmap16(u16),
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Signed8(i8),
    Signed16(i16),
    Signed32(i32),
    Enum8(u8),
    Enum16(u16),
    String(String),
}

impl AttributeValue {
    /// Wire data type for this value
    #[must_use]
    pub fn data_type(&self) -> AttributeDataType {
        match self {
            AttributeValue::None => AttributeDataType::NoData,
            AttributeValue::Data8(_) => AttributeDataType::Data8,
            AttributeValue::Boolean(_) => AttributeDataType::Boolean,
            AttributeValue::Bitmap8(_) => AttributeDataType::Bitmap8,
            AttributeValue::Bitmap16(_) => AttributeDataType::Bitmap16,
            AttributeValue::Unsigned8(_) => AttributeDataType::Uint8,
            AttributeValue::Unsigned16(_) => AttributeDataType::Uint16,
            AttributeValue::Unsigned32(_) => AttributeDataType::Uint32,
            AttributeValue::Signed8(_) => AttributeDataType::Int8,
            AttributeValue::Signed16(_) => AttributeDataType::Int16,
            AttributeValue::Signed32(_) => AttributeDataType::Int32,
            AttributeValue::Enum8(_) => AttributeDataType::Enum8,
            AttributeValue::Enum16(_) => AttributeDataType::Enum16,
            AttributeValue::String(_) => AttributeDataType::CharString,
        }
    }

    /// Parse a value of `data_type` from `data`, returning the value and
    /// the number of bytes consumed.
    pub fn parse(data_type: AttributeDataType, data: &[u8]) -> Result<(Self, usize), ZclError> {
        fn need(data: &[u8], n: usize) -> Result<(), ZclError> {
            if data.len() < n {
                Err(ZclError::TruncatedValue)
            } else {
                Ok(())
            }
        }

        match data_type {
            AttributeDataType::NoData => Ok((AttributeValue::None, 0)),
            AttributeDataType::Data8 => {
                need(data, 1)?;
                Ok((AttributeValue::Data8(data[0]), 1))
            }
            AttributeDataType::Boolean => {
                need(data, 1)?;
                Ok((AttributeValue::Boolean(data[0] != 0), 1))
            }
            AttributeDataType::Bitmap8 => {
                need(data, 1)?;
                Ok((AttributeValue::Bitmap8(data[0]), 1))
            }
            AttributeDataType::Bitmap16 => {
                need(data, 2)?;
                Ok((
                    AttributeValue::Bitmap16(u16::from_le_bytes([data[0], data[1]])),
                    2,
                ))
            }
            AttributeDataType::Uint8 => {
                need(data, 1)?;
                Ok((AttributeValue::Unsigned8(data[0]), 1))
            }
            AttributeDataType::Uint16 => {
                need(data, 2)?;
                Ok((
                    AttributeValue::Unsigned16(u16::from_le_bytes([data[0], data[1]])),
                    2,
                ))
            }
            AttributeDataType::Uint32 => {
                need(data, 4)?;
                Ok((
                    AttributeValue::Unsigned32(u32::from_le_bytes([
                        data[0], data[1], data[2], data[3],
                    ])),
                    4,
                ))
            }
            AttributeDataType::Int8 => {
                need(data, 1)?;
                Ok((AttributeValue::Signed8(data[0] as i8), 1))
            }
            AttributeDataType::Int16 => {
                need(data, 2)?;
                Ok((
                    AttributeValue::Signed16(i16::from_le_bytes([data[0], data[1]])),
                    2,
                ))
            }
            AttributeDataType::Int32 => {
                need(data, 4)?;
                Ok((
                    AttributeValue::Signed32(i32::from_le_bytes([
                        data[0], data[1], data[2], data[3],
                    ])),
                    4,
                ))
            }
            AttributeDataType::Enum8 => {
                need(data, 1)?;
                Ok((AttributeValue::Enum8(data[0]), 1))
            }
            AttributeDataType::Enum16 => {
                need(data, 2)?;
                Ok((
                    AttributeValue::Enum16(u16::from_le_bytes([data[0], data[1]])),
                    2,
                ))
            }
            AttributeDataType::CharString => {
                need(data, 1)?;
                let len = data[0] as usize;
                // 0xFF marks an invalid string on the wire
                if data[0] == 0xFF {
                    return Ok((AttributeValue::String(String::new()), 1));
                }
                need(data, 1 + len)?;
                let text = String::from_utf8_lossy(&data[1..1 + len]).into_owned();
                Ok((AttributeValue::String(text), 1 + len))
            }
        }
    }

    /// Append this value's wire representation (without the data type tag)
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            AttributeValue::None => {}
            AttributeValue::Data8(v)
            | AttributeValue::Bitmap8(v)
            | AttributeValue::Unsigned8(v)
            | AttributeValue::Enum8(v) => out.push(*v),
            AttributeValue::Boolean(v) => out.push(u8::from(*v)),
            AttributeValue::Bitmap16(v)
            | AttributeValue::Unsigned16(v)
            | AttributeValue::Enum16(v) => out.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Unsigned32(v) => out.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Signed8(v) => out.push(*v as u8),
            AttributeValue::Signed16(v) => out.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Signed32(v) => out.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::String(s) => {
                let len = s.len().min(254) as u8;
                out.push(len);
                out.extend_from_slice(&s.as_bytes()[..len as usize]);
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// One record of a Read Attributes Response
///
/// `value` is populated only when `status` is zero (success).
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    pub identifier: u16,
    pub status: u8,
    pub value: Option<AttributeValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boolean() {
        let (value, consumed) = AttributeValue::parse(AttributeDataType::Boolean, &[0x01]).unwrap();
        assert_eq!(value, AttributeValue::Boolean(true));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_parse_string() {
        let data = [0x04, b'A', b'c', b'm', b'e', 0xAA];
        let (value, consumed) = AttributeValue::parse(AttributeDataType::CharString, &data).unwrap();
        assert_eq!(value, AttributeValue::String("Acme".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_invalid_string_marker() {
        let (value, consumed) = AttributeValue::parse(AttributeDataType::CharString, &[0xFF]).unwrap();
        assert_eq!(value, AttributeValue::String(String::new()));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_parse_truncated_uint16() {
        let result = AttributeValue::parse(AttributeDataType::Uint16, &[0x01]);
        assert!(matches!(result, Err(ZclError::TruncatedValue)));
    }

    #[test]
    fn test_string_round_trip() {
        let value = AttributeValue::String("Bulb1".to_string());
        let mut out = Vec::new();
        value.serialize_into(&mut out);
        let (parsed, consumed) = AttributeValue::parse(AttributeDataType::CharString, &out).unwrap();
        assert_eq!(parsed, value);
        assert_eq!(consumed, out.len());
    }
}
