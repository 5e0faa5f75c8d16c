//! ZCL (Zigbee Cluster Library) frame codec
//!
//! This crate implements the framing used above the APS layer: the ZCL
//! frame header, attribute data types and values, and the global
//! (profile-wide) command payloads needed for attribute access and
//! report configuration.

pub mod attribute;
pub mod cluster;
pub mod commands;
pub mod frame;

pub use attribute::{AttributeDataType, AttributeRecord, AttributeValue, ZclError};
pub use cluster::OnOffCommand;
pub use frame::{Direction, Frame, FrameType};
