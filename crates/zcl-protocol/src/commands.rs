//! ZCL global (profile-wide) command payloads

use crate::attribute::{AttributeDataType, AttributeRecord, AttributeValue, ZclError};

/// Global command identifiers
pub mod global {
    pub const READ_ATTRIBUTES: u8 = 0x00;
    pub const READ_ATTRIBUTES_RESPONSE: u8 = 0x01;
    pub const WRITE_ATTRIBUTES: u8 = 0x02;
    pub const WRITE_ATTRIBUTES_RESPONSE: u8 = 0x04;
    pub const CONFIGURE_REPORTING: u8 = 0x06;
    pub const CONFIGURE_REPORTING_RESPONSE: u8 = 0x07;
    pub const REPORT_ATTRIBUTES: u8 = 0x0A;
    pub const DEFAULT_RESPONSE: u8 = 0x0B;
}

/// Read Attributes command payload: a list of attribute identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAttributes {
    pub attribute_ids: Vec<u16>,
}

impl ReadAttributes {
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.attribute_ids.len() * 2);
        for id in &self.attribute_ids {
            data.extend_from_slice(&id.to_le_bytes());
        }
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self, ZclError> {
        if data.len() % 2 != 0 {
            return Err(ZclError::InvalidFrame(
                "read attributes payload not a multiple of 2".to_string(),
            ));
        }
        let attribute_ids = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(Self { attribute_ids })
    }
}

/// Read Attributes Response payload: a list of attribute records
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAttributesResponse {
    pub records: Vec<AttributeRecord>,
}

impl ReadAttributesResponse {
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for record in &self.records {
            data.extend_from_slice(&record.identifier.to_le_bytes());
            data.push(record.status);
            if record.status == 0 {
                if let Some(value) = &record.value {
                    data.push(value.data_type() as u8);
                    value.serialize_into(&mut data);
                }
            }
        }
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self, ZclError> {
        let mut records = Vec::new();
        let mut idx = 0;

        while idx < data.len() {
            if data.len() < idx + 3 {
                return Err(ZclError::TruncatedValue);
            }
            let identifier = u16::from_le_bytes([data[idx], data[idx + 1]]);
            let status = data[idx + 2];
            idx += 3;

            let value = if status == 0 {
                if data.len() < idx + 1 {
                    return Err(ZclError::TruncatedValue);
                }
                let data_type = AttributeDataType::try_from(data[idx])
                    .map_err(ZclError::UnsupportedDataType)?;
                idx += 1;
                let (value, consumed) = AttributeValue::parse(data_type, &data[idx..])?;
                idx += consumed;
                Some(value)
            } else {
                None
            };

            records.push(AttributeRecord {
                identifier,
                status,
                value,
            });
        }

        Ok(Self { records })
    }
}

/// One attribute reporting configuration record (direction 0x00, reported)
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfiguration {
    pub attribute_id: u16,
    pub data_type: AttributeDataType,
    pub minimum_interval: u16,
    pub maximum_interval: u16,
    /// Omitted on the wire when `None` (discrete data types)
    pub reportable_change: Option<AttributeValue>,
}

/// Configure Reporting command payload
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureReporting {
    pub records: Vec<ReportingConfiguration>,
}

impl ConfigureReporting {
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for record in &self.records {
            data.push(0x00); // direction: node reports to us
            data.extend_from_slice(&record.attribute_id.to_le_bytes());
            data.push(record.data_type as u8);
            data.extend_from_slice(&record.minimum_interval.to_le_bytes());
            data.extend_from_slice(&record.maximum_interval.to_le_bytes());
            if let Some(change) = &record.reportable_change {
                change.serialize_into(&mut data);
            }
        }
        data
    }
}

/// One record of a Configure Reporting Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureReportingResponseRecord {
    pub status: u8,
    pub direction: u8,
    pub attribute_id: u16,
}

/// Configure Reporting Response payload
///
/// A payload holding a single success status (no per-record results) means
/// all records were accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReportingResponse {
    pub records: Vec<ConfigureReportingResponseRecord>,
}

impl ConfigureReportingResponse {
    pub fn parse(data: &[u8]) -> Result<Self, ZclError> {
        if data.len() == 1 {
            return Ok(Self {
                records: vec![ConfigureReportingResponseRecord {
                    status: data[0],
                    direction: 0,
                    attribute_id: 0,
                }],
            });
        }

        if data.len() % 4 != 0 {
            return Err(ZclError::InvalidFrame(
                "configure reporting response length".to_string(),
            ));
        }

        let records = data
            .chunks_exact(4)
            .map(|c| ConfigureReportingResponseRecord {
                status: c[0],
                direction: c[1],
                attribute_id: u16::from_le_bytes([c[2], c[3]]),
            })
            .collect();
        Ok(Self { records })
    }

    /// First non-zero status, if any record failed
    #[must_use]
    pub fn failure(&self) -> Option<u8> {
        self.records.iter().map(|r| r.status).find(|s| *s != 0)
    }
}

/// One attribute report
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReport {
    pub identifier: u16,
    pub value: AttributeValue,
}

/// Report Attributes command payload
#[derive(Debug, Clone, PartialEq)]
pub struct ReportAttributes {
    pub reports: Vec<AttributeReport>,
}

impl ReportAttributes {
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for report in &self.reports {
            data.extend_from_slice(&report.identifier.to_le_bytes());
            data.push(report.value.data_type() as u8);
            report.value.serialize_into(&mut data);
        }
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self, ZclError> {
        let mut reports = Vec::new();
        let mut idx = 0;

        while idx < data.len() {
            if data.len() < idx + 3 {
                return Err(ZclError::TruncatedValue);
            }
            let identifier = u16::from_le_bytes([data[idx], data[idx + 1]]);
            let data_type =
                AttributeDataType::try_from(data[idx + 2]).map_err(ZclError::UnsupportedDataType)?;
            idx += 3;
            let (value, consumed) = AttributeValue::parse(data_type, &data[idx..])?;
            idx += consumed;
            reports.push(AttributeReport { identifier, value });
        }

        Ok(Self { reports })
    }
}

/// Default Response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultResponse {
    pub command_id: u8,
    pub status: u8,
}

impl DefaultResponse {
    pub fn parse(data: &[u8]) -> Result<Self, ZclError> {
        if data.len() < 2 {
            return Err(ZclError::FrameTooShort(data.len()));
        }
        Ok(Self {
            command_id: data[0],
            status: data[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_attributes_serialize() {
        let cmd = ReadAttributes {
            attribute_ids: vec![0x0004, 0x0005],
        };
        assert_eq!(cmd.serialize(), vec![0x04, 0x00, 0x05, 0x00]);
    }

    #[test]
    fn test_read_attributes_response_parse() {
        // 0x0004 success, string "Acme"; 0x0005 failure status 0x86
        let data = vec![
            0x04, 0x00, 0x00, 0x42, 0x04, b'A', b'c', b'm', b'e', //
            0x05, 0x00, 0x86,
        ];
        let response = ReadAttributesResponse::parse(&data).unwrap();
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.records[0].identifier, 0x0004);
        assert_eq!(response.records[0].status, 0);
        assert_eq!(
            response.records[0].value,
            Some(AttributeValue::String("Acme".to_string()))
        );
        assert_eq!(response.records[1].identifier, 0x0005);
        assert_eq!(response.records[1].status, 0x86);
        assert_eq!(response.records[1].value, None);
    }

    #[test]
    fn test_read_attributes_response_round_trip() {
        let response = ReadAttributesResponse {
            records: vec![AttributeRecord {
                identifier: 0x0000,
                status: 0,
                value: Some(AttributeValue::Boolean(true)),
            }],
        };
        let parsed = ReadAttributesResponse::parse(&response.serialize()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_configure_reporting_serialize() {
        let cmd = ConfigureReporting {
            records: vec![ReportingConfiguration {
                attribute_id: 0x0000,
                data_type: AttributeDataType::Boolean,
                minimum_interval: 1,
                maximum_interval: 60,
                reportable_change: Some(AttributeValue::Boolean(true)),
            }],
        };
        assert_eq!(
            cmd.serialize(),
            vec![0x00, 0x00, 0x00, 0x10, 0x01, 0x00, 0x3C, 0x00, 0x01]
        );
    }

    #[test]
    fn test_configure_reporting_response_single_status() {
        let response = ConfigureReportingResponse::parse(&[0x00]).unwrap();
        assert_eq!(response.failure(), None);

        let response = ConfigureReportingResponse::parse(&[0x8C]).unwrap();
        assert_eq!(response.failure(), Some(0x8C));
    }

    #[test]
    fn test_report_attributes_parse() {
        let data = vec![0x00, 0x00, 0x10, 0x01];
        let report = ReportAttributes::parse(&data).unwrap();
        assert_eq!(report.reports.len(), 1);
        assert_eq!(report.reports[0].identifier, 0x0000);
        assert_eq!(report.reports[0].value, AttributeValue::Boolean(true));
    }

    #[test]
    fn test_default_response_parse() {
        let response = DefaultResponse::parse(&[0x01, 0x00]).unwrap();
        assert_eq!(response.command_id, 0x01);
        assert_eq!(response.status, 0x00);
    }
}
