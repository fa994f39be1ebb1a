//! CIP service framing: Read Tag Service (0x4C) and Write Tag Service
//! (0x4D), EPATH encoding, and the small slice of CIP data type codes
//! (Volume 1 Appendix C) this gateway understands.

use crate::error::CodecError;
use gw_protocol::{DataType, ParsedAddress};

pub const SERVICE_READ_TAG: u8 = 0x4C;
pub const SERVICE_WRITE_TAG: u8 = 0x4D;
const REPLY_BIT: u8 = 0x80;

/// CIP elementary data type codes this gateway reads and writes.
fn cip_type_code(data_type: DataType) -> Result<u16, CodecError> {
    Ok(match data_type {
        DataType::Bool => 0x00C1,
        DataType::Int16 => 0x00C3,
        DataType::Int32 => 0x00C4,
        DataType::Int64 => 0x00C5,
        DataType::UInt16 => 0x00C7,
        DataType::UInt32 => 0x00C8,
        DataType::UInt64 => 0x00C9,
        DataType::Float32 => 0x00CA,
        DataType::Float64 => 0x00CB,
        DataType::Str => {
            return Err(CodecError::InvalidAddress(
                "string tags are not supported over CIP explicit messaging".to_string(),
            ))
        }
    })
}

fn data_type_from_cip_code(code: u16) -> Result<DataType, CodecError> {
    Ok(match code {
        0x00C1 => DataType::Bool,
        0x00C3 => DataType::Int16,
        0x00C4 => DataType::Int32,
        0x00C5 => DataType::Int64,
        0x00C7 => DataType::UInt16,
        0x00C8 => DataType::UInt32,
        0x00C9 => DataType::UInt64,
        0x00CA => DataType::Float32,
        0x00CB => DataType::Float64,
        other => {
            return Err(CodecError::InvalidAddress(format!(
                "unrecognized CIP data type code 0x{other:04X}"
            )))
        }
    })
}

/// Encodes a `ParsedAddress` as an EPATH (CIP Volume 1 §C-1).
pub fn encode_epath(address: &ParsedAddress) -> Result<Vec<u8>, CodecError> {
    match address {
        ParsedAddress::Symbolic { tag_name, .. } => {
            let mut path = vec![0x91u8, tag_name.len() as u8];
            path.extend_from_slice(tag_name.as_bytes());
            if tag_name.len() % 2 != 0 {
                path.push(0);
            }
            Ok(path)
        }
        ParsedAddress::Instance {
            class_id,
            instance_id,
            attribute_id,
        } => {
            let mut path = Vec::new();
            encode_logical_segment(&mut path, 0x20, 0x21, *class_id as u32);
            encode_logical_segment(&mut path, 0x24, 0x25, *instance_id);
            encode_logical_segment(&mut path, 0x30, 0x31, *attribute_id as u32);
            Ok(path)
        }
        ParsedAddress::Register { .. } => Err(CodecError::InvalidAddress(
            "register addresses are not valid CIP EPATH segments".to_string(),
        )),
    }
}

fn encode_logical_segment(path: &mut Vec<u8>, short_type: u8, long_type: u8, value: u32) {
    if value <= 0xFF {
        path.push(short_type);
        path.push(value as u8);
    } else {
        path.push(long_type);
        path.push(0); // pad
        path.extend_from_slice(&(value as u16).to_le_bytes());
    }
}

/// Builds a Read Tag Service (0x4C) request for `element_count` elements.
pub fn build_read_tag_request(address: &ParsedAddress, element_count: u16) -> Result<Vec<u8>, CodecError> {
    let epath = encode_epath(address)?;
    let mut request = vec![SERVICE_READ_TAG, (epath.len() / 2) as u8];
    request.extend_from_slice(&epath);
    request.extend_from_slice(&element_count.to_le_bytes());
    Ok(request)
}

/// The decoded body of a successful Read Tag Service response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadTagResponse {
    pub data_type: DataType,
    pub value_bytes: Vec<u8>,
}

/// Parses a Read Tag Service response, checking the general status first.
pub fn parse_read_tag_response(response: &[u8]) -> Result<ReadTagResponse, CodecError> {
    check_general_status(response, SERVICE_READ_TAG)?;
    if response.len() < 6 {
        return Err(CodecError::FrameTooShort {
            expected: 6,
            got: response.len(),
        });
    }
    let additional_status_size = response[3] as usize;
    let data_start = 4 + additional_status_size * 2;
    if response.len() < data_start + 2 {
        return Err(CodecError::FrameTooShort {
            expected: data_start + 2,
            got: response.len(),
        });
    }
    let type_code = u16::from_le_bytes([response[data_start], response[data_start + 1]]);
    let data_type = data_type_from_cip_code(type_code)?;
    Ok(ReadTagResponse {
        data_type,
        value_bytes: response[data_start + 2..].to_vec(),
    })
}

/// Builds a Write Tag Service (0x4D) request.
pub fn build_write_tag_request(
    address: &ParsedAddress,
    data_type: DataType,
    element_count: u16,
    value_bytes: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let epath = encode_epath(address)?;
    let type_code = cip_type_code(data_type)?;
    let mut request = vec![SERVICE_WRITE_TAG, (epath.len() / 2) as u8];
    request.extend_from_slice(&epath);
    request.extend_from_slice(&type_code.to_le_bytes());
    request.extend_from_slice(&element_count.to_le_bytes());
    request.extend_from_slice(value_bytes);
    Ok(request)
}

/// Confirms a Write Tag Service response carries a success status.
pub fn parse_write_tag_response(response: &[u8]) -> Result<(), CodecError> {
    check_general_status(response, SERVICE_WRITE_TAG)
}

fn check_general_status(response: &[u8], expected_service: u8) -> Result<(), CodecError> {
    if response.len() < 4 {
        return Err(CodecError::FrameTooShort {
            expected: 4,
            got: response.len(),
        });
    }
    let service = response[0] & !REPLY_BIT;
    if service != expected_service {
        return Err(CodecError::InvalidAddress(format!(
            "unexpected service reply: 0x{service:02X}"
        )));
    }
    let general_status = response[2];
    if general_status != 0x00 {
        let extended_size = response[3] as usize;
        let extended = response
            .get(4..4 + extended_size * 2)
            .unwrap_or_default()
            .to_vec();
        return Err(CodecError::CipGeneralStatus {
            status: general_status,
            extended,
        });
    }
    Ok(())
}
