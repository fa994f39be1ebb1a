//! Common Packet Format (CIP Volume 2 §2-6): interface handle, timeout, and
//! a list of length-prefixed items wrapping the CIP service request/response.
//!
//! Every item's length is known before any bytes are written, so items are
//! built with explicit offsets up front rather than assembled into a
//! growing buffer and back-patched after the fact.

use crate::error::CodecError;

const ITEM_TYPE_NULL_ADDRESS: u16 = 0x0000;
const ITEM_TYPE_UNCONNECTED_DATA: u16 = 0x00B2;

/// Wraps a CIP service request as a two-item CPF payload: a null address
/// item followed by an unconnected data item carrying `cip_request`.
pub fn wrap_unconnected(cip_request: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + cip_request.len());
    out.extend_from_slice(&0u32.to_le_bytes()); // interface handle
    out.extend_from_slice(&0u16.to_le_bytes()); // timeout
    out.extend_from_slice(&2u16.to_le_bytes()); // item count

    out.extend_from_slice(&ITEM_TYPE_NULL_ADDRESS.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // null address item has no data

    out.extend_from_slice(&ITEM_TYPE_UNCONNECTED_DATA.to_le_bytes());
    out.extend_from_slice(&(cip_request.len() as u16).to_le_bytes());
    out.extend_from_slice(cip_request);
    out
}

/// Extracts the unconnected data item's payload from a CPF buffer, per the
/// format `wrap_unconnected` produces.
pub fn unwrap_unconnected(cpf: &[u8]) -> Result<&[u8], CodecError> {
    if cpf.len() < 8 {
        return Err(CodecError::FrameTooShort {
            expected: 8,
            got: cpf.len(),
        });
    }
    let item_count = u16::from_le_bytes([cpf[6], cpf[7]]);
    let mut offset = 8;
    for _ in 0..item_count {
        if cpf.len() < offset + 4 {
            return Err(CodecError::FrameTooShort {
                expected: offset + 4,
                got: cpf.len(),
            });
        }
        let item_type = u16::from_le_bytes([cpf[offset], cpf[offset + 1]]);
        let item_len = u16::from_le_bytes([cpf[offset + 2], cpf[offset + 3]]) as usize;
        let data_start = offset + 4;
        if cpf.len() < data_start + item_len {
            return Err(CodecError::FrameTooShort {
                expected: data_start + item_len,
                got: cpf.len(),
            });
        }
        if item_type == ITEM_TYPE_UNCONNECTED_DATA {
            return Ok(&cpf[data_start..data_start + item_len]);
        }
        offset = data_start + item_len;
    }
    Err(CodecError::InvalidAddress(
        "CPF contained no unconnected data item".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_and_unwrap_round_trip() {
        let cip = vec![0x4C, 0x02, 0x91, 0x03, b'T', b'a', b'g'];
        let wrapped = wrap_unconnected(&cip);
        let unwrapped = unwrap_unconnected(&wrapped).unwrap();
        assert_eq!(unwrapped, cip.as_slice());
    }

    #[test]
    fn wrap_produces_two_items() {
        let wrapped = wrap_unconnected(&[0x4C]);
        let item_count = u16::from_le_bytes([wrapped[6], wrapped[7]]);
        assert_eq!(item_count, 2);
    }

    #[test]
    fn unwrap_rejects_truncated_item() {
        let mut wrapped = wrap_unconnected(&[0x4C, 0x02]);
        wrapped.truncate(wrapped.len() - 1);
        assert!(unwrap_unconnected(&wrapped).is_err());
    }

    #[test]
    fn unwrap_rejects_missing_data_item() {
        // interface handle + timeout + item count=1 + null address item only
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&ITEM_TYPE_NULL_ADDRESS.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        assert!(unwrap_unconnected(&buf).is_err());
    }
}
