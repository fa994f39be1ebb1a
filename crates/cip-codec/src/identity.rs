//! Identity Object parsing from a List Identity response's CPF item data,
//! per CIP Volume 1 §5-2.

use crate::error::CodecError;
use gw_protocol::IdentitySnapshot;

/// Parses the Identity Object fields out of a List Identity response item.
/// Layout: encapsulation protocol version (u16, ignored here) is expected
/// to have already been stripped by the caller; `data` starts at the
/// socket address structure, which this parser also skips.
pub fn parse_identity(data: &[u8]) -> Result<IdentitySnapshot, CodecError> {
    // socket address structure: sin_family(2) + sin_port(2) + sin_addr(4) + sin_zero(8) = 16 bytes
    const SOCKADDR_LEN: usize = 16;
    if data.len() < SOCKADDR_LEN + 2 {
        return Err(CodecError::FrameTooShort {
            expected: SOCKADDR_LEN + 2,
            got: data.len(),
        });
    }
    let body = &data[SOCKADDR_LEN..];
    // body: protocol_version(2) vendor_id(2) device_type(2) product_code(2)
    //       revision(2) status(2) serial_number(4) product_name_len(1) product_name(n) state(1)
    if body.len() < 2 + 2 + 2 + 2 + 2 + 2 + 4 + 1 {
        return Err(CodecError::FrameTooShort {
            expected: 17,
            got: body.len(),
        });
    }
    let vendor_id = u16::from_le_bytes([body[2], body[3]]);
    let device_type = u16::from_le_bytes([body[4], body[5]]);
    let product_code = u16::from_le_bytes([body[6], body[7]]);
    let revision = (body[8], body[9]);
    let serial_number = u32::from_le_bytes([body[12], body[13], body[14], body[15]]);
    let name_len = body[16] as usize;
    if body.len() < 17 + name_len {
        return Err(CodecError::FrameTooShort {
            expected: 17 + name_len,
            got: body.len(),
        });
    }
    let product_name = String::from_utf8_lossy(&body[17..17 + name_len]).into_owned();

    Ok(IdentitySnapshot {
        vendor_id: Some(vendor_id),
        device_type: Some(device_type),
        product_code: Some(product_code),
        revision: Some(revision),
        serial_number: Some(serial_number),
        product_name: Some(product_name),
    })
}
