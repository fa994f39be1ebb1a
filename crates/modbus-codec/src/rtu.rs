//! RTU framing: unit id + PDU + CRC16-Modbus, for serial-gatewayed devices
//! reached through a TCP-to-serial bridge rather than native MBAP.

use crate::error::CodecError;

/// Computes the CRC16-Modbus checksum over `data`, polynomial 0xA001,
/// initial value 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Wraps a unit id + PDU in an RTU frame, appending the little-endian CRC.
pub fn frame(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pdu.len() + 3);
    out.push(unit_id);
    out.extend_from_slice(pdu);
    let crc = crc16(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Validates and strips an RTU frame, returning `(unit_id, pdu)`.
pub fn unframe(raw: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if raw.len() < 4 {
        return Err(CodecError::FrameTooShort {
            expected: 4,
            got: raw.len(),
        });
    }
    let (body, crc_bytes) = raw.split_at(raw.len() - 2);
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let actual = crc16(body);
    if expected != actual {
        return Err(CodecError::ChecksumMismatch);
    }
    Ok((body[0], &body[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_known_vector() {
        // 01 03 00 00 00 0A -> CRC 0xC5CD (per the MODBUS spec's worked example)
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16(&frame), 0xCDC5);
    }

    #[test]
    fn frame_and_unframe_round_trip() {
        let pdu = [0x03, 0x00, 0x00, 0x00, 0x02];
        let framed = frame(0x11, &pdu);
        let (unit_id, unframed_pdu) = unframe(&framed).unwrap();
        assert_eq!(unit_id, 0x11);
        assert_eq!(unframed_pdu, &pdu);
    }

    #[test]
    fn unframe_rejects_bad_checksum() {
        let mut framed = frame(0x01, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        assert_eq!(unframe(&framed), Err(CodecError::ChecksumMismatch));
    }

    #[test]
    fn unframe_rejects_short_buffer() {
        assert!(unframe(&[0x01, 0x02]).is_err());
    }
}
