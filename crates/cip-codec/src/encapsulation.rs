//! EtherNet/IP encapsulation: the 24-byte header every frame carries, and
//! the eight commands defined in CIP Volume 2 §2-3.

use crate::error::CodecError;

pub const HEADER_LEN: usize = 24;
pub const DEFAULT_PORT: u16 = 44818;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Nop = 0x0000,
    ListServices = 0x0004,
    ListIdentity = 0x0063,
    ListInterfaces = 0x0064,
    RegisterSession = 0x0065,
    UnregisterSession = 0x0066,
    SendRrData = 0x006F,
    SendUnitData = 0x0070,
}

impl Command {
    fn from_u16(v: u16) -> Option<Command> {
        Some(match v {
            0x0000 => Command::Nop,
            0x0004 => Command::ListServices,
            0x0063 => Command::ListIdentity,
            0x0064 => Command::ListInterfaces,
            0x0065 => Command::RegisterSession,
            0x0066 => Command::UnregisterSession,
            0x006F => Command::SendRrData,
            0x0070 => Command::SendUnitData,
            _ => return None,
        })
    }
}

/// A decoded encapsulation header plus its trailing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulationMessage {
    pub command: Command,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: [u8; 8],
    pub options: u32,
    pub data: Vec<u8>,
}

/// Builds a full encapsulation frame: 24-byte header (little-endian per
/// CIP Volume 2 §2-3.1) followed by `data`.
pub fn encode(command: Command, session_handle: u32, sender_context: [u8; 8], data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + data.len());
    frame.extend_from_slice(&(command as u16).to_le_bytes());
    frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
    frame.extend_from_slice(&session_handle.to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes()); // status, always 0 on a request
    frame.extend_from_slice(&sender_context);
    frame.extend_from_slice(&0u32.to_le_bytes()); // options, reserved
    frame.extend_from_slice(data);
    frame
}

/// Decodes a full encapsulation frame, returning the message and rejecting
/// truncated frames or a nonzero status.
pub fn decode(frame: &[u8]) -> Result<EncapsulationMessage, CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::FrameTooShort {
            expected: HEADER_LEN,
            got: frame.len(),
        });
    }
    let command_raw = u16::from_le_bytes([frame[0], frame[1]]);
    let command = Command::from_u16(command_raw).ok_or(CodecError::UnexpectedCommand {
        expected: 0,
        got: command_raw,
    })?;
    let length = u16::from_le_bytes([frame[2], frame[3]]) as usize;
    let session_handle = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let status = u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);
    let mut sender_context = [0u8; 8];
    sender_context.copy_from_slice(&frame[12..20]);
    let options = u32::from_le_bytes([frame[20], frame[21], frame[22], frame[23]]);

    if status != 0 {
        return Err(CodecError::EncapsulationStatus(status));
    }
    if frame.len() < HEADER_LEN + length {
        return Err(CodecError::FrameTooShort {
            expected: HEADER_LEN + length,
            got: frame.len(),
        });
    }
    Ok(EncapsulationMessage {
        command,
        session_handle,
        status,
        sender_context,
        options,
        data: frame[HEADER_LEN..HEADER_LEN + length].to_vec(),
    })
}

/// Builds the 4-byte Register Session payload: protocol version 1, no
/// option flags (CIP Volume 2 §5-4.2).
pub fn register_session_payload() -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&1u16.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}
