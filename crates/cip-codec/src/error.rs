use std::error;
use std::fmt;

/// Errors raised while parsing addresses or encoding/decoding CIP/EtherNet-IP
/// frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    InvalidAddress(String),
    FrameTooShort { expected: usize, got: usize },
    EncapsulationStatus(u32),
    CipGeneralStatus { status: u8, extended: Vec<u8> },
    UnexpectedCommand { expected: u16, got: u16 },
    NoSession,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidAddress(s) => write!(f, "invalid CIP address: {s}"),
            CodecError::FrameTooShort { expected, got } => {
                write!(f, "frame too short: expected at least {expected} bytes, got {got}")
            }
            CodecError::EncapsulationStatus(status) => {
                write!(f, "encapsulation status error: 0x{status:08X}")
            }
            CodecError::CipGeneralStatus { status, extended } => {
                write!(f, "CIP general status 0x{status:02X}, extended {extended:02X?}")
            }
            CodecError::UnexpectedCommand { expected, got } => write!(
                f,
                "unexpected encapsulation command: expected 0x{expected:04X}, got 0x{got:04X}"
            ),
            CodecError::NoSession => write!(f, "no registered session"),
        }
    }
}

impl error::Error for CodecError {}
