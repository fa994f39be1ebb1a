use std::error;
use std::fmt;

/// Errors raised while parsing addresses or encoding/decoding Modbus frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    InvalidAddress(String),
    InvalidFunctionCode(u8),
    CountOutOfRange { requested: u16, max: u16 },
    ValueOutOfRange(String),
    FrameTooShort { expected: usize, got: usize },
    ChecksumMismatch,
    Exception { function: u8, code: u8 },
    UnitIdMismatch { expected: u8, got: u8 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidAddress(s) => write!(f, "invalid modbus address: {s}"),
            CodecError::InvalidFunctionCode(fc) => write!(f, "invalid function code: {fc:#04x}"),
            CodecError::CountOutOfRange { requested, max } => {
                write!(f, "count {requested} exceeds maximum {max}")
            }
            CodecError::ValueOutOfRange(s) => write!(f, "value out of range: {s}"),
            CodecError::FrameTooShort { expected, got } => {
                write!(f, "frame too short: expected at least {expected} bytes, got {got}")
            }
            CodecError::ChecksumMismatch => write!(f, "checksum mismatch"),
            CodecError::Exception { function, code } => {
                write!(f, "modbus exception on function {function:#04x}: code {code}")
            }
            CodecError::UnitIdMismatch { expected, got } => {
                write!(f, "unit id mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl error::Error for CodecError {}
