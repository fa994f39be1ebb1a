// modbus-codec: pure encode/decode for the Modbus-family register-addressed
// wire protocol — MBAP framing, RTU framing, address parsing, and register
// value packing. No I/O; gw-core drives the socket and owns retry/timeout.

#![forbid(unsafe_code)]

mod address;
mod error;
mod mbap;
mod rtu;
mod types;

pub use address::{format_register_address, parse_address, validate_count, validate_for_write};
pub use error::CodecError;
pub use mbap::{decode_response, encode_request, Exception, Request, Response};
pub use rtu::{crc16, frame, unframe};
pub use types::{decode_registers, encode_registers};
