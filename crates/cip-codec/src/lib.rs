// cip-codec: pure encode/decode for EtherNet/IP + CIP explicit messaging —
// encapsulation framing, CPF, Read/Write Tag Service, and Identity Object
// parsing. No I/O; gw-core drives the socket and owns the session lifecycle.

#![forbid(unsafe_code)]

mod address;
mod cip;
mod cpf;
mod encapsulation;
mod error;
mod identity;

pub use address::parse_address;
pub use cip::{
    build_read_tag_request, build_write_tag_request, encode_epath, parse_read_tag_response,
    parse_write_tag_response, ReadTagResponse, SERVICE_READ_TAG, SERVICE_WRITE_TAG,
};
pub use cpf::{unwrap_unconnected, wrap_unconnected};
pub use encapsulation::{
    decode, encode, register_session_payload, Command, EncapsulationMessage, DEFAULT_PORT,
    HEADER_LEN,
};
pub use error::CodecError;
pub use identity::parse_identity;
