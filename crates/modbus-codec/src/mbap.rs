//! MBAP (Modbus Application Protocol) header framing and PDU encode/decode
//! for function codes 1, 2, 3, 4, 5, 6, 15, and 16, per MODBUS Application
//! Protocol Specification v1.1b3 §4–6.

use crate::error::CodecError;

const FC_READ_COILS: u8 = 0x01;
const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
const FC_READ_INPUT_REGISTERS: u8 = 0x04;
const FC_WRITE_SINGLE_COIL: u8 = 0x05;
const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
const EXCEPTION_BIT: u8 = 0x80;

/// A request PDU, addressed at the 0-based protocol address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<bool>),
    ReadDiscreteInputs(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
}

/// A server exception code (MODBUS Application Protocol v1.1b3 §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDeviceFailedToRespond,
    Unknown(u8),
}

impl Exception {
    fn from_code(code: u8) -> Exception {
        match code {
            0x01 => Exception::IllegalFunction,
            0x02 => Exception::IllegalDataAddress,
            0x03 => Exception::IllegalDataValue,
            0x04 => Exception::ServerDeviceFailure,
            0x05 => Exception::Acknowledge,
            0x06 => Exception::ServerDeviceBusy,
            0x08 => Exception::MemoryParityError,
            0x0A => Exception::GatewayPathUnavailable,
            0x0B => Exception::GatewayTargetDeviceFailedToRespond,
            other => Exception::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Exception::IllegalFunction => 0x01,
            Exception::IllegalDataAddress => 0x02,
            Exception::IllegalDataValue => 0x03,
            Exception::ServerDeviceFailure => 0x04,
            Exception::Acknowledge => 0x05,
            Exception::ServerDeviceBusy => 0x06,
            Exception::MemoryParityError => 0x08,
            Exception::GatewayPathUnavailable => 0x0A,
            Exception::GatewayTargetDeviceFailedToRespond => 0x0B,
            Exception::Unknown(c) => c,
        }
    }
}

fn function_code(request: &Request) -> u8 {
    match request {
        Request::ReadCoils { .. } => FC_READ_COILS,
        Request::ReadDiscreteInputs { .. } => FC_READ_DISCRETE_INPUTS,
        Request::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
        Request::ReadInputRegisters { .. } => FC_READ_INPUT_REGISTERS,
        Request::WriteSingleCoil { .. } => FC_WRITE_SINGLE_COIL,
        Request::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
        Request::WriteMultipleCoils { .. } => FC_WRITE_MULTIPLE_COILS,
        Request::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
    }
}

fn encode_pdu(request: &Request) -> Vec<u8> {
    let mut pdu = vec![function_code(request)];
    match request {
        Request::ReadCoils { address, quantity }
        | Request::ReadDiscreteInputs { address, quantity }
        | Request::ReadHoldingRegisters { address, quantity }
        | Request::ReadInputRegisters { address, quantity } => {
            pdu.extend_from_slice(&address.to_be_bytes());
            pdu.extend_from_slice(&quantity.to_be_bytes());
        }
        Request::WriteSingleCoil { address, value } => {
            pdu.extend_from_slice(&address.to_be_bytes());
            pdu.extend_from_slice(if *value { &[0xFF, 0x00] } else { &[0x00, 0x00] });
        }
        Request::WriteSingleRegister { address, value } => {
            pdu.extend_from_slice(&address.to_be_bytes());
            pdu.extend_from_slice(&value.to_be_bytes());
        }
        Request::WriteMultipleCoils { address, values } => {
            pdu.extend_from_slice(&address.to_be_bytes());
            pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
            let byte_count = values.len().div_ceil(8);
            pdu.push(byte_count as u8);
            pdu.extend_from_slice(&pack_bits(values));
        }
        Request::WriteMultipleRegisters { address, values } => {
            pdu.extend_from_slice(&address.to_be_bytes());
            pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
            pdu.push((values.len() * 2) as u8);
            for v in values {
                pdu.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    pdu
}

/// Builds a full MBAP + PDU frame for `request`.
pub fn encode_request(transaction_id: u16, unit_id: u8, request: &Request) -> Vec<u8> {
    let pdu = encode_pdu(request);
    let mut frame = Vec::with_capacity(7 + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id, always 0
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(&pdu);
    frame
}

/// Decodes a full MBAP + PDU response frame, matching it against the
/// request that provoked it. Returns `Err(CodecError::Exception { .. })`
/// when the server signalled an exception.
pub fn decode_response(
    frame: &[u8],
    expected_transaction_id: u16,
    expected_unit_id: u8,
    request: &Request,
) -> Result<Response, CodecError> {
    if frame.len() < 8 {
        return Err(CodecError::FrameTooShort {
            expected: 8,
            got: frame.len(),
        });
    }
    let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
    if transaction_id != expected_transaction_id {
        return Err(CodecError::InvalidAddress(format!(
            "transaction id mismatch: expected {expected_transaction_id}, got {transaction_id}"
        )));
    }
    let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
    let unit_id = frame[6];
    if unit_id != expected_unit_id {
        return Err(CodecError::UnitIdMismatch {
            expected: expected_unit_id,
            got: unit_id,
        });
    }
    if frame.len() < 6 + length {
        return Err(CodecError::FrameTooShort {
            expected: 6 + length,
            got: frame.len(),
        });
    }
    let pdu = &frame[7..6 + length];
    decode_pdu(pdu, request)
}

fn decode_pdu(pdu: &[u8], request: &Request) -> Result<Response, CodecError> {
    if pdu.is_empty() {
        return Err(CodecError::FrameTooShort {
            expected: 1,
            got: 0,
        });
    }
    let function = pdu[0];
    let expected_function = function_code(request);
    if function & EXCEPTION_BIT != 0 {
        if pdu.len() < 2 {
            return Err(CodecError::FrameTooShort {
                expected: 2,
                got: pdu.len(),
            });
        }
        return Err(CodecError::Exception {
            function: function & !EXCEPTION_BIT,
            code: Exception::from_code(pdu[1]).code(),
        });
    }
    if function != expected_function {
        return Err(CodecError::InvalidFunctionCode(function));
    }
    match request {
        Request::ReadCoils { quantity, .. } => Ok(Response::ReadCoils(unpack_bits(&pdu[2..], *quantity)?)),
        Request::ReadDiscreteInputs { quantity, .. } => {
            Ok(Response::ReadDiscreteInputs(unpack_bits(&pdu[2..], *quantity)?))
        }
        Request::ReadHoldingRegisters { quantity, .. } => {
            Ok(Response::ReadHoldingRegisters(unpack_registers(&pdu[2..], *quantity)?))
        }
        Request::ReadInputRegisters { quantity, .. } => {
            Ok(Response::ReadInputRegisters(unpack_registers(&pdu[2..], *quantity)?))
        }
        Request::WriteSingleCoil { address, value } => {
            check_echo(pdu, *address, if *value { 0xFF00 } else { 0x0000 })?;
            Ok(Response::WriteSingleCoil {
                address: *address,
                value: *value,
            })
        }
        Request::WriteSingleRegister { address, value } => {
            check_echo(pdu, *address, *value)?;
            Ok(Response::WriteSingleRegister {
                address: *address,
                value: *value,
            })
        }
        Request::WriteMultipleCoils { address, values } => {
            check_echo(pdu, *address, values.len() as u16)?;
            Ok(Response::WriteMultipleCoils {
                address: *address,
                quantity: values.len() as u16,
            })
        }
        Request::WriteMultipleRegisters { address, values } => {
            check_echo(pdu, *address, values.len() as u16)?;
            Ok(Response::WriteMultipleRegisters {
                address: *address,
                quantity: values.len() as u16,
            })
        }
    }
}

fn check_echo(pdu: &[u8], address: u16, value: u16) -> Result<(), CodecError> {
    if pdu.len() < 5 {
        return Err(CodecError::FrameTooShort {
            expected: 5,
            got: pdu.len(),
        });
    }
    let got_address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let got_value = u16::from_be_bytes([pdu[3], pdu[4]]);
    if got_address != address || got_value != value {
        return Err(CodecError::ValueOutOfRange(
            "write response did not echo the request".to_string(),
        ));
    }
    Ok(())
}

fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len().div_ceil(8)];
    for (i, &v) in values.iter().enumerate() {
        if v {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

fn unpack_bits(pdu_tail: &[u8], quantity: u16) -> Result<Vec<bool>, CodecError> {
    let needed = (quantity as usize).div_ceil(8);
    if pdu_tail.len() < needed {
        return Err(CodecError::FrameTooShort {
            expected: needed,
            got: pdu_tail.len(),
        });
    }
    Ok((0..quantity as usize)
        .map(|i| pdu_tail[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

fn unpack_registers(pdu_tail: &[u8], quantity: u16) -> Result<Vec<u16>, CodecError> {
    let needed = quantity as usize * 2;
    if pdu_tail.len() < needed {
        return Err(CodecError::FrameTooShort {
            expected: needed,
            got: pdu_tail.len(),
        });
    }
    Ok((0..quantity as usize)
        .map(|i| u16::from_be_bytes([pdu_tail[i * 2], pdu_tail[i * 2 + 1]]))
        .collect())
}
