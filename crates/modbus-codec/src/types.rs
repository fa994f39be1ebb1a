//! Conversions between `RawValue` and the register/bit words Modbus moves
//! on the wire. Multi-register values are packed big-endian, most
//! significant register first, per MODBUS Application Protocol v1.1b3 §6.

use crate::error::CodecError;
use gw_protocol::{DataType, RawValue};

/// Packs a value into 16-bit registers, big-endian word order.
pub fn encode_registers(raw: &RawValue) -> Result<Vec<u16>, CodecError> {
    match raw {
        RawValue::I16(v) => Ok(vec![*v as u16]),
        RawValue::U16(v) => Ok(vec![*v]),
        RawValue::I32(v) => Ok(split_u32(*v as u32)),
        RawValue::U32(v) => Ok(split_u32(*v)),
        RawValue::F32(v) => Ok(split_u32(v.to_bits())),
        RawValue::I64(v) => Ok(split_u64(*v as u64)),
        RawValue::U64(v) => Ok(split_u64(*v)),
        RawValue::F64(v) => Ok(split_u64(v.to_bits())),
        RawValue::Bool(_) => Err(CodecError::ValueOutOfRange(
            "bool values are coils, not registers".to_string(),
        )),
        RawValue::Str(_) => Err(CodecError::ValueOutOfRange(
            "strings are not representable as modbus registers".to_string(),
        )),
    }
}

/// Unpacks `regs` into a `RawValue` of the requested `data_type`.
pub fn decode_registers(data_type: DataType, regs: &[u16]) -> Result<RawValue, CodecError> {
    let width = data_type.register_width().ok_or_else(|| {
        CodecError::ValueOutOfRange(format!("{data_type:?} has no fixed register width"))
    })?;
    if regs.len() != width as usize {
        return Err(CodecError::FrameTooShort {
            expected: width as usize,
            got: regs.len(),
        });
    }
    Ok(match data_type {
        DataType::Bool => RawValue::Bool(regs[0] != 0),
        DataType::Int16 => RawValue::I16(regs[0] as i16),
        DataType::UInt16 => RawValue::U16(regs[0]),
        DataType::Int32 => RawValue::I32(join_u32(regs) as i32),
        DataType::UInt32 => RawValue::U32(join_u32(regs)),
        DataType::Float32 => RawValue::F32(f32::from_bits(join_u32(regs))),
        DataType::Int64 => RawValue::I64(join_u64(regs) as i64),
        DataType::UInt64 => RawValue::U64(join_u64(regs)),
        DataType::Float64 => RawValue::F64(f64::from_bits(join_u64(regs))),
        DataType::Str => unreachable!("register_width() returns None for Str"),
    })
}

fn split_u32(v: u32) -> Vec<u16> {
    vec![(v >> 16) as u16, v as u16]
}

fn join_u32(regs: &[u16]) -> u32 {
    ((regs[0] as u32) << 16) | regs[1] as u32
}

fn split_u64(v: u64) -> Vec<u16> {
    vec![
        (v >> 48) as u16,
        (v >> 32) as u16,
        (v >> 16) as u16,
        v as u16,
    ]
}

fn join_u64(regs: &[u16]) -> u64 {
    (regs[0] as u64) << 48
        | (regs[1] as u64) << 32
        | (regs[2] as u64) << 16
        | regs[3] as u64
}
