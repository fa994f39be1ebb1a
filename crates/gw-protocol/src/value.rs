use crate::DataType;
use serde::{Deserialize, Serialize};

/// Provenance of a `Value`. Good values came from a successful response
/// within the current session; stale on cache TTL expiry; bad on protocol
/// error; uncertain on partial frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Bad,
    Stale,
    Uncertain,
}

/// The decoded payload of a `Value`, one variant per `DataType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawValue {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl RawValue {
    /// The zero value for `data_type`. Used to fill the `raw` slot of a
    /// `Quality::Bad` entry, where a read failed and there is no real
    /// value to report but the `Value` triple still needs one.
    pub fn zero(data_type: DataType) -> RawValue {
        match data_type {
            DataType::Bool => RawValue::Bool(false),
            DataType::Int16 => RawValue::I16(0),
            DataType::Int32 => RawValue::I32(0),
            DataType::Int64 => RawValue::I64(0),
            DataType::UInt16 => RawValue::U16(0),
            DataType::UInt32 => RawValue::U32(0),
            DataType::UInt64 => RawValue::U64(0),
            DataType::Float32 => RawValue::F32(0.0),
            DataType::Float64 => RawValue::F64(0.0),
            DataType::Str => RawValue::Str(String::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            RawValue::Bool(_) => DataType::Bool,
            RawValue::I16(_) => DataType::Int16,
            RawValue::I32(_) => DataType::Int32,
            RawValue::I64(_) => DataType::Int64,
            RawValue::U16(_) => DataType::UInt16,
            RawValue::U32(_) => DataType::UInt32,
            RawValue::U64(_) => DataType::UInt64,
            RawValue::F32(_) => DataType::Float32,
            RawValue::F64(_) => DataType::Float64,
            RawValue::Str(_) => DataType::Str,
        }
    }
}

/// The `(raw, dataType, quality)` triple returned by every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub raw: RawValue,
    pub data_type: DataType,
    pub quality: Quality,
}

impl Value {
    pub fn good(raw: RawValue) -> Self {
        let data_type = raw.data_type();
        Value {
            raw,
            data_type,
            quality: Quality::Good,
        }
    }

    pub fn with_quality(raw: RawValue, quality: Quality) -> Self {
        let data_type = raw.data_type();
        Value {
            raw,
            data_type,
            quality,
        }
    }
}
