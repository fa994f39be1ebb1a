use serde::{Deserialize, Serialize};

/// The enumerated data types a tag value may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Str,
}

impl DataType {
    /// Number of 16-bit registers a value of this type occupies on a
    /// register-addressed protocol. `None` for types with no fixed width
    /// (strings are length-prefixed).
    pub fn register_width(self) -> Option<u16> {
        match self {
            DataType::Bool | DataType::Int16 | DataType::UInt16 => Some(1),
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => Some(2),
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => Some(4),
            DataType::Str => None,
        }
    }
}

/// A named data point on a device. Resolves to a `ParsedAddress` via the
/// owning handler's codec.
///
/// Invariant: `data_type` must be in the handler's supported set and
/// `address` must pass the handler's address parser — both are enforced at
/// the handler boundary, not here, since validity is protocol-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub address: String,
    pub data_type: DataType,
    pub writable: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Tag {
    pub fn new(id: impl Into<String>, address: impl Into<String>, data_type: DataType) -> Self {
        Tag {
            id: id.into(),
            address: address.into(),
            data_type,
            writable: false,
            name: None,
            unit: None,
        }
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}
