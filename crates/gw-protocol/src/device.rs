use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which wire family a device speaks. `RegisterAddressed` is the
/// Modbus-family protocol; `ObjectAddressed` is EtherNet/IP + CIP.
///
/// An OPC UA variant is a named external collaborator in the spec but has
/// no handler implementation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    RegisterAddressed,
    ObjectAddressed,
}

/// A config value recognized within `Device::config`. Kept as a small
/// closed enum rather than `serde_json::Value` because every recognized
/// key (§6) has a known shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            ConfigValue::Int(n) => u8::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A registered device: identity, transport endpoint, and opaque config.
///
/// Lifecycle: registered externally via `Gateway::register_device`,
/// unregistered via `Gateway::unregister_device`. Never mutated in place
/// while an operation holds a connection — callers replace it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub protocol: ProtocolKind,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub config: HashMap<String, ConfigValue>,
}

impl Device {
    pub fn endpoint(&self) -> (String, u16) {
        (self.address.clone(), self.port)
    }

    pub fn config_u8(&self, key: &str) -> Option<u8> {
        self.config.get(key).and_then(ConfigValue::as_u8)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(ConfigValue::as_u64)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(ConfigValue::as_str)
    }
}
