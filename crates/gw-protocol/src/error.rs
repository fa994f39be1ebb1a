use serde::{Deserialize, Serialize};

/// The error taxonomy from spec §7, with default recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transport,
    Timeout,
    Dial,
    Dns,
    Session,
    Encapsulation,
    Protocol,
    ProtocolBusy,
    Data,
    Config,
    Cancelled,
    CircuitOpen,
}

impl ErrorCategory {
    /// Default recoverability for this category, before any per-instance
    /// override (e.g. `CircuitOpen` becomes recoverable only after the
    /// breaker's own reset timeout, which is not expressible here).
    pub fn default_recoverable(self) -> bool {
        match self {
            ErrorCategory::Transport
            | ErrorCategory::Timeout
            | ErrorCategory::Dial
            | ErrorCategory::Session
            | ErrorCategory::ProtocolBusy => true,
            ErrorCategory::Dns
            | ErrorCategory::Encapsulation
            | ErrorCategory::Protocol
            | ErrorCategory::Data
            | ErrorCategory::Config
            | ErrorCategory::Cancelled
            | ErrorCategory::CircuitOpen => false,
        }
    }
}

/// A structured error record surfaced to northbound callers (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub operation: String,
    #[serde(default)]
    pub device_address: Option<String>,
    #[serde(default)]
    pub tag_address: Option<String>,
    #[serde(default)]
    pub protocol_status: Option<u32>,
    #[serde(default)]
    pub extended_status: Option<u32>,
    pub recoverable: bool,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, operation: impl Into<String>) -> Self {
        ErrorRecord {
            category,
            operation: operation.into(),
            device_address: None,
            tag_address: None,
            protocol_status: None,
            extended_status: None,
            recoverable: category.default_recoverable(),
        }
    }

    pub fn with_device(mut self, address: impl Into<String>) -> Self {
        self.device_address = Some(address.into());
        self
    }

    pub fn with_tag(mut self, address: impl Into<String>) -> Self {
        self.tag_address = Some(address.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults_recoverable() {
        assert!(ErrorCategory::Timeout.default_recoverable());
    }

    #[test]
    fn config_defaults_not_recoverable() {
        assert!(!ErrorCategory::Config.default_recoverable());
    }

    #[test]
    fn circuit_open_defaults_not_recoverable() {
        assert!(!ErrorCategory::CircuitOpen.default_recoverable());
    }

    #[test]
    fn new_record_inherits_category_default() {
        let record = ErrorRecord::new(ErrorCategory::Dial, "connect");
        assert!(record.recoverable);
        assert_eq!(record.device_address, None);
    }

    #[test]
    fn builders_set_optional_fields() {
        let record = ErrorRecord::new(ErrorCategory::Data, "read_tag")
            .with_device("10.0.0.5:502")
            .with_tag("40001");
        assert_eq!(record.device_address.as_deref(), Some("10.0.0.5:502"));
        assert_eq!(record.tag_address.as_deref(), Some("40001"));
    }
}
