use crate::session::SessionError;
use gw_protocol::ErrorCategory;
use std::time::Duration;
use thiserror::Error;

/// The composite error type returned by every `gw-core` operation.
///
/// Every variant maps to an `ErrorCategory` from the shared taxonomy via
/// `category()`, so northbound callers can make recoverability decisions
/// without matching on gateway-internal variants.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("device not registered: {0}")]
    DeviceNotFound(String),

    #[error("device already registered: {0}")]
    DeviceAlreadyExists(String),

    #[error("no subscription with id {0}")]
    SubscriptionNotFound(u64),

    #[error("tag not found on device {device}: {tag}")]
    TagNotFound { device: String, tag: String },

    #[error("modbus codec error: {0}")]
    Modbus(#[from] modbus_codec::CodecError),

    #[error("cip codec error: {0}")]
    Cip(#[from] cip_codec::CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection pool exhausted for device {0}")]
    PoolExhausted(String),

    #[error("circuit breaker open for device {0}")]
    CircuitOpen(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("session fsm error: {0}")]
    SessionTransition(#[from] SessionError),

    #[error("no handler registered for protocol {0:?}")]
    UnsupportedProtocol(gw_protocol::ProtocolKind),

    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Classifies this error into the shared taxonomy (spec §7).
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::DeviceNotFound(_) | GatewayError::DeviceAlreadyExists(_) => {
                ErrorCategory::Config
            }
            GatewayError::SubscriptionNotFound(_) => ErrorCategory::Config,
            GatewayError::TagNotFound { .. } => ErrorCategory::Data,
            GatewayError::Modbus(_) | GatewayError::Cip(_) => ErrorCategory::Protocol,
            GatewayError::Transport(_) => ErrorCategory::Transport,
            GatewayError::Timeout(_) => ErrorCategory::Timeout,
            GatewayError::PoolExhausted(_) => ErrorCategory::ProtocolBusy,
            GatewayError::CircuitOpen(_) => ErrorCategory::CircuitOpen,
            GatewayError::Session(_) => ErrorCategory::Session,
            GatewayError::SessionTransition(_) => ErrorCategory::Session,
            GatewayError::UnsupportedProtocol(_) => ErrorCategory::Config,
            GatewayError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether a retry is worth attempting, before the circuit breaker's
    /// own state is consulted.
    pub fn is_recoverable(&self) -> bool {
        self.category().default_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_categorizes_as_timeout_and_recoverable() {
        let err = GatewayError::Timeout(Duration::from_millis(500));
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.is_recoverable());
    }

    #[test]
    fn device_not_found_categorizes_as_config_and_unrecoverable() {
        let err = GatewayError::DeviceNotFound("plc-1".to_string());
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn circuit_open_is_not_recoverable_by_default() {
        let err = GatewayError::CircuitOpen("plc-1".to_string());
        assert!(!err.is_recoverable());
    }
}
