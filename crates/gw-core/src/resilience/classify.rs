//! Retry classification: decides whether a given failure is worth another
//! attempt, refining the taxonomy's blanket default with codec-specific
//! exception/status codes the blanket classification can't see.

use crate::error::GatewayError;

/// Modbus exception codes that indicate transient server-side load rather
/// than a request the server will never be able to satisfy.
const MODBUS_RETRYABLE_EXCEPTIONS: &[u8] = &[0x05, 0x06]; // Acknowledge, ServerDeviceBusy

/// CIP general status codes indicating transient device state rather than
/// a malformed or unsupported request.
const CIP_RETRYABLE_STATUS: &[u8] = &[0x01, 0x09]; // Connection failure, object state conflict

pub fn is_retryable(err: &GatewayError) -> bool {
    match err {
        GatewayError::Modbus(modbus_codec::CodecError::Exception { code, .. }) => {
            MODBUS_RETRYABLE_EXCEPTIONS.contains(code)
        }
        GatewayError::Cip(cip_codec::CodecError::CipGeneralStatus { status, .. }) => {
            CIP_RETRYABLE_STATUS.contains(status)
        }
        other => other.is_recoverable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_server_busy_is_retryable() {
        let err = GatewayError::Modbus(modbus_codec::CodecError::Exception {
            function: 0x03,
            code: 0x06,
        });
        assert!(is_retryable(&err));
    }

    #[test]
    fn modbus_illegal_data_address_is_not_retryable() {
        let err = GatewayError::Modbus(modbus_codec::CodecError::Exception {
            function: 0x03,
            code: 0x02,
        });
        assert!(!is_retryable(&err));
    }

    #[test]
    fn cip_connection_failure_is_retryable() {
        let err = GatewayError::Cip(cip_codec::CodecError::CipGeneralStatus {
            status: 0x01,
            extended: vec![],
        });
        assert!(is_retryable(&err));
    }

    #[test]
    fn timeout_falls_back_to_default_taxonomy() {
        let err = GatewayError::Timeout(std::time::Duration::from_millis(500));
        assert!(is_retryable(&err));
    }
}
