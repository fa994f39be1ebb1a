//! Session FSM: tracks the lifecycle of a device connection from raw TCP
//! connect through protocol-level session establishment to teardown.
//!
//! Modeled on `UplinkSession::connect`'s hello/heartbeat handshake pattern,
//! generalized across the two wire families: Modbus/TCP has no session
//! handshake beyond the socket itself, while CIP requires an explicit
//! Register Session exchange before any Send RR Data request is valid.

mod cip;
mod modbus;

pub use cip::CipSessionDriver;
pub use modbus::ModbusSessionDriver;

use crate::error::GatewayError;
use thiserror::Error;
use tokio::net::TcpStream;

/// The session lifecycle. `Faulted` is terminal — callers must open a new
/// driver rather than attempt to recover one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    TcpConnected,
    Established,
    Closing,
    Faulted,
}

/// Raised when a driver attempts a transition the FSM's table does not
/// allow. A driver bug, not a device/network failure — callers should not
/// retry on this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("illegal session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

fn is_legal_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    matches!(
        (from, to),
        (Disconnected, TcpConnected)
            // Register-addressed protocols have no session handshake: the
            // FSM collapses straight from Disconnected to Established.
            | (Disconnected, Established)
            | (TcpConnected, Established)
            | (Established, Closing)
            // Register-addressed protocols have no Closing phase either:
            // teardown drops straight from Established to Disconnected.
            | (Established, Disconnected)
            | (TcpConnected, Faulted)
            | (Established, Faulted)
            | (Closing, Disconnected)
            | (Faulted, Disconnected)
    )
}

impl SessionState {
    /// Checks `self -> to` against the FSM's transition table without
    /// mutating anything. Drivers call this before applying a transition.
    pub fn validate_transition(self, to: SessionState) -> Result<(), SessionError> {
        if is_legal_transition(self, to) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition { from: self, to })
        }
    }
}

/// A protocol-specific session handshake/teardown driver. `Gateway`'s
/// connection pool owns the `TcpStream`; a driver only negotiates what
/// rides on top of it.
#[async_trait::async_trait]
pub trait SessionDriver: Send {
    /// Performs the protocol-level handshake over an already-connected
    /// socket. Transitions `Disconnected`/`TcpConnected` to `Established`.
    async fn establish(&mut self, stream: &mut TcpStream) -> Result<(), GatewayError>;

    /// Performs a graceful protocol-level teardown. Best-effort: callers
    /// close the socket regardless of the result.
    async fn teardown(&mut self, stream: &mut TcpStream) -> Result<(), GatewayError>;

    fn state(&self) -> SessionState;
}
