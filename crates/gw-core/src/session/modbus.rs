use super::{SessionDriver, SessionState};
use crate::error::GatewayError;
use tokio::net::TcpStream;

/// Modbus/TCP has no session handshake: once the socket is connected, the
/// session is established. This driver exists so `Gateway` can treat both
/// wire families uniformly through `SessionDriver`.
#[derive(Debug, Default)]
pub struct ModbusSessionDriver {
    state: SessionState,
}

impl ModbusSessionDriver {
    pub fn new() -> Self {
        ModbusSessionDriver {
            state: SessionState::Disconnected,
        }
    }
}

#[async_trait::async_trait]
impl SessionDriver for ModbusSessionDriver {
    async fn establish(&mut self, _stream: &mut TcpStream) -> Result<(), GatewayError> {
        self.state.validate_transition(SessionState::Established)?;
        self.state = SessionState::Established;
        debug_assert_eq!(self.state, SessionState::Established);
        Ok(())
    }

    async fn teardown(&mut self, _stream: &mut TcpStream) -> Result<(), GatewayError> {
        if self.state == SessionState::Established {
            self.state.validate_transition(SessionState::Disconnected)?;
        }
        self.state = SessionState::Disconnected;
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.state
    }
}
