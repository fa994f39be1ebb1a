use super::{SessionDriver, SessionState};
use crate::error::GatewayError;
use cip_codec::{Command, EncapsulationMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// CIP requires an explicit Register Session handshake (CIP Volume 2 §3-3)
/// before any `SendRRData` request is accepted. This driver performs that
/// handshake and remembers the session handle for the lifetime of the
/// connection.
#[derive(Debug, Default)]
pub struct CipSessionDriver {
    state: SessionState,
    session_handle: u32,
}

impl CipSessionDriver {
    pub fn new() -> Self {
        CipSessionDriver {
            state: SessionState::Disconnected,
            session_handle: 0,
        }
    }

    pub fn session_handle(&self) -> u32 {
        self.session_handle
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> Result<(), GatewayError> {
    stream.write_all(frame).await.map_err(GatewayError::Transport)
}

async fn read_message(stream: &mut TcpStream) -> Result<EncapsulationMessage, GatewayError> {
    let mut header = [0u8; cip_codec::HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .map_err(GatewayError::Transport)?;
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut data = vec![0u8; length];
    if length > 0 {
        stream
            .read_exact(&mut data)
            .await
            .map_err(GatewayError::Transport)?;
    }
    let mut frame = header.to_vec();
    frame.extend_from_slice(&data);
    cip_codec::decode(&frame).map_err(GatewayError::Cip)
}

#[async_trait::async_trait]
impl SessionDriver for CipSessionDriver {
    async fn establish(&mut self, stream: &mut TcpStream) -> Result<(), GatewayError> {
        self.state.validate_transition(SessionState::TcpConnected)?;
        self.state = SessionState::TcpConnected;
        let payload = cip_codec::register_session_payload();
        let frame = cip_codec::encode(Command::RegisterSession, 0, [0u8; 8], &payload);
        write_frame(stream, &frame).await?;

        let reply = read_message(stream).await?;
        if reply.command != Command::RegisterSession {
            return Err(GatewayError::Session(format!(
                "expected RegisterSession reply, got {:?}",
                reply.command
            )));
        }
        // `cip_codec::decode` already rejects a nonzero status before
        // `read_message` returns, but the FSM transition's precondition is
        // stated in terms of the reply itself — check it explicitly here
        // too rather than relying on that lower layer alone.
        if reply.status != 0 {
            return Err(GatewayError::Session(format!(
                "RegisterSession rejected with status {}",
                reply.status
            )));
        }
        self.state.validate_transition(SessionState::Established)?;
        self.session_handle = reply.session_handle;
        self.state = SessionState::Established;
        debug_assert!(
            self.session_handle != 0,
            "an Established CIP session must have a nonzero session handle"
        );
        info!(session_handle = self.session_handle, "CIP session established");
        Ok(())
    }

    async fn teardown(&mut self, stream: &mut TcpStream) -> Result<(), GatewayError> {
        if self.state != SessionState::Established {
            self.state = SessionState::Disconnected;
            return Ok(());
        }
        self.state.validate_transition(SessionState::Closing)?;
        self.state = SessionState::Closing;
        let frame = cip_codec::encode(Command::UnregisterSession, self.session_handle, [0u8; 8], &[]);
        // Best-effort: the device may already have closed its half of the socket.
        if let Err(e) = write_frame(stream, &frame).await {
            debug!(error = %e, "UnregisterSession send failed, closing anyway");
        }
        self.state.validate_transition(SessionState::Disconnected)?;
        self.state = SessionState::Disconnected;
        self.session_handle = 0;
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.state
    }
}
