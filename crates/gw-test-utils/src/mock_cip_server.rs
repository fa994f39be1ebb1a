//! A mock EtherNet/IP + CIP device: completes the RegisterSession
//! handshake and serves Read/Write Tag Service requests out of an
//! in-memory, name-keyed tag table.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use cip_codec::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

const SERVICE_READ_TAG: u8 = 0x4C;
const SERVICE_WRITE_TAG: u8 = 0x4D;
const REPLY_BIT: u8 = 0x80;
const STATUS_OK: u8 = 0x00;
const STATUS_PATH_SEGMENT_ERROR: u8 = 0x04;

#[derive(Clone)]
struct TagEntry {
    type_code: u16,
    bytes: Vec<u8>,
}

/// A single-device CIP stand-in for integration tests. Binds to a random
/// port, assigns a fixed session handle on RegisterSession, and answers
/// Read/Write Tag Service requests against tags configured up front.
pub struct MockCipServer {
    addr: SocketAddr,
    session_handle: u32,
    tags: Arc<Mutex<HashMap<String, TagEntry>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockCipServer {
    pub async fn start() -> io::Result<Self> {
        Self::start_with_session_handle(0xC001_D00D).await
    }

    pub async fn start_with_session_handle(session_handle: u32) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let tags = Arc::new(Mutex::new(HashMap::new()));
        let accept_tags = Arc::clone(&tags);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let tags = Arc::clone(&accept_tags);
                tokio::spawn(async move {
                    let _ = Self::serve_connection(stream, tags, session_handle).await;
                });
            }
        });
        Ok(MockCipServer {
            addr,
            session_handle,
            tags,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn session_handle(&self) -> u32 {
        self.session_handle
    }

    pub async fn set_tag_f32(&self, name: &str, value: f32) {
        self.set_tag_raw(name, 0x00CA, value.to_le_bytes().to_vec())
            .await;
    }

    pub async fn set_tag_u16(&self, name: &str, value: u16) {
        self.set_tag_raw(name, 0x00C7, value.to_le_bytes().to_vec())
            .await;
    }

    pub async fn set_tag_bool(&self, name: &str, value: bool) {
        self.set_tag_raw(name, 0x00C1, vec![if value { 1 } else { 0 }])
            .await;
    }

    pub async fn set_tag_raw(&self, name: &str, type_code: u16, bytes: Vec<u8>) {
        self.tags
            .lock()
            .await
            .insert(name.to_string(), TagEntry { type_code, bytes });
    }

    pub async fn tag_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.tags.lock().await.get(name).map(|e| e.bytes.clone())
    }

    async fn serve_connection(
        mut sock: TcpStream,
        tags: Arc<Mutex<HashMap<String, TagEntry>>>,
        session_handle: u32,
    ) -> io::Result<()> {
        let mut header = [0u8; cip_codec::HEADER_LEN];
        sock.read_exact(&mut header).await?;
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length];
        sock.read_exact(&mut body).await?;
        let reply = cip_codec::encode(
            Command::RegisterSession,
            session_handle,
            [0u8; 8],
            &cip_codec::register_session_payload(),
        );
        sock.write_all(&reply).await?;

        loop {
            let mut header = [0u8; cip_codec::HEADER_LEN];
            if sock.read_exact(&mut header).await.is_err() {
                return Ok(());
            }
            let length = u16::from_le_bytes([header[2], header[3]]) as usize;
            let mut body = vec![0u8; length];
            sock.read_exact(&mut body).await?;

            let cip_request = match cip_codec::unwrap_unconnected(&body) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let reply_body = Self::handle_cip_request(cip_request, &tags).await;
            let cpf = cip_codec::wrap_unconnected(&reply_body);
            let frame = cip_codec::encode(Command::SendRrData, session_handle, [0u8; 8], &cpf);
            sock.write_all(&frame).await?;
        }
    }

    async fn handle_cip_request(request: &[u8], tags: &Arc<Mutex<HashMap<String, TagEntry>>>) -> Vec<u8> {
        if request.is_empty() {
            return vec![0 | REPLY_BIT, 0x00, STATUS_PATH_SEGMENT_ERROR, 0x00];
        }
        let service = request[0];
        let Some(tag_name) = parse_symbolic_epath(request) else {
            return vec![service | REPLY_BIT, 0x00, STATUS_PATH_SEGMENT_ERROR, 0x00];
        };
        let mut tags = tags.lock().await;
        match service {
            SERVICE_READ_TAG => {
                let Some(entry) = tags.get(&tag_name) else {
                    return vec![service | REPLY_BIT, 0x00, STATUS_PATH_SEGMENT_ERROR, 0x00];
                };
                let mut reply = vec![service | REPLY_BIT, 0x00, STATUS_OK, 0x00];
                reply.extend_from_slice(&entry.type_code.to_le_bytes());
                reply.extend_from_slice(&entry.bytes);
                reply
            }
            SERVICE_WRITE_TAG => {
                let path_words = request[1] as usize;
                let path_len = path_words * 2;
                let data_start = 2 + path_len;
                if request.len() < data_start + 4 {
                    return vec![service | REPLY_BIT, 0x00, STATUS_PATH_SEGMENT_ERROR, 0x00];
                }
                let type_code = u16::from_le_bytes([request[data_start], request[data_start + 1]]);
                let value_bytes = request[data_start + 4..].to_vec();
                tags.insert(
                    tag_name,
                    TagEntry {
                        type_code,
                        bytes: value_bytes,
                    },
                );
                vec![service | REPLY_BIT, 0x00, STATUS_OK, 0x00]
            }
            other => vec![other | REPLY_BIT, 0x00, 0x08, 0x00],
        }
    }
}

/// Pulls the tag name back out of a `0x91`-prefixed symbolic EPATH segment.
fn parse_symbolic_epath(request: &[u8]) -> Option<String> {
    if request.len() < 2 {
        return None;
    }
    let path_words = request[1] as usize;
    let path = request.get(2..2 + path_words * 2)?;
    if path.first() != Some(&0x91) {
        return None;
    }
    let name_len = *path.get(1)? as usize;
    let name_bytes = path.get(2..2 + name_len)?;
    String::from_utf8(name_bytes.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cip_codec::{build_read_tag_request, build_write_tag_request, parse_read_tag_response};
    use gw_protocol::{DataType, ParsedAddress};

    async fn connect_and_register(server: &MockCipServer) -> TcpStream {
        let mut sock = TcpStream::connect(server.local_addr()).await.unwrap();
        let payload = cip_codec::register_session_payload();
        let frame = cip_codec::encode(Command::RegisterSession, 0, [0u8; 8], &payload);
        sock.write_all(&frame).await.unwrap();
        let mut header = [0u8; cip_codec::HEADER_LEN];
        sock.read_exact(&mut header).await.unwrap();
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length];
        sock.read_exact(&mut body).await.unwrap();
        sock
    }

    #[tokio::test]
    async fn reads_back_a_preset_tag() {
        let server = MockCipServer::start().await.unwrap();
        server.set_tag_f32("FlowRate", 12.5).await;
        let mut sock = connect_and_register(&server).await;

        let address = ParsedAddress::Symbolic {
            tag_name: "FlowRate".to_string(),
            array_index: None,
        };
        let request = build_read_tag_request(&address, 1).unwrap();
        let cpf = cip_codec::wrap_unconnected(&request);
        let frame = cip_codec::encode(Command::SendRrData, server.session_handle(), [0u8; 8], &cpf);
        sock.write_all(&frame).await.unwrap();

        let mut header = [0u8; cip_codec::HEADER_LEN];
        sock.read_exact(&mut header).await.unwrap();
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length];
        sock.read_exact(&mut body).await.unwrap();
        let response_cip = cip_codec::unwrap_unconnected(&body).unwrap();
        let parsed = parse_read_tag_response(response_cip).unwrap();
        assert_eq!(parsed.data_type, DataType::Float32);
        assert_eq!(parsed.value_bytes, 12.5f32.to_le_bytes());
    }

    #[tokio::test]
    async fn write_tag_persists_into_tag_table() {
        let server = MockCipServer::start().await.unwrap();
        server.set_tag_u16("Setpoint", 0).await;
        let mut sock = connect_and_register(&server).await;

        let address = ParsedAddress::Symbolic {
            tag_name: "Setpoint".to_string(),
            array_index: None,
        };
        let request =
            build_write_tag_request(&address, DataType::UInt16, 1, &99u16.to_le_bytes()).unwrap();
        let cpf = cip_codec::wrap_unconnected(&request);
        let frame = cip_codec::encode(Command::SendRrData, server.session_handle(), [0u8; 8], &cpf);
        sock.write_all(&frame).await.unwrap();

        let mut header = [0u8; cip_codec::HEADER_LEN];
        sock.read_exact(&mut header).await.unwrap();
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length];
        sock.read_exact(&mut body).await.unwrap();

        assert_eq!(
            server.tag_bytes("Setpoint").await,
            Some(99u16.to_le_bytes().to_vec())
        );
    }
}
