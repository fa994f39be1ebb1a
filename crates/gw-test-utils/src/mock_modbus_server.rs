//! A mock Modbus/TCP device: accepts MBAP-framed requests and serves them
//! out of an in-memory register/coil map that tests configure up front and
//! can inspect afterwards (e.g. to assert a write landed).

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

const FC_READ_COILS: u8 = 0x01;
const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
const FC_READ_INPUT_REGISTERS: u8 = 0x04;
const FC_WRITE_SINGLE_COIL: u8 = 0x05;
const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
const EXCEPTION_ILLEGAL_ADDRESS: u8 = 0x02;

#[derive(Default)]
struct Memory {
    holding: HashMap<u16, u16>,
    input: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete: HashMap<u16, bool>,
}

/// A single-device Modbus/TCP stand-in for integration tests. Binds to a
/// random port; a test reads `port()` and points a `Device` at it.
pub struct MockModbusServer {
    addr: SocketAddr,
    memory: Arc<Mutex<Memory>>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockModbusServer {
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let memory = Arc::new(Mutex::new(Memory::default()));
        let accept_memory = Arc::clone(&memory);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let memory = Arc::clone(&accept_memory);
                tokio::spawn(async move {
                    let _ = Self::serve_connection(stream, memory).await;
                });
            }
        });
        Ok(MockModbusServer {
            addr,
            memory,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn set_holding_register(&self, address: u16, value: u16) {
        self.memory.lock().await.holding.insert(address, value);
    }

    pub async fn set_holding_registers(&self, start: u16, values: &[u16]) {
        let mut memory = self.memory.lock().await;
        for (i, v) in values.iter().enumerate() {
            memory.holding.insert(start + i as u16, *v);
        }
    }

    pub async fn set_input_register(&self, address: u16, value: u16) {
        self.memory.lock().await.input.insert(address, value);
    }

    pub async fn set_coil(&self, address: u16, value: bool) {
        self.memory.lock().await.coils.insert(address, value);
    }

    pub async fn set_discrete_input(&self, address: u16, value: bool) {
        self.memory.lock().await.discrete.insert(address, value);
    }

    pub async fn holding_register(&self, address: u16) -> Option<u16> {
        self.memory.lock().await.holding.get(&address).copied()
    }

    pub async fn coil(&self, address: u16) -> Option<bool> {
        self.memory.lock().await.coils.get(&address).copied()
    }

    async fn serve_connection(mut sock: TcpStream, memory: Arc<Mutex<Memory>>) -> io::Result<()> {
        loop {
            let mut header = [0u8; 7];
            if sock.read_exact(&mut header).await.is_err() {
                return Ok(());
            }
            let transaction_id = u16::from_be_bytes([header[0], header[1]]);
            let length = u16::from_be_bytes([header[4], header[5]]) as usize;
            let unit_id = header[6];
            let mut pdu = vec![0u8; length.saturating_sub(1)];
            sock.read_exact(&mut pdu).await?;

            let reply_pdu = Self::handle_pdu(&pdu, &memory).await;
            let mut reply = Vec::with_capacity(7 + reply_pdu.len());
            reply.extend_from_slice(&transaction_id.to_be_bytes());
            reply.extend_from_slice(&0u16.to_be_bytes());
            reply.extend_from_slice(&((reply_pdu.len() + 1) as u16).to_be_bytes());
            reply.push(unit_id);
            reply.extend_from_slice(&reply_pdu);
            sock.write_all(&reply).await?;
        }
    }

    async fn handle_pdu(pdu: &[u8], memory: &Arc<Mutex<Memory>>) -> Vec<u8> {
        if pdu.is_empty() {
            return exception(0, EXCEPTION_ILLEGAL_FUNCTION);
        }
        let function = pdu[0];
        let mut memory = memory.lock().await;
        match function {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                let Some((address, quantity)) = read_header(pdu) else {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                };
                let table = if function == FC_READ_HOLDING_REGISTERS {
                    &memory.holding
                } else {
                    &memory.input
                };
                let mut body = vec![function, (quantity * 2) as u8];
                for offset in 0..quantity {
                    let v = table.get(&(address + offset)).copied().unwrap_or(0);
                    body.extend_from_slice(&v.to_be_bytes());
                }
                body
            }
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
                let Some((address, quantity)) = read_header(pdu) else {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                };
                let table = if function == FC_READ_COILS {
                    &memory.coils
                } else {
                    &memory.discrete
                };
                let bits: Vec<bool> = (0..quantity)
                    .map(|offset| table.get(&(address + offset)).copied().unwrap_or(false))
                    .collect();
                let mut body = vec![function, bits.len().div_ceil(8) as u8];
                body.extend_from_slice(&pack_bits(&bits));
                body
            }
            FC_WRITE_SINGLE_REGISTER => {
                if pdu.len() < 5 {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                }
                let address = u16::from_be_bytes([pdu[1], pdu[2]]);
                let value = u16::from_be_bytes([pdu[3], pdu[4]]);
                memory.holding.insert(address, value);
                pdu[..5].to_vec()
            }
            FC_WRITE_SINGLE_COIL => {
                if pdu.len() < 5 {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                }
                let address = u16::from_be_bytes([pdu[1], pdu[2]]);
                let value = u16::from_be_bytes([pdu[3], pdu[4]]) == 0xFF00;
                memory.coils.insert(address, value);
                pdu[..5].to_vec()
            }
            FC_WRITE_MULTIPLE_REGISTERS => {
                if pdu.len() < 6 {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                }
                let address = u16::from_be_bytes([pdu[1], pdu[2]]);
                let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
                let byte_count = pdu[5] as usize;
                let values = &pdu[6..6 + byte_count];
                for i in 0..quantity as usize {
                    let v = u16::from_be_bytes([values[i * 2], values[i * 2 + 1]]);
                    memory.holding.insert(address + i as u16, v);
                }
                let mut body = vec![function];
                body.extend_from_slice(&address.to_be_bytes());
                body.extend_from_slice(&quantity.to_be_bytes());
                body
            }
            FC_WRITE_MULTIPLE_COILS => {
                if pdu.len() < 6 {
                    return exception(function, EXCEPTION_ILLEGAL_ADDRESS);
                }
                let address = u16::from_be_bytes([pdu[1], pdu[2]]);
                let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
                let byte_count = pdu[5] as usize;
                let values = &pdu[6..6 + byte_count];
                for i in 0..quantity as usize {
                    let bit = values[i / 8] & (1 << (i % 8)) != 0;
                    memory.coils.insert(address + i as u16, bit);
                }
                let mut body = vec![function];
                body.extend_from_slice(&address.to_be_bytes());
                body.extend_from_slice(&quantity.to_be_bytes());
                body
            }
            _ => exception(function, EXCEPTION_ILLEGAL_FUNCTION),
        }
    }
}

fn read_header(pdu: &[u8]) -> Option<(u16, u16)> {
    if pdu.len() < 5 {
        return None;
    }
    Some((
        u16::from_be_bytes([pdu[1], pdu[2]]),
        u16::from_be_bytes([pdu[3], pdu[4]]),
    ))
}

fn exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | 0x80, code]
}

fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len().div_ceil(8)];
    for (i, &v) in values.iter().enumerate() {
        if v {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}
