//! Object-addressed (EtherNet/IP + CIP) protocol handler: wires the codec,
//! pool, cache, batching, and resilience layers together into the
//! `ProtocolHandler` contract.
//!
//! Unlike Modbus, a CIP session survives across requests (`CipSessionDriver`
//! negotiates it once per connection), so every request here rides the
//! pooled connection's already-established session handle.

use super::{elapsed_ms, ProtocolHandler};
use crate::batch::{plan_object_batches, AddressedTag};
use crate::cache::TagCache;
use crate::diagnostics::LiveDiagnostics;
use crate::error::GatewayError;
use crate::pool::ConnectionPool;
use crate::resilience::{is_retryable, CircuitBreaker, RetryPolicy};
use crate::session::CipSessionDriver;
use async_trait::async_trait;
use cip_codec::Command;
use gw_protocol::{
    DataType, Device, DeviceDiagnostics, ErrorRecord, PingResult, ProtocolKind, Quality, RawValue,
    Tag, Value,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// `DataType`s CIP explicit messaging can round-trip here. `Str` is
/// rejected by both `decode_value_bytes` and `encode_value_bytes`.
const SUPPORTED_TYPES: &[DataType] = &[
    DataType::Bool,
    DataType::Int16,
    DataType::Int32,
    DataType::Int64,
    DataType::UInt16,
    DataType::UInt32,
    DataType::UInt64,
    DataType::Float32,
    DataType::Float64,
];

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_TAGS_PER_BATCH: usize = 1;

struct DeviceState {
    pool: Arc<ConnectionPool<CipSessionDriver>>,
    breaker: CircuitBreaker,
    diagnostics: LiveDiagnostics,
}

/// Handles devices speaking EtherNet/IP + CIP explicit messaging.
pub struct ObjectAddressedHandler {
    devices: RwLock<HashMap<String, Arc<DeviceState>>>,
    cache: TagCache,
    retry_policy: RetryPolicy,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_probes: u32,
    pool_max_active: usize,
    pool_max_idle: usize,
    pool_idle_ttl: Duration,
}

impl ObjectAddressedHandler {
    pub fn new(cache_capacity: usize, cache_ttl: Duration, retry_policy: RetryPolicy) -> Self {
        ObjectAddressedHandler {
            devices: RwLock::new(HashMap::new()),
            cache: TagCache::new(cache_capacity, cache_ttl),
            retry_policy,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_probes: 1,
            pool_max_active: DEFAULT_POOL_SIZE,
            pool_max_idle: DEFAULT_POOL_SIZE,
            pool_idle_ttl: DEFAULT_IDLE_TTL,
        }
    }

    /// Overrides the breaker defaults with a device's configured
    /// `[resilience]` values instead of this handler's hardcoded ones.
    pub fn with_breaker_config(mut self, failure_threshold: u32, reset_timeout: Duration, half_open_probes: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self.reset_timeout = reset_timeout;
        self.half_open_probes = half_open_probes;
        self
    }

    /// Overrides the pool defaults with a gateway's configured `[pool]`
    /// values. A device's own `pool_size` entry still wins over
    /// `max_active` when present.
    pub fn with_pool_config(mut self, max_idle: usize, max_active: usize, idle_ttl: Duration) -> Self {
        self.pool_max_idle = max_idle;
        self.pool_max_active = max_active;
        self.pool_idle_ttl = idle_ttl;
        self
    }

    fn state_for(&self, device: &Device) -> Arc<DeviceState> {
        if let Some(state) = self.devices.read().unwrap_or_else(|e| e.into_inner()).get(&device.id) {
            return Arc::clone(state);
        }
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        devices
            .entry(device.id.clone())
            .or_insert_with(|| {
                let pool = Arc::new(
                    ConnectionPool::new(
                        device.endpoint(),
                        device
                            .config_u64("pool_size")
                            .map(|n| n as usize)
                            .unwrap_or(self.pool_max_active),
                        DEFAULT_ACQUIRE_TIMEOUT,
                        self.pool_idle_ttl,
                    )
                    .with_max_idle(self.pool_max_idle),
                );
                Arc::new(DeviceState {
                    pool,
                    breaker: CircuitBreaker::with_half_open_probes(
                        device.id.clone(),
                        self.failure_threshold,
                        self.reset_timeout,
                        self.half_open_probes,
                    ),
                    diagnostics: LiveDiagnostics::new(device.id.clone()),
                })
            })
            .clone()
    }

    /// Sends one CIP service request over the device's pooled session and
    /// returns the raw service reply, retrying transient failures and
    /// classifying every outcome through the circuit breaker.
    async fn execute(&self, state: &DeviceState, cip_request: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let mut attempt = 0;
        loop {
            let probe = state.breaker.try_acquire()?;
            let mut lease = match state.pool.acquire().await {
                Ok(lease) => lease,
                Err(err) => {
                    state.breaker.record_failure(probe);
                    return Err(err);
                }
            };
            let session_handle = lease.driver().session_handle();

            let outcome = send_rr_data(lease.stream_mut(), session_handle, cip_request).await;
            match outcome {
                Ok(reply) => {
                    state.breaker.record_success(probe);
                    state.diagnostics.set_session_established(session_handle);
                    state.diagnostics.record_response_received(reply.len() as u64, 0.0);
                    return Ok(reply);
                }
                Err(err) => {
                    lease.discard();
                    state.breaker.record_failure(probe);
                    state
                        .diagnostics
                        .record_error(ErrorRecord::new(err.category(), "cip_send_rr_data"));
                    attempt += 1;
                    if attempt >= self.retry_policy.max_attempts || !is_retryable(&err) {
                        tracing::warn!(attempt, "cip request failed, giving up");
                        return Err(err);
                    }
                    tracing::debug!(attempt, "cip request failed, retrying");
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
}

async fn send_rr_data(
    stream: &mut TcpStream,
    session_handle: u32,
    cip_request: &[u8],
) -> Result<Vec<u8>, GatewayError> {
    let cpf = cip_codec::wrap_unconnected(cip_request);
    let frame = cip_codec::encode(Command::SendRrData, session_handle, [0u8; 8], &cpf);
    stream.write_all(&frame).await.map_err(GatewayError::Transport)?;

    let mut header = [0u8; cip_codec::HEADER_LEN];
    stream.read_exact(&mut header).await.map_err(GatewayError::Transport)?;
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut rest = vec![0u8; length];
    if length > 0 {
        stream.read_exact(&mut rest).await.map_err(GatewayError::Transport)?;
    }
    let mut frame = header.to_vec();
    frame.extend_from_slice(&rest);

    let message = cip_codec::decode(&frame).map_err(GatewayError::Cip)?;
    cip_codec::unwrap_unconnected(&message.data)
        .map(|body| body.to_vec())
        .map_err(GatewayError::Cip)
}

#[async_trait]
impl ProtocolHandler for ObjectAddressedHandler {
    fn protocol_kind(&self) -> ProtocolKind {
        ProtocolKind::ObjectAddressed
    }

    async fn connect(&self, device: &Device) -> Result<(), GatewayError> {
        let state = self.state_for(device);
        let probe = state.breaker.try_acquire()?;
        match state.pool.acquire().await {
            Ok(lease) => {
                state.breaker.record_success(probe);
                state.diagnostics.set_session_established(lease.driver().session_handle());
                drop(lease);
                Ok(())
            }
            Err(err) => {
                state.breaker.record_failure(probe);
                Err(err)
            }
        }
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), GatewayError> {
        if let Some(state) = self.devices.read().unwrap_or_else(|e| e.into_inner()).get(device_id) {
            state.diagnostics.set_disconnected();
        }
        Ok(())
    }

    fn is_connected(&self, device_id: &str) -> bool {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .map(|state| state.diagnostics.is_connected())
            .unwrap_or(false)
    }

    fn supported_types(&self) -> &'static [DataType] {
        SUPPORTED_TYPES
    }

    fn validate_address(&self, address: &str) -> Result<(), GatewayError> {
        cip_codec::parse_address(address).map(|_| ()).map_err(GatewayError::Cip)
    }

    async fn ping(&self, device: &Device) -> PingResult {
        let start = Instant::now();
        match self.connect(device).await {
            Ok(()) => PingResult::reachable(elapsed_ms(start)),
            Err(_) => PingResult::unreachable(),
        }
    }

    async fn read_tags(
        &self,
        device: &Device,
        tags: &[Tag],
    ) -> Result<HashMap<String, Value>, GatewayError> {
        let state = self.state_for(device);
        let mut results = HashMap::new();
        let mut addressed = Vec::new();
        let mut tag_by_id = HashMap::new();

        for tag in tags {
            let cache_key = format!("{}:{}", device.id, tag.id);
            if let Some(value) = self.cache.get(&cache_key) {
                results.insert(tag.id.clone(), value);
                continue;
            }
            let parsed = cip_codec::parse_address(&tag.address).map_err(GatewayError::Cip)?;
            addressed.push(AddressedTag {
                tag_id: tag.id.clone(),
                address: parsed,
            });
            tag_by_id.insert(tag.id.clone(), tag);
        }

        if addressed.is_empty() {
            return Ok(results);
        }

        let batches = plan_object_batches(&addressed, DEFAULT_MAX_TAGS_PER_BATCH);
        let addressed_by_id: HashMap<&str, &AddressedTag> =
            addressed.iter().map(|a| (a.tag_id.as_str(), a)).collect();

        for batch in batches {
            for tag_id in batch {
                let tag = tag_by_id[tag_id.as_str()];
                let parsed = &addressed_by_id[tag_id.as_str()].address;
                // Each tag's read is independent at the wire level (batch
                // size is always 1 here), so one tag's failure never
                // aborts the others: a failing tag gets a bad-quality
                // entry rather than dropping out of the result map.
                let outcome: Result<Value, GatewayError> = async {
                    let request = cip_codec::build_read_tag_request(parsed, 1).map_err(GatewayError::Cip)?;
                    let reply = self.execute(&state, &request).await?;
                    let parsed_reply = cip_codec::parse_read_tag_response(&reply).map_err(GatewayError::Cip)?;
                    let raw = decode_value_bytes(tag.data_type, &parsed_reply.value_bytes)?;
                    Ok(Value::good(raw))
                }
                .await;
                let value = outcome.unwrap_or_else(|_| {
                    Value::with_quality(RawValue::zero(tag.data_type), Quality::Bad)
                });
                if value.quality == Quality::Good {
                    self.cache.put(format!("{}:{}", device.id, tag_id), value.clone());
                }
                results.insert(tag_id.clone(), value);
            }
        }
        Ok(results)
    }

    async fn write_tag(&self, device: &Device, tag: &Tag, value: RawValue) -> Result<(), GatewayError> {
        let parsed = cip_codec::parse_address(&tag.address).map_err(GatewayError::Cip)?;
        let value_bytes = encode_value_bytes(&value)?;
        let request = cip_codec::build_write_tag_request(&parsed, tag.data_type, 1, &value_bytes)
            .map_err(GatewayError::Cip)?;

        let state = self.state_for(device);
        let reply = self.execute(&state, &request).await?;
        cip_codec::parse_write_tag_response(&reply).map_err(GatewayError::Cip)?;
        self.cache.invalidate(&format!("{}:{}", device.id, tag.id));
        Ok(())
    }

    fn diagnostics(&self, device_id: &str) -> Option<DeviceDiagnostics> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .map(|state| state.diagnostics.snapshot())
    }

    async fn forget_device(&self, device_id: &str) {
        self.devices.write().unwrap_or_else(|e| e.into_inner()).remove(device_id);
    }

    fn sweep(&self) {
        self.cache.sweep();
        for state in self.devices.read().unwrap_or_else(|e| e.into_inner()).values() {
            state.pool.reap_expired();
        }
    }
}

fn decode_value_bytes(data_type: gw_protocol::DataType, bytes: &[u8]) -> Result<RawValue, GatewayError> {
    use gw_protocol::DataType;
    let err = || GatewayError::Cip(cip_codec::CodecError::FrameTooShort {
        expected: 0,
        got: bytes.len(),
    });
    Ok(match data_type {
        DataType::Bool => RawValue::Bool(*bytes.first().ok_or_else(err)? != 0),
        DataType::Int16 => RawValue::I16(i16::from_le_bytes(bytes.get(0..2).ok_or_else(err)?.try_into().unwrap())),
        DataType::Int32 => RawValue::I32(i32::from_le_bytes(bytes.get(0..4).ok_or_else(err)?.try_into().unwrap())),
        DataType::Int64 => RawValue::I64(i64::from_le_bytes(bytes.get(0..8).ok_or_else(err)?.try_into().unwrap())),
        DataType::UInt16 => RawValue::U16(u16::from_le_bytes(bytes.get(0..2).ok_or_else(err)?.try_into().unwrap())),
        DataType::UInt32 => RawValue::U32(u32::from_le_bytes(bytes.get(0..4).ok_or_else(err)?.try_into().unwrap())),
        DataType::UInt64 => RawValue::U64(u64::from_le_bytes(bytes.get(0..8).ok_or_else(err)?.try_into().unwrap())),
        DataType::Float32 => RawValue::F32(f32::from_le_bytes(bytes.get(0..4).ok_or_else(err)?.try_into().unwrap())),
        DataType::Float64 => RawValue::F64(f64::from_le_bytes(bytes.get(0..8).ok_or_else(err)?.try_into().unwrap())),
        DataType::Str => {
            return Err(GatewayError::Cip(cip_codec::CodecError::InvalidAddress(
                "string tags are not supported over CIP explicit messaging".to_string(),
            )))
        }
    })
}

fn encode_value_bytes(raw: &RawValue) -> Result<Vec<u8>, GatewayError> {
    Ok(match raw {
        RawValue::Bool(b) => vec![if *b { 0xFF } else { 0x00 }],
        RawValue::I16(v) => v.to_le_bytes().to_vec(),
        RawValue::I32(v) => v.to_le_bytes().to_vec(),
        RawValue::I64(v) => v.to_le_bytes().to_vec(),
        RawValue::U16(v) => v.to_le_bytes().to_vec(),
        RawValue::U32(v) => v.to_le_bytes().to_vec(),
        RawValue::U64(v) => v.to_le_bytes().to_vec(),
        RawValue::F32(v) => v.to_le_bytes().to_vec(),
        RawValue::F64(v) => v.to_le_bytes().to_vec(),
        RawValue::Str(_) => {
            return Err(GatewayError::Cip(cip_codec::CodecError::InvalidAddress(
                "string tags are not supported over CIP explicit messaging".to_string(),
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_protocol::DataType;
    use std::collections::HashMap as StdHashMap;
    use tokio::net::TcpListener;

    fn device(port: u16) -> Device {
        Device {
            id: "plc-1".to_string(),
            protocol: ProtocolKind::ObjectAddressed,
            address: "127.0.0.1".to_string(),
            port,
            config: StdHashMap::new(),
        }
    }

    async fn spawn_cip_server(float_value: f32) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            // RegisterSession handshake
            let mut header = [0u8; cip_codec::HEADER_LEN];
            sock.read_exact(&mut header).await.unwrap();
            let length = u16::from_le_bytes([header[2], header[3]]) as usize;
            let mut body = vec![0u8; length];
            sock.read_exact(&mut body).await.unwrap();
            let reply_payload = cip_codec::register_session_payload();
            let reply = cip_codec::encode(Command::RegisterSession, 0xAABBCCDD, [0u8; 8], &reply_payload);
            sock.write_all(&reply).await.unwrap();

            loop {
                let mut header = [0u8; cip_codec::HEADER_LEN];
                if sock.read_exact(&mut header).await.is_err() {
                    return;
                }
                let length = u16::from_le_bytes([header[2], header[3]]) as usize;
                let mut body = vec![0u8; length];
                sock.read_exact(&mut body).await.unwrap();

                let mut read_tag_reply = vec![0x4C | 0x80, 0x00, 0x00, 0x00];
                read_tag_reply.extend_from_slice(&0x00CAu16.to_le_bytes());
                read_tag_reply.extend_from_slice(&float_value.to_le_bytes());
                let cpf = cip_codec::wrap_unconnected(&read_tag_reply);
                let frame = cip_codec::encode(Command::SendRrData, 0xAABBCCDD, [0u8; 8], &cpf);
                sock.write_all(&frame).await.unwrap();
            }
        });
        addr.port()
    }

    #[tokio::test]
    async fn unreachable_device_yields_a_bad_quality_entry_not_an_aborted_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let handler = ObjectAddressedHandler::new(
            100,
            Duration::from_secs(60),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        );
        let device = device(port);
        let tag = Tag::new("flow", "FlowRate", DataType::Float32);

        let results = handler.read_tags(&device, &[tag]).await.unwrap();
        assert_eq!(results["flow"].quality, gw_protocol::Quality::Bad);
    }

    #[tokio::test]
    async fn reads_a_real_tag() {
        let port = spawn_cip_server(98.6).await;
        let handler = ObjectAddressedHandler::new(
            100,
            Duration::from_secs(60),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        );
        let device = device(port);
        let tag = Tag::new("flow", "FlowRate", DataType::Float32);

        let results = handler.read_tags(&device, &[tag]).await.unwrap();
        assert_eq!(results["flow"].raw, RawValue::F32(98.6));
    }
}
