//! Register-addressed (Modbus-family) protocol handler: wires the codec,
//! pool, cache, batching, and resilience layers together into the
//! `ProtocolHandler` contract.

use super::elapsed_ms;
use crate::batch::{plan_register_batches, AddressedTag, RegisterBatch};
use crate::cache::TagCache;
use crate::diagnostics::LiveDiagnostics;
use crate::error::GatewayError;
use crate::pool::{ConnectionPool, Lease};
use crate::resilience::{is_retryable, CircuitBreaker, RetryPolicy};
use crate::session::ModbusSessionDriver;
use async_trait::async_trait;
use gw_protocol::{
    DataType, Device, DeviceDiagnostics, ErrorRecord, FunctionCode, ParsedAddress, PingResult,
    ProtocolKind, Quality, RawValue, Tag, Value,
};
use modbus_codec::{decode_registers, encode_registers, Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// `DataType`s the Modbus register encoder/decoder can round-trip. `Str`
/// has no register encoding in this codec.
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

const DEFAULT_MAX_QUANTITY: u16 = 125;
const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

struct DeviceState {
    pool: Arc<ConnectionPool<ModbusSessionDriver>>,
    breaker: CircuitBreaker,
    diagnostics: LiveDiagnostics,
    transaction_id: AtomicU16,
}

/// Handles devices speaking the Modbus-family register-addressed protocol
/// over TCP (MBAP framing).
pub struct RegisterAddressedHandler {
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

impl RegisterAddressedHandler {
    pub fn new(cache_capacity: usize, cache_ttl: Duration, retry_policy: RetryPolicy) -> Self {
        RegisterAddressedHandler {
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
                    transaction_id: AtomicU16::new(1),
                })
            })
            .clone()
    }

    fn max_quantity(device: &Device) -> u16 {
        device
            .config_u64("max_batch_quantity")
            .map(|n| n as u16)
            .unwrap_or(DEFAULT_MAX_QUANTITY)
            .min(DEFAULT_MAX_QUANTITY)
    }

    async fn execute(
        &self,
        state: &DeviceState,
        unit_id: u8,
        request: Request,
    ) -> Result<Response, GatewayError> {
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

            let transaction_id = state.transaction_id.fetch_add(1, Ordering::Relaxed);
            let outcome = run_request(lease.stream_mut(), transaction_id, unit_id, &request).await;
            match outcome {
                Ok(response) => {
                    state.breaker.record_success(probe);
                    state.diagnostics.set_session_established(0);
                    state.diagnostics.record_response_received(0, 0.0);
                    return Ok(response);
                }
                Err(err) => {
                    lease.discard();
                    state.breaker.record_failure(probe);
                    state.diagnostics.record_error(
                        ErrorRecord::new(err.category(), "modbus_request")
                            .with_device(&state_device_label(unit_id)),
                    );
                    attempt += 1;
                    if attempt >= self.retry_policy.max_attempts || !is_retryable(&err) {
                        tracing::warn!(unit_id, attempt, "modbus request failed, giving up");
                        return Err(err);
                    }
                    tracing::debug!(unit_id, attempt, "modbus request failed, retrying");
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
}

fn state_device_label(unit_id: u8) -> String {
    format!("unit:{unit_id}")
}

/// Parses a tag's address and attaches the device's configured `unit_id`
/// (default 1) — the wire grammar `modbus_codec::parse_address` accepts has
/// no room for it, since `unit_id` is a per-device setting, not per-tag.
fn parse_tag_address(device: &Device, tag_address: &str) -> Result<ParsedAddress, GatewayError> {
    let mut parsed = modbus_codec::parse_address(tag_address).map_err(GatewayError::Modbus)?;
    if let ParsedAddress::Register { unit_id, .. } = &mut parsed {
        *unit_id = device.config_u8("unit_id").unwrap_or(1);
    }
    Ok(parsed)
}

async fn run_request(
    stream: &mut TcpStream,
    transaction_id: u16,
    unit_id: u8,
    request: &Request,
) -> Result<Response, GatewayError> {
    let frame = modbus_codec::encode_request(transaction_id, unit_id, request);
    stream.write_all(&frame).await.map_err(GatewayError::Transport)?;

    let mut header = [0u8; 6];
    stream.read_exact(&mut header).await.map_err(GatewayError::Transport)?;
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    let mut rest = vec![0u8; length];
    stream.read_exact(&mut rest).await.map_err(GatewayError::Transport)?;

    let mut frame = header.to_vec();
    frame.extend_from_slice(&rest);
    modbus_codec::decode_response(&frame, transaction_id, unit_id, request).map_err(GatewayError::Modbus)
}

/// Builds a one-tag `RegisterBatch` for the fallback path after a
/// multi-tag batch read fails.
fn single_tag_batch(unit_id: u8, parsed: &ParsedAddress) -> Option<RegisterBatch> {
    let ParsedAddress::Register {
        function_code,
        register_address,
        count,
        ..
    } = parsed
    else {
        return None;
    };
    Some(RegisterBatch {
        unit_id,
        function_code: *function_code,
        start_address: *register_address,
        quantity: *count,
        tag_ids: Vec::new(),
    })
}

fn build_read_request(batch: &RegisterBatch) -> Request {
    match batch.function_code {
        FunctionCode::Coil => Request::ReadCoils {
            address: batch.start_address,
            quantity: batch.quantity,
        },
        FunctionCode::DiscreteInput => Request::ReadDiscreteInputs {
            address: batch.start_address,
            quantity: batch.quantity,
        },
        FunctionCode::InputRegister => Request::ReadInputRegisters {
            address: batch.start_address,
            quantity: batch.quantity,
        },
        FunctionCode::HoldingRegister => Request::ReadHoldingRegisters {
            address: batch.start_address,
            quantity: batch.quantity,
        },
    }
}

fn extract_tag_value(
    response: &Response,
    batch_start: u16,
    parsed: &ParsedAddress,
    tag: &Tag,
) -> Result<Value, GatewayError> {
    let ParsedAddress::Register {
        register_address,
        count,
        ..
    } = parsed
    else {
        return Err(GatewayError::TagNotFound {
            device: String::new(),
            tag: tag.id.clone(),
        });
    };
    let offset = (*register_address - batch_start) as usize;
    let count = *count as usize;

    let raw = match response {
        Response::ReadCoils(bits) | Response::ReadDiscreteInputs(bits) => {
            RawValue::Bool(bits[offset])
        }
        Response::ReadHoldingRegisters(regs) | Response::ReadInputRegisters(regs) => {
            decode_registers(tag.data_type, &regs[offset..offset + count]).map_err(GatewayError::Modbus)?
        }
        _ => {
            return Err(GatewayError::Session(
                "unexpected response variant for a read request".to_string(),
            ))
        }
    };
    Ok(Value::good(raw))
}

#[async_trait]
impl ProtocolHandler for RegisterAddressedHandler {
    fn protocol_kind(&self) -> ProtocolKind {
        ProtocolKind::RegisterAddressed
    }

    async fn connect(&self, device: &Device) -> Result<(), GatewayError> {
        let state = self.state_for(device);
        let probe = state.breaker.try_acquire()?;
        match state.pool.acquire().await {
            Ok(lease) => {
                state.breaker.record_success(probe);
                state.diagnostics.set_session_established(0);
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
        modbus_codec::parse_address(address).map(|_| ()).map_err(GatewayError::Modbus)
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
        let mut parsed_by_id = HashMap::new();
        let mut tag_by_id = HashMap::new();

        for tag in tags {
            let cache_key = format!("{}:{}", device.id, tag.id);
            if let Some(value) = self.cache.get(&cache_key) {
                results.insert(tag.id.clone(), value);
                continue;
            }
            let parsed = parse_tag_address(device, &tag.address)?;
            addressed.push(AddressedTag {
                tag_id: tag.id.clone(),
                address: parsed.clone(),
            });
            parsed_by_id.insert(tag.id.clone(), parsed);
            tag_by_id.insert(tag.id.clone(), tag);
        }

        if addressed.is_empty() {
            return Ok(results);
        }

        let batches = plan_register_batches(&addressed, Self::max_quantity(device));
        for batch in batches {
            let request = build_read_request(&batch);
            match self.execute(&state, batch.unit_id, request).await {
                Ok(response) => {
                    for tag_id in &batch.tag_ids {
                        let tag = tag_by_id[tag_id.as_str()];
                        let parsed = &parsed_by_id[tag_id.as_str()];
                        let value = extract_tag_value(&response, batch.start_address, parsed, tag)
                            .unwrap_or_else(|_| {
                                Value::with_quality(RawValue::zero(tag.data_type), Quality::Bad)
                            });
                        if value.quality == Quality::Good {
                            self.cache.put(format!("{}:{}", device.id, tag_id), value.clone());
                        }
                        results.insert(tag_id.clone(), value);
                    }
                }
                Err(_) => {
                    // Transient batch failure: fall back to one read per
                    // tag rather than failing the whole request. A tag
                    // that still fails on its own gets a bad-quality
                    // entry instead of vanishing from the result map.
                    for tag_id in &batch.tag_ids {
                        let tag = tag_by_id[tag_id.as_str()];
                        let parsed = &parsed_by_id[tag_id.as_str()];
                        let single = single_tag_batch(batch.unit_id, parsed);
                        let value = match single {
                            Some(single) => {
                                let request = build_read_request(&single);
                                match self.execute(&state, single.unit_id, request).await {
                                    Ok(response) => {
                                        extract_tag_value(&response, single.start_address, parsed, tag).ok()
                                    }
                                    Err(_) => None,
                                }
                            }
                            None => None,
                        };
                        let value = value.unwrap_or_else(|| {
                            Value::with_quality(RawValue::zero(tag.data_type), Quality::Bad)
                        });
                        if value.quality == Quality::Good {
                            self.cache.put(format!("{}:{}", device.id, tag_id), value.clone());
                        }
                        results.insert(tag_id.clone(), value);
                    }
                }
            }
        }
        Ok(results)
    }

    async fn write_tag(&self, device: &Device, tag: &Tag, value: RawValue) -> Result<(), GatewayError> {
        let parsed = parse_tag_address(device, &tag.address)?;
        modbus_codec::validate_for_write(&parsed).map_err(GatewayError::Modbus)?;
        let ParsedAddress::Register {
            function_code,
            register_address,
            unit_id,
            ..
        } = parsed
        else {
            unreachable!("validate_for_write only accepts Register addresses")
        };

        let request = match (function_code, &value) {
            (FunctionCode::Coil, RawValue::Bool(b)) => Request::WriteSingleCoil {
                address: register_address,
                value: *b,
            },
            (FunctionCode::HoldingRegister, _) => {
                let regs = encode_registers(&value).map_err(GatewayError::Modbus)?;
                if regs.len() == 1 {
                    Request::WriteSingleRegister {
                        address: register_address,
                        value: regs[0],
                    }
                } else {
                    Request::WriteMultipleRegisters {
                        address: register_address,
                        values: regs,
                    }
                }
            }
            _ => {
                return Err(GatewayError::Modbus(modbus_codec::CodecError::ValueOutOfRange(
                    "value type does not match the addressed function code".to_string(),
                )))
            }
        };

        let state = self.state_for(device);
        self.execute(&state, unit_id, request).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use gw_protocol::DataType;
    use std::collections::HashMap as StdHashMap;
    use tokio::net::TcpListener;

    fn device(port: u16) -> Device {
        Device {
            id: "plc-1".to_string(),
            protocol: ProtocolKind::RegisterAddressed,
            address: "127.0.0.1".to_string(),
            port,
            config: StdHashMap::new(),
        }
    }

    async fn spawn_holding_register_server(register_value: u16) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let register_value = register_value;
                tokio::spawn(async move {
                    loop {
                        let mut header = [0u8; 6];
                        if sock.read_exact(&mut header).await.is_err() {
                            return;
                        }
                        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
                        let mut rest = vec![0u8; length];
                        if sock.read_exact(&mut rest).await.is_err() {
                            return;
                        }
                        let transaction_id = u16::from_be_bytes([header[0], header[1]]);
                        let unit_id = rest[0];
                        let pdu = vec![0x03, 0x02, (register_value >> 8) as u8, register_value as u8];
                        let mut reply = transaction_id.to_be_bytes().to_vec();
                        reply.extend_from_slice(&0u16.to_be_bytes());
                        reply.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
                        reply.push(unit_id);
                        reply.extend_from_slice(&pdu);
                        if sock.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        addr.port()
    }

    #[tokio::test]
    async fn reads_a_single_holding_register() {
        let port = spawn_holding_register_server(42).await;
        let handler = RegisterAddressedHandler::new(
            100,
            Duration::from_secs(60),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        );
        let device = device(port);
        let tag = Tag::new("temp", "40001", DataType::UInt16);

        let results = handler.read_tags(&device, &[tag]).await.unwrap();
        assert_eq!(results["temp"].raw, RawValue::U16(42));
    }

    #[tokio::test]
    async fn unreachable_device_yields_a_bad_quality_entry_not_an_aborted_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let handler = RegisterAddressedHandler::new(
            100,
            Duration::from_secs(60),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        );
        let device = device(port);
        let tag = Tag::new("temp", "40001", DataType::UInt16);

        let results = handler.read_tags(&device, &[tag]).await.unwrap();
        assert_eq!(results["temp"].quality, gw_protocol::Quality::Bad);
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let port = spawn_holding_register_server(7).await;
        let handler = RegisterAddressedHandler::new(
            100,
            Duration::from_secs(60),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        );
        let device = device(port);
        let tag = Tag::new("temp", "40001", DataType::UInt16);

        handler.read_tags(&device, &[tag.clone()]).await.unwrap();
        handler.read_tags(&device, &[tag]).await.unwrap();
        let diag = handler.diagnostics("plc-1").unwrap();
        assert_eq!(diag.session.responses_received, 1);
    }
}
