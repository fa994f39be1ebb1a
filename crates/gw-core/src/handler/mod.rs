//! The protocol capability boundary: one `ProtocolHandler` implementation
//! per wire family, each owning its own pools, breakers, cache, and
//! diagnostics. `Gateway` dispatches to whichever handler matches a
//! device's `ProtocolKind` and otherwise knows nothing about Modbus or CIP.

mod modbus;
mod object;
mod registry;

pub use modbus::RegisterAddressedHandler;
pub use object::ObjectAddressedHandler;
pub use registry::HandlerRegistry;

use crate::error::GatewayError;
use async_trait::async_trait;
use gw_protocol::{DataType, Device, DeviceDiagnostics, PingResult, ProtocolKind, RawValue, Tag, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

/// A wire-family capability: connect/disconnect a device, read/write tags,
/// report its diagnostics, and release any held connections when the
/// device is unregistered.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    fn protocol_kind(&self) -> ProtocolKind;

    /// Eagerly dials and establishes a session for `device`, priming the
    /// pool rather than waiting for the first `readTag`/`readMany` to pay
    /// the connect cost.
    async fn connect(&self, device: &Device) -> Result<(), GatewayError>;

    /// Marks `device_id` as disconnected. Pooled connections are left to
    /// the idle reaper rather than torn down synchronously here.
    async fn disconnect(&self, device_id: &str) -> Result<(), GatewayError>;

    /// Whether the handler currently considers `device_id` connected —
    /// i.e. has completed at least one session establishment more
    /// recently than its last `disconnect`/`forget_device`.
    fn is_connected(&self, device_id: &str) -> bool;

    async fn read_tags(
        &self,
        device: &Device,
        tags: &[Tag],
    ) -> Result<HashMap<String, Value>, GatewayError>;

    /// Reads a single tag. The default implementation delegates to
    /// `read_tags` and unwraps the one entry it expects back.
    async fn read_tag(&self, device: &Device, tag: &Tag) -> Result<Value, GatewayError> {
        let mut results = self.read_tags(device, std::slice::from_ref(tag)).await?;
        results
            .remove(&tag.id)
            .ok_or_else(|| GatewayError::TagNotFound {
                device: device.id.clone(),
                tag: tag.id.clone(),
            })
    }

    async fn write_tag(&self, device: &Device, tag: &Tag, value: RawValue) -> Result<(), GatewayError>;

    /// Scans `network_range` for devices speaking this protocol. The
    /// network-scan algorithm itself is out of scope here; every handler
    /// currently returns an empty result rather than touching the wire.
    async fn discover(&self, network_range: &[IpAddr]) -> Result<Vec<Device>, GatewayError> {
        let _ = network_range;
        Ok(Vec::new())
    }

    /// The `DataType`s this handler's codec can encode/decode.
    fn supported_types(&self) -> &'static [DataType];

    /// Runs this handler's address parser against `address` without
    /// performing any I/O, surfacing the same error a `read_tags`/
    /// `write_tag` call against a tag with this address would return.
    fn validate_address(&self, address: &str) -> Result<(), GatewayError>;

    /// Round-trips a minimal request to `device` and reports reachability
    /// plus latency. Never returns an error — an unreachable device comes
    /// back as `PingResult::unreachable()`, not an `Err`.
    async fn ping(&self, device: &Device) -> PingResult;

    /// A snapshot of this device's diagnostics, or `None` if the handler
    /// has never been asked to touch this device.
    fn diagnostics(&self, device_id: &str) -> Option<DeviceDiagnostics>;

    /// Drops any pool/breaker/diagnostics state held for `device_id`.
    async fn forget_device(&self, device_id: &str);

    /// Evicts expired cache entries and reaps idle-expired pooled
    /// connections across every device this handler knows about. Called
    /// periodically by a background task, never inline with a request.
    fn sweep(&self);
}

/// Timing helper shared by both handlers' `ping` implementation.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
