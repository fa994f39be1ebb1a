//! `Gateway`: the northbound facade (spec §6) that an external REST/
//! WebSocket transport layer embeds. Resolves a device to its
//! `ProtocolHandler` and otherwise knows nothing about Modbus or CIP.

use crate::error::GatewayError;
use crate::handler::HandlerRegistry;
use gw_protocol::{DataType, Device, DeviceDiagnostics, HealthStatus, PingResult, RawValue, Tag, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns the device registry and dispatches every northbound operation to
/// the handler matching the device's protocol.
pub struct Gateway {
    devices: RwLock<HashMap<String, Device>>,
    registry: Arc<HandlerRegistry>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_subscription_id: AtomicU64,
}

impl Gateway {
    pub fn new(registry: HandlerRegistry) -> Self {
        Gateway {
            devices: RwLock::new(HashMap::new()),
            registry: Arc::new(registry),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    fn lock_devices(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Device>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }

    fn device(&self, device_id: &str) -> Result<Device, GatewayError> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .cloned()
            .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))
    }

    /// Adds a new device. Fails if a device with the same id is already
    /// registered — callers must `unregister_device` first to replace one.
    pub fn register_device(&self, device: Device) -> Result<(), GatewayError> {
        let mut devices = self.lock_devices();
        if devices.contains_key(&device.id) {
            return Err(GatewayError::DeviceAlreadyExists(device.id));
        }
        debug!(device_id = %device.id, protocol = ?device.protocol, "registering device");
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    /// Removes a device and releases any pooled connections/diagnostics
    /// its handler was holding for it.
    pub async fn unregister_device(&self, device_id: &str) -> Result<(), GatewayError> {
        let device = {
            let mut devices = self.lock_devices();
            devices
                .remove(device_id)
                .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))?
        };
        let handler = self.registry.get(device.protocol)?;
        handler.forget_device(device_id).await;
        Ok(())
    }

    /// Eagerly dials and establishes a session for `device_id`, priming
    /// its handler's pool ahead of the first `read_tags`/`write_tag` call.
    pub async fn connect(&self, device_id: &str) -> Result<(), GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        handler.connect(&device).await
    }

    pub async fn disconnect(&self, device_id: &str) -> Result<(), GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        handler.disconnect(device_id).await
    }

    pub fn is_connected(&self, device_id: &str) -> Result<bool, GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        Ok(handler.is_connected(device_id))
    }

    /// Round-trips a minimal request to `device_id`. Never fails on an
    /// unreachable device — that shows up as `PingResult::unreachable()` —
    /// only a missing device/handler registration returns an `Err`.
    pub async fn ping(&self, device_id: &str) -> Result<PingResult, GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        Ok(handler.ping(&device).await)
    }

    /// Validates `address` against the wire grammar `protocol` expects,
    /// without registering a device or touching the network.
    pub fn validate_address(&self, protocol: gw_protocol::ProtocolKind, address: &str) -> Result<(), GatewayError> {
        self.registry.get(protocol)?.validate_address(address)
    }

    /// The `DataType`s `protocol`'s handler can encode/decode.
    pub fn supported_types(&self, protocol: gw_protocol::ProtocolKind) -> Result<&'static [DataType], GatewayError> {
        Ok(self.registry.get(protocol)?.supported_types())
    }

    pub async fn read_tag(&self, device_id: &str, tag: &Tag) -> Result<Value, GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        handler.read_tag(&device, tag).await
    }

    pub async fn read_tags(
        &self,
        device_id: &str,
        tags: &[Tag],
    ) -> Result<HashMap<String, Value>, GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        handler.read_tags(&device, tags).await
    }

    pub async fn write_tag(
        &self,
        device_id: &str,
        tag: &Tag,
        value: RawValue,
    ) -> Result<(), GatewayError> {
        if !tag.writable {
            return Err(GatewayError::Session(format!(
                "tag {} is not writable",
                tag.id
            )));
        }
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        handler.write_tag(&device, tag, value).await
    }

    /// Polls `tags` on `device_id` every `interval`, pushing only the tags
    /// whose raw value changed since the last poll to `sender`. The
    /// returned id can be passed to `unsubscribe` to stop the poll.
    pub fn subscribe(
        &self,
        device_id: &str,
        tags: Vec<Tag>,
        interval: Duration,
        sender: UnboundedSender<HashMap<String, Value>>,
    ) -> Result<SubscriptionId, GatewayError> {
        // Validates the device exists up front; the poll loop re-resolves
        // it every tick so a later unregister surfaces there, not here.
        self.device(device_id)?;

        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let device_id = device_id.to_string();
        let devices = self.devices_handle();
        let registry = Arc::clone(&self.registry);

        let task = tokio::spawn(async move {
            let mut last: HashMap<String, Value> = HashMap::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let device = {
                    let guard = devices.read().unwrap_or_else(|e| e.into_inner());
                    match guard.get(&device_id) {
                        Some(d) => d.clone(),
                        None => {
                            debug!(device_id = %device_id, "subscription target unregistered, stopping poll");
                            return;
                        }
                    }
                };
                let handler = match registry.get(device.protocol) {
                    Ok(h) => h,
                    Err(err) => {
                        warn!(device_id = %device_id, error = %err, "subscription poll has no handler");
                        return;
                    }
                };
                let values = match handler.read_tags(&device, &tags).await {
                    Ok(values) => values,
                    Err(err) => {
                        warn!(device_id = %device_id, error = %err, "subscription poll failed");
                        continue;
                    }
                };
                let changed: HashMap<String, Value> = values
                    .into_iter()
                    .filter(|(tag_id, value)| last.get(tag_id) != Some(value))
                    .collect();
                if !changed.is_empty() {
                    last.extend(changed.clone());
                    if sender.send(changed).is_err() {
                        debug!(device_id = %device_id, "subscriber dropped, stopping poll");
                        return;
                    }
                }
            }
        });

        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Subscription { task });
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::SubscriptionNotFound(id.0))
    }

    pub fn diagnose(&self, device_id: &str) -> Result<DeviceDiagnostics, GatewayError> {
        let device = self.device(device_id)?;
        let handler = self.registry.get(device.protocol)?;
        Ok(handler
            .diagnostics(device_id)
            .unwrap_or_else(|| DeviceDiagnostics {
                device_id: device_id.to_string(),
                ..Default::default()
            }))
    }

    pub fn health(&self, device_id: &str) -> Result<HealthStatus, GatewayError> {
        Ok(self.diagnose(device_id)?.health)
    }

    /// Sweeps every registered handler's cache and connection pools. Meant
    /// to be called on a fixed interval by a background task, never from
    /// a request path.
    pub fn sweep_all(&self) {
        for handler in self.registry.iter() {
            handler.sweep();
        }
    }

    fn devices_handle(&self) -> &RwLock<HashMap<String, Device>> {
        &self.devices
    }
}
