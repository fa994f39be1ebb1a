//! Wires a loaded `GatewayConfig` into a running `gw_core::Gateway`:
//! builds the handler registry, registers every configured device.

use crate::config::GatewayConfig;
use gw_core::{Gateway, HandlerRegistry, ObjectAddressedHandler, RegisterAddressedHandler, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Builds a `Gateway` from `config`: one handler per protocol family, with
/// every `[[devices]]` entry pre-registered.
pub fn build(config: &GatewayConfig) -> Gateway {
    let retry_policy = RetryPolicy::new(
        config.resilience.max_attempts,
        Duration::from_millis(config.resilience.initial_backoff_ms),
        Duration::from_millis(config.resilience.max_backoff_ms),
    )
    .with_backoff_factor(config.resilience.backoff_factor);
    let cache_ttl = Duration::from_millis(config.cache.default_ttl_ms);
    let reset_timeout = Duration::from_millis(config.resilience.reset_timeout_ms);
    let pool_idle_ttl = Duration::from_secs(config.pool.idle_timeout_secs);

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RegisterAddressedHandler::new(
        config.cache.max_size,
        cache_ttl,
        retry_policy,
    ).with_breaker_config(
        config.resilience.failure_threshold,
        reset_timeout,
        config.resilience.half_open_probes as u32,
    ).with_pool_config(
        config.pool.max_idle,
        config.pool.max_active,
        pool_idle_ttl,
    )));
    registry.register(Arc::new(ObjectAddressedHandler::new(
        config.cache.max_size,
        cache_ttl,
        retry_policy,
    ).with_breaker_config(
        config.resilience.failure_threshold,
        reset_timeout,
        config.resilience.half_open_probes as u32,
    ).with_pool_config(
        config.pool.max_idle,
        config.pool.max_active,
        pool_idle_ttl,
    )));

    let gateway = Gateway::new(registry);
    for device in &config.devices {
        let device_id = device.id.clone();
        match gateway.register_device(device.clone()) {
            Ok(()) => info!(device_id = %device_id, "device registered"),
            Err(err) => warn!(device_id = %device_id, error = %err, "failed to register device from config"),
        }
    }
    gateway
}

/// Runs `gateway.sweep_all()` every `interval` until the process is asked
/// to shut down. Intended to be spawned once at startup, mirroring the
/// forwarder's journal-pruning background task.
pub async fn run_sweeper(gateway: Arc<Gateway>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                gateway.sweep_all();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
