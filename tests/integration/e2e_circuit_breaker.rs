//! Repeated failures against an unreachable device trip the per-device
//! circuit breaker: once open, further calls fail fast with
//! `GatewayError::CircuitOpen` instead of retrying the dead connection.

use gw_core::{GatewayError, HandlerRegistry, RegisterAddressedHandler, RetryPolicy};
use gw_core::Gateway;
use gw_protocol::{DataType, Device, ProtocolKind, RawValue, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn gateway() -> Gateway {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RegisterAddressedHandler::new(
        100,
        Duration::from_secs(60),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
    )));
    Gateway::new(registry)
}

fn device(port: u16) -> Device {
    Device {
        id: "plc-1".to_string(),
        protocol: ProtocolKind::RegisterAddressed,
        address: "127.0.0.1".to_string(),
        port,
        config: HashMap::new(),
    }
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures_and_fails_fast() {
    // Bind then drop immediately: the port is refused on connect, giving
    // every attempt a fast, deterministic failure.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let gw = gateway();
    gw.register_device(device(port)).unwrap();
    let tag = Tag::new("setpoint", "40001", DataType::UInt16).writable(true);

    let mut saw_circuit_open = false;
    for _ in 0..10 {
        match gw.write_tag("plc-1", &tag, RawValue::U16(1)).await {
            Err(GatewayError::CircuitOpen(_)) => {
                saw_circuit_open = true;
                break;
            }
            _ => continue,
        }
    }

    assert!(
        saw_circuit_open,
        "expected the breaker to open and fail fast within 10 attempts"
    );

    let diagnostics = gw.diagnose("plc-1").unwrap();
    assert!(!diagnostics.recent_errors.is_empty());
}
