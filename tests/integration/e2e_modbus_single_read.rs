//! A single tag round-trip through `Gateway` to a mock Modbus/TCP device:
//! register, read, confirm the value and quality, unregister.

use gw_core::{Gateway, HandlerRegistry, RegisterAddressedHandler, RetryPolicy};
use gw_protocol::{DataType, Device, ProtocolKind, Quality, RawValue, Tag};
use gw_test_utils::MockModbusServer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn gateway() -> Gateway {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RegisterAddressedHandler::new(
        100,
        Duration::from_secs(60),
        RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(50)),
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
async fn reads_a_single_holding_register_through_the_gateway() {
    let server = MockModbusServer::start().await.unwrap();
    // tag "40001" zero-bases to wire register 0 (40001 - 40001).
    server.set_holding_register(0, 1234).await;

    let gw = gateway();
    gw.register_device(device(server.port())).unwrap();

    let tag = Tag::new("temperature", "40001", DataType::UInt16);
    let results = gw.read_tags("plc-1", &[tag]).await.unwrap();

    let value = &results["temperature"];
    assert_eq!(value.raw, RawValue::U16(1234));
    assert_eq!(value.quality, Quality::Good);

    gw.unregister_device("plc-1").await.unwrap();
}

#[tokio::test]
async fn diagnose_reflects_a_successful_read() {
    let server = MockModbusServer::start().await.unwrap();
    // tag "40010" zero-bases to wire register 9 (40010 - 40001).
    server.set_holding_register(9, 7).await;

    let gw = gateway();
    gw.register_device(device(server.port())).unwrap();
    let tag = Tag::new("t", "40010", DataType::UInt16);
    gw.read_tags("plc-1", &[tag]).await.unwrap();

    let diagnostics = gw.diagnose("plc-1").unwrap();
    assert_eq!(diagnostics.session.responses_received, 1);
}
